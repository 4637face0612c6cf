//! Bounded-parallel work scheduler.
//!
//! Files fan out over a fixed number of worker threads; every worker posts
//! exactly one result per file onto a single buffered channel. One
//! consumer drains that channel, prints outcomes, deletes sources when
//! requested, and accumulates the aggregate counters. No ordering is
//! guaranteed across files; the counters are correct regardless of
//! interleaving.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{Context, Result, anyhow};
use tracing::debug;

use crate::processor::FileProcessor;
use crate::types::{FileResult, Totals};

/// Scheduler options, split off the full config so tests can drive the
/// scheduler directly.
#[derive(Debug, Clone, Copy)]
pub struct WorkerOptions {
    pub parallel: usize,
    pub quiet: bool,
    pub delete: bool,
}

/// Runs `processor` over `files` with bounded parallelism.
///
/// Per-file failures are reported and counted but do not stop the run.
/// Returns the totals and the first error encountered, if any.
pub fn process_files(
    processor: &FileProcessor,
    files: &[PathBuf],
    options: WorkerOptions,
) -> Result<(Totals, Option<anyhow::Error>)> {
    let workers = options.parallel.min(files.len()).max(1);

    let (task_tx, task_rx) = flume::unbounded::<PathBuf>();
    let (result_tx, result_rx) = flume::bounded::<FileResult>(files.len());

    for file in files {
        // Unbounded and pre-filled, so sends cannot fail or block.
        let _ = task_tx.send(file.clone());
    }
    drop(task_tx);

    debug!(files = files.len(), workers, "dispatching");

    thread::scope(|scope| {
        let mut handles = Vec::with_capacity(workers);

        for _ in 0..workers {
            let task_rx = task_rx.clone();
            let result_tx = result_tx.clone();

            handles.push(scope.spawn(move || {
                for file in task_rx.iter() {
                    let result = processor.process(&file);
                    let _ = result_tx.send(result);
                }
            }));
        }

        // All worker-held senders are cloned from this one; dropping it
        // lets the consumer observe the channel closing.
        drop(result_tx);

        let consumer = scope.spawn(move || consume(&result_rx, options));

        for handle in handles {
            handle.join().map_err(|_| anyhow!("worker thread panicked"))?;
        }

        consumer.join().map_err(|_| anyhow!("printer thread panicked"))
    })
}

/// Drains results: prints per-file outcomes, performs source deletion on
/// success, and accumulates the totals. The printer is the only writer to
/// stdout/stderr during a run.
fn consume(results: &flume::Receiver<FileResult>, options: WorkerOptions) -> (Totals, Option<anyhow::Error>) {
    let mut totals = Totals::default();
    let mut first_error = None;

    for result in results.iter() {
        match result.error {
            Some(error) => {
                eprintln!("Error processing {:?}: {error:#}", result.input.display().to_string());

                totals.errored += 1;
                if first_error.is_none() {
                    first_error = Some(error);
                }
            }
            None => {
                if !options.quiet {
                    println!(
                        "Processed {:?} -> {:?}",
                        result.input.display().to_string(),
                        result.output.display().to_string(),
                    );
                }

                totals.processed += 1;
                totals.output_bytes += result.size;

                if options.delete {
                    delete_source(&result.input, options.quiet);
                }
            }
        }
    }

    (totals, first_error)
}

fn delete_source(input: &Path, quiet: bool) {
    if let Err(error) = fs::remove_file(input).with_context(|| format!("deleting {}", input.display())) {
        // Reported but not fatal for the per-file result.
        eprintln!("Error deleting {:?}: {error:#}", input.display().to_string());
        return;
    }

    if !quiet {
        println!("Deleted {:?}", input.display().to_string());
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::config::{Config, DEFAULT_ENCRYPT_EXT};
    use crate::secret::Key;

    fn encrypt_config() -> Config {
        Config {
            paths: Vec::new(),
            include: Vec::new(),
            exclude: Vec::new(),
            include_from: None,
            exclude_from: None,
            parallel: 4,
            encrypt_ext: DEFAULT_ENCRYPT_EXT.into(),
            decrypt_ext: String::new(),
            delete: false,
            preserve_timestamps: false,
            dry: false,
            quiet: true,
            stats: false,
            decrypt: false,
            deterministic: false,
            key: Some(Key::from_hex(&"33".repeat(32)).unwrap()),
        }
    }

    fn options() -> WorkerOptions {
        WorkerOptions { parallel: 4, quiet: true, delete: false }
    }

    #[test]
    fn processes_all_files_in_parallel() {
        let dir = tempfile::tempdir().unwrap();

        let mut files = Vec::new();
        for i in 0..20 {
            let path = dir.path().join(format!("file-{i}.txt"));
            fs::write(&path, format!("contents {i}")).unwrap();
            files.push(path);
        }

        let processor = FileProcessor::new(&encrypt_config()).unwrap();
        let (totals, first_error) = process_files(&processor, &files, options()).unwrap();

        assert!(first_error.is_none());
        assert_eq!(totals.processed, 20);
        assert_eq!(totals.errored, 0);
        assert!(totals.output_bytes > 0);

        for file in &files {
            let mut enc = file.as_os_str().to_os_string();
            enc.push(".enc");
            assert!(PathBuf::from(enc).exists());
        }
    }

    #[test]
    fn failures_are_counted_and_do_not_stop_the_run() {
        let dir = tempfile::tempdir().unwrap();

        let good = dir.path().join("good.txt");
        fs::write(&good, b"fine").unwrap();
        let missing = dir.path().join("missing.txt");

        let processor = FileProcessor::new(&encrypt_config()).unwrap();
        let (totals, first_error) = process_files(&processor, &[missing, good], options()).unwrap();

        assert_eq!(totals.processed, 1);
        assert_eq!(totals.errored, 1);
        assert!(first_error.is_some());
        assert!(dir.path().join("good.txt.enc").exists());
    }

    #[test]
    fn delete_removes_sources_only_on_success() {
        let dir = tempfile::tempdir().unwrap();

        let good = dir.path().join("a.txt");
        fs::write(&good, b"a").unwrap();
        let missing = dir.path().join("gone.txt");

        let processor = FileProcessor::new(&encrypt_config()).unwrap();
        let mut opts = options();
        opts.delete = true;

        let (totals, _) = process_files(&processor, &[good.clone(), missing], opts).unwrap();

        assert_eq!(totals.processed, 1);
        assert!(!good.exists(), "source should be deleted after success");
        assert!(dir.path().join("a.txt.enc").exists());
    }

    #[test]
    fn worker_limit_of_one_still_completes() {
        let dir = tempfile::tempdir().unwrap();

        let mut files = Vec::new();
        for i in 0..5 {
            let path = dir.path().join(format!("n{i}.txt"));
            fs::write(&path, b"x").unwrap();
            files.push(path);
        }

        let processor = FileProcessor::new(&encrypt_config()).unwrap();
        let (totals, _) =
            process_files(&processor, &files, WorkerOptions { parallel: 1, quiet: true, delete: false }).unwrap();

        assert_eq!(totals.processed, 5);
    }
}
