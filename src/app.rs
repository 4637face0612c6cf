//! Command orchestration: file resolution, dry runs, the scheduler, the
//! check command, and redaction.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use indicatif::HumanBytes;
use tracing::debug;

use crate::config::Config;
use crate::file::discovery::{self, normalize_patterns};
use crate::file::operations::create_temp_for;
use crate::file::patterns::load_patterns;
use crate::pathmatch::Matcher;
use crate::processor::FileProcessor;
use crate::worker::{self, WorkerOptions};

/// Runs the encrypt or decrypt command over the configured paths.
pub fn run(cfg: &Config) -> Result<()> {
    let start = Instant::now();

    cfg.validate()?;

    let (files, scanned) = resolve_files(cfg).context("resolving files")?;
    let excluded = scanned - files.len();

    let processor = FileProcessor::new(cfg).context("creating processor")?;

    if cfg.dry {
        return dry_run(cfg, &processor, &files, scanned, excluded, start);
    }

    let options = WorkerOptions { parallel: cfg.parallel, quiet: cfg.quiet, delete: cfg.delete };
    let (totals, first_error) = worker::process_files(&processor, &files, options)?;

    if cfg.stats {
        print_stats(scanned, excluded, totals.processed, totals.errored, totals.output_bytes, start.elapsed());
    }

    if let Some(error) = first_error {
        return Err(error.context(format!("{} file(s) failed", totals.errored)));
    }

    Ok(())
}

/// Expands the configured patterns and resolves positional args into the
/// final file list. Returns the list and the scanned-candidate count.
fn resolve_files(cfg: &Config) -> Result<(Vec<PathBuf>, usize)> {
    let (includes, excludes, mut has_includes) = gather_patterns(cfg)?;
    let mut includes = includes;

    // Directory walks during decrypt should only pick up previously
    // encrypted files unless the caller asked for something else.
    if cfg.decrypt && !has_includes {
        includes.push(format!("*{}", cfg.encrypt_ext));
        has_includes = true;
    }

    discovery::resolve(&cfg.paths, &includes, &excludes, has_includes)
}

/// Merges CLI patterns with pattern-file contents. The returned flag says
/// whether include filtering was requested at all.
fn gather_patterns(cfg: &Config) -> Result<(Vec<String>, Vec<String>, bool)> {
    let mut includes = cfg.include.clone();
    let mut excludes = cfg.exclude.clone();

    if let Some(path) = &cfg.include_from {
        includes.extend(load_patterns(path).context("loading include patterns")?);
    }

    if let Some(path) = &cfg.exclude_from {
        excludes.extend(load_patterns(path).context("loading exclude patterns")?);
    }

    let has_includes = !cfg.include.is_empty() || cfg.include_from.is_some();

    Ok((includes, excludes, has_includes))
}

/// Prints the planned mapping without touching any input.
fn dry_run(
    cfg: &Config,
    processor: &FileProcessor,
    files: &[PathBuf],
    scanned: usize,
    excluded: usize,
    start: Instant,
) -> Result<()> {
    let mut total_size = 0u64;

    for file in files {
        if !cfg.quiet {
            println!(
                "Processed {:?} -> {:?}",
                file.display().to_string(),
                processor.planned_output(file).display().to_string(),
            );
        }

        if cfg.stats
            && let Ok(info) = fs::metadata(file)
        {
            total_size += info.len();
        }
    }

    if cfg.stats {
        print_stats(scanned, excluded, files.len(), 0, total_size, start.elapsed());
    }

    Ok(())
}

fn print_stats(scanned: usize, excluded: usize, processed: usize, errored: usize, bytes: u64, elapsed: Duration) {
    let rounded = Duration::from_millis(elapsed.as_millis() as u64);

    eprintln!();
    eprintln!("Stats");
    eprintln!("  Scanned:   {scanned}");
    eprintln!("  Excluded:  {excluded}");
    eprintln!("  Processed: {processed}");
    eprintln!("  Errors:    {errored}");
    eprintln!("  Size:      {}", HumanBytes(bytes));
    eprintln!("  Duration:  {rounded:?}");
}

/// Validates that every include/exclude pattern matches at least one file
/// reachable from the positional args.
pub fn run_check(cfg: &Config) -> Result<()> {
    let (includes, excludes, _) = gather_patterns(cfg)?;
    let includes = normalize_patterns(&includes);
    let excludes = normalize_patterns(&excludes);

    if includes.is_empty() && excludes.is_empty() {
        bail!("no include or exclude patterns to check");
    }

    let candidates = discovery::collect_all(&cfg.paths)?;

    let mut failures = 0;
    failures += check_patterns("include", &includes, &candidates, cfg.quiet);
    failures += check_patterns("exclude", &excludes, &candidates, cfg.quiet);

    if failures > 0 {
        bail!("{failures} pattern(s) matched no files");
    }

    Ok(())
}

/// Tests each pattern individually against the candidate set, printing a
/// per-pattern verdict. Returns how many patterns matched zero files.
fn check_patterns(kind: &str, patterns: &[String], candidates: &[String], quiet: bool) -> usize {
    let mut failures = 0;

    for pattern in patterns {
        let matcher = match Matcher::new(std::slice::from_ref(pattern)) {
            Ok(matcher) => matcher,
            Err(error) => {
                eprintln!("{kind}: {pattern} — invalid pattern: {error:#}");
                failures += 1;
                continue;
            }
        };

        let count = candidates.iter().filter(|path| matcher.match_any(path)).count();

        if count == 0 {
            eprintln!("{kind}: {pattern} — 0 files (ERROR)");
            failures += 1;
        } else if !quiet {
            eprintln!("{kind}: {pattern} — {count} files");
        }
    }

    failures
}

/// Replaces the contents of the resolved files with `content`, through the
/// same atomic temp-and-rename path the codecs use.
pub fn run_redact(cfg: &Config, content: &str) -> Result<()> {
    let start = Instant::now();

    let (files, scanned) = {
        let (includes, excludes, has_includes) = gather_patterns(cfg)?;
        discovery::resolve(&cfg.paths, &includes, &excludes, has_includes)?
    };
    let excluded = scanned - files.len();

    if cfg.dry {
        for file in &files {
            if !cfg.quiet {
                let name = file.display().to_string();
                println!("Processed {name:?} -> {name:?}");
            }
        }

        if cfg.stats {
            print_stats(scanned, excluded, files.len(), 0, 0, start.elapsed());
        }

        return Ok(());
    }

    let mut errored = 0usize;
    let mut bytes = 0u64;
    let mut first_error: Option<anyhow::Error> = None;

    for file in &files {
        match redact_file(file, content) {
            Ok(size) => {
                bytes += size;

                if !cfg.quiet {
                    let name = file.display().to_string();
                    println!("Processed {name:?} -> {name:?}");
                }
            }
            Err(error) => {
                eprintln!("Error processing {:?}: {error:#}", file.display().to_string());

                errored += 1;
                if first_error.is_none() {
                    first_error = Some(error);
                }
            }
        }
    }

    if cfg.stats {
        print_stats(scanned, excluded, files.len() - errored, errored, bytes, start.elapsed());
    }

    if let Some(error) = first_error {
        return Err(error.context(format!("{errored} file(s) failed")));
    }

    Ok(())
}

fn redact_file(path: &Path, content: &str) -> Result<u64> {
    debug!(path = %path.display(), "redacting");

    let mut temp = create_temp_for(path)?;
    temp.as_file_mut().write_all(content.as_bytes()).context("writing replacement content")?;

    temp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("renaming output file {}", path.display()))?;

    Ok(content.len() as u64)
}
