//! Resolves positional arguments into the list of files to process.
//!
//! Explicit file arguments are always honored and bypass filtering.
//! Directories are walked recursively and filtered: a walked path is kept
//! iff it matches some include (or no include filter was requested) and
//! matches no exclude. Excludes always win.

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use walkdir::WalkDir;

use crate::file::validation::{clean_path, to_slash, validate_arg};
use crate::pathmatch::Matcher;

/// Include/exclude filter with find -path semantics.
pub struct Filter {
    includes: Matcher,
    excludes: Matcher,
}

impl Filter {
    pub fn new(includes: &[String], excludes: &[String]) -> Result<Self> {
        let includes = Matcher::new(includes).context("compiling include patterns")?;
        let excludes = Matcher::new(excludes).context("compiling exclude patterns")?;

        Ok(Self { includes, excludes })
    }

    /// Whether the relative, slash-normalized path should be kept.
    /// `has_includes` reflects whether include filtering was requested at
    /// all, independently of how many patterns compiled.
    fn matches(&self, path: &str, has_includes: bool) -> bool {
        let included = !has_includes || self.includes.match_any(path);
        let excluded = self.excludes.match_any(path);

        included && !excluded
    }
}

/// Strips a leading `./` so patterns line up with cleaned paths.
pub fn normalize_patterns(patterns: &[String]) -> Vec<String> {
    patterns
        .iter()
        .map(|p| p.strip_prefix("./").unwrap_or(p).to_owned())
        .collect()
}

/// Turns positional args into a deduplicated, ordered file list.
///
/// Returns the matched files and the total number of candidates scanned
/// (before filtering), which feeds the stats output.
pub fn resolve(
    args: &[String],
    includes: &[String],
    excludes: &[String],
    has_includes: bool,
) -> Result<(Vec<PathBuf>, usize)> {
    for arg in args {
        validate_arg(arg)?;
    }

    let includes = normalize_patterns(includes);
    let excludes = normalize_patterns(excludes);
    let filter = Filter::new(&includes, &excludes)?;

    let mut files = Vec::new();
    let mut seen = HashSet::new();
    let mut scanned = 0usize;

    for arg in args {
        let arg = clean_path(arg.as_ref());

        let info = fs::metadata(&arg).with_context(|| format!("stat {}", arg.display()))?;

        if !info.is_dir() {
            // Explicit file: bypass filtering, add directly.
            scanned += 1;

            if seen.insert(arg.clone()) {
                files.push(arg);
            }

            continue;
        }

        for entry in WalkDir::new(&arg) {
            let entry = entry.with_context(|| format!("walking {}", arg.display()))?;

            if entry.file_type().is_dir() {
                continue;
            }

            scanned += 1;

            let clean = clean_path(entry.path());
            if !filter.matches(&to_slash(&clean), has_includes) {
                continue;
            }

            if seen.insert(clean.clone()) {
                files.push(clean);
            }
        }
    }

    if files.is_empty() {
        bail!("no files matched the provided patterns: {args:?}");
    }

    Ok((files, scanned))
}

/// Collects every file reachable from the args, unfiltered. Used by the
/// check command to build the candidate set patterns are tested against.
pub fn collect_all(args: &[String]) -> Result<Vec<String>> {
    for arg in args {
        validate_arg(arg)?;
    }

    let mut paths = Vec::new();
    let mut seen = HashSet::new();

    for arg in args {
        let arg = clean_path(arg.as_ref());

        let info = fs::metadata(&arg).with_context(|| format!("stat {}", arg.display()))?;

        if !info.is_dir() {
            let slash = to_slash(&arg);
            if seen.insert(slash.clone()) {
                paths.push(slash);
            }

            continue;
        }

        for entry in WalkDir::new(&arg) {
            let entry = entry.with_context(|| format!("walking {}", arg.display()))?;

            if entry.file_type().is_dir() {
                continue;
            }

            let slash = to_slash(&clean_path(entry.path()));
            if seen.insert(slash.clone()) {
                paths.push(slash);
            }
        }
    }

    Ok(paths)
}
