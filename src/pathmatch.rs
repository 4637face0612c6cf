//! find(1) `-path` glob matching.
//!
//! Follows fnmatch(3) without `FNM_PATHNAME`:
//! - `*` matches any characters including `/`
//! - `?` matches exactly one character including `/`
//! - `[...]` matches one character from the set including `/`
//! - `\` escapes the next character
//!
//! This differs from shell globbing, where `*` does not cross directory
//! separators.

use std::collections::HashMap;
use std::sync::{LazyLock, Mutex};

use anyhow::{Context, Result, bail};
use regex::Regex;

/// Reports whether `path` matches `pattern` using find -path semantics.
pub fn matches(pattern: &str, path: &str) -> Result<bool> {
    Ok(compile(pattern)?.is_match(path))
}

/// Pre-compiles patterns for reuse across many paths.
#[derive(Debug, Clone, Default)]
pub struct Matcher {
    patterns: Vec<Regex>,
}

impl Matcher {
    pub fn new(patterns: &[String]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| compile(p).with_context(|| format!("pattern {p:?}")))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { patterns })
    }

    /// Reports whether `path` matches any of the compiled patterns.
    pub fn match_any(&self, path: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(path))
    }
}

// Compiled patterns are memoized process-wide. Pattern sets are small, so
// the cache is never evicted.
static CACHE: LazyLock<Mutex<HashMap<String, Regex>>> = LazyLock::new(|| Mutex::new(HashMap::new()));

/// Converts a glob pattern to a compiled, cached regex.
fn compile(pattern: &str) -> Result<Regex> {
    if let Some(re) = CACHE.lock().unwrap().get(pattern) {
        return Ok(re.clone());
    }

    let translated = to_regex(pattern)?;
    let re = Regex::new(&translated).with_context(|| format!("compiling pattern {pattern:?}"))?;

    CACHE.lock().unwrap().insert(pattern.to_owned(), re.clone());

    Ok(re)
}

/// Translates a glob pattern to an anchored regex string.
fn to_regex(pattern: &str) -> Result<String> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() + 8);

    out.push('^');

    let mut pos = 0;
    while pos < chars.len() {
        match chars[pos] {
            '*' => {
                out.push_str(".*");
                pos += 1;
            }

            '?' => {
                out.push('.');
                pos += 1;
            }

            '[' => {
                let end = find_closing_bracket(&chars, pos)
                    .with_context(|| format!("unclosed character class in pattern {pattern:?}"))?;

                // Class contents are passed through; only the `!` negation
                // marker and a leading literal `]` need rewriting for the
                // regex engine.
                let mut inner = &chars[pos + 1..end];

                out.push('[');

                if inner.first() == Some(&'!') {
                    out.push('^');
                    inner = &inner[1..];
                }

                if inner.first() == Some(&']') {
                    out.push_str("\\]");
                    inner = &inner[1..];
                }

                out.extend(inner);
                out.push(']');

                pos = end + 1;
            }

            '\\' => {
                if pos + 1 < chars.len() {
                    out.push_str(&regex::escape(&chars[pos + 1].to_string()));
                    pos += 2;
                } else {
                    bail!("trailing backslash in pattern {pattern:?}");
                }
            }

            ch => {
                out.push_str(&regex::escape(&ch.to_string()));
                pos += 1;
            }
        }
    }

    out.push('$');

    Ok(out)
}

/// Finds the index of the `]` that closes a character class starting at
/// `pos`. A `]` directly after `[` or `[!` is a class member, not the
/// terminator.
fn find_closing_bracket(chars: &[char], pos: usize) -> Option<usize> {
    let mut idx = pos + 1;

    if chars.get(idx) == Some(&'!') {
        idx += 1;
    }

    if chars.get(idx) == Some(&']') {
        idx += 1;
    }

    while idx < chars.len() {
        if chars[idx] == ']' {
            return Some(idx);
        }

        idx += 1;
    }

    None
}
