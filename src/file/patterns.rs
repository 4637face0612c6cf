//! Pattern-file loading.
//!
//! Pattern files are JSONC: a JSON array of glob strings, with `// ...`
//! and `/* ... */` comments permitted. json5 accepts both comment forms.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

/// Reads a JSONC file and returns the glob patterns it lists.
pub fn load_patterns(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();

    let contents =
        fs::read_to_string(path).with_context(|| format!("reading patterns file {}", path.display()))?;

    json5::from_str(&contents).with_context(|| format!("parsing patterns file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    fn write_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_plain_json_array() {
        let file = write_file(r#"["*.go", "vendor/*"]"#);
        assert_eq!(load_patterns(file.path()).unwrap(), vec!["*.go", "vendor/*"]);
    }

    #[test]
    fn strips_comments() {
        let file = write_file(
            r#"[
                // sources
                "*.rs",
                /* generated */ "*.pb.go",
            ]"#,
        );
        assert_eq!(load_patterns(file.path()).unwrap(), vec!["*.rs", "*.pb.go"]);
    }

    #[test]
    fn rejects_non_array_contents() {
        let file = write_file(r#"{"include": ["*.go"]}"#);
        assert!(load_patterns(file.path()).is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_patterns("does/not/exist.jsonc").is_err());
    }
}
