//! Positional argument validation.

use std::path::{Component, Path, PathBuf};

use anyhow::{Result, bail};

/// Rejects arguments that are absolute or escape the working directory.
pub fn validate_arg(arg: &str) -> Result<()> {
    let path = Path::new(arg);

    if path.is_absolute() {
        bail!("absolute paths are not allowed: {arg:?}");
    }

    if clean_path(path).starts_with("..") {
        bail!("paths must be within the current working directory: {arg:?}");
    }

    Ok(())
}

/// Lexically normalizes a path: drops `.` components, collapses redundant
/// separators, and resolves `..` against preceding components. Leading
/// `..` components survive, which is how escape attempts stay visible to
/// [`validate_arg`].
pub fn clean_path(path: &Path) -> PathBuf {
    let mut parts: Vec<Component<'_>> = Vec::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                }
                _ => parts.push(Component::ParentDir),
            },
            other => parts.push(other),
        }
    }

    let cleaned: PathBuf = parts.iter().collect();

    if cleaned.as_os_str().is_empty() { PathBuf::from(".") } else { cleaned }
}

/// Forward-slash form of a path, for pattern matching consistency.
pub fn to_slash(path: &Path) -> String {
    let text = path.to_string_lossy();

    if std::path::MAIN_SEPARATOR == '/' {
        text.into_owned()
    } else {
        text.replace(std::path::MAIN_SEPARATOR, "/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_absolute_paths() {
        assert!(validate_arg("/etc/passwd").is_err());
    }

    #[test]
    fn rejects_escaping_paths() {
        assert!(validate_arg("../sibling").is_err());
        assert!(validate_arg("a/../../escape").is_err());
        assert!(validate_arg("./../escape").is_err());
    }

    #[test]
    fn accepts_paths_inside_cwd() {
        validate_arg(".").unwrap();
        validate_arg("src").unwrap();
        validate_arg("./src/main.rs").unwrap();
        validate_arg("a/../b").unwrap();
    }

    #[test]
    fn clean_path_normalizes() {
        assert_eq!(clean_path(Path::new("./a/b")), PathBuf::from("a/b"));
        assert_eq!(clean_path(Path::new("a//b")), PathBuf::from("a/b"));
        assert_eq!(clean_path(Path::new(".")), PathBuf::from("."));
        assert_eq!(clean_path(Path::new("a/../b")), PathBuf::from("b"));
        assert_eq!(clean_path(Path::new("a/../../b")), PathBuf::from("../b"));
        assert_eq!(clean_path(Path::new("a/..")), PathBuf::from("."));
    }
}
