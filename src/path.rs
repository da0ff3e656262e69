//! Drive-relative path normalization and validation.
//!
//! Every path entering the drive layer is cleaned first: separators are
//! normalized to `/`, `.` and `..` components are collapsed, and paths that
//! would climb above the drive root are rejected. The empty string is a
//! valid path and denotes the root directory.

use crate::error::{Error, Result};

/// Normalizes a drive-relative path.
///
/// Backslashes are treated as separators, empty and `.` components are
/// dropped, and `..` consumes the preceding component. A path whose
/// normalized form would begin with `..` fails with
/// [`Error::InvalidPathStart`].
pub fn clean_path(path: &str) -> Result<String> {
    let mut parts: Vec<&str> = Vec::new();
    let normalized = path.replace('\\', "/");
    for component in normalized.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() {
                    return Err(Error::InvalidPathStart);
                }
            }
            other => parts.push(other),
        }
    }
    Ok(parts.join("/"))
}

/// Splits a cleaned path into its ordered components.
///
/// The empty path yields an empty list.
pub fn split_path(path: &str) -> Vec<String> {
    if path.is_empty() {
        return Vec::new();
    }
    path.split('/').map(str::to_owned).collect()
}

/// Accepts only paths that never escape the root as components are
/// consumed left to right.
pub fn validate_path(path: &str) -> Result<()> {
    let mut depth: isize = 0;
    for component in path.replace('\\', "/").split('/') {
        match component {
            "" | "." => {}
            ".." => {
                depth -= 1;
                if depth < 0 {
                    return Err(Error::InvalidPathStart);
                }
            }
            _ => depth += 1,
        }
    }
    Ok(())
}

/// Joins a cleaned parent path and a child name.
pub fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_owned()
    } else {
        format!("{parent}/{name}")
    }
}

/// Returns the parent path and local name of a cleaned, non-empty path.
pub fn split_parent(path: &str) -> (String, String) {
    match path.rsplit_once('/') {
        Some((parent, name)) => (parent.to_owned(), name.to_owned()),
        None => (String::new(), path.to_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_path_normalizes_separators() {
        assert_eq!(clean_path("a\\b\\c").unwrap(), "a/b/c");
        assert_eq!(clean_path("a//b///c").unwrap(), "a/b/c");
    }

    #[test]
    fn test_clean_path_collapses_dots() {
        assert_eq!(clean_path("a/./b").unwrap(), "a/b");
        assert_eq!(clean_path("a/b/../c").unwrap(), "a/c");
        assert_eq!(clean_path("a/b/..").unwrap(), "a");
    }

    #[test]
    fn test_clean_path_empty_is_root() {
        assert_eq!(clean_path("").unwrap(), "");
        assert_eq!(clean_path(".").unwrap(), "");
        assert_eq!(clean_path("a/..").unwrap(), "");
    }

    #[test]
    fn test_clean_path_rejects_escape() {
        assert!(matches!(clean_path(".."), Err(Error::InvalidPathStart)));
        assert!(matches!(clean_path("../a"), Err(Error::InvalidPathStart)));
        assert!(matches!(clean_path("a/../.."), Err(Error::InvalidPathStart)));
    }

    #[test]
    fn test_clean_path_idempotent() {
        for p in ["", "a", "a/b/c", "a/./b/../c", "x//y"] {
            let once = clean_path(p).unwrap();
            assert_eq!(clean_path(&once).unwrap(), once);
        }
    }

    #[test]
    fn test_split_path() {
        assert_eq!(split_path(""), Vec::<String>::new());
        assert_eq!(split_path("a"), vec!["a"]);
        assert_eq!(split_path("a/b/c"), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_split_never_contains_parent_refs() {
        for p in ["a/../b", "x/y/..", "./a"] {
            let cleaned = clean_path(p).unwrap();
            assert!(!split_path(&cleaned).iter().any(|c| c == ".."));
        }
    }

    #[test]
    fn test_validate_path() {
        assert!(validate_path("a/b/../c").is_ok());
        assert!(validate_path("").is_ok());
        assert!(matches!(validate_path("a/../../b"), Err(Error::InvalidPathStart)));
    }

    #[test]
    fn test_join_and_split_parent() {
        assert_eq!(join("", "a"), "a");
        assert_eq!(join("a/b", "c"), "a/b/c");
        assert_eq!(split_parent("a/b/c"), ("a/b".into(), "c".into()));
        assert_eq!(split_parent("a"), ("".into(), "a".into()));
    }
}
