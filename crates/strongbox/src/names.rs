//! Entry names and their on-disk paths
//!
//! An entry name is a relative, `/`-separated path without extension
//! (e.g. `email/gmail`). Everything before the last `/` is the entry's
//! category and maps to a directory under the store root.

use anyhow::{bail, Context, Result};
use std::fs::DirBuilder;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Component, Path, PathBuf};

use crate::error::StoreError;

/// Extension shared by every ciphertext file
pub const EXTENSION: &str = "age";

/// Reject names that cannot map to an entry file below the store root
pub fn check(name: &str) -> Result<()> {
    if name.is_empty() {
        bail!(StoreError::Validation("missing entry name".to_string()));
    }

    if name.starts_with('/') {
        bail!(StoreError::Validation(format!(
            "'{}' is an absolute path",
            name
        )));
    }

    if name.split('/').any(|segment| segment == "..") {
        bail!(StoreError::Validation(format!(
            "'{}' contains a '..' segment",
            name
        )));
    }

    // `a/`, `a//b` and `a/.` would map to files the listing cannot name
    if name.split('/').any(|segment| segment.is_empty() || segment == ".") {
        bail!(StoreError::Validation(format!(
            "'{}' contains an empty or '.' segment",
            name
        )));
    }

    Ok(())
}

/// Check `name` and create its category directories under `root`
///
/// Must run before any filesystem access derived from `name`.
pub fn validate(root: &Path, name: &str) -> Result<()> {
    check(name)?;

    if let Some((category, _)) = name.rsplit_once('/') {
        if !category.is_empty() {
            create_private_dir(&root.join(category))?;
        }
    }

    Ok(())
}

/// Create `dir` and any missing parents with mode 0700
pub fn create_private_dir(dir: &Path) -> Result<()> {
    DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(dir)
        .map_err(StoreError::Io)
        .with_context(|| format!("failed to create directory {}", dir.display()))
}

/// Ciphertext file backing `name`
pub fn entry_path(root: &Path, name: &str) -> PathBuf {
    root.join(format!("{}.{}", name, EXTENSION))
}

/// Entry name for a ciphertext file below `root`, if `path` is one
pub fn name_from_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    if relative.extension()? != EXTENSION {
        return None;
    }

    let stem = relative.with_extension("");
    let segments: Vec<&str> = stem
        .components()
        .map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect::<Option<_>>()?;

    if segments.is_empty() {
        return None;
    }
    Some(segments.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error;
    use tempfile::TempDir;

    fn is_validation(name: &str) -> bool {
        let err = check(name).unwrap_err();
        matches!(error::kind(&err), Some(StoreError::Validation(_)))
    }

    #[test]
    fn test_rejects_traversal() {
        assert!(is_validation(".."));
        assert!(is_validation("../escape"));
        assert!(is_validation("a/../../b"));
        assert!(is_validation("a/.."));
    }

    #[test]
    fn test_rejects_absolute_and_empty() {
        assert!(is_validation("/etc/passwd"));
        assert!(is_validation("/"));
        assert!(is_validation(""));
    }

    #[test]
    fn test_rejects_empty_and_dot_segments() {
        assert!(is_validation("a/"));
        assert!(is_validation("."));
        assert!(is_validation("a/."));
        assert!(is_validation("./a"));
        assert!(is_validation("a//b"));
    }

    #[test]
    fn test_dots_inside_segment_are_fine() {
        check("a..b").unwrap();
        check("...").unwrap();
        check("dir/.hidden").unwrap();
        check("v1.2/key").unwrap();
    }

    #[test]
    fn test_validate_creates_category() {
        let temp = TempDir::new().unwrap();
        validate(temp.path(), "email/work/gmail").unwrap();
        assert!(temp.path().join("email/work").is_dir());
        assert!(!temp.path().join("email/work/gmail").exists());
    }

    #[test]
    fn test_validate_flat_name_creates_nothing() {
        let temp = TempDir::new().unwrap();
        validate(temp.path(), "github").unwrap();
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_validate_rejects_before_touching_disk() {
        let temp = TempDir::new().unwrap();
        assert!(validate(temp.path(), "../outside/x").is_err());
        assert!(!temp.path().parent().unwrap().join("outside").exists());
    }

    #[test]
    fn test_category_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        validate(temp.path(), "bank/card").unwrap();
        let mode = std::fs::metadata(temp.path().join("bank"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o700);
    }

    #[test]
    fn test_name_path_mapping() {
        let root = Path::new("/store");
        let path = entry_path(root, "email/gmail");
        assert_eq!(path, PathBuf::from("/store/email/gmail.age"));
        assert_eq!(name_from_path(root, &path).as_deref(), Some("email/gmail"));
    }

    #[test]
    fn test_name_from_path_skips_foreign_files() {
        let root = Path::new("/store");
        assert_eq!(name_from_path(root, Path::new("/store/notes.txt")), None);
        assert_eq!(name_from_path(root, Path::new("/store/.tmpX1.tmp")), None);
        assert_eq!(name_from_path(root, Path::new("/elsewhere/a.age")), None);
        assert_eq!(
            name_from_path(root, Path::new("/store/v1.2/key.age")).as_deref(),
            Some("v1.2/key")
        );
    }
}
