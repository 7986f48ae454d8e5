//! Security utilities for safe archive operations

use crate::{Error, Result};
use std::path::{Component, Path, PathBuf};
use tracing::{error, warn};

/// Resolve an untrusted member path below `base`
///
/// Parent-directory components, absolute paths and Windows prefixes are
/// rejected, so the returned path is always inside `base`.
pub fn sanitize_path(base: &Path, untrusted: &Path) -> Result<PathBuf> {
    let mut result = base.to_path_buf();

    for component in untrusted.components() {
        match component {
            Component::Normal(name) => result.push(name),
            Component::CurDir => {}
            Component::ParentDir => {
                error!(path = ?untrusted, "Path contains parent directory component");
                return Err(Error::CorruptedArchive(format!(
                    "path traversal attempt detected: {}",
                    untrusted.display()
                )));
            }
            Component::RootDir | Component::Prefix(_) => {
                error!(path = ?untrusted, "Path is absolute");
                return Err(Error::CorruptedArchive(format!(
                    "absolute member path not allowed: {}",
                    untrusted.display()
                )));
            }
        }
    }

    if result == base {
        return Err(Error::CorruptedArchive(format!(
            "empty member path: {:?}",
            untrusted
        )));
    }

    Ok(result)
}

/// Validate symlink target to prevent escaping extraction directory
///
/// `link_path` is the destination of the link itself and must already be
/// inside `base`.
pub fn validate_symlink(base: &Path, link_path: &Path, target: &Path) -> Result<()> {
    if target.is_absolute() {
        warn!(link = ?link_path, target = ?target, "Symlink has absolute target");
        return Err(Error::CorruptedArchive(format!(
            "symlink points outside extraction directory: {} -> {}",
            link_path.display(),
            target.display()
        )));
    }

    let link_parent = link_path
        .parent()
        .and_then(|p| p.strip_prefix(base).ok())
        .ok_or_else(|| {
            Error::CorruptedArchive(format!(
                "symlink is outside extraction directory: {}",
                link_path.display()
            ))
        })?;

    // Depth below base, walking the target lexically
    let mut depth: usize = link_parent
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .count();

    for component in target.components() {
        match component {
            Component::ParentDir => {
                if depth == 0 {
                    warn!(link = ?link_path, target = ?target, "Symlink target escapes extraction directory");
                    return Err(Error::CorruptedArchive(format!(
                        "symlink target would escape extraction directory: {} -> {}",
                        link_path.display(),
                        target.display()
                    )));
                }
                depth -= 1;
            }
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => {
                return Err(Error::CorruptedArchive(format!(
                    "invalid symlink target: {} -> {}",
                    link_path.display(),
                    target.display()
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path_normal() {
        let base = Path::new("/out");
        let result = sanitize_path(base, Path::new("./subdir/file.txt")).unwrap();
        assert_eq!(result, base.join("subdir/file.txt"));
    }

    #[test]
    fn test_sanitize_path_parent_dir() {
        let base = Path::new("/out");
        assert!(sanitize_path(base, Path::new("../etc/passwd")).is_err());
        assert!(sanitize_path(base, Path::new("a/../../etc/passwd")).is_err());
    }

    #[test]
    fn test_sanitize_path_absolute() {
        assert!(sanitize_path(Path::new("/out"), Path::new("/etc/passwd")).is_err());
    }

    #[test]
    fn test_sanitize_path_empty() {
        assert!(sanitize_path(Path::new("/out"), Path::new("./")).is_err());
    }

    #[test]
    fn test_symlink_targets() {
        let base = Path::new("/out");
        assert!(validate_symlink(base, &base.join("link"), Path::new("target.txt")).is_ok());
        assert!(validate_symlink(base, &base.join("sub/link"), Path::new("../target.txt")).is_ok());
        assert!(validate_symlink(base, &base.join("link"), Path::new("../secret")).is_err());
        assert!(validate_symlink(base, &base.join("link"), Path::new("/etc/passwd")).is_err());
        assert!(validate_symlink(base, &base.join("a/link"), Path::new("b/../../..")).is_err());
    }
}
