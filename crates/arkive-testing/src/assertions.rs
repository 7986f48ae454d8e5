//! Common assertions for archive tests

use anyhow::Result;
use std::path::Path;
use walkdir::WalkDir;

/// Asserts that two directory trees hold the same paths, kinds and contents
pub fn assert_dirs_equal(dir1: &Path, dir2: &Path) -> Result<()> {
    let entries1 = relative_paths(dir1)?;
    let entries2 = relative_paths(dir2)?;

    assert_eq!(entries1, entries2, "Directory trees differ");

    for relative in &entries1 {
        let path1 = dir1.join(relative);
        let path2 = dir2.join(relative);
        let meta1 = std::fs::symlink_metadata(&path1)?;
        let meta2 = std::fs::symlink_metadata(&path2)?;

        assert_eq!(
            meta1.file_type().is_dir(),
            meta2.file_type().is_dir(),
            "File type mismatch for {}",
            relative
        );
        assert_eq!(
            meta1.file_type().is_symlink(),
            meta2.file_type().is_symlink(),
            "Symlink mismatch for {}",
            relative
        );

        if meta1.file_type().is_symlink() {
            assert_eq!(
                std::fs::read_link(&path1)?,
                std::fs::read_link(&path2)?,
                "Link target mismatch for {}",
                relative
            );
        } else if meta1.is_file() {
            assert_eq!(
                std::fs::read(&path1)?,
                std::fs::read(&path2)?,
                "Content mismatch for {}",
                relative
            );
        }
    }

    Ok(())
}

/// Asserts that a file has specific permissions (Unix only)
#[cfg(unix)]
pub fn assert_file_permissions(path: &Path, expected: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = std::fs::metadata(path)?;
    let mode = metadata.permissions().mode() & 0o777;

    assert_eq!(
        mode, expected,
        "Permission mismatch for {:?}: expected {:o}, got {:o}",
        path, expected, mode
    );

    Ok(())
}

/// Asserts that the modification time of `path` is within `tolerance` seconds of `expected`
pub fn assert_mtime_near(path: &Path, expected: i64, tolerance: i64) -> Result<()> {
    let metadata = std::fs::symlink_metadata(path)?;
    let actual = filetime::FileTime::from_last_modification_time(&metadata).unix_seconds();

    assert!(
        (actual - expected).abs() <= tolerance,
        "mtime mismatch for {:?}: expected {} +/- {}, got {}",
        path,
        expected,
        tolerance,
        actual
    );

    Ok(())
}

/// Every path below `dir`, relative and `/`-separated, sorted
pub fn relative_paths(dir: &Path) -> Result<Vec<String>> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).follow_links(false) {
        let entry = entry?;
        let relative = entry.path().strip_prefix(dir)?;
        let parts: Vec<_> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        entries.push(parts.join("/"));
    }

    entries.sort();
    Ok(entries)
}
