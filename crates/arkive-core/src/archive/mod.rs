//! Archive operations module
//!
//! One backend per format family sits behind the [`Extractor`] and [`Packer`]
//! traits. The factory functions here are the only place that maps an
//! [`ArchiveFormat`] to a concrete backend.

pub mod extractor;
pub mod filter;
pub mod packer;
pub(crate) mod session;
pub mod sevenz;
pub mod tar;
pub mod zip;

pub use extractor::{
    ConflictAction, ConflictHandler, Extractor, OverwriteConflictHandler, SkipConflictHandler,
};
pub use filter::MemberFilter;
pub use packer::{estimate_compressed_size, validate_inputs, Packer};

use crate::detect::detect_format;
use crate::format::{ArchiveFormat, FormatFamily};
use crate::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Create the extractor serving `format`
pub fn create_extractor(format: ArchiveFormat) -> Box<dyn Extractor> {
    match format.family() {
        FormatFamily::Zip => Box::new(zip::ZipExtractor::new()),
        FormatFamily::Tar(filter) => Box::new(tar::TarExtractor::new(filter)),
        FormatFamily::SevenZip => Box::new(sevenz::SevenZExtractor::new()),
    }
}

/// Create the packer serving `format`
pub fn create_packer(format: ArchiveFormat) -> Box<dyn Packer> {
    match format.family() {
        FormatFamily::Zip => Box::new(zip::ZipPacker::new()),
        FormatFamily::Tar(filter) => Box::new(tar::TarPacker::new(filter)),
        FormatFamily::SevenZip => Box::new(sevenz::SevenZPacker::new()),
    }
}

/// Detect the format of `path` and create a matching extractor
///
/// A file that cannot be classified is reported as an error rather than a
/// fallback backend.
pub fn create_extractor_auto(path: &Path) -> Result<Box<dyn Extractor>> {
    let format = detect_format(path)?;
    info!(?path, %format, "Detected archive format");
    Ok(create_extractor(format))
}

/// Hoist the contents of a single subdirectory to the parent directory
///
/// If `output_dir` contains exactly one entry and it is a directory, its
/// children are moved up one level and the now-empty directory is removed.
pub fn hoist_single_directory(output_dir: &Path) -> Result<()> {
    if !output_dir.exists() {
        return Ok(());
    }

    let io_err = |e: std::io::Error, p: &Path| Error::io(e, p.display());
    let entries: Vec<_> = fs::read_dir(output_dir)
        .map_err(|e| io_err(e, output_dir))?
        .filter_map(|e| e.ok())
        .collect();

    let [entry] = entries.as_slice() else {
        debug!(count = entries.len(), "Nothing to hoist");
        return Ok(());
    };
    let single = entry.path();
    if !single.is_dir() {
        return Ok(());
    }

    info!("Found single directory to hoist: {:?}", single);

    // Move the folder aside first so a child with the same name can take its place
    let staging = unique_filename(&output_dir.join(format!(
        ".{}.hoist",
        entry.file_name().to_string_lossy()
    )));
    fs::rename(&single, &staging).map_err(|e| io_err(e, &single))?;

    for child in fs::read_dir(&staging).map_err(|e| io_err(e, &staging))? {
        let source = child.map_err(|e| io_err(e, &staging))?.path();
        let Some(name) = source.file_name() else {
            continue;
        };
        let dest = output_dir.join(name);
        debug!("Moving {:?} to {:?}", source, dest);
        fs::rename(&source, &dest).map_err(|e| io_err(e, &source))?;
    }

    fs::remove_dir(&staging).map_err(|e| io_err(e, &staging))?;
    info!("Removed empty directory: {:?}", single);
    Ok(())
}

/// Get a unique filename by appending a number: `name (1).ext`, `name (2).ext`, ...
pub fn unique_filename(path: &Path) -> PathBuf {
    let stem = path.file_stem().unwrap_or_default().to_string_lossy();
    let extension = path.extension().map(|e| e.to_string_lossy());
    let parent = path.parent().unwrap_or(Path::new(""));

    (1u64..)
        .map(|counter| {
            let name = match &extension {
                Some(ext) => format!("{} ({}).{}", stem, counter, ext),
                None => format!("{} ({})", stem, counter),
            };
            parent.join(name)
        })
        .find(|candidate| candidate.symlink_metadata().is_err())
        .unwrap_or_else(|| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_factory_matches_format() {
        for &format in ArchiveFormat::all() {
            let extractor = create_extractor(format);
            assert!(extractor.supports_format(format));
            let packer = create_packer(format);
            assert!(packer.supports_format(format));
        }
        assert!(!create_extractor(ArchiveFormat::Zip).supports_format(ArchiveFormat::TarGz));
        assert!(create_extractor(ArchiveFormat::TarGz).supports_format(ArchiveFormat::TarXz));
    }

    #[test]
    fn test_auto_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let result = create_extractor_auto(&temp_dir.path().join("nope.zip"));
        assert!(matches!(result, Err(Error::FileNotFound(_))));
    }

    #[test]
    fn test_unique_filename() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("report.txt");
        fs::write(&path, b"1").unwrap();
        assert_eq!(unique_filename(&path), temp_dir.path().join("report (1).txt"));

        fs::write(temp_dir.path().join("report (1).txt"), b"2").unwrap();
        assert_eq!(unique_filename(&path), temp_dir.path().join("report (2).txt"));

        let bare = temp_dir.path().join("Makefile");
        assert_eq!(unique_filename(&bare), temp_dir.path().join("Makefile (1)"));
    }

    #[test]
    fn test_hoist_single_directory() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("project/src")).unwrap();
        fs::write(root.join("project/README.md"), b"hi").unwrap();
        fs::write(root.join("project/src/lib.rs"), b"").unwrap();

        hoist_single_directory(root).unwrap();

        assert!(root.join("README.md").is_file());
        assert!(root.join("src/lib.rs").is_file());
        assert!(!root.join("project").exists());
    }

    #[test]
    fn test_hoist_child_with_same_name() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("pkg/pkg")).unwrap();
        fs::write(root.join("pkg/pkg/mod.rs"), b"").unwrap();

        hoist_single_directory(root).unwrap();

        assert!(root.join("pkg/mod.rs").is_file());
        assert_eq!(fs::read_dir(root).unwrap().count(), 1);
    }

    #[test]
    fn test_hoist_skips_multiple_entries() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir(root.join("a")).unwrap();
        fs::write(root.join("b.txt"), b"").unwrap();

        hoist_single_directory(root).unwrap();

        assert!(root.join("a").is_dir());
        assert!(root.join("b.txt").is_file());
    }
}
