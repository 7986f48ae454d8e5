//! Extractor trait for archive operations

use crate::format::ArchiveFormat;
use crate::model::{ArchiveEntry, ArchiveInfo, ExtractOptions, ExtractResult, UNKNOWN_CREATION_TIME};
use crate::progress::{Callbacks, CancelToken};
use crate::{Error, Result};
use std::fs;
use std::path::Path;

/// Trait for archive extractors
///
/// One instance supports at most one operation at a time. Extraction-family
/// operations report failure through [`ExtractResult`] so partial counters
/// survive; query operations return a typed error.
pub trait Extractor: Send + Sync {
    /// Extract every member of `archive` into `output_dir`
    fn extract(
        &self,
        archive: &Path,
        output_dir: &Path,
        options: &ExtractOptions,
        callbacks: Callbacks<'_>,
    ) -> ExtractResult;

    /// Extract only members matching at least one of `patterns`
    ///
    /// Non-matching members are passed over silently; they are not reported
    /// as skipped.
    fn extract_partial(
        &self,
        archive: &Path,
        output_dir: &Path,
        patterns: &[String],
        options: &ExtractOptions,
        callbacks: Callbacks<'_>,
    ) -> ExtractResult;

    /// List all members without writing anything to disk
    fn list_contents(&self, archive: &Path, password: Option<&str>) -> Result<Vec<ArchiveEntry>>;

    /// Aggregate archive-level information
    fn archive_info(&self, archive: &Path, password: Option<&str>) -> Result<ArchiveInfo> {
        let entries = self.list_contents(archive, password)?;
        let format = self.detect_format(archive)?;
        summarize(archive, format, &entries, UNKNOWN_CREATION_TIME.to_string())
    }

    /// Read every member's data to detect corruption
    fn verify_integrity(&self, archive: &Path, password: Option<&str>) -> Result<()>;

    /// Format of `archive` as seen by this backend
    fn detect_format(&self, archive: &Path) -> Result<ArchiveFormat>;

    /// Request cancellation; takes effect at the next member boundary
    fn cancel(&self) {
        self.cancel_token().cancel();
    }

    /// Token shared with the running operation, usable from other threads
    fn cancel_token(&self) -> CancelToken;

    fn supports_format(&self, format: ArchiveFormat) -> bool;

    /// Get the format name for this extractor
    fn format_name(&self) -> &'static str;
}

/// Build an [`ArchiveInfo`] from listed entries
pub(crate) fn summarize(
    archive: &Path,
    format: ArchiveFormat,
    entries: &[ArchiveEntry],
    created: String,
) -> Result<ArchiveInfo> {
    let path = fs::canonicalize(archive).map_err(|e| Error::io(e, archive.display()))?;
    let compressed_size = fs::metadata(&path)
        .map_err(|e| Error::io(e, path.display()))?
        .len();

    let files = entries.iter().filter(|e| !e.is_directory);
    Ok(ArchiveInfo {
        path,
        format,
        compressed_size,
        uncompressed_size: files.clone().map(|e| e.uncompressed_size).sum(),
        file_count: files.count() as u64,
        is_encrypted: entries.iter().any(|e| e.is_encrypted),
        created,
    })
}

/// Conflict resolution action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictAction {
    /// Overwrite the existing file
    Overwrite,
    /// Skip this file
    Skip,
    /// Overwrite all future conflicts
    OverwriteAll,
    /// Skip all future conflicts
    SkipAll,
    /// Abort the entire extraction
    Abort,
    /// Rename the file (append number)
    Rename,
}

/// Trait for handling extraction conflicts
pub trait ConflictHandler {
    /// Called when a file already exists at the destination
    fn handle_conflict(&mut self, entry: &ArchiveEntry, existing_path: &Path) -> ConflictAction;
}

/// Default conflict handler that always skips
pub struct SkipConflictHandler;

impl ConflictHandler for SkipConflictHandler {
    fn handle_conflict(&mut self, _entry: &ArchiveEntry, _existing_path: &Path) -> ConflictAction {
        ConflictAction::Skip
    }
}

/// Conflict handler that always overwrites
pub struct OverwriteConflictHandler;

impl ConflictHandler for OverwriteConflictHandler {
    fn handle_conflict(&mut self, _entry: &ArchiveEntry, _existing_path: &Path) -> ConflictAction {
        ConflictAction::Overwrite
    }
}

impl<F> ConflictHandler for F
where
    F: FnMut(&ArchiveEntry, &Path) -> ConflictAction,
{
    fn handle_conflict(&mut self, entry: &ArchiveEntry, existing_path: &Path) -> ConflictAction {
        self(entry, existing_path)
    }
}
