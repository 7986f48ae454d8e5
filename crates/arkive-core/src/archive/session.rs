//! Per-call extraction state shared by every backend
//!
//! A backend enumerates members in its native order and hands each one to an
//! [`Extraction`], which applies cancellation, filtering, path safety, the
//! overwrite policy, progress reporting and metadata preservation the same way
//! for every format.

use super::extractor::ConflictAction;
use super::filter::MemberFilter;
use super::{hoist_single_directory, unique_filename};
use crate::metadata::FileMetadata;
use crate::model::{ArchiveEntry, ExtractOptions, ExtractResult, OverwritePolicy};
use crate::progress::{Callbacks, CancelToken};
use crate::security::{sanitize_path, validate_symlink};
use crate::{Error, Result};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Where a member should go
#[derive(Debug)]
pub(crate) enum Target {
    /// Leave the member alone
    Skip,
    /// Write the member to this path
    Write(PathBuf),
}

pub(crate) struct Extraction<'a> {
    output_dir: PathBuf,
    options: &'a ExtractOptions,
    filter: MemberFilter,
    callbacks: Callbacks<'a>,
    cancel: CancelToken,
    result: ExtractResult,
    started: Instant,
    total: u64,
    sticky: Option<ConflictAction>,
    deferred_dirs: Vec<(PathBuf, FileMetadata)>,
    hoist: bool,
}

impl<'a> Extraction<'a> {
    /// Check the archive and prepare `output_dir`
    pub(crate) fn start(
        archive: &Path,
        output_dir: &Path,
        options: &'a ExtractOptions,
        filter: MemberFilter,
        callbacks: Callbacks<'a>,
        cancel: CancelToken,
    ) -> Result<Self> {
        if !archive.is_file() {
            return Err(Error::FileNotFound(archive.display().to_string()));
        }

        fs::create_dir_all(output_dir).map_err(|e| Error::io(e, output_dir.display()))?;
        let output_dir =
            fs::canonicalize(output_dir).map_err(|e| Error::io(e, output_dir.display()))?;

        let was_empty = fs::read_dir(&output_dir)
            .map_err(|e| Error::io(e, output_dir.display()))?
            .next()
            .is_none();
        if options.hoist_single_folder && !was_empty {
            debug!(?output_dir, "Output directory is not empty, hoisting disabled");
        }

        info!(?archive, ?output_dir, "Extracting archive");

        Ok(Self {
            hoist: options.hoist_single_folder && was_empty,
            output_dir,
            options,
            filter,
            callbacks,
            cancel,
            result: ExtractResult::default(),
            started: Instant::now(),
            total: 0,
            sticky: None,
            deferred_dirs: Vec::new(),
        })
    }

    /// Total used as the denominator of progress updates
    pub(crate) fn set_total(&mut self, total: u64) {
        self.total = total;
    }

    pub(crate) fn password(&self) -> Option<&str> {
        self.options.password.as_deref()
    }

    /// Decide what to do with `entry`
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationCancelled`] when cancellation was requested or
    /// the conflict handler aborted. Every other problem is reported as a
    /// skipped member.
    pub(crate) fn plan(&mut self, entry: &ArchiveEntry) -> Result<Target> {
        self.cancel.check()?;

        if !self.filter.is_selected(&entry.path) {
            debug!(member = %entry.path, "Not selected");
            return Ok(Target::Skip);
        }

        let dest = match sanitize_path(&self.output_dir, Path::new(&entry.path)) {
            Ok(dest) => dest,
            Err(e) => {
                self.skip(&entry.path, e);
                return Ok(Target::Skip);
            }
        };

        if entry.is_directory || dest.symlink_metadata().is_err() {
            return Ok(Target::Write(dest));
        }

        if dest.is_dir() {
            self.skip(
                &entry.path,
                Error::CompressionFailure(format!("a directory exists at {}", dest.display())),
            );
            return Ok(Target::Skip);
        }

        match self.resolve_conflict(entry, &dest) {
            ConflictAction::Overwrite | ConflictAction::OverwriteAll => {
                debug!(?dest, "Overwriting existing file");
                Ok(Target::Write(dest))
            }
            ConflictAction::Skip | ConflictAction::SkipAll => {
                info!("Skipping existing file: {:?}", dest);
                self.result.skipped_files.push(entry.path.clone());
                Ok(Target::Skip)
            }
            ConflictAction::Rename => {
                let renamed = unique_filename(&dest);
                info!("Renaming to avoid conflict: {:?}", renamed);
                Ok(Target::Write(renamed))
            }
            ConflictAction::Abort => {
                warn!(member = %entry.path, "Extraction aborted by user");
                Err(Error::OperationCancelled)
            }
        }
    }

    fn resolve_conflict(&mut self, entry: &ArchiveEntry, dest: &Path) -> ConflictAction {
        match self.options.overwrite {
            OverwritePolicy::Skip => ConflictAction::Skip,
            OverwritePolicy::Overwrite => ConflictAction::Overwrite,
            OverwritePolicy::Prompt => {
                if let Some(action) = self.sticky {
                    return action;
                }
                let action = self.callbacks.conflict(entry, dest);
                if matches!(action, ConflictAction::OverwriteAll | ConflictAction::SkipAll) {
                    self.sticky = Some(action);
                }
                action
            }
        }
    }

    pub(crate) fn create_dir(&mut self, dest: &Path, entry: &ArchiveEntry) {
        match fs::create_dir_all(dest) {
            Ok(()) => self.deferred_dirs.push((dest.to_path_buf(), member_metadata(entry))),
            Err(e) => self.skip(&entry.path, Error::io(e, dest.display())),
        }
    }

    /// Stream a regular file member to `dest`
    ///
    /// Failures on the output side are reported and skipped. A failure reading
    /// the member is returned so the backend can decide whether the archive
    /// stream is still usable; the partial file is removed and the member is
    /// listed as skipped either way.
    pub(crate) fn write_file(
        &mut self,
        dest: &Path,
        entry: &ArchiveEntry,
        reader: &mut dyn Read,
    ) -> Result<()> {
        let mut file = match self.prepare_destination(dest).and_then(|()| {
            File::create(dest).map_err(|e| Error::io(e, dest.display()))
        }) {
            Ok(file) => file,
            Err(e) => {
                self.skip(&entry.path, e);
                return Ok(());
            }
        };

        debug!("Extracting: {:?}", entry.path);
        let copied = copy_member(reader, &mut file).and_then(|n| {
            file.flush().map_err(CopyError::Write)?;
            Ok(n)
        });
        drop(file);

        match copied {
            Ok(bytes) => {
                self.apply_metadata(dest, entry);
                self.result.files_extracted += 1;
                self.result.bytes_extracted += bytes;
                Ok(())
            }
            Err(CopyError::Write(e)) => {
                fs::remove_file(dest).ok();
                self.skip(&entry.path, Error::io(e, dest.display()));
                Ok(())
            }
            Err(CopyError::Read(e)) => {
                fs::remove_file(dest).ok();
                self.result.skipped_files.push(entry.path.clone());
                Err(Error::CorruptedArchive(format!("{}: {}", entry.path, e)))
            }
        }
    }

    /// Create a symbolic link whose target stays inside the output directory
    pub(crate) fn create_symlink(&mut self, dest: &Path, entry: &ArchiveEntry, target: &Path) {
        if let Err(e) = validate_symlink(&self.output_dir, dest, target) {
            self.skip(&entry.path, e);
            return;
        }
        if let Err(e) = self.prepare_destination(dest) {
            self.skip(&entry.path, e);
            return;
        }

        #[cfg(unix)]
        {
            debug!("Creating symlink: {:?} -> {:?}", dest, target);
            match std::os::unix::fs::symlink(target, dest) {
                Ok(()) => self.result.files_extracted += 1,
                Err(e) => self.skip(&entry.path, Error::io(e, dest.display())),
            }
        }

        #[cfg(not(unix))]
        {
            warn!(
                "Symlinks are not supported on this platform, skipping: {:?}",
                dest
            );
            self.result.skipped_files.push(entry.path.clone());
        }
    }

    /// Create a hard link to a previously extracted member
    pub(crate) fn create_hard_link(&mut self, dest: &Path, entry: &ArchiveEntry, target: &str) {
        let linked = sanitize_path(&self.output_dir, Path::new(target))
            .and_then(|source| {
                self.prepare_destination(dest)?;
                fs::hard_link(&source, dest).map_err(|e| Error::io(e, dest.display()))
            });
        match linked {
            Ok(()) => self.result.files_extracted += 1,
            Err(e) => self.skip(&entry.path, e),
        }
    }

    /// Record a non-fatal member failure and carry on
    pub(crate) fn skip(&mut self, member: &str, err: Error) {
        warn!(member, error = %err, "Skipping member");
        self.callbacks.error(member, &err);
        self.result.skipped_files.push(member.to_string());
    }

    /// Report a non-fatal problem without skipping the member
    pub(crate) fn report(&mut self, member: &str, err: &Error) {
        warn!(member, error = %err, "Non-fatal error");
        self.callbacks.error(member, err);
    }

    /// Emit a progress update after `member`
    pub(crate) fn advance(&mut self, member: &str, processed: u64) {
        self.callbacks.progress(member, processed, self.total);
    }

    pub(crate) fn finish(mut self, outcome: Result<()>) -> ExtractResult {
        for (dir, metadata) in self.deferred_dirs.iter().rev() {
            if let Err(e) = metadata.apply_to_path(
                dir,
                self.options.preserve_permissions,
                self.options.preserve_timestamps,
            ) {
                debug!("Failed to set metadata on {:?}: {}", dir, e);
            }
        }

        if outcome.is_ok() && self.hoist {
            if let Err(e) = hoist_single_directory(&self.output_dir) {
                info!("Directory hoisting failed: {}", e);
                self.callbacks.error("", &e);
            }
        }

        let elapsed = self.started.elapsed();
        match &outcome {
            Ok(()) => info!(
                files = self.result.files_extracted,
                bytes = self.result.bytes_extracted,
                skipped = self.result.skipped_files.len(),
                "Successfully extracted archive"
            ),
            Err(e) => warn!(
                files = self.result.files_extracted,
                error = %e,
                "Extraction stopped early"
            ),
        }
        self.result.finish(outcome, elapsed)
    }

    /// Create parent directories and clear a stale file or link at `dest`
    fn prepare_destination(&self, dest: &Path) -> Result<()> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(e, parent.display()))?;
        }
        match dest.symlink_metadata() {
            Ok(meta) if !meta.is_dir() => {
                fs::remove_file(dest).map_err(|e| Error::io(e, dest.display()))
            }
            _ => Ok(()),
        }
    }

    fn apply_metadata(&mut self, dest: &Path, entry: &ArchiveEntry) {
        let metadata = member_metadata(entry);
        if let Err(e) = metadata.apply_to_path(
            dest,
            self.options.preserve_permissions,
            self.options.preserve_timestamps,
        ) {
            self.report(&entry.path, &Error::io(e, dest.display()));
        }
    }
}

/// Result for an operation that failed before any member was touched
pub(crate) fn failed(err: Error) -> ExtractResult {
    warn!(error = %err, "Extraction failed");
    ExtractResult::default().finish(Err(err), Duration::ZERO)
}

fn member_metadata(entry: &ArchiveEntry) -> FileMetadata {
    FileMetadata {
        mode: entry.permissions,
        mtime: entry.modified,
    }
}

pub(crate) enum CopyError {
    Read(io::Error),
    Write(io::Error),
}

/// `io::copy` that keeps read and write failures apart
pub(crate) fn copy_member(
    reader: &mut dyn Read,
    writer: &mut dyn Write,
) -> std::result::Result<u64, CopyError> {
    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => return Ok(total),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(CopyError::Read(e)),
        };
        writer.write_all(&buffer[..n]).map_err(CopyError::Write)?;
        total += n as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::InvalidData, "bad block"))
        }
    }

    /// Fails the way a checksum-verifying codec reader does
    struct ChecksumReader {
        sent: bool,
    }

    impl Read for ChecksumReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.sent {
                return Err(io::Error::new(io::ErrorKind::Other, "Invalid checksum"));
            }
            self.sent = true;
            buf[..4].copy_from_slice(b"data");
            Ok(4)
        }
    }

    fn session<'a>(archive: &Path, out: &Path, options: &'a ExtractOptions) -> Extraction<'a> {
        Extraction::start(
            archive,
            out,
            options,
            MemberFilter::default(),
            Callbacks::new(),
            CancelToken::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_read_failure_removes_partial_file() {
        let temp_dir = TempDir::new().unwrap();
        let archive = temp_dir.path().join("a.zip");
        fs::write(&archive, b"x").unwrap();
        let out = temp_dir.path().join("out");
        let options = ExtractOptions::default();
        let mut extraction = session(&archive, &out, &options);

        let entry = ArchiveEntry::new("broken.bin", false);
        let Target::Write(dest) = extraction.plan(&entry).unwrap() else {
            panic!("expected a write target");
        };
        let err = extraction
            .write_file(&dest, &entry, &mut FailingReader)
            .unwrap_err();

        assert!(matches!(err, Error::CorruptedArchive(_)));
        assert!(!dest.exists());
        let result = extraction.finish(Err(err));
        assert_eq!(result.skipped_files, vec!["broken.bin".to_string()]);
        assert!(!result.success);
    }

    #[test]
    fn test_checksum_failure_is_corruption() {
        let temp_dir = TempDir::new().unwrap();
        let archive = temp_dir.path().join("a.zip");
        fs::write(&archive, b"x").unwrap();
        let out = temp_dir.path().join("out");
        let options = ExtractOptions::default();
        let mut extraction = session(&archive, &out, &options);

        let entry = ArchiveEntry::new("crc.bin", false);
        let Target::Write(dest) = extraction.plan(&entry).unwrap() else {
            panic!("expected a write target");
        };
        let err = extraction
            .write_file(&dest, &entry, &mut ChecksumReader { sent: false })
            .unwrap_err();

        match err {
            Error::CorruptedArchive(msg) => assert!(msg.contains("crc.bin"), "{}", msg),
            other => panic!("expected CorruptedArchive, got {:?}", other),
        }
        assert!(!dest.exists());
    }

    #[test]
    fn test_traversal_member_is_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let archive = temp_dir.path().join("a.tar.gz");
        fs::write(&archive, b"x").unwrap();
        let out = temp_dir.path().join("out");
        let options = ExtractOptions::default();
        let mut extraction = session(&archive, &out, &options);

        let entry = ArchiveEntry::new("../escape.txt", false);
        assert!(matches!(extraction.plan(&entry).unwrap(), Target::Skip));
        let result = extraction.finish(Ok(()));
        assert!(result.success);
        assert_eq!(result.skipped_files, vec!["../escape.txt".to_string()]);
    }

    #[test]
    fn test_cancelled_before_member() {
        let temp_dir = TempDir::new().unwrap();
        let archive = temp_dir.path().join("a.zip");
        fs::write(&archive, b"x").unwrap();
        let options = ExtractOptions::default();
        let cancel = CancelToken::new();
        let mut extraction = Extraction::start(
            &archive,
            &temp_dir.path().join("out"),
            &options,
            MemberFilter::default(),
            Callbacks::new(),
            cancel.clone(),
        )
        .unwrap();

        cancel.cancel();
        let err = extraction.plan(&ArchiveEntry::new("a.txt", false)).unwrap_err();
        assert_eq!(err, Error::OperationCancelled);
    }

    #[test]
    fn test_missing_archive_fails_start() {
        let temp_dir = TempDir::new().unwrap();
        let options = ExtractOptions::default();
        let result = Extraction::start(
            &temp_dir.path().join("missing.zip"),
            temp_dir.path(),
            &options,
            MemberFilter::default(),
            Callbacks::new(),
            CancelToken::new(),
        );
        assert!(matches!(result, Err(Error::FileNotFound(_))));
    }
}
