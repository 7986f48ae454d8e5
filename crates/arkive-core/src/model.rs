//! Value objects shared by every backend
//!
//! Options, archive snapshots and operation results are created fresh per call
//! and owned by the caller. Nothing here holds state across calls.

use crate::format::ArchiveFormat;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Archive-level creation time for formats that do not record one
pub const UNKNOWN_CREATION_TIME: &str = "unknown";

/// Pack options for archive creation
///
/// Fields are private so the compression level can only be set through
/// [`PackOptions::with_level`], which rejects levels outside the format's range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackOptions {
    format: ArchiveFormat,
    level: u32,
    threads: Option<usize>,
    preserve_permissions: bool,
    preserve_timestamps: bool,
    #[serde(skip)]
    password: Option<String>,
}

impl PackOptions {
    /// Options for `format` with its default level
    pub fn new(format: ArchiveFormat) -> Self {
        Self {
            format,
            level: format.default_level(),
            threads: None,
            preserve_permissions: true,
            preserve_timestamps: true,
            password: None,
        }
    }

    /// Set the compression level
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOptions`] when `level` is outside
    /// [`ArchiveFormat::level_range`].
    pub fn with_level(mut self, level: u32) -> Result<Self> {
        self.level = self.format.check_level(level)?;
        Ok(self)
    }

    /// Worker-thread hint forwarded to codecs that support it
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = (threads > 0).then_some(threads);
        self
    }

    pub fn preserve_permissions(mut self, preserve: bool) -> Self {
        self.preserve_permissions = preserve;
        self
    }

    pub fn preserve_timestamps(mut self, preserve: bool) -> Self {
        self.preserve_timestamps = preserve;
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn format(&self) -> ArchiveFormat {
        self.format
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn threads(&self) -> Option<usize> {
        self.threads
    }

    pub fn permissions_preserved(&self) -> bool {
        self.preserve_permissions
    }

    pub fn timestamps_preserved(&self) -> bool {
        self.preserve_timestamps
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }
}

/// What to do when an extracted file already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverwritePolicy {
    /// Keep the existing file and report the member as skipped
    #[default]
    Skip,
    /// Replace the existing file
    Overwrite,
    /// Ask the caller's conflict handler
    Prompt,
}

impl std::str::FromStr for OverwritePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "skip" => Ok(OverwritePolicy::Skip),
            "overwrite" => Ok(OverwritePolicy::Overwrite),
            "prompt" | "ask" => Ok(OverwritePolicy::Prompt),
            _ => Err(Error::InvalidOptions(format!(
                "unknown overwrite policy '{}'",
                s
            ))),
        }
    }
}

/// Extract options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Policy for files that already exist in the output directory
    pub overwrite: OverwritePolicy,
    /// If the archive contains a single folder, hoist its contents to the output directory
    pub hoist_single_folder: bool,
    pub preserve_permissions: bool,
    pub preserve_timestamps: bool,
    /// Password for encrypted members
    pub password: Option<String>,
    /// Glob patterns a member must match (empty = everything)
    pub include_patterns: Vec<String>,
    /// Glob patterns that exclude a member; exclusion wins
    pub exclude_patterns: Vec<String>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            overwrite: OverwritePolicy::Skip,
            hoist_single_folder: false,
            preserve_permissions: true,
            preserve_timestamps: true,
            password: None,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
        }
    }
}

/// Read-only snapshot of an archive
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArchiveInfo {
    /// Canonical path of the archive file
    pub path: PathBuf,
    pub format: ArchiveFormat,
    /// Size of the archive file on disk
    pub compressed_size: u64,
    /// Sum of member sizes. May be smaller than `compressed_size`.
    pub uncompressed_size: u64,
    /// Number of non-directory members
    pub file_count: u64,
    pub is_encrypted: bool,
    /// Best-effort creation time, [`UNKNOWN_CREATION_TIME`] when not stored
    pub created: String,
}

/// One archive member
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveEntry {
    /// Final path component
    pub name: String,
    /// Path within the archive, `/`-separated, without a trailing slash
    pub path: String,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub is_directory: bool,
    /// Modification time (Unix timestamp)
    pub modified: Option<i64>,
    /// Unix permission bits (if available)
    pub permissions: Option<u32>,
    pub crc32: Option<u32>,
    pub is_encrypted: bool,
    pub is_symlink: bool,
    /// Link target (for symlinks)
    pub link_target: Option<String>,
}

impl ArchiveEntry {
    /// Build an entry from a raw member path; directories get zero sizes
    pub fn new(raw_path: &str, is_directory: bool) -> Self {
        let path = normalize_member_path(raw_path);
        let name = path.rsplit('/').next().unwrap_or_default().to_string();
        Self {
            name,
            path,
            compressed_size: 0,
            uncompressed_size: 0,
            is_directory,
            modified: None,
            permissions: None,
            crc32: None,
            is_encrypted: false,
            is_symlink: false,
            link_target: None,
        }
    }

    /// Set sizes unless this is a directory
    pub fn with_sizes(mut self, compressed: u64, uncompressed: u64) -> Self {
        if !self.is_directory {
            self.compressed_size = compressed;
            self.uncompressed_size = uncompressed;
        }
        self
    }

    /// Size to display; `None` for directories
    pub fn display_size(&self) -> Option<u64> {
        (!self.is_directory).then_some(self.uncompressed_size)
    }
}

/// Normalize a member path to `/` separators with no leading `./` or trailing `/`
pub(crate) fn normalize_member_path(raw: &str) -> String {
    let unified = raw.replace('\\', "/");
    let trimmed = unified.trim_end_matches('/');
    trimmed
        .strip_prefix("./")
        .unwrap_or(trimmed)
        .to_string()
}

/// Outcome of one pack call
#[derive(Debug, Clone, Default, Serialize)]
pub struct PackResult {
    pub success: bool,
    pub error_message: Option<String>,
    #[serde(skip)]
    pub error: Option<Error>,
    pub files_processed: u64,
    pub bytes_processed: u64,
    pub elapsed: Duration,
}

impl PackResult {
    pub(crate) fn finish(mut self, outcome: Result<()>, elapsed: Duration) -> Self {
        self.elapsed = elapsed;
        match outcome {
            Ok(()) => self.success = true,
            Err(err) => {
                self.success = false;
                self.error_message = Some(err.to_string());
                self.error = Some(err);
            }
        }
        self
    }
}

/// Outcome of one extract call
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractResult {
    pub success: bool,
    pub error_message: Option<String>,
    #[serde(skip)]
    pub error: Option<Error>,
    pub files_extracted: u64,
    pub bytes_extracted: u64,
    pub elapsed: Duration,
    /// Members left untouched because of conflicts or non-fatal errors
    pub skipped_files: Vec<String>,
}

impl ExtractResult {
    pub(crate) fn finish(mut self, outcome: Result<()>, elapsed: Duration) -> Self {
        self.elapsed = elapsed;
        match outcome {
            Ok(()) => self.success = true,
            Err(err) => {
                self.success = false;
                self.error_message = Some(err.to_string());
                self.error = Some(err);
            }
        }
        self
    }
}
