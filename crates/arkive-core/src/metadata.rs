//! Metadata preservation utilities

use std::fs::Metadata;
use std::io;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Permission bits and modification time carried between disk and archive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileMetadata {
    /// Unix permission bits
    pub mode: Option<u32>,
    /// Modification time (Unix timestamp, seconds)
    pub mtime: Option<i64>,
}

impl FileMetadata {
    /// Extract metadata from a file without following symlinks
    pub fn from_path(path: &Path) -> io::Result<Self> {
        let metadata = path.symlink_metadata()?;
        Ok(Self::from_metadata(&metadata))
    }

    /// Extract metadata from std::fs::Metadata
    pub fn from_metadata(metadata: &Metadata) -> Self {
        Self {
            mode: mode_bits(metadata),
            mtime: metadata.modified().ok().map(system_time_to_unix),
        }
    }

    /// Modification time as a `SystemTime`
    pub fn modified(&self) -> Option<SystemTime> {
        self.mtime.map(unix_to_system_time)
    }

    /// Apply the requested parts of this metadata to `path`
    ///
    /// Permission changes are ignored on platforms without Unix modes.
    pub fn apply_to_path(
        &self,
        path: &Path,
        permissions: bool,
        timestamps: bool,
    ) -> io::Result<()> {
        if timestamps {
            if let Some(mtime) = self.mtime {
                let time = filetime::FileTime::from_unix_time(mtime, 0);
                filetime::set_file_mtime(path, time)?;
            }
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let (true, Some(mode)) = (permissions, self.mode) {
                std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode & 0o7777))?;
            }
        }
        #[cfg(not(unix))]
        {
            if permissions && self.mode.is_some() {
                debug!(?path, "Permission bits are not applied on this platform");
            }
        }

        debug!(?path, metadata = ?self, "Applied metadata");
        Ok(())
    }
}

#[cfg(unix)]
fn mode_bits(metadata: &Metadata) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    Some(metadata.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
fn mode_bits(_metadata: &Metadata) -> Option<u32> {
    None
}

pub(crate) fn system_time_to_unix(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(e) => -(e.duration().as_secs() as i64),
    }
}

pub(crate) fn unix_to_system_time(secs: i64) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::from_secs(secs as u64)
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs())
    }
}
