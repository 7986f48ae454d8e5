//! Archive format vocabulary
//!
//! [`ArchiveFormat`] is the dispatch key used everywhere in the engine. The
//! backends group formats into families: one ZIP backend, one TAR backend
//! serving three compression filters, and one 7z backend.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

/// Supported archive formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArchiveFormat {
    /// ZIP archive (.zip)
    Zip,
    /// TAR stream with Zstandard compression (.tar.zst)
    TarZstd,
    /// TAR stream with gzip compression (.tar.gz)
    TarGz,
    /// TAR stream with XZ compression (.tar.xz)
    TarXz,
    /// 7-Zip archive (.7z)
    SevenZip,
}

/// Compression filter applied to a TAR stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TarFilter {
    Gzip,
    Xz,
    Zstd,
}

/// Backend family a format belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatFamily {
    Zip,
    Tar(TarFilter),
    SevenZip,
}

/// Ratio used by size estimation when the format is not known
pub const DEFAULT_COMPRESSION_RATIO: f64 = 0.50;

impl ArchiveFormat {
    /// Every supported format, in detection priority order
    pub fn all() -> &'static [ArchiveFormat] {
        &[
            ArchiveFormat::Zip,
            ArchiveFormat::SevenZip,
            ArchiveFormat::TarGz,
            ArchiveFormat::TarXz,
            ArchiveFormat::TarZstd,
        ]
    }

    /// Canonical short name
    pub fn name(self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::TarZstd => "tar.zst",
            ArchiveFormat::TarGz => "tar.gz",
            ArchiveFormat::TarXz => "tar.xz",
            ArchiveFormat::SevenZip => "7z",
        }
    }

    /// Canonical file extension including the leading dot
    pub fn extension(self) -> &'static str {
        match self {
            ArchiveFormat::Zip => ".zip",
            ArchiveFormat::TarZstd => ".tar.zst",
            ArchiveFormat::TarGz => ".tar.gz",
            ArchiveFormat::TarXz => ".tar.xz",
            ArchiveFormat::SevenZip => ".7z",
        }
    }

    pub fn family(self) -> FormatFamily {
        match self {
            ArchiveFormat::Zip => FormatFamily::Zip,
            ArchiveFormat::TarGz => FormatFamily::Tar(TarFilter::Gzip),
            ArchiveFormat::TarXz => FormatFamily::Tar(TarFilter::Xz),
            ArchiveFormat::TarZstd => FormatFamily::Tar(TarFilter::Zstd),
            ArchiveFormat::SevenZip => FormatFamily::SevenZip,
        }
    }

    /// Accepted compression levels for this format
    pub fn level_range(self) -> RangeInclusive<u32> {
        match self {
            ArchiveFormat::TarZstd => 1..=22,
            _ => 0..=9,
        }
    }

    /// Level used when the caller does not pick one
    pub fn default_level(self) -> u32 {
        match self {
            ArchiveFormat::TarZstd => 3,
            _ => 6,
        }
    }

    /// Approximate compressed/uncompressed ratio, used for size estimates only
    pub fn compression_ratio(self) -> f64 {
        match self {
            ArchiveFormat::Zip => 0.60,
            ArchiveFormat::TarZstd => 0.40,
            ArchiveFormat::TarGz => 0.50,
            ArchiveFormat::TarXz => 0.30,
            ArchiveFormat::SevenZip => 0.35,
        }
    }

    /// Validate a compression level against [`Self::level_range`]
    pub fn check_level(self, level: u32) -> Result<u32> {
        let range = self.level_range();
        if range.contains(&level) {
            Ok(level)
        } else {
            Err(Error::InvalidOptions(format!(
                "compression level {} is outside {}..={} for {}",
                level,
                range.start(),
                range.end(),
                self
            )))
        }
    }
}

impl TarFilter {
    pub fn format(self) -> ArchiveFormat {
        match self {
            TarFilter::Gzip => ArchiveFormat::TarGz,
            TarFilter::Xz => ArchiveFormat::TarXz,
            TarFilter::Zstd => ArchiveFormat::TarZstd,
        }
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ArchiveFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().trim_start_matches('.').to_ascii_lowercase();
        match normalized.as_str() {
            "zip" => Ok(ArchiveFormat::Zip),
            "7z" | "7zip" | "sevenzip" => Ok(ArchiveFormat::SevenZip),
            "tar.gz" | "tgz" | "targz" | "gz" | "gzip" => Ok(ArchiveFormat::TarGz),
            "tar.xz" | "txz" | "tarxz" | "xz" => Ok(ArchiveFormat::TarXz),
            "tar.zst" | "tar.zstd" | "tzst" | "tarzstd" | "zst" | "zstd" => {
                Ok(ArchiveFormat::TarZstd)
            }
            _ => Err(Error::UnsupportedFormat(format!(
                "unknown format name '{}'",
                s
            ))),
        }
    }
}
