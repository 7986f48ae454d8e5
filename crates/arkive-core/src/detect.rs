//! Archive format detection
//!
//! Content wins over the file name: magic bytes are checked first and the
//! extension is only consulted when no signature matches.

use crate::format::ArchiveFormat;
use crate::{Error, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Bytes needed to reach the end of the ustar marker at offset 257
pub const PROBE_LEN: usize = 262;

/// Files shorter than this cannot hold any signature
const MIN_ARCHIVE_LEN: usize = 2;

const USTAR_OFFSET: usize = 257;
const USTAR_MAGIC: &[u8] = b"ustar";

/// Magic-byte signatures in priority order
const SIGNATURES: &[(&[u8], ArchiveFormat)] = &[
    (&[0x50, 0x4B, 0x03, 0x04], ArchiveFormat::Zip),
    (&[0x50, 0x4B, 0x05, 0x06], ArchiveFormat::Zip),
    (&[0x50, 0x4B, 0x07, 0x08], ArchiveFormat::Zip),
    (&[0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C], ArchiveFormat::SevenZip),
    (&[0x1F, 0x8B], ArchiveFormat::TarGz),
    (&[0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00], ArchiveFormat::TarXz),
    (&[0x28, 0xB5, 0x2F, 0xFD], ArchiveFormat::TarZstd),
];

/// Extensions in matching order; compound suffixes come before single ones
const EXTENSIONS: &[(&str, ArchiveFormat)] = &[
    (".tar.gz", ArchiveFormat::TarGz),
    (".tar.xz", ArchiveFormat::TarXz),
    (".tar.zst", ArchiveFormat::TarZstd),
    (".tar.zstd", ArchiveFormat::TarZstd),
    (".tgz", ArchiveFormat::TarGz),
    (".txz", ArchiveFormat::TarXz),
    (".tzst", ArchiveFormat::TarZstd),
    (".zip", ArchiveFormat::Zip),
    (".7z", ArchiveFormat::SevenZip),
];

/// Result of looking at the leading bytes of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sniffed {
    /// A supported signature matched
    Format(ArchiveFormat),
    /// An uncompressed TAR stream
    PlainTar,
    /// Nothing recognizable
    Unknown,
}

/// Classify a byte prefix
///
/// Works on prefixes shorter than [`PROBE_LEN`]; signatures that do not fit
/// are simply not matched.
pub fn sniff(header: &[u8]) -> Sniffed {
    for (magic, format) in SIGNATURES {
        if header.starts_with(magic) {
            return Sniffed::Format(*format);
        }
    }

    if header.len() >= USTAR_OFFSET + USTAR_MAGIC.len()
        && &header[USTAR_OFFSET..USTAR_OFFSET + USTAR_MAGIC.len()] == USTAR_MAGIC
    {
        return Sniffed::PlainTar;
    }

    Sniffed::Unknown
}

/// Match a path against the known extensions, case-insensitively
pub fn format_from_extension(path: &Path) -> Option<ArchiveFormat> {
    let name = path.file_name()?.to_string_lossy().to_ascii_lowercase();
    EXTENSIONS
        .iter()
        .find(|(suffix, _)| name.ends_with(suffix))
        .map(|(_, format)| *format)
}

/// Detect the format of the file at `path`
///
/// # Errors
///
/// * [`Error::FileNotFound`] when the path does not exist
/// * [`Error::CorruptedArchive`] for empty or near-empty files
/// * [`Error::UnsupportedFormat`] for uncompressed TAR and unknown files
pub fn detect_format(path: &Path) -> Result<ArchiveFormat> {
    if !path.exists() {
        return Err(Error::FileNotFound(path.display().to_string()));
    }

    let file = File::open(path).map_err(|e| Error::io(e, path.display()))?;
    let mut header = Vec::with_capacity(PROBE_LEN);
    file.take(PROBE_LEN as u64)
        .read_to_end(&mut header)
        .map_err(|e| Error::io(e, path.display()))?;

    if header.len() < MIN_ARCHIVE_LEN {
        return Err(Error::CorruptedArchive(format!(
            "{} is too small to be an archive ({} bytes)",
            path.display(),
            header.len()
        )));
    }

    match sniff(&header) {
        Sniffed::Format(format) => {
            debug!(?path, %format, "Detected format from magic bytes");
            Ok(format)
        }
        Sniffed::PlainTar => Err(Error::UnsupportedFormat(format!(
            "{} is an uncompressed TAR archive, which is not supported",
            path.display()
        ))),
        Sniffed::Unknown => match format_from_extension(path) {
            Some(format) => {
                debug!(?path, %format, "Detected format from extension");
                Ok(format)
            }
            None => Err(Error::UnsupportedFormat(
                path.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string()),
            )),
        },
    }
}
