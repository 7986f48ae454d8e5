//! Error types for arkive-core

use std::io;
use thiserror::Error;

/// Core error types for the arkive engine
///
/// Every third-party codec error is translated into one of these kinds before
/// it leaves the engine. Payloads are plain strings so errors can be cloned into
/// result values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The file is not an archive format this engine handles
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// An input or archive path does not exist
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// The OS refused a read or write during an operation
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Archive data is truncated, malformed or fails a checksum
    #[error("Corrupted archive: {0}")]
    CorruptedArchive(String),

    /// An encrypted member could not be opened with the given password
    #[error("Invalid password: {0}")]
    InvalidPassword(String),

    /// Codec-level read/write failure
    #[error("Compression failure: {0}")]
    CompressionFailure(String),

    /// The operation observed a cancellation request
    #[error("Operation cancelled")]
    OperationCancelled,

    /// Packing was requested with an empty input list
    #[error("No input files")]
    NoInputFiles,

    /// An input exists but cannot be read
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Options rejected at construction time
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    /// Configuration-related error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Capability a backend does not offer
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),
}

impl Error {
    /// Translate an I/O error that happened while touching `context`
    pub fn io(err: io::Error, context: impl std::fmt::Display) -> Self {
        let message = format!("{}: {}", context, err);
        match err.kind() {
            io::ErrorKind::NotFound => Error::FileNotFound(message),
            io::ErrorKind::PermissionDenied => Error::PermissionDenied(message),
            io::ErrorKind::UnexpectedEof | io::ErrorKind::InvalidData => {
                Error::CorruptedArchive(message)
            }
            _ => Error::CompressionFailure(message),
        }
    }

    /// Whether this error was caused by cancellation or a user abort
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::OperationCancelled)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        // Codecs smuggle their own errors through io::Error
        if let Some(inner) = err.get_ref() {
            if let Some(zip_err) = inner.downcast_ref::<zip::result::ZipError>() {
                return Error::from_zip_ref(zip_err);
            }
        }
        match err.kind() {
            io::ErrorKind::NotFound => Error::FileNotFound(err.to_string()),
            io::ErrorKind::PermissionDenied => Error::PermissionDenied(err.to_string()),
            io::ErrorKind::UnexpectedEof | io::ErrorKind::InvalidData => {
                Error::CorruptedArchive(err.to_string())
            }
            _ => Error::CompressionFailure(err.to_string()),
        }
    }
}

impl Error {
    fn from_zip_ref(err: &zip::result::ZipError) -> Self {
        use zip::result::ZipError;
        match err {
            ZipError::InvalidPassword => Error::InvalidPassword(err.to_string()),
            ZipError::UnsupportedArchive(msg) if msg.contains("Password") => {
                Error::InvalidPassword(msg.to_string())
            }
            ZipError::UnsupportedArchive(msg) => Error::UnsupportedFormat(msg.to_string()),
            ZipError::InvalidArchive(msg) => Error::CorruptedArchive(msg.to_string()),
            ZipError::FileNotFound => Error::CorruptedArchive("member not found".to_string()),
            _ => Error::CompressionFailure(err.to_string()),
        }
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(io_err) => io_err.into(),
            other => Error::from_zip_ref(&other),
        }
    }
}

impl From<walkdir::Error> for Error {
    fn from(err: walkdir::Error) -> Self {
        let path = err
            .path()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        match err.into_io_error() {
            Some(io_err) => Error::io(io_err, path),
            None => Error::CompressionFailure(format!("filesystem loop at {}", path)),
        }
    }
}

impl From<sevenz_rust::Error> for Error {
    fn from(err: sevenz_rust::Error) -> Self {
        match err {
            sevenz_rust::Error::PasswordRequired => {
                Error::InvalidPassword("archive is encrypted and no password was given".into())
            }
            sevenz_rust::Error::MaybeBadPassword(e) => Error::InvalidPassword(e.to_string()),
            sevenz_rust::Error::BadSignature(_) => {
                Error::CorruptedArchive("bad 7z signature".to_string())
            }
            sevenz_rust::Error::ChecksumVerificationFailed => {
                Error::CorruptedArchive("checksum verification failed".to_string())
            }
            other => Error::CorruptedArchive(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
