//! Arkive - a multi-format archive engine
//!
//! This library reads and writes ZIP, TAR (gzip, xz and zstd filtered) and 7z
//! archives behind two capability traits, [`Extractor`] and [`Packer`]. Use
//! [`create_extractor_auto`] to open an archive of unknown format, or
//! [`create_extractor`] / [`create_packer`] when the format is known.
//!
//! All operations are synchronous and run on the caller's thread. Progress,
//! error and conflict callbacks are invoked inline, and a [`CancelToken`] can be
//! flipped from another thread to stop at the next member boundary.

pub mod archive;
pub mod config;
pub mod detect;
pub mod engine;
pub mod error;
pub mod format;
pub mod metadata;
pub mod model;
pub mod progress;
pub mod security;

pub use error::{Error, Result};

// Re-export commonly used types
pub use archive::{
    create_extractor, create_extractor_auto, create_packer, estimate_compressed_size,
    validate_inputs, ConflictAction, ConflictHandler, Extractor, MemberFilter, Packer,
};
pub use config::Config;
pub use detect::detect_format;
pub use engine::EngineHandle;
pub use format::{ArchiveFormat, FormatFamily, TarFilter};
pub use model::{
    ArchiveEntry, ArchiveInfo, ExtractOptions, ExtractResult, OverwritePolicy, PackOptions,
    PackResult,
};
pub use progress::{Callbacks, CancelToken, Progress};
