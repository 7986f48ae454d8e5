//! Process-wide engine lifecycle

use crate::archive::{create_extractor, create_extractor_auto, create_packer, Extractor, Packer};
use crate::format::ArchiveFormat;
use crate::Result;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Handle over the engine's global state
///
/// The codecs need no global setup, so `init` and `cleanup` only flip a flag.
/// Both are idempotent.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineHandle;

impl EngineHandle {
    /// Mark the engine initialized and return a handle
    pub fn init() -> Self {
        if !INITIALIZED.swap(true, Ordering::SeqCst) {
            debug!("Archive engine initialized");
        }
        EngineHandle
    }

    /// Release global state
    pub fn cleanup() {
        if INITIALIZED.swap(false, Ordering::SeqCst) {
            debug!("Archive engine cleaned up");
        }
    }

    pub fn is_initialized() -> bool {
        INITIALIZED.load(Ordering::SeqCst)
    }

    /// Extractor for `format`
    pub fn extractor_for(&self, format: ArchiveFormat) -> Box<dyn Extractor> {
        create_extractor(format)
    }

    /// Extractor for whatever format `archive` holds
    pub fn extractor_for_path(&self, archive: &Path) -> Result<Box<dyn Extractor>> {
        create_extractor_auto(archive)
    }

    /// Packer for `format`
    pub fn packer_for(&self, format: ArchiveFormat) -> Box<dyn Packer> {
        create_packer(format)
    }
}
