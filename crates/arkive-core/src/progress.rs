//! Progress reporting and cooperative cancellation
//!
//! Callbacks run synchronously on the thread that called the operation. The
//! engine never spawns threads of its own; callers that want background work
//! own the threading and marshal updates back themselves.

use crate::archive::extractor::{ConflictAction, ConflictHandler};
use crate::model::ArchiveEntry;
use crate::{Error, Result};
use std::cell::Cell;
use std::io::{self, Read};
use std::path::Path;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One progress update
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress<'a> {
    /// Member currently being processed
    pub current: &'a str,
    /// Overall progress in `0.0..=1.0`
    pub fraction: f64,
    pub processed: u64,
    pub total: u64,
}

pub type ProgressFn<'a> = Box<dyn FnMut(&Progress<'_>) + 'a>;
pub type ErrorFn<'a> = Box<dyn FnMut(&str, &Error) + 'a>;

/// Optional callbacks accepted by every long-running operation
///
/// `on_error` receives non-fatal, continuable problems such as one member that
/// could not be written. Fatal failures are reported through the operation's
/// result instead.
#[derive(Default)]
pub struct Callbacks<'a> {
    on_progress: Option<ProgressFn<'a>>,
    on_error: Option<ErrorFn<'a>>,
    on_conflict: Option<Box<dyn ConflictHandler + 'a>>,
}

impl<'a> Callbacks<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_progress(mut self, f: impl FnMut(&Progress<'_>) + 'a) -> Self {
        self.on_progress = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl FnMut(&str, &Error) + 'a) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    /// Handler consulted under [`crate::OverwritePolicy::Prompt`]
    pub fn on_conflict(mut self, handler: impl ConflictHandler + 'a) -> Self {
        self.on_conflict = Some(Box::new(handler));
        self
    }

    pub(crate) fn progress(&mut self, current: &str, processed: u64, total: u64) {
        if let Some(f) = self.on_progress.as_mut() {
            let fraction = if total == 0 {
                1.0
            } else {
                (processed as f64 / total as f64).clamp(0.0, 1.0)
            };
            f(&Progress {
                current,
                fraction,
                processed,
                total,
            });
        }
    }

    pub(crate) fn error(&mut self, member: &str, err: &Error) {
        if let Some(f) = self.on_error.as_mut() {
            f(member, err);
        }
    }

    /// Without a handler, conflicts resolve to [`ConflictAction::Skip`]
    pub(crate) fn conflict(&mut self, entry: &ArchiveEntry, existing: &Path) -> ConflictAction {
        match self.on_conflict.as_mut() {
            Some(handler) => handler.handle_conflict(entry, existing),
            None => ConflictAction::Skip,
        }
    }
}

/// Cooperative cancellation flag shared between an operation and its callers
///
/// Checked at member boundaries, so a request takes effect before the next
/// member rather than in the middle of one.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(OperationCancelled)` once [`Self::cancel`] has been called
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::OperationCancelled)
        } else {
            Ok(())
        }
    }
}

/// Reader that counts the bytes pulled through it
pub(crate) struct CountingReader<R> {
    inner: R,
    count: Rc<Cell<u64>>,
}

impl<R: Read> CountingReader<R> {
    pub(crate) fn new(inner: R) -> (Self, Rc<Cell<u64>>) {
        let count = Rc::new(Cell::new(0));
        (
            Self {
                inner,
                count: Rc::clone(&count),
            },
            count,
        )
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count.set(self.count.get() + n as u64);
        Ok(n)
    }
}
