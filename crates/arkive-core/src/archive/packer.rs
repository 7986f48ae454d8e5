//! Packer trait and the per-call packing state shared by every backend

use crate::format::{ArchiveFormat, DEFAULT_COMPRESSION_RATIO};
use crate::metadata::FileMetadata;
use crate::model::{PackOptions, PackResult};
use crate::progress::{Callbacks, CancelToken};
use crate::{Error, Result};
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Trait for archive packers
///
/// Like extractors, one instance supports at most one operation at a time and
/// its cancellation flag is never reset.
pub trait Packer: Send + Sync {
    /// Pack `inputs` (files and directories, recursively) into `output`
    fn pack(
        &self,
        inputs: &[PathBuf],
        output: &Path,
        options: &PackOptions,
        callbacks: Callbacks<'_>,
    ) -> PackResult;

    /// Check that every input exists and can be read
    fn validate_inputs(&self, inputs: &[PathBuf]) -> Result<()> {
        validate_inputs(inputs)
    }

    /// Rough archive size for `inputs`, `None` when the inputs cannot be walked
    fn estimate_compressed_size(
        &self,
        inputs: &[PathBuf],
        format: Option<ArchiveFormat>,
    ) -> Option<u64> {
        estimate_compressed_size(inputs, format)
    }

    /// Request cancellation; takes effect at the next member boundary
    fn cancel(&self) {
        self.cancel_token().cancel();
    }

    fn cancel_token(&self) -> CancelToken;

    fn supports_format(&self, format: ArchiveFormat) -> bool;

    fn format_name(&self) -> &'static str;
}

/// Validate pack inputs
///
/// Fails with [`Error::NoInputFiles`] for an empty list, then
/// [`Error::FileNotFound`] for the first missing path, then
/// [`Error::AccessDenied`] for the first path that cannot be read.
pub fn validate_inputs(inputs: &[PathBuf]) -> Result<()> {
    if inputs.is_empty() {
        return Err(Error::NoInputFiles);
    }

    // Follows links, so a dangling symlink counts as missing
    if let Some(missing) = inputs.iter().find(|p| fs::metadata(p).is_err()) {
        return Err(Error::FileNotFound(missing.display().to_string()));
    }

    for input in inputs {
        let readable = if input.is_dir() {
            fs::read_dir(input).map(drop)
        } else {
            File::open(input).map(drop)
        };
        if let Err(e) = readable {
            debug!(?input, error = %e, "Input is not readable");
            return Err(Error::AccessDenied(input.display().to_string()));
        }
    }

    Ok(())
}

/// Estimate the archive size using the per-format ratio table
///
/// An unknown format uses [`DEFAULT_COMPRESSION_RATIO`].
pub fn estimate_compressed_size(inputs: &[PathBuf], format: Option<ArchiveFormat>) -> Option<u64> {
    let mut total = 0u64;
    for input in inputs {
        for entry in WalkDir::new(input) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!(error = %e, "Size estimate walk failed");
                    return None;
                }
            };
            if entry.file_type().is_file() {
                total += entry.metadata().ok()?.len();
            }
        }
    }

    let ratio = format.map_or(DEFAULT_COMPRESSION_RATIO, |f| f.compression_ratio());
    Some((total as f64 * ratio).round() as u64)
}

/// What a pack member is on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MemberKind {
    File,
    Dir,
    Symlink(PathBuf),
}

/// One filesystem object scheduled for packing
#[derive(Debug, Clone)]
pub(crate) struct Member {
    pub source: PathBuf,
    /// Archive-relative path with `/` separators, no trailing slash
    pub name: String,
    pub kind: MemberKind,
    pub size: u64,
    pub metadata: FileMetadata,
}

impl Member {
    pub(crate) fn is_file(&self) -> bool {
        self.kind == MemberKind::File
    }
}

/// Walk `inputs` into members, named relative to each input's parent
///
/// Symlinks are not followed and the `output` archive itself is left out.
pub(crate) fn collect_members(inputs: &[PathBuf], output: &Path) -> Result<Vec<Member>> {
    let output = absolute_output(output);
    let mut members = Vec::new();

    for input in inputs {
        let root = fs::canonicalize(input).map_err(|e| Error::io(e, input.display()))?;
        let base = root.parent().unwrap_or(&root).to_path_buf();

        for entry in WalkDir::new(&root).follow_links(false).sort_by_file_name() {
            let entry = entry?;
            let path = entry.path();
            if output.as_deref() == Some(path) {
                debug!(?path, "Skipping the output archive");
                continue;
            }

            let name = member_name(path.strip_prefix(&base).unwrap_or(path));
            if name.is_empty() {
                continue;
            }

            let file_type = entry.file_type();
            let metadata = entry.metadata()?;
            let kind = if file_type.is_symlink() {
                let target = fs::read_link(path).map_err(|e| Error::io(e, path.display()))?;
                MemberKind::Symlink(target)
            } else if file_type.is_dir() {
                MemberKind::Dir
            } else {
                MemberKind::File
            };

            members.push(Member {
                source: path.to_path_buf(),
                size: if kind == MemberKind::File { metadata.len() } else { 0 },
                metadata: FileMetadata::from_metadata(&metadata),
                name,
                kind,
            });
        }
    }

    Ok(members)
}

fn member_name(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn absolute_output(output: &Path) -> Option<PathBuf> {
    let parent = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    Some(fs::canonicalize(parent).ok()?.join(output.file_name()?))
}

/// Per-call packing state
pub(crate) struct Packing<'a> {
    callbacks: Callbacks<'a>,
    cancel: CancelToken,
    result: PackResult,
    total: u64,
    processed: u64,
}

impl<'a> Packing<'a> {
    /// Check for cancellation before `member`
    pub(crate) fn next(&mut self, member: &Member) -> Result<()> {
        self.cancel.check()?;
        debug!("Adding to archive: {}", member.name);
        Ok(())
    }

    /// Account for a member that was written
    pub(crate) fn done(&mut self, member: &Member, bytes: u64) {
        if member.is_file() {
            self.result.files_processed += 1;
        }
        self.result.bytes_processed += bytes;
        self.processed += member.size;
        self.callbacks.progress(&member.name, self.processed, self.total);
    }

    /// Record a member that could not be read and carry on
    pub(crate) fn skip(&mut self, member: &Member, err: Error) {
        warn!(member = %member.name, error = %err, "Skipping input");
        self.callbacks.error(&member.name, &err);
        self.processed += member.size;
        self.callbacks.progress(&member.name, self.processed, self.total);
    }
}

/// Shared driver for every packer
///
/// Inputs are validated before the filesystem is touched. `write` receives the
/// collected members and must finish its archive even when it stops early, so
/// whatever was written stays readable.
pub(crate) fn run_pack<F>(
    inputs: &[PathBuf],
    output: &Path,
    options: &PackOptions,
    callbacks: Callbacks<'_>,
    cancel: CancelToken,
    write: F,
) -> PackResult
where
    F: FnOnce(&[Member], &mut Packing<'_>) -> Result<()>,
{
    let started = Instant::now();

    let prepared = validate_inputs(inputs).and_then(|()| {
        if options.password().is_some() {
            return Err(Error::UnsupportedOperation(
                "creating encrypted archives is not supported".to_string(),
            ));
        }
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| Error::io(e, parent.display()))?;
        }
        collect_members(inputs, output)
    });

    let members = match prepared {
        Ok(members) => members,
        Err(e) => return failed(e),
    };

    let total = members.iter().map(|m| m.size).sum();
    info!(
        ?output,
        format = %options.format(),
        members = members.len(),
        bytes = total,
        "Packing archive"
    );

    let mut packing = Packing {
        callbacks,
        cancel,
        result: PackResult::default(),
        total,
        processed: 0,
    };
    let outcome = write(&members, &mut packing);

    match &outcome {
        Ok(()) => info!(
            files = packing.result.files_processed,
            bytes = packing.result.bytes_processed,
            "Successfully packed archive: {:?}",
            output
        ),
        Err(e) => warn!(
            files = packing.result.files_processed,
            error = %e,
            "Packing stopped early"
        ),
    }
    packing.result.finish(outcome, started.elapsed())
}

/// Result for a pack that failed before anything was written
pub(crate) fn failed(err: Error) -> PackResult {
    warn!(error = %err, "Packing failed");
    PackResult::default().finish(Err(err), Duration::ZERO)
}

/// Open a source file, mapping failures to taxonomy errors
pub(crate) fn open_source(member: &Member) -> Result<File> {
    File::open(&member.source).map_err(|e| match e.kind() {
        io::ErrorKind::PermissionDenied => Error::AccessDenied(member.source.display().to_string()),
        _ => Error::io(e, member.source.display()),
    })
}
