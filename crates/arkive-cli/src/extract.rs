//! Extract command implementation with interactive support

use anyhow::Result;
use arkive_core::archive::{create_extractor_auto, ConflictAction, ConflictHandler};
use arkive_core::{ArchiveEntry, Callbacks, ExtractOptions, ExtractResult, OverwritePolicy};
use dialoguer::Select;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use tracing::{info, warn};

/// Interactive conflict handler for CLI
pub struct InteractiveConflictHandler;

impl ConflictHandler for InteractiveConflictHandler {
    fn handle_conflict(&mut self, entry: &ArchiveEntry, existing_path: &Path) -> ConflictAction {
        let prompt = format!(
            "File already exists: {}\nArchive member: {} ({} bytes)",
            existing_path.display(),
            entry.path,
            entry.uncompressed_size
        );

        let options = [
            "Overwrite",
            "Skip",
            "Rename",
            "Overwrite All",
            "Skip All",
            "Abort",
        ];

        let selection = Select::new()
            .with_prompt(&prompt)
            .items(&options)
            .default(1) // Default to Skip
            .interact()
            .unwrap_or(1);

        match selection {
            0 => ConflictAction::Overwrite,
            2 => ConflictAction::Rename,
            3 => ConflictAction::OverwriteAll,
            4 => ConflictAction::SkipAll,
            5 => ConflictAction::Abort,
            _ => ConflictAction::Skip,
        }
    }
}

/// Byte progress bar, hidden unless `show` is set
pub fn progress_bar(show: bool) -> ProgressBar {
    if !show {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(0);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    pb.set_style(style);
    pb
}

/// Extract `archive` into `output_dir`, prompting on conflicts when requested
///
/// `only` selects members for a partial extraction.
pub fn run_extract(
    archive: &Path,
    output_dir: &Path,
    options: &ExtractOptions,
    only: &[String],
    show_progress: bool,
) -> Result<ExtractResult> {
    let extractor = create_extractor_auto(archive)?;
    info!(
        "Extracting {:?} ({}) into {:?}",
        archive,
        extractor.format_name(),
        output_dir
    );

    let pb = progress_bar(show_progress);
    let mut callbacks = Callbacks::new()
        .on_progress(|p| {
            pb.set_length(p.total);
            pb.set_position(p.processed);
            pb.set_message(p.current.to_string());
        })
        .on_error(|member, err| warn!("{}: {}", member, err));
    if options.overwrite == OverwritePolicy::Prompt {
        callbacks = callbacks.on_conflict(InteractiveConflictHandler);
    }

    let result = if only.is_empty() {
        extractor.extract(archive, output_dir, options, callbacks)
    } else {
        extractor.extract_partial(archive, output_dir, only, options, callbacks)
    };
    pb.finish_and_clear();

    if let Some(err) = result.error.clone() {
        return Err(err.into());
    }
    Ok(result)
}
