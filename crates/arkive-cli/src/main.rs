//! arkive-cli - Command-line interface for the arkive archive engine
//!
//! Thin front end over `arkive-core`: listing, inspection, verification,
//! extraction with interactive conflict resolution, packing and size
//! estimation for ZIP, TAR (gzip/xz/zstd) and 7z archives.

use anyhow::{Context, Result};
use arkive_core::archive::{create_extractor_auto, create_packer};
use arkive_core::detect::format_from_extension;
use arkive_core::{
    estimate_compressed_size, ArchiveEntry, ArchiveFormat, Callbacks, Config, OverwritePolicy,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod extract;

/// arkive - A multi-format archive tool
#[derive(Parser)]
#[command(name = "arkive")]
#[command(author, version, about = "A multi-format archive tool", long_about = None)]
struct Cli {
    /// Enable verbose output for debugging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Show progress bar during operations
    #[arg(long, global = true)]
    progress: bool,

    /// Configuration file to use instead of the default location
    #[arg(long, global = true, env = "ARKIVE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List archive members
    List {
        /// Archive file to list
        archive: PathBuf,

        /// Output format as JSON
        #[arg(long)]
        json: bool,

        /// Password for encrypted archives
        #[arg(long, env = "ARKIVE_PASSWORD")]
        password: Option<String>,
    },

    /// Show archive-level information
    Info {
        /// Archive file to inspect
        archive: PathBuf,

        /// Output format as JSON
        #[arg(long)]
        json: bool,

        /// Password for encrypted archives
        #[arg(long, env = "ARKIVE_PASSWORD")]
        password: Option<String>,
    },

    /// Read every member to check the archive for corruption
    Verify {
        /// Archive file to verify
        archive: PathBuf,

        /// Password for encrypted archives
        #[arg(long, env = "ARKIVE_PASSWORD")]
        password: Option<String>,
    },

    /// Extract files from an archive
    Extract {
        /// Archive file to extract
        archive: PathBuf,

        /// Output directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Overwrite existing files
        #[arg(long)]
        overwrite: bool,

        /// Skip existing files
        #[arg(long, conflicts_with = "overwrite")]
        skip: bool,

        /// Enable interactive mode for conflict resolution
        #[arg(long, short = 'i', conflicts_with_all = ["overwrite", "skip"])]
        interactive: bool,

        /// If the archive contains a single folder, hoist its contents to the output directory
        #[arg(long)]
        hoist: bool,

        /// Only extract members matching this pattern (repeatable)
        #[arg(long)]
        include: Vec<String>,

        /// Never extract members matching this pattern (repeatable)
        #[arg(long)]
        exclude: Vec<String>,

        /// Partial extraction: members must match at least one of these patterns
        #[arg(long)]
        only: Vec<String>,

        /// Password for encrypted archives
        #[arg(long, env = "ARKIVE_PASSWORD")]
        password: Option<String>,
    },

    /// Pack files into an archive
    Pack {
        /// Input files or directories
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output archive file
        #[arg(short, long)]
        output: PathBuf,

        /// Archive format (zip, tar.gz, tar.xz, tar.zst, 7z)
        #[arg(short, long)]
        format: Option<String>,

        /// Compression level (zstd: 1-22, others: 0-9)
        #[arg(short, long)]
        level: Option<u32>,

        /// Number of codec threads to use
        #[arg(long)]
        threads: Option<usize>,

        /// Do not store permission bits
        #[arg(long)]
        no_permissions: bool,

        /// Do not store modification times
        #[arg(long)]
        no_timestamps: bool,
    },

    /// Estimate the compressed size of inputs
    Estimate {
        /// Input files or directories
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Target archive format
        #[arg(short, long)]
        format: Option<String>,
    },

    /// Show configuration
    Config {
        /// Show current configuration
        #[arg(long, conflicts_with = "path")]
        show: bool,

        /// Show configuration file path
        #[arg(long)]
        path: bool,
    },
}

fn setup_logging(verbose: bool, quiet: bool) {
    if quiet {
        return;
    }

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    match run() {
        Ok(()) => process::exit(0),
        Err(e) => {
            eprintln!("{}", describe_error(&e));
            process::exit(1);
        }
    }
}

/// User-facing message for a failed command
fn describe_error(err: &anyhow::Error) -> String {
    match err.downcast_ref::<arkive_core::Error>() {
        Some(arkive_core::Error::InvalidPassword(_)) => {
            "Error: wrong or missing password (use --password or ARKIVE_PASSWORD)".to_string()
        }
        Some(arkive_core::Error::CorruptedArchive(msg)) => {
            format!("Error: the archive is damaged and cannot be read ({})", msg)
        }
        Some(core_err) => format!("Error: {}", core_err),
        None => format!("Error: {:#}", err),
    }
}

/// Load the configuration without creating files
fn load_config(explicit: Option<&Path>) -> Result<Config> {
    if let Some(path) = explicit {
        return Ok(Config::load_from(path)?);
    }
    match Config::config_path() {
        Ok(path) if path.exists() => Ok(Config::load_from(&path)?),
        _ => Ok(Config::default()),
    }
}

fn parse_format(name: &str) -> Result<ArchiveFormat> {
    Ok(name.parse::<ArchiveFormat>()?)
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::List {
            archive,
            json,
            password,
        } => {
            let extractor = create_extractor_auto(&archive)?;
            let entries = extractor.list_contents(&archive, password.as_deref())?;

            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                print_entries(&entries);
            }
        }

        Commands::Info {
            archive,
            json,
            password,
        } => {
            let extractor = create_extractor_auto(&archive)?;
            let info = extractor.archive_info(&archive, password.as_deref())?;

            if json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                println!("Path:          {}", info.path.display());
                println!("Format:        {}", info.format);
                println!("Files:         {}", info.file_count);
                println!("Archive size:  {}", info.compressed_size);
                println!("Content size:  {}", info.uncompressed_size);
                println!("Encrypted:     {}", if info.is_encrypted { "yes" } else { "no" });
                println!("Created:       {}", info.created);
            }
        }

        Commands::Verify { archive, password } => {
            let extractor = create_extractor_auto(&archive)?;
            extractor.verify_integrity(&archive, password.as_deref())?;
            println!("OK: {}", archive.display());
        }

        Commands::Extract {
            archive,
            output,
            overwrite,
            skip,
            interactive,
            hoist,
            include,
            exclude,
            only,
            password,
        } => {
            let output_dir = output.unwrap_or_else(|| PathBuf::from("."));
            let mut options = config.extract_options();
            if overwrite {
                options.overwrite = OverwritePolicy::Overwrite;
            } else if skip {
                options.overwrite = OverwritePolicy::Skip;
            } else if interactive {
                info!("Interactive mode enabled - prompting for file conflicts");
                options.overwrite = OverwritePolicy::Prompt;
            }
            options.hoist_single_folder |= hoist;
            options.include_patterns = include;
            options.exclude_patterns = exclude;
            options.password = password;

            let result = extract::run_extract(&archive, &output_dir, &options, &only, cli.progress)?;
            for skipped in &result.skipped_files {
                warn!("Skipped: {}", skipped);
            }
            info!(
                "Extracted {} files ({} bytes) in {:.2?}",
                result.files_extracted, result.bytes_extracted, result.elapsed
            );
        }

        Commands::Pack {
            inputs,
            output,
            format,
            level,
            threads,
            no_permissions,
            no_timestamps,
        } => {
            let defaults = config.pack_options()?;
            let format = match format.as_deref() {
                Some(name) => parse_format(name)?,
                None => format_from_extension(&output).unwrap_or(defaults.format()),
            };

            let mut options = if format == defaults.format() {
                defaults
            } else {
                arkive_core::PackOptions::new(format)
                    .with_threads(config.pack.threads)
                    .preserve_permissions(config.pack.preserve_permissions)
                    .preserve_timestamps(config.pack.preserve_timestamps)
            };
            if let Some(level) = level {
                options = options.with_level(level)?;
            }
            if let Some(threads) = threads {
                if format == ArchiveFormat::TarXz && threads > 1 {
                    info!("Note: XZ compression runs single-threaded");
                }
                options = options.with_threads(threads);
            }
            if no_permissions {
                options = options.preserve_permissions(false);
            }
            if no_timestamps {
                options = options.preserve_timestamps(false);
            }

            info!("Packing {:?} into {:?} ({})", inputs, output, format);
            let pb = extract::progress_bar(cli.progress);
            let callbacks = Callbacks::new()
                .on_progress(|p| {
                    pb.set_length(p.total);
                    pb.set_position(p.processed);
                    pb.set_message(p.current.to_string());
                })
                .on_error(|member, err| warn!("{}: {}", member, err));
            let result = create_packer(format).pack(&inputs, &output, &options, callbacks);
            pb.finish_and_clear();

            if let Some(err) = result.error {
                return Err(err.into());
            }
            info!(
                "Packed {} files ({} bytes) in {:.2?}",
                result.files_processed, result.bytes_processed, result.elapsed
            );
        }

        Commands::Estimate { inputs, format } => {
            let format = format.as_deref().map(parse_format).transpose()?;
            let estimate = estimate_compressed_size(&inputs, format)
                .context("could not read the inputs to estimate their size")?;
            println!("{}", estimate);
        }

        Commands::Config { show, path } => {
            if path {
                let config_path = match cli.config {
                    Some(explicit) => explicit,
                    None => Config::config_path()?,
                };
                println!("{}", config_path.display());
            } else if show {
                println!("{}", toml::to_string_pretty(&config)?);
            } else {
                eprintln!("Please specify --show or --path");
            }
        }
    }

    Ok(())
}

fn print_entries(entries: &[ArchiveEntry]) {
    println!(
        "{:<50} {:>12} {:>12} {:>6} {:>20}",
        "Path", "Size", "Compressed", "Mode", "Modified"
    );
    println!("{}", "-".repeat(104));

    for entry in entries {
        let mode_str = entry
            .permissions
            .map(|mode| format!("{:o}", mode))
            .unwrap_or_else(|| "-".to_string());

        let mtime_str = entry
            .modified
            .and_then(|mtime| chrono::DateTime::<chrono::Utc>::from_timestamp(mtime, 0))
            .map(|datetime| datetime.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());

        let size_str = entry
            .display_size()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());

        let mut path = entry.path.clone();
        if entry.is_directory {
            path.push('/');
        }
        if let Some(target) = &entry.link_target {
            path = format!("{} -> {}", path, target);
        }

        println!(
            "{:<50} {:>12} {:>12} {:>6} {:>20}",
            path, size_str, entry.compressed_size, mode_str, mtime_str
        );
    }
}
