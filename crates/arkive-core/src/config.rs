//! Configuration module

use crate::format::ArchiveFormat;
use crate::model::{ExtractOptions, OverwritePolicy, PackOptions};
use crate::{Error, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Defaults for archive creation
    #[serde(default)]
    pub pack: PackConfig,
    /// Defaults for extraction
    #[serde(default)]
    pub extract: ExtractConfig,
}

/// Pack configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackConfig {
    /// Default archive format: zip, tar.gz, tar.xz, tar.zst, 7z
    pub default_format: String,
    /// Default compression level (format default when unset)
    pub default_level: Option<u32>,
    /// Number of codec threads to use (0 = codec default)
    pub threads: usize,
    pub preserve_permissions: bool,
    pub preserve_timestamps: bool,
}

impl Default for PackConfig {
    fn default() -> Self {
        Self {
            default_format: ArchiveFormat::TarZstd.name().to_string(),
            default_level: None,
            threads: 0,
            preserve_permissions: true,
            preserve_timestamps: true,
        }
    }
}

/// Extract configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// What to do with files that already exist
    pub overwrite: OverwritePolicy,
    /// Hoist the contents of a lone top-level folder
    pub hoist: bool,
    pub preserve_permissions: bool,
    pub preserve_timestamps: bool,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            overwrite: OverwritePolicy::Skip,
            hoist: false,
            preserve_permissions: true,
            preserve_timestamps: true,
        }
    }
}

impl Config {
    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = config_dir().ok_or_else(|| {
            Error::Config("Unable to determine config directory".to_string())
        })?;

        Ok(config_dir.join("arkive").join("config.toml"))
    }

    /// Get default configuration content with comments
    pub fn default_config_content() -> String {
        r#"# Arkive Configuration File

[pack]
# Default archive format: zip, tar.gz, tar.xz, tar.zst, 7z
default_format = "tar.zst"
# Default compression level (zip/gz/xz/7z: 0-9, zstd: 1-22)
# default_level = 3
# Codec worker threads (0 = codec default, only zstd uses more than one)
threads = 0
preserve_permissions = true
preserve_timestamps = true

[extract]
# Existing files: skip, overwrite or prompt
overwrite = "skip"
# Move the contents of a single top-level folder into the output directory
hoist = false
preserve_permissions = true
preserve_timestamps = true
"#
        .to_string()
    }

    /// Load configuration from the default location
    ///
    /// A commented default file is written when none exists yet.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|e| Error::io(e, parent.display()))?;
            }
            fs::write(&path, Self::default_config_content())
                .map_err(|e| Error::io(e, path.display()))?;
            info!("Wrote default configuration to {:?}", path);
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        debug!("Loading configuration from {:?}", path);
        let contents = fs::read_to_string(path).map_err(|e| Error::io(e, path.display()))?;
        let config: Config = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        self.save_to(&path)
    }

    /// Save configuration to an explicit file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(e, parent.display()))?;
        }
        fs::write(path, contents).map_err(|e| Error::io(e, path.display()))?;
        Ok(())
    }

    /// Load configuration or use defaults if loading fails
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }

    /// Pack options built from the `[pack]` section
    ///
    /// # Errors
    ///
    /// [`Error::Config`] for an unknown format name and
    /// [`Error::InvalidOptions`] for a level outside the format's range.
    pub fn pack_options(&self) -> Result<PackOptions> {
        let format: ArchiveFormat = self.pack.default_format.parse().map_err(|_| {
            Error::Config(format!(
                "unknown default_format '{}'",
                self.pack.default_format
            ))
        })?;

        let mut options = PackOptions::new(format)
            .with_threads(self.pack.threads)
            .preserve_permissions(self.pack.preserve_permissions)
            .preserve_timestamps(self.pack.preserve_timestamps);
        if let Some(level) = self.pack.default_level {
            options = options.with_level(level)?;
        }
        Ok(options)
    }

    /// Extract options built from the `[extract]` section
    pub fn extract_options(&self) -> ExtractOptions {
        ExtractOptions {
            overwrite: self.extract.overwrite,
            hoist_single_folder: self.extract.hoist,
            preserve_permissions: self.extract.preserve_permissions,
            preserve_timestamps: self.extract.preserve_timestamps,
            ..ExtractOptions::default()
        }
    }
}
