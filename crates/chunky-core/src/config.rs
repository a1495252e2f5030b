use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::checksum::ChecksumKind;
use crate::error::ErrorCode;

/// File name looked up inside a group directory.
pub const CONFIG_FILE_NAME: &str = "chunky.toml";

/// Errors raised while loading a [`ChunkConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("metadata_sync_every must be at least 1")]
    ZeroSyncInterval,
}

impl ConfigError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        ErrorCode::ConfigParseError
    }
}

/// How archive members are stored inside the zip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveCompression {
    #[default]
    Deflated,
    Stored,
}

/// Naming and durability settings shared by every chunk in a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkConfig {
    #[serde(default = "default_data_extension")]
    pub data_extension: String,
    #[serde(default = "default_metadata_extension")]
    pub metadata_extension: String,
    #[serde(default = "default_archive_extension")]
    pub archive_extension: String,
    /// Digest recorded in `chunk.checksum.type` for new chunks.
    #[serde(default)]
    pub checksum: ChecksumKind,
    /// Persist metadata after every N appended lines.
    #[serde(default = "default_sync_every")]
    pub metadata_sync_every: u32,
    #[serde(default)]
    pub archive_compression: ArchiveCompression,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            data_extension: default_data_extension(),
            metadata_extension: default_metadata_extension(),
            archive_extension: default_archive_extension(),
            checksum: ChecksumKind::default(),
            metadata_sync_every: default_sync_every(),
            archive_compression: ArchiveCompression::default(),
        }
    }
}

impl ChunkConfig {
    /// Load a config file, falling back to defaults when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file exists but cannot be read or
    /// parsed, or if it sets `metadata_sync_every = 0`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config =
            toml::from_str::<Self>(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        if config.metadata_sync_every == 0 {
            return Err(ConfigError::ZeroSyncInterval);
        }
        Ok(config)
    }

    /// Load `chunky.toml` from a group directory.
    ///
    /// # Errors
    ///
    /// Same as [`load`](Self::load).
    pub fn load_for_group(group_path: &Path) -> Result<Self, ConfigError> {
        Self::load(&group_path.join(CONFIG_FILE_NAME))
    }
}

fn default_data_extension() -> String {
    "chunk".to_string()
}

fn default_metadata_extension() -> String {
    "metadata.json".to_string()
}

fn default_archive_extension() -> String {
    "zip".to_string()
}

const fn default_sync_every() -> u32 {
    1
}
