//! A chunk: one append-only data file plus its metadata sidecar.
//!
//! # Layout
//!
//! ```text
//! <group_path>/
//!   chunk_1.chunk           # data, one "<epoch_ms>,<payload>" line per record
//!   chunk_1.metadata.json   # sidecar, see crate::metadata
//!   chunk_1.zip             # only after archive()
//! ```
//!
//! # Lifecycle
//!
//! - The data file is created lazily by the first append.
//! - [`Chunk::delete`] removes the managed files in order.
//! - [`Chunk::archive`] zips the managed files, then removes them.
//!
//! Neither operation is transactional. The first failure aborts and is
//! reported; files already removed stay removed and a partially written
//! archive is left on disk.

use std::fmt;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::config::{ArchiveCompression, ChunkConfig};
use crate::error::ErrorCode;
use crate::metadata::{MetaData, MetadataError};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Which lifecycle step touched a managed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagedAction {
    Remove,
    Archive,
}

impl fmt::Display for ManagedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Remove => "remove",
            Self::Archive => "archive",
        })
    }
}

/// Errors raised by chunk construction and lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    /// A managed file could not be removed or archived.
    #[error("unable to {action} managed file {}: {source}", path.display())]
    ManagedFile {
        action: ManagedAction,
        path: PathBuf,
        source: io::Error,
    },
}

impl ChunkError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Metadata(err) => err.code(),
            Self::ManagedFile { .. } => ErrorCode::ManagedFileFailed,
        }
    }

    /// Path of the managed file that failed, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Metadata(_) => None,
            Self::ManagedFile { path, .. } => Some(path),
        }
    }

    fn managed(action: ManagedAction, path: &Path, source: io::Error) -> Self {
        Self::ManagedFile {
            action,
            path: path.to_path_buf(),
            source,
        }
    }
}

// ---------------------------------------------------------------------------
// Chunk
// ---------------------------------------------------------------------------

/// The managed file pair of one chunk, and its loaded metadata.
#[derive(Debug, Clone)]
pub struct Chunk {
    group_path: PathBuf,
    name: String,
    data_file: PathBuf,
    archive_file: PathBuf,
    metadata: MetaData,
    config: ChunkConfig,
}

impl Chunk {
    /// Open the chunk `name` under `group_path` with default naming.
    ///
    /// Loads the sidecar if it exists, otherwise starts from default
    /// metadata. Nothing is created on disk.
    ///
    /// # Errors
    ///
    /// Returns [`ChunkError::Metadata`] if an existing sidecar cannot be
    /// read or is invalid.
    pub fn open(group_path: impl Into<PathBuf>, name: impl Into<String>) -> Result<Self, ChunkError> {
        Self::open_with(group_path, name, &ChunkConfig::default())
    }

    /// Open a chunk using the extensions and checksum from `config`.
    ///
    /// # Errors
    ///
    /// Same as [`open`](Self::open).
    pub fn open_with(
        group_path: impl Into<PathBuf>,
        name: impl Into<String>,
        config: &ChunkConfig,
    ) -> Result<Self, ChunkError> {
        let group_path = group_path.into();
        let name = name.into();
        let data_file = group_path.join(format!("{name}.{}", config.data_extension));
        let metadata_file = group_path.join(format!("{name}.{}", config.metadata_extension));
        let archive_file = group_path.join(format!("{name}.{}", config.archive_extension));

        let metadata = MetaData::load_with(metadata_file, config.checksum)?;
        debug!(
            group = %group_path.display(),
            chunk = %name,
            lines = metadata.line_count(),
            "chunk opened"
        );

        Ok(Self {
            group_path,
            name,
            data_file,
            archive_file,
            metadata,
            config: config.clone(),
        })
    }

    #[must_use]
    pub fn group_path(&self) -> &Path {
        &self.group_path
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn data_file(&self) -> &Path {
        &self.data_file
    }

    #[must_use]
    pub fn metadata_file(&self) -> &Path {
        self.metadata.file()
    }

    /// Where [`archive`](Self::archive) writes the zip.
    #[must_use]
    pub fn archive_file(&self) -> &Path {
        &self.archive_file
    }

    #[must_use]
    pub const fn metadata(&self) -> &MetaData {
        &self.metadata
    }

    pub const fn metadata_mut(&mut self) -> &mut MetaData {
        &mut self.metadata
    }

    #[must_use]
    pub const fn config(&self) -> &ChunkConfig {
        &self.config
    }

    /// The files this chunk owns as one lifecycle unit, in the order every
    /// lifecycle operation visits them: data first, then metadata.
    #[must_use]
    pub fn managed_files(&self) -> [&Path; 2] {
        [self.data_file.as_path(), self.metadata.file()]
    }

    /// Whether the data file exists yet.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.data_file.exists()
    }

    /// Create the group directory if needed. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error.
    pub fn ensure_group_dir(&self) -> io::Result<()> {
        fs::create_dir_all(&self.group_path)
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Remove every managed file.
    ///
    /// Removal is sequential and stops at the first failure. Files removed
    /// before the failure are not restored.
    ///
    /// # Errors
    ///
    /// Returns [`ChunkError::ManagedFile`] naming the first file that could
    /// not be removed (including one that is already gone).
    pub fn delete(&self) -> Result<(), ChunkError> {
        info!(chunk = %self.name, group = %self.group_path.display(), "deleting chunk");
        self.remove_managed_files()
    }

    /// Zip every managed file into [`archive_file`](Self::archive_file),
    /// then remove the originals.
    ///
    /// All members are written and the archive is finished before any
    /// original is removed, so a missing data file fails before the
    /// metadata file is touched. Returns the archive path.
    ///
    /// # Errors
    ///
    /// Returns [`ChunkError::ManagedFile`] on the first failure. A partial
    /// archive, or partially removed originals, are left as they are.
    pub fn archive(&self) -> Result<PathBuf, ChunkError> {
        info!(
            chunk = %self.name,
            archive = %self.archive_file.display(),
            "archiving chunk"
        );
        self.write_archive()?;
        self.remove_managed_files()?;
        Ok(self.archive_file.clone())
    }

    fn remove_managed_files(&self) -> Result<(), ChunkError> {
        for file in self.managed_files() {
            fs::remove_file(file)
                .map_err(|source| ChunkError::managed(ManagedAction::Remove, file, source))?;
            debug!(file = %file.display(), "removed chunk managed file");
        }
        Ok(())
    }

    fn write_archive(&self) -> Result<(), ChunkError> {
        let archive_path = self.archive_file.as_path();
        let archive_err =
            |path: &Path, source| ChunkError::managed(ManagedAction::Archive, path, source);

        let file = File::create(archive_path).map_err(|e| archive_err(archive_path, e))?;
        let mut zip = ZipWriter::new(file);
        let options =
            SimpleFileOptions::default().compression_method(match self.config.archive_compression {
                ArchiveCompression::Deflated => zip::CompressionMethod::Deflated,
                ArchiveCompression::Stored => zip::CompressionMethod::Stored,
            });

        for managed in self.managed_files() {
            let mut source = File::open(managed).map_err(|e| archive_err(managed, e))?;
            zip.start_file(self.member_name(managed), options)
                .map_err(|e| archive_err(managed, zip_to_io(e)))?;
            io::copy(&mut source, &mut zip).map_err(|e| archive_err(managed, e))?;
            debug!(
                archive = %archive_path.display(),
                file = %managed.display(),
                "archived chunk file"
            );
        }

        let file = zip
            .finish()
            .map_err(|e| archive_err(archive_path, zip_to_io(e)))?;
        file.sync_all().map_err(|e| archive_err(archive_path, e))
    }

    /// Archive member name: the managed file's path relative to the group.
    fn member_name(&self, file: &Path) -> String {
        file.strip_prefix(&self.group_path)
            .unwrap_or(file)
            .to_string_lossy()
            .into_owned()
    }
}

fn zip_to_io(err: zip::result::ZipError) -> io::Error {
    match err {
        zip::result::ZipError::Io(err) => err,
        other => io::Error::other(other),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
