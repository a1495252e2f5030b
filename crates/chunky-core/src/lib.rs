//! chunky-core library.
//!
//! A chunk is an append-only data file of `"<epoch_ms>,<payload>"` lines
//! plus a JSON metadata sidecar describing it (line count, timestamps,
//! checksum of the data, and arbitrary typed extension keys).
//!
//! - [`chunk::Chunk`] owns the file pair and its lifecycle (delete, archive).
//! - [`author::Author`] appends lines and keeps the sidecar current.
//! - [`reader::Reader`] reads lines back and follows sidecar changes.
//! - [`streamer::Streamer`] appends batches and annotates metadata.
//!
//! # Conventions
//!
//! - **Errors**: Each module returns its own `thiserror` enum; every error
//!   maps to a stable [`error::ErrorCode`] through `code()`.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `debug!`). The
//!   library never installs a subscriber.

pub mod author;
pub mod checksum;
pub mod chunk;
pub mod circular;
pub mod config;
pub mod error;
pub mod metadata;
pub mod reader;
pub mod record;
pub mod streamer;

pub use author::{AppendError, Author, Clock, SystemClock};
pub use checksum::{ChecksumKind, checksum_of};
pub use chunk::{Chunk, ChunkError};
pub use circular::CircularBuffer;
pub use config::{ChunkConfig, ConfigError};
pub use error::ErrorCode;
pub use metadata::{MetaData, MetaType, MetaValue, MetadataError};
pub use reader::{ReadError, Reader};
pub use record::Record;
pub use streamer::Streamer;
