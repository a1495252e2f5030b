//! Content digests for chunk data and metadata files.
//!
//! The digest is computed by streaming the file in fixed-size blocks, so
//! chunk files far larger than memory can be hashed. Output is always the
//! lowercase hex encoding of the digest.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;

use md5::Md5;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const BLOCK_SIZE: usize = 64 * 1024;

/// Digest algorithm recorded under `chunk.checksum.type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumKind {
    #[default]
    Md5,
    Sha256,
    Blake3,
}

impl ChecksumKind {
    /// Name as stored in the metadata sidecar.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha256 => "sha256",
            Self::Blake3 => "blake3",
        }
    }
}

impl fmt::Display for ChecksumKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a checksum name is not one of the supported kinds.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown checksum type: {0}")]
pub struct UnknownChecksumKind(pub String);

impl FromStr for ChecksumKind {
    type Err = UnknownChecksumKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "md5" => Ok(Self::Md5),
            "sha256" => Ok(Self::Sha256),
            "blake3" => Ok(Self::Blake3),
            _ => Err(UnknownChecksumKind(s.to_string())),
        }
    }
}

/// Compute the digest of the file at `path`.
///
/// # Errors
///
/// Returns any I/O error raised while opening or reading the file.
pub fn checksum_of(path: &Path, kind: ChecksumKind) -> io::Result<String> {
    let file = File::open(path)?;
    checksum_reader(file, kind)
}

/// Compute the digest of everything readable from `reader`.
///
/// # Errors
///
/// Returns any I/O error raised by the reader.
pub fn checksum_reader(reader: impl Read, kind: ChecksumKind) -> io::Result<String> {
    match kind {
        ChecksumKind::Md5 => digest_hex::<Md5>(reader),
        ChecksumKind::Sha256 => digest_hex::<Sha256>(reader),
        ChecksumKind::Blake3 => {
            let mut hasher = blake3::Hasher::new();
            stream_blocks(reader, |block| {
                hasher.update(block);
            })?;
            Ok(hasher.finalize().to_hex().to_string())
        }
    }
}

fn digest_hex<D: Digest>(reader: impl Read) -> io::Result<String> {
    let mut hasher = D::new();
    stream_blocks(reader, |block| hasher.update(block))?;
    let digest = hasher.finalize();
    Ok(digest.iter().fold(String::with_capacity(digest.len() * 2), |mut out, byte| {
        use std::fmt::Write as _;
        let _ = write!(out, "{byte:02x}");
        out
    }))
}

fn stream_blocks(mut reader: impl Read, mut sink: impl FnMut(&[u8])) -> io::Result<()> {
    let mut buf = vec![0_u8; BLOCK_SIZE];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => return Ok(()),
            Ok(n) => sink(&buf[..n]),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
}
