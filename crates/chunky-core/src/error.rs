use std::fmt;

/// Machine-readable error codes shared by every chunk error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    MetadataSource,
    MetadataInvalid,
    MetadataKeyNotFound,
    MetadataWriteFailed,
    ManagedFileFailed,
    ChunkFileNotFound,
    ChunkReadFailed,
    ChunkAppendFailed,
    UnknownChecksumType,
    ConfigParseError,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::MetadataSource => "E1001",
            Self::MetadataInvalid => "E1002",
            Self::MetadataKeyNotFound => "E1003",
            Self::MetadataWriteFailed => "E1004",
            Self::ManagedFileFailed => "E2001",
            Self::ChunkFileNotFound => "E3001",
            Self::ChunkReadFailed => "E3002",
            Self::ChunkAppendFailed => "E4001",
            Self::UnknownChecksumType => "E4002",
            Self::ConfigParseError => "E5001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::MetadataSource => "Metadata sidecar unreadable",
            Self::MetadataInvalid => "Metadata sidecar invalid",
            Self::MetadataKeyNotFound => "Metadata key not found",
            Self::MetadataWriteFailed => "Metadata sidecar write failed",
            Self::ManagedFileFailed => "Chunk managed file operation failed",
            Self::ChunkFileNotFound => "Chunk data file not found",
            Self::ChunkReadFailed => "Chunk read failed",
            Self::ChunkAppendFailed => "Chunk append failed",
            Self::UnknownChecksumType => "Unknown checksum type",
            Self::ConfigParseError => "Config file parse error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::MetadataSource => Some("Check permissions on the .metadata.json sidecar."),
            Self::MetadataInvalid => {
                Some("The sidecar is corrupt or from an incompatible writer; it is never patched.")
            }
            Self::MetadataKeyNotFound => None,
            Self::MetadataWriteFailed | Self::ChunkAppendFailed => {
                Some("Check disk space and write permissions.")
            }
            Self::ManagedFileFailed => Some(
                "Delete and archive are best-effort; inspect the group directory for leftovers.",
            ),
            Self::ChunkFileNotFound => Some("The chunk has no data yet, or was deleted/archived."),
            Self::ChunkReadFailed => Some("Retry from the polling loop."),
            Self::UnknownChecksumType => Some("Use one of: md5, sha256, blake3."),
            Self::ConfigParseError => Some("Fix syntax in chunky.toml and retry."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
