pub mod archive;
pub mod delete;
pub mod meta;
pub mod read;
pub mod slice;
pub mod write;

use std::fmt;
use std::path::{Path, PathBuf};

use chunky_core::{
    AppendError, Chunk, ChunkConfig, ChunkError, ConfigError, ErrorCode, MetadataError, ReadError,
};
use tracing::warn;

use crate::output::{CliError, OutputMode, render_error};

/// A core error that carries a stable [`ErrorCode`].
pub trait Coded: std::error::Error + Send + Sync + 'static {
    fn error_code(&self) -> ErrorCode;
}

macro_rules! impl_coded {
    ($($ty:ty),* $(,)?) => {
        $(impl Coded for $ty {
            fn error_code(&self) -> ErrorCode {
                self.code()
            }
        })*
    };
}

impl_coded!(AppendError, ChunkError, ConfigError, MetadataError, ReadError);

/// Context marking an error that has already been rendered to stderr.
///
/// `main` exits without printing errors that carry it a second time.
#[derive(Debug, Clone, Copy)]
pub struct Reported;

impl fmt::Display for Reported {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("error already reported")
    }
}

/// Render `err` to stderr with its code and hint, and hand it back for `?`.
pub fn report<E: Coded>(output: OutputMode, err: E) -> anyhow::Error {
    let code = err.error_code();
    let cli_error = CliError {
        message: err.to_string(),
        suggestion: code.hint().map(str::to_string),
        error_code: Some(code.code().to_string()),
    };
    emit(output, &cli_error);
    anyhow::Error::new(err).context(Reported)
}

/// Render a CLI-level failure and return it marked as reported.
pub fn fail(output: OutputMode, cli_error: CliError) -> anyhow::Error {
    emit(output, &cli_error);
    anyhow::anyhow!(cli_error.message).context(Reported)
}

fn emit(output: OutputMode, cli_error: &CliError) {
    if let Err(render_err) = render_error(output, cli_error) {
        warn!(error = %render_err, "failed to render error");
    }
}

/// Whether `err` still needs to be shown to the user.
pub fn is_reported(err: &anyhow::Error) -> bool {
    err.downcast_ref::<Reported>().is_some()
}

/// Everything a command needs to locate chunks in one group directory.
#[derive(Debug)]
pub struct GroupContext {
    pub group: PathBuf,
    pub config: ChunkConfig,
    pub output: OutputMode,
}

impl GroupContext {
    /// Load the group's config: `config_path` if given, otherwise
    /// `<group>/chunky.toml` when present.
    pub fn load(
        group: PathBuf,
        config_path: Option<&Path>,
        output: OutputMode,
    ) -> anyhow::Result<Self> {
        let config = match config_path {
            Some(path) if !path.exists() => {
                return Err(fail(
                    output,
                    CliError::with_details(
                        format!("config file not found: {}", path.display()),
                        "pass an existing file to --config, or omit it to use <group>/chunky.toml",
                        ErrorCode::ConfigParseError.code(),
                    ),
                ));
            }
            Some(path) => ChunkConfig::load(path),
            None => ChunkConfig::load_for_group(&group),
        }
        .map_err(|err| report(output, err))?;

        Ok(Self {
            group,
            config,
            output,
        })
    }

    /// Open the chunk `name` in this group.
    pub fn open_chunk(&self, name: &str) -> anyhow::Result<Chunk> {
        if let Err(reason) = validate_chunk_name(name) {
            return Err(fail(
                self.output,
                CliError::with_details(
                    format!("invalid chunk name '{name}': {reason}"),
                    "use a plain file stem such as `chunk_1`",
                    "invalid_chunk_name",
                ),
            ));
        }
        Chunk::open_with(&self.group, name, &self.config).map_err(|err| report(self.output, err))
    }
}

/// A chunk name becomes a file stem inside the group directory.
pub fn validate_chunk_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("name is empty");
    }
    if name == "." || name == ".." {
        return Err("name is a relative directory");
    }
    if name.contains(['/', '\\']) {
        return Err("name contains a path separator");
    }
    if name.chars().any(char::is_control) {
        return Err("name contains a control character");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reported_errors_are_marked() {
        let err = report(
            OutputMode::Json,
            MetadataError::Key("missing.key".to_string()),
        );
        assert!(is_reported(&err));
        assert!(err.chain().any(|cause| cause.to_string().contains("missing.key")));

        let err = fail(OutputMode::Text, CliError::with_details("boom", "retry", "E0000"));
        assert!(is_reported(&err));

        assert!(!is_reported(&anyhow::anyhow!("plain io failure")));
    }

    #[test]
    fn chunk_names_are_plain_stems() {
        assert!(validate_chunk_name("chunk_1").is_ok());
        assert!(validate_chunk_name("2025-02-10.app").is_ok());
        assert_eq!(validate_chunk_name(""), Err("name is empty"));
        assert_eq!(validate_chunk_name(".."), Err("name is a relative directory"));
        assert_eq!(
            validate_chunk_name("../escape"),
            Err("name contains a path separator")
        );
        assert_eq!(
            validate_chunk_name("bad\nname"),
            Err("name contains a control character")
        );
    }

    #[test]
    fn coded_errors_expose_their_code() {
        let err = ReadError::NotFound {
            path: PathBuf::from("x.chunk"),
        };
        assert_eq!(err.error_code(), ErrorCode::ChunkFileNotFound);
    }
}
