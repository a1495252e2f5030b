//! The JSON metadata sidecar that describes one chunk.
//!
//! On disk the sidecar is a JSON object mapping each key to a typed value:
//!
//! ```text
//! {
//!   "chunk.line.count": { "value": 1440, "type": "int" },
//!   "chunk.file":       { "value": "chunk_1.chunk", "type": "path" },
//!   ...
//! }
//! ```
//!
//! # Invariants
//!
//! - A loaded sidecar contains every key in [`REQUIRED_KEYS`] with its
//!   required type. Anything else is rejected, never patched.
//! - Every entry carries one of the five [`MetaType`]s. In memory the type is
//!   the variant of [`MetaValue`], so a value and its declared type cannot
//!   drift apart.
//! - `set` never changes a key's type and `add` never overwrites.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::checksum::{ChecksumKind, checksum_of};
use crate::error::ErrorCode;

pub const CHUNK_FILE_KEY: &str = "chunk.file";
pub const TIME_CREATE_KEY: &str = "chunk.time.create";
pub const TIME_UPDATE_KEY: &str = "chunk.time.update";
pub const LINE_COUNT_KEY: &str = "chunk.line.count";
pub const CHECKSUM_HASH_KEY: &str = "chunk.checksum.hash";
pub const CHECKSUM_TYPE_KEY: &str = "chunk.checksum.type";

/// Keys every sidecar must carry, with the type each must have.
pub const REQUIRED_KEYS: [(&str, MetaType); 6] = [
    (CHUNK_FILE_KEY, MetaType::Path),
    (TIME_CREATE_KEY, MetaType::Int),
    (TIME_UPDATE_KEY, MetaType::Int),
    (LINE_COUNT_KEY, MetaType::Int),
    (CHECKSUM_HASH_KEY, MetaType::Str),
    (CHECKSUM_TYPE_KEY, MetaType::Str),
];

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors raised while loading, mutating, or persisting metadata.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    /// The sidecar exists but could not be read.
    #[error("unable to source metadata {}: {source}", path.display())]
    Source { path: PathBuf, source: io::Error },

    /// The sidecar is not a JSON object of `{value, type}` entries.
    #[error("metadata {} is malformed: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// One or more required keys are absent.
    #[error("missing metadata key(s) {} in {}", keys.join(", "), path.display())]
    MissingKeys { path: PathBuf, keys: Vec<String> },

    /// A required key is present with the wrong declared type.
    #[error("metadata key {key} must be {expected}, found {found}")]
    WrongType {
        key: String,
        expected: MetaType,
        found: MetaType,
    },

    /// A type tag outside `str|int|float|bool|path`.
    #[error("unknown value type not in schema: {0}")]
    UnknownType(String),

    /// A value that cannot be converted to its declared type.
    #[error("value {value} for metadata key {key} cannot be coerced to {kind}")]
    Coerce {
        key: String,
        value: String,
        kind: MetaType,
    },

    /// `add` was called for a key that already exists.
    #[error("metadata key already exists: {0}")]
    DuplicateKey(String),

    /// `set` was called with a value of a different type than declared.
    #[error("metadata key {key} is declared {declared}, cannot set a {found} value")]
    TypeMismatch {
        key: String,
        declared: MetaType,
        found: MetaType,
    },

    /// Floats must be finite to have a JSON representation.
    #[error("metadata key {0} has a non-finite float value")]
    NonFinite(String),

    /// Access to a key that does not exist.
    #[error("metadata non-existent key: {0}")]
    Key(String),

    /// The sidecar could not be written.
    #[error("unable to write metadata {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },
}

impl MetadataError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Source { .. } => ErrorCode::MetadataSource,
            Self::Key(_) => ErrorCode::MetadataKeyNotFound,
            Self::Write { .. } => ErrorCode::MetadataWriteFailed,
            Self::Parse { .. }
            | Self::MissingKeys { .. }
            | Self::WrongType { .. }
            | Self::UnknownType(_)
            | Self::Coerce { .. }
            | Self::DuplicateKey(_)
            | Self::TypeMismatch { .. }
            | Self::NonFinite(_) => ErrorCode::MetadataInvalid,
        }
    }

    /// `true` for errors meaning the sidecar or a value failed validation.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self.code(), ErrorCode::MetadataInvalid)
    }
}

// ---------------------------------------------------------------------------
// Typed values
// ---------------------------------------------------------------------------

/// The five value types a metadata entry can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetaType {
    Str,
    Int,
    Float,
    Bool,
    Path,
}

impl MetaType {
    /// Tag as written in the sidecar's `type` field.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Str => "str",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::Path => "path",
        }
    }

    /// Convert a JSON value to this type, or `None` if it cannot be.
    ///
    /// Numbers may arrive as JSON numbers or decimal strings; booleans as
    /// JSON booleans, `0`/`1`, or `true/false`, `yes/no`, `on/off`.
    #[must_use]
    pub fn coerce(self, value: &Value) -> Option<MetaValue> {
        match (self, value) {
            (Self::Str, Value::String(s)) => Some(MetaValue::Str(s.clone())),
            (Self::Str, Value::Number(n)) => Some(MetaValue::Str(n.to_string())),
            (Self::Str, Value::Bool(b)) => Some(MetaValue::Str(b.to_string())),
            (Self::Int, Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().and_then(whole_float_to_int))
                .map(MetaValue::Int),
            (Self::Int, Value::String(s)) => s.trim().parse().ok().map(MetaValue::Int),
            (Self::Float, Value::Number(n)) => n.as_f64().map(MetaValue::Float),
            (Self::Float, Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(MetaValue::Float),
            (Self::Bool, Value::Bool(b)) => Some(MetaValue::Bool(*b)),
            (Self::Bool, Value::Number(n)) => match n.as_i64() {
                Some(0) => Some(MetaValue::Bool(false)),
                Some(1) => Some(MetaValue::Bool(true)),
                _ => None,
            },
            (Self::Bool, Value::String(s)) => parse_bool(s).map(MetaValue::Bool),
            (Self::Path, Value::String(s)) => Some(MetaValue::Path(normalize_path(s))),
            _ => None,
        }
    }
}

impl fmt::Display for MetaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetaType {
    type Err = MetadataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "str" => Ok(Self::Str),
            "int" => Ok(Self::Int),
            "float" => Ok(Self::Float),
            "bool" => Ok(Self::Bool),
            "path" => Ok(Self::Path),
            other => Err(MetadataError::UnknownType(other.to_string())),
        }
    }
}

/// A metadata value; the variant is the declared type.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Path(PathBuf),
}

impl MetaValue {
    #[must_use]
    pub const fn meta_type(&self) -> MetaType {
        match self {
            Self::Str(_) => MetaType::Str,
            Self::Int(_) => MetaType::Int,
            Self::Float(_) => MetaType::Float,
            Self::Bool(_) => MetaType::Bool,
            Self::Path(_) => MetaType::Path,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Self::Path(p) => Some(p),
            _ => None,
        }
    }

    /// JSON form written to the sidecar's `value` field.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Str(s) => Value::String(s.clone()),
            Self::Int(v) => Value::from(*v),
            Self::Float(v) => serde_json::Number::from_f64(*v).map_or(Value::Null, Value::Number),
            Self::Bool(v) => Value::Bool(*v),
            Self::Path(p) => Value::String(p.to_string_lossy().into_owned()),
        }
    }

    const fn is_finite(&self) -> bool {
        match self {
            Self::Float(v) => v.is_finite(),
            _ => true,
        }
    }
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Path(p) => write!(f, "{}", p.display()),
        }
    }
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for MetaValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for MetaValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for MetaValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<PathBuf> for MetaValue {
    fn from(value: PathBuf) -> Self {
        Self::Path(value)
    }
}

impl From<&Path> for MetaValue {
    fn from(value: &Path) -> Self {
        Self::Path(value.to_path_buf())
    }
}

/// On-disk shape of one sidecar entry.
#[derive(Debug, Serialize, Deserialize)]
struct RawEntry {
    value: Value,
    #[serde(rename = "type")]
    kind: String,
}

// ---------------------------------------------------------------------------
// MetaData
// ---------------------------------------------------------------------------

/// In-memory view of one chunk's metadata sidecar.
#[derive(Debug, Clone)]
pub struct MetaData {
    file: PathBuf,
    entries: BTreeMap<String, MetaValue>,
    default_checksum: ChecksumKind,
}

impl MetaData {
    /// Load the sidecar at `file`, or populate defaults if it does not exist.
    ///
    /// Defaults are held in memory only; nothing is written until
    /// [`write_to_disk`](Self::write_to_disk).
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::Source`] if the file exists but cannot be
    /// read, and a validation error if it is malformed or incomplete.
    pub fn load(file: impl Into<PathBuf>) -> Result<Self, MetadataError> {
        Self::load_with(file, ChecksumKind::default())
    }

    /// Like [`load`](Self::load), with the checksum type recorded in a fresh
    /// sidecar.
    ///
    /// # Errors
    ///
    /// Same as [`load`](Self::load).
    pub fn load_with(
        file: impl Into<PathBuf>,
        default_checksum: ChecksumKind,
    ) -> Result<Self, MetadataError> {
        let file = file.into();
        let entries = read_entries(&file, default_checksum)?;
        Ok(Self {
            file,
            entries,
            default_checksum,
        })
    }

    /// Re-read the sidecar from disk, replacing the in-memory state.
    ///
    /// On error the previous state is kept.
    ///
    /// # Errors
    ///
    /// Same as [`load`](Self::load).
    pub fn reload(&mut self) -> Result<(), MetadataError> {
        self.entries = read_entries(&self.file, self.default_checksum)?;
        debug!(path = %self.file.display(), "metadata reloaded");
        Ok(())
    }

    /// Serialize every entry and replace the sidecar on disk.
    ///
    /// The JSON is written to a sibling temporary file and renamed into
    /// place, so a concurrent reader sees either the old or the new sidecar.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::Write`] if the file cannot be written.
    pub fn write_to_disk(&self) -> Result<(), MetadataError> {
        let raw: BTreeMap<&str, RawEntry> = self
            .entries
            .iter()
            .map(|(key, value)| {
                (
                    key.as_str(),
                    RawEntry {
                        value: value.to_json(),
                        kind: value.meta_type().as_str().to_string(),
                    },
                )
            })
            .collect();

        let write_err = |source| MetadataError::Write {
            path: self.file.clone(),
            source,
        };
        let bytes = serde_json::to_vec_pretty(&raw).map_err(|e| write_err(e.into()))?;

        let tmp = tmp_path(&self.file);
        fs::write(&tmp, bytes).map_err(write_err)?;
        fs::rename(&tmp, &self.file).map_err(write_err)?;

        debug!(path = %self.file.display(), entries = self.entries.len(), "metadata written");
        Ok(())
    }

    /// Live digest of the sidecar's current on-disk bytes.
    ///
    /// Returns an empty string when the sidecar has never been written.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::Source`] if the file exists but cannot be
    /// read.
    pub fn checksum(&self) -> Result<String, MetadataError> {
        match checksum_of(&self.file, self.default_checksum) {
            Ok(digest) => Ok(digest),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(String::new()),
            Err(source) => Err(MetadataError::Source {
                path: self.file.clone(),
                source,
            }),
        }
    }

    /// Path of the sidecar file.
    #[must_use]
    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Current value for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::Key`] if the key does not exist.
    pub fn get(&self, key: &str) -> Result<&MetaValue, MetadataError> {
        self.entries
            .get(key)
            .ok_or_else(|| MetadataError::Key(key.to_string()))
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Replace the value of an existing key, keeping its declared type.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::Key`] for an unknown key,
    /// [`MetadataError::TypeMismatch`] when `value` has another type, and
    /// [`MetadataError::NonFinite`] for NaN or infinite floats.
    pub fn set(&mut self, key: &str, value: impl Into<MetaValue>) -> Result<(), MetadataError> {
        let value = value.into();
        let current = self
            .entries
            .get_mut(key)
            .ok_or_else(|| MetadataError::Key(key.to_string()))?;

        if current.meta_type() != value.meta_type() {
            return Err(MetadataError::TypeMismatch {
                key: key.to_string(),
                declared: current.meta_type(),
                found: value.meta_type(),
            });
        }
        if !value.is_finite() {
            return Err(MetadataError::NonFinite(key.to_string()));
        }

        *current = value;
        Ok(())
    }

    /// Insert a new typed entry.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::DuplicateKey`] if the key exists and
    /// [`MetadataError::NonFinite`] for NaN or infinite floats.
    pub fn add(&mut self, key: &str, value: impl Into<MetaValue>) -> Result<(), MetadataError> {
        let value = value.into();
        if self.entries.contains_key(key) {
            return Err(MetadataError::DuplicateKey(key.to_string()));
        }
        if !value.is_finite() {
            return Err(MetadataError::NonFinite(key.to_string()));
        }

        debug!(key, value = %value, kind = %value.meta_type(), "metadata added");
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    /// Insert a new entry from an untyped value and a type name.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::UnknownType`] if `type_name` is not one of
    /// the five supported types, [`MetadataError::Coerce`] if the value
    /// cannot become that type, and the errors of [`add`](Self::add).
    pub fn add_raw(
        &mut self,
        key: &str,
        value: impl Into<Value>,
        type_name: &str,
    ) -> Result<(), MetadataError> {
        let kind: MetaType = type_name.parse()?;
        let value = value.into();
        let typed = kind.coerce(&value).ok_or_else(|| MetadataError::Coerce {
            key: key.to_string(),
            value: value.to_string(),
            kind,
        })?;
        self.add(key, typed)
    }

    /// Iterate entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetaValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // -----------------------------------------------------------------------
    // Required keys
    // -----------------------------------------------------------------------

    #[must_use]
    pub fn chunk_file(&self) -> &Path {
        self.entries
            .get(CHUNK_FILE_KEY)
            .and_then(MetaValue::as_path)
            .unwrap_or_else(|| Path::new(""))
    }

    #[must_use]
    pub fn time_create(&self) -> i64 {
        self.int(TIME_CREATE_KEY)
    }

    #[must_use]
    pub fn time_update(&self) -> i64 {
        self.int(TIME_UPDATE_KEY)
    }

    #[must_use]
    pub fn line_count(&self) -> u64 {
        u64::try_from(self.int(LINE_COUNT_KEY)).unwrap_or(0)
    }

    #[must_use]
    pub fn checksum_hash(&self) -> &str {
        self.str(CHECKSUM_HASH_KEY)
    }

    #[must_use]
    pub fn checksum_type(&self) -> &str {
        self.str(CHECKSUM_TYPE_KEY)
    }

    pub fn set_chunk_file(&mut self, file: impl Into<PathBuf>) {
        self.entries
            .insert(CHUNK_FILE_KEY.to_string(), MetaValue::Path(file.into()));
    }

    pub fn set_time_create(&mut self, millis: i64) {
        self.entries
            .insert(TIME_CREATE_KEY.to_string(), MetaValue::Int(millis));
    }

    pub fn set_time_update(&mut self, millis: i64) {
        self.entries
            .insert(TIME_UPDATE_KEY.to_string(), MetaValue::Int(millis));
    }

    pub fn set_line_count(&mut self, count: u64) {
        let count = i64::try_from(count).unwrap_or(i64::MAX);
        self.entries
            .insert(LINE_COUNT_KEY.to_string(), MetaValue::Int(count));
    }

    pub fn set_checksum_hash(&mut self, hash: impl Into<String>) {
        self.entries
            .insert(CHECKSUM_HASH_KEY.to_string(), MetaValue::Str(hash.into()));
    }

    pub fn set_checksum_type(&mut self, kind: ChecksumKind) {
        self.entries.insert(
            CHECKSUM_TYPE_KEY.to_string(),
            MetaValue::Str(kind.as_str().to_string()),
        );
    }

    fn int(&self, key: &str) -> i64 {
        self.entries
            .get(key)
            .and_then(MetaValue::as_int)
            .unwrap_or(0)
    }

    fn str(&self, key: &str) -> &str {
        self.entries
            .get(key)
            .and_then(MetaValue::as_str)
            .unwrap_or("")
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn default_entries(checksum: ChecksumKind) -> BTreeMap<String, MetaValue> {
    BTreeMap::from([
        (CHUNK_FILE_KEY.to_string(), MetaValue::Path(PathBuf::new())),
        (TIME_CREATE_KEY.to_string(), MetaValue::Int(0)),
        (TIME_UPDATE_KEY.to_string(), MetaValue::Int(0)),
        (LINE_COUNT_KEY.to_string(), MetaValue::Int(0)),
        (CHECKSUM_HASH_KEY.to_string(), MetaValue::Str(String::new())),
        (
            CHECKSUM_TYPE_KEY.to_string(),
            MetaValue::Str(checksum.as_str().to_string()),
        ),
    ])
}

fn read_entries(
    path: &Path,
    default_checksum: ChecksumKind,
) -> Result<BTreeMap<String, MetaValue>, MetadataError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no metadata sidecar, using defaults");
            return Ok(default_entries(default_checksum));
        }
        Err(source) => {
            return Err(MetadataError::Source {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let raw: BTreeMap<String, RawEntry> =
        serde_json::from_slice(&bytes).map_err(|source| MetadataError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    let mut entries = BTreeMap::new();
    for (key, entry) in raw {
        let kind: MetaType = entry.kind.parse()?;
        let value = kind
            .coerce(&entry.value)
            .ok_or_else(|| MetadataError::Coerce {
                key: key.clone(),
                value: entry.value.to_string(),
                kind,
            })?;
        entries.insert(key, value);
    }

    validate_required(path, &entries)?;
    debug!(path = %path.display(), entries = entries.len(), "metadata loaded");
    Ok(entries)
}

fn validate_required(
    path: &Path,
    entries: &BTreeMap<String, MetaValue>,
) -> Result<(), MetadataError> {
    let missing: Vec<String> = REQUIRED_KEYS
        .iter()
        .filter(|(key, _)| !entries.contains_key(*key))
        .map(|(key, _)| (*key).to_string())
        .collect();
    if !missing.is_empty() {
        return Err(MetadataError::MissingKeys {
            path: path.to_path_buf(),
            keys: missing,
        });
    }

    for (key, expected) in REQUIRED_KEYS {
        let found = entries.get(key).map(MetaValue::meta_type);
        if let Some(found) = found.filter(|found| *found != expected) {
            return Err(MetadataError::WrongType {
                key: key.to_string(),
                expected,
                found,
            });
        }
    }
    Ok(())
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

/// `1440.0` is an int; `1440.5` and anything outside `i64` are not.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::float_cmp
)]
fn whole_float_to_int(f: f64) -> Option<i64> {
    let in_range = f >= i64::MIN as f64 && f < i64::MAX as f64;
    (in_range && f.fract() == 0.0).then_some(f as i64)
}

/// Drop redundant separators and interior `.` components.
fn normalize_path(raw: &str) -> PathBuf {
    Path::new(raw).components().collect()
}

fn tmp_path(file: &Path) -> PathBuf {
    let mut name = file
        .file_name()
        .map_or_else(OsString::new, ToOwned::to_owned);
    name.push(".tmp");
    file.with_file_name(name)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
