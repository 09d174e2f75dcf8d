use std::path::PathBuf;

use crate::types::Op;

/// error type for snapcache operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("op not supported by transform: {0}")]
    NotSupported(Box<Op>),

    #[error("matcher cannot be inverted in normal form: {0}")]
    NotInvertible(String),

    #[error("matcher combination leaves normal form: {0}")]
    NotNormal(String),

    #[error("unknown command kind: {0}")]
    UnknownKind(String),

    #[error("operation canceled")]
    Canceled,

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("store error: {0}")]
    Store(String),

    #[error("invalid pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("snapshot not found: {0}")]
    SnapshotNotFound(String),

    #[error("recipe for {0} would introduce a cycle")]
    Cycle(String),

    #[error("plain command cannot carry a preservation matcher")]
    MatcherOnPlainCommand,

    #[error("store not found at {0}")]
    NoStore(PathBuf),

    #[error("store already exists at {0}")]
    StoreExists(PathBuf),

    #[error("lock contention on store")]
    LockContention,

    #[error("ref not found: {0}")]
    RefNotFound(String),

    #[error("invalid ref name: {0}")]
    InvalidRef(String),

    #[error("invalid hash hex: {0}")]
    InvalidHashHex(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cbor serialization error: {0}")]
    CborEncode(#[from] ciborium::ser::Error<std::io::Error>),

    #[error("cbor deserialization error: {0}")]
    CborDecode(#[from] ciborium::de::Error<std::io::Error>),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("config serialization error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),
}

impl Error {
    /// the op that stopped a transform, if this error carries one
    pub fn offending_op(&self) -> Option<&Op> {
        match self {
            Error::NotSupported(op) => Some(op),
            _ => None,
        }
    }

    /// true for errors raised by the caller's context rather than the engine
    pub fn is_context(&self) -> bool {
        matches!(self, Error::Canceled | Error::DeadlineExceeded)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// helper to wrap io errors with path context
pub trait IoResultExt<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| Error::Io {
            path: path.into(),
            source,
        })
    }
}

/// map a poisoned lock into a store error
pub(crate) fn poisoned<T>(_: std::sync::PoisonError<T>) -> Error {
    Error::Store("lock poisoned".to_string())
}
