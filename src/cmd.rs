//! command descriptions and their fingerprint
//!
//! # Key format
//!
//! key = base64url_nopad(SHA256(cbor(canonical command)))
//!
//! the canonical command is a CBOR array, in this order:
//!   dir: snapshot id as 64 hex chars
//!   argv: array of text
//!   snapshot_fs: sorted pattern list (absent matcher => empty array)
//!   kind: unsigned (plain=0, preserve=1, plugin=2)
//!   deps_file: text
//!   env: array of [key, value] pairs sorted by key bytes
//!   owner: text
//!   container_name: text
//!   network: bool
//!
//! artifact paths never enter the key.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::hash::SnapshotId;
use crate::matcher::Matcher;

/// length of an encoded key: 32 digest bytes in unpadded base64
pub const KEY_LEN: usize = 43;

/// whether a command declares a preservation contract
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CmdKind {
    #[default]
    Plain,
    Preserve,
    Plugin,
}

impl CmdKind {
    /// wire code used in the fingerprint
    pub fn code(self) -> u8 {
        match self {
            CmdKind::Plain => 0,
            CmdKind::Preserve => 1,
            CmdKind::Plugin => 2,
        }
    }

    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(CmdKind::Plain),
            1 => Ok(CmdKind::Preserve),
            2 => Ok(CmdKind::Plugin),
            other => Err(Error::UnknownKind(other.to_string())),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CmdKind::Plain => "plain",
            CmdKind::Preserve => "preserve",
            CmdKind::Plugin => "plugin",
        }
    }

    /// does a run of this kind record a preservation matcher
    pub fn preserves(self) -> bool {
        !matches!(self, CmdKind::Plain)
    }
}

impl FromStr for CmdKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "plain" => Ok(CmdKind::Plain),
            "preserve" => Ok(CmdKind::Preserve),
            "plugin" => Ok(CmdKind::Plugin),
            other => match other.parse::<u8>() {
                Ok(code) => Self::from_code(code),
                Err(_) => Err(Error::UnknownKind(s.to_string())),
            },
        }
    }
}

impl TryFrom<String> for CmdKind {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<CmdKind> for String {
    fn from(kind: CmdKind) -> String {
        kind.name().to_string()
    }
}

impl fmt::Display for CmdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// a command invocation against a working-tree snapshot
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cmd {
    /// working-tree snapshot at invocation
    pub dir: SnapshotId,
    pub argv: Vec<String>,
    /// files the command may read
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_fs: Option<Matcher>,
    #[serde(default)]
    pub kind: CmdKind,
    /// file listing additional inputs
    #[serde(default)]
    pub deps_file: String,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub container_name: String,
    #[serde(default)]
    pub network: bool,
    /// transient output paths; not part of the key
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<String>,
}

/// field order of this tuple is the wire order of the fingerprint
#[derive(Serialize)]
struct CanonicalCmd<'a>(
    String,
    &'a [String],
    Vec<String>,
    u8,
    &'a str,
    Vec<(&'a str, &'a str)>,
    &'a str,
    &'a str,
    bool,
);

impl Cmd {
    pub fn new(dir: SnapshotId, argv: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            dir,
            argv: argv.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_kind(mut self, kind: CmdKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_snapshot_fs(mut self, matcher: Matcher) -> Self {
        self.snapshot_fs = Some(matcher);
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// the same command against another snapshot
    pub fn at(&self, dir: SnapshotId) -> Self {
        Self {
            dir,
            ..self.clone()
        }
    }

    /// deterministic binary form hashed into the key
    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        let mut patterns = self
            .snapshot_fs
            .as_ref()
            .map(Matcher::to_patterns)
            .unwrap_or_default();
        patterns.sort();

        let mut env: Vec<(&str, &str)> = self
            .env
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        env.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

        let canonical = CanonicalCmd(
            self.dir.to_hex(),
            &self.argv,
            patterns,
            self.kind.code(),
            &self.deps_file,
            env,
            &self.owner,
            &self.container_name,
            self.network,
        );

        let mut bytes = Vec::new();
        ciborium::into_writer(&canonical, &mut bytes)?;
        Ok(bytes)
    }

    /// fingerprint used to key the run store
    pub fn key(&self) -> Result<Key> {
        let digest = Sha256::digest(self.canonical_bytes()?);
        Ok(Key(URL_SAFE_NO_PAD.encode(digest)))
    }
}

/// run-store key of a command
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Key(String);

impl Key {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Key {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let valid = s.len() == KEY_LEN
            && URL_SAFE_NO_PAD
                .decode(s)
                .map(|bytes| bytes.len() == 32)
                .unwrap_or(false);
        if !valid {
            return Err(Error::InvalidKey(s.to_string()));
        }
        Ok(Key(s.to_string()))
    }
}

impl TryFrom<String> for Key {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Key> for String {
    fn from(key: Key) -> String {
        key.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// opaque identifier of a recorded run
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssociatedId(String);

impl AssociatedId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for AssociatedId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AssociatedId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for AssociatedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// what the run store knows about the last successful run of a command
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInfo {
    pub id: AssociatedId,
    /// boundary the run observed; only for preserve and plugin commands
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matcher: Option<Matcher>,
}

impl RunInfo {
    pub fn new(id: impl Into<AssociatedId>) -> Self {
        Self {
            id: id.into(),
            matcher: None,
        }
    }

    pub fn with_matcher(mut self, matcher: Matcher) -> Self {
        self.matcher = Some(matcher);
        self
    }

    /// reject a matcher on a plain command
    pub fn validate_for(&self, kind: CmdKind) -> Result<()> {
        if self.matcher.is_some() && !kind.preserves() {
            return Err(Error::MatcherOnPlainCommand);
        }
        Ok(())
    }
}
