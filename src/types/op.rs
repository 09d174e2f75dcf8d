use std::fmt;

use serde::{Deserialize, Serialize};

use crate::matcher::Matcher;

/// default permission bits for written files
pub const DEFAULT_MODE: u32 = 0o644;

/// capability shared by every op that edits a single path
pub trait FileOp {
    /// the path the op edits
    fn file_path(&self) -> &str;

    /// true when the op edits a directory rather than one file
    fn is_dir_op(&self) -> bool {
        false
    }
}

/// set file contents
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteFile {
    pub path: String,
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
}

/// delete a file
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveFile {
    pub path: String,
}

/// change permission bits of a file
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chmod {
    pub path: String,
    pub mode: u32,
}

/// create an empty directory
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mkdir {
    pub path: String,
}

/// delete a directory and everything beneath it
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveDir {
    pub path: String,
}

/// keep only the paths the matcher accepts
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preserve {
    pub matcher: Matcher,
}

impl FileOp for WriteFile {
    fn file_path(&self) -> &str {
        &self.path
    }
}

impl FileOp for RemoveFile {
    fn file_path(&self) -> &str {
        &self.path
    }
}

impl FileOp for Chmod {
    fn file_path(&self) -> &str {
        &self.path
    }
}

impl FileOp for Mkdir {
    fn file_path(&self) -> &str {
        &self.path
    }

    fn is_dir_op(&self) -> bool {
        true
    }
}

impl FileOp for RemoveDir {
    fn file_path(&self) -> &str {
        &self.path
    }

    fn is_dir_op(&self) -> bool {
        true
    }
}

/// a single filesystem transformation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Op {
    Identity,
    WriteFile(WriteFile),
    RemoveFile(RemoveFile),
    Chmod(Chmod),
    Mkdir(Mkdir),
    RemoveDir(RemoveDir),
    Preserve(Preserve),
    /// union of several inputs, later inputs win
    Merge,
}

impl Op {
    pub fn write(path: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Op::WriteFile(WriteFile {
            path: path.into(),
            data: data.into(),
        })
    }

    pub fn remove(path: impl Into<String>) -> Self {
        Op::RemoveFile(RemoveFile { path: path.into() })
    }

    pub fn chmod(path: impl Into<String>, mode: u32) -> Self {
        Op::Chmod(Chmod {
            path: path.into(),
            mode,
        })
    }

    pub fn mkdir(path: impl Into<String>) -> Self {
        Op::Mkdir(Mkdir { path: path.into() })
    }

    pub fn remove_dir(path: impl Into<String>) -> Self {
        Op::RemoveDir(RemoveDir { path: path.into() })
    }

    pub fn preserve(matcher: Matcher) -> Self {
        Op::Preserve(Preserve { matcher })
    }

    pub fn is_identity(&self) -> bool {
        matches!(self, Op::Identity)
    }

    /// a linear op consumes exactly one input snapshot
    pub fn is_linear(&self) -> bool {
        !matches!(self, Op::Merge)
    }

    /// view the op as a single-path edit
    pub fn as_file_op(&self) -> Option<&dyn FileOp> {
        match self {
            Op::WriteFile(op) => Some(op),
            Op::RemoveFile(op) => Some(op),
            Op::Chmod(op) => Some(op),
            Op::Mkdir(op) => Some(op),
            Op::RemoveDir(op) => Some(op),
            Op::Identity | Op::Preserve(_) | Op::Merge => None,
        }
    }

    /// path edited by the op, if it edits one
    pub fn file_path(&self) -> Option<&str> {
        self.as_file_op().map(FileOp::file_path)
    }

    /// short name for logs and errors
    pub fn kind_name(&self) -> &'static str {
        match self {
            Op::Identity => "identity",
            Op::WriteFile(_) => "write",
            Op::RemoveFile(_) => "rm",
            Op::Chmod(_) => "chmod",
            Op::Mkdir(_) => "mkdir",
            Op::RemoveDir(_) => "rmdir",
            Op::Preserve(_) => "preserve",
            Op::Merge => "merge",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::WriteFile(op) => write!(f, "write {} ({} bytes)", op.path, op.data.len()),
            Op::Chmod(op) => write!(f, "chmod {:o} {}", op.mode, op.path),
            Op::Preserve(op) => write!(f, "preserve {}", op.matcher),
            other => match other.file_path() {
                Some(path) => write!(f, "{} {}", other.kind_name(), path),
                None => write!(f, "{}", other.kind_name()),
            },
        }
    }
}
