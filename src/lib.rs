//! snapcache - command memoization over content-addressed snapshots
//!
//! decides whether a previous run of a command can be reused against the
//! current working-tree snapshot, even when the snapshot is not
//! byte-identical to the one the run saw.
//!
//! # Core concepts
//!
//! - **Snapshot**: an immutable file tree, identified by the hash of its recipe
//! - **Recipe**: an op applied to input snapshots (one for edits, several for merges)
//! - **Matcher**: a set of paths in restricted normal form
//! - **Preserve boundary**: the matcher a prior run recorded as the files it observed
//! - **Key**: deterministic fingerprint of a command, keying the run store
//!
//! # Lookup
//!
//! the [`Engine`] fingerprints the command and asks the run store. on a miss
//! it walks back through linear recipes (at most 10 edits by default),
//! rewriting the accumulated edits against the stored run's boundary. edits
//! outside the boundary are eclipsed; any edit inside blocks reuse and is
//! reported back.
//!
//! # Example usage
//!
//! ```
//! use snapcache::{Cmd, CmdKind, Context, Engine, Lookup, Matcher, MemStore, Op, RunInfo, SnapshotId};
//!
//! let store = MemStore::new();
//! let s1 = store.apply(SnapshotId::EMPTY, Op::write("foo.txt", "A"), "edit").unwrap();
//! let s2 = store.apply(s1, Op::write("foo.txt", "B"), "edit").unwrap();
//!
//! let cmd = Cmd::new(s1, ["make"]).with_kind(CmdKind::Preserve);
//! let seen = Matcher::files(&["bar.txt"]).unwrap();
//! store.record_run(&cmd, RunInfo::new("r1").with_matcher(seen)).unwrap();
//!
//! let engine = Engine::new(&store, &store);
//! let lookup = engine.get_associated_id(&Context::background(), &cmd.at(s2)).unwrap();
//! assert_eq!(lookup, Lookup::Reuse("r1".into()));
//! ```

mod config;
mod context;
mod error;
mod hash;
mod reuse;
mod transform;

pub mod cmd;
pub mod matcher;
pub mod ops;
pub mod path;
pub mod refs;
pub mod store;
pub mod types;

pub use cmd::{AssociatedId, Cmd, CmdKind, Key, RunInfo};
pub use config::{Config, DEFAULT_MAX_DEPTH};
pub use context::Context;
pub use error::{Error, Result};
pub use hash::SnapshotId;
pub use matcher::Matcher;
pub use reuse::{Engine, Lookup};
pub use store::{FsStore, MemStore, RecipePath, RecipeStore, RecipeWriter, RunStore};
pub use transform::left_eclipsing_transform;
pub use types::{FileEntry, FileOp, Op, Preserve, Recipe, Tree};
