//! high-level operations on snapshot stores

mod log;
mod materialize;
mod snapshot;

pub use log::{history, HistoryEntry};
pub use materialize::materialize;
pub use snapshot::{read_tree, snapshot_dir};
