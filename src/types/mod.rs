mod op;
mod recipe;
mod tree;

pub use op::{Chmod, FileOp, Mkdir, Op, Preserve, RemoveDir, RemoveFile, WriteFile, DEFAULT_MODE};
pub use recipe::Recipe;
pub use tree::{FileEntry, Tree};
