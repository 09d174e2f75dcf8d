use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::context::Context;
use crate::error::{Error, IoResultExt, Result};
use crate::hash::SnapshotId;
use crate::matcher::Matcher;
use crate::ops::materialize;
use crate::path::SEPARATOR;
use crate::store::RecipeWriter;
use crate::types::{FileEntry, Tree};

/// record the state of `dir` as a descendant of `parent`
///
/// every changed path becomes one linear recipe, in path order. returns
/// `parent` itself when nothing changed.
pub fn snapshot_dir<W: RecipeWriter>(
    ctx: &Context,
    store: &W,
    dir: &Path,
    parent: SnapshotId,
    tag: &str,
    ignore: &Matcher,
) -> Result<SnapshotId> {
    let base = materialize(ctx, store, parent)?;
    let current = read_tree(dir, ignore)?;

    let ops = base.diff(&current);
    let mut id = parent;
    for op in ops.iter().cloned() {
        ctx.check()?;
        debug!(op = %op, "snapshot edit");
        id = store.apply(id, op, tag)?;
    }

    info!(dir = %dir.display(), edits = ops.len(), snapshot = %id, "snapshot");
    Ok(id)
}

/// read a working directory into a tree, skipping ignored paths
///
/// only empty directories are recorded explicitly.
pub fn read_tree(dir: &Path, ignore: &Matcher) -> Result<Tree> {
    let mut tree = Tree::new();
    let mut dirs = Vec::new();

    let walker = WalkDir::new(dir)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| match relative(dir, entry.path()) {
            Some(rel) => !ignore.matches(&rel),
            None => true,
        });

    for entry in walker {
        let entry = entry.map_err(|e| Error::Io {
            path: e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf()),
            source: e.into(),
        })?;
        let path = entry.path();
        let Some(rel) = relative(dir, path) else {
            continue;
        };

        let file_type = entry.file_type();
        if file_type.is_dir() {
            dirs.push(rel);
        } else if file_type.is_file() {
            let data = fs::read(path).with_path(path)?;
            let meta = entry.metadata().map_err(|e| Error::Io {
                path: path.to_path_buf(),
                source: e.into(),
            })?;
            tree.insert(rel, FileEntry::new(data, meta.permissions().mode() & 0o7777));
        }
        // symlinks and special files are not tracked
    }

    for d in dirs {
        if !tree.has_beneath(&d) {
            tree.insert_dir(d);
        }
    }
    Ok(tree)
}

/// `path` relative to `root`, with `/` separators
fn relative(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(parts.join(&*SEPARATOR.to_string()))
}
