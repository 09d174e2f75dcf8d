//! rewriting edits against a preservation boundary

use tracing::trace;

use crate::error::{Error, Result};
use crate::matcher::Matcher;
use crate::types::{Op, Preserve};

/// rewrite `op` as it appears to a run that only observed `preserve`'s region
///
/// edits outside the region collapse to `Identity`; edits inside it come
/// back unchanged. ops with no single path (preserve, merge) are rejected.
pub fn left_eclipsing_transform(op: &Op, preserve: &Preserve) -> Result<Op> {
    let visible = match op {
        Op::Identity => return Ok(Op::Identity),
        Op::WriteFile(_) | Op::RemoveFile(_) | Op::Chmod(_) => {
            let path = op.file_path().unwrap_or_default();
            preserve.matcher.matches(path)
        }
        Op::Mkdir(dir) => dir_visible(&preserve.matcher, &dir.path),
        Op::RemoveDir(dir) => dir_visible(&preserve.matcher, &dir.path),
        Op::Preserve(_) | Op::Merge => return Err(Error::NotSupported(Box::new(op.clone()))),
    };

    trace!(op = %op, visible, "transform");
    if visible {
        Ok(op.clone())
    } else {
        Ok(Op::Identity)
    }
}

/// a directory edit is seen when the directory or anything beneath it may match
fn dir_visible(matcher: &Matcher, dir: &str) -> bool {
    matcher.matches(dir) || !matcher.child(dir).is_empty()
}
