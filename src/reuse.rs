//! reuse search over recipe history
//!
//! a lookup first asks the run store about the command as given. on a miss
//! it walks backward through linear recipes of the command's snapshot,
//! accumulating the edits between each earlier snapshot and the current one,
//! and asks again at every step. a preserve or plugin run stays reusable as
//! long as every accumulated edit lies outside the boundary it observed.

use tracing::{debug, trace};

use crate::cmd::{AssociatedId, Cmd, CmdKind, Key};
use crate::config::DEFAULT_MAX_DEPTH;
use crate::context::Context;
use crate::error::Result;
use crate::store::{RecipeStore, RunStore};
use crate::transform::left_eclipsing_transform;
use crate::types::{Op, Preserve};

/// outcome of a lookup
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Lookup {
    /// a prior run can be reused
    Reuse(AssociatedId),
    /// no reusable run; these ops prevented reuse (never empty)
    Blocked(Vec<Op>),
    /// no candidate within the depth bound
    Miss,
}

impl Lookup {
    pub fn id(&self) -> Option<&AssociatedId> {
        match self {
            Lookup::Reuse(id) => Some(id),
            _ => None,
        }
    }

    pub fn blockers(&self) -> &[Op] {
        match self {
            Lookup::Blocked(ops) => ops,
            _ => &[],
        }
    }

    pub fn is_reuse(&self) -> bool {
        matches!(self, Lookup::Reuse(_))
    }

    /// paths of the blocking ops, for explaining a miss
    pub fn blocker_paths(&self) -> Vec<&str> {
        self.blockers().iter().filter_map(Op::file_path).collect()
    }

    fn from_blockers(ops: Vec<Op>) -> Self {
        if ops.is_empty() {
            Lookup::Miss
        } else {
            Lookup::Blocked(ops)
        }
    }
}

/// answers "can a previous run of this command be reused?"
///
/// holds no mutable state; share freely across threads.
#[derive(Debug)]
pub struct Engine<R, S> {
    recipes: R,
    runs: S,
    max_depth: usize,
}

impl<R: RecipeStore, S: RunStore> Engine<R, S> {
    pub fn new(recipes: R, runs: S) -> Self {
        Self {
            recipes,
            runs,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// override the bound on accumulated edits
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// fingerprint of `cmd`
    pub fn hash(&self, ctx: &Context, cmd: &Cmd) -> Result<Key> {
        ctx.check()?;
        cmd.key()
    }

    /// find a reusable run of `cmd`, or the edits that rule one out
    ///
    /// a transform failure comes back as `Error::NotSupported` carrying the
    /// offending op.
    pub fn get_associated_id(&self, ctx: &Context, cmd: &Cmd) -> Result<Lookup> {
        let (id, blockers) = self.search(ctx, cmd, Vec::new())?;
        let lookup = match id {
            Some(id) => Lookup::Reuse(id),
            None => Lookup::from_blockers(blockers),
        };
        debug!(dir = ?cmd.dir, result = ?lookup, "lookup");
        Ok(lookup)
    }

    fn search(
        &self,
        ctx: &Context,
        cmd: &Cmd,
        ops: Vec<Op>,
    ) -> Result<(Option<AssociatedId>, Vec<Op>)> {
        ctx.check()?;
        if ops.len() > self.max_depth {
            trace!(dir = ?cmd.dir, depth = ops.len(), "depth bound reached");
            return Ok((None, Vec::new()));
        }

        trace!(dir = ?cmd.dir, depth = ops.len(), "search step");
        let (id, changed) = self.try_reuse(ctx, cmd, &ops)?;
        if id.is_some() || !changed.is_empty() {
            return Ok((id, changed));
        }

        let mut best = changed;
        for path in self.recipes.all_paths_to_snapshot(ctx, &cmd.dir)? {
            let input = match path.recipe.input() {
                Some(input) if path.op.is_linear() => input,
                _ => continue,
            };

            let mut next_ops = ops.clone();
            if !path.op.is_identity() {
                next_ops.push(path.op);
            }

            let (id, changed) = self.search(ctx, &cmd.at(input), next_ops)?;
            if id.is_some() {
                return Ok((id, changed));
            }
            // shortest non-empty explanation; ties keep the first
            if best.is_empty() || (!changed.is_empty() && changed.len() < best.len()) {
                best = changed;
            }
        }

        Ok((None, best))
    }

    /// can the run stored for `cmd` absorb `ops`
    fn try_reuse(
        &self,
        ctx: &Context,
        cmd: &Cmd,
        ops: &[Op],
    ) -> Result<(Option<AssociatedId>, Vec<Op>)> {
        let key = self.hash(ctx, cmd)?;
        let info = self.runs.get_run_info(ctx, &key)?;

        let matcher = match cmd.kind {
            CmdKind::Plain => {
                if !ops.is_empty() {
                    return Ok((None, ops.to_vec()));
                }
                None
            }
            CmdKind::Preserve | CmdKind::Plugin => {
                if ops.is_empty() {
                    return Ok((hit(info.id), Vec::new()));
                }
                match info.matcher {
                    Some(matcher) => Some(matcher),
                    None => return Ok((None, Vec::new())),
                }
            }
        };

        if info.id.is_empty() {
            return Ok((None, Vec::new()));
        }

        if let Some(matcher) = matcher {
            let preserve = Preserve { matcher };
            for op in ops {
                let eclipsed = left_eclipsing_transform(op, &preserve)?;
                if !eclipsed.is_identity() {
                    trace!(key = %key, op = %eclipsed, "edit inside preserved region");
                    return Ok((None, vec![eclipsed]));
                }
            }
        }

        Ok((Some(info.id), Vec::new()))
    }
}

/// an empty id is no hit
fn hit(id: AssociatedId) -> Option<AssociatedId> {
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}
