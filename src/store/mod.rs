//! recipe and run stores consumed by the reuse engine

mod fs;
mod memory;

use std::collections::HashSet;
use std::sync::Arc;

use crate::cmd::{Key, RunInfo};
use crate::context::Context;
use crate::error::Result;
use crate::hash::SnapshotId;
use crate::types::{Op, Recipe};

pub use fs::{FsStore, StoreLock};
pub use memory::MemStore;

/// one way of reaching a snapshot: the recipe and the op it applies
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecipePath {
    pub op: Op,
    pub recipe: Recipe,
}

impl From<Recipe> for RecipePath {
    fn from(recipe: Recipe) -> Self {
        Self {
            op: recipe.op.clone(),
            recipe,
        }
    }
}

/// read side of the recipe graph
pub trait RecipeStore: Send + Sync {
    /// every recipe whose output is `id`; order is store-defined
    fn all_paths_to_snapshot(&self, ctx: &Context, id: &SnapshotId) -> Result<Vec<RecipePath>>;
}

/// read side of recorded runs
pub trait RunStore: Send + Sync {
    /// the run recorded under `key`; a missing record is the zero `RunInfo`
    fn get_run_info(&self, ctx: &Context, key: &Key) -> Result<RunInfo>;
}

/// write side of the recipe graph, used when snapshotting a working tree
pub trait RecipeWriter: RecipeStore {
    /// record `op` applied to `input`, returning the content-addressed result
    fn apply(&self, input: SnapshotId, op: Op, tag: &str) -> Result<SnapshotId>;
}

impl<T: RecipeStore + ?Sized> RecipeStore for &T {
    fn all_paths_to_snapshot(&self, ctx: &Context, id: &SnapshotId) -> Result<Vec<RecipePath>> {
        (**self).all_paths_to_snapshot(ctx, id)
    }
}

impl<T: RecipeStore + ?Sized> RecipeStore for Arc<T> {
    fn all_paths_to_snapshot(&self, ctx: &Context, id: &SnapshotId) -> Result<Vec<RecipePath>> {
        (**self).all_paths_to_snapshot(ctx, id)
    }
}

impl<T: RunStore + ?Sized> RunStore for &T {
    fn get_run_info(&self, ctx: &Context, key: &Key) -> Result<RunInfo> {
        (**self).get_run_info(ctx, key)
    }
}

impl<T: RunStore + ?Sized> RunStore for Arc<T> {
    fn get_run_info(&self, ctx: &Context, key: &Key) -> Result<RunInfo> {
        (**self).get_run_info(ctx, key)
    }
}

impl<T: RecipeWriter + ?Sized> RecipeWriter for &T {
    fn apply(&self, input: SnapshotId, op: Op, tag: &str) -> Result<SnapshotId> {
        (**self).apply(input, op, tag)
    }
}

impl<T: RecipeWriter + ?Sized> RecipeWriter for Arc<T> {
    fn apply(&self, input: SnapshotId, op: Op, tag: &str) -> Result<SnapshotId> {
        (**self).apply(input, op, tag)
    }
}

/// walk input edges from `start`; true when `target` is reachable
pub(crate) fn reaches<F>(start: &[SnapshotId], target: &SnapshotId, mut inputs_of: F) -> Result<bool>
where
    F: FnMut(&SnapshotId) -> Result<Vec<SnapshotId>>,
{
    let mut stack = start.to_vec();
    let mut seen = HashSet::new();
    while let Some(id) = stack.pop() {
        if id == *target {
            return Ok(true);
        }
        if id.is_empty() || !seen.insert(id) {
            continue;
        }
        stack.extend(inputs_of(&id)?);
    }
    Ok(false)
}
