use std::collections::HashMap;
use std::sync::RwLock;

use tracing::debug;

use crate::cmd::{Cmd, Key, RunInfo};
use crate::context::Context;
use crate::error::{poisoned, Error, Result};
use crate::hash::SnapshotId;
use crate::store::{reaches, RecipePath, RecipeStore, RecipeWriter, RunStore};
use crate::types::{Op, Recipe};

/// in-memory recipe and run store
///
/// each map sits behind its own reader/writer lock: lookups run in
/// parallel, writes exclude everyone.
#[derive(Debug, Default)]
pub struct MemStore {
    /// output snapshot -> recipes producing it
    recipes: RwLock<HashMap<SnapshotId, Vec<Recipe>>>,
    runs: RwLock<HashMap<Key, RunInfo>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// record that `recipe` produces `output`
    ///
    /// identical entries coalesce; a recipe that would make `output` its own
    /// ancestor is rejected.
    pub fn put_recipe(&self, output: SnapshotId, recipe: Recipe) -> Result<()> {
        if output.is_empty() {
            return Err(Error::Store("the empty snapshot has no recipe".to_string()));
        }

        let mut recipes = self.recipes.write().map_err(poisoned)?;
        let would_cycle = reaches(&recipe.inputs, &output, |id| {
            Ok(recipes
                .get(id)
                .map(|entries| entries.iter().flat_map(|r| r.inputs.clone()).collect())
                .unwrap_or_default())
        })?;
        if would_cycle {
            return Err(Error::Cycle(output.to_hex()));
        }

        insert_recipe(&mut recipes, output, recipe);
        Ok(())
    }

    /// record a recipe whose output is its own content address
    fn put_unchecked(&self, output: SnapshotId, recipe: Recipe) -> Result<()> {
        let mut recipes = self.recipes.write().map_err(poisoned)?;
        insert_recipe(&mut recipes, output, recipe);
        Ok(())
    }

    /// apply `op` to `input`, returning the content-addressed result
    pub fn apply(&self, input: SnapshotId, op: Op, tag: &str) -> Result<SnapshotId> {
        let recipe = Recipe::linear(input, op, tag);
        let id = recipe.output_id()?;
        self.put_unchecked(id, recipe)?;
        Ok(id)
    }

    /// union of `inputs`, later inputs win
    pub fn merge(&self, inputs: Vec<SnapshotId>, tag: &str) -> Result<SnapshotId> {
        let recipe = Recipe::merge(inputs, tag);
        let id = recipe.output_id()?;
        self.put_unchecked(id, recipe)?;
        Ok(id)
    }

    /// store the outcome of a successful run of `cmd`
    pub fn record_run(&self, cmd: &Cmd, info: RunInfo) -> Result<Key> {
        info.validate_for(cmd.kind)?;
        let key = cmd.key()?;
        debug!(key = %key, id = %info.id, "recording run");
        self.runs.write().map_err(poisoned)?.insert(key.clone(), info);
        Ok(key)
    }

    /// number of snapshots with at least one recipe
    pub fn snapshot_count(&self) -> Result<usize> {
        Ok(self.recipes.read().map_err(poisoned)?.len())
    }
}

fn insert_recipe(recipes: &mut HashMap<SnapshotId, Vec<Recipe>>, output: SnapshotId, recipe: Recipe) {
    let entries = recipes.entry(output).or_default();
    if !entries.contains(&recipe) {
        debug!(output = ?output, op = %recipe.op, "recording recipe");
        entries.push(recipe);
    }
}

impl RecipeStore for MemStore {
    fn all_paths_to_snapshot(&self, ctx: &Context, id: &SnapshotId) -> Result<Vec<RecipePath>> {
        ctx.check()?;
        let recipes = self.recipes.read().map_err(poisoned)?;
        Ok(recipes
            .get(id)
            .map(|entries| entries.iter().cloned().map(RecipePath::from).collect())
            .unwrap_or_default())
    }
}

impl RecipeWriter for MemStore {
    fn apply(&self, input: SnapshotId, op: Op, tag: &str) -> Result<SnapshotId> {
        MemStore::apply(self, input, op, tag)
    }
}

impl RunStore for MemStore {
    fn get_run_info(&self, ctx: &Context, key: &Key) -> Result<RunInfo> {
        ctx.check()?;
        let runs = self.runs.read().map_err(poisoned)?;
        Ok(runs.get(key).cloned().unwrap_or_default())
    }
}
