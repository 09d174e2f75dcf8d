use tracing::trace;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::hash::SnapshotId;
use crate::store::RecipeStore;
use crate::types::{Recipe, Tree};

/// rebuild the file tree of a snapshot by replaying its recipes
///
/// the first recipe in store order is followed. merges union their inputs
/// left to right, later inputs win.
pub fn materialize<R: RecipeStore>(ctx: &Context, store: &R, id: SnapshotId) -> Result<Tree> {
    let mut ops = Vec::new();
    let mut current = id;

    let mut tree = loop {
        ctx.check()?;
        if current.is_empty() {
            break Tree::new();
        }

        let recipe = first_recipe(ctx, store, &current)?;
        if !recipe.op.is_linear() {
            let mut merged = Tree::new();
            for input in &recipe.inputs {
                merged.union(&materialize(ctx, store, *input)?);
            }
            break merged;
        }

        match recipe.input() {
            Some(input) => {
                ops.push(recipe.op);
                current = input;
            }
            None => {
                return Err(Error::Store(format!(
                    "linear recipe for {} has {} inputs",
                    current,
                    recipe.inputs.len()
                )))
            }
        }
    };

    trace!(snapshot = ?id, ops = ops.len(), "replaying");
    for op in ops.iter().rev() {
        tree.apply(op)?;
    }
    Ok(tree)
}

fn first_recipe<R: RecipeStore>(ctx: &Context, store: &R, id: &SnapshotId) -> Result<Recipe> {
    store
        .all_paths_to_snapshot(ctx, id)?
        .into_iter()
        .next()
        .map(|path| path.recipe)
        .ok_or_else(|| Error::SnapshotNotFound(id.to_hex()))
}
