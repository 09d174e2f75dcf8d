use crate::context::Context;
use crate::error::Result;
use crate::hash::SnapshotId;
use crate::store::RecipeStore;
use crate::types::Op;

/// one step of a snapshot's history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub id: SnapshotId,
    pub op: Op,
    pub tag: String,
}

/// walk back from `id` to the empty snapshot, newest first
///
/// follows the first linear recipe of each snapshot; stops at a merge, at a
/// snapshot without recipes, or after `max_count` entries.
pub fn history<R: RecipeStore>(
    ctx: &Context,
    store: &R,
    id: SnapshotId,
    max_count: Option<usize>,
) -> Result<Vec<HistoryEntry>> {
    let mut entries = Vec::new();
    let mut current = id;

    while !current.is_empty() {
        ctx.check()?;
        if let Some(max) = max_count {
            if entries.len() >= max {
                break;
            }
        }

        let paths = store.all_paths_to_snapshot(ctx, &current)?;
        let Some(path) = paths
            .iter()
            .find(|p| p.recipe.is_linear())
            .or_else(|| paths.first())
        else {
            break;
        };

        entries.push(HistoryEntry {
            id: current,
            op: path.op.clone(),
            tag: path.recipe.tag.clone(),
        });

        match path.recipe.input() {
            Some(input) if path.recipe.is_linear() => current = input,
            _ => break,
        }
    }

    Ok(entries)
}

impl std::fmt::Display for HistoryEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", &self.id.to_hex()[..12], self.op)?;
        if !self.tag.is_empty() {
            write!(f, " [{}]", self.tag)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemStore;

    #[test]
    fn test_history_chain() {
        let store = MemStore::new();
        let s1 = store.apply(SnapshotId::EMPTY, Op::write("a", "1"), "first").unwrap();
        let s2 = store.apply(s1, Op::write("a", "2"), "second").unwrap();
        let s3 = store.apply(s2, Op::remove("a"), "third").unwrap();

        let entries = history(&Context::background(), &store, s3, None).unwrap();
        let ids: Vec<_> = entries.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![s3, s2, s1]);
        assert_eq!(entries[0].op, Op::remove("a"));
        assert_eq!(entries[2].tag, "first");
    }

    #[test]
    fn test_history_max_count() {
        let store = MemStore::new();
        let mut id = SnapshotId::EMPTY;
        for i in 0..5 {
            id = store.apply(id, Op::write("f", format!("v{}", i)), "t").unwrap();
        }

        let entries = history(&Context::background(), &store, id, Some(2)).unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn test_history_stops_at_merge() {
        let store = MemStore::new();
        let a = store.apply(SnapshotId::EMPTY, Op::write("a", "1"), "t").unwrap();
        let b = store.apply(SnapshotId::EMPTY, Op::write("b", "1"), "t").unwrap();
        let merged = store.merge(vec![a, b], "join").unwrap();
        let top = store.apply(merged, Op::write("c", "1"), "t").unwrap();

        let entries = history(&Context::background(), &store, top, None).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].op, Op::Merge);
    }

    #[test]
    fn test_history_empty() {
        let store = MemStore::new();
        let entries = history(&Context::background(), &store, SnapshotId::EMPTY, None).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn test_entry_display() {
        let store = MemStore::new();
        let s1 = store.apply(SnapshotId::EMPTY, Op::write("a.txt", "xy"), "init").unwrap();
        let entries = history(&Context::background(), &store, s1, None).unwrap();
        let display = entries[0].to_string();

        assert!(display.starts_with(&s1.to_hex()[..12]));
        assert!(display.contains("write a.txt (2 bytes)"));
        assert!(display.ends_with("[init]"));
    }
}
