use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::path;
use crate::types::op::DEFAULT_MODE;
use crate::types::Op;

/// contents and permission bits of one file
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
    pub mode: u32,
}

impl FileEntry {
    pub fn new(data: impl Into<Vec<u8>>, mode: u32) -> Self {
        Self {
            data: data.into(),
            mode,
        }
    }
}

/// a materialized snapshot: files keyed by path plus explicit directories
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    files: BTreeMap<String, FileEntry>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    dirs: BTreeSet<String>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn files(&self) -> &BTreeMap<String, FileEntry> {
        &self.files
    }

    pub fn dirs(&self) -> &BTreeSet<String> {
        &self.dirs
    }

    pub fn get(&self, file: &str) -> Option<&FileEntry> {
        self.files.get(file)
    }

    pub fn insert(&mut self, file: impl Into<String>, entry: FileEntry) {
        self.files.insert(file.into(), entry);
    }

    pub fn insert_dir(&mut self, dir: impl Into<String>) {
        self.dirs.insert(dir.into());
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.dirs.is_empty()
    }

    /// apply one linear op in place
    pub fn apply(&mut self, op: &Op) -> Result<()> {
        match op {
            Op::Identity => {}
            Op::WriteFile(w) => {
                let mode = self.files.get(&w.path).map_or(DEFAULT_MODE, |e| e.mode);
                self.files
                    .insert(w.path.clone(), FileEntry::new(w.data.clone(), mode));
                // explicit dirs are only kept while empty
                self.dirs.retain(|d| path::child(d, &w.path).is_none());
            }
            Op::RemoveFile(r) => {
                self.files.remove(&r.path);
            }
            Op::Chmod(c) => {
                if let Some(entry) = self.files.get_mut(&c.path) {
                    entry.mode = c.mode;
                }
            }
            Op::Mkdir(m) => {
                self.dirs.retain(|d| path::child(d, &m.path).is_none());
                if !self.has_beneath(&m.path) {
                    self.dirs.insert(m.path.clone());
                }
            }
            Op::RemoveDir(r) => {
                let beneath = |p: &String| p == &r.path || path::child(&r.path, p).is_some();
                self.files.retain(|p, _| !beneath(p));
                self.dirs.retain(|p| !beneath(p));
            }
            Op::Preserve(p) => {
                self.files.retain(|file, _| p.matcher.matches(file));
                self.dirs
                    .retain(|dir| p.matcher.matches(dir) || !p.matcher.child(dir).is_empty());
            }
            Op::Merge => return Err(Error::NotSupported(Box::new(op.clone()))),
        }
        Ok(())
    }

    /// does anything live strictly beneath `dir`
    pub fn has_beneath(&self, dir: &str) -> bool {
        let under = |p: &String| path::child(dir, p).is_some();
        self.files.keys().any(under) || self.dirs.iter().any(under)
    }

    /// overlay `other` on top of this tree; its files win
    pub fn union(&mut self, other: &Tree) {
        for (file, entry) in &other.files {
            self.files.insert(file.clone(), entry.clone());
        }
        self.dirs.extend(other.dirs.iter().cloned());
    }

    /// ops turning this tree into `target`, in path order
    pub fn diff(&self, target: &Tree) -> Vec<Op> {
        let mut ops = Vec::new();

        let paths: BTreeSet<&String> = self.files.keys().chain(target.files.keys()).collect();
        for file in paths {
            match (self.files.get(file), target.files.get(file)) {
                (Some(_), None) => ops.push(Op::remove(file.clone())),
                (None, Some(new)) => {
                    ops.push(Op::write(file.clone(), new.data.clone()));
                    if new.mode != DEFAULT_MODE {
                        ops.push(Op::chmod(file.clone(), new.mode));
                    }
                }
                (Some(old), Some(new)) => {
                    if old.data != new.data {
                        ops.push(Op::write(file.clone(), new.data.clone()));
                    }
                    if old.mode != new.mode {
                        ops.push(Op::chmod(file.clone(), new.mode));
                    }
                }
                (None, None) => {}
            }
        }

        for dir in target.dirs.difference(&self.dirs) {
            ops.push(Op::mkdir(dir.clone()));
        }
        for dir in self.dirs.difference(&target.dirs) {
            if !target.has_beneath(dir) {
                ops.push(Op::remove_dir(dir.clone()));
            }
        }

        ops
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::Matcher;

    fn tree(files: &[(&str, &str)]) -> Tree {
        let mut t = Tree::new();
        for (p, data) in files {
            t.insert(*p, FileEntry::new(data.as_bytes(), DEFAULT_MODE));
        }
        t
    }

    #[test]
    fn test_apply_write_and_remove() {
        let mut t = Tree::new();
        t.apply(&Op::write("a.txt", "A")).unwrap();
        assert_eq!(t.get("a.txt").unwrap().data, b"A");
        t.apply(&Op::remove("a.txt")).unwrap();
        assert!(t.is_empty());
    }

    #[test]
    fn test_write_keeps_mode() {
        let mut t = Tree::new();
        t.apply(&Op::write("run.sh", "1")).unwrap();
        t.apply(&Op::chmod("run.sh", 0o755)).unwrap();
        t.apply(&Op::write("run.sh", "2")).unwrap();
        assert_eq!(t.get("run.sh").unwrap().mode, 0o755);
    }

    #[test]
    fn test_remove_dir() {
        let mut t = tree(&[("d/a", "1"), ("d/e/b", "2"), ("dx", "3")]);
        t.insert_dir("d/e");
        t.apply(&Op::remove_dir("d")).unwrap();
        assert_eq!(t.files().keys().collect::<Vec<_>>(), vec!["dx"]);
        assert!(t.dirs().is_empty());
    }

    #[test]
    fn test_preserve() {
        let mut t = tree(&[("src/a.rs", "1"), ("docs/b.md", "2")]);
        t.insert_dir("src/empty");
        t.insert_dir("docs/empty");
        let m = Matcher::from_patterns(&["src/**"]).unwrap();
        t.apply(&Op::preserve(m)).unwrap();
        assert_eq!(t.len(), 1);
        assert!(t.get("src/a.rs").is_some());
        assert!(t.dirs().contains("src/empty"));
        assert!(!t.dirs().contains("docs/empty"));
    }

    #[test]
    fn test_merge_is_not_applied_linearly() {
        let mut t = Tree::new();
        assert!(matches!(t.apply(&Op::Merge), Err(Error::NotSupported(_))));
    }

    #[test]
    fn test_union_later_wins() {
        let mut a = tree(&[("x", "1"), ("y", "1")]);
        a.union(&tree(&[("y", "2"), ("z", "2")]));
        assert_eq!(a.get("x").unwrap().data, b"1");
        assert_eq!(a.get("y").unwrap().data, b"2");
        assert_eq!(a.get("z").unwrap().data, b"2");
    }

    #[test]
    fn test_diff_replays_to_target() {
        let old = tree(&[("a", "1"), ("b", "1"), ("c", "1")]);
        let mut new = tree(&[("a", "1"), ("b", "2"), ("d", "1")]);
        new.insert("e", FileEntry::new("x", 0o755));
        new.insert_dir("empty");

        let ops = old.diff(&new);
        assert_eq!(
            ops,
            vec![
                Op::write("b", "2"),
                Op::remove("c"),
                Op::write("d", "1"),
                Op::write("e", "x"),
                Op::chmod("e", 0o755),
                Op::mkdir("empty"),
            ]
        );

        let mut replayed = old.clone();
        for op in &ops {
            replayed.apply(op).unwrap();
        }
        assert_eq!(replayed, new);

        // an empty dir replaced by an empty subdir
        let mut old = Tree::new();
        old.insert_dir("d");
        let mut new = Tree::new();
        new.insert_dir("d/e");

        let ops = old.diff(&new);
        assert_eq!(ops, vec![Op::mkdir("d/e")]);
        let mut replayed = old.clone();
        for op in &ops {
            replayed.apply(op).unwrap();
        }
        assert_eq!(replayed, new);
    }

    #[test]
    fn test_empty_dir_filled() {
        let mut old = Tree::new();
        old.insert_dir("d");
        let new = tree(&[("d/a", "1")]);

        let ops = old.diff(&new);
        assert_eq!(ops, vec![Op::write("d/a", "1")]);

        let mut replayed = old.clone();
        for op in &ops {
            replayed.apply(op).unwrap();
        }
        assert_eq!(replayed, new);
    }

    #[test]
    fn test_diff_identical_is_empty() {
        let t = tree(&[("a", "1")]);
        assert!(t.diff(&t.clone()).is_empty());
    }
}
