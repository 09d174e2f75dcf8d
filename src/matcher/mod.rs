//! path matchers in restricted normal form
//!
//! a matcher is `(a1 OR a2 OR ...) AND NOT n1 AND NOT n2 ...` where every
//! `a` and `n` is a single pattern. a missing positive group accepts every
//! path. matchers compare and hash by their sorted pattern list.

mod atom;

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::path;

use atom::Atom;
pub use atom::FILE_PREFIX;

/// a set of paths described by patterns
#[derive(Clone, Debug)]
pub struct Matcher {
    /// positive group; `None` accepts everything
    include: Option<Vec<Atom>>,
    /// inverted atoms
    exclude: Vec<Atom>,
}

impl Matcher {
    /// matches every path
    pub fn all() -> Self {
        Self {
            include: None,
            exclude: vec![],
        }
    }

    /// matches nothing
    pub fn empty() -> Self {
        Self {
            include: Some(vec![]),
            exclude: vec![],
        }
    }

    /// build from pattern strings; a leading `!` inverts a pattern
    ///
    /// with only negative patterns the positive group is implicitly `**`.
    pub fn from_patterns<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let mut positives = Vec::new();
        let mut negatives = Vec::new();
        for pattern in patterns {
            let pattern = pattern.as_ref();
            match pattern.strip_prefix('!') {
                Some(rest) => negatives.push(Atom::parse(rest)?),
                None => positives.push(Atom::parse(pattern)?),
            }
        }

        let include = match (positives.is_empty(), negatives.is_empty()) {
            (true, true) => Some(vec![]),
            (true, false) => None,
            _ => Some(positives),
        };
        Ok(Self::assemble(include, negatives))
    }

    /// exact match of a finite list of files
    pub fn files<S: AsRef<str>>(files: &[S]) -> Result<Self> {
        let atoms = files
            .iter()
            .map(|f| Atom::file(f.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::assemble(Some(atoms), vec![]))
    }

    /// canonical assembly: simplify, dedup and sort
    fn assemble(include: Option<Vec<Atom>>, mut exclude: Vec<Atom>) -> Self {
        let include = include.and_then(|atoms| {
            if atoms.iter().any(Atom::is_everything) {
                None
            } else {
                Some(canonical(atoms))
            }
        });

        // drop negatives orthogonal to every positive
        if let Some(positives) = &include {
            exclude.retain(|n| !positives.iter().all(|p| p.orthogonal(n)));
        }

        Self {
            include,
            exclude: canonical(exclude),
        }
    }

    /// does the matcher accept `file`
    pub fn matches(&self, file: &str) -> bool {
        let included = match &self.include {
            Some(atoms) => atoms.iter().any(|a| a.matches(file)),
            None => true,
        };
        included && !self.exclude.iter().any(|n| n.matches(file))
    }

    /// true only when certainly matching nothing
    pub fn is_empty(&self) -> bool {
        match &self.include {
            Some(atoms) => atoms.iter().all(|atom| match atom.as_file() {
                Some(file) => self.exclude.iter().any(|n| n.matches(&file)),
                None => false,
            }),
            None => false,
        }
    }

    /// true only when certainly matching everything
    pub fn is_all(&self) -> bool {
        self.include.is_none() && self.exclude.is_empty()
    }

    /// the matcher accepting `join(prefix, p)` iff this one accepts `p`
    pub fn subdir(&self, prefix: &str) -> Self {
        let segs = path::segments(prefix);
        if segs.is_empty() {
            return self.clone();
        }
        let include = match &self.include {
            Some(atoms) => atoms.iter().map(|a| a.subdir(&segs)).collect(),
            None => vec![Atom::beneath(&segs)],
        };
        let exclude = self.exclude.iter().map(|n| n.subdir(&segs)).collect();
        Self::assemble(Some(include), exclude)
    }

    /// the matcher accepting `p` iff this one accepts `join(prefix, p)`
    pub fn child(&self, prefix: &str) -> Self {
        let segs = path::segments(prefix);
        if segs.is_empty() {
            return self.clone();
        }
        let include = self
            .include
            .as_ref()
            .map(|atoms| atoms.iter().flat_map(|a| a.child(&segs)).collect());
        let exclude = self.exclude.iter().flat_map(|n| n.child(&segs)).collect();
        Self::assemble(include, exclude)
    }

    /// complement by DeMorgan; fails when the result leaves normal form
    pub fn invert(&self) -> Result<Self> {
        let inverted = Node::from(self).negate().flatten();
        if !inverted.is_normal() {
            return Err(Error::NotInvertible(self.to_string()));
        }
        Self::from_normal(inverted).ok_or_else(|| Error::NotInvertible(self.to_string()))
    }

    /// intersection, when it stays in normal form
    pub fn and(&self, other: &Self) -> Result<Self> {
        let include = match (&self.include, &other.include) {
            (None, None) => None,
            (Some(a), None) | (None, Some(a)) => Some(a.clone()),
            (Some(a), Some(b)) => {
                let files = intersect_files(a, other).or_else(|| intersect_files(b, self));
                Some(files.ok_or_else(|| Error::NotNormal(format!("{} AND {}", self, other)))?)
            }
        };
        let mut exclude = self.exclude.clone();
        exclude.extend(other.exclude.iter().cloned());
        Ok(Self::assemble(include, exclude))
    }

    /// union, when it stays in normal form
    pub fn or(&self, other: &Self) -> Result<Self> {
        if self.is_empty() {
            return Ok(other.clone());
        }
        if other.is_empty() {
            return Ok(self.clone());
        }
        if !self.exclude.is_empty() || !other.exclude.is_empty() {
            return Err(Error::NotNormal(format!("{} OR {}", self, other)));
        }
        let include = match (&self.include, &other.include) {
            (Some(a), Some(b)) => Some(a.iter().chain(b).cloned().collect()),
            _ => None,
        };
        Ok(Self::assemble(include, vec![]))
    }

    /// canonical sorted pattern list
    pub fn to_patterns(&self) -> Vec<String> {
        let mut patterns: Vec<String> = match &self.include {
            Some(atoms) => atoms.iter().map(Atom::to_pattern).collect(),
            None => vec![Atom::everything().to_pattern()],
        };
        patterns.extend(self.exclude.iter().map(|n| format!("!{}", n.to_pattern())));
        patterns.sort();
        patterns.dedup();
        patterns
    }

    /// the files matched, if the matcher is a finite union of exact files
    pub fn as_file_set(&self) -> Option<Vec<String>> {
        let atoms = self.include.as_ref()?;
        let mut files = Vec::with_capacity(atoms.len());
        for atom in atoms {
            let file = atom.as_file()?;
            if self.matches(&file) {
                files.push(file);
            }
        }
        files.sort();
        files.dedup();
        Some(files)
    }

    /// structural normal-form check
    pub fn is_normal(&self) -> bool {
        Node::from(self).is_normal()
    }

    /// rebuild from a normal node
    fn from_normal(node: Node) -> Option<Self> {
        let elems = match node {
            Node::All(elems) => elems,
            other => vec![other],
        };

        let mut include = None;
        let mut exclude = Vec::new();
        for (i, elem) in elems.into_iter().enumerate() {
            match elem {
                Node::Atom(atom) if i == 0 => include = Some(vec![atom]),
                Node::Any(inner) if i == 0 => {
                    let atoms = inner
                        .into_iter()
                        .map(|n| match n {
                            Node::Atom(atom) => Some(atom),
                            _ => None,
                        })
                        .collect::<Option<Vec<_>>>()?;
                    include = Some(atoms);
                }
                Node::Not(inner) => match *inner {
                    Node::Atom(atom) => exclude.push(atom),
                    _ => return None,
                },
                _ => return None,
            }
        }
        Some(Self::assemble(include, exclude))
    }
}

/// keep the atoms of `files` accepted by `other`, if every atom is an exact file
fn intersect_files(files: &[Atom], other: &Matcher) -> Option<Vec<Atom>> {
    files
        .iter()
        .map(|atom| atom.as_file().map(|f| (atom, f)))
        .collect::<Option<Vec<_>>>()
        .map(|pairs| {
            pairs
                .into_iter()
                .filter(|(_, f)| other.matches(f))
                .map(|(atom, _)| atom.clone())
                .collect()
        })
}

fn canonical(mut atoms: Vec<Atom>) -> Vec<Atom> {
    atoms.sort_by_cached_key(Atom::to_pattern);
    atoms.dedup();
    atoms
}

impl Default for Matcher {
    fn default() -> Self {
        Self::all()
    }
}

impl PartialEq for Matcher {
    fn eq(&self, other: &Self) -> bool {
        self.to_patterns() == other.to_patterns()
    }
}

impl Eq for Matcher {}

impl Hash for Matcher {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.to_patterns().hash(state);
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.to_patterns().join(", "))
    }
}

impl Serialize for Matcher {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_patterns().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Matcher {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let patterns = Vec::<String>::deserialize(deserializer)?;
        Self::from_patterns(&patterns).map_err(serde::de::Error::custom)
    }
}

/// general boolean expression over atoms, used to carry out inversion
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Node {
    Atom(Atom),
    Not(Box<Node>),
    Any(Vec<Node>),
    All(Vec<Node>),
}

impl Node {
    /// push a negation down to the atoms
    fn negate(self) -> Node {
        match self {
            Node::Atom(atom) => Node::Not(Box::new(Node::Atom(atom))),
            Node::Not(inner) => *inner,
            Node::Any(nodes) => Node::All(nodes.into_iter().map(Node::negate).collect()),
            Node::All(nodes) => Node::Any(nodes.into_iter().map(Node::negate).collect()),
        }
    }

    /// merge nested groups of the same kind and unwrap single-element groups
    fn flatten(self) -> Node {
        match self {
            Node::Any(nodes) => {
                let mut out = Vec::new();
                for node in nodes.into_iter().map(Node::flatten) {
                    match node {
                        Node::Any(inner) => out.extend(inner),
                        other => out.push(other),
                    }
                }
                if out.len() == 1 {
                    out.remove(0)
                } else {
                    Node::Any(out)
                }
            }
            Node::All(nodes) => {
                let mut out = Vec::new();
                for node in nodes.into_iter().map(Node::flatten) {
                    match node {
                        Node::All(inner) => out.extend(inner),
                        other => out.push(other),
                    }
                }
                if out.len() == 1 {
                    out.remove(0)
                } else {
                    Node::All(out)
                }
            }
            Node::Not(inner) => match inner.flatten() {
                Node::Not(twice) => *twice,
                other => Node::Not(Box::new(other)),
            },
            atom => atom,
        }
    }

    /// `All[(Any[atoms] | atom)?, Not(atom)*]`, where a lone element
    /// stands for a one-element conjunction
    pub(crate) fn is_normal(&self) -> bool {
        let elems = match self {
            Node::All(elems) => elems.as_slice(),
            other => std::slice::from_ref(other),
        };
        elems.iter().enumerate().all(|(i, elem)| match elem {
            Node::Atom(_) => i == 0,
            Node::Any(inner) => i == 0 && inner.iter().all(|n| matches!(n, Node::Atom(_))),
            Node::Not(inner) => matches!(**inner, Node::Atom(_)),
            Node::All(_) => false,
        })
    }

    #[cfg(test)]
    fn matches(&self, file: &str) -> bool {
        match self {
            Node::Atom(atom) => atom.matches(file),
            Node::Not(inner) => !inner.matches(file),
            Node::Any(nodes) => nodes.iter().any(|n| n.matches(file)),
            Node::All(nodes) => nodes.iter().all(|n| n.matches(file)),
        }
    }
}

impl From<&Matcher> for Node {
    fn from(m: &Matcher) -> Self {
        let mut elems = Vec::new();
        if let Some(atoms) = &m.include {
            elems.push(Node::Any(atoms.iter().cloned().map(Node::Atom).collect()));
        }
        elems.extend(
            m.exclude
                .iter()
                .cloned()
                .map(|a| Node::Not(Box::new(Node::Atom(a)))),
        );
        Node::All(elems)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn m(patterns: &[&str]) -> Matcher {
        Matcher::from_patterns(patterns).unwrap()
    }

    #[test]
    fn test_constants() {
        assert!(Matcher::all().matches("anything/at/all"));
        assert!(Matcher::all().is_all());
        assert!(!Matcher::empty().matches("a"));
        assert!(Matcher::empty().is_empty());
        assert_eq!(Matcher::all().to_patterns(), vec!["**"]);
        assert!(Matcher::empty().to_patterns().is_empty());
    }

    #[test]
    fn test_positive_and_negative() {
        let matcher = m(&["src/**", "!src/gen/**"]);
        assert!(matcher.matches("src/lib.rs"));
        assert!(!matcher.matches("src/gen/out.rs"));
        assert!(!matcher.matches("docs/x.md"));
    }

    #[test]
    fn test_only_negatives_means_everything_else() {
        let matcher = m(&["!target/**"]);
        assert!(matcher.matches("src/lib.rs"));
        assert!(!matcher.matches("target/debug/x"));
        assert_eq!(matcher.to_patterns(), vec!["!target/**", "**"]);
    }

    #[test]
    fn test_simplify_drops_orthogonal_negatives() {
        let matcher = m(&["src/**", "!test/fixture"]);
        assert_eq!(matcher.to_patterns(), vec!["src/**"]);
        assert!(matcher.invert().is_ok());
    }

    #[test]
    fn test_simplify_keeps_overlapping_negatives() {
        let matcher = m(&["src/**", "!*/fixture"]);
        assert_eq!(matcher.to_patterns(), vec!["!*/fixture", "src/**"]);
    }

    #[test]
    fn test_invalid_patterns() {
        assert!(Matcher::from_patterns(&["/abs"]).is_err());
        assert!(Matcher::from_patterns(&["a b"]).is_err());
        assert!(Matcher::from_patterns(&["a/[b"]).is_err());
    }

    #[test]
    fn test_files() {
        let matcher = Matcher::files(&["b.txt", "a.txt"]).unwrap();
        assert!(matcher.matches("a.txt"));
        assert!(!matcher.matches("c.txt"));
        assert_eq!(
            matcher.as_file_set(),
            Some(vec!["a.txt".to_string(), "b.txt".to_string()])
        );
        assert_eq!(matcher.to_patterns(), vec!["file://a.txt", "file://b.txt"]);
    }

    #[test]
    fn test_as_file_set() {
        assert_eq!(Matcher::empty().as_file_set(), Some(vec![]));
        assert_eq!(Matcher::all().as_file_set(), None);
        assert_eq!(m(&["*.rs"]).as_file_set(), None);
        let minus = m(&["file://a", "file://b", "!file://a"]);
        assert_eq!(minus.as_file_set(), Some(vec!["b".to_string()]));
    }

    #[test]
    fn test_is_empty_conservative() {
        assert!(m(&["file://a", "!file://a"]).is_empty());
        assert!(!m(&["*.rs"]).is_empty());
        assert!(!m(&["*.rs", "!*.rs"]).is_empty());
    }

    #[test]
    fn test_invert_positive_only() {
        let matcher = m(&["a/**", "b"]);
        let inverted = matcher.invert().unwrap();
        assert!(!inverted.matches("a/x"));
        assert!(!inverted.matches("b"));
        assert!(inverted.matches("c"));
        assert_eq!(inverted.to_patterns(), vec!["!a/**", "!b", "**"]);
    }

    #[test]
    fn test_invert_constants() {
        assert!(Matcher::all().invert().unwrap().is_empty());
        assert!(Matcher::empty().invert().unwrap().is_all());
    }

    #[test]
    fn test_invert_mixed_fails() {
        let matcher = m(&["src/**", "!src/gen/**"]);
        assert!(matches!(matcher.invert(), Err(Error::NotInvertible(_))));
    }

    #[test]
    fn test_subdir() {
        let matcher = m(&["*.rs", "!main.rs"]);
        let sub = matcher.subdir("src");
        assert!(sub.matches("src/lib.rs"));
        assert!(!sub.matches("src/main.rs"));
        assert!(!sub.matches("lib.rs"));
    }

    #[test]
    fn test_subdir_of_all_is_bounded() {
        let sub = m(&["!x"]).subdir("d");
        assert!(sub.matches("d/y"));
        assert!(!sub.matches("d/x"));
        assert!(!sub.matches("e/y"));
    }

    #[test]
    fn test_child() {
        let matcher = m(&["src/**/*.rs", "!src/gen/**"]);
        let child = matcher.child("src");
        assert!(child.matches("lib.rs"));
        assert!(child.matches("a/b.rs"));
        assert!(!child.matches("gen/x.rs"));
        assert!(matcher.child("docs").is_empty());
    }

    #[test]
    fn test_child_of_files() {
        let matcher = Matcher::files(&["a/b.txt", "c.txt"]).unwrap();
        let child = matcher.child("a");
        assert_eq!(child.as_file_set(), Some(vec!["b.txt".to_string()]));
    }

    #[test]
    fn test_and() {
        let files = Matcher::files(&["a.rs", "b.txt"]).unwrap();
        let both = files.and(&m(&["*.rs"])).unwrap();
        assert_eq!(both.as_file_set(), Some(vec!["a.rs".to_string()]));

        let excl = m(&["src/**"]).and(&m(&["!src/gen/**"])).unwrap();
        assert!(excl.matches("src/a"));
        assert!(!excl.matches("src/gen/a"));

        assert!(matches!(
            m(&["a/**"]).and(&m(&["*/b"])),
            Err(Error::NotNormal(_))
        ));
    }

    #[test]
    fn test_or() {
        let either = m(&["a/**"]).or(&m(&["b/**"])).unwrap();
        assert!(either.matches("a/x"));
        assert!(either.matches("b/x"));
        assert!(!either.matches("c/x"));
        assert!(m(&["a"]).or(&Matcher::all()).unwrap().is_all());
        assert!(m(&["a", "!a"]).or(&m(&["!b"])).is_err());
    }

    #[test]
    fn test_equality_by_patterns() {
        assert_eq!(m(&["b", "a"]), m(&["a", "b", "a"]));
        assert_eq!(m(&["**"]), Matcher::all());
        assert_ne!(m(&["a"]), m(&["file://a"]));
    }

    #[test]
    fn test_display() {
        assert_eq!(m(&["b", "!a/x", "a/**"]).to_string(), "[!a/x, a/**, b]");
    }

    #[test]
    fn test_subdir_literal_survives_patterns() {
        let sub = m(&["x"]).subdir("a*");
        assert!(sub.matches("a*/x"));
        assert!(!sub.matches("ab/x"));

        let again = Matcher::from_patterns(&sub.to_patterns()).unwrap();
        assert_eq!(again, sub);
        assert!(!again.matches("ab/x"));
    }

    #[test]
    fn test_serde_json() {
        let matcher = m(&["src/**", "!src/gen/**"]);
        let json = serde_json::to_string(&matcher).unwrap();
        assert_eq!(json, r#"["!src/gen/**","src/**"]"#);
        let parsed: Matcher = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, matcher);
    }

    #[test]
    fn test_node_normal_form() {
        let a = Node::Atom(Atom::parse("a").unwrap());
        let b = Node::Atom(Atom::parse("b").unwrap());
        let not = |n: &Node| Node::Not(Box::new(n.clone()));

        assert!(Node::All(vec![Node::Any(vec![a.clone(), b.clone()]), not(&a)]).is_normal());
        assert!(not(&a).is_normal());
        assert!(Node::Any(vec![]).is_normal());
        // inversions inside a disjunction
        assert!(!Node::Any(vec![not(&a), b.clone()]).is_normal());
        // nested conjunction
        assert!(!Node::All(vec![Node::All(vec![a.clone()])]).is_normal());
        // positive atom after a negation
        assert!(!Node::All(vec![not(&a), b.clone()]).is_normal());
        // negated disjunction
        assert!(!not(&Node::Any(vec![a, b])).is_normal());
    }

    #[test]
    fn test_double_negation_cancels() {
        let a = Node::Atom(Atom::parse("a").unwrap());
        let twice = Node::Not(Box::new(Node::Not(Box::new(a.clone()))));
        assert_eq!(twice.flatten(), a);
    }

    const SAMPLE_PATHS: &[&str] = &[
        "a", "b", "a/b", "a/c", "b/a", "src/lib.rs", "src/gen/x.rs", "x.txt", "a/b/c.txt",
        "docs/a.md", "ab/a", "a*/a", "v1/q/a", "v[1]/?/src/lib.rs",
    ];

    fn pattern() -> impl Strategy<Value = String> {
        let seg = prop_oneof![
            Just("a".to_string()),
            Just("b".to_string()),
            Just("src".to_string()),
            Just("*".to_string()),
            Just("*.rs".to_string()),
            Just("**".to_string()),
        ];
        (
            prop::collection::vec(seg, 1..4),
            prop::bool::weighted(0.2),
            prop::bool::weighted(0.15),
        )
            .prop_map(|(segs, neg, file)| {
                let body = segs.join("/");
                let body = if file && !body.contains('*') {
                    format!("file://{}", body)
                } else {
                    body
                };
                if neg {
                    format!("!{}", body)
                } else {
                    body
                }
            })
    }

    fn matcher() -> impl Strategy<Value = Matcher> {
        prop::collection::vec(pattern(), 0..4)
            .prop_map(|patterns| Matcher::from_patterns(&patterns).unwrap())
    }

    fn prefix() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("a".to_string()),
            Just("src".to_string()),
            Just("a/b".to_string()),
            Just("a*".to_string()),
            Just("v[1]/?".to_string()),
        ]
    }

    proptest! {
        #[test]
        fn prop_pattern_roundtrip(matcher in matcher()) {
            let again = Matcher::from_patterns(&matcher.to_patterns()).unwrap();
            prop_assert_eq!(&again, &matcher);
            for p in SAMPLE_PATHS {
                prop_assert_eq!(again.matches(p), matcher.matches(p));
            }
        }

        #[test]
        fn prop_subdir_pattern_roundtrip(matcher in matcher(), d in prefix()) {
            let sub = matcher.subdir(&d);
            let again = Matcher::from_patterns(&sub.to_patterns()).unwrap();
            prop_assert_eq!(&again, &sub);
            for p in SAMPLE_PATHS {
                prop_assert_eq!(again.matches(p), sub.matches(p));
            }
        }

        #[test]
        fn prop_constructors_are_normal(matcher in matcher()) {
            prop_assert!(matcher.is_normal());
            let node = Node::from(&matcher);
            for p in SAMPLE_PATHS {
                prop_assert_eq!(node.matches(p), matcher.matches(p));
            }
        }

        #[test]
        fn prop_invert_involution(matcher in matcher()) {
            if let Ok(inverted) = matcher.invert() {
                prop_assert!(inverted.is_normal());
                let back = inverted.invert().unwrap();
                for p in SAMPLE_PATHS {
                    prop_assert_eq!(inverted.matches(p), !matcher.matches(p));
                    prop_assert_eq!(back.matches(p), matcher.matches(p));
                }
            }
        }

        #[test]
        fn prop_subdir_child_adjunction(matcher in matcher(), d in prefix()) {
            let sub = matcher.subdir(&d);
            let child = matcher.child(&d);
            prop_assert!(sub.is_normal());
            prop_assert!(child.is_normal());
            for p in SAMPLE_PATHS {
                let joined = path::join(&d, p);
                prop_assert_eq!(matcher.matches(p), sub.matches(&joined));
                if let Some(rest) = path::child(&d, &joined) {
                    prop_assert_eq!(matcher.matches(&path::join(&d, rest)), child.matches(rest));
                }
                // paths outside the prefix never match a subdir matcher
                if path::child(&d, p).is_none() && *p != d {
                    prop_assert!(!sub.matches(p));
                }
            }
        }
    }
}
