use crate::error::Result;
use crate::path::{self, Segment};

/// prefix marking an exact single-file pattern
pub const FILE_PREFIX: &str = "file://";

/// a single positive pattern: a glob path or an exact file
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct Atom {
    segments: Vec<Segment>,
    exact: bool,
}

impl Atom {
    /// parse one positive pattern (no leading `!`)
    pub fn parse(pattern: &str) -> Result<Self> {
        match pattern.strip_prefix(FILE_PREFIX) {
            Some(file) => Self::file(file),
            None => Ok(Self {
                segments: path::parse_pattern(pattern)?,
                exact: false,
            }),
        }
    }

    /// exact match of one file path
    pub fn file(file: &str) -> Result<Self> {
        Ok(Self {
            segments: path::parse_literal(file)?,
            exact: true,
        })
    }

    /// `**`
    pub fn everything() -> Self {
        Self {
            segments: vec![Segment::Recursive],
            exact: false,
        }
    }

    pub fn is_everything(&self) -> bool {
        !self.exact && self.segments.iter().all(|s| *s == Segment::Recursive)
    }

    pub fn matches(&self, file: &str) -> bool {
        path::match_segments(&self.segments, &path::segments(file))
    }

    pub fn to_pattern(&self) -> String {
        if self.exact {
            format!("{}{}", FILE_PREFIX, path::render_literal(&self.segments))
        } else {
            path::render(&self.segments)
        }
    }

    /// the exact file this atom names, if any
    pub fn as_file(&self) -> Option<String> {
        self.exact.then(|| path::render_literal(&self.segments))
    }

    /// the same atom rooted beneath `prefix`
    pub fn subdir(&self, prefix: &[&str]) -> Self {
        let mut segments: Vec<Segment> = prefix
            .iter()
            .map(|s| Segment::Literal(s.to_string()))
            .collect();
        segments.extend(self.segments.iter().cloned());
        Self {
            segments,
            exact: self.exact,
        }
    }

    /// everything beneath `prefix`
    pub fn beneath(prefix: &[&str]) -> Self {
        Self::everything().subdir(prefix)
    }

    /// residual atoms matching the paths beneath `dir`
    pub fn child(&self, dir: &[&str]) -> Vec<Self> {
        path::child_segments(dir, &self.segments)
            .into_iter()
            .map(|segments| Self {
                segments,
                exact: self.exact,
            })
            .collect()
    }

    /// true when no path can match both atoms
    ///
    /// two atoms are orthogonal when a literal segment differs at some depth
    /// and every earlier segment of both is literal.
    pub fn orthogonal(&self, other: &Self) -> bool {
        for (a, b) in self.segments.iter().zip(&other.segments) {
            match (a, b) {
                (Segment::Literal(x), Segment::Literal(y)) => {
                    if x != y {
                        return true;
                    }
                }
                _ => return false,
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_file_atom() {
        let atom = Atom::parse("file://src/*.rs").unwrap();
        // exact files never interpret wildcards
        assert!(atom.matches("src/*.rs"));
        assert!(!atom.matches("src/lib.rs"));
        assert_eq!(atom.to_pattern(), "file://src/*.rs");
        assert_eq!(atom.as_file().as_deref(), Some("src/*.rs"));
    }

    #[test]
    fn test_parse_glob_atom() {
        let atom = Atom::parse("src/*.rs").unwrap();
        assert!(atom.matches("src/lib.rs"));
        assert!(atom.as_file().is_none());
    }

    #[test]
    fn test_orthogonal() {
        let a = Atom::parse("src/a/**").unwrap();
        let b = Atom::parse("src/b/**").unwrap();
        let c = Atom::parse("*/b/**").unwrap();
        let d = Atom::parse("src/**").unwrap();
        assert!(a.orthogonal(&b));
        assert!(!a.orthogonal(&c));
        assert!(!a.orthogonal(&d));
        assert!(!a.orthogonal(&a));
    }

    #[test]
    fn test_subdir_and_child() {
        let atom = Atom::parse("*.txt").unwrap();
        let sub = atom.subdir(&["docs"]);
        assert_eq!(sub.to_pattern(), "docs/*.txt");
        let back = sub.child(&["docs"]);
        assert_eq!(back, vec![atom]);
    }

    #[test]
    fn test_subdir_with_glob_characters() {
        let atom = Atom::parse("x").unwrap();
        let sub = atom.subdir(&["a*", "[b]"]);
        assert!(sub.matches("a*/[b]/x"));
        assert!(!sub.matches("ab/b/x"));

        let pattern = sub.to_pattern();
        assert_eq!(pattern, "a[*]/[[]b[]]/x");
        let reparsed = Atom::parse(&pattern).unwrap();
        assert_eq!(reparsed, sub);
        assert!(!reparsed.matches("ab/b/x"));
    }

    #[test]
    fn test_everything() {
        assert!(Atom::everything().is_everything());
        assert!(Atom::parse("**/**").unwrap().is_everything());
        assert!(!Atom::beneath(&["a"]).is_everything());
        assert!(Atom::beneath(&["a"]).matches("a/b"));
    }
}
