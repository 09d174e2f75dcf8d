//! textual path and pattern helpers
//!
//! paths are relative, use a single separator and never start with it.
//! patterns are paths whose segments may be globs (`*`, `?`, `[..]`)
//! or the recursive wildcard `**`, which matches zero or more whole segments.

use crate::error::{Error, Result};

/// the one separator used by every path in a snapshot
pub const SEPARATOR: char = '/';

/// final segment of a path
pub fn base(path: &str) -> &str {
    match path.rfind(SEPARATOR) {
        Some(i) => &path[i + 1..],
        None => path,
    }
}

/// everything before the final segment ("" at the top level)
pub fn dir(path: &str) -> &str {
    match path.rfind(SEPARATOR) {
        Some(i) => &path[..i],
        None => "",
    }
}

/// join two relative paths, treating "" as the root
pub fn join(a: &str, b: &str) -> String {
    match (a.is_empty(), b.is_empty()) {
        (true, _) => b.to_string(),
        (_, true) => a.to_string(),
        _ => format!("{}{}{}", a, SEPARATOR, b),
    }
}

/// split off the first segment: "a/b/c" -> ("a", "b/c")
pub fn split_first(path: &str) -> (&str, &str) {
    match path.find(SEPARATOR) {
        Some(i) => (&path[..i], &path[i + 1..]),
        None => (path, ""),
    }
}

/// segments of a path; the empty path has none
pub fn segments(path: &str) -> Vec<&str> {
    if path.is_empty() {
        return vec![];
    }
    path.split(SEPARATOR).collect()
}

/// tail of `file` relative to `dir`, if `file` lies strictly beneath `dir`
pub fn child<'a>(dir: &str, file: &'a str) -> Option<&'a str> {
    if dir.is_empty() {
        return if file.is_empty() { None } else { Some(file) };
    }
    let rest = file.strip_prefix(dir)?;
    let rest = rest.strip_prefix(SEPARATOR)?;
    if rest.is_empty() {
        None
    } else {
        Some(rest)
    }
}

/// check that a path is usable as a snapshot path
pub fn validate(path: &str) -> Result<()> {
    let invalid = |reason: &str| Error::InvalidPattern {
        pattern: path.to_string(),
        reason: reason.to_string(),
    };

    if path.is_empty() {
        return Err(invalid("empty path"));
    }
    if path.starts_with(SEPARATOR) {
        return Err(invalid("leading separator"));
    }
    if path.chars().any(char::is_whitespace) {
        return Err(invalid("contains whitespace"));
    }
    if path.contains('\0') {
        return Err(invalid("contains null byte"));
    }
    for seg in path.split(SEPARATOR) {
        if seg.is_empty() {
            return Err(invalid("empty segment"));
        }
        if seg == "." || seg == ".." {
            return Err(invalid("relative segment"));
        }
    }
    Ok(())
}

/// one segment of a compiled pattern
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Segment {
    Literal(String),
    Glob(glob::Pattern),
    /// `**`
    Recursive,
}

impl Segment {
    /// compile a single pattern segment
    pub fn parse(seg: &str) -> Result<Self> {
        if seg == "**" {
            return Ok(Segment::Recursive);
        }
        if let Some(lit) = unescape(seg) {
            return Ok(Segment::Literal(lit));
        }
        glob::Pattern::new(seg)
            .map(Segment::Glob)
            .map_err(|e| Error::InvalidPattern {
                pattern: seg.to_string(),
                reason: e.msg.to_string(),
            })
    }

    /// does this segment match one path segment
    pub fn matches(&self, name: &str) -> bool {
        match self {
            Segment::Literal(lit) => lit == name,
            Segment::Glob(pattern) => pattern.matches(name),
            Segment::Recursive => true,
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Segment::Literal(_))
    }

    /// pattern text of this segment; literal metacharacters are bracketed
    pub fn to_pattern(&self) -> String {
        match self {
            Segment::Literal(lit) => glob::Pattern::escape(lit),
            Segment::Glob(pattern) => pattern.as_str().to_string(),
            Segment::Recursive => "**".to_string(),
        }
    }
}

const METACHARS: [char; 4] = ['*', '?', '[', ']'];

/// the literal a segment spells, when its only metacharacters are
/// bracket escapes like `[*]`
fn unescape(seg: &str) -> Option<String> {
    let chars: Vec<char> = seg.chars().collect();
    let mut out = String::with_capacity(seg.len());
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if !METACHARS.contains(&c) {
            out.push(c);
            i += 1;
            continue;
        }
        match chars.get(i..i + 3) {
            Some(&['[', m, ']']) if METACHARS.contains(&m) => {
                out.push(m);
                i += 3;
            }
            _ => return None,
        }
    }
    Some(out)
}

/// compile a pattern string into segments
pub fn parse_pattern(pattern: &str) -> Result<Vec<Segment>> {
    validate(pattern)?;
    pattern.split(SEPARATOR).map(Segment::parse).collect()
}

/// compile a path into literal segments (no wildcard interpretation)
pub fn parse_literal(path: &str) -> Result<Vec<Segment>> {
    validate(path)?;
    Ok(path
        .split(SEPARATOR)
        .map(|s| Segment::Literal(s.to_string()))
        .collect())
}

/// render segments back into pattern text
pub fn render(segments: &[Segment]) -> String {
    segments
        .iter()
        .map(Segment::to_pattern)
        .collect::<Vec<_>>()
        .join(&SEPARATOR.to_string())
}

/// render literal segments back into a path, without escaping
pub fn render_literal(segments: &[Segment]) -> String {
    segments
        .iter()
        .map(|seg| match seg {
            Segment::Literal(lit) => lit.clone(),
            other => other.to_pattern(),
        })
        .collect::<Vec<_>>()
        .join(&SEPARATOR.to_string())
}

/// glob match of a single segment
pub fn match_segment(pattern: &str, name: &str) -> bool {
    match Segment::parse(pattern) {
        Ok(seg) => seg.matches(name),
        Err(_) => pattern == name,
    }
}

/// match compiled segments against path segments
pub fn match_segments(pattern: &[Segment], path: &[&str]) -> bool {
    match pattern.split_first() {
        None => path.is_empty(),
        Some((Segment::Recursive, rest)) => {
            (0..=path.len()).any(|skip| match_segments(rest, &path[skip..]))
        }
        Some((seg, rest)) => match path.split_first() {
            Some((name, tail)) => seg.matches(name) && match_segments(rest, tail),
            None => false,
        },
    }
}

/// match a pattern string against a path; invalid patterns match nothing
pub fn match_pattern(pattern: &str, path: &str) -> bool {
    match parse_pattern(pattern) {
        Ok(segs) => match_segments(&segs, &segments(path)),
        Err(_) => false,
    }
}

/// residual patterns of `pattern` beneath `dir`
///
/// peels the segments of `dir` off the front of `pattern`. a path `p` matches
/// one of the residuals iff `join(dir, p)` matches `pattern`. a `**` may absorb
/// any number of directory segments, so it survives at the head of the residual.
/// residuals that would only match `dir` itself are dropped.
pub fn child_segments(dir: &[&str], pattern: &[Segment]) -> Vec<Vec<Segment>> {
    let mut states = vec![0usize];

    for name in dir {
        let mut next = Vec::new();
        for &pos in &states {
            advance(pattern, pos, name, &mut next);
        }
        next.sort_unstable();
        next.dedup();
        if next.is_empty() {
            return vec![];
        }
        states = next;
    }

    let mut residuals: Vec<Vec<Segment>> = Vec::new();
    for pos in states {
        if pos < pattern.len() {
            let residual = pattern[pos..].to_vec();
            if !residuals.contains(&residual) {
                residuals.push(residual);
            }
        }
    }
    residuals
}

/// every position reachable from `pos` after consuming one segment `name`
fn advance(pattern: &[Segment], pos: usize, name: &str, out: &mut Vec<usize>) {
    match pattern.get(pos) {
        None => {}
        Some(Segment::Recursive) => {
            // absorb the segment, or match zero segments and move on
            out.push(pos);
            advance(pattern, pos + 1, name, out);
        }
        Some(seg) => {
            if seg.matches(name) {
                out.push(pos + 1);
            }
        }
    }
}

/// string form of [`child_segments`]
pub fn child_pattern(dir: &str, pattern: &str) -> Result<Vec<String>> {
    let segs = parse_pattern(pattern)?;
    Ok(child_segments(&segments(dir), &segs)
        .iter()
        .map(|r| render(r))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_and_dir() {
        assert_eq!(base("a/b/c.txt"), "c.txt");
        assert_eq!(base("c.txt"), "c.txt");
        assert_eq!(dir("a/b/c.txt"), "a/b");
        assert_eq!(dir("c.txt"), "");
    }

    #[test]
    fn test_join() {
        assert_eq!(join("a", "b"), "a/b");
        assert_eq!(join("", "b"), "b");
        assert_eq!(join("a", ""), "a");
        assert_eq!(join("a/b", "c/d"), "a/b/c/d");
    }

    #[test]
    fn test_split_first() {
        assert_eq!(split_first("a/b/c"), ("a", "b/c"));
        assert_eq!(split_first("a"), ("a", ""));
    }

    #[test]
    fn test_child() {
        assert_eq!(child("a", "a/b/c"), Some("b/c"));
        assert_eq!(child("a/b", "a/b/c"), Some("c"));
        assert_eq!(child("", "x"), Some("x"));
        assert_eq!(child("a", "a"), None);
        assert_eq!(child("a", "ab/c"), None);
        assert_eq!(child("b", "a/b"), None);
    }

    #[test]
    fn test_validate() {
        assert!(validate("a/b").is_ok());
        assert!(validate("").is_err());
        assert!(validate("/a").is_err());
        assert!(validate("a//b").is_err());
        assert!(validate("a b").is_err());
        assert!(validate("a/../b").is_err());
    }

    #[test]
    fn test_match_segment() {
        assert!(match_segment("*.txt", "foo.txt"));
        assert!(!match_segment("*.txt", "foo.rs"));
        assert!(match_segment("foo", "foo"));
        assert!(match_segment("f?o", "foo"));
    }

    #[test]
    fn test_escaped_literal_segments() {
        assert_eq!(Segment::parse("a[*]").unwrap(), Segment::Literal("a*".to_string()));
        assert_eq!(
            Segment::parse("[[]x[]]").unwrap(),
            Segment::Literal("[x]".to_string())
        );
        assert!(matches!(Segment::parse("a*").unwrap(), Segment::Glob(_)));
        assert!(matches!(Segment::parse("[ab]").unwrap(), Segment::Glob(_)));

        let segs = vec![Segment::Literal("a?".to_string()), Segment::Recursive];
        assert_eq!(render(&segs), "a[?]/**");
        assert_eq!(render_literal(&segs), "a?/**");
        assert_eq!(parse_pattern(&render(&segs)).unwrap(), segs);
        assert!(!match_pattern(&render(&segs), "ab/c"));
        assert!(match_pattern(&render(&segs), "a?/c"));
    }

    #[test]
    fn test_match_pattern() {
        assert!(match_pattern("src/*.rs", "src/lib.rs"));
        assert!(!match_pattern("src/*.rs", "src/a/lib.rs"));
        assert!(match_pattern("src/**", "src/a/lib.rs"));
        assert!(match_pattern("**/*.rs", "lib.rs"));
        assert!(match_pattern("**/*.rs", "a/b/lib.rs"));
        assert!(match_pattern("a/**/z", "a/z"));
        assert!(match_pattern("a/**/z", "a/b/c/z"));
        assert!(!match_pattern("a/**/z", "a/b/c/y"));
        assert!(!match_pattern("a", "a/b"));
    }

    #[test]
    fn test_child_pattern_literal() {
        assert_eq!(child_pattern("a", "a/b/c").unwrap(), vec!["b/c"]);
        assert!(child_pattern("x", "a/b").unwrap().is_empty());
        // the pattern names the directory itself, nothing beneath it
        assert!(child_pattern("a/b", "a/b").unwrap().is_empty());
    }

    #[test]
    fn test_child_pattern_recursive_tail() {
        assert_eq!(child_pattern("a/b/c", "a/**").unwrap(), vec!["**"]);
        assert_eq!(child_pattern("a", "**").unwrap(), vec!["**"]);
    }

    #[test]
    fn test_child_pattern_recursive_head() {
        let residuals = child_pattern("x", "**/x/y").unwrap();
        assert_eq!(residuals, vec!["**/x/y", "y"]);
    }

    #[test]
    fn test_child_pattern_glob() {
        assert_eq!(child_pattern("src", "*/lib.rs").unwrap(), vec!["lib.rs"]);
    }

    #[test]
    fn test_child_segments_law() {
        let cases = [
            ("a", "a/**/z", "q/z"),
            ("a/b", "**/b/*", "c"),
            ("a", "*/c", "c"),
            ("a/b", "a/**", "x/y"),
        ];
        for (d, pat, p) in cases {
            let full = join(d, p);
            let direct = match_pattern(pat, &full);
            let residual = child_pattern(d, pat)
                .unwrap()
                .iter()
                .any(|r| match_pattern(r, p));
            assert_eq!(direct, residual, "{} under {} for {}", pat, d, p);
        }
    }
}
