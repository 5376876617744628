//! File-selection patterns used by stage and prime rules.
//!
//! Patterns are evaluated against paths relative to a tree root, segment by
//! segment. A `**` segment matches zero or more whole segments; any other
//! segment containing `*`, `?` or `[...]` is matched with [`glob::Pattern`]
//! and never crosses a `/`. Literal segments compare exactly.

use crate::SchemaError;
use glob::MatchOptions;
use serde::{Deserialize, Serialize};
use std::fmt;

const SEGMENT_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Wildcard(glob::Pattern),
    GlobStar,
}

impl Segment {
    fn parse(raw: &str, segment: &str) -> Result<Self, SchemaError> {
        if segment == "**" {
            return Ok(Self::GlobStar);
        }
        if segment.contains("**") {
            return Err(invalid(raw, "'**' must be a whole path segment"));
        }
        if !segment.contains(['*', '?', '[']) {
            return Ok(Self::Literal(segment.to_owned()));
        }
        glob::Pattern::new(segment)
            .map(Self::Wildcard)
            .map_err(|e| invalid(raw, &e.to_string()))
    }

    fn matches(&self, name: &str) -> bool {
        match self {
            Self::Literal(lit) => lit == name,
            Self::Wildcard(pat) => pat.matches_with(name, SEGMENT_OPTIONS),
            Self::GlobStar => true,
        }
    }
}

fn invalid(raw: &str, reason: &str) -> SchemaError {
    SchemaError::InvalidPattern {
        pattern: raw.to_owned(),
        reason: reason.to_owned(),
    }
}

/// A single stage/prime selection pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    raw: String,
    segments: Vec<Segment>,
}

impl Pattern {
    /// Parse a pattern. Absolute paths and `..` segments are rejected because
    /// they would select files outside the tree the rule applies to.
    pub fn new(raw: &str) -> Result<Self, SchemaError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(invalid(raw, "pattern must not be empty"));
        }
        if trimmed.starts_with('/') {
            return Err(invalid(raw, "pattern must be relative to the tree root"));
        }

        let mut segments = Vec::new();
        for part in trimmed.split('/') {
            match part {
                "" | "." => {}
                ".." => return Err(invalid(raw, "pattern must not leave the tree root")),
                seg => segments.push(Segment::parse(raw, seg)?),
            }
        }
        if segments.is_empty() {
            return Err(invalid(raw, "pattern must name at least one path segment"));
        }

        Ok(Self {
            raw: trimmed.to_owned(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether any segment is a wildcard. Non-wildcard patterns name exactly
    /// one path and are expected to match something.
    pub fn is_wildcard(&self) -> bool {
        self.segments
            .iter()
            .any(|s| !matches!(s, Segment::Literal(_)))
    }

    /// The normalized relative path of a non-wildcard pattern.
    pub fn literal_path(&self) -> Option<String> {
        let mut parts = Vec::with_capacity(self.segments.len());
        for seg in &self.segments {
            match seg {
                Segment::Literal(lit) => parts.push(lit.as_str()),
                _ => return None,
            }
        }
        Some(parts.join("/"))
    }

    /// Match a `/`-separated path relative to the tree root.
    pub fn matches(&self, rel_path: &str) -> bool {
        let path: Vec<&str> = rel_path
            .split('/')
            .filter(|s| !s.is_empty() && *s != ".")
            .collect();
        match_segments(&self.segments, &path)
    }
}

fn match_segments(pattern: &[Segment], path: &[&str]) -> bool {
    match pattern.split_first() {
        None => path.is_empty(),
        Some((Segment::GlobStar, rest)) => {
            (0..=path.len()).any(|skip| match_segments(rest, &path[skip..]))
        }
        Some((seg, rest)) => match path.split_first() {
            Some((head, tail)) => seg.matches(head) && match_segments(rest, tail),
            None => false,
        },
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// An ordered list of include patterns.
///
/// An empty rule includes everything. Inclusion does not depend on pattern
/// order: a path is selected when any pattern matches it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct SelectionRule {
    patterns: Vec<Pattern>,
}

/// Outcome of applying a [`SelectionRule`] to a set of candidate paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    /// Selected candidates, in candidate order.
    pub matched: Vec<String>,
    /// Non-wildcard patterns that matched no candidate, in declaration order.
    pub missing: Vec<String>,
}

impl SelectionRule {
    pub fn new<S: AsRef<str>>(raw: &[S]) -> Result<Self, SchemaError> {
        let patterns = raw
            .iter()
            .map(|p| Pattern::new(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    pub fn includes(&self, rel_path: &str) -> bool {
        self.patterns.is_empty() || self.patterns.iter().any(|p| p.matches(rel_path))
    }

    pub fn select<'a, I>(&self, candidates: I) -> Selection
    where
        I: IntoIterator<Item = &'a str>,
    {
        let candidates: Vec<&str> = candidates.into_iter().collect();
        let matched = candidates
            .iter()
            .filter(|c| self.includes(c))
            .map(|c| (*c).to_owned())
            .collect();

        let missing = self
            .patterns
            .iter()
            .filter_map(Pattern::literal_path)
            .filter(|lit| !candidates.iter().any(|c| c == lit))
            .collect();

        Selection { matched, missing }
    }
}

impl TryFrom<Vec<String>> for SelectionRule {
    type Error = SchemaError;

    fn try_from(raw: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(&raw)
    }
}

impl From<SelectionRule> for Vec<String> {
    fn from(rule: SelectionRule) -> Self {
        rule.patterns.into_iter().map(|p| p.raw).collect()
    }
}
