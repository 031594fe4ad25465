//! Route templates with parameter segments and colon verb suffixes.
//!
//! A template is a `/`-separated list of segments. Each segment is one of:
//!
//! - a literal, matched byte-for-byte (`plans`, `stops:import`);
//! - a parameter, written with a leading colon (`:planId`), matching any single
//!   non-empty path segment;
//! - a parameter followed by a literal verb (`:planId:optimize`), matching a
//!   non-empty value that ends in exactly that verb.
//!
//! Only a colon at the very start of a segment introduces a parameter. Any
//! later colon is part of a literal, so `stops:import` is a plain literal. A
//! backslash-escaped colon (`\:`) is always literal, even at the start of a
//! segment.

use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param {
        name: String,
        /// Literal text the path segment must end with, e.g. `:optimize`.
        suffix: String,
    },
}

impl Segment {
    fn parse(raw: &str) -> Self {
        match raw.strip_prefix(':') {
            Some(rest) => {
                let (name, suffix) = match rest.find([':', '\\']) {
                    Some(at) => rest.split_at(at),
                    None => (rest, ""),
                };
                Segment::Param {
                    name: name.to_string(),
                    suffix: unescape(suffix),
                }
            }
            None => Segment::Literal(unescape(raw)),
        }
    }

    fn matches(&self, segment: &str) -> bool {
        match self {
            Segment::Literal(literal) => literal == segment,
            Segment::Param { suffix, .. } => segment
                .strip_suffix(suffix.as_str())
                .is_some_and(|value| !value.is_empty()),
        }
    }
}

fn unescape(raw: &str) -> String {
    raw.replace("\\:", ":")
}

/// A parsed route template such as `/plans/:planId/stops:import`.
///
/// Templates match the path only; a query string or fragment on the input is
/// ignored. Parameters bind nothing, they only constrain the shape of the path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl PathTemplate {
    pub fn new(template: &str) -> Self {
        let segments = template
            .strip_prefix('/')
            .unwrap_or(template)
            .split('/')
            .map(Segment::parse)
            .collect();

        Self {
            source: template.to_string(),
            segments,
        }
    }

    /// Returns `true` when `path` has exactly as many segments as the template
    /// and every segment matches.
    pub fn matches(&self, path: &str) -> bool {
        let Some(path) = strip_query(path).strip_prefix('/') else {
            return false;
        };

        let mut segments = path.split('/');
        for expected in &self.segments {
            match segments.next() {
                Some(actual) if expected.matches(actual) => {}
                _ => return false,
            }
        }
        segments.next().is_none()
    }

    /// Names of the parameter segments, in order.
    pub fn params(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Param { name, .. } => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Drops any `?query` or `#fragment` from a request target.
pub(crate) fn strip_query(path: &str) -> &str {
    match path.find(['?', '#']) {
        Some(at) => &path[..at],
        None => path,
    }
}
