//! Path pattern compilation and matching.
//!
//! # Responsibilities
//! - Compile `/items/{id}/*` style patterns once, at registration
//! - Match request paths segment by segment
//! - Extract `{name}` parameters
//!
//! # Design Decisions
//! - Method matching is case-insensitive (per HTTP usage)
//! - Path matching is case-sensitive
//! - Empty segments are ignored, so `/a//b/` matches like `/a/b`
//! - `*` is only allowed as the last segment and matches zero or more segments
//! - No regex to guarantee O(n) matching

use axum::http::Method;
use thiserror::Error;

/// Errors raised while compiling a path pattern.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("pattern must start with '/': {0}")]
    MissingLeadingSlash(String),

    #[error("parameter segment without a name in {0}")]
    EmptyParam(String),

    #[error("wildcard must be the last segment in {0}")]
    WildcardNotLast(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
    Wildcard,
}

/// A compiled path pattern.
#[derive(Debug, Clone)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    /// Compile a pattern.
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        if !pattern.starts_with('/') {
            return Err(PatternError::MissingLeadingSlash(pattern.to_string()));
        }

        let parts: Vec<&str> = split_path(pattern).collect();
        let mut segments = Vec::with_capacity(parts.len());

        for (i, part) in parts.iter().enumerate() {
            let segment = if *part == "*" {
                if i + 1 != parts.len() {
                    return Err(PatternError::WildcardNotLast(pattern.to_string()));
                }
                Segment::Wildcard
            } else if part.starts_with('{') && part.ends_with('}') {
                let name = &part[1..part.len() - 1];
                if name.is_empty() {
                    return Err(PatternError::EmptyParam(pattern.to_string()));
                }
                Segment::Param(name.to_string())
            } else {
                Segment::Literal((*part).to_string())
            };
            segments.push(segment);
        }

        Ok(Self {
            raw: pattern.to_string(),
            segments,
        })
    }

    /// The pattern as written in configuration.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Match a request path, returning extracted parameters on success.
    pub fn matches(&self, path: &str) -> Option<Vec<(String, String)>> {
        let mut params = Vec::new();
        let mut parts = split_path(path);

        for segment in &self.segments {
            match segment {
                Segment::Wildcard => return Some(params),
                Segment::Literal(expected) => {
                    if parts.next()? != expected.as_str() {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    let value = parts.next()?;
                    params.push((name.clone(), value.to_string()));
                }
            }
        }

        // Literal/param patterns must consume the whole path.
        if parts.next().is_some() {
            return None;
        }
        Some(params)
    }
}

impl std::fmt::Display for PathPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Case-insensitive method comparison.
pub fn method_matches(expected: &Method, actual: &Method) -> bool {
    expected.as_str().eq_ignore_ascii_case(actual.as_str())
}
