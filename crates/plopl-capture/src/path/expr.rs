//! Path grammar and parsing.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

const LENGTH_SUFFIX: &str = ".length()";

static FIND_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+)\[\]\.find\(([^)]+)\)$").expect("static regex"));

/// Errors produced while parsing a path expression.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("path is empty")]
    Empty,
    #[error("empty segment in path '{0}'")]
    EmptySegment(String),
    #[error("'.length()' must terminate the path: '{0}'")]
    MisplacedLength(String),
    #[error("'.find(prop)' must follow an array segment and terminate the path: '{0}'")]
    MalformedFind(String),
    #[error("unsupported segment '{segment}' in path '{path}'")]
    UnsupportedSegment { path: String, segment: String },
}

/// A single key step, optionally marked as array-valued (`key[]`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub key: String,
    pub array: bool,
}

/// Terminal pseudo-accessor applied to the value reached by the segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accessor {
    /// `.length()`
    Length,
    /// `.find(prop)`
    Find(String),
}

/// A parsed path expression.
///
/// Parsing never panics; a malformed path is kept with its error so that
/// extraction can still answer `null` for it.
#[derive(Debug, Clone, PartialEq)]
pub struct PathExpr {
    raw: String,
    segments: Vec<Segment>,
    accessor: Option<Accessor>,
    error: Option<PathError>,
}

impl PathExpr {
    /// Parse a path, keeping malformed paths as inert expressions.
    pub fn parse(raw: &str) -> Self {
        match Self::try_parse(raw) {
            Ok(expr) => expr,
            Err(error) => Self {
                raw: raw.to_string(),
                segments: Vec::new(),
                accessor: None,
                error: Some(error),
            },
        }
    }

    /// Parse a path, reporting the first grammar violation.
    pub fn try_parse(raw: &str) -> Result<Self, PathError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(PathError::Empty);
        }

        let (base, accessor) = if let Some(base) = trimmed.strip_suffix(LENGTH_SUFFIX) {
            (base.to_string(), Some(Accessor::Length))
        } else if trimmed.contains(LENGTH_SUFFIX) {
            return Err(PathError::MisplacedLength(raw.to_string()));
        } else if trimmed.contains(".find(") {
            let caps = FIND_PATTERN
                .captures(trimmed)
                .ok_or_else(|| PathError::MalformedFind(raw.to_string()))?;
            let prop = caps[2].trim().to_string();
            if prop.is_empty() {
                return Err(PathError::MalformedFind(raw.to_string()));
            }
            (caps[1].to_string(), Some(Accessor::Find(prop)))
        } else {
            (trimmed.to_string(), None)
        };

        let segments = parse_segments(raw, &base)?;

        Ok(Self {
            raw: raw.to_string(),
            segments,
            accessor,
            error: None,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn accessor(&self) -> Option<&Accessor> {
        self.accessor.as_ref()
    }

    pub fn error(&self) -> Option<&PathError> {
        self.error.as_ref()
    }

    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }

    /// Property name for `.find(prop)` paths.
    pub fn find_property(&self) -> Option<&str> {
        match &self.accessor {
            Some(Accessor::Find(prop)) => Some(prop),
            _ => None,
        }
    }

    /// Name under which the extracted value is reported.
    ///
    /// Plain paths use their last key, `.length()` paths append `Length` to
    /// the key holding the array, and `.find(prop)` paths use `prop`.
    pub fn field_name(&self) -> String {
        match (&self.accessor, self.segments.last()) {
            (Some(Accessor::Find(prop)), _) => prop.clone(),
            (Some(Accessor::Length), Some(last)) => format!("{}Length", last.key),
            (None, Some(last)) => last.key.clone(),
            (_, None) => self
                .raw
                .rsplit('.')
                .next()
                .unwrap_or_default()
                .replace("[]", ""),
        }
    }
}

impl fmt::Display for PathExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn parse_segments(raw: &str, base: &str) -> Result<Vec<Segment>, PathError> {
    base.split('.')
        .map(|part| {
            let part = part.trim();
            if part.is_empty() {
                return Err(PathError::EmptySegment(raw.to_string()));
            }
            let (key, array) = match part.strip_suffix("[]") {
                Some(key) => (key, true),
                None => (part, false),
            };
            if key.is_empty() || key.contains(['[', ']', '(', ')']) {
                return Err(PathError::UnsupportedSegment {
                    path: raw.to_string(),
                    segment: part.to_string(),
                });
            }
            Ok(Segment {
                key: key.to_string(),
                array,
            })
        })
        .collect()
}
