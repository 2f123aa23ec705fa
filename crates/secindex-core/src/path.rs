//! Content paths.
//!
//! A [`ContentPath`] names a content node relative to the site root as an
//! ordered list of segment names. The root is the empty path. Paths can be
//! built from a segment sequence or parsed from a single `/`-delimited string;
//! both go through [`IntoContentPath`], which is what the tree operations accept.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, SecIndexError};

/// Delimiter of the string form of a path.
pub const DELIMITER: char = '/';

/// A validated, root-relative content path.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentPath(Vec<String>);

impl ContentPath {
    /// The empty path, naming the root.
    pub fn root() -> Self {
        ContentPath(Vec::new())
    }

    /// Parses a `/`-delimited path. Leading, trailing and repeated slashes
    /// are tolerated; `.`, `..` and NUL are not.
    pub fn parse(path: &str) -> Result<Self> {
        if path.contains('\0') {
            return Err(SecIndexError::MalformedPath(format!(
                "{:?} contains NUL",
                path
            )));
        }
        let mut segments = Vec::new();
        for segment in path.split(DELIMITER).filter(|s| !s.is_empty()) {
            check_segment(segment, path)?;
            segments.push(segment.to_string());
        }
        Ok(ContentPath(segments))
    }

    /// Builds a path from individual segments. Every segment must be
    /// non-empty and free of delimiters.
    pub fn from_segments<I, S>(segments: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out = Vec::new();
        for segment in segments {
            let segment = segment.as_ref();
            if segment.is_empty() {
                return Err(SecIndexError::MalformedPath(
                    "empty path segment".to_string(),
                ));
            }
            if segment.contains(DELIMITER) {
                return Err(SecIndexError::MalformedPath(format!(
                    "segment {:?} contains '{}'",
                    segment, DELIMITER
                )));
            }
            check_segment(segment, segment)?;
            out.push(segment.to_string());
        }
        Ok(ContentPath(out))
    }

    /// Returns the segments in order.
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Number of segments (zero for the root).
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// True for the empty path.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Last segment, the local id of the named node.
    pub fn name(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Path of the containing node; `None` for the root.
    pub fn parent(&self) -> Option<ContentPath> {
        if self.is_root() {
            return None;
        }
        Some(ContentPath(self.0[..self.0.len() - 1].to_vec()))
    }

    /// Appends one segment.
    pub fn join(&self, segment: &str) -> Result<ContentPath> {
        let tail = ContentPath::from_segments([segment])?;
        let mut segments = self.0.clone();
        segments.extend(tail.0);
        Ok(ContentPath(segments))
    }

    /// True if `prefix` is this path or one of its ancestors.
    pub fn starts_with(&self, prefix: &ContentPath) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Replaces the leading `from` with `to`. `None` if `from` is not a prefix.
    pub fn rebase(&self, from: &ContentPath, to: &ContentPath) -> Option<ContentPath> {
        if !self.starts_with(from) {
            return None;
        }
        let mut segments = to.0.clone();
        segments.extend_from_slice(&self.0[from.0.len()..]);
        Some(ContentPath(segments))
    }
}

fn check_segment(segment: &str, context: &str) -> Result<()> {
    if segment == "." || segment == ".." {
        return Err(SecIndexError::MalformedPath(format!(
            "relative segment {:?} in {:?}",
            segment, context
        )));
    }
    if segment.contains('\0') {
        return Err(SecIndexError::MalformedPath(format!(
            "{:?} contains NUL",
            context
        )));
    }
    Ok(())
}

impl fmt::Display for ContentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "{}", DELIMITER);
        }
        for segment in &self.0 {
            write!(f, "{}{}", DELIMITER, segment)?;
        }
        Ok(())
    }
}

/// Conversion into a [`ContentPath`], accepted by every tree operation that
/// takes a path.
pub trait IntoContentPath {
    /// Validates and converts.
    fn into_content_path(self) -> Result<ContentPath>;
}

impl IntoContentPath for ContentPath {
    fn into_content_path(self) -> Result<ContentPath> {
        Ok(self)
    }
}

impl IntoContentPath for &ContentPath {
    fn into_content_path(self) -> Result<ContentPath> {
        Ok(self.clone())
    }
}

impl IntoContentPath for &str {
    fn into_content_path(self) -> Result<ContentPath> {
        ContentPath::parse(self)
    }
}

impl IntoContentPath for String {
    fn into_content_path(self) -> Result<ContentPath> {
        ContentPath::parse(&self)
    }
}

impl IntoContentPath for &String {
    fn into_content_path(self) -> Result<ContentPath> {
        ContentPath::parse(self)
    }
}

impl IntoContentPath for &[&str] {
    fn into_content_path(self) -> Result<ContentPath> {
        ContentPath::from_segments(self)
    }
}

impl IntoContentPath for &[String] {
    fn into_content_path(self) -> Result<ContentPath> {
        ContentPath::from_segments(self)
    }
}

impl IntoContentPath for Vec<String> {
    fn into_content_path(self) -> Result<ContentPath> {
        ContentPath::from_segments(self)
    }
}

impl IntoContentPath for Vec<&str> {
    fn into_content_path(self) -> Result<ContentPath> {
        ContentPath::from_segments(self)
    }
}

impl<const N: usize> IntoContentPath for [&str; N] {
    fn into_content_path(self) -> Result<ContentPath> {
        ContentPath::from_segments(self)
    }
}
