//! Hierarchical, dot-separated model paths.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ModelError;

/// Address of a node in the model graph.
///
/// A path is an ordered sequence of name segments. The root path has no
/// segments and renders as `<root>`; every other path renders its segments
/// joined by `.` (e.g. `visualStudio.projects.fooProject`).
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModelPath {
    segments: Vec<String>,
}

impl ModelPath {
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse dotted text. The empty string is the root path.
    pub fn parse(text: &str) -> Result<Self, ModelError> {
        if text.is_empty() {
            return Ok(Self::root());
        }
        let mut segments = Vec::new();
        for (idx, segment) in text.split('.').enumerate() {
            if segment.trim().is_empty() {
                return Err(ModelError::InvalidPath {
                    input: text.to_string(),
                    reason: format!("segment {idx} is empty"),
                });
            }
            segments.push(segment.to_string());
        }
        Ok(Self { segments })
    }

    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    /// Like [`Self::child`], but rejects segments the dotted syntax cannot
    /// address: empty ones and ones containing `.`.
    pub fn try_child(&self, segment: &str) -> Result<Self, ModelError> {
        let child = self.child(segment);
        match invalid_segment(segment) {
            Some(reason) => Err(ModelError::InvalidPath {
                input: child.to_string(),
                reason: reason.to_string(),
            }),
            None => Ok(child),
        }
    }

    pub fn parent(&self) -> Option<Self> {
        let (_, init) = self.segments.split_last()?;
        Some(Self {
            segments: init.to_vec(),
        })
    }

    /// Last segment, `None` for the root.
    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// True if `self` lies strictly below `other`.
    pub fn is_descendant_of(&self, other: &ModelPath) -> bool {
        self.segments.len() > other.segments.len() && self.segments.starts_with(&other.segments)
    }
}

/// Why `segment` cannot be a path segment, if it cannot.
pub(crate) fn invalid_segment(segment: &str) -> Option<&'static str> {
    if segment.trim().is_empty() {
        Some("segment is empty")
    } else if segment.contains('.') {
        Some("segment contains '.'")
    } else {
        None
    }
}

impl fmt::Display for ModelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return f.write_str("<root>");
        }
        f.write_str(&self.segments.join("."))
    }
}

impl FromStr for ModelPath {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ModelPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.segments.join("."))
    }
}

impl<'de> Deserialize<'de> for ModelPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
