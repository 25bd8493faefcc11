//! Topology resolution
//!
//! Maps a segment identifier to the deployment location a statement is
//! bound to. Resolution is an explicit object handed to the application.

use crate::error::TopologyError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Resolved network location; opaque to the core
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    segment: u32,
    name: String,
}

impl Location {
    pub fn new(segment: u32, name: impl Into<String>) -> Self {
        Self {
            segment,
            name: name.into(),
        }
    }

    pub fn segment(&self) -> u32 {
        self.segment
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.segment)
    }
}

pub trait TopologyResolver {
    fn resolve(&self, segment: u32) -> Result<Location, TopologyError>;
}

/// Fixed segment table
#[derive(Debug, Clone, Default)]
pub struct StaticTopology {
    segments: HashMap<u32, Location>,
    open: bool,
}

impl StaticTopology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve every segment, naming unknown ones `segment-<id>`
    pub fn open() -> Self {
        Self {
            segments: HashMap::new(),
            open: true,
        }
    }

    pub fn with_segment(mut self, segment: u32, name: impl Into<String>) -> Self {
        self.segments.insert(segment, Location::new(segment, name));
        self
    }
}

impl TopologyResolver for StaticTopology {
    fn resolve(&self, segment: u32) -> Result<Location, TopologyError> {
        match self.segments.get(&segment) {
            Some(loc) => Ok(loc.clone()),
            None if self.open => Ok(Location::new(segment, format!("segment-{}", segment))),
            None => Err(TopologyError::UnknownSegment(segment)),
        }
    }
}
