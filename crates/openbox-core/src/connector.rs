//! Connectors
//!
//! Directed edges from one block's output port to another block's input
//! port. Blocks are referenced by name; the graph builder resolves them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Directed wiring between two block ports
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Connector {
    pub src: String,
    pub src_port: usize,
    pub dst: String,
    pub dst_port: usize,
}

impl Connector {
    /// Wire `src:src_port` to input port 0 of `dst`
    pub fn new(src: impl Into<String>, src_port: usize, dst: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            src_port,
            dst: dst.into(),
            dst_port: 0,
        }
    }

    pub fn builder() -> ConnectorBuilder {
        ConnectorBuilder::default()
    }

    /// Target a specific input port
    pub fn to_port(mut self, dst_port: usize) -> Self {
        self.dst_port = dst_port;
        self
    }
}

impl fmt::Display for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}] -> [{}]{}", self.src, self.src_port, self.dst_port, self.dst)
    }
}

/// Builder for [`Connector`]
#[derive(Debug, Default)]
pub struct ConnectorBuilder {
    src: String,
    src_port: usize,
    dst: String,
    dst_port: usize,
}

impl ConnectorBuilder {
    pub fn source_block(mut self, name: impl Into<String>) -> Self {
        self.src = name.into();
        self
    }

    pub fn source_output_port(mut self, port: usize) -> Self {
        self.src_port = port;
        self
    }

    pub fn dest_block(mut self, name: impl Into<String>) -> Self {
        self.dst = name.into();
        self
    }

    pub fn dest_input_port(mut self, port: usize) -> Self {
        self.dst_port = port;
        self
    }

    pub fn build(self) -> Connector {
        Connector {
            src: self.src,
            src_port: self.src_port,
            dst: self.dst,
            dst_port: self.dst_port,
        }
    }
}
