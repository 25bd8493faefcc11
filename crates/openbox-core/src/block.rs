//! Processing blocks
//!
//! A block is a named unit with a fixed number of input and output ports.
//! It never sees its neighbors: it only maps `(input_port, packet)` to a
//! list of `(output_port, packet)` pairs and the graph does the wiring.

use crate::error::ProcessError;
use crate::io::PacketSource;
use crate::packet::Packet;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Block type tag, as carried in statement descriptors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockKind {
    FromDevice,
    FromDump,
    ToDevice,
    ToDump,
    HeaderClassifier,
    RegexClassifier,
    Alert,
    Discard,
    Custom,
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A packet emitted on an output port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routed {
    pub port: usize,
    pub packet: Packet,
}

impl Routed {
    #[inline(always)]
    pub fn new(port: usize, packet: Packet) -> Self {
        Self { port, packet }
    }
}

/// Serializable description of a block for deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: BlockKind,
    pub input_ports: usize,
    pub output_ports: usize,
    pub config: serde_json::Value,
}

/// Processing block trait
///
/// `process` is called by exactly one worker at a time, so implementations
/// keep their mutable state (counters, limiters) without locking.
pub trait Block: Send {
    fn name(&self) -> &str;

    fn kind(&self) -> BlockKind;

    fn input_ports(&self) -> usize;

    fn output_ports(&self) -> usize;

    /// Route one packet arriving on `input_port`.
    ///
    /// Returning an empty list consumes the packet. Returning more than one
    /// entry duplicates it; blocks doing so document it.
    fn process(&mut self, input_port: usize, packet: Packet) -> Result<Vec<Routed>, ProcessError>;

    /// Block-specific configuration for descriptors
    fn config(&self) -> serde_json::Value {
        serde_json::Value::Null
    }

    /// Whether a connector may close a cycle into this block
    fn supports_feedback(&self) -> bool {
        false
    }

    /// Hand over the ingress source bound to a root block
    fn take_source(&mut self) -> Option<Box<dyn PacketSource>> {
        None
    }

    /// Release external resources. Called once when the graph shuts down.
    fn close(&mut self) {}

    fn describe(&self) -> BlockDescriptor {
        BlockDescriptor {
            name: self.name().to_string(),
            kind: self.kind(),
            input_ports: self.input_ports(),
            output_ports: self.output_ports(),
            config: self.config(),
        }
    }
}

impl fmt::Debug for dyn Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("name", &self.name())
            .field("kind", &self.kind())
            .field("inputs", &self.input_ports())
            .field("outputs", &self.output_ports())
            .finish()
    }
}

/// Reject traffic on ports the block does not have
#[inline]
pub(crate) fn check_input(port: usize, count: usize) -> Result<(), ProcessError> {
    if port < count {
        Ok(())
    } else {
        Err(ProcessError::InvalidInputPort { port, count })
    }
}
