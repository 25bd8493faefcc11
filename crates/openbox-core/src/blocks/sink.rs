//! Terminal blocks
//!
//! Discard releases packets. ToDevice and ToDump hand them to a
//! [`PacketSink`]; a write failure drops the packet at the block and the
//! engine records it.

use crate::block::{check_input, Block, BlockKind, Routed};
use crate::error::ProcessError;
use crate::io::{NullSink, PacketSink};
use crate::packet::Packet;

/// Drops every packet
#[derive(Debug, Clone)]
pub struct Discard {
    name: String,
}

impl Discard {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Block for Discard {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BlockKind {
        BlockKind::Discard
    }

    fn input_ports(&self) -> usize {
        1
    }

    fn output_ports(&self) -> usize {
        0
    }

    fn process(&mut self, input_port: usize, _packet: Packet) -> Result<Vec<Routed>, ProcessError> {
        check_input(input_port, 1)?;
        Ok(Vec::new())
    }
}

/// Shared state of the egress blocks
struct Egress {
    name: String,
    sink: Box<dyn PacketSink>,
    closed: bool,
}

impl Egress {
    fn new(name: String) -> Self {
        Self {
            name,
            sink: Box::new(NullSink),
            closed: false,
        }
    }

    fn write(&mut self, input_port: usize, packet: Packet) -> Result<Vec<Routed>, ProcessError> {
        check_input(input_port, 1)?;
        self.sink.send(&packet)?;
        Ok(Vec::new())
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.sink.close() {
            tracing::warn!(block = %self.name, error = %e, "Failed to close egress");
        }
    }
}

/// Transmit on a network interface
pub struct ToDevice {
    egress: Egress,
    devname: String,
}

impl ToDevice {
    pub fn new(name: impl Into<String>, devname: impl Into<String>) -> Self {
        Self {
            egress: Egress::new(name.into()),
            devname: devname.into(),
        }
    }

    /// Bind the transmit handle
    pub fn with_sink(mut self, sink: impl PacketSink + 'static) -> Self {
        self.egress.sink = Box::new(sink);
        self
    }

    pub fn devname(&self) -> &str {
        &self.devname
    }
}

/// Record packets to a dump file
pub struct ToDump {
    egress: Egress,
    filename: String,
}

impl ToDump {
    pub fn new(name: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            egress: Egress::new(name.into()),
            filename: filename.into(),
        }
    }

    /// Bind the dump writer
    pub fn with_sink(mut self, sink: impl PacketSink + 'static) -> Self {
        self.egress.sink = Box::new(sink);
        self
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }
}

impl Block for ToDevice {
    fn name(&self) -> &str {
        &self.egress.name
    }

    fn kind(&self) -> BlockKind {
        BlockKind::ToDevice
    }

    fn input_ports(&self) -> usize {
        1
    }

    fn output_ports(&self) -> usize {
        0
    }

    fn process(&mut self, input_port: usize, packet: Packet) -> Result<Vec<Routed>, ProcessError> {
        self.egress.write(input_port, packet)
    }

    fn config(&self) -> serde_json::Value {
        serde_json::json!({ "devname": self.devname })
    }

    fn close(&mut self) {
        self.egress.close();
    }
}

impl Block for ToDump {
    fn name(&self) -> &str {
        &self.egress.name
    }

    fn kind(&self) -> BlockKind {
        BlockKind::ToDump
    }

    fn input_ports(&self) -> usize {
        1
    }

    fn output_ports(&self) -> usize {
        0
    }

    fn process(&mut self, input_port: usize, packet: Packet) -> Result<Vec<Routed>, ProcessError> {
        self.egress.write(input_port, packet)
    }

    fn config(&self) -> serde_json::Value {
        serde_json::json!({ "filename": self.filename })
    }

    fn close(&mut self) {
        self.egress.close();
    }
}
