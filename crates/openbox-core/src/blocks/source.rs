//! Source blocks
//!
//! Roots of a processing graph. They have no input ports; the engine emits
//! every ingress packet on their single output port. The capture device or
//! dump file itself lives behind a [`PacketSource`] bound at build time.

use crate::block::{Block, BlockKind, Routed};
use crate::error::ProcessError;
use crate::io::PacketSource;
use crate::packet::Packet;

/// Live interface capture
pub struct FromDevice {
    name: String,
    devname: String,
    promisc: bool,
    sniffer: bool,
    source: Option<Box<dyn PacketSource>>,
}

impl FromDevice {
    pub fn new(name: impl Into<String>, devname: impl Into<String>, promisc: bool, sniffer: bool) -> Self {
        Self {
            name: name.into(),
            devname: devname.into(),
            promisc,
            sniffer,
            source: None,
        }
    }

    /// Bind the capture handle
    pub fn with_source(mut self, source: impl PacketSource + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn devname(&self) -> &str {
        &self.devname
    }
}

/// Recorded traffic replay
pub struct FromDump {
    name: String,
    filename: String,
    timing: bool,
    active: bool,
    source: Option<Box<dyn PacketSource>>,
}

impl FromDump {
    pub fn new(name: impl Into<String>, filename: impl Into<String>, timing: bool, active: bool) -> Self {
        Self {
            name: name.into(),
            filename: filename.into(),
            timing,
            active,
            source: None,
        }
    }

    /// Bind the replay handle
    pub fn with_source(mut self, source: impl PacketSource + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }
}

/// Sources forward whatever the engine hands them on port 0
fn emit(packet: Packet) -> Result<Vec<Routed>, ProcessError> {
    Ok(vec![Routed::new(0, packet)])
}

impl Block for FromDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BlockKind {
        BlockKind::FromDevice
    }

    fn input_ports(&self) -> usize {
        0
    }

    fn output_ports(&self) -> usize {
        1
    }

    fn process(&mut self, _input_port: usize, packet: Packet) -> Result<Vec<Routed>, ProcessError> {
        emit(packet)
    }

    fn config(&self) -> serde_json::Value {
        serde_json::json!({
            "devname": self.devname,
            "promisc": self.promisc,
            "sniffer": self.sniffer,
        })
    }

    fn take_source(&mut self) -> Option<Box<dyn PacketSource>> {
        self.source.take()
    }

    fn close(&mut self) {
        if let Some(mut source) = self.source.take() {
            if let Err(e) = source.close() {
                tracing::warn!(block = %self.name, error = %e, "Failed to close capture");
            }
        }
    }
}

impl Block for FromDump {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BlockKind {
        BlockKind::FromDump
    }

    fn input_ports(&self) -> usize {
        0
    }

    fn output_ports(&self) -> usize {
        1
    }

    fn process(&mut self, _input_port: usize, packet: Packet) -> Result<Vec<Routed>, ProcessError> {
        emit(packet)
    }

    fn config(&self) -> serde_json::Value {
        serde_json::json!({
            "filename": self.filename,
            "timing": self.timing,
            "active": self.active,
        })
    }

    fn take_source(&mut self) -> Option<Box<dyn PacketSource>> {
        self.source.take()
    }

    fn close(&mut self) {
        if let Some(mut source) = self.source.take() {
            if let Err(e) = source.close() {
                tracing::warn!(block = %self.name, error = %e, "Failed to close dump");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemorySource;
    use crate::packet::PacketBuilder;

    #[test]
    fn test_source_shape() {
        let dev = FromDevice::new("in", "eth0", true, true);
        assert_eq!(dev.input_ports(), 0);
        assert_eq!(dev.output_ports(), 1);
        assert_eq!(dev.config()["devname"], "eth0");

        let dump = FromDump::new("in", "in_dump.pcap", false, true);
        assert_eq!(dump.kind(), BlockKind::FromDump);
        assert_eq!(dump.config()["filename"], "in_dump.pcap");
    }

    #[test]
    fn test_take_source_once() {
        let mut dev = FromDevice::new("in", "eth0", true, true)
            .with_source(MemorySource::new(vec![PacketBuilder::tcp().build()]));

        assert!(dev.take_source().is_some());
        assert!(dev.take_source().is_none());
    }

    #[test]
    fn test_close_releases_unclaimed_source() {
        let src = MemorySource::new(vec![PacketBuilder::tcp().build()]);
        let closed = src.closed_flag();
        let mut dump = FromDump::new("in", "in.pcap", false, true).with_source(src);

        dump.close();
        assert!(*closed.lock());
    }
}
