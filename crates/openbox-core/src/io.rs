//! Ingress and egress boundaries
//!
//! Capture and replay mechanisms live outside the core. Source and sink
//! blocks talk to them through [`PacketSource`] and [`PacketSink`]; the
//! in-memory implementations here back local replay and tests.

use crate::packet::Packet;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

/// Ingress handle bound to a root source block
pub trait PacketSource: Send {
    /// Next packet, or `None` once the source is exhausted
    fn recv(&mut self) -> io::Result<Option<Packet>>;

    /// Release the underlying device or file
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Egress handle bound to a terminal sink block
pub trait PacketSink: Send {
    fn send(&mut self, packet: &Packet) -> io::Result<()>;

    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<S: PacketSource + ?Sized> PacketSource for Box<S> {
    fn recv(&mut self) -> io::Result<Option<Packet>> {
        (**self).recv()
    }

    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}

impl<S: PacketSink + ?Sized> PacketSink for Box<S> {
    fn send(&mut self, packet: &Packet) -> io::Result<()> {
        (**self).send(packet)
    }

    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}

/// Replays a fixed list of packets
#[derive(Debug, Default)]
pub struct MemorySource {
    packets: VecDeque<Packet>,
    closed: Arc<Mutex<bool>>,
}

impl MemorySource {
    pub fn new(packets: impl IntoIterator<Item = Packet>) -> Self {
        Self {
            packets: packets.into_iter().collect(),
            closed: Arc::new(Mutex::new(false)),
        }
    }

    /// Flag observing whether the source was closed
    pub fn closed_flag(&self) -> Arc<Mutex<bool>> {
        self.closed.clone()
    }
}

impl PacketSource for MemorySource {
    fn recv(&mut self) -> io::Result<Option<Packet>> {
        if *self.closed.lock() {
            return Ok(None);
        }
        Ok(self.packets.pop_front())
    }

    fn close(&mut self) -> io::Result<()> {
        *self.closed.lock() = true;
        self.packets.clear();
        Ok(())
    }
}

/// Collects every packet it receives. Clones share the same buffer, so a
/// test can keep one handle and give the other to a sink block.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    inner: Arc<Mutex<MemorySinkState>>,
}

#[derive(Debug, Default)]
struct MemorySinkState {
    packets: Vec<Packet>,
    closed: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn packets(&self) -> Vec<Packet> {
        self.inner.lock().packets.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}

impl PacketSink for MemorySink {
    fn send(&mut self, packet: &Packet) -> io::Result<()> {
        let mut state = self.inner.lock();
        if state.closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed"));
        }
        state.packets.push(packet.clone());
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        self.inner.lock().closed = true;
        Ok(())
    }
}

/// Accepts and forgets packets
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl PacketSink for NullSink {
    fn send(&mut self, _packet: &Packet) -> io::Result<()> {
        Ok(())
    }
}
