//! Execution Engine
//!
//! Runs a deployed statement on a dedicated worker thread. The worker owns
//! the graph outright; callers only share the ingress channel and the
//! atomic counters.
//!
//! ```text
//! source ─► [ingress thread] ─┐
//!                             ├─► bounded channel ─► [worker: Executor]
//! Deployment::inject ─────────┘
//! ```

use crate::error::EngineError;
use crate::executor::{Executor, DEFAULT_MAX_HOPS};
use crate::io::PacketSource;
use crate::packet::Packet;
use crate::stats::{BlockStatsSnapshot, EngineStats, EngineStatsSnapshot, GraphStats};
use crate::statement::Statement;
use crate::topology::Location;
use crossbeam::channel::{bounded, select, Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Ingress channel capacity
    pub queue_capacity: usize,
    /// How long shutdown waits for queued packets
    pub drain_timeout: Duration,
    /// Block visits allowed per packet
    pub max_hops: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 4096,
            drain_timeout: Duration::from_secs(1),
            max_hops: DEFAULT_MAX_HOPS,
        }
    }
}

/// Deploys statements onto worker threads
#[derive(Debug, Clone, Default)]
pub struct Engine {
    config: EngineConfig,
}

/// Outcome of a shutdown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    /// Packets that finished traversal
    pub completed: u64,
    /// Packets dropped at a block
    pub dropped: u64,
    /// Queued packets abandoned at the drain deadline
    pub discarded: u64,
    /// Whether the queue emptied before the deadline
    pub drained: bool,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Start executing a statement
    pub fn deploy(&self, statement: Statement) -> Result<Deployment, EngineError> {
        let (location, graph) = statement.into_parts();
        let stats = Arc::new(EngineStats::default());
        let mut executor = Executor::new(graph)
            .with_max_hops(self.config.max_hops)
            .with_engine_stats(stats.clone());
        let graph_stats = executor.graph_stats();
        let source = executor.take_source().map(IngressSource);

        let (tx, rx) = bounded::<Packet>(self.config.queue_capacity.max(1));
        let (done_tx, done_rx) = bounded::<()>(1);
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let running = Arc::new(AtomicBool::new(true));

        let worker = {
            let stats = stats.clone();
            thread::Builder::new()
                .name(format!("openbox-worker-{}", location.segment()))
                .spawn(move || run_worker(executor, rx, stop_rx, stats, done_tx))
                .map_err(|e| EngineError::SpawnFailed(e.to_string()))?
        };

        let mut deployment = Deployment {
            location,
            tx: Some(tx.clone()),
            running: running.clone(),
            stop: Some(stop_tx),
            worker: Some(worker),
            ingress: None,
            done: done_rx,
            stats: stats.clone(),
            graph_stats,
            drain_timeout: self.config.drain_timeout,
            report: None,
        };

        if let Some(source) = source {
            let (ingress_tx, ingress_rx) = bounded::<()>(1);
            let handle = thread::Builder::new()
                .name(format!("openbox-ingress-{}", deployment.location.segment()))
                .spawn(move || run_ingress(source, tx, running, stats, ingress_tx))
                .map_err(|e| EngineError::SpawnFailed(e.to_string()))?;
            deployment.ingress = Some(Ingress {
                handle,
                done: ingress_rx,
            });
        }

        tracing::info!(
            location = %deployment.location,
            queue_capacity = self.config.queue_capacity,
            ingress = deployment.ingress.is_some(),
            "Statement deployed"
        );

        Ok(deployment)
    }
}

/// Root source pumped by the ingress thread; closed when dropped
struct IngressSource(Box<dyn PacketSource>);

impl Drop for IngressSource {
    fn drop(&mut self) {
        if let Err(e) = self.0.close() {
            tracing::warn!(error = %e, "Failed to close ingress source");
        }
    }
}

struct Ingress {
    handle: thread::JoinHandle<()>,
    /// Disconnects once the ingress thread has closed its source
    done: Receiver<()>,
}

/// A running statement
pub struct Deployment {
    location: Location,
    tx: Option<Sender<Packet>>,
    running: Arc<AtomicBool>,
    /// Dropping this tells the worker to discard what is still queued
    stop: Option<Sender<()>>,
    worker: Option<thread::JoinHandle<()>>,
    ingress: Option<Ingress>,
    done: Receiver<()>,
    stats: Arc<EngineStats>,
    graph_stats: Arc<GraphStats>,
    drain_timeout: Duration,
    report: Option<ShutdownReport>,
}

impl Deployment {
    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn is_running(&self) -> bool {
        self.report.is_none()
    }

    /// Queue a packet without blocking
    pub fn inject(&self, packet: Packet) -> Result<(), EngineError> {
        let tx = self.tx.as_ref().ok_or(EngineError::ShutDown)?;
        let len = packet.len() as u64;
        match tx.try_send(packet) {
            Ok(()) => {
                self.stats.record_injected(len);
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(EngineError::QueueFull),
            Err(TrySendError::Disconnected(_)) => Err(EngineError::ShutDown),
        }
    }

    /// Queue a packet, waiting for room
    pub fn inject_wait(&self, packet: Packet) -> Result<(), EngineError> {
        let tx = self.tx.as_ref().ok_or(EngineError::ShutDown)?;
        let len = packet.len() as u64;
        tx.send(packet).map_err(|_| EngineError::ShutDown)?;
        self.stats.record_injected(len);
        Ok(())
    }

    /// Block until the bound source is exhausted
    pub fn wait_ingress(&mut self) {
        if let Some(ingress) = self.ingress.take() {
            let _ = ingress.handle.join();
        }
    }

    pub fn stats(&self) -> EngineStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn block_stats(&self, name: &str) -> Option<BlockStatsSnapshot> {
        self.graph_stats.get(name)
    }

    /// Stop ingress, drain until the deadline, close every block.
    ///
    /// The deadline covers the ingress source too. A source still blocked
    /// in `recv` when it expires is left to its thread, which closes it
    /// once `recv` returns.
    pub fn shutdown(&mut self) -> ShutdownReport {
        if let Some(report) = self.report {
            return report;
        }

        self.running.store(false, Ordering::Release);
        self.tx = None;
        let deadline = Instant::now() + self.drain_timeout;

        let ingress_stopped = match self.ingress.take() {
            None => true,
            Some(ingress) => match ingress.done.recv_deadline(deadline) {
                Err(RecvTimeoutError::Timeout) => {
                    tracing::warn!(location = %self.location, "Ingress source still blocked at drain deadline, detaching");
                    false
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    let _ = ingress.handle.join();
                    true
                }
            },
        };

        let drained = ingress_stopped
            && match self.done.recv_deadline(deadline) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
                Err(RecvTimeoutError::Timeout) => false,
            };
        self.stop = None;

        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                tracing::error!(location = %self.location, "Worker panicked");
            }
        }

        let snap = self.stats.snapshot();
        let report = ShutdownReport {
            completed: snap.completed,
            dropped: snap.dropped,
            discarded: snap.discarded,
            drained,
        };

        tracing::info!(
            location = %self.location,
            completed = report.completed,
            dropped = report.dropped,
            discarded = report.discarded,
            drained,
            "Deployment shut down"
        );

        self.report = Some(report);
        report
    }
}

impl Drop for Deployment {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Deployment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deployment")
            .field("location", &self.location)
            .field("running", &self.is_running())
            .finish()
    }
}

/// Worker loop: run each queued packet to completion until the channel
/// closes or `stop` disconnects
fn run_worker(
    mut executor: Executor,
    rx: Receiver<Packet>,
    stop: Receiver<()>,
    stats: Arc<EngineStats>,
    done: Sender<()>,
) {
    tracing::debug!(root = executor.graph().root_name(), "Worker starting");
    let started = Instant::now();

    loop {
        select! {
            recv(rx) -> msg => match msg {
                Ok(packet) => {
                    if matches!(stop.try_recv(), Err(TryRecvError::Disconnected)) {
                        discard_queued(&rx, &stats, 1);
                        break;
                    }
                    executor.traverse(packet);
                }
                Err(_) => break,
            },
            recv(stop) -> _ => {
                discard_queued(&rx, &stats, 0);
                break;
            }
        }
    }

    executor.close();
    let _ = done.send(());

    tracing::debug!(elapsed_ms = started.elapsed().as_millis() as u64, "Worker stopped");
}

fn discard_queued(rx: &Receiver<Packet>, stats: &EngineStats, held: u64) {
    let rest = held + rx.try_iter().count() as u64;
    if rest > 0 {
        stats.record_discarded(rest);
        tracing::warn!(discarded = rest, "Drain timeout expired, discarding queued packets");
    }
}

/// Ingress loop: pump the root's source into the channel
fn run_ingress(
    mut source: IngressSource,
    tx: Sender<Packet>,
    running: Arc<AtomicBool>,
    stats: Arc<EngineStats>,
    done: Sender<()>,
) {
    while running.load(Ordering::Acquire) {
        match source.0.recv() {
            Ok(Some(packet)) => {
                let len = packet.len() as u64;
                if tx.send(packet).is_err() {
                    break;
                }
                stats.record_injected(len);
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "Ingress source failed");
                break;
            }
        }
    }

    drop(source);
    drop(done);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{FromDevice, ToDevice};
    use crate::connector::Connector;
    use crate::graph::ProcessingGraph;
    use crate::io::{MemorySink, MemorySource};
    use crate::packet::PacketBuilder;

    fn statement(source: Option<MemorySource>, sink: MemorySink) -> Statement {
        let mut root = FromDevice::new("in", "eth0", true, true);
        if let Some(source) = source {
            root = root.with_source(source);
        }
        let graph = ProcessingGraph::builder()
            .block(root)
            .block(ToDevice::new("out", "eth1").with_sink(sink))
            .connector(Connector::new("in", 0, "out"))
            .root("in")
            .build()
            .unwrap();
        Statement::new(Location::new(1, "test"), graph)
    }

    #[test]
    fn test_inject_and_drain() {
        let sink = MemorySink::new();
        let engine = Engine::default();
        let mut dep = engine.deploy(statement(None, sink.clone())).unwrap();

        for i in 0..50u16 {
            dep.inject(PacketBuilder::tcp().src_port(i).build()).unwrap();
        }
        let report = dep.shutdown();

        assert!(report.drained);
        assert_eq!(report.completed, 50);
        assert_eq!(report.discarded, 0);
        assert_eq!(sink.len(), 50);
        assert!(sink.is_closed());

        // FIFO through a single worker
        let ports: Vec<u16> = sink.packets().iter().filter_map(|p| p.headers().tcp_src).collect();
        assert_eq!(ports, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_inject_after_shutdown() {
        let engine = Engine::default();
        let mut dep = engine.deploy(statement(None, MemorySink::new())).unwrap();
        dep.shutdown();

        assert!(!dep.is_running());
        assert!(matches!(dep.inject(PacketBuilder::tcp().build()), Err(EngineError::ShutDown)));
        assert_eq!(dep.shutdown(), dep.shutdown());
    }

    #[test]
    fn test_source_ingress() {
        let packets: Vec<_> = (0..20).map(|_| PacketBuilder::udp().build()).collect();
        let source = MemorySource::new(packets);
        let closed = source.closed_flag();
        let sink = MemorySink::new();

        let mut dep = Engine::default().deploy(statement(Some(source), sink.clone())).unwrap();
        dep.wait_ingress();
        let report = dep.shutdown();

        assert_eq!(report.completed, 20);
        assert_eq!(dep.block_stats("out").unwrap().received, 20);
        assert!(*closed.lock());
    }

    /// Live capture that stalls in `recv`
    struct StalledCapture {
        stall: Duration,
        closed: Arc<parking_lot::Mutex<bool>>,
    }

    impl PacketSource for StalledCapture {
        fn recv(&mut self) -> std::io::Result<Option<Packet>> {
            thread::sleep(self.stall);
            Ok(None)
        }

        fn close(&mut self) -> std::io::Result<()> {
            *self.closed.lock() = true;
            Ok(())
        }
    }

    #[test]
    fn test_shutdown_bounded_by_blocked_source() {
        let closed = Arc::new(parking_lot::Mutex::new(false));
        let capture = StalledCapture {
            stall: Duration::from_secs(3),
            closed: closed.clone(),
        };
        let sink = MemorySink::new();
        let graph = ProcessingGraph::builder()
            .block(FromDevice::new("in", "eth0", true, true).with_source(capture))
            .block(ToDevice::new("out", "eth1").with_sink(sink.clone()))
            .connector(Connector::new("in", 0, "out"))
            .root("in")
            .build()
            .unwrap();
        let engine = Engine::new(EngineConfig {
            drain_timeout: Duration::from_millis(100),
            ..EngineConfig::default()
        });
        let mut dep = engine.deploy(Statement::new(Location::new(1, "test"), graph)).unwrap();

        let started = Instant::now();
        let report = dep.shutdown();

        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(!report.drained);
        assert!(sink.is_closed());
        // Closed by its own thread once the stalled recv returns
        assert!(!*closed.lock());
    }

    #[test]
    fn test_ingress_source_closed_on_drop() {
        let source = MemorySource::new(vec![PacketBuilder::udp().build()]);
        let closed = source.closed_flag();

        drop(IngressSource(Box::new(source)));
        assert!(*closed.lock());
    }
}
