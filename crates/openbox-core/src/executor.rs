//! Graph Executor
//!
//! Synchronous, single-owner traversal of a processing graph. Each packet
//! enters at the root, is handed to blocks in FIFO order and ends in one
//! or more terminations. Block failures drop the packet at that block and
//! never poison later packets.

use crate::graph::ProcessingGraph;
use crate::packet::Packet;
use crate::stats::{BlockStatsSnapshot, EngineStats, EngineStatsSnapshot, GraphStats};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

/// Default bound on block visits per packet, clones included. Applies only
/// to graphs with feedback.
pub const DEFAULT_MAX_HOPS: usize = 64;

/// One block visit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hop {
    pub block: Arc<str>,
    pub input_port: usize,
    /// Ports the block emitted on, in emission order
    pub output_ports: Vec<usize>,
}

/// How a packet (or one of its clones) left the graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// A block returned no outputs
    Consumed { block: Arc<str> },
    /// Emitted on a port with no connector
    Unconnected { block: Arc<str>, port: usize },
    /// The block failed; the packet went no further
    Dropped { block: Arc<str>, reason: String },
    /// Visit budget exhausted in a feedback loop before reaching the block
    HopLimit { block: Arc<str> },
}

impl Termination {
    pub fn block(&self) -> &str {
        match self {
            Termination::Consumed { block }
            | Termination::Unconnected { block, .. }
            | Termination::Dropped { block, .. }
            | Termination::HopLimit { block } => block,
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Consumed { block } => write!(f, "consumed at {}", block),
            Termination::Unconnected { block, port } => write!(f, "left {} on unconnected port {}", block, port),
            Termination::Dropped { block, reason } => write!(f, "dropped at {}: {}", block, reason),
            Termination::HopLimit { block } => write!(f, "hop limit reached before {}", block),
        }
    }
}

/// Record of one packet's traversal
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PacketTrace {
    pub hops: Vec<Hop>,
    pub terminations: Vec<Termination>,
}

impl PacketTrace {
    /// Block names in visit order
    pub fn visited(&self) -> Vec<&str> {
        self.hops.iter().map(|h| &*h.block).collect()
    }

    /// Output ports taken at the first visit of `block`
    pub fn ports_at(&self, block: &str) -> Option<&[usize]> {
        self.hops
            .iter()
            .find(|h| &*h.block == block)
            .map(|h| h.output_ports.as_slice())
    }

    pub fn consumed_at(&self, block: &str) -> bool {
        self.terminations
            .iter()
            .any(|t| matches!(t, Termination::Consumed { block: b } if &**b == block))
    }

    pub fn is_dropped(&self) -> bool {
        self.terminations
            .iter()
            .any(|t| matches!(t, Termination::Dropped { .. } | Termination::HopLimit { .. }))
    }
}

/// Drives packets through an owned graph
pub struct Executor {
    graph: ProcessingGraph,
    names: Vec<Arc<str>>,
    stats: Arc<GraphStats>,
    engine_stats: Arc<EngineStats>,
    max_hops: usize,
    queue: VecDeque<(usize, usize, Packet)>,
}

impl Executor {
    pub fn new(graph: ProcessingGraph) -> Self {
        let names: Vec<Arc<str>> = graph.block_names().map(Arc::from).collect();
        let stats = Arc::new(GraphStats::new(names.iter().map(|n| &**n)));
        Self {
            graph,
            names,
            stats,
            engine_stats: Arc::new(EngineStats::default()),
            max_hops: DEFAULT_MAX_HOPS,
            queue: VecDeque::with_capacity(16),
        }
    }

    /// Visit budget for graphs with feedback. Acyclic graphs run every
    /// packet to its terminal blocks.
    pub fn with_max_hops(mut self, max_hops: usize) -> Self {
        self.max_hops = max_hops.max(1);
        self
    }

    pub(crate) fn with_engine_stats(mut self, stats: Arc<EngineStats>) -> Self {
        self.engine_stats = stats;
        self
    }

    pub fn graph(&self) -> &ProcessingGraph {
        &self.graph
    }

    pub fn graph_stats(&self) -> Arc<GraphStats> {
        self.stats.clone()
    }

    pub fn block_stats(&self, name: &str) -> Option<BlockStatsSnapshot> {
        self.stats.get(name)
    }

    pub fn stats(&self) -> EngineStatsSnapshot {
        self.engine_stats.snapshot()
    }

    /// Run one packet to completion
    pub fn process(&mut self, packet: Packet) -> PacketTrace {
        self.engine_stats.record_injected(packet.len() as u64);
        self.traverse(packet)
    }

    /// Traversal for packets already counted at ingress
    pub(crate) fn traverse(&mut self, packet: Packet) -> PacketTrace {
        let mut trace = PacketTrace::default();
        let mut hops = 0usize;
        let capped = self.graph.has_feedback();

        self.queue.clear();
        self.queue.push_back((self.graph.root(), 0, packet));

        while let Some((b, input_port, packet)) = self.queue.pop_front() {
            if capped && hops == self.max_hops {
                trace.terminations.push(Termination::HopLimit { block: self.names[b].clone() });
                for (rest, _, _) in self.queue.drain(..) {
                    trace.terminations.push(Termination::HopLimit { block: self.names[rest].clone() });
                }
                tracing::debug!(limit = self.max_hops, "Packet exceeded hop limit");
                self.engine_stats.record_drop();
                break;
            }
            hops += 1;

            let name = self.names[b].clone();
            let stats = self.stats.block(b);
            stats.record_received();

            let block = self.graph.block_mut(b);
            let outputs = block.output_ports();
            let routed = match block.process(input_port, packet) {
                Ok(routed) => routed,
                Err(e) => {
                    tracing::debug!(block = %name, input_port, error = %e, "Packet dropped");
                    stats.record_drop();
                    self.engine_stats.record_drop();
                    trace.hops.push(Hop {
                        block: name.clone(),
                        input_port,
                        output_ports: Vec::new(),
                    });
                    trace.terminations.push(Termination::Dropped {
                        block: name,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            trace.hops.push(Hop {
                block: name.clone(),
                input_port,
                output_ports: routed.iter().map(|r| r.port).collect(),
            });

            if routed.is_empty() {
                trace.terminations.push(Termination::Consumed { block: name });
                continue;
            }
            stats.record_forwarded(routed.len() as u64);

            for out in routed {
                if out.port >= outputs {
                    tracing::debug!(block = %name, port = out.port, "Block emitted on a port it does not have");
                    stats.record_drop();
                    self.engine_stats.record_drop();
                    trace.terminations.push(Termination::Dropped {
                        block: name.clone(),
                        reason: format!("output port {} out of range ({} output ports)", out.port, outputs),
                    });
                    continue;
                }

                let edges = self.graph.successors(b, out.port);
                match edges.split_last() {
                    None => {
                        tracing::trace!(block = %name, port = out.port, "Packet left on unconnected port");
                        trace.terminations.push(Termination::Unconnected {
                            block: name.clone(),
                            port: out.port,
                        });
                    }
                    Some((last, rest)) => {
                        for edge in rest {
                            self.queue.push_back((edge.block, edge.port, out.packet.clone()));
                        }
                        self.queue.push_back((last.block, last.port, out.packet));
                    }
                }
            }
        }

        self.engine_stats.record_completed();
        tracing::trace!(hops = trace.hops.len(), terminations = trace.terminations.len(), "Packet traversal done");
        trace
    }

    /// Hand over the root's bound ingress source, if any
    pub(crate) fn take_source(&mut self) -> Option<Box<dyn crate::io::PacketSource>> {
        let root = self.graph.root();
        self.graph.block_mut(root).take_source()
    }

    /// Close every block
    pub fn close(&mut self) {
        self.graph.close();
    }
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("graph", &self.graph)
            .field("max_hops", &self.max_hops)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{Block, BlockKind, Routed};
    use crate::blocks::{Discard, FromDevice, ToDevice};
    use crate::connector::Connector;
    use crate::error::ProcessError;
    use crate::io::MemorySink;
    use crate::packet::PacketBuilder;

    /// Emits every packet on all of its ports
    struct Tee {
        name: String,
        outputs: usize,
    }

    impl Block for Tee {
        fn name(&self) -> &str {
            &self.name
        }
        fn kind(&self) -> BlockKind {
            BlockKind::Custom
        }
        fn input_ports(&self) -> usize {
            1
        }
        fn output_ports(&self) -> usize {
            self.outputs
        }
        fn process(&mut self, _input_port: usize, packet: Packet) -> Result<Vec<Routed>, ProcessError> {
            Ok((0..self.outputs).map(|p| Routed::new(p, packet.clone())).collect())
        }
    }

    /// Fails on every packet
    struct Faulty;

    impl Block for Faulty {
        fn name(&self) -> &str {
            "faulty"
        }
        fn kind(&self) -> BlockKind {
            BlockKind::Custom
        }
        fn input_ports(&self) -> usize {
            1
        }
        fn output_ports(&self) -> usize {
            1
        }
        fn process(&mut self, _input_port: usize, _packet: Packet) -> Result<Vec<Routed>, ProcessError> {
            Err(ProcessError::Malformed("truncated".into()))
        }
    }

    /// Loops packets back to itself
    struct Echo;

    impl Block for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        fn kind(&self) -> BlockKind {
            BlockKind::Custom
        }
        fn input_ports(&self) -> usize {
            1
        }
        fn output_ports(&self) -> usize {
            1
        }
        fn process(&mut self, _input_port: usize, packet: Packet) -> Result<Vec<Routed>, ProcessError> {
            Ok(vec![Routed::new(0, packet)])
        }
        fn supports_feedback(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_fan_out_order() {
        let left = MemorySink::new();
        let right = MemorySink::new();
        let graph = ProcessingGraph::builder()
            .block(FromDevice::new("in", "eth0", true, true))
            .block(ToDevice::new("left", "eth1").with_sink(left.clone()))
            .block(ToDevice::new("right", "eth2").with_sink(right.clone()))
            .connector(Connector::new("in", 0, "left"))
            .connector(Connector::new("in", 0, "right"))
            .root("in")
            .build()
            .unwrap();

        let mut exec = Executor::new(graph);
        let pkt = PacketBuilder::tcp().payload(b"x").build();
        let trace = exec.process(pkt.clone());

        assert_eq!(trace.visited(), vec!["in", "left", "right"]);
        assert!(trace.consumed_at("left"));
        assert!(trace.consumed_at("right"));
        assert_eq!(left.packets(), vec![pkt.clone()]);
        assert_eq!(right.packets(), vec![pkt]);
    }

    #[test]
    fn test_unconnected_port() {
        let graph = ProcessingGraph::builder()
            .block(FromDevice::new("in", "eth0", true, true))
            .block(Tee {
                name: "tee".into(),
                outputs: 2,
            })
            .block(Discard::new("drop"))
            .connector(Connector::new("in", 0, "tee"))
            .connector(Connector::new("tee", 0, "drop"))
            .root("in")
            .build()
            .unwrap();

        let mut exec = Executor::new(graph);
        let trace = exec.process(PacketBuilder::udp().build());

        assert_eq!(trace.ports_at("tee"), Some(&[0, 1][..]));
        assert!(trace.consumed_at("drop"));
        assert!(trace
            .terminations
            .contains(&Termination::Unconnected { block: "tee".into(), port: 1 }));
    }

    #[test]
    fn test_error_drops_and_continues() {
        let graph = ProcessingGraph::builder()
            .block(FromDevice::new("in", "eth0", true, true))
            .block(Faulty)
            .block(Discard::new("drop"))
            .connector(Connector::new("in", 0, "faulty"))
            .connector(Connector::new("faulty", 0, "drop"))
            .root("in")
            .build()
            .unwrap();

        let mut exec = Executor::new(graph);
        for _ in 0..3 {
            let trace = exec.process(PacketBuilder::tcp().build());
            assert!(trace.is_dropped());
            assert_eq!(trace.terminations[0].block(), "faulty");
        }

        assert_eq!(exec.block_stats("faulty").unwrap().dropped, 3);
        assert_eq!(exec.block_stats("drop").unwrap().received, 0);
        let stats = exec.stats();
        assert_eq!(stats.injected, 3);
        assert_eq!(stats.completed, 3);
        assert_eq!(stats.dropped, 3);
    }

    #[test]
    fn test_hop_limit_on_feedback_loop() {
        let graph = ProcessingGraph::builder()
            .block(FromDevice::new("in", "eth0", true, true))
            .block(Echo)
            .connector(Connector::new("in", 0, "echo"))
            .connector(Connector::new("echo", 0, "echo"))
            .root("in")
            .build()
            .unwrap();

        let mut exec = Executor::new(graph).with_max_hops(8);
        let trace = exec.process(PacketBuilder::tcp().build());

        assert_eq!(trace.hops.len(), 8);
        assert_eq!(trace.terminations, vec![Termination::HopLimit { block: "echo".into() }]);
    }

    #[test]
    fn test_long_acyclic_chain_reaches_sink() {
        let out = MemorySink::new();
        let mut builder = ProcessingGraph::builder()
            .block(FromDevice::new("in", "eth0", true, true))
            .block(ToDevice::new("out", "eth1").with_sink(out.clone()))
            .root("in");
        let mut prev = "in".to_string();
        for i in 0..70 {
            let name = format!("b{}", i);
            builder = builder
                .block(Tee {
                    name: name.clone(),
                    outputs: 1,
                })
                .connector(Connector::new(&prev, 0, &name));
            prev = name;
        }
        let graph = builder.connector(Connector::new(&prev, 0, "out")).build().unwrap();
        assert!(!graph.has_feedback());

        let mut exec = Executor::new(graph).with_max_hops(4);
        let trace = exec.process(PacketBuilder::tcp().build());

        assert_eq!(trace.hops.len(), 72);
        assert_eq!(trace.terminations, vec![Termination::Consumed { block: "out".into() }]);
        assert_eq!(out.len(), 1);
        assert_eq!(exec.stats().dropped, 0);
    }
}
