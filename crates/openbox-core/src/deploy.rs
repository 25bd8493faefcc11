//! Deployment boundary
//!
//! A [`Deployer`] accepts statements. [`LocalDeployer`] runs them on the
//! in-process engine; [`JsonDeployer`] serializes them for an external
//! runtime.

use crate::engine::{Deployment, Engine, EngineConfig};
use crate::error::Result;
use crate::statement::{Statement, StatementDescriptor};
use std::io::Write;

pub trait Deployer {
    /// What the caller keeps for a deployed statement
    type Handle;

    fn deploy(&mut self, statement: Statement) -> Result<Self::Handle>;
}

/// Runs statements on the in-process engine
#[derive(Debug, Clone, Default)]
pub struct LocalDeployer {
    engine: Engine,
}

impl LocalDeployer {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            engine: Engine::new(config),
        }
    }
}

impl Deployer for LocalDeployer {
    type Handle = Deployment;

    fn deploy(&mut self, statement: Statement) -> Result<Deployment> {
        Ok(self.engine.deploy(statement)?)
    }
}

/// Writes statement descriptors as JSON, one document per statement
pub struct JsonDeployer<W: Write> {
    writer: W,
    pretty: bool,
}

impl<W: Write> JsonDeployer<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, pretty: false }
    }

    pub fn pretty(mut self) -> Self {
        self.pretty = true;
        self
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write(&mut self, desc: &StatementDescriptor) -> Result<()> {
        if self.pretty {
            serde_json::to_writer_pretty(&mut self.writer, desc)?;
        } else {
            serde_json::to_writer(&mut self.writer, desc)?;
        }
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

impl<W: Write> Deployer for JsonDeployer<W> {
    type Handle = StatementDescriptor;

    fn deploy(&mut self, statement: Statement) -> Result<StatementDescriptor> {
        let desc = statement.describe();

        // Nothing runs locally; release whatever the blocks hold, written or not
        let (_, mut graph) = statement.into_parts();
        let written = self.write(&desc);
        graph.close();
        written?;

        tracing::info!(
            location = %desc.location,
            blocks = desc.blocks.len(),
            connectors = desc.connectors.len(),
            "Statement descriptor written"
        );
        Ok(desc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{Discard, FromDevice, ToDevice};
    use crate::connector::Connector;
    use crate::graph::ProcessingGraph;
    use crate::io::MemorySink;
    use crate::packet::PacketBuilder;
    use crate::topology::Location;
    use std::io;

    fn statement() -> Statement {
        let graph = ProcessingGraph::builder()
            .block(FromDevice::new("in", "eth0", true, true))
            .block(Discard::new("drop"))
            .connector(Connector::new("in", 0, "drop"))
            .root("in")
            .build()
            .unwrap();
        Statement::new(Location::new(220, "edge"), graph)
    }

    #[test]
    fn test_json_deployer_writes_descriptor() {
        let mut deployer = JsonDeployer::new(Vec::new());
        let desc = deployer.deploy(statement()).unwrap();

        let out = deployer.into_inner();
        let parsed: StatementDescriptor = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed, desc);
        assert_eq!(parsed.connectors, vec![Connector::new("in", 0, "drop")]);
    }

    /// Rejects every write
    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "runtime went away"))
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_json_deployer_closes_on_write_error() {
        let sink = MemorySink::new();
        let graph = ProcessingGraph::builder()
            .block(FromDevice::new("in", "eth0", true, true))
            .block(ToDevice::new("out", "eth1").with_sink(sink.clone()))
            .connector(Connector::new("in", 0, "out"))
            .root("in")
            .build()
            .unwrap();

        let mut deployer = JsonDeployer::new(BrokenPipe);
        let err = deployer.deploy(Statement::new(Location::new(220, "edge"), graph));

        assert!(err.is_err());
        assert!(sink.is_closed());
    }

    #[test]
    fn test_local_deployer_runs() {
        let mut deployer = LocalDeployer::default();
        let mut dep = deployer.deploy(statement()).unwrap();

        dep.inject(PacketBuilder::tcp().build()).unwrap();
        let report = dep.shutdown();
        assert_eq!(report.completed, 1);
        assert_eq!(dep.block_stats("drop").unwrap().received, 1);
    }
}
