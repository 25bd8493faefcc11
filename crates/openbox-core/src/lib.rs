//! OpenBox Processing Graph
//!
//! Packet-processing graphs for software-defined middleboxes. Applications
//! declare blocks, wire them with connectors, bind the graph to a network
//! location and hand the resulting statement to a deployer.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        BoxApplication                            │
//! │   blocks + connectors ──► ProcessingGraph ──► Statement          │
//! └───────────────────────────────┬──────────────────────────────────┘
//!                                 │ Deployer
//!               ┌─────────────────┴─────────────────┐
//!               ▼                                   ▼
//!      ┌─────────────────┐                 ┌─────────────────┐
//!      │  LocalDeployer  │                 │  JsonDeployer   │
//!      │  Engine/worker  │                 │  descriptor out │
//!      └────────┬────────┘                 └─────────────────┘
//!               ▼
//!      ┌─────────────────┐
//!      │    Executor     │  root ─► classifiers ─► alerts ─► sinks
//!      └─────────────────┘
//! ```
//!
//! # Classification
//!
//! | Block | Match | Port selection |
//! |-------|-------|----------------|
//! | `HeaderClassifier` | exact L2-L4 fields | priority desc, order asc, first hit |
//! | `RegexClassifier` | payload regex | lowest matching index, catch-all last |

pub mod application;
pub mod block;
pub mod blocks;
pub mod classifier;
pub mod connector;
pub mod deploy;
pub mod engine;
pub mod error;
pub mod executor;
pub mod graph;
pub mod header;
pub mod io;
pub mod packet;
pub mod statement;
pub mod stats;
pub mod topology;

pub use application::{launch, BoxApplication, InstanceInfo};
pub use block::{Block, BlockDescriptor, BlockKind, Routed};
pub use blocks::{Alert, AlertConfig, Discard, FromDevice, FromDump, Severity, ToDevice, ToDump};
pub use classifier::{
    HeaderClassifier, HeaderClassifierRule, HeaderRuleSet, MatchStrategy, PayloadMatcher, Priority, RegexClassifier,
    RuleKey,
};
pub use connector::Connector;
pub use deploy::{Deployer, JsonDeployer, LocalDeployer};
pub use engine::{Deployment, Engine, EngineConfig, ShutdownReport};
pub use error::{
    EngineError, Error, GraphValidationError, NoMatchingRuleError, PatternCompileError, ProcessError, Result,
    StatementError, TopologyError,
};
pub use executor::{Executor, PacketTrace, Termination};
pub use graph::{GraphDescriptor, ProcessingGraph};
pub use header::{HeaderField, HeaderMatch, HeaderValue, TransportPort};
pub use io::{MemorySink, MemorySource, NullSink, PacketSink, PacketSource};
pub use packet::{Packet, PacketBuilder, PacketHeaders};
pub use statement::{Statement, StatementDescriptor};
pub use topology::{Location, StaticTopology, TopologyResolver};
