//! Error types for OpenBox

use thiserror::Error;

/// Structural defects found while building a processing graph or one of its
/// classifier blocks. Always fatal: the graph is never deployed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphValidationError {
    /// Two blocks share a name
    #[error("duplicate block name: {0}")]
    DuplicateBlock(String),

    /// Connector references a block that is not in the graph
    #[error("connector references unknown block: {0}")]
    DanglingConnector(String),

    /// Connector source port beyond the block's output ports
    #[error("output port {port} out of range for block {block} ({count} output ports)")]
    SourcePortOutOfRange { block: String, port: usize, count: usize },

    /// Connector destination port beyond the block's input ports
    #[error("input port {port} out of range for block {block} ({count} input ports)")]
    DestPortOutOfRange { block: String, port: usize, count: usize },

    /// No root was designated
    #[error("no root block designated")]
    MissingRoot,

    /// Designated root is not part of the block set
    #[error("root block not present in graph: {0}")]
    RootNotPresent(String),

    /// Root has a connector pointing into it
    #[error("root block {0} has an incoming connector")]
    RootHasIncoming(String),

    /// Block cannot be reached from the root
    #[error("block {0} is unreachable from the root")]
    UnreachableBlock(String),

    /// Cycle through a block that does not tolerate feedback
    #[error("cycle detected through block {0}")]
    Cycle(String),

    /// Classifier without a catch-all rule in last position
    #[error("classifier {0} has no catch-all rule ranked last")]
    MissingCatchAll(String),

    /// More than one catch-all rule in a header classifier
    #[error("classifier {0} has more than one catch-all rule")]
    MultipleCatchAll(String),

    /// Classifier configured without rules
    #[error("classifier {0} has no rules")]
    EmptyRuleSet(String),

    /// Rule addresses an output port no block can have
    #[error("classifier {block} addresses unrepresentable output port {port}")]
    RulePortOutOfRange { block: String, port: usize },

    /// Header match value does not fit the field
    #[error("invalid header match: {0}")]
    InvalidMatch(String),
}

/// Malformed regex handed to a payload classifier.
#[derive(Error, Debug, Clone)]
#[error("pattern {index} ({pattern:?}) failed to compile: {source}")]
pub struct PatternCompileError {
    /// Position in the rule list
    pub index: usize,
    /// Offending pattern text
    pub pattern: String,
    #[source]
    pub source: regex::Error,
}

/// A rule set was asked to classify a packet no rule matches.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("no classification rule matched the packet")]
pub struct NoMatchingRuleError;

/// Runtime failure inside a block. The packet is dropped at that block.
#[derive(Error, Debug)]
pub enum ProcessError {
    /// Packet could not be interpreted by the block
    #[error("malformed packet: {0}")]
    Malformed(String),

    /// Block received traffic on a port it does not have
    #[error("input port {port} out of range ({count} input ports)")]
    InvalidInputPort { port: usize, count: usize },

    /// Classification failed
    #[error(transparent)]
    NoMatch(#[from] NoMatchingRuleError),

    /// Egress device or file rejected the packet
    #[error("egress error: {0}")]
    Egress(#[from] std::io::Error),
}

/// Engine lifecycle and ingress errors
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("ingress queue full")]
    QueueFull,

    #[error("deployment already shut down")]
    ShutDown,

    #[error("failed to spawn worker: {0}")]
    SpawnFailed(String),
}

/// Statement construction errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StatementError {
    #[error("statement has no location")]
    MissingLocation,

    #[error("statement has no processing graph")]
    MissingGraph,
}

/// Topology resolution errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopologyError {
    #[error("unknown segment: {0}")]
    UnknownSegment(u32),
}

/// OpenBox error type
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Graph(#[from] GraphValidationError),

    #[error(transparent)]
    Pattern(#[from] PatternCompileError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Statement(#[from] StatementError),

    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for OpenBox
pub type Result<T> = std::result::Result<T, Error>;
