//! Statements
//!
//! A processing graph bound to the location it should run at. Built once,
//! then handed to a deployer.

use crate::block::BlockDescriptor;
use crate::connector::Connector;
use crate::error::StatementError;
use crate::graph::ProcessingGraph;
use crate::topology::Location;
use serde::{Deserialize, Serialize};

#[derive(Debug)]
pub struct Statement {
    location: Location,
    graph: ProcessingGraph,
}

/// Wire form of a statement for external runtimes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementDescriptor {
    pub location: Location,
    pub root: String,
    pub blocks: Vec<BlockDescriptor>,
    pub connectors: Vec<Connector>,
}

impl Statement {
    pub fn new(location: Location, graph: ProcessingGraph) -> Self {
        Self { location, graph }
    }

    pub fn builder() -> StatementBuilder {
        StatementBuilder::default()
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn graph(&self) -> &ProcessingGraph {
        &self.graph
    }

    pub fn into_parts(self) -> (Location, ProcessingGraph) {
        (self.location, self.graph)
    }

    pub fn describe(&self) -> StatementDescriptor {
        let graph = self.graph.describe();
        StatementDescriptor {
            location: self.location.clone(),
            root: graph.root,
            blocks: graph.blocks,
            connectors: graph.connectors,
        }
    }
}

#[derive(Debug, Default)]
pub struct StatementBuilder {
    location: Option<Location>,
    graph: Option<ProcessingGraph>,
}

impl StatementBuilder {
    pub fn location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    pub fn graph(mut self, graph: ProcessingGraph) -> Self {
        self.graph = Some(graph);
        self
    }

    pub fn build(self) -> Result<Statement, StatementError> {
        Ok(Statement {
            location: self.location.ok_or(StatementError::MissingLocation)?,
            graph: self.graph.ok_or(StatementError::MissingGraph)?,
        })
    }
}
