//! Processing graph
//!
//! Blocks, connectors and a designated root, validated eagerly at build
//! time. A graph that exists is structurally sound:
//!
//! - block names are unique
//! - every connector endpoint exists and its ports are in range
//! - the root is a true source (nothing points into it)
//! - every block is reachable from the root
//! - cycles only close into blocks that tolerate feedback
//!
//! ```text
//! [FromDevice] ──► [HeaderClassifier] ─0─► [RegexClassifier] ─0..n-1─► [Alert] ──► [Discard]
//!                                     └1─► [ToDevice] ◄──────── n ─────┘
//! ```

use crate::block::{Block, BlockDescriptor};
use crate::connector::Connector;
use crate::error::GraphValidationError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Resolved connector endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edge {
    /// Destination block index
    pub block: usize,
    /// Destination input port
    pub port: usize,
}

/// Validated processing graph
pub struct ProcessingGraph {
    blocks: Vec<Box<dyn Block>>,
    index: HashMap<String, usize>,
    connectors: Vec<Connector>,
    /// `outputs[block][port]` lists the edges leaving that port, in
    /// connector declaration order
    outputs: Vec<Vec<Vec<Edge>>>,
    root: usize,
    /// Some cycle closes into a feedback-tolerant block
    feedback: bool,
    closed: bool,
}

/// Serializable graph description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDescriptor {
    pub root: String,
    pub blocks: Vec<BlockDescriptor>,
    pub connectors: Vec<Connector>,
}

/// Port shape of a block, all validation needs
struct Shape<'a> {
    name: &'a str,
    inputs: usize,
    outputs: usize,
    feedback: bool,
}

struct Topology {
    index: HashMap<String, usize>,
    outputs: Vec<Vec<Vec<Edge>>>,
    root: usize,
    feedback: bool,
}

impl ProcessingGraph {
    pub fn builder() -> GraphBuilder {
        GraphBuilder::default()
    }

    /// Re-run every structural check. Never mutates the graph.
    pub fn validate(&self) -> Result<(), GraphValidationError> {
        let shapes = shapes(&self.blocks);
        let root = self.blocks[self.root].name();
        let topo = check(&shapes, &self.connectors, Some(root))?;
        debug_assert_eq!(topo.root, self.root);
        Ok(())
    }

    pub fn root(&self) -> usize {
        self.root
    }

    pub fn root_name(&self) -> &str {
        self.blocks[self.root].name()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// True if packets can revisit a block. Acyclic graphs always terminate.
    pub fn has_feedback(&self) -> bool {
        self.feedback
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn block(&self, idx: usize) -> &dyn Block {
        self.blocks[idx].as_ref()
    }

    pub fn block_by_name(&self, name: &str) -> Option<&dyn Block> {
        self.index_of(name).map(|i| self.block(i))
    }

    pub(crate) fn block_mut(&mut self, idx: usize) -> &mut dyn Block {
        self.blocks[idx].as_mut()
    }

    pub fn block_names(&self) -> impl Iterator<Item = &str> {
        self.blocks.iter().map(|b| b.name())
    }

    pub fn connectors(&self) -> &[Connector] {
        &self.connectors
    }

    /// Edges leaving `port` of block `idx`; empty if the port is unwired
    #[inline]
    pub fn successors(&self, idx: usize, port: usize) -> &[Edge] {
        self.outputs[idx].get(port).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Blocks in breadth-first order from the root
    pub fn traverse(&self) -> Vec<usize> {
        let mut seen = vec![false; self.blocks.len()];
        let mut order = Vec::with_capacity(self.blocks.len());
        let mut queue = VecDeque::from([self.root]);
        seen[self.root] = true;

        while let Some(b) = queue.pop_front() {
            order.push(b);
            for edge in self.outputs[b].iter().flatten() {
                if !seen[edge.block] {
                    seen[edge.block] = true;
                    queue.push_back(edge.block);
                }
            }
        }
        order
    }

    /// Close every block, releasing devices and files. Runs once; dropping
    /// the graph closes it too.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        for block in &mut self.blocks {
            block.close();
        }
    }

    pub fn describe(&self) -> GraphDescriptor {
        GraphDescriptor {
            root: self.root_name().to_string(),
            blocks: self.blocks.iter().map(|b| b.describe()).collect(),
            connectors: self.connectors.clone(),
        }
    }
}

impl Drop for ProcessingGraph {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for ProcessingGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessingGraph")
            .field("root", &self.root_name())
            .field("blocks", &self.blocks)
            .field("connectors", &self.connectors)
            .finish()
    }
}

/// Builder for [`ProcessingGraph`]
#[derive(Default)]
pub struct GraphBuilder {
    blocks: Vec<Box<dyn Block>>,
    connectors: Vec<Connector>,
    root: Option<String>,
}

impl GraphBuilder {
    pub fn block(mut self, block: impl Block + 'static) -> Self {
        self.blocks.push(Box::new(block));
        self
    }

    pub fn boxed_block(mut self, block: Box<dyn Block>) -> Self {
        self.blocks.push(block);
        self
    }

    pub fn blocks(mut self, blocks: impl IntoIterator<Item = Box<dyn Block>>) -> Self {
        self.blocks.extend(blocks);
        self
    }

    pub fn connector(mut self, connector: Connector) -> Self {
        self.connectors.push(connector);
        self
    }

    pub fn connectors(mut self, connectors: impl IntoIterator<Item = Connector>) -> Self {
        self.connectors.extend(connectors);
        self
    }

    pub fn root(mut self, name: impl Into<String>) -> Self {
        self.root = Some(name.into());
        self
    }

    pub fn build(self) -> Result<ProcessingGraph, GraphValidationError> {
        let topo = {
            let shapes = shapes(&self.blocks);
            check(&shapes, &self.connectors, self.root.as_deref())?
        };

        tracing::debug!(
            blocks = self.blocks.len(),
            connectors = self.connectors.len(),
            root = self.root.as_deref().unwrap_or(""),
            "Processing graph validated"
        );

        Ok(ProcessingGraph {
            blocks: self.blocks,
            index: topo.index,
            connectors: self.connectors,
            outputs: topo.outputs,
            root: topo.root,
            feedback: topo.feedback,
            closed: false,
        })
    }
}

fn shapes(blocks: &[Box<dyn Block>]) -> Vec<Shape<'_>> {
    blocks
        .iter()
        .map(|b| Shape {
            name: b.name(),
            inputs: b.input_ports(),
            outputs: b.output_ports(),
            feedback: b.supports_feedback(),
        })
        .collect()
}

/// Full structural validation
fn check(shapes: &[Shape<'_>], connectors: &[Connector], root: Option<&str>) -> Result<Topology, GraphValidationError> {
    let mut index = HashMap::with_capacity(shapes.len());
    for (i, s) in shapes.iter().enumerate() {
        if index.insert(s.name.to_string(), i).is_some() {
            return Err(GraphValidationError::DuplicateBlock(s.name.to_string()));
        }
    }

    let root_name = root.ok_or(GraphValidationError::MissingRoot)?;
    let root = *index
        .get(root_name)
        .ok_or_else(|| GraphValidationError::RootNotPresent(root_name.to_string()))?;

    let mut outputs: Vec<Vec<Vec<Edge>>> = shapes.iter().map(|s| vec![Vec::new(); s.outputs]).collect();

    for c in connectors {
        let src = *index
            .get(&c.src)
            .ok_or_else(|| GraphValidationError::DanglingConnector(c.src.clone()))?;
        let dst = *index
            .get(&c.dst)
            .ok_or_else(|| GraphValidationError::DanglingConnector(c.dst.clone()))?;

        if c.src_port >= shapes[src].outputs {
            return Err(GraphValidationError::SourcePortOutOfRange {
                block: c.src.clone(),
                port: c.src_port,
                count: shapes[src].outputs,
            });
        }
        if c.dst_port >= shapes[dst].inputs {
            return Err(GraphValidationError::DestPortOutOfRange {
                block: c.dst.clone(),
                port: c.dst_port,
                count: shapes[dst].inputs,
            });
        }
        if dst == root {
            return Err(GraphValidationError::RootHasIncoming(root_name.to_string()));
        }

        outputs[src][c.src_port].push(Edge { block: dst, port: c.dst_port });
    }

    // Reachability
    let mut seen = vec![false; shapes.len()];
    let mut queue = VecDeque::from([root]);
    seen[root] = true;
    while let Some(b) = queue.pop_front() {
        for edge in outputs[b].iter().flatten() {
            if !seen[edge.block] {
                seen[edge.block] = true;
                queue.push_back(edge.block);
            }
        }
    }
    if let Some(i) = seen.iter().position(|s| !s) {
        return Err(GraphValidationError::UnreachableBlock(shapes[i].name.to_string()));
    }

    let feedback = check_cycles(shapes, &outputs, root)?;

    Ok(Topology {
        index,
        outputs,
        root,
        feedback,
    })
}

/// Depth-first search for back edges. A back edge into a block that
/// tolerates feedback is allowed; returns whether one was seen.
fn check_cycles(shapes: &[Shape<'_>], outputs: &[Vec<Vec<Edge>>], root: usize) -> Result<bool, GraphValidationError> {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Mark {
        New,
        Active,
        Done,
    }

    let mut marks = vec![Mark::New; shapes.len()];
    // (block, next successor to visit)
    let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
    marks[root] = Mark::Active;
    let mut feedback = false;

    while let Some(&mut (b, ref mut next)) = stack.last_mut() {
        let succ: Vec<usize> = outputs[b].iter().flatten().map(|e| e.block).collect();

        if *next < succ.len() {
            let d = succ[*next];
            *next += 1;
            match marks[d] {
                Mark::Active if shapes[d].feedback => feedback = true,
                Mark::Active => return Err(GraphValidationError::Cycle(shapes[d].name.to_string())),
                Mark::New => {
                    marks[d] = Mark::Active;
                    stack.push((d, 0));
                }
                Mark::Done => {}
            }
        } else {
            marks[b] = Mark::Done;
            stack.pop();
        }
    }

    Ok(feedback)
}
