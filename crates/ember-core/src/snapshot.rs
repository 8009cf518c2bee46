//! Structural snapshots of a live session.
//!
//! External diagnostics walk the network through [`NetworkVisitor`]; the
//! engine only emits structure — node kinds, memory sizes, tuple samples —
//! and leaves rendering to the consumer. [`StructuralSnapshot`] is the
//! provided collector, serializable for transport.

use crate::facts::FactId;
use crate::network::{NodeId, ReteNode};
use crate::session::Session;
use serde::Serialize;

/// How many tuples/facts a node sample carries at most.
const SAMPLE_LIMIT: usize = 3;

/// One node as seen by a snapshot walk.
#[derive(Debug, Clone, Serialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub kind: String,
    pub label: String,
    /// Entries currently held by this node's memory (facts for alpha
    /// memories, tuples for beta-side nodes).
    pub memory_size: usize,
    /// Up to [`SAMPLE_LIMIT`] sample entries, each the fact-id chain of one
    /// tuple (a single id for alpha memories).
    pub samples: Vec<Vec<FactId>>,
    pub successors: Vec<NodeId>,
}

/// Working-memory summary attached to a snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct WorkingMemorySnapshot {
    pub fact_count: usize,
    pub tuple_count: usize,
    pub activation_count: usize,
}

/// Receives the structural walk of a session.
pub trait NetworkVisitor {
    fn visit_node(&mut self, node: &NodeSnapshot);
    fn visit_working_memory(&mut self, memory: &WorkingMemorySnapshot);
}

/// Collecting visitor producing a serializable description.
#[derive(Debug, Default, Serialize)]
pub struct StructuralSnapshot {
    pub nodes: Vec<NodeSnapshot>,
    pub working_memory: Option<WorkingMemorySnapshot>,
}

impl StructuralSnapshot {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl NetworkVisitor for StructuralSnapshot {
    fn visit_node(&mut self, node: &NodeSnapshot) {
        self.nodes.push(node.clone());
    }

    fn visit_working_memory(&mut self, memory: &WorkingMemorySnapshot) {
        self.working_memory = Some(memory.clone());
    }
}

impl Session {
    /// Walk the network and working memory, emitting a structural
    /// description to the visitor. Nodes are visited in arena order.
    pub fn accept(&self, visitor: &mut dyn NetworkVisitor) {
        for node in self.network.nodes() {
            let snapshot = self.node_snapshot(node);
            visitor.visit_node(&snapshot);
        }
        visitor.visit_working_memory(&WorkingMemorySnapshot {
            fact_count: self.memory.fact_count(),
            tuple_count: self.memory.tuples.len(),
            activation_count: self.agenda.len(),
        });
    }

    /// Convenience wrapper collecting the walk into a [`StructuralSnapshot`].
    pub fn snapshot(&self) -> StructuralSnapshot {
        let mut collector = StructuralSnapshot::default();
        self.accept(&mut collector);
        collector
    }

    fn node_snapshot(&self, node: &ReteNode) -> NodeSnapshot {
        let id = node.id();
        let (memory_size, samples) = match node {
            ReteNode::AlphaMemory(_) => {
                let memory = self.memory.alpha_memory_ref(id);
                let size = memory.map(|m| m.len()).unwrap_or(0);
                let samples = memory
                    .map(|m| m.facts.iter().take(SAMPLE_LIMIT).map(|&f| vec![f]).collect())
                    .unwrap_or_default();
                (size, samples)
            }
            ReteNode::BetaRoot(_)
            | ReteNode::Join(_)
            | ReteNode::TupleSelection(_)
            | ReteNode::Not(_)
            | ReteNode::Exists(_)
            | ReteNode::Aggregate(_)
            | ReteNode::Binding(_)
            | ReteNode::Terminal(_) => {
                let memory = self.memory.beta_memory_ref(id);
                let size = memory.map(|m| m.len()).unwrap_or(0);
                let samples = memory
                    .map(|m| {
                        m.tuples
                            .iter()
                            .take(SAMPLE_LIMIT)
                            .map(|&t| self.memory.tuples.fact_ids(t))
                            .collect()
                    })
                    .unwrap_or_default();
                (size, samples)
            }
            _ => (0, Vec::new()),
        };
        NodeSnapshot {
            id,
            kind: node.kind().to_string(),
            label: node.label(),
            memory_size,
            samples,
            successors: node.successors().to_vec(),
        }
    }
}
