//! Model Graph - Data dependencies between templates
//!
//! Nodes own their templates in an arena; edges reference nodes by index.
//! An edge `producer -> consumer` on field `f` means the consumer's `f`
//! is filled from the producer's baseline response.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::template::FuzzTemplate;

/// Index of a node in the graph arena
pub type NodeId = usize;

/// Inferred data dependency
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Edge {
    pub producer: NodeId,
    pub consumer: NodeId,
    pub field: String,
}

/// Directed dependency graph over fuzz templates
#[derive(Debug, Default)]
pub struct ModelGraph {
    nodes: Vec<FuzzTemplate>,
    edges: Vec<Edge>,
}

impl ModelGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from templates in declaration order
    pub fn from_templates(templates: impl IntoIterator<Item = FuzzTemplate>) -> Self {
        let mut graph = Self::new();
        for template in templates {
            graph.connect(template);
        }
        graph
    }

    /// Insert a node and re-infer edges against every other node
    pub fn connect(&mut self, template: FuzzTemplate) -> NodeId {
        self.nodes.push(template);
        self.infer_edges();
        self.nodes.len() - 1
    }

    fn infer_edges(&mut self) {
        let mut edges = Vec::new();
        for (consumer, template) in self.nodes.iter().enumerate() {
            for field in template.field_names() {
                // A node that also consumes the field echoes it rather than originating it
                let producers: Vec<NodeId> = self
                    .nodes
                    .iter()
                    .enumerate()
                    .filter(|(id, p)| *id != consumer && p.produces(field) && !p.consumes(field))
                    .map(|(id, _)| id)
                    .collect();
                match producers.as_slice() {
                    [producer] => edges.push(Edge {
                        producer: *producer,
                        consumer,
                        field: field.to_string(),
                    }),
                    [] => {}
                    many => debug!(
                        "{}: field '{}' has {} candidate producers, leaving it unbound",
                        template.identity(),
                        field,
                        many.len()
                    ),
                }
            }
        }
        self.edges = edges;
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &FuzzTemplate {
        &self.nodes[id]
    }

    pub fn nodes(&self) -> &[FuzzTemplate] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Edges feeding `consumer`
    pub fn incoming(&self, consumer: NodeId) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |e| e.consumer == consumer)
    }

    /// Topological order, ties broken by declaration order.
    ///
    /// On a cycle, the remaining node with the most incoming edges becomes
    /// the root and the rest follow in declaration order.
    pub fn traversal_order(&self) -> Vec<NodeId> {
        let mut in_degree = vec![0usize; self.nodes.len()];
        for edge in &self.edges {
            in_degree[edge.consumer] += 1;
        }

        let mut ready: BTreeSet<NodeId> = (0..self.nodes.len())
            .filter(|id| in_degree[*id] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut visited = vec![false; self.nodes.len()];

        while let Some(id) = ready.pop_first() {
            order.push(id);
            visited[id] = true;
            for edge in self.edges.iter().filter(|e| e.producer == id) {
                in_degree[edge.consumer] -= 1;
                if in_degree[edge.consumer] == 0 {
                    ready.insert(edge.consumer);
                }
            }
        }

        if order.len() < self.nodes.len() {
            let remaining: Vec<NodeId> = (0..self.nodes.len()).filter(|id| !visited[*id]).collect();
            let root = remaining
                .iter()
                .copied()
                .max_by(|a, b| {
                    let count = |id: NodeId| self.incoming(id).count();
                    // Prefer the earlier node on ties
                    count(*a).cmp(&count(*b)).then(b.cmp(a))
                })
                .unwrap_or(remaining[0]);
            warn!(
                "Dependency cycle among {} templates; starting from {}",
                remaining.len(),
                self.nodes[root].identity()
            );
            order.push(root);
            order.extend(remaining.into_iter().filter(|id| *id != root));
        }

        order
    }
}

/// Pull a live value for `field` out of a producer response body: a
/// top-level key of an object, or of the first element of an array
pub fn extract_live_value(body: &Value, field: &str) -> Option<Value> {
    match body {
        Value::Object(map) => map.get(field).cloned(),
        Value::Array(items) => items
            .first()
            .and_then(|first| first.as_object())
            .and_then(|map| map.get(field))
            .cloned(),
        _ => None,
    }
}

/// Position of every node in a traversal order
pub fn positions(order: &[NodeId]) -> HashMap<NodeId, usize> {
    order.iter().enumerate().map(|(pos, id)| (*id, pos)).collect()
}
