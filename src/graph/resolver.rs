//! Evaluation order of the controllable graph.
//!
//! Every node must mix after everything that forwards into it. The order is
//! recomputed after each structural edit; a cycle fails the edit.

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::{EngineError, Result};
use crate::graph::controllable::Controllable;
use crate::graph::Graph;
use crate::models::ids::ControllableId;

pub fn evaluation_order(graph: &Graph) -> Result<Vec<ControllableId>> {
    order_of(graph.registry())
}

pub(crate) fn order_of(
    controllables: &BTreeMap<ControllableId, Controllable>,
) -> Result<Vec<ControllableId>> {
    let mut dependency_graph: DiGraph<ControllableId, ()> = DiGraph::new();
    let mut node_indices: HashMap<ControllableId, NodeIndex> = HashMap::new();

    for id in controllables.keys() {
        node_indices.insert(*id, dependency_graph.add_node(*id));
    }

    for (id, controllable) in controllables {
        let from = node_indices[id];
        for output in controllable.outputs() {
            // Dangling targets are removed with their node; nothing to order.
            if let Some(&to) = node_indices.get(&output.target) {
                dependency_graph.add_edge(from, to, ());
            }
        }
    }

    let sorted = toposort(&dependency_graph, None).map_err(|cycle| {
        let id = dependency_graph[cycle.node_id()];
        EngineError::Cycle {
            name: controllables
                .get(&id)
                .map(|c| c.name().to_string())
                .unwrap_or_else(|| id.to_string()),
        }
    })?;

    Ok(sorted.into_iter().map(|idx| dependency_graph[idx]).collect())
}

/// True when every node comes before all nodes reachable from its outputs.
pub fn is_valid_order(
    order: &[ControllableId],
    controllables: &BTreeMap<ControllableId, Controllable>,
) -> bool {
    let position: HashMap<ControllableId, usize> =
        order.iter().enumerate().map(|(i, id)| (*id, i)).collect();
    if position.len() != controllables.len() {
        return false;
    }

    for id in order {
        let Some(&start) = position.get(id) else {
            return false;
        };
        let mut seen = HashSet::new();
        let mut stack = vec![*id];
        while let Some(current) = stack.pop() {
            let Some(node) = controllables.get(&current) else {
                continue;
            };
            for output in node.outputs() {
                if !seen.insert(output.target) {
                    continue;
                }
                match position.get(&output.target) {
                    Some(&p) if p > start => stack.push(output.target),
                    Some(_) => return false,
                    None => {}
                }
            }
        }
    }
    true
}
