//! Canary node selection
//!
//! Picks the nodes that run canary pods. Previously selected nodes are kept while
//! they still fit; the list is topped up from the remaining fitting nodes, spread
//! evenly across the values of the configured anti-affinity label keys.

use crate::controller::scheduler::{label_selector_matches, node_fits};
use k8s_openapi::api::core::v1::{Node, Pod};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NodeSelectionError {
    #[error("not enough eligible nodes for canary: wanted {wanted}, found {found}")]
    InsufficientNodes { wanted: usize, found: usize },
}

/// Inputs of a canary node selection
pub struct CanaryNodeRequest<'a> {
    /// Every node of the cluster
    pub nodes: &'a [Node],
    /// Optional restriction of candidate nodes
    pub node_selector: Option<&'a LabelSelector>,
    /// Synthetic pod built from the canary template
    pub pod: &'a Pod,
    /// Nodes selected by a previous pass
    pub previous: &'a [String],
    /// Desired number of canary nodes
    pub replicas: usize,
    /// Label keys to spread the selection across
    pub anti_affinity_keys: &'a [String],
}

/// Label values of a node for the anti-affinity keys, in key order
type LabelCombination = Vec<Option<String>>;

fn combination(node: &Node, keys: &[String]) -> LabelCombination {
    let node_labels = node.metadata.labels.as_ref();
    keys.iter()
        .map(|k| node_labels.and_then(|l| l.get(k)).cloned())
        .collect()
}

/// Nodes passing the node selector and the fitness check, sorted by name
pub fn eligible_nodes<'a>(
    nodes: &'a [Node],
    node_selector: Option<&LabelSelector>,
    pod: &Pod,
) -> Vec<&'a Node> {
    let empty = BTreeMap::new();
    let mut eligible: Vec<&Node> = nodes
        .iter()
        .filter(|n| n.metadata.name.is_some())
        .filter(|n| {
            node_selector
                .map(|sel| {
                    label_selector_matches(sel, n.metadata.labels.as_ref().unwrap_or(&empty))
                })
                .unwrap_or(true)
        })
        .filter(|n| node_fits(pod, n))
        .collect();
    eligible.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
    eligible
}

/// Select `replicas` canary nodes
///
/// Keeps still-fitting previous nodes, then adds new nodes. With anti-affinity keys, a
/// node is skipped when its label combination already holds
/// `ceil(replicas / distinct_combinations)` selected nodes.
///
/// # Errors
/// `InsufficientNodes` when fewer than `replicas` nodes can be selected. The caller keeps
/// its previous selection in that case.
pub fn select_canary_nodes(req: &CanaryNodeRequest<'_>) -> Result<Vec<String>, NodeSelectionError> {
    let candidates = eligible_nodes(req.nodes, req.node_selector, req.pod);
    let by_name: HashMap<&str, &Node> = candidates
        .iter()
        .filter_map(|n| n.metadata.name.as_deref().map(|name| (name, *n)))
        .collect();

    let mut selected: Vec<String> = Vec::with_capacity(req.replicas);
    for name in req.previous {
        if selected.len() >= req.replicas {
            break;
        }
        if by_name.contains_key(name.as_str()) && !selected.contains(name) {
            selected.push(name.clone());
        } else {
            debug!(node = %name, "Dropping canary node that no longer fits");
        }
    }

    if selected.len() >= req.replicas {
        return Ok(selected);
    }

    let keys = req.anti_affinity_keys;
    let distinct: BTreeSet<LabelCombination> =
        candidates.iter().map(|n| combination(n, keys)).collect();
    let quota = if keys.is_empty() || distinct.is_empty() {
        usize::MAX
    } else {
        req.replicas.div_ceil(distinct.len())
    };

    let mut per_combination: HashMap<LabelCombination, usize> = HashMap::new();
    if !keys.is_empty() {
        for name in &selected {
            if let Some(node) = by_name.get(name.as_str()) {
                *per_combination.entry(combination(node, keys)).or_default() += 1;
            }
        }
    }

    for node in &candidates {
        if selected.len() >= req.replicas {
            break;
        }
        let Some(name) = node.metadata.name.as_ref() else {
            continue;
        };
        if selected.contains(name) {
            continue;
        }
        if !keys.is_empty() {
            let count = per_combination.entry(combination(node, keys)).or_default();
            if *count + 1 > quota {
                continue;
            }
            *count += 1;
        }
        selected.push(name.clone());
    }

    if selected.len() < req.replicas {
        return Err(NodeSelectionError::InsufficientNodes {
            wanted: req.replicas,
            found: selected.len(),
        });
    }

    Ok(selected)
}

#[cfg(test)]
#[path = "canary_nodes_test.rs"]
mod tests;
