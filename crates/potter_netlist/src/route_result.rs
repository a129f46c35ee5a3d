//! Per-node routing results.
//!
//! After convergence, the router aggregates every connection path into one
//! record per routing node: which net claims the node and which nodes the
//! signal branches to from there. The netlist writer consumes these records.

use crate::ids::NetId;
use potter_device::NodeId;
use serde::{Deserialize, Serialize};

/// The routing outcome for a single node.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NodeRouteResult {
    /// The net claiming this node, if any.
    pub net: Option<NetId>,
    /// Downstream nodes of the claiming net's signal tree.
    pub branches: Vec<NodeId>,
}

impl NodeRouteResult {
    /// Adds a branch edge unless it is already present.
    pub fn add_branch(&mut self, node: NodeId) {
        if !self.branches.contains(&node) {
            self.branches.push(node);
        }
    }

    /// Whether this node carries routed signal.
    pub fn is_used(&self) -> bool {
        self.net.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branches_deduplicate() {
        let mut r = NodeRouteResult::default();
        r.add_branch(NodeId::from_raw(3));
        r.add_branch(NodeId::from_raw(3));
        r.add_branch(NodeId::from_raw(4));
        assert_eq!(r.branches.len(), 2);
    }

    #[test]
    fn unused_by_default() {
        let r = NodeRouteResult::default();
        assert!(!r.is_used());
        assert!(r.branches.is_empty());
    }
}
