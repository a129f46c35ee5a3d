//! Routing-resource graph construction.
//!
//! The graph admits only nodes inside INT or LAG_LAG tiles (plus the
//! connection endpoint pins, which may sit just outside). Construction marks
//! the allowed nodes, iteratively prunes dead ends that cannot lead anywhere,
//! and then fixes each surviving node's child list. Child lists never change
//! after [`RouteGraph::build`] returns; all later mutation goes through the
//! nodes' atomic congestion state.

use crate::ids::NodeId;
use crate::node::{NodeType, RouteNode};
use crate::source::DeviceSource;
use log::{debug, info};
use potter_common::BBox;
use rayon::prelude::*;

/// The routing-resource graph: a flat node array plus the raw device
/// adjacency retained for direct-connection search.
#[derive(Debug)]
pub struct RouteGraph {
    nodes: Vec<RouteNode>,
    raw_children: Vec<Vec<NodeId>>,
    extent: BBox,
}

impl RouteGraph {
    /// Builds the graph from a projected device description.
    ///
    /// `preserved` marks nodes claimed by clock or static routing; they are
    /// never offered as children. `pin_nodes` marks connection endpoints,
    /// which survive pruning even with no outgoing edges.
    pub fn build(source: DeviceSource, preserved: &[bool], pin_nodes: &[bool]) -> RouteGraph {
        let num_nodes = source.node_count();
        assert_eq!(preserved.len(), num_nodes);
        assert_eq!(pin_nodes.len(), num_nodes);

        let in_allowed: Vec<bool> = source.nodes.iter().map(|n| n.in_allowed_tile).collect();
        let raw_children: Vec<Vec<NodeId>> = source
            .nodes
            .iter()
            .map(|n| n.children.iter().map(|&c| NodeId::from_raw(c)).collect())
            .collect();

        // A node participates in the graph when it shares an allowed-tile
        // edge with a neighbor, or is a connection endpoint pin.
        let mut in_graph = vec![false; num_nodes];
        for i in 0..num_nodes {
            if !in_allowed[i] {
                continue;
            }
            for child in &raw_children[i] {
                if in_allowed[child.index()] {
                    in_graph[i] = true;
                    in_graph[child.index()] = true;
                }
            }
        }
        for i in 0..num_nodes {
            if pin_nodes[i] {
                in_graph[i] = true;
            }
        }

        let mut parents: Vec<Vec<NodeId>> = vec![Vec::new(); num_nodes];
        for i in 0..num_nodes {
            if !in_graph[i] {
                continue;
            }
            for child in &raw_children[i] {
                let c = child.index();
                if in_graph[c] && in_allowed[c] && !preserved[c] {
                    parents[c].push(NodeId::from_raw(i as u32));
                }
            }
        }

        let child_counts = |i: usize, in_graph: &[bool]| -> i32 {
            raw_children[i]
                .iter()
                .filter(|c| {
                    let c = c.index();
                    in_allowed[c] && !preserved[c] && in_graph[c]
                })
                .count() as i32
        };

        let mut out_degrees: Vec<i32> = (0..num_nodes)
            .into_par_iter()
            .map(|i| if in_graph[i] { child_counts(i, &in_graph) } else { 0 })
            .collect();

        // Iterative dead-end pruning. Pin nodes stay even with no children.
        let mut frontier: Vec<usize> = Vec::new();
        let mut pin_dead_ends = 0usize;
        for i in 0..num_nodes {
            if in_graph[i] && out_degrees[i] == 0 {
                if pin_nodes[i] {
                    pin_dead_ends += 1;
                } else {
                    frontier.push(i);
                }
            }
        }
        debug!("dead-end pins kept: {pin_dead_ends}");
        while !frontier.is_empty() {
            debug!("pruning {} dead-end nodes", frontier.len());
            let mut next = Vec::new();
            for &i in &frontier {
                in_graph[i] = false;
                for p in &parents[i] {
                    let p = p.index();
                    out_degrees[p] -= 1;
                    if out_degrees[p] == 0 && !pin_nodes[p] {
                        next.push(p);
                    }
                }
            }
            frontier = next;
        }

        let children: Vec<Vec<NodeId>> = (0..num_nodes)
            .into_par_iter()
            .map(|i| {
                if !in_graph[i] {
                    return Vec::new();
                }
                raw_children[i]
                    .iter()
                    .copied()
                    .filter(|c| {
                        let c = c.index();
                        in_allowed[c] && !preserved[c] && in_graph[c]
                    })
                    .collect()
            })
            .collect();

        let extent = source.extent;
        let mut nodes: Vec<RouteNode> = source
            .nodes
            .into_iter()
            .enumerate()
            .map(|(i, rec)| {
                RouteNode::new(
                    NodeId::from_raw(i as u32),
                    rec.begin_x,
                    rec.begin_y,
                    rec.end_x,
                    rec.end_y,
                    rec.length,
                    rec.base_cost,
                    rec.node_type,
                    rec.is_pin_bounce,
                    rec.is_accessible_wire,
                )
            })
            .collect();
        let mut edge_count = 0usize;
        for (node, child_list) in nodes.iter_mut().zip(children) {
            edge_count += child_list.len();
            node.set_children(child_list);
        }

        let node_count_in_graph = in_graph.iter().filter(|&&g| g).count();
        info!(
            "routing graph: {node_count_in_graph}/{num_nodes} nodes, {edge_count} edges"
        );

        RouteGraph {
            nodes,
            raw_children,
            extent,
        }
    }

    /// The node with the given ID.
    pub fn node(&self, id: NodeId) -> &RouteNode {
        &self.nodes[id.index()]
    }

    /// All nodes, indexed by ID.
    pub fn nodes(&self) -> &[RouteNode] {
        &self.nodes
    }

    /// Number of nodes in the underlying device projection.
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Raw device adjacency of a node, ignoring graph pruning.
    ///
    /// Used by the direct-connection search, which runs outside the INT
    /// fabric.
    pub fn raw_children(&self, id: NodeId) -> &[NodeId] {
        &self.raw_children[id.index()]
    }

    /// Tile-coordinate extent of the device.
    pub fn extent(&self) -> BBox {
        self.extent
    }

    /// Wire-class accessibility of `child` with respect to a connection's
    /// `sink`.
    ///
    /// Wires flagged accessible-only-near-target may only be entered in the
    /// sink's column, within one tile row of it.
    pub fn is_accessible(&self, child: &RouteNode, sink: &RouteNode) -> bool {
        if !child.is_accessible_wire() {
            return true;
        }
        if child.begin_x() != sink.begin_x() {
            return false;
        }
        (child.begin_y() - sink.begin_y()).abs() <= 1
    }

    /// Total number of over-used nodes; convenient for assertions in tests.
    pub fn overused_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_over_used()).count()
    }
}

// Convenience used by unit tests across the workspace.
impl RouteGraph {
    /// Builds a graph where every record is an allowed plain wire and every
    /// endpoint named in `pins` survives pruning.
    pub fn build_simple(source: DeviceSource, pins: &[NodeId]) -> RouteGraph {
        let n = source.node_count();
        let preserved = vec![false; n];
        let mut pin_nodes = vec![false; n];
        for p in pins {
            pin_nodes[p.index()] = true;
        }
        RouteGraph::build(source, &preserved, &pin_nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::DeviceNodeRecord;

    fn rec(x: i16, y: i16, node_type: NodeType, children: Vec<u32>) -> DeviceNodeRecord {
        DeviceNodeRecord {
            begin_x: x,
            begin_y: y,
            end_x: x,
            end_y: y,
            length: 1,
            base_cost: 0.4,
            node_type,
            is_pin_bounce: false,
            is_accessible_wire: false,
            in_allowed_tile: true,
            children,
        }
    }

    /// 0 -> 1 -> 2 (sink pin), 1 -> 3 (dead end), 4 preserved child of 1.
    fn chain_source() -> DeviceSource {
        DeviceSource {
            extent: BBox::new(0, 0, 10, 10),
            nodes: vec![
                rec(0, 0, NodeType::PinfeedO, vec![1]),
                rec(1, 0, NodeType::Wire, vec![2, 3, 4]),
                rec(2, 0, NodeType::PinfeedI, vec![]),
                rec(3, 1, NodeType::Wire, vec![]),
                rec(4, 1, NodeType::Wire, vec![]),
            ],
        }
    }

    #[test]
    fn dead_ends_are_pruned_pins_survive() {
        let source = chain_source();
        let mut preserved = vec![false; 5];
        preserved[4] = true;
        let mut pins = vec![false; 5];
        pins[0] = true;
        pins[2] = true;
        let graph = RouteGraph::build(source, &preserved, &pins);

        // Node 3 is a non-pin dead end: pruned. Node 4 is preserved: never a
        // child. Node 2 is a pin with no children: kept.
        assert_eq!(graph.node(NodeId::from_raw(1)).children(), &[NodeId::from_raw(2)]);
        assert_eq!(graph.node(NodeId::from_raw(2)).children(), &[] as &[NodeId]);
        assert_eq!(graph.node(NodeId::from_raw(0)).children(), &[NodeId::from_raw(1)]);
    }

    #[test]
    fn pruning_cascades_upstream() {
        // 0 -> 1 -> 2 -> 3 where 3 is a dead end: 2 and then 1 lose their
        // only child, but pin 0 stays.
        let source = DeviceSource {
            extent: BBox::new(0, 0, 10, 10),
            nodes: vec![
                rec(0, 0, NodeType::PinfeedO, vec![1]),
                rec(1, 0, NodeType::Wire, vec![2]),
                rec(2, 0, NodeType::Wire, vec![3]),
                rec(3, 0, NodeType::Wire, vec![]),
            ],
        };
        let graph = RouteGraph::build_simple(source, &[NodeId::from_raw(0)]);
        assert_eq!(graph.node(NodeId::from_raw(0)).children(), &[] as &[NodeId]);
        assert_eq!(graph.node(NodeId::from_raw(1)).children(), &[] as &[NodeId]);
    }

    #[test]
    fn raw_children_ignore_pruning() {
        let source = chain_source();
        let mut preserved = vec![false; 5];
        preserved[4] = true;
        let mut pins = vec![false; 5];
        pins[0] = true;
        pins[2] = true;
        let graph = RouteGraph::build(source, &preserved, &pins);
        assert_eq!(
            graph.raw_children(NodeId::from_raw(1)),
            &[NodeId::from_raw(2), NodeId::from_raw(3), NodeId::from_raw(4)]
        );
    }

    #[test]
    fn disallowed_tiles_get_no_edges() {
        let mut source = chain_source();
        source.nodes[1].in_allowed_tile = false;
        let graph = RouteGraph::build_simple(
            source,
            &[NodeId::from_raw(0), NodeId::from_raw(2)],
        );
        assert_eq!(graph.node(NodeId::from_raw(0)).children(), &[] as &[NodeId]);
    }

    #[test]
    fn wire_class_test_requires_sink_column() {
        let mut source = chain_source();
        source.nodes[3].is_accessible_wire = true;
        source.nodes[3].begin_x = 2;
        source.nodes[3].begin_y = 5;
        let graph = RouteGraph::build_simple(
            source,
            &[NodeId::from_raw(0), NodeId::from_raw(2), NodeId::from_raw(3)],
        );
        let sink = graph.node(NodeId::from_raw(2)); // at (2, 0)
        let flagged = graph.node(NodeId::from_raw(3)); // at (2, 5): same column, far row
        assert!(!graph.is_accessible(flagged, sink));
        let plain = graph.node(NodeId::from_raw(1));
        assert!(graph.is_accessible(plain, sink));
    }
}
