//! Routing-resource nodes.
//!
//! A [`RouteNode`] couples the immutable topology of a wire segment (tile
//! coordinates, length, base cost, type, child edges) with the mutable
//! congestion state negotiated across routing iterations (occupancy,
//! present and historical congestion cost). Nodes are never copied after
//! graph construction; they are shared by reference and their mutable fields
//! are atomics updated under the scheduler's phase discipline.

use crate::ids::NodeId;
use potter_common::AtomicF32;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI32, Ordering};

/// Every routing resource accommodates exactly one net.
pub const NODE_CAPACITY: i32 = 1;

/// Classification of a routing-resource node.
///
/// Determines which accessibility rule the connection router applies before
/// expanding into the node.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum NodeType {
    /// An output pin node; reachable only as a connection source.
    PinfeedO,
    /// An input pin node; enterable only as the target sink (or as a sink
    /// pin of a sibling connection when it doubles as a bounce).
    PinfeedI,
    /// A bounce node inside an interconnect tile.
    PinBounce,
    /// A super long line crossing SLRs; never searched by the core.
    SuperLongLine,
    /// A Laguna input; never searched by the core.
    LagunaI,
    /// A regular wire segment.
    Wire,
}

/// A node of the routing-resource graph.
#[derive(Debug)]
pub struct RouteNode {
    id: NodeId,
    begin_x: i16,
    begin_y: i16,
    end_x: i16,
    end_y: i16,
    length: i16,
    base_cost: f32,
    node_type: NodeType,
    is_pin_bounce: bool,
    is_accessible_wire: bool,
    children: Vec<NodeId>,

    occupancy: AtomicI32,
    present_cost: AtomicF32,
    historical_cost: AtomicF32,
    need_update_stamp: AtomicI32,
}

impl RouteNode {
    /// Creates a node with empty congestion state.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: NodeId,
        begin_x: i16,
        begin_y: i16,
        end_x: i16,
        end_y: i16,
        length: i16,
        base_cost: f32,
        node_type: NodeType,
        is_pin_bounce: bool,
        is_accessible_wire: bool,
    ) -> Self {
        Self {
            id,
            begin_x,
            begin_y,
            end_x,
            end_y,
            length,
            base_cost,
            node_type,
            is_pin_bounce,
            is_accessible_wire,
            children: Vec::new(),
            occupancy: AtomicI32::new(0),
            present_cost: AtomicF32::new(1.0),
            historical_cost: AtomicF32::new(1.0),
            need_update_stamp: AtomicI32::new(-1),
        }
    }

    /// The node's ID, identical to its index in the node array.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// X coordinate of the begin tile.
    pub fn begin_x(&self) -> i16 {
        self.begin_x
    }

    /// Y coordinate of the begin tile.
    pub fn begin_y(&self) -> i16 {
        self.begin_y
    }

    /// X coordinate of the end tile.
    pub fn end_x(&self) -> i16 {
        self.end_x
    }

    /// Y coordinate of the end tile.
    pub fn end_y(&self) -> i16 {
        self.end_y
    }

    /// Manhattan span of the underlying wire.
    pub fn length(&self) -> i16 {
        self.length
    }

    /// Intent-derived base cost.
    pub fn base_cost(&self) -> f32 {
        self.base_cost
    }

    /// The node's type classification.
    pub fn node_type(&self) -> NodeType {
        self.node_type
    }

    /// Whether the underlying wire is a pin bounce.
    pub fn is_pin_bounce(&self) -> bool {
        self.is_pin_bounce
    }

    /// Whether the wire class is accessible only near the target column.
    pub fn is_accessible_wire(&self) -> bool {
        self.is_accessible_wire
    }

    /// Outgoing child edges; fixed after graph construction.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub(crate) fn set_children(&mut self, children: Vec<NodeId>) {
        self.children = children;
    }

    /// Number of distinct nets committed on this node.
    pub fn occupancy(&self) -> i32 {
        self.occupancy.load(Ordering::Relaxed)
    }

    /// Whether more nets use the node than its capacity allows.
    pub fn is_over_used(&self) -> bool {
        self.occupancy() > NODE_CAPACITY
    }

    /// Registers a new distinct net on this node.
    pub fn increment_occupancy(&self) {
        self.occupancy.fetch_add(1, Ordering::Relaxed);
    }

    /// Releases a distinct net from this node.
    pub fn decrement_occupancy(&self) {
        self.occupancy.fetch_sub(1, Ordering::Relaxed);
    }

    /// Current present-congestion cost.
    pub fn present_cost(&self) -> f32 {
        self.present_cost.load()
    }

    /// Overwrites the present-congestion cost.
    pub fn set_present_cost(&self, cost: f32) {
        self.present_cost.store(cost);
    }

    /// Recomputes the present-congestion cost from the current occupancy.
    pub fn update_present_cost(&self, present_factor: f32) {
        let occ = self.occupancy();
        if occ < NODE_CAPACITY {
            self.set_present_cost(1.0);
        } else {
            self.set_present_cost(1.0 + (occ - NODE_CAPACITY + 1) as f32 * present_factor);
        }
    }

    /// Current historical-congestion cost; non-decreasing across iterations.
    pub fn historical_cost(&self) -> f32 {
        self.historical_cost.load()
    }

    /// Overwrites the historical-congestion cost.
    pub fn set_historical_cost(&self, cost: f32) {
        self.historical_cost.store(cost);
    }

    /// Marks the node for a present-cost refresh in the given batch.
    pub fn set_need_update_stamp(&self, stamp: i32) {
        self.need_update_stamp.store(stamp, Ordering::Relaxed);
    }

    /// The batch stamp of the last occupancy change.
    pub fn need_update_stamp(&self) -> i32 {
        self.need_update_stamp.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire(id: u32) -> RouteNode {
        RouteNode::new(
            NodeId::from_raw(id),
            0,
            0,
            1,
            0,
            1,
            0.4,
            NodeType::Wire,
            false,
            false,
        )
    }

    #[test]
    fn fresh_node_state() {
        let n = wire(0);
        assert_eq!(n.occupancy(), 0);
        assert!(!n.is_over_used());
        assert_eq!(n.present_cost(), 1.0);
        assert_eq!(n.historical_cost(), 1.0);
        assert_eq!(n.need_update_stamp(), -1);
    }

    #[test]
    fn occupancy_tracks_users() {
        let n = wire(0);
        n.increment_occupancy();
        assert_eq!(n.occupancy(), 1);
        assert!(!n.is_over_used());
        n.increment_occupancy();
        assert!(n.is_over_used());
        n.decrement_occupancy();
        assert!(!n.is_over_used());
    }

    #[test]
    fn present_cost_formula() {
        let n = wire(0);
        n.update_present_cost(0.5);
        assert_eq!(n.present_cost(), 1.0);

        n.increment_occupancy();
        n.update_present_cost(0.5);
        assert_eq!(n.present_cost(), 1.5);

        n.increment_occupancy();
        n.update_present_cost(0.5);
        assert_eq!(n.present_cost(), 2.0);
    }

    #[test]
    fn update_stamp_roundtrip() {
        let n = wire(0);
        n.set_need_update_stamp(17);
        assert_eq!(n.need_update_stamp(), 17);
    }
}
