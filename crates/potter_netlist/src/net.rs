//! Nets and their per-node user accounting.
//!
//! A net's `users` map counts how many of its connections currently route
//! through each node; a node's global occupancy counts distinct nets. The
//! pending decrement/increment maps stage user changes made inside a
//! stable-first batch until the apply phase replays them at the barrier.
//!
//! All mutation of a net happens on the single thread that owns it in the
//! current schedule.

use crate::ids::{ConnId, NetId};
use potter_common::BBox;
use potter_device::{NodeId, RouteGraph};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A signal net: one source, any number of sinks, and the accounting of the
/// routing resources its connections currently claim.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Net {
    id: NetId,
    /// Identifier of the net in the original (unprojected) netlist.
    ori_id: u32,

    indirect_source: Option<NodeId>,
    indirect_sinks: Vec<NodeId>,
    indirect_source_pin: Option<NodeId>,
    indirect_sink_pins: Vec<NodeId>,
    direct_source_pin: Option<NodeId>,
    direct_sink_pins: Vec<NodeId>,

    indirect_conns: Vec<ConnId>,
    direct_conns: Vec<ConnId>,

    x_center: f64,
    y_center: f64,
    bbox: BBox,
    double_hpwl: i32,
    labeled: bool,

    #[serde(skip)]
    users: HashMap<NodeId, u32>,
    #[serde(skip)]
    pending_dec: HashMap<NodeId, u32>,
    #[serde(skip)]
    pending_inc: HashMap<NodeId, u32>,
}

impl Net {
    /// Creates an empty net.
    pub fn new(id: NetId, ori_id: u32) -> Self {
        Self {
            id,
            ori_id,
            indirect_source: None,
            indirect_sinks: Vec::new(),
            indirect_source_pin: None,
            indirect_sink_pins: Vec::new(),
            direct_source_pin: None,
            direct_sink_pins: Vec::new(),
            indirect_conns: Vec::new(),
            direct_conns: Vec::new(),
            x_center: 0.0,
            y_center: 0.0,
            bbox: BBox::empty(),
            double_hpwl: 0,
            labeled: false,
            users: HashMap::new(),
            pending_dec: HashMap::new(),
            pending_inc: HashMap::new(),
        }
    }

    /// The net's ID.
    pub fn id(&self) -> NetId {
        self.id
    }

    /// Identifier of the net in the original netlist.
    pub fn ori_id(&self) -> u32 {
        self.ori_id
    }

    /// The source node inside an INT tile, if the net has indirect sinks.
    pub fn indirect_source(&self) -> Option<NodeId> {
        self.indirect_source
    }

    /// Sets the INT-projected source node; two different sources are a
    /// topology violation.
    pub fn set_indirect_source(&mut self, node: NodeId) {
        match self.indirect_source {
            None => self.indirect_source = Some(node),
            Some(existing) => assert_eq!(
                existing, node,
                "net {} has conflicting sources {existing} and {node}",
                self.id
            ),
        }
    }

    /// INT-projected sink nodes.
    pub fn indirect_sinks(&self) -> &[NodeId] {
        &self.indirect_sinks
    }

    /// Adds an INT-projected sink node.
    pub fn add_indirect_sink(&mut self, node: NodeId) {
        self.indirect_sinks.push(node);
    }

    /// The real source pin node.
    pub fn indirect_source_pin(&self) -> Option<NodeId> {
        self.indirect_source_pin
    }

    /// Sets the real source pin node; conflicting pins are a topology
    /// violation.
    pub fn set_indirect_source_pin(&mut self, node: NodeId) {
        match self.indirect_source_pin {
            None => self.indirect_source_pin = Some(node),
            Some(existing) => assert_eq!(
                existing, node,
                "net {} has conflicting source pins {existing} and {node}",
                self.id
            ),
        }
    }

    /// Real sink pin nodes.
    pub fn indirect_sink_pins(&self) -> &[NodeId] {
        &self.indirect_sink_pins
    }

    /// Adds a real sink pin node.
    pub fn add_indirect_sink_pin(&mut self, node: NodeId) {
        self.indirect_sink_pins.push(node);
    }

    /// Source pin of the net's direct connections, if any.
    pub fn direct_source_pin(&self) -> Option<NodeId> {
        self.direct_source_pin
    }

    /// Sets the direct source pin.
    pub fn set_direct_source_pin(&mut self, node: NodeId) {
        match self.direct_source_pin {
            None => self.direct_source_pin = Some(node),
            Some(existing) => assert_eq!(
                existing, node,
                "net {} has conflicting direct source pins {existing} and {node}",
                self.id
            ),
        }
    }

    /// Sink pins of the net's direct connections.
    pub fn direct_sink_pins(&self) -> &[NodeId] {
        &self.direct_sink_pins
    }

    /// Adds a direct sink pin.
    pub fn add_direct_sink_pin(&mut self, node: NodeId) {
        self.direct_sink_pins.push(node);
    }

    /// IDs of the net's indirect connections.
    pub fn connections(&self) -> &[ConnId] {
        &self.indirect_conns
    }

    /// IDs of the net's direct connections.
    pub fn direct_connections(&self) -> &[ConnId] {
        &self.direct_conns
    }

    /// Registers an indirect connection.
    pub fn add_connection(&mut self, conn: ConnId) {
        self.indirect_conns.push(conn);
    }

    /// Registers a direct connection.
    pub fn add_direct_connection(&mut self, conn: ConnId) {
        self.direct_conns.push(conn);
    }

    /// Number of indirect connections (the net's fanout for scheduling).
    pub fn fanout(&self) -> usize {
        self.indirect_conns.len()
    }

    /// The net's geometric center.
    pub fn center(&self) -> (f64, f64) {
        (self.x_center, self.y_center)
    }

    /// Sets the geometric center.
    pub fn set_center(&mut self, x: f64, y: f64) {
        self.x_center = x;
        self.y_center = y;
    }

    /// The net's bounding box.
    pub fn bbox(&self) -> BBox {
        self.bbox
    }

    /// Replaces the bounding box.
    pub fn set_bbox(&mut self, bbox: BBox) {
        self.bbox = bbox;
    }

    /// Grows the bounding box to cover a point.
    pub fn update_bbox(&mut self, x: i32, y: i32) {
        self.bbox.update(x, y);
    }

    /// Area of the bounding box, exclusive extents.
    pub fn area(&self) -> i64 {
        (self.bbox.x_max - self.bbox.x_min) as i64 * (self.bbox.y_max - self.bbox.y_min) as i64
    }

    /// Twice the net's half-perimeter wirelength.
    pub fn double_hpwl(&self) -> i32 {
        self.double_hpwl
    }

    /// Sets the doubled half-perimeter wirelength.
    pub fn set_double_hpwl(&mut self, v: i32) {
        self.double_hpwl = v;
    }

    /// Whether the net was selected as a high-fanout, large-area net.
    pub fn is_labeled(&self) -> bool {
        self.labeled
    }

    /// Marks the net as labeled.
    pub fn set_labeled(&mut self, labeled: bool) {
        self.labeled = labeled;
    }

    // ---- committed user accounting ----

    /// Number of this net's connections currently routed through `node`.
    pub fn count_users(&self, node: NodeId) -> u32 {
        self.users.get(&node).copied().unwrap_or(0)
    }

    /// Adds one connection of this net on `node`.
    ///
    /// Returns `true` when the node becomes newly used by this net, in which
    /// case the caller must bump the node's global occupancy.
    pub fn increment_user(&mut self, node: NodeId) -> bool {
        let count = self.users.entry(node).or_insert(0);
        *count += 1;
        *count == 1
    }

    /// Removes one connection of this net from `node`.
    ///
    /// Returns `true` when the node is released entirely, in which case the
    /// caller must drop the node's global occupancy.
    pub fn decrement_user(&mut self, node: NodeId) -> bool {
        let count = self
            .users
            .get_mut(&node)
            .unwrap_or_else(|| panic!("net {} releases node {node} it never used", self.id));
        *count -= 1;
        if *count == 0 {
            self.users.remove(&node);
            true
        } else {
            false
        }
    }

    /// Nodes currently used by this net, with connection counts.
    pub fn users(&self) -> &HashMap<NodeId, u32> {
        &self.users
    }

    // ---- pending deltas (stable-first synchronization) ----

    /// Stages a user decrement to be applied at the batch barrier.
    pub fn pre_decrement_user(&mut self, node: NodeId) {
        let committed = self.count_users(node);
        let pending = self.pending_dec.entry(node).or_insert(0);
        *pending += 1;
        assert!(
            *pending <= committed,
            "net {} stages more decrements on {node} than committed users",
            self.id
        );
    }

    /// Stages a user increment to be applied at the batch barrier.
    pub fn pre_increment_user(&mut self, node: NodeId) {
        *self.pending_inc.entry(node).or_insert(0) += 1;
    }

    /// Staged decrements on `node`.
    pub fn pending_decrements(&self, node: NodeId) -> u32 {
        self.pending_dec.get(&node).copied().unwrap_or(0)
    }

    /// Staged increments on `node`.
    pub fn pending_increments(&self, node: NodeId) -> u32 {
        self.pending_inc.get(&node).copied().unwrap_or(0)
    }

    /// Replays staged increments against the committed user map.
    ///
    /// Nodes that become newly used get their occupancy bumped and are
    /// stamped for the refresh phase.
    pub fn apply_pending_increments(&mut self, batch_stamp: i32, graph: &RouteGraph) {
        let staged: Vec<(NodeId, u32)> = self.pending_inc.drain().collect();
        for (node, count) in staged {
            let mut newly_added = false;
            for _ in 0..count {
                newly_added |= self.increment_user(node);
            }
            if newly_added {
                let rnode = graph.node(node);
                rnode.increment_occupancy();
                rnode.set_need_update_stamp(batch_stamp);
            }
        }
    }

    /// Replays staged decrements against the committed user map.
    ///
    /// Nodes released entirely get their occupancy dropped and are stamped
    /// for the refresh phase.
    pub fn apply_pending_decrements(&mut self, batch_stamp: i32, graph: &RouteGraph) {
        let staged: Vec<(NodeId, u32)> = self.pending_dec.drain().collect();
        for (node, count) in staged {
            let committed = self.count_users(node);
            assert!(
                count <= committed,
                "net {} applies {count} decrements on {node} with {committed} users",
                self.id
            );
            let mut released = false;
            for _ in 0..count {
                released |= self.decrement_user(node);
            }
            if released {
                let rnode = graph.node(node);
                rnode.decrement_occupancy();
                rnode.set_need_update_stamp(batch_stamp);
            }
        }
    }

    /// Drops all staged deltas without applying them.
    pub fn clear_pending(&mut self) {
        self.pending_dec.clear();
        self.pending_inc.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use potter_device::{DeviceNodeRecord, DeviceSource, NodeType};

    fn tiny_graph(n: usize) -> RouteGraph {
        let nodes = (0..n)
            .map(|i| DeviceNodeRecord {
                begin_x: i as i16,
                begin_y: 0,
                end_x: i as i16,
                end_y: 0,
                length: 1,
                base_cost: 0.4,
                node_type: NodeType::Wire,
                is_pin_bounce: false,
                is_accessible_wire: false,
                in_allowed_tile: true,
                children: if i + 1 < n { vec![i as u32 + 1] } else { vec![] },
            })
            .collect();
        let source = DeviceSource {
            extent: BBox::new(0, 0, 16, 16),
            nodes,
        };
        let pins: Vec<NodeId> = (0..n as u32).map(NodeId::from_raw).collect();
        RouteGraph::build_simple(source, &pins)
    }

    #[test]
    fn user_count_tracks_increments() {
        let mut net = Net::new(NetId::from_raw(0), 0);
        let n = NodeId::from_raw(1);
        assert_eq!(net.count_users(n), 0);
        assert!(net.increment_user(n));
        assert!(!net.increment_user(n));
        assert_eq!(net.count_users(n), 2);
        assert!(!net.decrement_user(n));
        assert!(net.decrement_user(n));
        assert_eq!(net.count_users(n), 0);
        assert!(!net.users().contains_key(&n));
    }

    #[test]
    #[should_panic(expected = "never used")]
    fn releasing_unused_node_panics() {
        let mut net = Net::new(NetId::from_raw(0), 0);
        net.decrement_user(NodeId::from_raw(5));
    }

    #[test]
    fn pending_increments_flip_occupancy_once() {
        let graph = tiny_graph(3);
        let mut net = Net::new(NetId::from_raw(0), 0);
        let n = NodeId::from_raw(1);
        net.pre_increment_user(n);
        net.pre_increment_user(n);
        assert_eq!(net.pending_increments(n), 2);
        assert_eq!(graph.node(n).occupancy(), 0);

        net.apply_pending_increments(7, &graph);
        assert_eq!(net.count_users(n), 2);
        assert_eq!(graph.node(n).occupancy(), 1);
        assert_eq!(graph.node(n).need_update_stamp(), 7);
        assert_eq!(net.pending_increments(n), 0);
    }

    #[test]
    fn pending_decrements_release_at_zero() {
        let graph = tiny_graph(3);
        let mut net = Net::new(NetId::from_raw(0), 0);
        let n = NodeId::from_raw(2);
        net.increment_user(n);
        graph.node(n).increment_occupancy();

        net.pre_decrement_user(n);
        net.apply_pending_decrements(9, &graph);
        assert_eq!(net.count_users(n), 0);
        assert_eq!(graph.node(n).occupancy(), 0);
        assert_eq!(graph.node(n).need_update_stamp(), 9);
    }

    #[test]
    #[should_panic(expected = "stages more decrements")]
    fn overstaging_decrements_panics() {
        let mut net = Net::new(NetId::from_raw(0), 0);
        net.pre_decrement_user(NodeId::from_raw(0));
    }

    #[test]
    fn clear_pending_discards_stages() {
        let mut net = Net::new(NetId::from_raw(0), 0);
        let n = NodeId::from_raw(0);
        net.increment_user(n);
        net.pre_decrement_user(n);
        net.pre_increment_user(n);
        net.clear_pending();
        assert_eq!(net.pending_decrements(n), 0);
        assert_eq!(net.pending_increments(n), 0);
    }

    #[test]
    #[should_panic(expected = "conflicting sources")]
    fn conflicting_source_is_fatal() {
        let mut net = Net::new(NetId::from_raw(3), 3);
        net.set_indirect_source(NodeId::from_raw(1));
        net.set_indirect_source(NodeId::from_raw(2));
    }

    #[test]
    fn serde_skips_runtime_maps() {
        let mut net = Net::new(NetId::from_raw(1), 10);
        net.increment_user(NodeId::from_raw(4));
        let json = serde_json::to_string(&net).unwrap();
        let restored: Net = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.id(), net.id());
        assert_eq!(restored.count_users(NodeId::from_raw(4)), 0);
    }
}
