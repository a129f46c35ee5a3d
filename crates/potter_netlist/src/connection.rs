//! Single source-to-sink routing requests.
//!
//! Indirect connections carry the INT-projected source and sink plus the
//! opaque pin-projection paths on either side (source pin to INT node, INT
//! node to sink pin); direct connections carry the real pins. The routed
//! path is stored sink first, source last, exactly as the A* back-walk
//! produces it.

use crate::ids::{ConnId, NetId};
use potter_common::BBox;
use potter_device::{NodeId, RouteGraph};
use serde::{Deserialize, Serialize};

/// One source-to-sink routing request of a net.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Connection {
    id: ConnId,
    net: NetId,
    source: NodeId,
    sink: NodeId,

    /// Pin projection from the real source pin to `source`; opaque to the
    /// router, replayed by the result writer. Empty for direct connections.
    source_to_int: Vec<NodeId>,
    /// Pin projection from `sink` to the real sink pin; opaque to the
    /// router. Empty for direct connections.
    int_to_sink: Vec<NodeId>,

    bbox: BBox,
    hpwl: i32,

    #[serde(skip)]
    routed: bool,
    #[serde(skip)]
    routed_this_iter: bool,
    #[serde(skip)]
    last_routed_iter: u32,
    #[serde(skip)]
    nodes_explored: u32,
    /// Routed path, sink first, source last.
    #[serde(skip)]
    path: Vec<NodeId>,
}

impl Connection {
    /// Creates an unrouted connection.
    pub fn new(id: ConnId, net: NetId, source: NodeId, sink: NodeId, bbox: BBox) -> Self {
        Self {
            id,
            net,
            source,
            sink,
            source_to_int: Vec::new(),
            int_to_sink: Vec::new(),
            bbox,
            hpwl: bbox.hpwl(),
            routed: false,
            routed_this_iter: false,
            last_routed_iter: 0,
            nodes_explored: 0,
            path: Vec::new(),
        }
    }

    /// The connection's ID.
    pub fn id(&self) -> ConnId {
        self.id
    }

    /// The containing net.
    pub fn net(&self) -> NetId {
        self.net
    }

    /// Source node the search starts from.
    pub fn source(&self) -> NodeId {
        self.source
    }

    /// Sink node the search targets.
    pub fn sink(&self) -> NodeId {
        self.sink
    }

    /// Pin projection from the real source pin down to the INT source.
    pub fn source_to_int(&self) -> &[NodeId] {
        &self.source_to_int
    }

    /// Sets the source-side pin projection.
    pub fn set_source_to_int(&mut self, path: Vec<NodeId>) {
        self.source_to_int = path;
    }

    /// Pin projection from the INT sink up to the real sink pin.
    pub fn int_to_sink(&self) -> &[NodeId] {
        &self.int_to_sink
    }

    /// Sets the sink-side pin projection.
    pub fn set_int_to_sink(&mut self, path: Vec<NodeId>) {
        self.int_to_sink = path;
    }

    /// The connection's current bounding box.
    pub fn bbox(&self) -> BBox {
        self.bbox
    }

    /// Replaces the bounding box and refreshes the HPWL.
    pub fn set_bbox(&mut self, bbox: BBox) {
        self.bbox = bbox;
        self.hpwl = bbox.hpwl();
    }

    /// Half-perimeter wirelength of the bounding box.
    pub fn hpwl(&self) -> i32 {
        self.hpwl
    }

    /// Whether the connection currently has a committed route.
    pub fn is_routed(&self) -> bool {
        self.routed
    }

    /// Sets the routed flag.
    pub fn set_routed(&mut self, routed: bool) {
        self.routed = routed;
    }

    /// Whether the connection was (re-)routed in the current iteration.
    pub fn routed_this_iter(&self) -> bool {
        self.routed_this_iter
    }

    /// Sets the per-iteration routed flag.
    pub fn set_routed_this_iter(&mut self, routed: bool) {
        self.routed_this_iter = routed;
    }

    /// The iteration that last produced this connection's route.
    pub fn last_routed_iter(&self) -> u32 {
        self.last_routed_iter
    }

    /// Records the iteration that produced the current route.
    pub fn set_last_routed_iter(&mut self, iter: u32) {
        self.last_routed_iter = iter;
    }

    /// Nodes popped by the search that produced the current route.
    pub fn nodes_explored(&self) -> u32 {
        self.nodes_explored
    }

    /// Records the search effort for the current route.
    pub fn set_nodes_explored(&mut self, n: u32) {
        self.nodes_explored = n;
    }

    /// The routed path, sink first, source last.
    pub fn path(&self) -> &[NodeId] {
        &self.path
    }

    /// Appends a node to the path during the save back-walk.
    pub fn push_path_node(&mut self, node: NodeId) {
        self.path.push(node);
    }

    /// Discards the routed path.
    pub fn reset_route(&mut self) {
        self.path.clear();
    }

    /// Whether any node on the path is over-used.
    pub fn is_congested(&self, graph: &RouteGraph) -> bool {
        self.path.iter().any(|&n| graph.node(n).is_over_used())
    }
}

impl std::fmt::Display for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "connection {} (net {}) {} -> {} bbox {}",
            self.id, self.net, self.source, self.sink, self.bbox
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> Connection {
        Connection::new(
            ConnId::from_raw(0),
            NetId::from_raw(0),
            NodeId::from_raw(0),
            NodeId::from_raw(3),
            BBox::new(0, 0, 4, 4),
        )
    }

    #[test]
    fn hpwl_follows_bbox() {
        let mut c = conn();
        assert_eq!(c.hpwl(), 8);
        c.set_bbox(BBox::new(0, 0, 10, 2));
        assert_eq!(c.hpwl(), 12);
    }

    #[test]
    fn path_accumulates_and_resets() {
        let mut c = conn();
        c.push_path_node(NodeId::from_raw(3));
        c.push_path_node(NodeId::from_raw(1));
        c.push_path_node(NodeId::from_raw(0));
        assert_eq!(c.path().len(), 3);
        assert_eq!(c.path()[0], c.sink());
        assert_eq!(*c.path().last().unwrap(), c.source());
        c.reset_route();
        assert!(c.path().is_empty());
    }

    #[test]
    fn serde_skips_route_state() {
        let mut c = conn();
        c.set_routed(true);
        c.push_path_node(NodeId::from_raw(3));
        let json = serde_json::to_string(&c).unwrap();
        let restored: Connection = serde_json::from_str(&json).unwrap();
        assert!(!restored.is_routed());
        assert!(restored.path().is_empty());
        assert_eq!(restored.sink(), c.sink());
    }
}
