//! The aggregate physical netlist.

use crate::connection::Connection;
use crate::net::Net;
use serde::{Deserialize, Serialize};

/// Everything the netlist parser projects out of a physical design: the nets,
/// their indirect and direct connections, and the nodes preserved for clock
/// and static routing.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PhysicalNetlist {
    /// All signal nets, indexed by [`NetId`](crate::NetId).
    pub nets: Vec<Net>,
    /// Connections routed through the INT fabric, indexed by
    /// [`ConnId`](crate::ConnId).
    pub indirect_connections: Vec<Connection>,
    /// Connections that stay outside the INT fabric (carry chains and the
    /// like), indexed separately from the indirect list.
    pub direct_connections: Vec<Connection>,
    /// Raw IDs of nodes claimed by preserved (clock / VCC / GND) routing.
    pub preserved_nodes: Vec<u32>,
}

impl PhysicalNetlist {
    /// An empty netlist.
    pub fn new() -> Self {
        Self {
            nets: Vec::new(),
            indirect_connections: Vec::new(),
            direct_connections: Vec::new(),
            preserved_nodes: Vec::new(),
        }
    }

    /// Number of nets.
    pub fn num_nets(&self) -> usize {
        self.nets.len()
    }

    /// Number of indirect connections.
    pub fn num_indirect(&self) -> usize {
        self.indirect_connections.len()
    }

    /// Per-node flags for nodes preserved by clock or static routing.
    pub fn preserved_flags(&self, num_nodes: usize) -> Vec<bool> {
        let mut flags = vec![false; num_nodes];
        for &id in &self.preserved_nodes {
            flags[id as usize] = true;
        }
        flags
    }

    /// Per-node flags for indirect-connection endpoints.
    ///
    /// These nodes must survive graph pruning even when they have no
    /// outgoing edges.
    pub fn pin_flags(&self, num_nodes: usize) -> Vec<bool> {
        let mut flags = vec![false; num_nodes];
        for conn in &self.indirect_connections {
            flags[conn.source().index()] = true;
            flags[conn.sink().index()] = true;
        }
        flags
    }
}

impl Default for PhysicalNetlist {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{ConnId, NetId};
    use potter_common::BBox;
    use potter_device::NodeId;

    #[test]
    fn empty_netlist_counts() {
        let nl = PhysicalNetlist::new();
        assert_eq!(nl.num_nets(), 0);
        assert_eq!(nl.num_indirect(), 0);
    }

    #[test]
    fn flag_vectors_mark_expected_nodes() {
        let mut nl = PhysicalNetlist::new();
        nl.preserved_nodes.push(2);
        nl.indirect_connections.push(Connection::new(
            ConnId::from_raw(0),
            NetId::from_raw(0),
            NodeId::from_raw(0),
            NodeId::from_raw(4),
            BBox::new(0, 0, 4, 4),
        ));
        let preserved = nl.preserved_flags(6);
        assert_eq!(preserved, vec![false, false, true, false, false, false]);
        let pins = nl.pin_flags(6);
        assert_eq!(pins, vec![true, false, false, false, true, false]);
    }
}
