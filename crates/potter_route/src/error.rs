//! Routing error taxonomy.

use potter_device::NodeId;
use potter_netlist::{ConnId, NetId};

/// Errors raised by the routing engine.
///
/// [`ConnectionUnreachable`](RouteError::ConnectionUnreachable) is recoverable
/// within the iteration loop: the connection is counted as a failure and
/// retried after the next cost-factor update. Every other kind fails fast.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    /// The A* queue emptied before the sink was reached.
    #[error("connection {conn} cannot reach its sink inside its bounding box")]
    ConnectionUnreachable {
        /// The failing connection.
        conn: ConnId,
    },

    /// The direct-connection breadth-first search hit its watchdog.
    #[error("direct connection {conn} exhausted its search watchdog")]
    DirectConnectionUnreachable {
        /// The failing direct connection.
        conn: ConnId,
    },

    /// A node appears on the committed paths of two different nets.
    #[error("node {node} is driven by both net {first} and net {second}")]
    MultiDriverViolation {
        /// The doubly-claimed node.
        node: NodeId,
        /// The net that claimed the node first.
        first: NetId,
        /// The net that claimed it second.
        second: NetId,
    },

    /// The device or netlist projection violates a structural invariant.
    #[error("topology invariant violated: {reason}")]
    TopologyInvariant {
        /// Description of the violation.
        reason: String,
    },

    /// The iteration limit was exhausted with congestion remaining.
    #[error(
        "routing did not converge after {iterations} iterations \
         ({overused} nodes over capacity, {failed} unrouted connections)"
    )]
    ConvergenceFailure {
        /// Iterations executed.
        iterations: u32,
        /// Over-used nodes remaining.
        overused: usize,
        /// Connections without a route.
        failed: u32,
    },
}

impl RouteError {
    /// Convenience constructor for topology violations.
    pub fn topology(reason: impl Into<String>) -> Self {
        RouteError::TopologyInvariant {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_resources() {
        let err = RouteError::MultiDriverViolation {
            node: NodeId::from_raw(7),
            first: NetId::from_raw(1),
            second: NetId::from_raw(2),
        };
        let msg = format!("{err}");
        assert!(msg.contains('7'));
        assert!(msg.contains("net 1"));
        assert!(msg.contains("net 2"));
    }

    #[test]
    fn topology_constructor() {
        let err = RouteError::topology("duplicate sink");
        assert!(format!("{err}").contains("duplicate sink"));
    }
}
