//! Device model for the Potter FPGA router.
//!
//! This crate holds the routing-resource graph (RRG): the immutable topology
//! produced from a device description plus the mutable per-node congestion
//! state negotiated during routing. The device description itself is produced
//! by an external parser; [`DeviceSource`] is the consumer interface Potter
//! expects from it, and [`RouteGraph::build`] turns it into the pruned graph
//! the router searches.

#![warn(missing_docs)]

pub mod graph;
pub mod ids;
pub mod node;
pub mod source;

pub use graph::RouteGraph;
pub use ids::NodeId;
pub use node::{NodeType, RouteNode, NODE_CAPACITY};
pub use source::{DeviceError, DeviceNodeRecord, DeviceSource};
