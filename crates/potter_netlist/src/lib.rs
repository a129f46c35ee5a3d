//! Physical-netlist data model for the Potter FPGA router.
//!
//! The netlist parser (external to the core) projects a design onto the
//! routing-resource graph: every [`Net`] carries its source and sink nodes
//! inside INT tiles plus the real pin nodes outside, and every source/sink
//! pair becomes a [`Connection`] the router serves individually. This crate
//! also holds the per-node routing result consumed by the netlist writer.

#![warn(missing_docs)]

pub mod connection;
pub mod data;
pub mod ids;
pub mod io;
pub mod net;
pub mod route_result;

pub use connection::Connection;
pub use data::PhysicalNetlist;
pub use ids::{ConnId, NetId};
pub use io::{read_netlist, write_routed_netlist, NetlistError, RoutedNetlist, RoutedNode};
pub use net::Net;
pub use route_result::NodeRouteResult;
