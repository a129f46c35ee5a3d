//! The Potter routing engine.
//!
//! Potter routes a projected physical netlist through a device's
//! routing-resource graph with parallel negotiated-congestion A*: every
//! source-to-sink connection is searched individually under congestion-aware
//! costs, over-used resources grow more expensive each iteration, and the
//! loop ends once every resource is within capacity.
//!
//! Two parallel schedules are available. Stable-first clusters nets onto
//! threads and synchronizes batches through a route/apply/refresh phase
//! discipline, making results independent of thread interleaving.
//! Runtime-first partitions the device into fanout-balanced regions and
//! lets threads commit through atomics. Both fall back to a recursive
//! partitioning tree (RPTT) over connection bounding boxes once congestion
//! stops improving, whose conflict-free leaf levels finish the job.
//!
//! # Usage
//!
//! ```ignore
//! use potter_route::{route, RouterConfig};
//!
//! let outcome = route(&graph, netlist, RouterConfig::default())?;
//! assert!(outcome.converged);
//! write_routed_netlist(&output, &outcome.netlist, &outcome.results)?;
//! ```

#![warn(missing_docs)]

mod astar;
pub mod config;
pub mod driver;
pub mod error;
mod kmeans;
mod rptt;
mod runtime_first;
mod scratch;
mod stable_first;
mod sync;

pub use config::{ConfigError, RouterConfig};
pub use driver::{Router, RoutingOutcome};
pub use error::RouteError;

use potter_device::RouteGraph;
use potter_netlist::PhysicalNetlist;

/// Routes a netlist through the graph with the given configuration.
///
/// Consumes the netlist and returns it inside the outcome with every
/// connection's path committed, alongside the per-node routing results for
/// the netlist writer. A design that fails to converge still produces a
/// best-effort outcome with `converged == false`; structural violations
/// return an error instead.
pub fn route(
    graph: &RouteGraph,
    netlist: PhysicalNetlist,
    config: RouterConfig,
) -> Result<RoutingOutcome, RouteError> {
    Router::new(graph, netlist, config).run()
}
