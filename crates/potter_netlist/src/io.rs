//! Reading unrouted netlists and writing routed ones.
//!
//! The vendor interchange formats are parsed outside the core; this module
//! handles the projected container only. A routed netlist carries the
//! original unrouted payload unchanged plus one record per node that ended
//! up on a signal path, so downstream tooling can reconstruct every net's
//! route tree.

use crate::data::PhysicalNetlist;
use crate::ids::NetId;
use crate::route_result::NodeRouteResult;
use potter_device::NodeId;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Errors reading or writing a netlist container.
#[derive(Debug, thiserror::Error)]
pub enum NetlistError {
    /// The file could not be read or written.
    #[error("netlist i/o failed for {path}: {source}")]
    Io {
        /// Path of the netlist file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The file contents are not a valid projected netlist.
    #[error("netlist file {path} is malformed: {reason}")]
    Malformed {
        /// Path of the netlist file.
        path: PathBuf,
        /// Decoder failure description.
        reason: String,
    },
}

/// One routed node in the output container.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoutedNode {
    /// The node carrying signal.
    pub node: NodeId,
    /// The net claiming the node.
    pub net: NetId,
    /// Downstream branch nodes, sorted for a stable output.
    pub branches: Vec<NodeId>,
}

/// The routed output container: the unrouted payload plus routing records.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoutedNetlist {
    /// The original unrouted netlist, carried through unchanged.
    pub netlist: PhysicalNetlist,
    /// One record per node used by a routed signal.
    pub routing: Vec<RoutedNode>,
}

/// Reads a projected unrouted netlist.
pub fn read_netlist(path: &Path) -> Result<PhysicalNetlist, NetlistError> {
    let raw = std::fs::read(path).map_err(|source| NetlistError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let (netlist, _) = bincode::serde::decode_from_slice(&raw, bincode::config::standard())
        .map_err(|e| NetlistError::Malformed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    Ok(netlist)
}

/// Writes the routed netlist container.
///
/// `results` is indexed by node ID; only used nodes are emitted. Branch lists
/// are sorted so repeated runs produce identical files.
pub fn write_routed_netlist(
    path: &Path,
    netlist: &PhysicalNetlist,
    results: &[NodeRouteResult],
) -> Result<(), NetlistError> {
    let mut routing = Vec::new();
    for (idx, result) in results.iter().enumerate() {
        if let Some(net) = result.net {
            let mut branches = result.branches.clone();
            branches.sort_by_key(|n| n.as_raw());
            routing.push(RoutedNode {
                node: NodeId::from_raw(idx as u32),
                net,
                branches,
            });
        }
    }
    let routed = RoutedNetlist {
        netlist: netlist.clone(),
        routing,
    };
    let bytes = bincode::serde::encode_to_vec(&routed, bincode::config::standard()).map_err(
        |e| NetlistError::Malformed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        },
    )?;
    std::fs::write(path, bytes).map_err(|source| NetlistError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads back a routed netlist container; used by tests and downstream
/// tooling.
pub fn read_routed_netlist(path: &Path) -> Result<RoutedNetlist, NetlistError> {
    let raw = std::fs::read(path).map_err(|source| NetlistError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let (routed, _) = bincode::serde::decode_from_slice(&raw, bincode::config::standard())
        .map_err(|e| NetlistError::Malformed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    Ok(routed)
}
