//! Consumer interface to the device description parser.
//!
//! Potter does not parse the compressed vendor device format itself. An
//! external projection step produces a [`DeviceSource`]: a flat node array
//! (ID equals index) with per-node geometry, an intent-derived base cost, a
//! type classification, the allowed-tile flag for interconnect tiles, and the
//! raw outgoing adjacency. The container on disk is bincode-encoded.

use crate::node::NodeType;
use potter_common::BBox;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Errors reading or writing a projected device file.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// The file could not be read or written.
    #[error("device i/o failed for {path}: {source}")]
    Io {
        /// Path of the device file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The file contents are not a valid device projection.
    #[error("device file {path} is malformed: {reason}")]
    Malformed {
        /// Path of the device file.
        path: PathBuf,
        /// Decoder failure description.
        reason: String,
    },
    /// The decoded projection violates its own structure.
    #[error("device projection is inconsistent: {reason}")]
    Inconsistent {
        /// Description of the violation.
        reason: String,
    },
}

/// One node of the projected device description.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeviceNodeRecord {
    /// X coordinate of the begin tile.
    pub begin_x: i16,
    /// Y coordinate of the begin tile.
    pub begin_y: i16,
    /// X coordinate of the end tile.
    pub end_x: i16,
    /// Y coordinate of the end tile.
    pub end_y: i16,
    /// Manhattan span of the wire.
    pub length: i16,
    /// Intent-derived base cost.
    pub base_cost: f32,
    /// Node type classification.
    pub node_type: NodeType,
    /// Whether the wire is a pin bounce.
    pub is_pin_bounce: bool,
    /// Whether the wire class is accessible only near the target column.
    pub is_accessible_wire: bool,
    /// Whether the node sits in an INT or LAG_LAG tile.
    pub in_allowed_tile: bool,
    /// Raw outgoing neighbors, as indices into the node array.
    pub children: Vec<u32>,
}

/// The projected device description consumed by graph construction.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeviceSource {
    /// Tile-coordinate extent of the device.
    pub extent: BBox,
    /// The node array; a node's ID is its index.
    pub nodes: Vec<DeviceNodeRecord>,
}

impl DeviceSource {
    /// Number of nodes in the projection.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Checks that every adjacency entry names an existing node.
    pub fn validate(&self) -> Result<(), DeviceError> {
        let n = self.nodes.len() as u32;
        for (idx, node) in self.nodes.iter().enumerate() {
            if let Some(&child) = node.children.iter().find(|&&c| c >= n) {
                return Err(DeviceError::Inconsistent {
                    reason: format!("node {idx} points at nonexistent child {child}"),
                });
            }
        }
        Ok(())
    }

    /// Loads a projected device file.
    pub fn load(path: &Path) -> Result<Self, DeviceError> {
        let raw = std::fs::read(path).map_err(|source| DeviceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let (source, _) = bincode::serde::decode_from_slice(&raw, bincode::config::standard())
            .map_err(|e| DeviceError::Malformed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        Ok(source)
    }

    /// Writes the projection to disk in the same container format.
    pub fn save(&self, path: &Path) -> Result<(), DeviceError> {
        let bytes = bincode::serde::encode_to_vec(self, bincode::config::standard()).map_err(
            |e| DeviceError::Malformed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            },
        )?;
        std::fs::write(path, bytes).map_err(|source| DeviceError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
