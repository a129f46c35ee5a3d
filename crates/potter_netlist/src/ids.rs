//! Opaque ID newtypes for netlist entities.
//!
//! [`NetId`] and [`ConnId`] are thin `u32` wrappers used as indices into the
//! netlist's net and connection arrays.

use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
        pub struct $name(u32);

        impl $name {
            /// Creates an ID from a raw `u32` index.
            pub const fn from_raw(index: u32) -> Self {
                Self(index)
            }

            /// Returns the raw `u32` index.
            pub const fn as_raw(self) -> u32 {
                self.0
            }

            /// Returns the index as a `usize` for array access.
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(
    /// Opaque, copyable ID for a net.
    NetId
);

define_id!(
    /// Opaque, copyable ID for a single source-to-sink connection.
    ConnId
);
