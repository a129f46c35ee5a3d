//! Shared foundational types for the Potter FPGA router.
//!
//! This crate provides the integer bounding box used for connection and net
//! geometry and an atomic `f32` wrapper for congestion costs mutated under
//! the router's phase discipline.

#![warn(missing_docs)]

pub mod atomic;
pub mod bbox;

pub use atomic::AtomicF32;
pub use bbox::BBox;
