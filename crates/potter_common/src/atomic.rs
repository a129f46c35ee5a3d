//! Atomic `f32` stored as raw bits in an [`AtomicU32`].
//!
//! The router's congestion costs are written either by a single thread per
//! node (refresh stripes) or with all writers racing to store the same value,
//! so every access uses `Relaxed` ordering; cross-thread visibility is
//! established by the phase barriers, not by these loads and stores.

use std::sync::atomic::{AtomicU32, Ordering};

/// An `f32` that can be shared between threads.
pub struct AtomicF32 {
    bits: AtomicU32,
}

impl AtomicF32 {
    /// Creates a new atomic float with the given initial value.
    pub fn new(value: f32) -> Self {
        Self {
            bits: AtomicU32::new(value.to_bits()),
        }
    }

    /// Reads the current value.
    pub fn load(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }

    /// Replaces the current value.
    pub fn store(&self, value: f32) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }
}

impl std::fmt::Debug for AtomicF32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.load())
    }
}

impl Clone for AtomicF32 {
    fn clone(&self) -> Self {
        Self::new(self.load())
    }
}
