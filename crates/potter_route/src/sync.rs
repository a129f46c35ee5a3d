//! Schedule-guarded shared state.
//!
//! The router never locks nets or connections. Instead, every schedule
//! guarantees that a given net (and its connections) is mutated by exactly
//! one thread at a time: one thread per batch in stable-first mode, one
//! thread per pass in runtime-first mode, and the single thread processing
//! the containing leaf in RPTT mode. [`OwnedTable`] encodes that contract: it
//! hands out disjoint `&mut` references across threads, and the caller
//! vouches for the ownership discipline.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use crate::error::RouteError;

/// A flat table of items mutated under a scheduling discipline instead of
/// locks.
pub struct OwnedTable<T> {
    cells: Vec<UnsafeCell<T>>,
}

// The table only hands out references under the caller-supplied ownership
// contract; the items themselves cross threads.
unsafe impl<T: Send> Sync for OwnedTable<T> {}

impl<T> OwnedTable<T> {
    /// Wraps a vector of items.
    pub fn new(items: Vec<T>) -> Self {
        Self {
            cells: items.into_iter().map(UnsafeCell::new).collect(),
        }
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Mutable access to one item from a worker thread.
    ///
    /// # Safety
    ///
    /// The caller must be the thread that owns index `idx` in the current
    /// schedule, and must not hold another reference to the same item. No
    /// other thread may touch `idx` until the next barrier.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get_mut(&self, idx: usize) -> &mut T {
        &mut *self.cells[idx].get()
    }

    /// Shared access to one item from a worker thread.
    ///
    /// # Safety
    ///
    /// No thread may mutate index `idx` for the lifetime of the reference.
    pub unsafe fn get(&self, idx: usize) -> &T {
        &*self.cells[idx].get()
    }

    /// Exclusive access to all items between parallel phases.
    pub fn items_mut(&mut self) -> &mut [T] {
        // UnsafeCell<T> has the same layout as T.
        unsafe { &mut *(self.cells.as_mut_slice() as *mut [UnsafeCell<T>] as *mut [T]) }
    }

    /// Shared iteration between parallel phases.
    pub fn items(&mut self) -> &[T] {
        unsafe { &*(self.cells.as_slice() as *const [UnsafeCell<T>] as *const [T]) }
    }

    /// Unwraps the table back into its items.
    pub fn into_inner(self) -> Vec<T> {
        self.cells.into_iter().map(UnsafeCell::into_inner).collect()
    }
}

/// Counters and the fatal-error slot shared by all workers of a pass.
#[derive(Default)]
pub struct SharedCounters {
    /// Connections routed (attempted) this iteration.
    pub routed_connections: AtomicU32,
    /// Connections whose search failed this iteration.
    pub failed_connections: AtomicU32,
    fatal: Mutex<Option<RouteError>>,
}

impl SharedCounters {
    /// Resets the per-iteration counters, keeping any fatal error.
    pub fn reset(&self) {
        self.routed_connections.store(0, Ordering::Relaxed);
        self.failed_connections.store(0, Ordering::Relaxed);
    }

    /// Connections routed this iteration.
    pub fn routed(&self) -> u32 {
        self.routed_connections.load(Ordering::Relaxed)
    }

    /// Connections failed this iteration.
    pub fn failed(&self) -> u32 {
        self.failed_connections.load(Ordering::Relaxed)
    }

    /// Records a fatal error; the first one wins.
    pub fn record_fatal(&self, err: RouteError) {
        let mut slot = self.fatal.lock().expect("fatal slot poisoned");
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    /// Whether a fatal error is pending.
    pub fn has_fatal(&self) -> bool {
        self.fatal.lock().expect("fatal slot poisoned").is_some()
    }

    /// Takes the pending fatal error, if any.
    pub fn take_fatal(&self) -> Option<RouteError> {
        self.fatal.lock().expect("fatal slot poisoned").take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use potter_netlist::ConnId;

    #[test]
    fn exclusive_access_reads_writes() {
        let mut table = OwnedTable::new(vec![1, 2, 3]);
        table.items_mut()[1] = 20;
        assert_eq!(table.items(), &[1, 20, 3]);
        assert_eq!(table.into_inner(), vec![1, 20, 3]);
    }

    #[test]
    fn disjoint_threaded_mutation() {
        let table = OwnedTable::new(vec![0u32; 8]);
        std::thread::scope(|scope| {
            for tid in 0..4 {
                let table = &table;
                scope.spawn(move || {
                    for idx in (tid..8).step_by(4) {
                        // Each thread owns a disjoint stripe.
                        unsafe { *table.get_mut(idx) = idx as u32 };
                    }
                });
            }
        });
        let mut table = table;
        assert_eq!(table.items(), &[0, 1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn first_fatal_wins() {
        let counters = SharedCounters::default();
        assert!(!counters.has_fatal());
        counters.record_fatal(RouteError::DirectConnectionUnreachable {
            conn: ConnId::from_raw(1),
        });
        counters.record_fatal(RouteError::DirectConnectionUnreachable {
            conn: ConnId::from_raw(2),
        });
        match counters.take_fatal() {
            Some(RouteError::DirectConnectionUnreachable { conn }) => {
                assert_eq!(conn, ConnId::from_raw(1));
            }
            other => panic!("unexpected fatal: {other:?}"),
        }
        assert!(!counters.has_fatal());
    }

    #[test]
    fn counters_reset() {
        let counters = SharedCounters::default();
        counters.routed_connections.store(5, Ordering::Relaxed);
        counters.failed_connections.store(2, Ordering::Relaxed);
        counters.reset();
        assert_eq!(counters.routed(), 0);
        assert_eq!(counters.failed(), 0);
    }
}
