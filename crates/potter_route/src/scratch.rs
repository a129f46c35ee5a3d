//! Per-thread A* scratch.
//!
//! Every worker thread owns one [`ThreadScratch`]: an array of
//! cacheline-sized [`NodeInfo`] records, one per routing node. The arrays
//! are allocated once and never cleared; records from earlier connections
//! are invalidated by stamp comparison instead. Connection stamps start at 1
//! so the zero-initialized array needs no seeding.
//!
//! At `num_threads * node_count * 64` bytes this scratch can reach
//! gigabytes; allocation happens exactly once, in parallel.

use potter_device::NodeId;
use std::cell::UnsafeCell;

/// Sentinel for "no predecessor" in the back-pointer chain.
pub const NO_PREV: NodeId = NodeId::from_raw(u32::MAX);

/// Per-node search state for one thread.
///
/// Exactly one cacheline; the hot fields (back pointer, costs, stamps) come
/// first.
#[repr(C, align(64))]
#[derive(Clone, Copy, Debug)]
pub struct NodeInfo {
    /// Predecessor on the cheapest known path, or [`NO_PREV`].
    pub prev: NodeId,
    /// Stamp of the connection that last visited this node.
    pub is_visited: u32,
    /// Stamp of the connection whose sink this node is.
    pub is_target: u32,
    /// Total path cost including the distance estimate.
    pub cost: f64,
    /// Path cost without the estimate.
    pub partial_cost: f64,
    occ_change: i32,
    occ_change_stamp: i32,
}

const _: () = assert!(std::mem::size_of::<NodeInfo>() == 64);

impl Default for NodeInfo {
    fn default() -> Self {
        Self {
            prev: NO_PREV,
            is_visited: 0,
            is_target: 0,
            cost: 0.0,
            partial_cost: 0.0,
            occ_change: 0,
            occ_change_stamp: -1,
        }
    }
}

impl NodeInfo {
    /// Overwrites the search fields in one shot.
    pub fn write(&mut self, prev: NodeId, cost: f64, partial_cost: f64, visited: u32, target: u32) {
        self.prev = prev;
        self.cost = cost;
        self.partial_cost = partial_cost;
        self.is_visited = visited;
        self.is_target = target;
    }

    /// The uncommitted occupancy delta recorded for `batch_stamp`.
    ///
    /// Records carrying any other stamp are stale and read as zero.
    pub fn occ_change(&self, batch_stamp: i32) -> i32 {
        if self.occ_change_stamp != batch_stamp {
            return 0;
        }
        self.occ_change
    }

    /// Records one uncommitted occupancy increment for `batch_stamp`.
    pub fn inc_occ_change(&mut self, batch_stamp: i32) {
        if self.occ_change_stamp != batch_stamp {
            self.occ_change_stamp = batch_stamp;
            self.occ_change = 1;
        } else {
            self.occ_change += 1;
        }
    }

    /// Records one uncommitted occupancy decrement for `batch_stamp`.
    pub fn dec_occ_change(&mut self, batch_stamp: i32) {
        if self.occ_change_stamp != batch_stamp {
            self.occ_change_stamp = batch_stamp;
            self.occ_change = -1;
        } else {
            self.occ_change -= 1;
        }
    }
}

/// One thread's scratch array.
///
/// The records sit in `UnsafeCell`s because RPTT leaf tasks share a single
/// scratch array: leaves scheduled on the same level have disjoint bounding
/// boxes, so the records they touch are disjoint by construction.
pub struct ThreadScratch {
    infos: Vec<UnsafeCell<NodeInfo>>,
}

unsafe impl Sync for ThreadScratch {}

impl ThreadScratch {
    /// Allocates scratch for `num_nodes` routing nodes.
    pub fn new(num_nodes: usize) -> Self {
        Self {
            infos: (0..num_nodes).map(|_| UnsafeCell::default()).collect(),
        }
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    /// Whether the scratch is empty.
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// Mutable access to one record.
    ///
    /// # Safety
    ///
    /// The schedule must guarantee that no other task touches `node`'s record
    /// concurrently (single owner per thread, or disjoint RPTT leaf boxes).
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn info_mut(&self, node: NodeId) -> &mut NodeInfo {
        &mut *self.infos[node.index()].get()
    }

    /// Shared access to one record, under the same contract as
    /// [`info_mut`](Self::info_mut).
    ///
    /// # Safety
    ///
    /// No concurrent writer may touch `node`'s record.
    pub unsafe fn info(&self, node: NodeId) -> &NodeInfo {
        &*self.infos[node.index()].get()
    }
}
