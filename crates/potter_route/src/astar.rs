//! Single-connection bounded A* search.
//!
//! The search runs over the routing-resource graph, confined to the
//! connection's bounding box, with the negotiated-congestion cost model.
//! Every connection carries a unique stamp (iteration base plus connection
//! ID) so per-node scratch from earlier connections invalidates itself; the
//! scratch arrays are never cleared.
//!
//! The `sync` flag selects between committing user counts immediately
//! (runtime-first, RPTT, serial routing) and staging them as pending deltas
//! for the stable-first apply phase.

use crate::config::RouterConfig;
use crate::error::RouteError;
use crate::scratch::{ThreadScratch, NO_PREV};
use crate::sync::{OwnedTable, SharedCounters};
use log::warn;
use potter_common::BBox;
use potter_device::{NodeId, NodeType, RouteGraph, RouteNode, NODE_CAPACITY};
use potter_netlist::{ConnId, Connection, Net};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::Ordering as AtomicOrdering;

/// Read-only context shared by every worker of a routing pass.
pub(crate) struct RouteCtx<'a> {
    /// The routing-resource graph.
    pub graph: &'a RouteGraph,
    /// Engine parameters.
    pub cfg: &'a RouterConfig,
    /// All nets, owned per the current schedule.
    pub nets: &'a OwnedTable<Net>,
    /// All indirect connections, owned per the current schedule.
    pub conns: &'a OwnedTable<Connection>,
    /// Pass-wide counters and the fatal-error slot.
    pub shared: &'a SharedCounters,
    /// Present-congestion factor as of the last barrier.
    pub present_factor: f32,
    /// Base added to a connection ID to form its unique stamp.
    pub stamp_base: u32,
    /// Stamp of the current stable-first batch; unused outside batches.
    pub batch_stamp: i32,
    /// Current rip-up iteration, starting at 1.
    pub iter: u32,
}

/// An entry in the A* priority queue.
///
/// `BinaryHeap` is a max-heap, so the ordering is reversed to pop the
/// cheapest node first.
struct SearchEntry {
    cost: f64,
    node: NodeId,
}

impl PartialEq for SearchEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cost == other.cost
    }
}

impl Eq for SearchEntry {}

impl Ord for SearchEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .partial_cmp(&self.cost)
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for SearchEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// One worker's view of the engine: the shared pass context plus its own
/// scratch array.
pub(crate) struct ConnectionRouter<'a> {
    pub ctx: &'a RouteCtx<'a>,
    pub scratch: &'a ThreadScratch,
}

impl<'a> ConnectionRouter<'a> {
    /// Whether a connection still needs (re-)routing.
    pub fn should_route(&self, conn: &Connection) -> bool {
        !conn.is_routed() || conn.is_congested(self.ctx.graph)
    }

    /// Removes a connection's current route.
    ///
    /// An unrouted connection still releases its reserved sink. In `sync`
    /// mode the releases are staged on the net; otherwise they commit
    /// immediately.
    pub fn ripup(&self, conn_id: ConnId, sync: bool) {
        let ctx = self.ctx;
        // Safety: this thread owns the connection and its net in the
        // current schedule.
        let conn = unsafe { ctx.conns.get_mut(conn_id.index()) };
        let net = unsafe { ctx.nets.get_mut(conn.net().index()) };

        let nodes: Vec<NodeId> = if conn.path().is_empty() {
            assert!(
                !conn.is_routed(),
                "routed connection {conn_id} has an empty path"
            );
            // Only the reserved sink is held, and a connection that already
            // failed once has released even that.
            if net.count_users(conn.sink()) > 0 {
                vec![conn.sink()]
            } else {
                Vec::new()
            }
        } else {
            conn.path().to_vec()
        };
        for node in nodes {
            if sync {
                net.pre_decrement_user(node);
            } else {
                let released = net.decrement_user(node);
                let rnode = ctx.graph.node(node);
                if released {
                    rnode.decrement_occupancy();
                }
                rnode.update_present_cost(ctx.present_factor);
            }
        }
        conn.reset_route();
        conn.set_routed(false);
    }

    /// Routes one connection, returning whether the sink was reached.
    ///
    /// Unreachable sinks are recoverable: the caller counts the failure and
    /// the connection is retried next iteration. Structural violations
    /// (a super long line or an output pin appearing as a child) are
    /// recorded as fatal.
    pub fn route_connection(&self, conn_id: ConnId, sync: bool) -> bool {
        let ctx = self.ctx;
        ctx.shared
            .routed_connections
            .fetch_add(1, AtomicOrdering::Relaxed);

        // Safety: this thread owns the connection and its net in the
        // current schedule.
        let conn = unsafe { ctx.conns.get_mut(conn_id.index()) };
        let net = unsafe { ctx.nets.get_mut(conn.net().index()) };
        conn.set_routed_this_iter(true);

        let stamp = ctx.stamp_base + conn_id.as_raw();
        let source = conn.source();
        let sink = conn.sink();
        let sink_node = ctx.graph.node(sink);
        let bbox = conn.bbox();

        // Safety: scratch records are owned by this worker; RPTT leaves on
        // the same level touch disjoint boxes.
        unsafe {
            self.scratch.info_mut(source).write(NO_PREV, 0.0, 0.0, stamp, 0);
            self.scratch.info_mut(sink).write(NO_PREV, 0.0, 0.0, 0, stamp);
        }

        let estimated = (bbox.width().max(1) as usize * bbox.height().max(1) as usize * 10)
            .min(100_000);
        let mut heap: BinaryHeap<SearchEntry> = BinaryHeap::with_capacity(estimated);
        heap.push(SearchEntry {
            cost: 0.0,
            node: source,
        });

        let (net_cx, net_cy) = net.center();
        let fanout = net.fanout() as f64;
        let double_hpwl = net.double_hpwl() as f64;

        let mut target_found = false;
        let mut popped = 0u32;
        'search: while let Some(entry) = heap.pop() {
            popped += 1;
            let r = entry.node;
            let partial = unsafe { self.scratch.info(r) }.partial_cost;

            for &child in ctx.graph.node(r).children() {
                let (visited, is_target) = {
                    let info = unsafe { self.scratch.info(child) };
                    (info.is_visited == stamp, info.is_target == stamp)
                };
                if visited {
                    continue;
                }
                if is_target && child == sink {
                    unsafe { self.scratch.info_mut(child) }.prev = r;
                    target_found = true;
                    break 'search;
                }

                let child_node = ctx.graph.node(child);
                if !in_bbox(child_node, &bbox) {
                    continue;
                }
                match child_node.node_type() {
                    NodeType::Wire | NodeType::PinBounce => {
                        if !ctx.graph.is_accessible(child_node, sink_node) {
                            continue;
                        }
                    }
                    NodeType::PinfeedI => {
                        // Enterable only when it doubles as a bounce already
                        // claimed by a sibling connection of this net.
                        if net.count_users(child) == 0 || !child_node.is_pin_bounce() {
                            continue;
                        }
                    }
                    NodeType::LagunaI => continue,
                    NodeType::SuperLongLine => {
                        ctx.shared.record_fatal(RouteError::topology(format!(
                            "super long line {child} reached while routing connection {conn_id}"
                        )));
                        conn.reset_route();
                        return false;
                    }
                    NodeType::PinfeedO => {
                        ctx.shared.record_fatal(RouteError::topology(format!(
                            "output pin {child} appears as a child of node {r}"
                        )));
                        conn.reset_route();
                        return false;
                    }
                }

                let count_users_origin = net.count_users(child) as i32;
                let mut count_users = count_users_origin;
                let mut occ_change = 0;
                if sync {
                    count_users = count_users_origin - net.pending_decrements(child) as i32
                        + net.pending_increments(child) as i32;
                    occ_change = unsafe { self.scratch.info(child) }.occ_change(ctx.batch_stamp);
                }
                debug_assert!(count_users >= 0);

                let sharing = 1.0 + ctx.cfg.sharing_weight * count_users as f64;
                let node_cost = self.node_cost(
                    child_node,
                    count_users,
                    count_users_origin,
                    occ_change,
                    sharing,
                    net_cx,
                    net_cy,
                    fanout,
                    double_hpwl,
                );
                debug_assert!(node_cost >= 0.0);
                let new_partial = partial
                    + ctx.cfg.rnode_cost_weight * node_cost
                    + ctx.cfg.rnode_wl_weight * child_node.length() as f64 / sharing;

                let dx = (child_node.end_x() as i32 - sink_node.begin_x() as i32).abs();
                let dy = (child_node.end_y() as i32 - sink_node.begin_y() as i32).abs();
                let total = new_partial
                    + ctx.cfg.est_wl_weight * (dx + dy) as f64 / sharing;

                unsafe { self.scratch.info_mut(child) }.write(r, total, new_partial, stamp, 0);
                heap.push(SearchEntry {
                    cost: total,
                    node: child,
                });
            }
        }

        if !target_found {
            conn.reset_route();
            return false;
        }

        self.save_routing(conn);
        if sync {
            for i in 0..conn.path().len() {
                net.pre_increment_user(conn.path()[i]);
            }
        } else {
            for i in 0..conn.path().len() {
                let node = conn.path()[i];
                let newly = net.increment_user(node);
                let rnode = ctx.graph.node(node);
                if newly {
                    rnode.increment_occupancy();
                }
                rnode.update_present_cost(ctx.present_factor);
            }
        }
        conn.set_routed(true);
        conn.set_nodes_explored(popped);
        conn.set_last_routed_iter(ctx.iter);
        true
    }

    /// Walks the back-pointer chain from the sink, recording the path sink
    /// first, source last.
    fn save_routing(&self, conn: &mut Connection) {
        let mut node = conn.sink();
        let mut watchdog = 0;
        loop {
            conn.push_path_node(node);
            watchdog += 1;
            assert!(
                watchdog < 10_000,
                "runaway back-pointer chain for connection {}",
                conn.id()
            );
            let prev = unsafe { self.scratch.info(node) }.prev;
            if prev == NO_PREV {
                break;
            }
            node = prev;
        }
        assert_eq!(
            *conn.path().last().expect("path cannot be empty"),
            conn.source(),
            "back-pointer chain of connection {} does not end at its source",
            conn.id()
        );
    }

    /// The congestion cost of entering `node`.
    ///
    /// When the node is already shared with a sibling connection of the same
    /// net, the present cost is recomputed from the occupancy this query
    /// would observe after its own staged changes; otherwise the node's
    /// stored present cost applies. A centering bias pulls paths toward the
    /// net's center of gravity.
    #[allow(clippy::too_many_arguments)]
    fn node_cost(
        &self,
        node: &RouteNode,
        count_users: i32,
        count_users_origin: i32,
        occ_change: i32,
        sharing: f64,
        net_cx: f64,
        net_cy: f64,
        fanout: f64,
        double_hpwl: f64,
    ) -> f64 {
        let pre_dec = (count_users_origin > 0 && count_users == 0) as i32;
        let pre_inc = (count_users_origin == 0 && count_users > 0) as i32;
        let present = if count_users != 0 {
            let over_occupancy =
                node.occupancy() - pre_dec + pre_inc + occ_change - NODE_CAPACITY;
            1.0 + over_occupancy as f64 * self.ctx.present_factor as f64
        } else {
            node.present_cost() as f64
        };

        let base = node.base_cost() as f64;
        let bias = base / fanout
            * ((node.end_x() as f64 - net_cx).abs() + (node.end_y() as f64 - net_cy).abs())
            / double_hpwl;

        base * node.historical_cost() as f64 * present / sharing + bias
    }

    /// Rips up and reroutes every listed connection that needs it, with
    /// immediate (unsynchronized) commits.
    ///
    /// Used by the serial path, runtime-first sweeps, and RPTT leaves.
    pub fn route_connections_unsync(&self, conn_ids: &[ConnId]) {
        let ctx = self.ctx;
        for &conn_id in conn_ids {
            if ctx.shared.has_fatal() {
                return;
            }
            let needs_route = {
                // Safety: this thread owns the connection in the current
                // schedule; the borrow ends before any mutation below.
                let conn = unsafe { ctx.conns.get(conn_id.index()) };
                self.should_route(conn)
            };
            if !needs_route {
                continue;
            }
            self.ripup(conn_id, false);
            if !self.route_connection(conn_id, false) {
                ctx.shared
                    .failed_connections
                    .fetch_add(1, AtomicOrdering::Relaxed);
                self.log_failure(conn_id);
            }
        }
    }

    /// Logs an unreachable connection with its endpoint coordinates.
    pub fn log_failure(&self, conn_id: ConnId) {
        let ctx = self.ctx;
        // Safety: this thread owns the connection in the current schedule.
        let conn = unsafe { ctx.conns.get(conn_id.index()) };
        let source = ctx.graph.node(conn.source());
        let sink = ctx.graph.node(conn.sink());
        warn!(
            "routing failure: {conn} endpoints [{} {} {} {}]",
            source.end_x(),
            sink.end_x(),
            source.end_y(),
            sink.end_y()
        );
    }
}

/// Strict bounding-box test on the child's end tile.
fn in_bbox(node: &RouteNode, bbox: &BBox) -> bool {
    let x = node.end_x() as i32;
    let y = node.end_y() as i32;
    x > bbox.x_min && x < bbox.x_max && y > bbox.y_min && y < bbox.y_max
}
