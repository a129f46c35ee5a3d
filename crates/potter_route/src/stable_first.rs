//! Stable-first synchronized routing.
//!
//! Nets are clustered onto threads with k-means, each thread's list is cut
//! into batches by angular order around the cluster centroid, and every
//! batch runs three barrier-separated phases:
//!
//! 1. **Route**: each thread reroutes its nets' congested connections,
//!    staging user changes as pending deltas and recording occupancy deltas
//!    in its private scratch.
//! 2. **Apply**: each thread replays its nets' pending deltas against the
//!    shared user maps, stamping nodes whose occupancy flipped.
//! 3. **Refresh**: threads sweep stripes of the node array and recompute
//!    the present cost of every stamped node.
//!
//! Within a batch no thread sees another thread's staged changes, so every
//! search decides against the same barrier snapshot and the result does not
//! depend on thread interleaving. High-fanout labeled nets are excluded
//! from clustering and routed through their own partition tree afterwards.

use crate::astar::ConnectionRouter;
use crate::driver::Router;
use crate::kmeans::kmeans;
use crate::rptt::PartitionTree;
use log::{debug, info};
use potter_common::BBox;
use potter_device::NodeId;
use potter_netlist::{ConnId, NetId};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::Ordering;

/// Target nets per thread per stable-first batch.
const STABLE_NETS_PER_BATCH: usize = 256;
/// Share of indirect connections allowed into labeled nets.
const LABELED_CONNECTIONS_RATIO: f64 = 0.5;

impl Router<'_> {
    /// Marks large-area, high-fanout nets as labeled and builds their
    /// dedicated partition tree.
    ///
    /// Nets are bucketed by bounding-box area; buckets are taken from the
    /// largest area downward until admitting the next bucket would push the
    /// labeled share of connections past the ratio.
    pub(crate) fn label_nets(&mut self) {
        let num_indirect = self.conns.len();
        let conns = self.conns.items();
        let nets = self.nets.items_mut();

        let mut area_map: BTreeMap<i64, Vec<NetId>> = BTreeMap::new();
        for net in nets.iter() {
            if net.fanout() == 0 {
                continue;
            }
            let b = net.bbox();
            let area = (b.x_max - b.x_min + 1) as i64 * (b.y_max - b.y_min + 1) as i64;
            area_map.entry(area).or_default().push(net.id());
        }

        let threshold = LABELED_CONNECTIONS_RATIO * num_indirect as f64;
        let mut labeled_conn_ids: Vec<ConnId> = Vec::new();
        let mut labeled_net_ids: Vec<NetId> = Vec::new();
        let mut conn_cnt = 0usize;
        for (area, ids) in area_map.iter().rev() {
            let bucket: usize = ids.iter().map(|id| nets[id.index()].fanout()).sum();
            if (conn_cnt + bucket) as f64 >= threshold {
                debug!("labeling stops before area {area}");
                break;
            }
            conn_cnt += bucket;
            for id in ids {
                let net = &mut nets[id.index()];
                net.set_labeled(true);
                labeled_net_ids.push(*id);
                labeled_conn_ids.extend_from_slice(net.connections());
            }
        }
        info!(
            "labeled {} / {} nets ({} / {num_indirect} connections)",
            labeled_net_ids.len(),
            nets.len(),
            labeled_conn_ids.len()
        );
        self.labeled_net_ids = labeled_net_ids;

        if !labeled_conn_ids.is_empty() {
            let mut bbox = BBox::empty();
            for id in &labeled_conn_ids {
                bbox = bbox.union_with(&conns[id.index()].bbox());
            }
            self.labeled_tree = Some(PartitionTree::build(conns, labeled_conn_ids, bbox));
        }
    }

    /// Clusters the non-labeled nets onto threads and cuts every thread's
    /// list into batches by angular order around the cluster centroid.
    pub(crate) fn kmeans_partition(&mut self) {
        let k = self.num_threads;
        let extent = self.graph.extent();
        let (x_margin, y_margin) = (self.cfg.x_margin, self.cfg.y_margin);
        let labeled = self.labeled_net_ids.len();
        let total_nets = self.nets.len();
        let nets = self.nets.items();

        let ids: Vec<NetId> = nets
            .iter()
            .filter(|n| !n.is_labeled() && n.fanout() > 0)
            .map(|n| n.id())
            .collect();
        let labels = kmeans(nets, &ids, k, extent, x_margin, y_margin);

        let mut thread_nets: Vec<Vec<NetId>> = vec![Vec::new(); k];
        for (i, id) in ids.iter().enumerate() {
            thread_nets[labels[i]].push(*id);
        }

        let num_batches = ((total_nets - labeled) / (STABLE_NETS_PER_BATCH * k)).max(1);
        let mut net_batches: Vec<Vec<Vec<NetId>>> = vec![vec![Vec::new(); k]; num_batches];

        for (tid, list) in thread_nets.iter().enumerate() {
            if list.is_empty() {
                continue;
            }
            let mut bbox = BBox::empty();
            for id in list {
                bbox = bbox.union_with(&nets[id.index()].bbox());
            }
            let cx = bbox.x_center();
            let cy = bbox.y_center();
            let angles: Vec<f64> = list
                .iter()
                .map(|id| {
                    let b = nets[id.index()].bbox();
                    (b.y_center() - cy).atan2(b.x_center() - cx)
                })
                .collect();
            let mut order: Vec<usize> = (0..list.len()).collect();
            order.sort_by(|&a, &b| {
                angles[a]
                    .partial_cmp(&angles[b])
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            for (i, &ord) in order.iter().enumerate() {
                let batch = i * num_batches / list.len();
                net_batches[batch][tid].push(list[ord]);
            }
        }

        self.num_batches = num_batches;
        self.thread_nets = thread_nets;
        self.net_batches = net_batches;
    }

    /// Runs one stable-first iteration: every batch goes through the
    /// Route, Apply, and Refresh phases, separated by thread joins.
    pub(crate) fn stable_first_routing(&mut self) {
        for batch in 0..self.num_batches {
            self.batch_stamp = self.iter as i32 * self.num_batches as i32 + batch as i32;
            let ctx = self.make_ctx();

            // Route phase: staged changes only, thread-private scratch.
            std::thread::scope(|scope| {
                for (tid, scratch) in self.scratch.iter().enumerate() {
                    let net_ids = &self.net_batches[batch][tid];
                    let ctx = &ctx;
                    scope.spawn(move || {
                        let router = ConnectionRouter { ctx, scratch };
                        stable_route_worker(&router, net_ids);
                    });
                }
            });

            // Apply phase: replay staged deltas against the shared maps.
            std::thread::scope(|scope| {
                for tid in 0..self.num_threads {
                    let net_ids = &self.net_batches[batch][tid];
                    let ctx = &ctx;
                    scope.spawn(move || {
                        for &net_id in net_ids {
                            // Safety: this thread owns the net for this
                            // batch.
                            let net = unsafe { ctx.nets.get_mut(net_id.index()) };
                            net.apply_pending_increments(ctx.batch_stamp, ctx.graph);
                            net.apply_pending_decrements(ctx.batch_stamp, ctx.graph);
                        }
                    });
                }
            });

            // Refresh phase: recompute present cost of stamped nodes.
            let num_threads = self.num_threads;
            let graph = self.graph;
            let present_factor = self.present_factor;
            let stamp = self.batch_stamp;
            std::thread::scope(|scope| {
                for tid in 0..num_threads {
                    scope.spawn(move || {
                        let nodes = graph.nodes();
                        let mut idx = tid;
                        while idx < nodes.len() {
                            let node = &nodes[idx];
                            if node.need_update_stamp() == stamp {
                                node.update_present_cost(present_factor);
                            }
                            idx += num_threads;
                        }
                    });
                }
            });
        }

        if let Some(tree) = self.labeled_tree.take() {
            self.route_partition_tree(&tree);
            self.labeled_tree = Some(tree);
        }
    }
}

/// Route-phase body for one thread's nets of the current batch.
fn stable_route_worker(router: &ConnectionRouter<'_>, net_ids: &[NetId]) {
    let ctx = router.ctx;
    for &net_id in net_ids {
        if ctx.shared.has_fatal() {
            return;
        }
        let conn_ids: Vec<ConnId> = {
            // Safety: this thread owns the net in the current batch.
            let net = unsafe { ctx.nets.get_mut(net_id.index()) };
            net.clear_pending();
            net.connections().to_vec()
        };

        let mut used_before: HashSet<NodeId> = HashSet::new();
        for conn_id in &conn_ids {
            // Safety: the net's connections belong to the same owner.
            let conn = unsafe { ctx.conns.get(conn_id.index()) };
            used_before.extend(conn.path().iter().copied());
        }

        for &conn_id in &conn_ids {
            let needs_route = {
                let conn = unsafe { ctx.conns.get_mut(conn_id.index()) };
                conn.set_routed_this_iter(false);
                router.should_route(conn)
            };
            if needs_route {
                router.ripup(conn_id, true);
                if !router.route_connection(conn_id, true) {
                    ctx.shared
                        .failed_connections
                        .fetch_add(1, Ordering::Relaxed);
                    router.log_failure(conn_id);
                }
            }
        }

        let mut used_after: HashSet<NodeId> = HashSet::new();
        for conn_id in &conn_ids {
            let conn = unsafe { ctx.conns.get(conn_id.index()) };
            used_after.extend(conn.path().iter().copied());
        }
        // Uncommitted occupancy deltas, visible to this thread only until
        // the apply phase commits them.
        for &node in used_after.difference(&used_before) {
            // Safety: the scratch array is private to this worker thread.
            unsafe { router.scratch.info_mut(node) }.inc_occ_change(ctx.batch_stamp);
        }
        for &node in used_before.difference(&used_after) {
            unsafe { router.scratch.info_mut(node) }.dec_occ_change(ctx.batch_stamp);
        }
    }
}
