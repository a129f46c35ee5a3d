//! Runtime-first region routing.
//!
//! The device is split into a binary region tree balanced by net fanout;
//! levels with fewer regions than threads are re-partitioned onto exactly
//! `num_threads` sub-boxes by area-first assignment. The per-level lists
//! are concatenated into one list per thread, cut into sub-batches of equal
//! estimated HPWL, and each thread then routes its nets in a single sweep
//! with unsynchronized (atomic) commits. This trades the stable-first
//! mode's determinism for throughput.

use crate::astar::ConnectionRouter;
use crate::driver::Router;
use crate::rptt::Axis;
use log::info;
use potter_common::BBox;
use potter_netlist::{ConnId, Net, NetId};
use std::collections::VecDeque;

/// Target nets per thread per runtime-first sub-batch.
const RUNTIME_NETS_PER_BATCH: usize = 64;
/// Per-thread fanout cap slack during in-level re-partitioning.
const FANOUT_CAP_SLACK: f64 = 1.05;

/// One node of the region tree.
struct Region {
    bbox: BBox,
    level: usize,
    net_ids: Vec<NetId>,
}

impl Router<'_> {
    /// Builds the region tree and the per-thread net schedule.
    pub(crate) fn region_partition(&mut self) {
        let t = self.num_threads;
        let extent = self.graph.extent();
        let total_nets = self.nets.len();
        let labeled = self.labeled_net_ids.len();
        let nets = self.nets.items();
        let conns = self.conns.items();

        let mut num_levels = 1usize;
        while (1usize << (num_levels - 1)) < t {
            num_levels += 1;
        }
        info!("region tree levels: {num_levels}");

        let root_nets: Vec<NetId> = nets
            .iter()
            .filter(|n| !n.is_labeled() && n.fanout() > 0)
            .map(|n| n.id())
            .collect();
        let mut arena: Vec<Region> = vec![Region {
            bbox: extent,
            level: 0,
            net_ids: root_nets,
        }];
        let mut levels: Vec<Vec<usize>> = vec![Vec::new(); num_levels];

        let mut queue = VecDeque::new();
        queue.push_back(0usize);
        while let Some(idx) = queue.pop_front() {
            levels[arena[idx].level].push(idx);
            if arena[idx].level + 1 >= num_levels {
                continue;
            }

            let Some((axis, pos)) = balanced_cutline(nets, &arena[idx]) else {
                continue;
            };
            let bbox = arena[idx].bbox;
            let (left_box, right_box) = match axis {
                Axis::X => {
                    if pos <= bbox.x_min || pos >= bbox.x_max {
                        continue;
                    }
                    (
                        BBox::new(bbox.x_min, bbox.y_min, pos, bbox.y_max),
                        BBox::new(pos, bbox.y_min, bbox.x_max, bbox.y_max),
                    )
                }
                Axis::Y => {
                    if pos <= bbox.y_min || pos >= bbox.y_max {
                        continue;
                    }
                    (
                        BBox::new(bbox.x_min, bbox.y_min, bbox.x_max, pos),
                        BBox::new(bbox.x_min, pos, bbox.x_max, bbox.y_max),
                    )
                }
            };

            let level = arena[idx].level;
            let mut left_ids = Vec::new();
            let mut right_ids = Vec::new();
            let mut straddling = Vec::new();
            for &net_id in &arena[idx].net_ids {
                let b = nets[net_id.index()].bbox();
                if contains(&left_box, &b) {
                    left_ids.push(net_id);
                } else if contains(&right_box, &b) {
                    right_ids.push(net_id);
                } else {
                    straddling.push(net_id);
                }
            }
            match axis {
                Axis::X => straddling.sort_by(|a, b| {
                    let xa = nets[a.index()].center().0;
                    let xb = nets[b.index()].center().0;
                    xa.partial_cmp(&xb).unwrap_or(std::cmp::Ordering::Equal)
                }),
                Axis::Y => straddling.sort_by(|a, b| {
                    let ya = nets[a.index()].center().1;
                    let yb = nets[b.index()].center().1;
                    ya.partial_cmp(&yb).unwrap_or(std::cmp::Ordering::Equal)
                }),
            }
            arena[idx].net_ids = straddling;

            arena.push(Region {
                bbox: left_box,
                level: level + 1,
                net_ids: left_ids,
            });
            queue.push_back(arena.len() - 1);
            arena.push(Region {
                bbox: right_box,
                level: level + 1,
                net_ids: right_ids,
            });
            queue.push_back(arena.len() - 1);
        }

        // First schedule: per-level thread lists.
        let mut per_thread_levels: Vec<Vec<Vec<NetId>>> =
            vec![vec![Vec::new(); num_levels]; t];
        for (lid, level) in levels.iter().enumerate() {
            if level.len() < t {
                let regions: Vec<&Region> = level.iter().map(|&i| &arena[i]).collect();
                let parts = in_level_repartition(nets, &regions, t);
                for (tid, part) in parts.into_iter().enumerate() {
                    per_thread_levels[tid][lid].extend(part);
                }
            } else {
                for (j, &ridx) in level.iter().enumerate() {
                    per_thread_levels[j % t][lid]
                        .extend(arena[ridx].net_ids.iter().copied());
                }
            }
        }
        let mut thread_nets: Vec<Vec<NetId>> = vec![Vec::new(); t];
        for (tid, per_level) in per_thread_levels.into_iter().enumerate() {
            for list in per_level {
                thread_nets[tid].extend(list);
            }
        }

        // Second schedule: sub-batches of equal estimated HPWL.
        let num_batches = ((total_nets - labeled) / (RUNTIME_NETS_PER_BATCH * t)).max(1);
        info!("runtime-first batches: {num_batches}");
        let workload = |net_id: NetId| -> i64 {
            nets[net_id.index()]
                .connections()
                .iter()
                .map(|c| conns[c.index()].hpwl() as i64)
                .sum()
        };
        let mut net_batches: Vec<Vec<Vec<NetId>>> = vec![vec![Vec::new(); t]; num_batches];
        for (tid, list) in thread_nets.iter().enumerate() {
            let total: i64 = list.iter().map(|&id| workload(id)).sum();
            let mut end = 0usize;
            let mut admitted = 0i64;
            for (batch, batch_lists) in net_batches.iter_mut().enumerate() {
                let begin = end;
                if begin >= list.len() {
                    break;
                }
                end = begin + 1;
                if batch == num_batches - 1 {
                    end = list.len();
                } else {
                    let bound = (batch as i64 + 1) * total / num_batches as i64;
                    while end < list.len() {
                        let estimate = workload(list[end]);
                        if admitted + estimate > bound {
                            break;
                        }
                        admitted += estimate;
                        end += 1;
                    }
                }
                batch_lists[tid].extend_from_slice(&list[begin..end.min(list.len())]);
            }
        }

        self.num_batches = num_batches;
        self.thread_nets = thread_nets;
        self.net_batches = net_batches;
    }

    /// Runs one runtime-first iteration: every thread sweeps its own
    /// sub-batches in order, committing through atomics, with no barriers
    /// until the whole pass joins.
    pub(crate) fn runtime_first_routing(&mut self) {
        let ctx = self.make_ctx();
        std::thread::scope(|scope| {
            for (tid, scratch) in self.scratch.iter().enumerate() {
                let ctx = &ctx;
                let net_batches = &self.net_batches;
                scope.spawn(move || {
                    let router = ConnectionRouter { ctx, scratch };
                    for batch in net_batches {
                        for &net_id in &batch[tid] {
                            if ctx.shared.has_fatal() {
                                return;
                            }
                            let mut conn_ids: Vec<ConnId> = {
                                // Safety: this thread owns the net for the
                                // whole pass.
                                let net = unsafe { ctx.nets.get(net_id.index()) };
                                net.connections().to_vec()
                            };
                            conn_ids.sort_by_key(|c| {
                                // Safety: same owner as the net.
                                unsafe { ctx.conns.get(c.index()) }.hpwl()
                            });
                            router.route_connections_unsync(&conn_ids);
                        }
                    }
                });
            }
        });
    }
}

/// Whether `outer` fully contains `inner`.
fn contains(outer: &BBox, inner: &BBox) -> bool {
    inner.x_min >= outer.x_min
        && inner.y_min >= outer.y_min
        && inner.x_max <= outer.x_max
        && inner.y_max <= outer.y_max
}

/// The axis and position minimizing the absolute fanout imbalance between
/// the sides, with net centers clamped into the region.
fn balanced_cutline(nets: &[Net], region: &Region) -> Option<(Axis, i32)> {
    let bbox = region.bbox;
    let mut best: Option<(Axis, i32)> = None;
    let mut best_score = i64::MAX;

    let mut consider = |axis: Axis, best: &mut Option<(Axis, i32)>| {
        let (lo, extent) = match axis {
            Axis::X => (bbox.x_min, bbox.width()),
            Axis::Y => (bbox.y_min, bbox.height()),
        };
        if extent < 2 {
            return;
        }
        let slots = (extent - 1) as usize;
        let mut before = vec![0i64; slots];
        let mut after = vec![0i64; slots];
        for net_id in &region.net_ids {
            let net = &nets[net_id.index()];
            let fanout = net.fanout() as i64;
            let center = match axis {
                Axis::X => net.center().0 as i32,
                Axis::Y => net.center().1 as i32,
            };
            let c = (center.clamp(lo, lo + extent - 1) - lo) as usize;
            for slot in before.iter_mut().take(slots).skip(c) {
                *slot += fanout;
            }
            for slot in after.iter_mut().take(c) {
                *slot += fanout;
            }
        }
        let max_before = before[slots - 1];
        let max_after = after[0];
        for x in 0..slots {
            // Cutting here would leave one side without nets.
            if before[x] == max_before || after[x] == max_after {
                continue;
            }
            let score = (before[x] - after[x]).abs();
            if score < best_score {
                best_score = score;
                *best = Some((axis, lo + x as i32));
            }
        }
    };
    consider(Axis::X, &mut best);
    consider(Axis::Y, &mut best);
    best
}

/// Re-partitions a level with fewer regions than threads onto exactly `t`
/// sub-boxes.
///
/// Nets are assigned largest-area first, each to the candidate box with the
/// biggest overlap (closest center on ties), subject to a per-box fanout
/// cap; a net no box can take goes to the least-loaded box.
fn in_level_repartition(nets: &[Net], regions: &[&Region], t: usize) -> Vec<Vec<NetId>> {
    let mut level_box = BBox::empty();
    let mut level_net_ids: Vec<NetId> = Vec::new();
    for region in regions {
        level_box = level_box.union_with(&region.bbox);
        level_net_ids.extend(region.net_ids.iter().copied());
    }
    if level_net_ids.is_empty() {
        return vec![Vec::new(); t];
    }
    let level_fanout: i64 = level_net_ids
        .iter()
        .map(|id| nets[id.index()].fanout() as i64)
        .sum();

    // Big boxes first: a small net landing in the wrong box wastes less
    // overlap.
    level_net_ids.sort_by(|a, b| nets[b.index()].area().cmp(&nets[a.index()].area()));

    // Split the level box into t pieces, preferring square pieces.
    let mut queue = VecDeque::new();
    queue.push_back(level_box);
    while queue.len() < t {
        let b = queue.pop_front().expect("queue cannot be empty");
        if b.x_max - b.x_min >= b.y_max - b.y_min {
            let mid = (b.x_min + b.x_max) / 2;
            queue.push_back(BBox::new(b.x_min, b.y_min, mid, b.y_max));
            queue.push_back(BBox::new(mid, b.y_min, b.x_max, b.y_max));
        } else {
            let mid = (b.y_min + b.y_max) / 2;
            queue.push_back(BBox::new(b.x_min, b.y_min, b.x_max, mid));
            queue.push_back(BBox::new(b.x_min, mid, b.x_max, b.y_max));
        }
    }
    let pieces: Vec<BBox> = queue.into_iter().collect();

    let cap = (level_fanout as f64 * FANOUT_CAP_SLACK / t as f64) as i64;
    let mut assigned: Vec<Vec<NetId>> = vec![Vec::new(); t];
    let mut load = vec![0i64; t];
    for net_id in level_net_ids {
        let net = &nets[net_id.index()];
        let b = net.bbox();
        let fanout = net.fanout() as i64;

        let mut order: Vec<usize> = (0..t).collect();
        order.sort_by(|&l, &r| {
            let ol = overlap_area(&b, &pieces[l]);
            let or = overlap_area(&b, &pieces[r]);
            or.cmp(&ol).then_with(|| {
                let dl = center_distance(&b, &pieces[l]);
                let dr = center_distance(&b, &pieces[r]);
                dl.partial_cmp(&dr).unwrap_or(std::cmp::Ordering::Equal)
            })
        });

        let slot = order
            .iter()
            .copied()
            .find(|&p| load[p] + fanout <= cap)
            .unwrap_or_else(|| {
                (0..t).min_by_key(|&p| load[p]).expect("t is nonzero")
            });
        assigned[slot].push(net_id);
        load[slot] += fanout;
    }
    assigned
}

/// Strict overlap area between a net box and a candidate piece.
fn overlap_area(net: &BBox, piece: &BBox) -> i64 {
    let w = net.x_max.min(piece.x_max) - net.x_min.max(piece.x_min);
    let h = net.y_max.min(piece.y_max) - net.y_min.max(piece.y_min);
    if w > 0 && h > 0 {
        w as i64 * h as i64
    } else {
        0
    }
}

/// Manhattan distance between box centers.
fn center_distance(net: &BBox, piece: &BBox) -> f64 {
    (net.x_center() - piece.x_center()).abs() + (net.y_center() - piece.y_center()).abs()
}
