//! The iteration driver.
//!
//! Owns the netlist state for the duration of routing and runs the
//! negotiated-congestion loop: pick a scheduling strategy, rip up and
//! reroute what needs it, raise the congestion cost factors, and stop once
//! no node is over capacity and no connection failed. Afterwards it routes
//! the direct connections and folds every connection path into per-node
//! routing results, repairing nets whose connection paths diverged.

use crate::astar::{ConnectionRouter, RouteCtx};
use crate::config::RouterConfig;
use crate::error::RouteError;
use crate::rptt::PartitionTree;
use crate::scratch::{ThreadScratch, NO_PREV};
use crate::sync::{OwnedTable, SharedCounters};
use log::{error, info, warn};
use potter_common::BBox;
use potter_device::{NodeId, RouteGraph, NODE_CAPACITY};
use potter_netlist::{
    ConnId, Connection, Net, NetId, NodeRouteResult, PhysicalNetlist,
};
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use std::time::Instant;

/// Overused-nodes-per-connection ratio above which a design counts as
/// congested after the first iteration.
const CONGESTED_DESIGN_RATIO: f64 = 0.45;
/// Overlap routing continues while congestion keeps dropping faster than
/// this ratio per iteration.
const MIN_DECREASE_RATIO: f64 = 0.2;
/// Overlap routing continues while the share ratio keeps growing faster
/// than this.
const MIN_SHARE_INCREASE_RATIO: f64 = 0.15;
/// Overlap routing is always attempted for the first iterations.
const ALWAYS_OVERLAP_ITERS: u32 = 3;
/// Pop budget of the direct-connection breadth-first search.
const DIRECT_SEARCH_WATCHDOG: u32 = 10_000;
/// Step budget of the multi-driver repair walk.
const REPAIR_WATCHDOG: u32 = 1_000_000;

/// The outcome of a routing run.
pub struct RoutingOutcome {
    /// The netlist, with per-connection paths committed.
    pub netlist: PhysicalNetlist,
    /// Per-node routing records for the netlist writer, indexed by node ID.
    pub results: Vec<NodeRouteResult>,
    /// Iterations executed.
    pub iterations: u32,
    /// Whether the congestion loop reached zero overuse and zero failures.
    pub converged: bool,
    /// Connections without a route after the final iteration.
    pub failed_connections: u32,
    /// Over-used nodes after the final iteration.
    pub overused_nodes: usize,
    /// Nets whose routing needed the shortest-path repair.
    pub repaired_nets: usize,
}

/// The parallel negotiated-congestion router.
pub struct Router<'g> {
    pub(crate) graph: &'g RouteGraph,
    pub(crate) cfg: RouterConfig,
    pub(crate) num_threads: usize,

    pub(crate) nets: OwnedTable<Net>,
    pub(crate) conns: OwnedTable<Connection>,
    pub(crate) direct_conns: Vec<Connection>,
    preserved_nodes: Vec<u32>,

    pub(crate) scratch: Vec<ThreadScratch>,
    pub(crate) shared: SharedCounters,
    pub(crate) sorted_conn_ids: Vec<ConnId>,

    pub(crate) iter: u32,
    pub(crate) stamp_base: u32,
    pub(crate) batch_stamp: i32,
    pub(crate) num_batches: usize,
    pub(crate) present_factor: f32,
    pub(crate) historical_factor: f32,
    pub(crate) present_multiplier: f32,
    pub(crate) is_congested_design: bool,
    pub(crate) use_overlap: bool,
    pub(crate) num_overused: usize,

    pub(crate) net_batches: Vec<Vec<Vec<NetId>>>,
    pub(crate) thread_nets: Vec<Vec<NetId>>,
    pub(crate) labeled_net_ids: Vec<NetId>,
    pub(crate) main_tree: Option<PartitionTree>,
    pub(crate) labeled_tree: Option<PartitionTree>,

    iterations_run: u32,
    converged: bool,
    repaired_nets: usize,
}

impl<'g> Router<'g> {
    /// Sets up the router: takes over the netlist and allocates the
    /// per-thread scratch arrays (once, in parallel; they are reused via
    /// stamp discrimination for the whole run).
    pub fn new(graph: &'g RouteGraph, netlist: PhysicalNetlist, cfg: RouterConfig) -> Self {
        let num_threads = cfg.num_threads.max(1);
        let num_nodes = graph.num_nodes();
        info!("allocating scratch for {num_threads} threads over {num_nodes} nodes");
        let scratch: Vec<ThreadScratch> = (0..num_threads)
            .into_par_iter()
            .map(|_| ThreadScratch::new(num_nodes))
            .collect();

        let PhysicalNetlist {
            nets,
            indirect_connections,
            direct_connections,
            preserved_nodes,
        } = netlist;

        Self {
            graph,
            present_factor: cfg.present_factor,
            historical_factor: cfg.historical_factor,
            present_multiplier: cfg.present_multiplier,
            cfg,
            num_threads,
            nets: OwnedTable::new(nets),
            conns: OwnedTable::new(indirect_connections),
            direct_conns: direct_connections,
            preserved_nodes,
            scratch,
            shared: SharedCounters::default(),
            sorted_conn_ids: Vec::new(),
            iter: 0,
            stamp_base: 0,
            batch_stamp: -1,
            num_batches: 1,
            is_congested_design: false,
            use_overlap: true,
            num_overused: 0,
            net_batches: Vec::new(),
            thread_nets: Vec::new(),
            labeled_net_ids: Vec::new(),
            main_tree: None,
            labeled_tree: None,
            iterations_run: 0,
            converged: false,
            repaired_nets: 0,
        }
    }

    /// Runs the complete routing flow.
    pub fn run(mut self) -> Result<RoutingOutcome, RouteError> {
        let start = Instant::now();
        self.route_indirect_connections()?;
        info!(
            "indirect routing finished in {:.2}s",
            start.elapsed().as_secs_f64()
        );
        self.route_direct_connections();
        let results = self.save_all_routing_solutions()?;
        info!("total routing time {:.2}s", start.elapsed().as_secs_f64());
        Ok(self.into_outcome(results))
    }

    /// Read-only pass context snapshotting the current factors and stamps.
    pub(crate) fn make_ctx(&self) -> RouteCtx<'_> {
        RouteCtx {
            graph: self.graph,
            cfg: &self.cfg,
            nets: &self.nets,
            conns: &self.conns,
            shared: &self.shared,
            present_factor: self.present_factor,
            stamp_base: self.stamp_base,
            batch_stamp: self.batch_stamp,
            iter: self.iter,
        }
    }

    // ---- iteration loop ----

    fn route_indirect_connections(&mut self) -> Result<(), RouteError> {
        info!("routing {} indirect connections", self.conns.len());

        self.update_connection_bboxes();
        self.sort_connections();
        self.reserve_sink_nodes()?;

        if self.num_threads > 1 {
            self.partition();

            let conns = self.conns.items();
            let mut bbox = BBox::empty();
            for conn in conns {
                bbox = bbox.union_with(&conn.bbox());
            }
            info!("connections bbox: {bbox}");
            let tree =
                PartitionTree::build(conns, self.sorted_conn_ids.clone(), bbox);
            info!("partition tree scheduled into {} levels", tree.num_scheduled_levels());
            self.main_tree = Some(tree);
        }

        info!(
            "{:>10} {:>14} {:>9} {:>19} {:>14} {:>14} {:>12} {:>12} {:>7}",
            "Iteration",
            "PFactor",
            "HFactor",
            "RoutedConnections",
            "OverlapNodes",
            "decreaseRatio",
            "shareRatio",
            "numBatches",
            "Times"
        );

        let num_conns = self.conns.len() as u32;
        let mut congest_ratio = 0.0f64;
        let mut decrease_ratio = 0.0f64;
        let mut last_overused = 0usize;
        let mut last_share = -10_000.0f64;
        let mut share = 0.0f64;

        for iter in 1..=self.cfg.max_iterations {
            let timer = Instant::now();
            self.iter = iter;
            self.iterations_run = iter;
            // Stamps must be unique across iterations; advance past every
            // connection ID.
            self.stamp_base = self.stamp_base.wrapping_add(num_conns + 1);
            self.shared.reset();

            let mut marker = ' ';
            if self.num_threads > 1 {
                let share_increase = (share - last_share) / last_share;
                if self.use_overlap
                    && (iter <= ALWAYS_OVERLAP_ITERS
                        || (decrease_ratio > MIN_DECREASE_RATIO
                            && share_increase > MIN_SHARE_INCREASE_RATIO))
                {
                    if self.cfg.runtime_first {
                        self.runtime_first_routing();
                    } else {
                        self.stable_first_routing();
                    }
                    marker = '*';
                } else {
                    self.use_overlap = false;
                    if let Some(tree) = self.main_tree.take() {
                        self.route_partition_tree(&tree);
                        self.main_tree = Some(tree);
                    }
                }
            } else {
                let ctx = self.make_ctx();
                let router = ConnectionRouter {
                    ctx: &ctx,
                    scratch: &self.scratch[0],
                };
                router.route_connections_unsync(&self.sorted_conn_ids);
            }
            if let Some(fatal) = self.shared.take_fatal() {
                return Err(fatal);
            }

            if iter == 1 {
                let overused = self.graph.overused_count();
                congest_ratio = overused as f64 / (num_conns.max(1)) as f64;
                self.is_congested_design = congest_ratio > CONGESTED_DESIGN_RATIO;
            }

            self.update_cost_factors();

            let decrease = last_overused as i64 - self.num_overused as i64;
            decrease_ratio = decrease as f64 / last_overused as f64;
            last_share = share;
            share = self.shared.routed() as f64 / self.num_overused as f64;
            last_overused = self.num_overused;

            info!(
                "{}{:>9} {:>14.6} {:>9.3} {:>19} {:>14} {:>14.2} {:>12.2} {:>12} {:>7.2}",
                marker,
                iter,
                self.present_factor,
                self.historical_factor,
                self.shared.routed(),
                self.num_overused,
                decrease_ratio,
                share,
                self.num_batches,
                timer.elapsed().as_secs_f64()
            );

            if self.num_overused == 0 && self.shared.failed() == 0 {
                self.converged = true;
                break;
            }
        }
        info!(
            "congest ratio: {congest_ratio:.3}, congested design: {}",
            self.is_congested_design
        );
        if !self.converged {
            error!(
                "{}",
                RouteError::ConvergenceFailure {
                    iterations: self.iterations_run,
                    overused: self.num_overused,
                    failed: self.shared.failed(),
                }
            );
        }
        Ok(())
    }

    /// Picks the per-mode net schedule before the first iteration.
    fn partition(&mut self) {
        if self.cfg.runtime_first {
            self.region_partition();
        } else {
            self.label_nets();
            self.kmeans_partition();
        }
    }

    /// Routes every leaf level of a partition tree; leaves on the same
    /// level run in parallel, connections inside a leaf serially.
    ///
    /// All leaf tasks share the first scratch array: same-level leaves have
    /// disjoint bounding boxes, so the scratch records they touch are
    /// disjoint.
    pub(crate) fn route_partition_tree(&self, tree: &PartitionTree) {
        let ctx = self.make_ctx();
        for level in tree.scheduled_levels() {
            level.par_iter().for_each(|&leaf| {
                let router = ConnectionRouter {
                    ctx: &ctx,
                    scratch: &self.scratch[0],
                };
                router.route_connections_unsync(&tree.node(leaf).conn_ids);
            });
        }
    }

    // ---- pre-processing ----

    /// Widens every indirect connection's bounding box by the configured
    /// margins, clipped to the device extent, and refreshes net geometry.
    fn update_connection_bboxes(&mut self) {
        let extent = self.graph.extent();
        let x_margin = self.cfg.x_margin;
        let y_margin = self.cfg.y_margin;
        let conns = self.conns.items_mut();
        let nets = self.nets.items_mut();

        for net in nets.iter_mut() {
            if net.fanout() == 0 {
                continue;
            }
            let (cx, cy) = net.center();
            net.set_bbox(BBox::new(cx as i32, cy as i32, cx as i32, cy as i32));

            let conn_ids: Vec<ConnId> = net.connections().to_vec();
            for conn_id in conn_ids {
                let conn = &mut conns[conn_id.index()];
                let b = conn.bbox();
                let mut x_min = b.x_min - x_margin;
                if x_min < 0 {
                    x_min = -1;
                }
                let x_max = (b.x_max + x_margin).min(extent.x_max);
                let mut y_min = b.y_min - y_margin;
                if y_min < 0 {
                    y_min = -1;
                }
                let y_max = (b.y_max + y_margin).min(extent.y_max);
                conn.set_bbox(BBox::new(x_min, y_min, x_max, y_max));

                net.update_bbox(x_min, y_min);
                net.update_bbox(x_max, y_max);
            }
            let b = net.bbox();
            let double_hpwl =
                2 * ((b.y_max - b.y_min + 1).abs() + (b.x_max - b.x_min + 1).abs());
            net.set_double_hpwl(double_hpwl.max(0));
        }
    }

    /// Orders connections by descending net fanout, then ascending HPWL.
    fn sort_connections(&mut self) {
        let conns = self.conns.items();
        let nets = self.nets.items();
        let mut ids: Vec<ConnId> = (0..conns.len() as u32).map(ConnId::from_raw).collect();
        ids.sort_by(|a, b| {
            let fa = nets[conns[a.index()].net().index()].fanout();
            let fb = nets[conns[b.index()].net().index()].fanout();
            fb.cmp(&fa)
                .then_with(|| conns[a.index()].hpwl().cmp(&conns[b.index()].hpwl()))
        });
        self.sorted_conn_ids = ids;
    }

    /// Reserves every sink as a user of its net before the first iteration,
    /// so a sink claimed by a foreign net shows up as congestion.
    fn reserve_sink_nodes(&mut self) -> Result<(), RouteError> {
        let present_factor = self.present_factor;
        let graph = self.graph;
        let conns = self.conns.items();
        let nets = self.nets.items_mut();
        for conn_id in &self.sorted_conn_ids {
            let conn = &conns[conn_id.index()];
            let sink = conn.sink();
            let net = &mut nets[conn.net().index()];
            let newly = net.increment_user(sink);
            let rnode = graph.node(sink);
            if newly {
                rnode.increment_occupancy();
            }
            rnode.update_present_cost(present_factor);
            if rnode.occupancy() > NODE_CAPACITY || net.count_users(sink) > 1 {
                return Err(RouteError::topology(format!(
                    "sink {sink} of connection {conn_id} is already reserved"
                )));
            }
        }
        Ok(())
    }

    // ---- congestion cost update ----

    /// Raises the congestion cost factors and refreshes every node's
    /// present cost, counting over-used nodes.
    fn update_cost_factors(&mut self) {
        if self.is_congested_design {
            let r = 1.0 / (1.0 + ((1.0 - self.iter as f64) * 0.5).exp());
            self.historical_factor = (2.0 * r) as f32;
            let r2 = 3.0 / (1.0 + (self.iter as f64 - 1.0).exp());
            self.present_multiplier = (1.1 * (1.0 + r2)) as f32;
        }
        self.present_factor =
            (self.present_factor * self.present_multiplier).min(self.cfg.max_present_factor);

        let pf = self.present_factor;
        let hf = self.historical_factor;
        self.num_overused = self
            .graph
            .nodes()
            .par_iter()
            .map(|node| {
                let overuse = node.occupancy() - NODE_CAPACITY;
                if overuse == 0 {
                    node.set_present_cost(1.0 + pf);
                    0usize
                } else if overuse > 0 {
                    node.set_present_cost(1.0 + (overuse + 1) as f32 * pf);
                    node.set_historical_cost(node.historical_cost() + overuse as f32 * hf);
                    1
                } else {
                    0
                }
            })
            .sum();
    }

    // ---- direct connections ----

    /// Routes connections that never enter the INT fabric with a bounded
    /// breadth-first search over the raw device adjacency.
    fn route_direct_connections(&mut self) {
        info!("routing {} direct connections", self.direct_conns.len());
        let graph = self.graph;
        let mut failures = 0usize;
        for conn in &mut self.direct_conns {
            let source = conn.source();
            let sink = conn.sink();

            if graph.raw_children(source).contains(&sink) {
                conn.push_path_node(sink);
                conn.push_path_node(source);
                conn.set_routed(true);
                continue;
            }

            let mut prevs: HashMap<NodeId, NodeId> = HashMap::new();
            prevs.insert(source, NO_PREV);
            let mut queue = VecDeque::new();
            queue.push_back(source);
            let mut watchdog = DIRECT_SEARCH_WATCHDOG as i64;
            let mut success = false;
            while let Some(cur) = queue.pop_front() {
                if cur == sink {
                    let mut node = cur;
                    while node != NO_PREV {
                        conn.push_path_node(node);
                        node = prevs[&node];
                    }
                    success = true;
                    break;
                }
                for &child in graph.raw_children(cur) {
                    if !prevs.contains_key(&child) {
                        prevs.insert(child, cur);
                        queue.push_back(child);
                    }
                }
                watchdog -= 1;
                if watchdog < 0 {
                    break;
                }
            }

            if success {
                conn.set_routed(true);
            } else {
                failures += 1;
                error!(
                    "{}",
                    RouteError::DirectConnectionUnreachable { conn: conn.id() }
                );
            }
        }
        info!(
            "direct routing finished, failures: {failures} / {}",
            self.direct_conns.len()
        );
    }

    // ---- result aggregation ----

    /// Folds all connection paths into per-node routing results.
    ///
    /// Runs per net in parallel, then merges serially so that a node claimed
    /// by two nets is caught as a fatal multi-driver violation.
    fn save_all_routing_solutions(&mut self) -> Result<Vec<NodeRouteResult>, RouteError> {
        info!("saving routing solutions");
        let graph = self.graph;
        let direct_conns = &self.direct_conns;
        let conns = self.conns.items();
        let nets = self.nets.items();

        let per_net: Vec<Result<Option<NetRouting>, RouteError>> = nets
            .par_iter()
            .map(|net| collect_net_routing(graph, net, conns, direct_conns))
            .collect();

        let mut results = vec![NodeRouteResult::default(); graph.num_nodes()];
        let mut repaired = 0usize;
        for routing in per_net {
            let Some(routing) = routing? else { continue };
            if routing.repaired {
                repaired += 1;
            }
            for &node in &routing.claimed {
                match results[node.index()].net {
                    Some(other) if other != routing.net => {
                        return Err(RouteError::MultiDriverViolation {
                            node,
                            first: other,
                            second: routing.net,
                        });
                    }
                    _ => results[node.index()].net = Some(routing.net),
                }
            }
            for (from, branches) in routing.edges {
                for to in branches {
                    results[from.index()].add_branch(to);
                }
            }
        }
        info!("repaired nets: {repaired} / {}", nets.len());
        self.repaired_nets = repaired;
        Ok(results)
    }

    fn into_outcome(self, results: Vec<NodeRouteResult>) -> RoutingOutcome {
        let netlist = PhysicalNetlist {
            nets: self.nets.into_inner(),
            indirect_connections: self.conns.into_inner(),
            direct_connections: self.direct_conns,
            preserved_nodes: self.preserved_nodes,
        };
        RoutingOutcome {
            netlist,
            results,
            iterations: self.iterations_run,
            converged: self.converged,
            failed_connections: self.shared.failed(),
            overused_nodes: self.num_overused,
            repaired_nets: self.repaired_nets,
        }
    }
}

/// One net's contribution to the global routing results.
struct NetRouting {
    net: NetId,
    claimed: Vec<NodeId>,
    edges: HashMap<NodeId, Vec<NodeId>>,
    repaired: bool,
}

/// Builds a net's branch graph from its connection paths, repairing it when
/// connections disagree on how to reach shared territory.
fn collect_net_routing(
    graph: &RouteGraph,
    net: &Net,
    conns: &[Connection],
    direct_conns: &[Connection],
) -> Result<Option<NetRouting>, RouteError> {
    let mut claimed: HashSet<NodeId> = HashSet::new();
    let mut edges: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    let mut multi_driver = false;

    let mut add_path = |path: &[NodeId],
                        claimed: &mut HashSet<NodeId>,
                        edges: &mut HashMap<NodeId, Vec<NodeId>>| {
        for pair in path.windows(2) {
            let list = edges.entry(pair[0]).or_default();
            if !list.contains(&pair[1]) {
                list.push(pair[1]);
            }
        }
        for &node in path {
            if !claimed.insert(node) {
                multi_driver = true;
            }
        }
    };

    for conn_id in net.connections() {
        let conn = &conns[conn_id.index()];
        if conn.path().len() < 2 {
            warn!("skipping unrouted {conn} while saving results");
            continue;
        }
        // Source pin projection, INT path (reversed to source-first), sink
        // pin projection.
        let mut total: Vec<NodeId> = conn.source_to_int().to_vec();
        let int_source = *conn.path().last().expect("path checked non-empty");
        match total.last() {
            None => total.push(int_source),
            Some(&last) => {
                if last != int_source {
                    return Err(RouteError::topology(format!(
                        "source projection of {conn} does not meet its INT path"
                    )));
                }
            }
        }
        for &node in conn.path().iter().rev().skip(1) {
            total.push(node);
        }
        let suffix = conn.int_to_sink();
        if !suffix.is_empty() {
            if suffix[0] != *total.last().expect("total path non-empty") {
                return Err(RouteError::topology(format!(
                    "sink projection of {conn} does not meet its INT path"
                )));
            }
            total.extend_from_slice(&suffix[1..]);
        }
        add_path(&total, &mut claimed, &mut edges);
    }

    for conn_id in net.direct_connections() {
        let conn = &direct_conns[conn_id.index()];
        if conn.path().len() < 2 {
            warn!("skipping unrouted {conn} while saving results");
            continue;
        }
        let forward: Vec<NodeId> = conn.path().iter().rev().copied().collect();
        add_path(&forward, &mut claimed, &mut edges);
    }

    if claimed.is_empty() {
        return Ok(None);
    }

    let repaired = multi_driver;
    if multi_driver {
        fix_net_routes(graph, net, &mut claimed, &mut edges)?;
    }

    Ok(Some(NetRouting {
        net: net.id(),
        claimed: claimed.into_iter().collect(),
        edges,
        repaired,
    }))
}

/// Entry of the repair Dijkstra's queue, reversed for a min-heap.
struct RepairEntry {
    cost: f64,
    node: NodeId,
}

impl PartialEq for RepairEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cost == other.cost
    }
}

impl Eq for RepairEntry {}

impl Ord for RepairEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .partial_cmp(&self.cost)
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for RepairEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Collapses a net's branch graph onto the shortest-path tree from its
/// source pin, dropping every node and edge that no sink path uses.
fn fix_net_routes(
    graph: &RouteGraph,
    net: &Net,
    claimed: &mut HashSet<NodeId>,
    edges: &mut HashMap<NodeId, Vec<NodeId>>,
) -> Result<(), RouteError> {
    let use_indirect = !net.connections().is_empty();
    let source = if use_indirect {
        net.indirect_source_pin().or(net.indirect_source())
    } else {
        net.direct_source_pin()
    }
    .filter(|n| claimed.contains(n))
    .ok_or_else(|| {
        RouteError::topology(format!("net {} lost its source pin while saving", net.id()))
    })?;
    let sink_pins: Vec<NodeId> = if use_indirect {
        let pins = if net.indirect_sink_pins().is_empty() {
            net.indirect_sinks()
        } else {
            net.indirect_sink_pins()
        };
        pins.iter().copied().filter(|n| claimed.contains(n)).collect()
    } else {
        net.direct_sink_pins()
            .iter()
            .copied()
            .filter(|n| claimed.contains(n))
            .collect()
    };

    let mut dist: HashMap<NodeId, f64> = claimed.iter().map(|&n| (n, f64::INFINITY)).collect();
    let mut prevs: HashMap<NodeId, NodeId> = HashMap::new();
    let mut heap = BinaryHeap::new();
    dist.insert(source, 0.0);
    heap.push(RepairEntry {
        cost: 0.0,
        node: source,
    });

    let mut watchdog = 0u32;
    while let Some(entry) = heap.pop() {
        if entry.cost > dist[&entry.node] {
            continue;
        }
        watchdog += 1;
        if watchdog > REPAIR_WATCHDOG {
            return Err(RouteError::topology(format!(
                "repair of net {} does not terminate",
                net.id()
            )));
        }
        let Some(children) = edges.get(&entry.node) else {
            continue;
        };
        for &child in children {
            let cost = entry.cost + graph.node(child).base_cost() as f64;
            if cost < *dist.get(&child).unwrap_or(&f64::INFINITY) {
                dist.insert(child, cost);
                prevs.insert(child, entry.node);
                heap.push(RepairEntry { cost, node: child });
            }
        }
    }

    let mut in_route: HashSet<NodeId> = HashSet::new();
    for sink in sink_pins {
        let mut node = sink;
        let mut watchdog = 0u32;
        while node != source {
            in_route.insert(node);
            node = *prevs.get(&node).ok_or_else(|| {
                RouteError::topology(format!(
                    "sink {sink} of net {} is unreachable after repair",
                    net.id()
                ))
            })?;
            watchdog += 1;
            if watchdog > REPAIR_WATCHDOG {
                return Err(RouteError::topology(format!(
                    "repair walk of net {} does not terminate",
                    net.id()
                )));
            }
        }
    }

    edges.clear();
    for &node in &in_route {
        edges.entry(prevs[&node]).or_default().push(node);
    }
    claimed.retain(|n| *n == source || in_route.contains(n));
    Ok(())
}
