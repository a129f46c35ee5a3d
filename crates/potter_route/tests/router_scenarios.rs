//! End-to-end routing scenarios on hand-built devices.
//!
//! Reproducibility assertions compare node-ID path vectors, never floating
//! costs.

use potter_common::BBox;
use potter_device::{DeviceNodeRecord, DeviceSource, NodeId, NodeType, RouteGraph};
use potter_netlist::{ConnId, Connection, Net, NetId, PhysicalNetlist};
use potter_route::{route, RouterConfig};

fn record(x: i16, y: i16, node_type: NodeType, children: Vec<u32>) -> DeviceNodeRecord {
    DeviceNodeRecord {
        begin_x: x,
        begin_y: y,
        end_x: x,
        end_y: y,
        length: 1,
        base_cost: 0.4,
        node_type,
        is_pin_bounce: false,
        is_accessible_wire: false,
        in_allowed_tile: true,
        children,
    }
}

/// Builds a netlist of indirect nets given `(source, sinks)` node pairs,
/// with centers and connection boxes derived from the node coordinates.
fn make_netlist(device: &DeviceSource, specs: &[(u32, Vec<u32>)]) -> PhysicalNetlist {
    let mut nets = Vec::new();
    let mut conns = Vec::new();
    for (ni, (source, sinks)) in specs.iter().enumerate() {
        let net_id = NetId::from_raw(ni as u32);
        let mut net = Net::new(net_id, ni as u32);
        net.set_indirect_source(NodeId::from_raw(*source));

        let coord = |n: u32| {
            let rec = &device.nodes[n as usize];
            (rec.end_x as f64, rec.end_y as f64)
        };
        let (sx, sy) = coord(*source);
        let mut cx = sx;
        let mut cy = sy;
        for &s in sinks {
            let (tx, ty) = coord(s);
            cx += tx;
            cy += ty;
        }
        cx /= (sinks.len() + 1) as f64;
        cy /= (sinks.len() + 1) as f64;
        net.set_center(cx, cy);

        for &s in sinks {
            let conn_id = ConnId::from_raw(conns.len() as u32);
            net.add_indirect_sink(NodeId::from_raw(s));
            net.add_connection(conn_id);
            let (tx, ty) = coord(s);
            let mut bbox = BBox::empty();
            bbox.update(sx as i32, sy as i32);
            bbox.update(tx as i32, ty as i32);
            bbox.update(cx as i32, cy as i32);
            conns.push(Connection::new(
                conn_id,
                net_id,
                NodeId::from_raw(*source),
                NodeId::from_raw(s),
                bbox,
            ));
        }
        nets.push(net);
    }
    PhysicalNetlist {
        nets,
        indirect_connections: conns,
        direct_connections: Vec::new(),
        preserved_nodes: Vec::new(),
    }
}

fn build_graph(device: DeviceSource, netlist: &PhysicalNetlist) -> RouteGraph {
    let preserved = netlist.preserved_flags(device.node_count());
    let pins = netlist.pin_flags(device.node_count());
    RouteGraph::build(device, &preserved, &pins)
}

fn config(threads: usize, runtime_first: bool) -> RouterConfig {
    RouterConfig {
        num_threads: threads,
        runtime_first,
        ..RouterConfig::default()
    }
}

fn assert_path_valid(graph: &RouteGraph, conn: &Connection) {
    let path = conn.path();
    assert!(path.len() >= 2, "{conn} has no usable path");
    assert_eq!(path[0], conn.sink());
    assert_eq!(*path.last().unwrap(), conn.source());
    for pair in path.windows(2) {
        assert!(
            graph.node(pair[1]).children().contains(&pair[0]),
            "{} -> {} is not an edge",
            pair[1],
            pair[0]
        );
    }
    let bbox = conn.bbox();
    for &n in path {
        let node = graph.node(n);
        assert!(
            (node.end_x() as i32) > bbox.x_min && (node.end_x() as i32) < bbox.x_max,
            "node {n} escapes {bbox} horizontally"
        );
        assert!(
            (node.end_y() as i32) > bbox.y_min && (node.end_y() as i32) < bbox.y_max,
            "node {n} escapes {bbox} vertically"
        );
    }
}

#[test]
fn trivial_two_node_net() {
    let device = DeviceSource {
        extent: BBox::new(0, 0, 10, 10),
        nodes: vec![
            record(1, 1, NodeType::PinfeedO, vec![1]),
            record(2, 1, NodeType::PinfeedI, vec![]),
        ],
    };
    let netlist = make_netlist(&device, &[(0, vec![1])]);
    let graph = build_graph(device, &netlist);

    let outcome = route(&graph, netlist, config(1, false)).unwrap();
    assert!(outcome.converged);
    assert_eq!(outcome.iterations, 1);
    assert_eq!(outcome.overused_nodes, 0);
    let conn = &outcome.netlist.indirect_connections[0];
    assert_eq!(conn.path(), &[NodeId::from_raw(1), NodeId::from_raw(0)]);
    assert_eq!(graph.overused_count(), 0);
}

#[test]
fn forced_contention_reroutes_via_alternate() {
    // Nets A (node 0 -> 4) and B (node 1 -> 5) both want node 2; only A has
    // the pricier alternate node 3.
    let mut nodes = vec![
        record(0, 0, NodeType::PinfeedO, vec![2, 3]),
        record(0, 2, NodeType::PinfeedO, vec![2]),
        record(1, 1, NodeType::Wire, vec![4, 5]),
        record(1, 0, NodeType::Wire, vec![4]),
        record(2, 0, NodeType::PinfeedI, vec![]),
        record(2, 2, NodeType::PinfeedI, vec![]),
    ];
    nodes[3].base_cost = 1.5;
    let device = DeviceSource {
        extent: BBox::new(0, 0, 10, 10),
        nodes,
    };
    let netlist = make_netlist(&device, &[(0, vec![4]), (1, vec![5])]);
    let graph = build_graph(device, &netlist);

    let outcome = route(&graph, netlist, config(1, false)).unwrap();
    assert!(outcome.converged);
    assert!(
        outcome.iterations <= 5,
        "took {} iterations",
        outcome.iterations
    );
    assert_eq!(outcome.overused_nodes, 0);

    let conn_a = &outcome.netlist.indirect_connections[0];
    let conn_b = &outcome.netlist.indirect_connections[1];
    assert_path_valid(&graph, conn_a);
    assert_path_valid(&graph, conn_b);
    // B has no choice; A must end up on the alternate.
    assert!(conn_b.path().contains(&NodeId::from_raw(2)));
    assert!(conn_a.path().contains(&NodeId::from_raw(3)));
    assert_eq!(graph.overused_count(), 0);
}

/// Four spatially separated nets, each with a cheap and a pricey route.
fn separated_nets_device() -> (DeviceSource, Vec<(u32, Vec<u32>)>) {
    let mut nodes = Vec::new();
    let mut specs = Vec::new();
    for i in 0..4u32 {
        let base = i * 4;
        let (ox, oy) = ((i % 2) as i16 * 30, (i / 2) as i16 * 30);
        // source -> {cheap, pricey} -> sink
        nodes.push(record(ox, oy, NodeType::PinfeedO, vec![base + 1, base + 2]));
        nodes.push(record(ox + 1, oy, NodeType::Wire, vec![base + 3]));
        let mut pricey = record(ox + 1, oy + 1, NodeType::Wire, vec![base + 3]);
        pricey.base_cost = 2.0;
        nodes.push(pricey);
        nodes.push(record(ox + 2, oy, NodeType::PinfeedI, vec![]));
        specs.push((base, vec![base + 3]));
    }
    (
        DeviceSource {
            extent: BBox::new(0, 0, 40, 40),
            nodes,
        },
        specs,
    )
}

#[test]
fn stable_first_paths_are_thread_count_independent() {
    let (device, specs) = separated_nets_device();
    let netlist = make_netlist(&device, &specs);

    let mut all_paths = Vec::new();
    for threads in [2usize, 4] {
        let graph = build_graph(device.clone(), &netlist);
        let outcome = route(&graph, netlist.clone(), config(threads, false)).unwrap();
        assert!(outcome.converged);
        for conn in &outcome.netlist.indirect_connections {
            assert_path_valid(&graph, conn);
        }
        let paths: Vec<Vec<NodeId>> = outcome
            .netlist
            .indirect_connections
            .iter()
            .map(|c| c.path().to_vec())
            .collect();
        all_paths.push(paths);
    }
    assert_eq!(
        all_paths[0], all_paths[1],
        "stable-first paths must not depend on the thread count"
    );
}

#[test]
fn direct_connection_uses_adjacency_shortcut() {
    // Source and sink share a tile outside the INT fabric.
    let mut source = record(4, 4, NodeType::PinfeedO, vec![1]);
    source.in_allowed_tile = false;
    let mut sink = record(4, 4, NodeType::PinfeedI, vec![]);
    sink.in_allowed_tile = false;
    let device = DeviceSource {
        extent: BBox::new(0, 0, 10, 10),
        nodes: vec![source, sink],
    };

    let mut net = Net::new(NetId::from_raw(0), 0);
    net.set_direct_source_pin(NodeId::from_raw(0));
    net.add_direct_sink_pin(NodeId::from_raw(1));
    net.add_direct_connection(ConnId::from_raw(0));
    let conn = Connection::new(
        ConnId::from_raw(0),
        NetId::from_raw(0),
        NodeId::from_raw(0),
        NodeId::from_raw(1),
        BBox::new(4, 4, 4, 4),
    );
    let netlist = PhysicalNetlist {
        nets: vec![net],
        indirect_connections: Vec::new(),
        direct_connections: vec![conn],
        preserved_nodes: Vec::new(),
    };
    let graph = build_graph(device, &netlist);

    let outcome = route(&graph, netlist, config(1, false)).unwrap();
    assert!(outcome.converged);
    let conn = &outcome.netlist.direct_connections[0];
    assert_eq!(conn.path(), &[NodeId::from_raw(1), NodeId::from_raw(0)]);

    // The writer-facing results claim both nodes for the net.
    assert_eq!(outcome.results[0].net, Some(NetId::from_raw(0)));
    assert_eq!(outcome.results[0].branches, vec![NodeId::from_raw(1)]);
    assert_eq!(outcome.results[1].net, Some(NetId::from_raw(0)));
}

#[test]
fn multi_driver_net_is_collapsed_to_one_branch() {
    // Two sinks whose connection paths share the detour through node 3.
    let device = DeviceSource {
        extent: BBox::new(0, 0, 10, 10),
        nodes: vec![
            record(0, 0, NodeType::PinfeedO, vec![1, 2]),
            record(1, 0, NodeType::Wire, vec![3]),
            record(1, 2, NodeType::Wire, vec![3]),
            record(2, 1, NodeType::Wire, vec![4, 5]),
            record(3, 0, NodeType::PinfeedI, vec![]),
            record(3, 1, NodeType::PinfeedI, vec![]),
        ],
    };
    let netlist = make_netlist(&device, &[(0, vec![4, 5])]);
    let graph = build_graph(device, &netlist);

    let outcome = route(&graph, netlist, config(1, false)).unwrap();
    assert!(outcome.converged);
    assert_eq!(outcome.repaired_nets, 1);

    // Node 3 feeds both sinks exactly once; only one of the entries 1/2
    // survives the shortest-path repair.
    let mut branches = outcome.results[3].branches.clone();
    branches.sort_by_key(|n| n.as_raw());
    assert_eq!(branches, vec![NodeId::from_raw(4), NodeId::from_raw(5)]);
    let entry_claims = [1usize, 2]
        .iter()
        .filter(|&&n| outcome.results[n].net.is_some())
        .count();
    assert_eq!(entry_claims, 1, "repair must keep a single entry into node 3");
    for sink in [4usize, 5] {
        assert_eq!(outcome.results[sink].net, Some(NetId::from_raw(0)));
    }
}

/// Six nets share one cheap middle node but each has a private fallback.
fn contended_middle_device() -> (DeviceSource, Vec<(u32, Vec<u32>)>) {
    let mut nodes = Vec::new();
    let mut specs = Vec::new();
    let middle = 18u32; // after 6 * (source, private, sink)
    for i in 0..6u32 {
        let y = (i * 2) as i16;
        let base = i * 3;
        nodes.push(record(0, y, NodeType::PinfeedO, vec![base + 1, middle]));
        let mut private = record(1, y, NodeType::Wire, vec![base + 2]);
        private.base_cost = 0.9;
        nodes.push(private);
        nodes.push(record(10, y, NodeType::PinfeedI, vec![]));
        specs.push((base, vec![base + 2]));
    }
    let mut shared = record(5, 5, NodeType::Wire, (0..6).map(|i| i * 3 + 2).collect());
    shared.base_cost = 0.05;
    nodes.push(shared);
    (
        DeviceSource {
            extent: BBox::new(0, 0, 15, 15),
            nodes,
        },
        specs,
    )
}

#[test]
fn small_contended_design_converges_quickly() {
    let (device, specs) = contended_middle_device();
    let netlist = make_netlist(&device, &specs);
    let graph = build_graph(device, &netlist);

    let outcome = route(&graph, netlist, config(1, false)).unwrap();
    assert!(outcome.converged);
    assert!(
        outcome.iterations <= 20,
        "took {} iterations",
        outcome.iterations
    );
    assert_eq!(outcome.overused_nodes, 0);
    assert_eq!(outcome.failed_connections, 0);
    assert_eq!(graph.overused_count(), 0);
    for conn in &outcome.netlist.indirect_connections {
        assert_path_valid(&graph, conn);
    }
}

#[test]
fn parallel_modes_also_converge_on_contention() {
    for runtime_first in [false, true] {
        let (device, specs) = contended_middle_device();
        let netlist = make_netlist(&device, &specs);
        let graph = build_graph(device, &netlist);

        let outcome = route(&graph, netlist, config(4, runtime_first)).unwrap();
        assert!(outcome.converged, "runtime_first={runtime_first}");
        assert_eq!(outcome.overused_nodes, 0);
        for conn in &outcome.netlist.indirect_connections {
            assert_path_valid(&graph, conn);
        }

        // Occupancy agrees with the per-net user maps.
        for net in &outcome.netlist.nets {
            for (&node, &count) in net.users() {
                assert!(count > 0);
                assert!(graph.node(node).occupancy() > 0);
            }
        }
    }
}

#[test]
fn historical_cost_never_decreases() {
    let (device, specs) = contended_middle_device();
    let netlist = make_netlist(&device, &specs);
    let graph = build_graph(device, &netlist);
    let outcome = route(&graph, netlist, config(1, false)).unwrap();
    assert!(outcome.converged);
    // Congested nodes accumulated history; nobody fell below the initial 1.
    for node in graph.nodes() {
        assert!(node.historical_cost() >= 1.0);
    }
}
