//! Potter — the command-line interface of the parallel FPGA router.
//!
//! Loads a projected device description and an unrouted physical netlist,
//! routes every signal connection through the routing-resource graph, and
//! writes the routed netlist back out.

#![warn(missing_docs)]

use clap::Parser;
use log::{error, info, warn, LevelFilter};
use potter_device::{DeviceSource, RouteGraph};
use potter_netlist::{read_netlist, write_routed_netlist};
use potter_route::{route, RouterConfig};
use std::path::PathBuf;
use std::process;

/// An open-source high-concurrency parallel router for UltraScale FPGAs.
#[derive(Parser, Debug)]
#[command(name = "potter", version, about)]
pub struct Cli {
    /// The input (unrouted) physical netlist.
    #[arg(short, long)]
    pub input: PathBuf,

    /// The output (routed) physical netlist.
    #[arg(short, long)]
    pub output: PathBuf,

    /// The device file.
    #[arg(short, long, default_value = "xcvu3p.device")]
    pub device: PathBuf,

    /// The number of worker threads.
    #[arg(short, long, default_value_t = 32)]
    pub thread: usize,

    /// Use the runtime-first (throughput-oriented) scheduler instead of the
    /// stable-first (deterministic) one.
    #[arg(short, long)]
    pub runtime_first: bool,

    /// Path to a TOML file with router parameters.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose (debug-level) output.
    #[arg(short, long)]
    pub verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    pub quiet: bool,
}

fn main() {
    let cli = Cli::parse();
    let level = if cli.quiet {
        LevelFilter::Error
    } else if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    pretty_env_logger::formatted_builder()
        .filter_level(level)
        .init();

    if let Err(err) = run(&cli) {
        error!("{err}");
        process::exit(1);
    }
}

/// The routing pipeline: load device, load netlist, build the graph, route,
/// write the result.
fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    info!("input:         {}", cli.input.display());
    info!("output:        {}", cli.output.display());
    info!("device:        {}", cli.device.display());
    info!("threads:       {}", cli.thread);
    info!("runtime first: {}", cli.runtime_first);

    let mut config = match &cli.config {
        Some(path) => RouterConfig::load(path)?,
        None => RouterConfig::default(),
    };
    config.num_threads = cli.thread.max(1);
    config.runtime_first = cli.runtime_first;

    rayon::ThreadPoolBuilder::new()
        .num_threads(config.num_threads)
        .build_global()?;

    let device = DeviceSource::load(&cli.device)?;
    device.validate()?;
    let netlist = read_netlist(&cli.input)?;
    info!(
        "loaded {} nodes, {} nets, {} indirect / {} direct connections",
        device.node_count(),
        netlist.num_nets(),
        netlist.num_indirect(),
        netlist.direct_connections.len()
    );

    let preserved = netlist.preserved_flags(device.node_count());
    let pins = netlist.pin_flags(device.node_count());
    let graph = RouteGraph::build(device, &preserved, &pins);

    let outcome = route(&graph, netlist, config)?;
    if outcome.converged {
        info!("routing converged after {} iterations", outcome.iterations);
    } else {
        warn!(
            "writing best-effort result: {} overused nodes, {} failed connections",
            outcome.overused_nodes, outcome.failed_connections
        );
    }

    write_routed_netlist(&cli.output, &outcome.netlist, &outcome.results)?;
    info!("wrote {}", cli.output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use potter_common::BBox;
    use potter_device::{DeviceNodeRecord, NodeId, NodeType};
    use potter_netlist::{ConnId, Connection, Net, NetId, PhysicalNetlist};

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

    /// End-to-end: a one-net device and netlist on disk route to a valid
    /// output container.
    #[test]
    fn pipeline_routes_trivial_netlist() {
        let dir = tempfile::tempdir().unwrap();
        let device_path = dir.path().join("tiny.device");
        let input_path = dir.path().join("in.phys");
        let output_path = dir.path().join("out.phys");

        let device = DeviceSource {
            extent: BBox::new(0, 0, 10, 10),
            nodes: vec![
                record(1, 1, NodeType::PinfeedO, vec![1]),
                record(1, 1, NodeType::Wire, vec![2]),
                record(2, 1, NodeType::PinfeedI, vec![]),
            ],
        };
        device.save(&device_path).unwrap();

        let mut net = Net::new(NetId::from_raw(0), 0);
        net.set_indirect_source(NodeId::from_raw(0));
        net.add_indirect_sink(NodeId::from_raw(2));
        net.set_center(1.5, 1.0);
        net.add_connection(ConnId::from_raw(0));
        let conn = Connection::new(
            ConnId::from_raw(0),
            NetId::from_raw(0),
            NodeId::from_raw(0),
            NodeId::from_raw(2),
            BBox::new(1, 1, 2, 1),
        );
        let netlist = PhysicalNetlist {
            nets: vec![net],
            indirect_connections: vec![conn],
            direct_connections: vec![],
            preserved_nodes: vec![],
        };
        let bytes =
            bincode::serde::encode_to_vec(&netlist, bincode::config::standard()).unwrap();
        std::fs::write(&input_path, bytes).unwrap();

        let cli = Cli {
            input: input_path,
            output: output_path.clone(),
            device: device_path,
            thread: 1,
            runtime_first: false,
            config: None,
            verbose: false,
            quiet: true,
        };
        run(&cli).unwrap();

        let routed = potter_netlist::io::read_routed_netlist(&output_path).unwrap();
        assert_eq!(routed.netlist.num_nets(), 1);
        assert!(!routed.routing.is_empty());
    }

    #[test]
    fn cli_parses_short_flags() {
        let cli = Cli::parse_from([
            "potter", "-i", "a.phys", "-o", "b.phys", "-d", "x.device", "-t", "8", "-r",
        ]);
        assert_eq!(cli.thread, 8);
        assert!(cli.runtime_first);
        assert_eq!(cli.device, PathBuf::from("x.device"));
    }

    #[test]
    fn cli_requires_input_and_output() {
        assert!(Cli::try_parse_from(["potter", "-i", "a.phys"]).is_err());
        assert!(Cli::try_parse_from(["potter", "-o", "b.phys"]).is_err());
    }
}
