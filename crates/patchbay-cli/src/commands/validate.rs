//! Load a graph document and report on it.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use patchbay_config::load_graph;

use super::common;

#[derive(Args)]
pub struct ValidateArgs {
    /// Graph document (path or saved patch name)
    graph: PathBuf,

    /// Engine config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Fail if any connection or node would be dropped or ignored
    #[arg(long)]
    strict: bool,
}

pub fn run(args: ValidateArgs) -> anyhow::Result<()> {
    let config = common::load_config(args.config.as_deref())?;
    let registry = common::registry(&config);
    let path = common::resolve_patch(&args.graph);

    let report =
        load_graph(&path, &registry).with_context(|| format!("loading {}", path.display()))?;

    println!("Graph: {}", path.display());
    println!("  Nodes:       {}", report.graph.nodes.len());
    println!("  Connections: {}", report.graph.connections.len());

    let unknown: Vec<_> = report
        .graph
        .nodes
        .iter()
        .filter(|node| registry.get(&node.node_type).is_none())
        .collect();
    for node in &unknown {
        println!("  unknown type: {} ({})", node.id, node.node_type);
    }

    if report.dropped.is_empty() {
        println!("  No connections dropped");
    } else {
        println!("  Dropped {} connection(s):", report.dropped.len());
        for dropped in &report.dropped {
            println!("    {}  {}", dropped.connection.key(), dropped.reason);
        }
    }

    if args.strict && (!report.is_clean() || !unknown.is_empty()) {
        anyhow::bail!("graph is not clean");
    }
    Ok(())
}
