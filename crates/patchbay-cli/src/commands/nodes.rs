//! List node types and their default ports.

use clap::Args;
use patchbay_core::{NodeState, PortDirection};
use patchbay_engine::NodeRegistry;

#[derive(Args)]
pub struct NodesArgs {
    /// Show details for a single node type
    type_id: Option<String>,
}

pub fn run(args: NodesArgs) -> anyhow::Result<()> {
    let registry = NodeRegistry::new();

    if let Some(type_id) = args.type_id {
        let Some(desc) = registry.get(&type_id) else {
            anyhow::bail!("unknown node type '{type_id}'");
        };
        println!("{} ({})", desc.name, desc.type_id);
        println!("  {}", desc.description);
        println!("  Category: {}", desc.category.name());
        println!();
        println!("  Ports (default state):");
        for port in (desc.ports)(&NodeState::new()) {
            let dir = match port.direction {
                PortDirection::Input => "in ",
                PortDirection::Output => "out",
            };
            println!(
                "    {dir}  {:<14} {:<10} {}",
                port.id.to_string(),
                port.kind.to_string(),
                port.name
            );
        }
        return Ok(());
    }

    println!("Available Node Types");
    println!("====================\n");
    for desc in registry.all_types() {
        println!(
            "  {:<14} {:<11} {}",
            desc.type_id,
            desc.category.name(),
            desc.description
        );
    }
    println!("\nUse 'patchbay nodes <type>' for port details.");
    Ok(())
}
