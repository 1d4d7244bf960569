//! Plan command - resolve a topology and print its steps in order.

use eyre::{Result, WrapErr};
use isthmus_topology::ResolvedTopology;
use tracing::info;

use crate::cli::PlanArgs;
use crate::config::IsthmusConfig;

pub fn run(args: PlanArgs, config: IsthmusConfig) -> Result<()> {
    let mut resolver = config.resolver;
    args.resolver.apply(&mut resolver);

    let topology = super::resolve(&args.topology, resolver)?;
    info!(steps = topology.plan.len(), stages = topology.plan.stages().len(), "Plan ready");

    if args.json {
        let json = serde_json::to_string_pretty(&topology.plan).wrap_err("Failed to encode plan")?;
        println!("{json}");
    } else {
        print!("{}", render(&topology));
    }
    Ok(())
}

/// Human-readable plan, one stage per block.
pub fn render(topology: &ResolvedTopology) -> String {
    let mut out = format!("topology {}\n", topology.name);
    let mut position = 0;
    for (stage, ids) in topology.plan.stages().iter().enumerate() {
        out.push_str(&format!("\nstage {stage}\n"));
        for id in ids {
            let Some(intent) = topology.plan.get(id) else {
                continue;
            };
            position += 1;
            out.push_str(&format!(
                "  {position:>3}  {:<13} {}  [{}]\n",
                intent.kind.to_string(),
                intent.id,
                intent.placement
            ));
            for slot in &intent.references {
                out.push_str(&format!(
                    "         {} <- {}.{}\n",
                    slot.attribute, slot.producer, slot.output
                ));
            }
        }
    }
    out
}
