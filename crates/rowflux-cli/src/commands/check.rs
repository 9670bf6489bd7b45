use std::path::Path;

use anyhow::{Context, Result};

use rowflux_engine::config::{parser, validator};
use rowflux_engine::StageRegistry;

/// Execute the `check` command: parse and validate a pipeline definition,
/// including stage-kind resolution, without running it.
pub fn execute(pipeline_path: &Path) -> Result<()> {
    let graph = parser::parse_graph(pipeline_path)
        .with_context(|| format!("Failed to parse pipeline: {}", pipeline_path.display()))?;

    validator::validate_graph(&graph)?;

    let registry = StageRegistry::builtin();
    let unknown: Vec<&str> = graph
        .stages
        .iter()
        .filter(|s| !registry.contains(&s.kind))
        .map(|s| s.kind.as_str())
        .collect();
    if !unknown.is_empty() {
        anyhow::bail!(
            "Pipeline '{}' references stage kinds not available to the CLI: {}",
            graph.name,
            unknown.join(", ")
        );
    }

    println!("Pipeline '{}' is valid.", graph.name);
    println!("  Stages: {}", graph.stages.len());
    println!("  Hops:   {}", graph.hops.len());
    for stage in &graph.stages {
        println!("    {} ({} x{})", stage.name, stage.kind, stage.copies);
    }
    Ok(())
}
