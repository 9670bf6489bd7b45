use std::path::Path;

use anyhow::{Context, Result};

use rowflux_engine::config::{parser, validator};
use rowflux_engine::{start, StageRegistry};

/// Execute the `run` command: parse, validate, and run a pipeline.
pub async fn execute(pipeline_path: &Path) -> Result<()> {
    // 1. Parse pipeline YAML
    let graph = parser::parse_graph(pipeline_path)
        .with_context(|| format!("Failed to parse pipeline: {}", pipeline_path.display()))?;

    // 2. Validate
    validator::validate_graph(&graph)?;

    tracing::info!(
        pipeline = graph.name,
        stages = graph.stages.len(),
        hops = graph.hops.len(),
        queue_capacity = graph.queue_capacity,
        "Pipeline validated"
    );

    // 3. Run
    let registry = StageRegistry::builtin();
    let mut handle = start(&graph, &registry).await?;
    let result = handle.await_completion().await;

    println!(
        "Pipeline '{}' {}.",
        graph.name,
        if result.success { "completed successfully" } else { "failed" }
    );
    println!("  Lines read:     {}", result.lines_read);
    println!("  Lines written:  {}", result.lines_written);
    if result.lines_updated > 0 {
        println!("  Lines updated:  {}", result.lines_updated);
    }
    if result.lines_rejected > 0 {
        println!("  Lines rejected: {}", result.lines_rejected);
    }
    println!("  Errors:         {}", result.errors);
    println!("  Duration:       {:.2}s", result.duration_secs);
    if result.duration_secs > 0.0 {
        println!(
            "  Throughput:     {:.0} rows/sec",
            result.lines_read as f64 / result.duration_secs
        );
    }
    println!("  Workers:");
    for worker in &result.workers {
        println!(
            "    {}.{} [{}] read={} written={} rejected={} errors={}",
            worker.stage,
            worker.copy,
            worker.state,
            worker.counters.lines_read,
            worker.counters.lines_written,
            worker.counters.lines_rejected,
            worker.counters.errors,
        );
    }

    if result.success {
        Ok(())
    } else {
        anyhow::bail!("Pipeline '{}' failed with {} error(s)", graph.name, result.errors)
    }
}
