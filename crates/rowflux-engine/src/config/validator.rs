//! Semantic validation of a pipeline graph.
//!
//! Everything reported here is a graph-fatal configuration error: the run
//! never starts and the caller gets every problem found, not just the first.

use std::collections::HashSet;

use rowflux_types::graph::PipelineGraph;

use crate::error::EngineError;
use crate::stages::barrier::parse_ref;

/// Validate a pipeline graph before execution.
///
/// # Errors
///
/// Returns `EngineError::Graph` listing all validation failures found.
pub fn validate_graph(graph: &PipelineGraph) -> Result<(), EngineError> {
    let mut errors = Vec::new();

    if graph.name.trim().is_empty() {
        errors.push("Pipeline name must not be empty".to_string());
    }
    if graph.queue_capacity == 0 {
        errors.push("queue_capacity must be > 0".to_string());
    }
    if graph.stages.is_empty() {
        errors.push("Pipeline must define at least one stage".to_string());
    }

    let mut seen = HashSet::new();
    for (i, stage) in graph.stages.iter().enumerate() {
        if stage.name.trim().is_empty() {
            errors.push(format!("Stage {i} has an empty name"));
        }
        if stage.kind.trim().is_empty() {
            errors.push(format!("Stage '{}' has an empty kind", stage.name));
        }
        if stage.copies == 0 {
            errors.push(format!("Stage '{}' declares zero copies", stage.name));
        }
        if !seen.insert(stage.name.as_str()) {
            errors.push(format!("Duplicate stage name '{}'", stage.name));
        }
    }

    for hop in &graph.hops {
        if graph.stage(&hop.from).is_none() {
            errors.push(format!(
                "Hop '{} -> {}' references unknown stage '{}'",
                hop.from, hop.to, hop.from
            ));
        }
        if graph.stage(&hop.to).is_none() {
            errors.push(format!(
                "Hop '{} -> {}' references unknown stage '{}'",
                hop.from, hop.to, hop.to
            ));
        }
        if hop.from == hop.to {
            errors.push(format!("Stage '{}' hops to itself", hop.from));
        }
    }

    // Monitored-stage references on barrier stages are resolvable statically.
    for stage in &graph.stages {
        if stage.kind != "barrier" {
            continue;
        }
        let Some(refs) = stage.params.get("stages").and_then(|v| v.as_array()) else {
            errors.push(format!(
                "Barrier stage '{}' must declare a 'stages' list",
                stage.name
            ));
            continue;
        };
        for reference in refs.iter().filter_map(|v| v.as_str()) {
            let (name, _copy) = parse_ref(reference);
            if name == stage.name {
                errors.push(format!(
                    "Barrier stage '{}' cannot monitor itself",
                    stage.name
                ));
            } else if graph.stage(name).is_none() && graph.stage(reference).is_none() {
                errors.push(format!(
                    "Barrier stage '{}' monitors unknown stage '{reference}'",
                    stage.name
                ));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(EngineError::Graph(errors.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowflux_types::graph::StageDescriptor;

    fn valid_graph() -> PipelineGraph {
        PipelineGraph::new("demo")
            .add_stage(StageDescriptor::new("gen", "row-generator"))
            .add_stage(StageDescriptor::new("out", "collector"))
            .add_hop("gen", "out")
    }

    #[test]
    fn test_valid_graph_passes() {
        assert!(validate_graph(&valid_graph()).is_ok());
    }

    #[test]
    fn test_all_errors_collected() {
        let graph = PipelineGraph::new("")
            .with_capacity(0)
            .add_stage(StageDescriptor::new("a", "passthrough").with_copies(0))
            .add_stage(StageDescriptor::new("a", "passthrough"))
            .add_hop("a", "missing");
        let err = validate_graph(&graph).unwrap_err();
        let msg = format!("{err}");
        assert!(msg.contains("name must not be empty"));
        assert!(msg.contains("queue_capacity"));
        assert!(msg.contains("zero copies"));
        assert!(msg.contains("Duplicate stage name 'a'"));
        assert!(msg.contains("unknown stage 'missing'"));
    }

    #[test]
    fn test_self_hop_rejected() {
        let graph = PipelineGraph::new("loop")
            .add_stage(StageDescriptor::new("a", "passthrough"))
            .add_hop("a", "a");
        let err = format!("{}", validate_graph(&graph).unwrap_err());
        assert!(err.contains("hops to itself"));
    }

    #[test]
    fn test_barrier_monitored_refs_checked() {
        let graph = PipelineGraph::new("b")
            .add_stage(StageDescriptor::new("gen", "row-generator"))
            .add_stage(
                StageDescriptor::new("gate", "barrier")
                    .with_params(serde_json::json!({ "stages": ["ghost"] })),
            )
            .add_hop("gen", "gate");
        let err = format!("{}", validate_graph(&graph).unwrap_err());
        assert!(err.contains("unknown stage 'ghost'"));
    }

    #[test]
    fn test_barrier_self_monitor_rejected() {
        let graph = PipelineGraph::new("b")
            .add_stage(
                StageDescriptor::new("gate", "barrier")
                    .with_params(serde_json::json!({ "stages": ["gate"] })),
            );
        let err = format!("{}", validate_graph(&graph).unwrap_err());
        assert!(err.contains("cannot monitor itself"));
    }
}
