//! Run result aggregation from per-worker counters.

use std::time::Duration;

use rowflux_types::state::{StageCounters, WorkerState};

use crate::worker::WorkerRegistry;

/// Per-worker metrics for skew and failure analysis.
#[derive(Debug, Clone)]
pub struct WorkerMetric {
    pub stage: String,
    pub copy: u32,
    pub state: WorkerState,
    pub counters: StageCounters,
}

/// Aggregate result of a pipeline run.
///
/// `lines_read` counts rows entering the graph (source workers),
/// `lines_written` counts rows delivered at the destination side (sink
/// workers); `errors`, `lines_updated` and `lines_rejected` sum across all
/// workers. The raw per-worker counters are in `workers`.
#[derive(Debug, Clone, Default)]
pub struct RunResult {
    pub errors: u64,
    pub lines_read: u64,
    pub lines_written: u64,
    pub lines_updated: u64,
    pub lines_rejected: u64,
    pub success: bool,
    pub duration_secs: f64,
    pub workers: Vec<WorkerMetric>,
}

pub(crate) fn aggregate(
    registry: &WorkerRegistry,
    task_failures: u64,
    duration: Duration,
) -> RunResult {
    let mut result = RunResult {
        duration_secs: duration.as_secs_f64(),
        ..RunResult::default()
    };
    let mut any_error_state = false;

    for cell in registry.cells() {
        let state = cell.status();
        let counters = cell.counters();

        result.errors += counters.errors;
        result.lines_updated += counters.lines_updated;
        result.lines_rejected += counters.lines_rejected;
        if !cell.has_inputs() {
            result.lines_read += counters.lines_written;
        }
        if !cell.has_outputs() {
            result.lines_written += counters.lines_written;
        }
        if state == WorkerState::Error {
            any_error_state = true;
        }

        result.workers.push(WorkerMetric {
            stage: cell.stage_name().to_string(),
            copy: cell.copy(),
            state,
            counters,
        });
    }

    result.errors += task_failures;
    result.success = !any_error_state && result.errors == 0;
    result
}
