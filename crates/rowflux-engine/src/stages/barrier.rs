//! Barrier: holds input until monitored sibling stages finish.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use rowflux_types::state::WorkerState;

use crate::error::EngineError;
use crate::stage::{Stage, StageContext, StepSignal};
use crate::worker::WorkerCell;

fn default_poll_interval_ms() -> u64 {
    50
}

#[derive(Debug, Deserialize)]
struct BarrierParams {
    stages: Vec<String>,
    #[serde(default = "default_poll_interval_ms")]
    poll_interval_ms: u64,
}

/// A monitored reference: `"name"` (every copy) or `"name.copy"`.
pub(crate) fn parse_ref(reference: &str) -> (&str, Option<u32>) {
    if let Some((name, copy)) = reference.rsplit_once('.') {
        if let Ok(copy) = copy.parse::<u32>() {
            return (name, Some(copy));
        }
    }
    (reference, None)
}

/// Forwards no input row until every monitored sibling worker has reached
/// `Finished`, then drains its input unchanged.
///
/// The monitored set is polled at a fixed interval; monitoring a stage that
/// feeds the barrier (directly or transitively) can deadlock once
/// backpressure fills the barrier's input queue, so monitor true siblings.
pub struct Barrier {
    monitored: Vec<Arc<WorkerCell>>,
    poll_interval: Duration,
    released: bool,
}

impl Barrier {
    pub fn new() -> Self {
        Self {
            monitored: Vec::new(),
            poll_interval: Duration::from_millis(default_poll_interval_ms()),
            released: false,
        }
    }
}

impl Default for Barrier {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage for Barrier {
    fn init(&mut self, ctx: &mut StageContext) -> Result<(), EngineError> {
        let params: BarrierParams = serde_json::from_value(ctx.params().clone())
            .map_err(|e| EngineError::stage(ctx.stage_name(), format!("invalid params: {e}")))?;
        self.poll_interval = Duration::from_millis(params.poll_interval_ms);

        for reference in &params.stages {
            let (name, copy) = parse_ref(reference);
            if name == ctx.stage_name() {
                return Err(EngineError::stage(
                    ctx.stage_name(),
                    "barrier cannot monitor itself",
                ));
            }
            if ctx.outputs().iter().any(|q| q.consumer_stage() == name) {
                return Err(EngineError::stage(
                    ctx.stage_name(),
                    format!("barrier cannot monitor its own downstream target '{name}'"),
                ));
            }
            let cells = match copy {
                Some(copy) => ctx
                    .registry()
                    .find(name, copy)
                    .map(|cell| vec![cell])
                    .unwrap_or_default(),
                None => ctx.registry().find_all(name),
            };
            if cells.is_empty() {
                return Err(EngineError::stage(
                    ctx.stage_name(),
                    format!("monitored stage '{reference}' not found"),
                ));
            }
            self.monitored.extend(cells);
        }
        Ok(())
    }

    fn process(&mut self, ctx: &mut StageContext) -> Result<StepSignal, EngineError> {
        if !self.released {
            self.monitored
                .retain(|cell| cell.status() != WorkerState::Finished);
            if !self.monitored.is_empty() {
                if !ctx.stop_requested() {
                    std::thread::sleep(self.poll_interval);
                }
                return Ok(StepSignal::Continue);
            }
            self.released = true;
            tracing::debug!(
                stage = ctx.stage_name(),
                "All monitored stages finished, releasing held rows"
            );
        }

        match ctx.read_row()? {
            Some(row) => {
                ctx.write_row(row)?;
                Ok(StepSignal::Continue)
            }
            None => Ok(StepSignal::NoMoreInput),
        }
    }
}
