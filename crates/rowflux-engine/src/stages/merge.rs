//! Priority merge: drains input queues in strict declared precedence order.

use std::time::Duration;

use crate::error::EngineError;
use crate::stage::{Stage, StageContext, StepSignal};

/// Reads input queue 0 to end-of-stream before touching queue 1, and so on.
/// The output layout is the first input's layout; every other input queue is
/// validated against it before any row is forwarded. An input that finishes
/// without ever producing a row is exempt from the check.
pub struct PriorityMerge {
    current: usize,
    preflighted: bool,
}

impl PriorityMerge {
    pub fn new() -> Self {
        Self {
            current: 0,
            preflighted: false,
        }
    }

    /// Wait until every input queue has either established its layout or
    /// finished empty, validating each established layout against the first.
    /// One-time, before the first row is forwarded.
    fn preflight(&mut self, ctx: &mut StageContext) -> Result<bool, EngineError> {
        for index in 0..ctx.inputs().len() {
            loop {
                if ctx.stop_requested() {
                    return Ok(false);
                }
                let (has_layout, done) = {
                    let queue = &ctx.inputs()[index];
                    (queue.layout().is_some(), queue.is_done())
                };
                if has_layout {
                    ctx.validate_input_layout(index)?;
                    break;
                }
                if done {
                    break;
                }
                std::thread::sleep(Duration::from_millis(1));
            }
        }
        self.preflighted = true;
        Ok(true)
    }
}

impl Default for PriorityMerge {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage for PriorityMerge {
    fn init(&mut self, _ctx: &mut StageContext) -> Result<(), EngineError> {
        Ok(())
    }

    fn process(&mut self, ctx: &mut StageContext) -> Result<StepSignal, EngineError> {
        if !self.preflighted && !self.preflight(ctx)? {
            // Interrupted while waiting for layouts; let the worker loop
            // observe the stop flag.
            return Ok(StepSignal::Continue);
        }

        while self.current < ctx.inputs().len() {
            match ctx.read_from(self.current)? {
                Some(row) => {
                    ctx.write_row(row)?;
                    return Ok(StepSignal::Continue);
                }
                None => {
                    // Current priority exhausted, fall through to the next.
                    self.current += 1;
                }
            }
        }
        Ok(StepSignal::NoMoreInput)
    }
}
