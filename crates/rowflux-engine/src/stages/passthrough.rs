//! Passthrough: forwards every input row unchanged.

use crate::error::EngineError;
use crate::stage::{Stage, StageContext, StepSignal};

/// The no-op stage. Output layout is adopted from the first input row.
pub struct Passthrough;

impl Stage for Passthrough {
    fn init(&mut self, _ctx: &mut StageContext) -> Result<(), EngineError> {
        Ok(())
    }

    fn process(&mut self, ctx: &mut StageContext) -> Result<StepSignal, EngineError> {
        match ctx.read_row()? {
            Some(row) => {
                ctx.write_row(row)?;
                Ok(StepSignal::Continue)
            }
            None => Ok(StepSignal::NoMoreInput),
        }
    }
}
