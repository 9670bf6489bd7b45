//! Field filter: drops rows below a threshold, counting them as rejected.
//!
//! This is the row-local recoverable error policy: a dropped row never
//! aborts the graph, it only shows up in `lines_rejected`.

use serde::Deserialize;

use rowflux_types::row::Value;

use crate::error::EngineError;
use crate::stage::{Stage, StageContext, StepSignal};

#[derive(Debug, Deserialize)]
struct FilterParams {
    field: String,
    min: i64,
}

/// Drops rows whose named `int64` field is below `min`.
pub struct FieldFilter {
    field: String,
    min: i64,
    field_index: Option<usize>,
}

impl FieldFilter {
    pub fn new() -> Self {
        Self {
            field: String::new(),
            min: 0,
            field_index: None,
        }
    }
}

impl Default for FieldFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage for FieldFilter {
    fn init(&mut self, ctx: &mut StageContext) -> Result<(), EngineError> {
        let params: FilterParams = serde_json::from_value(ctx.params().clone())
            .map_err(|e| EngineError::stage(ctx.stage_name(), format!("invalid params: {e}")))?;
        self.field = params.field;
        self.min = params.min;
        Ok(())
    }

    fn process(&mut self, ctx: &mut StageContext) -> Result<StepSignal, EngineError> {
        let Some(row) = ctx.read_row()? else {
            return Ok(StepSignal::NoMoreInput);
        };

        // The field index comes from the input layout, known after the first
        // row; a missing field is stage-fatal.
        let index = match self.field_index {
            Some(index) => index,
            None => {
                let layout = ctx.reference_layout().ok_or_else(|| {
                    EngineError::stage(ctx.stage_name(), "input layout not established")
                })?;
                let index = layout.index_of(&self.field).ok_or_else(|| {
                    EngineError::stage(
                        ctx.stage_name(),
                        format!("field '{}' not found in input layout", self.field),
                    )
                })?;
                self.field_index = Some(index);
                index
            }
        };

        if let Some(Value::Int64(v)) = row.get(index) {
            if *v < self.min {
                ctx.inc_rejected();
                return Ok(StepSignal::Continue);
            }
        }
        ctx.write_row(row)?;
        Ok(StepSignal::Continue)
    }
}
