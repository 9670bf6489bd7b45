//! Collector sink: the terminal stage that delivers rows.

use std::sync::{Arc, Mutex};

use rowflux_types::row::Row;

use crate::error::EngineError;
use crate::stage::{Stage, StageContext, StepSignal};

/// Shared buffer handle for capturing delivered rows (used by tests and
/// embedders that want the output back).
pub type RowBuffer = Arc<Mutex<Vec<Row>>>;

/// Terminal sink. Counts every delivered row as written; optionally appends
/// each row to a shared capture buffer.
pub struct CollectorSink {
    buffer: Option<RowBuffer>,
}

impl CollectorSink {
    /// Count-only sink (the config-file form).
    pub fn new() -> Self {
        Self { buffer: None }
    }

    /// Sink that also captures rows into `buffer`.
    pub fn with_buffer(buffer: RowBuffer) -> Self {
        Self {
            buffer: Some(buffer),
        }
    }
}

impl Default for CollectorSink {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage for CollectorSink {
    fn init(&mut self, _ctx: &mut StageContext) -> Result<(), EngineError> {
        Ok(())
    }

    fn process(&mut self, ctx: &mut StageContext) -> Result<StepSignal, EngineError> {
        match ctx.read_row()? {
            Some(row) => {
                if let Some(buffer) = &self.buffer {
                    buffer
                        .lock()
                        .map_err(|_| {
                            EngineError::stage(ctx.stage_name(), "capture buffer poisoned")
                        })?
                        .push(row.clone());
                }
                ctx.write_row(row)?;
                Ok(StepSignal::Continue)
            }
            None => Ok(StepSignal::NoMoreInput),
        }
    }
}
