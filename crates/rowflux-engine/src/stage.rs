//! The stage seam: the trait every stage implements and the runtime context
//! the engine hands to it.

use std::sync::Arc;
use std::time::Duration;

use rowflux_types::layout::RowLayout;
use rowflux_types::row::Row;

use crate::dispatcher::RunControl;
use crate::error::EngineError;
use crate::queue::LinkQueue;
use crate::worker::{WorkerCell, WorkerRegistry};

/// Signal returned by one `process` invocation.
///
/// A fatal condition is expressed by returning `Err` instead; the worker
/// turns that into an `Error` terminal state and a graph-wide stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepSignal {
    /// More work may remain; call `process` again.
    Continue,
    /// All input is consumed; mark outputs finished and stop this worker.
    NoMoreInput,
}

/// One stage behavior. Instances are created per worker copy by the stage
/// factory registry and owned by exactly one worker task.
pub trait Stage: Send {
    /// One-time setup. Failure here aborts the run before any row flows.
    fn init(&mut self, ctx: &mut StageContext) -> Result<(), EngineError>;

    /// Process one step: consume zero-or-one input rows and/or produce
    /// zero-or-more output rows.
    fn process(&mut self, ctx: &mut StageContext) -> Result<StepSignal, EngineError>;

    /// Teardown, called once after the worker reaches a terminal state.
    fn dispose(&mut self, _ctx: &mut StageContext) {}
}

impl std::fmt::Debug for dyn Stage + '_ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Stage")
    }
}

/// Per-worker runtime context: ordered input/output queues, counters, the
/// cooperative stop token, and a read-only view of the worker registry.
pub struct StageContext {
    stage_name: String,
    copy: u32,
    params: serde_json::Value,
    inputs: Vec<Arc<LinkQueue>>,
    validated: Vec<bool>,
    next_input: usize,
    reference_layout: Option<Arc<RowLayout>>,
    outputs: Vec<Arc<LinkQueue>>,
    next_output: usize,
    output_layout: Option<Arc<RowLayout>>,
    cell: Arc<WorkerCell>,
    control: Arc<RunControl>,
}

impl StageContext {
    pub(crate) fn new(
        params: serde_json::Value,
        inputs: Vec<Arc<LinkQueue>>,
        outputs: Vec<Arc<LinkQueue>>,
        cell: Arc<WorkerCell>,
        control: Arc<RunControl>,
    ) -> Self {
        let validated = vec![false; inputs.len()];
        Self {
            stage_name: cell.stage_name().to_string(),
            copy: cell.copy(),
            params,
            inputs,
            validated,
            next_input: 0,
            reference_layout: None,
            outputs,
            next_output: 0,
            output_layout: None,
            cell,
            control,
        }
    }

    pub fn stage_name(&self) -> &str {
        &self.stage_name
    }

    pub fn copy(&self) -> u32 {
        self.copy
    }

    /// Stage parameters from the descriptor, as configured.
    pub fn params(&self) -> &serde_json::Value {
        &self.params
    }

    /// The ordered input queues still attached to this worker. Queues are
    /// removed from this list by [`StageContext::read_row`] once exhausted.
    pub fn inputs(&self) -> &[Arc<LinkQueue>] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Arc<LinkQueue>] {
        &self.outputs
    }

    /// `true` once a stop has been requested for this worker.
    pub fn stop_requested(&self) -> bool {
        self.cell.stop_requested()
    }

    /// Request a cooperative stop of the whole graph.
    pub fn request_graph_stop(&self) {
        self.control.request_stop();
    }

    /// Registry of every worker in this run, for status polling.
    pub fn registry(&self) -> &WorkerRegistry {
        self.control.registry()
    }

    pub(crate) fn cell(&self) -> &Arc<WorkerCell> {
        &self.cell
    }

    pub(crate) fn control(&self) -> &Arc<RunControl> {
        &self.control
    }

    /// The layout of the first input queue that delivered a row (the
    /// compatibility reference for all other inputs).
    pub fn reference_layout(&self) -> Option<Arc<RowLayout>> {
        self.reference_layout.clone()
    }

    /// Take the next row, rotating over the live input queues and dropping
    /// each queue from the rotation once it signals end-of-stream. Returns
    /// `Ok(None)` once every input is exhausted.
    ///
    /// The layout compatibility check runs here, once per input queue, the
    /// first time a row is taken from it.
    pub fn read_row(&mut self) -> Result<Option<Row>, EngineError> {
        while !self.inputs.is_empty() {
            if self.next_input >= self.inputs.len() {
                self.next_input = 0;
            }
            let index = self.next_input;
            match self.inputs[index].get() {
                Some(row) => {
                    self.validate_input_layout(index)?;
                    self.cell.inc_read();
                    self.next_input += 1;
                    return Ok(Some(row));
                }
                None => {
                    self.inputs.remove(index);
                    self.validated.remove(index);
                }
            }
        }
        Ok(None)
    }

    /// Take the next row from one specific input queue, without rotation and
    /// without removing exhausted queues (the priority-merge pattern owns its
    /// own drain order). `Ok(None)` means that queue is at end-of-stream.
    pub fn read_from(&mut self, index: usize) -> Result<Option<Row>, EngineError> {
        let Some(queue) = self.inputs.get(index).cloned() else {
            return Ok(None);
        };
        match queue.get() {
            Some(row) => {
                self.validate_input_layout(index)?;
                self.cell.inc_read();
                Ok(Some(row))
            }
            None => Ok(None),
        }
    }

    /// Check one input queue's layout against the reference layout (the first
    /// established input layout seen by this worker). A queue with no layout
    /// yet is skipped; the check re-runs on its first delivered row.
    pub fn validate_input_layout(&mut self, index: usize) -> Result<(), EngineError> {
        if self.validated.get(index).copied().unwrap_or(true) {
            return Ok(());
        }
        let queue = &self.inputs[index];
        let Some(layout) = queue.layout() else {
            return Ok(());
        };
        match &self.reference_layout {
            None => self.reference_layout = Some(layout),
            Some(reference) => {
                reference
                    .check_compatible(&layout)
                    .map_err(|mismatch| EngineError::Layout {
                        queue: queue.name().to_string(),
                        mismatch,
                    })?;
            }
        }
        self.validated[index] = true;
        Ok(())
    }

    /// Establish this worker's output layout and push it to every output
    /// queue. The first establishment wins; the layout is immutable after.
    pub fn set_output_layout(&mut self, layout: RowLayout) {
        self.set_output_layout_shared(Arc::new(layout));
    }

    pub(crate) fn set_output_layout_shared(&mut self, layout: Arc<RowLayout>) {
        if self.output_layout.is_some() {
            return;
        }
        for queue in &self.outputs {
            queue.set_layout(layout.clone());
        }
        self.output_layout = Some(layout);
    }

    pub fn output_layout(&self) -> Option<Arc<RowLayout>> {
        self.output_layout.clone()
    }

    /// Write one logical row, distributed round-robin across the output
    /// queues so that rows leaving a stage equal rows read plus rows
    /// produced (conservation). With no output queues the row is counted as
    /// delivered, which is the sink case.
    ///
    /// If no output layout was set explicitly, the reference input layout is
    /// adopted on the first write (schema-on-first-row).
    pub fn write_row(&mut self, row: Row) -> Result<(), EngineError> {
        if self.output_layout.is_none() {
            match self.reference_layout.clone() {
                Some(layout) => self.set_output_layout_shared(layout),
                None if self.outputs.is_empty() => {}
                None => {
                    return Err(EngineError::stage(
                        &self.stage_name,
                        "row written before an output layout was established",
                    ));
                }
            }
        }
        self.cell.inc_written();
        if !self.outputs.is_empty() {
            if self.next_output >= self.outputs.len() {
                self.next_output = 0;
            }
            self.outputs[self.next_output].put(row);
            self.next_output += 1;
        }
        Ok(())
    }

    /// Count a row as updated (stage-owned policy).
    pub fn inc_updated(&self) {
        self.cell.inc_updated();
    }

    /// Count a row as rejected (row-local recoverable policy).
    pub fn inc_rejected(&self) {
        self.cell.inc_rejected();
    }

    /// Attach one more output queue at runtime (sub-flow wiring). The
    /// established output layout, if any, is pushed to it immediately.
    pub(crate) fn add_output(&mut self, queue: Arc<LinkQueue>) {
        if let Some(layout) = &self.output_layout {
            queue.set_layout(layout.clone());
        }
        self.outputs.push(queue);
    }

    /// Block until a sub-flow producer binds at least one input queue to this
    /// worker, up to `timeout`. Returns how many queues were adopted; zero
    /// means the timeout elapsed or a stop was requested.
    pub(crate) fn adopt_late_inputs(&mut self, timeout: Duration) -> usize {
        let queues = self.cell.wait_late_inputs(timeout);
        let adopted = queues.len();
        for queue in queues {
            self.inputs.push(queue);
            self.validated.push(false);
        }
        adopted
    }

    /// Mark every output queue finished. Called by the worker on any
    /// transition to a terminal state.
    pub(crate) fn finish_outputs(&self) {
        for queue in &self.outputs {
            queue.mark_producer_finished();
        }
    }
}
