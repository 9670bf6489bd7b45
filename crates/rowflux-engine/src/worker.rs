//! Stage workers: per-copy runtime cells and the lifecycle loop.
//!
//! Each worker owns one stage instance and runs it on a blocking task. Status
//! and counters live in an atomically-updated cell so that status polling
//! (the barrier pattern, external supervisors) never blocks a running worker.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use rowflux_types::state::{StageCounters, WorkerState};

use crate::error::EngineError;
use crate::queue::LinkQueue;
use crate::stage::{Stage, StageContext, StepSignal};

/// Atomic status/counter cell for one stage-copy.
///
/// Created at graph start, discarded at teardown; a new run always gets
/// fresh cells.
pub struct WorkerCell {
    stage_name: String,
    copy: u32,
    has_inputs: bool,
    has_outputs: bool,
    state: AtomicU8,
    stop: AtomicBool,
    lines_read: AtomicU64,
    lines_written: AtomicU64,
    lines_updated: AtomicU64,
    lines_rejected: AtomicU64,
    errors: AtomicU64,
    late_inputs: Mutex<Vec<Arc<LinkQueue>>>,
    late_bound: Condvar,
}

impl WorkerCell {
    pub(crate) fn new(
        stage_name: impl Into<String>,
        copy: u32,
        has_inputs: bool,
        has_outputs: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            stage_name: stage_name.into(),
            copy,
            has_inputs,
            has_outputs,
            state: AtomicU8::new(WorkerState::Created as u8),
            stop: AtomicBool::new(false),
            lines_read: AtomicU64::new(0),
            lines_written: AtomicU64::new(0),
            lines_updated: AtomicU64::new(0),
            lines_rejected: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            late_inputs: Mutex::new(Vec::new()),
            late_bound: Condvar::new(),
        })
    }

    pub fn stage_name(&self) -> &str {
        &self.stage_name
    }

    pub fn copy(&self) -> u32 {
        self.copy
    }

    /// `stage.copy` identifier used in logs and metrics.
    pub fn worker_id(&self) -> String {
        format!("{}.{}", self.stage_name, self.copy)
    }

    /// Whether this worker had statically wired input queues at graph build.
    pub fn has_inputs(&self) -> bool {
        self.has_inputs
    }

    /// Whether this worker had statically wired output queues at graph build.
    pub fn has_outputs(&self) -> bool {
        self.has_outputs
    }

    /// Lock-free status read.
    pub fn status(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Transition to `state`. Terminal states are final: a transition out of
    /// one is ignored.
    pub(crate) fn transition(&self, state: WorkerState) {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if WorkerState::from_u8(current).is_terminal() {
                return;
            }
            match self.state.compare_exchange(
                current,
                state as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }

    pub(crate) fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
        // Wake a worker parked on the late-input port.
        self.late_bound.notify_all();
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    pub(crate) fn inc_read(&self) {
        self.lines_read.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_written(&self) {
        self.lines_written.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_updated(&self) {
        self.lines_updated.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_rejected(&self) {
        self.lines_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_errors(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot of the counters.
    pub fn counters(&self) -> StageCounters {
        StageCounters {
            lines_read: self.lines_read.load(Ordering::Relaxed),
            lines_written: self.lines_written.load(Ordering::Relaxed),
            lines_updated: self.lines_updated.load(Ordering::Relaxed),
            lines_rejected: self.lines_rejected.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }

    /// Bind one late input queue (sub-flow phase 2) and wake the waiter.
    pub(crate) fn bind_late_input(&self, queue: Arc<LinkQueue>) {
        let mut slot = self.late_inputs.lock().expect("late input lock poisoned");
        slot.push(queue);
        drop(slot);
        self.late_bound.notify_all();
    }

    /// Wait until at least one late input queue is bound, a stop is
    /// requested, or `timeout` elapses. Drains and returns whatever is bound.
    pub(crate) fn wait_late_inputs(&self, timeout: Duration) -> Vec<Arc<LinkQueue>> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.late_inputs.lock().expect("late input lock poisoned");
        loop {
            if !slot.is_empty() {
                return std::mem::take(&mut *slot);
            }
            if self.stop_requested() {
                return Vec::new();
            }
            let now = Instant::now();
            if now >= deadline {
                return Vec::new();
            }
            let (guard, _timed_out) = self
                .late_bound
                .wait_timeout(slot, deadline - now)
                .expect("late input lock poisoned");
            slot = guard;
        }
    }
}

/// Read-only lookup over every worker cell of one run.
///
/// Backed by a fixed arena allocated at graph start; status reads never
/// contend with status writes.
#[derive(Clone)]
pub struct WorkerRegistry {
    cells: Arc<[Arc<WorkerCell>]>,
}

impl WorkerRegistry {
    pub(crate) fn new(cells: Vec<Arc<WorkerCell>>) -> Self {
        Self {
            cells: cells.into(),
        }
    }

    pub fn cells(&self) -> &[Arc<WorkerCell>] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// The cell for one specific stage-copy.
    pub fn find(&self, stage_name: &str, copy: u32) -> Option<Arc<WorkerCell>> {
        self.cells
            .iter()
            .find(|c| c.stage_name() == stage_name && c.copy() == copy)
            .cloned()
    }

    /// Every copy of the named stage, in copy order.
    pub fn find_all(&self, stage_name: &str) -> Vec<Arc<WorkerCell>> {
        self.cells
            .iter()
            .filter(|c| c.stage_name() == stage_name)
            .cloned()
            .collect()
    }

    /// Lock-free status query for monitoring and structural stages.
    pub fn status_of(&self, stage_name: &str, copy: u32) -> Option<WorkerState> {
        self.find(stage_name, copy).map(|c| c.status())
    }
}

pub(crate) struct InitReport {
    pub worker: String,
    pub result: Result<(), EngineError>,
}

/// The runtime wrapper around one stage instance: owns the lifecycle state
/// machine and the per-row processing loop.
pub(crate) struct StageWorker {
    stage: Box<dyn Stage>,
    ctx: StageContext,
}

impl StageWorker {
    pub(crate) fn new(stage: Box<dyn Stage>, ctx: StageContext) -> Self {
        Self { stage, ctx }
    }

    /// Run the full worker lifecycle on the current (blocking) thread.
    ///
    /// Initialization outcomes are reported over `init_tx`; the worker then
    /// parks on the start gate so that no row flows until every sibling
    /// initialized successfully.
    pub(crate) fn run(mut self, init_tx: mpsc::Sender<InitReport>) {
        let cell = self.ctx.cell().clone();
        let worker = cell.worker_id();
        tracing::debug!(worker = %worker, "Initializing stage worker");

        let init_result = self.stage.init(&mut self.ctx);
        let init_ok = init_result.is_ok();
        let _ = init_tx.blocking_send(InitReport {
            worker: worker.clone(),
            result: init_result,
        });
        // Close our report slot so the dispatcher can detect lost workers.
        drop(init_tx);

        if !init_ok {
            cell.inc_errors();
            self.ctx.control().request_stop();
            self.ctx.finish_outputs();
            cell.transition(WorkerState::Error);
            self.stage.dispose(&mut self.ctx);
            return;
        }
        cell.transition(WorkerState::Initialized);

        if !self.ctx.control().wait_for_start() {
            // The run was aborted before any row flowed.
            self.ctx.finish_outputs();
            cell.transition(WorkerState::Stopped);
            self.stage.dispose(&mut self.ctx);
            return;
        }
        cell.transition(WorkerState::Running);
        tracing::debug!(worker = %worker, "Stage worker running");

        loop {
            // Cooperative stop, observed at the top of each iteration.
            if cell.stop_requested() {
                self.ctx.finish_outputs();
                cell.transition(WorkerState::Stopped);
                break;
            }
            match self.stage.process(&mut self.ctx) {
                Ok(StepSignal::Continue) => {}
                Ok(StepSignal::NoMoreInput) => {
                    self.ctx.finish_outputs();
                    cell.transition(WorkerState::Finished);
                    break;
                }
                Err(e) => {
                    cell.inc_errors();
                    tracing::error!(worker = %worker, "Stage failed: {e}");
                    self.ctx.control().request_stop();
                    self.ctx.finish_outputs();
                    cell.transition(WorkerState::Error);
                    break;
                }
            }
        }

        self.stage.dispose(&mut self.ctx);
        let counters = cell.counters();
        tracing::debug!(
            worker = %worker,
            state = %cell.status(),
            lines_read = counters.lines_read,
            lines_written = counters.lines_written,
            "Stage worker finished"
        );
    }
}
