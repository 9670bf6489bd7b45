//! Pipeline dispatcher: wires the stage graph, spawns one worker per
//! stage-copy, monitors completion, and propagates stop/abort.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinSet;

use rowflux_types::graph::PipelineGraph;

use crate::config::validator;
use crate::error::EngineError;
use crate::factory::StageRegistry;
use crate::queue::LinkQueue;
use crate::result::{self, RunResult};
use crate::stage::StageContext;
use crate::worker::{InitReport, StageWorker, WorkerCell, WorkerRegistry};

#[derive(Clone, Copy, PartialEq, Eq)]
enum GatePhase {
    Holding,
    Open,
    Aborted,
}

/// Start gate: holds every worker after initialization until the dispatcher
/// has seen all init reports, so no row flows on a run that aborts during
/// setup.
struct Gate {
    phase: Mutex<GatePhase>,
    released: Condvar,
}

impl Gate {
    fn new() -> Self {
        Self {
            phase: Mutex::new(GatePhase::Holding),
            released: Condvar::new(),
        }
    }

    fn open(&self) {
        self.set(GatePhase::Open);
    }

    fn abort(&self) {
        self.set(GatePhase::Aborted);
    }

    fn set(&self, phase: GatePhase) {
        let mut guard = self.phase.lock().expect("gate lock poisoned");
        if *guard == GatePhase::Holding {
            *guard = phase;
        }
        drop(guard);
        self.released.notify_all();
    }

    fn is_open(&self) -> bool {
        *self.phase.lock().expect("gate lock poisoned") == GatePhase::Open
    }

    /// Block until released; `true` means the run is going ahead.
    fn wait(&self) -> bool {
        let mut guard = self.phase.lock().expect("gate lock poisoned");
        while *guard == GatePhase::Holding {
            guard = self.released.wait(guard).expect("gate lock poisoned");
        }
        *guard == GatePhase::Open
    }

    /// Like `wait`, bounded. `Some(true)` = open, `Some(false)` = aborted,
    /// `None` = still holding when the timeout elapsed.
    fn wait_timeout(&self, timeout: Duration) -> Option<bool> {
        let deadline = Instant::now() + timeout;
        let mut guard = self.phase.lock().expect("gate lock poisoned");
        while *guard == GatePhase::Holding {
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (g, _) = self
                .released
                .wait_timeout(guard, deadline - now)
                .expect("gate lock poisoned");
            guard = g;
        }
        Some(*guard == GatePhase::Open)
    }
}

/// Shared control block of one run: the worker registry, the set of link
/// queues to interrupt on stop, and the start gate.
pub struct RunControl {
    pipeline: String,
    registry: WorkerRegistry,
    queues: Mutex<Vec<Arc<LinkQueue>>>,
    gate: Gate,
    stop: AtomicBool,
}

impl RunControl {
    fn new(pipeline: String, registry: WorkerRegistry, queues: Vec<Arc<LinkQueue>>) -> Self {
        Self {
            pipeline,
            registry,
            queues: Mutex::new(queues),
            gate: Gate::new(),
            stop: AtomicBool::new(false),
        }
    }

    pub fn pipeline(&self) -> &str {
        &self.pipeline
    }

    pub fn registry(&self) -> &WorkerRegistry {
        &self.registry
    }

    /// Cooperatively stop the whole graph: set every worker's stop flag and
    /// interrupt every link queue. Idempotent; callable from any worker.
    pub fn request_stop(&self) {
        if self.stop.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::info!(pipeline = self.pipeline, "Stop requested for pipeline run");
        for cell in self.registry.cells() {
            cell.request_stop();
        }
        let queues = self.queues.lock().expect("queue list poisoned");
        for queue in queues.iter() {
            queue.interrupt();
        }
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// `true` once every worker initialized and row processing began.
    pub fn is_running(&self) -> bool {
        self.gate.is_open()
    }

    /// Block until the run is running (or aborted), up to `timeout`.
    /// `true` only if the run reached the running state.
    pub fn wait_until_running(&self, timeout: Duration) -> bool {
        self.gate.wait_timeout(timeout) == Some(true)
    }

    pub(crate) fn wait_for_start(&self) -> bool {
        self.gate.wait()
    }

    /// Register a late-allocated queue (sub-flow phase 2) so a stop request
    /// interrupts it like any statically wired queue.
    pub(crate) fn add_queue(&self, queue: Arc<LinkQueue>) {
        let mut queues = self.queues.lock().expect("queue list poisoned");
        queues.push(queue.clone());
        drop(queues);
        if self.stop_requested() {
            queue.interrupt();
        }
    }
}

/// Cloneable handle to a run's control block, used to bridge link queues
/// into another (nested) graph after it has started.
#[derive(Clone)]
pub struct GraphLink {
    control: Arc<RunControl>,
}

impl GraphLink {
    pub fn registry(&self) -> &WorkerRegistry {
        self.control.registry()
    }

    pub(crate) fn control(&self) -> &Arc<RunControl> {
        &self.control
    }
}

/// Handle to a started pipeline run.
pub struct RunHandle {
    control: Arc<RunControl>,
    tasks: JoinSet<()>,
    started: Instant,
    task_failures: u64,
}

impl std::fmt::Debug for RunHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunHandle")
            .field("pipeline", &self.control.pipeline())
            .field("task_failures", &self.task_failures)
            .finish_non_exhaustive()
    }
}

impl RunHandle {
    /// Request a cooperative stop. Idempotent; a caller-initiated stop is
    /// not itself a failure.
    pub fn stop(&self) {
        self.control.request_stop();
    }

    pub fn registry(&self) -> &WorkerRegistry {
        self.control.registry()
    }

    /// Handle for wiring sub-flow boundaries into this run.
    pub fn link(&self) -> GraphLink {
        GraphLink {
            control: self.control.clone(),
        }
    }

    /// Block until every worker reaches a terminal state, then aggregate the
    /// run result. Stage failures are reported through `RunResult::success`,
    /// not as an `Err` of this call.
    pub async fn await_completion(&mut self) -> RunResult {
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(join_err) = joined {
                tracing::error!(
                    pipeline = self.control.pipeline(),
                    "Worker task panicked: {join_err}"
                );
                self.task_failures += 1;
            }
        }
        let run_result = self.result();
        tracing::info!(
            pipeline = self.control.pipeline(),
            success = run_result.success,
            errors = run_result.errors,
            lines_read = run_result.lines_read,
            lines_written = run_result.lines_written,
            duration_secs = run_result.duration_secs,
            "Pipeline run completed"
        );
        run_result
    }

    /// Aggregate the current counters into a result. Meaningful once
    /// [`RunHandle::await_completion`] returned; callable earlier for
    /// progress snapshots.
    pub fn result(&self) -> RunResult {
        result::aggregate(
            self.control.registry(),
            self.task_failures,
            self.started.elapsed(),
        )
    }
}

/// Start a pipeline run: validate the graph, allocate workers and queues,
/// spawn one blocking task per stage-copy, and release them once every
/// worker initialized.
///
/// # Errors
///
/// Returns a graph-fatal configuration error before anything is spawned, or
/// the first stage initialization error after aborting the whole run (no row
/// flows in that case).
pub async fn start(
    graph: &PipelineGraph,
    registry: &StageRegistry,
) -> Result<RunHandle, EngineError> {
    validator::validate_graph(graph)?;
    let started = Instant::now();

    // Index every (stage, copy) before allocating anything.
    let mut index: HashMap<(String, u32), usize> = HashMap::new();
    let mut order: Vec<(usize, u32)> = Vec::new(); // (stage index, copy)
    for (stage_index, stage) in graph.stages.iter().enumerate() {
        for copy in 0..stage.copies {
            index.insert((stage.name.clone(), copy), order.len());
            order.push((stage_index, copy));
        }
    }

    // Allocate one queue per (producer copy, consumer copy) pair: pairwise
    // when the copy counts match, cartesian otherwise.
    let mut inputs: Vec<Vec<Arc<LinkQueue>>> = vec![Vec::new(); order.len()];
    let mut outputs: Vec<Vec<Arc<LinkQueue>>> = vec![Vec::new(); order.len()];
    let mut queues: Vec<Arc<LinkQueue>> = Vec::new();
    for hop in &graph.hops {
        let producer_copies = graph.stage(&hop.from).map_or(1, |s| s.copies);
        let consumer_copies = graph.stage(&hop.to).map_or(1, |s| s.copies);
        let pairs: Vec<(u32, u32)> = if producer_copies == consumer_copies {
            (0..producer_copies).map(|i| (i, i)).collect()
        } else {
            (0..producer_copies)
                .flat_map(|p| (0..consumer_copies).map(move |c| (p, c)))
                .collect()
        };
        for (producer_copy, consumer_copy) in pairs {
            let name = format!(
                "{}.{} -> {}.{}",
                hop.from, producer_copy, hop.to, consumer_copy
            );
            let queue = LinkQueue::new(&hop.from, &hop.to, name, graph.queue_capacity);
            let producer_index = index[&(hop.from.clone(), producer_copy)];
            let consumer_index = index[&(hop.to.clone(), consumer_copy)];
            outputs[producer_index].push(queue.clone());
            inputs[consumer_index].push(queue.clone());
            queues.push(queue);
        }
    }

    // Instantiate cells and stage behaviors; factory errors are graph-fatal
    // and nothing has been spawned yet.
    let mut cells = Vec::with_capacity(order.len());
    let mut stages = Vec::with_capacity(order.len());
    for (worker_index, (stage_index, copy)) in order.iter().enumerate() {
        let descriptor = &graph.stages[*stage_index];
        cells.push(WorkerCell::new(
            &descriptor.name,
            *copy,
            !inputs[worker_index].is_empty(),
            !outputs[worker_index].is_empty(),
        ));
        stages.push(registry.create(descriptor)?);
    }

    let worker_registry = WorkerRegistry::new(cells.clone());
    let control = Arc::new(RunControl::new(
        graph.name.clone(),
        worker_registry,
        queues,
    ));

    tracing::info!(
        pipeline = graph.name,
        stages = graph.stages.len(),
        workers = order.len(),
        hops = graph.hops.len(),
        queue_capacity = graph.queue_capacity,
        "Starting pipeline run"
    );

    let worker_count = order.len();
    let (init_tx, mut init_rx) = mpsc::channel::<InitReport>(worker_count.max(1));
    let mut tasks = JoinSet::new();
    let mut input_lists = inputs.into_iter();
    let mut output_lists = outputs.into_iter();
    for (worker_index, stage) in stages.into_iter().enumerate() {
        let (stage_index, _) = order[worker_index];
        let ctx = StageContext::new(
            graph.stages[stage_index].params.clone(),
            input_lists.next().unwrap_or_default(),
            output_lists.next().unwrap_or_default(),
            cells[worker_index].clone(),
            control.clone(),
        );
        let worker = StageWorker::new(stage, ctx);
        let tx = init_tx.clone();
        tasks.spawn_blocking(move || worker.run(tx));
    }
    drop(init_tx);

    // Gather one init report per worker before opening the gate. A worker
    // that dies without reporting closes the channel early.
    let mut received = 0;
    let mut first_failure: Option<EngineError> = None;
    while received < worker_count {
        match init_rx.recv().await {
            Some(report) => {
                received += 1;
                if let Err(e) = report.result {
                    tracing::error!(
                        pipeline = graph.name,
                        worker = report.worker,
                        "Stage initialization failed: {e}"
                    );
                    if first_failure.is_none() {
                        first_failure = Some(e);
                    }
                }
            }
            None => {
                if first_failure.is_none() {
                    first_failure = Some(EngineError::Infrastructure(anyhow::anyhow!(
                        "a stage worker panicked during initialization"
                    )));
                }
                break;
            }
        }
    }

    if let Some(err) = first_failure {
        control.gate.abort();
        control.request_stop();
        while tasks.join_next().await.is_some() {}
        return Err(err);
    }

    control.gate.open();
    tracing::info!(pipeline = graph.name, workers = worker_count, "Pipeline running");

    Ok(RunHandle {
        control,
        tasks,
        started,
        task_failures: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_open_releases_waiters() {
        let gate = Arc::new(Gate::new());
        let waiter = {
            let gate = gate.clone();
            std::thread::spawn(move || gate.wait())
        };
        std::thread::sleep(Duration::from_millis(20));
        gate.open();
        assert!(waiter.join().unwrap());
        assert!(gate.is_open());
    }

    #[test]
    fn test_gate_abort_reports_false() {
        let gate = Gate::new();
        gate.abort();
        assert!(!gate.wait());
        assert_eq!(gate.wait_timeout(Duration::from_millis(10)), Some(false));
    }

    #[test]
    fn test_gate_wait_timeout_while_holding() {
        let gate = Gate::new();
        assert_eq!(gate.wait_timeout(Duration::from_millis(10)), None);
    }

    #[test]
    fn test_first_gate_decision_wins() {
        let gate = Gate::new();
        gate.open();
        gate.abort();
        assert!(gate.is_open());
    }

    #[test]
    fn test_request_stop_interrupts_late_queues() {
        let control = RunControl::new(
            "t".to_string(),
            WorkerRegistry::new(Vec::new()),
            Vec::new(),
        );
        control.request_stop();
        let queue = LinkQueue::new("a", "b", "a.0 -> b.0", 2);
        control.add_queue(queue.clone());
        // A queue added after the stop must come up already interrupted.
        assert!(queue.get().is_none());
    }
}
