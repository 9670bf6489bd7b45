//! Sub-flow boundary pair: bridges link queues into a nested graph after
//! both graphs have started.
//!
//! Wiring is two-phase: `FlowInput` workers expose a late-input port at
//! graph build (phase 1); a `FlowOutput` in the parent graph allocates fresh
//! queues and binds them once its own graph signals running (phase 2). Both
//! sides bound their waits so a graph that never comes up fails fatally
//! instead of hanging.

use std::time::Duration;

use crate::dispatcher::GraphLink;
use crate::error::EngineError;
use crate::queue::LinkQueue;
use crate::stage::{Stage, StageContext, StepSignal};

const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Producer-side boundary: forwards its input rows into named target stages
/// of a nested graph, over queues allocated at runtime.
///
/// Constructed programmatically (the [`GraphLink`] cannot come from config);
/// register it on a [`crate::factory::StageRegistry`] with a closure that
/// captures the link.
pub struct FlowOutput {
    link: GraphLink,
    targets: Vec<String>,
    queue_capacity: usize,
    handshake_timeout: Duration,
    wired: bool,
}

impl FlowOutput {
    pub fn new(link: GraphLink, targets: Vec<String>) -> Self {
        Self {
            link,
            targets,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            wired: false,
        }
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }
}

impl Stage for FlowOutput {
    fn init(&mut self, ctx: &mut StageContext) -> Result<(), EngineError> {
        if self.targets.is_empty() {
            return Err(EngineError::stage(
                ctx.stage_name(),
                "sub-flow output has no target stages",
            ));
        }
        // Unresolved targets fail fast, before any row flows anywhere.
        for target in &self.targets {
            if self.link.registry().find_all(target).is_empty() {
                return Err(EngineError::stage(
                    ctx.stage_name(),
                    format!("sub-flow target stage '{target}' not found in nested graph"),
                ));
            }
        }
        Ok(())
    }

    fn process(&mut self, ctx: &mut StageContext) -> Result<StepSignal, EngineError> {
        if !self.wired {
            if !ctx.control().wait_until_running(self.handshake_timeout) {
                return Err(EngineError::stage(
                    ctx.stage_name(),
                    format!(
                        "parent graph did not reach running state within {:?}",
                        self.handshake_timeout
                    ),
                ));
            }
            for target in &self.targets {
                for cell in self.link.registry().find_all(target) {
                    let name = format!(
                        "{}.{} -> {}.{} (sub-flow)",
                        ctx.stage_name(),
                        ctx.copy(),
                        cell.stage_name(),
                        cell.copy()
                    );
                    let queue =
                        LinkQueue::new(ctx.stage_name(), cell.stage_name(), name, self.queue_capacity);
                    // Both runs must be able to interrupt the bridge on stop.
                    self.link.control().add_queue(queue.clone());
                    ctx.control().add_queue(queue.clone());
                    ctx.add_output(queue.clone());
                    cell.bind_late_input(queue);
                }
            }
            self.wired = true;
            tracing::info!(
                stage = ctx.stage_name(),
                targets = self.targets.len(),
                "Sub-flow output queues bound"
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

/// Consumer-side boundary: a stage whose input queues arrive at runtime,
/// bound by a `FlowOutput` on the other side of the graph boundary.
pub struct FlowInput {
    bind_timeout: Duration,
    bound: bool,
}

impl FlowInput {
    pub fn new() -> Self {
        Self {
            bind_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            bound: false,
        }
    }

    pub fn with_bind_timeout(mut self, timeout: Duration) -> Self {
        self.bind_timeout = timeout;
        self
    }
}

impl Default for FlowInput {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage for FlowInput {
    fn init(&mut self, _ctx: &mut StageContext) -> Result<(), EngineError> {
        Ok(())
    }

    fn process(&mut self, ctx: &mut StageContext) -> Result<StepSignal, EngineError> {
        if !self.bound {
            let adopted = ctx.adopt_late_inputs(self.bind_timeout);
            if adopted == 0 {
                if ctx.stop_requested() {
                    return Ok(StepSignal::Continue);
                }
                return Err(EngineError::stage(
                    ctx.stage_name(),
                    format!(
                        "no sub-flow producer bound an input within {:?}",
                        self.bind_timeout
                    ),
                ));
            }
            self.bound = true;
            tracing::debug!(
                stage = ctx.stage_name(),
                inputs = adopted,
                "Sub-flow inputs bound"
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
