//! Core execution engine for rowflux pipelines.
//!
//! A pipeline graph is executed as one concurrent worker per stage-copy,
//! connected by bounded link queues. The dispatcher wires the graph, spawns
//! the workers, propagates stop/abort, and aggregates the run result.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod factory;
pub mod queue;
pub mod result;
pub mod stage;
pub mod stages;
pub mod worker;

// Re-export public API for convenience
pub use dispatcher::{start, GraphLink, RunHandle};
pub use error::EngineError;
pub use factory::StageRegistry;
pub use queue::LinkQueue;
pub use result::{RunResult, WorkerMetric};
pub use stage::{Stage, StageContext, StepSignal};
