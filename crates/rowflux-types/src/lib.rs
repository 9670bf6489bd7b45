//! Shared rowflux data model types.
//!
//! This crate is dependency-light on purpose: it is consumed by the engine,
//! by stage implementations, and by anything that inspects run state.

pub mod graph;
pub mod layout;
pub mod row;
pub mod state;

pub use graph::{Hop, PipelineGraph, StageDescriptor};
pub use layout::{Column, LayoutMismatch, RowLayout};
pub use row::{Row, Value, ValueType};
pub use state::{StageCounters, WorkerState};
