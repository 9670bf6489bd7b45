//! Built-in stage implementations.

pub mod barrier;
pub mod collector;
pub mod filter;
pub mod generator;
pub mod merge;
pub mod passthrough;
pub mod subflow;

pub use barrier::Barrier;
pub use collector::CollectorSink;
pub use filter::FieldFilter;
pub use generator::RowGenerator;
pub use merge::PriorityMerge;
pub use passthrough::Passthrough;
pub use subflow::{FlowInput, FlowOutput};
