//! Static pipeline graph description: stage descriptors and hops.
//!
//! A graph is supplied by configuration loading, treated as read-only by the
//! engine, and used exactly once per run to allocate queues and workers.

use serde::{Deserialize, Serialize};

fn default_copies() -> u32 {
    1
}

fn default_queue_capacity() -> usize {
    64
}

/// Static configuration for one stage: type identifier, declared parallelism,
/// and stage-specific parameters. Immutable during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDescriptor {
    pub name: String,
    pub kind: String,
    #[serde(default = "default_copies")]
    pub copies: u32,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl StageDescriptor {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            copies: 1,
            params: serde_json::Value::Null,
        }
    }

    pub fn with_copies(mut self, copies: u32) -> Self {
        self.copies = copies;
        self
    }

    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }
}

/// A directed stage-level edge. The dispatcher expands copies into one link
/// queue per (producer copy, consumer copy) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hop {
    pub from: String,
    pub to: String,
}

impl Hop {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// The full pipeline graph: stages plus hops plus the default link-queue
/// capacity used for every hop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineGraph {
    #[serde(rename = "pipeline")]
    pub name: String,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    pub stages: Vec<StageDescriptor>,
    #[serde(default)]
    pub hops: Vec<Hop>,
}

impl PipelineGraph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            queue_capacity: default_queue_capacity(),
            stages: Vec::new(),
            hops: Vec::new(),
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn add_stage(mut self, stage: StageDescriptor) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn add_hop(mut self, from: &str, to: &str) -> Self {
        self.hops.push(Hop::new(from, to));
        self
    }

    pub fn stage(&self, name: &str) -> Option<&StageDescriptor> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Names of stages this stage feeds, in hop declaration order.
    pub fn consumers_of<'a>(&'a self, name: &str) -> Vec<&'a str> {
        self.hops
            .iter()
            .filter(|h| h.from == name)
            .map(|h| h.to.as_str())
            .collect()
    }

    /// Names of stages feeding this stage, in hop declaration order.
    pub fn producers_of<'a>(&'a self, name: &str) -> Vec<&'a str> {
        self.hops
            .iter()
            .filter(|h| h.to == name)
            .map(|h| h.from.as_str())
            .collect()
    }
}
