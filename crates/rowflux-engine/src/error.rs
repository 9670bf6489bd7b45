//! Engine error model.

use rowflux_types::layout::LayoutMismatch;

/// Categorized engine error.
///
/// `Layout` wraps a typed layout incompatibility naming the offending queue.
///
/// `Graph` carries graph-fatal configuration problems detected before any
/// worker starts; the message lists every problem found.
///
/// `Stage` wraps a stage-fatal failure attributed to one worker.
///
/// `Infrastructure` wraps opaque host-side errors (task panics, channel
/// failures, config file I/O, etc.).
#[derive(Debug)]
pub enum EngineError {
    /// Rows from the named queue do not match the consumer's reference layout.
    Layout {
        queue: String,
        mismatch: LayoutMismatch,
    },
    /// Graph-fatal configuration error; the run never starts.
    Graph(String),
    /// Stage-fatal failure attributed to one worker copy.
    Stage { stage: String, message: String },
    /// Infrastructure error (task panic, channel, file I/O, etc.)
    Infrastructure(anyhow::Error),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Layout { queue, mismatch } => {
                write!(f, "row layout mismatch on queue [{queue}]: {mismatch}")
            }
            Self::Graph(msg) => write!(f, "invalid pipeline graph: {msg}"),
            Self::Stage { stage, message } => write!(f, "stage '{stage}' failed: {message}"),
            Self::Infrastructure(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<anyhow::Error> for EngineError {
    fn from(e: anyhow::Error) -> Self {
        Self::Infrastructure(e)
    }
}

impl EngineError {
    /// Stage-fatal error constructor used by stage implementations.
    pub fn stage(stage: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Stage {
            stage: stage.into(),
            message: message.to_string(),
        }
    }

    /// Returns the layout mismatch if this is a `Layout` error.
    pub fn as_layout_mismatch(&self) -> Option<&LayoutMismatch> {
        match self {
            Self::Layout { mismatch, .. } => Some(mismatch),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowflux_types::layout::{Column, LayoutMismatch};
    use rowflux_types::row::ValueType;

    #[test]
    fn test_layout_error_display_names_queue() {
        let err = EngineError::Layout {
            queue: "a.0 -> b.0".to_string(),
            mismatch: LayoutMismatch::ColumnCount {
                expected: 3,
                found: 2,
            },
        };
        let msg = format!("{err}");
        assert!(msg.contains("a.0 -> b.0"));
        assert!(msg.contains("expected 3"));
        assert!(err.as_layout_mismatch().is_some());
    }

    #[test]
    fn test_stage_error_display() {
        let err = EngineError::stage("filter", "field 'amount' not found");
        let msg = format!("{err}");
        assert!(msg.contains("filter"));
        assert!(msg.contains("amount"));
    }

    #[test]
    fn test_from_anyhow() {
        let err: EngineError = anyhow::anyhow!("task panicked").into();
        assert!(matches!(err, EngineError::Infrastructure(_)));
        assert!(err.as_layout_mismatch().is_none());
    }

    #[test]
    fn test_column_mismatch_display() {
        let err = EngineError::Layout {
            queue: "q".to_string(),
            mismatch: LayoutMismatch::Column {
                index: 1,
                expected: Column::new("name", ValueType::Utf8),
                found: Column::new("label", ValueType::Utf8),
            },
        };
        let msg = format!("{err}");
        assert!(msg.contains("column 1"));
        assert!(msg.contains("label"));
    }
}
