use thiserror::Error;

/// Errors raised while running a control tick.
///
/// None of these terminate the control loop; each one maps to a recovery
/// path (carry over, skip the tick, or log and continue).
#[derive(Debug, Error)]
pub enum DrError {
    /// The solver did not converge or the bounds were infeasible.
    #[error("optimization failed: {0}")]
    OptimizationFailed(String),

    /// A telemetry or dashboard publish call failed.
    #[error("sink {sink} unavailable: {reason}")]
    SinkUnavailable { sink: String, reason: String },

    /// The generator returned malformed or empty device data.
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

impl DrError {
    pub fn sink(sink: impl Into<String>, reason: impl ToString) -> Self {
        DrError::SinkUnavailable {
            sink: sink.into(),
            reason: reason.to_string(),
        }
    }

    /// Short component name used in structured logs.
    pub fn component(&self) -> &'static str {
        match self {
            DrError::OptimizationFailed(_) => "optimizer",
            DrError::SinkUnavailable { .. } => "sink",
            DrError::InvalidSnapshot(_) => "generator",
        }
    }
}
