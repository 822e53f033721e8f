use serde::{Deserialize, Serialize};

use super::ReductionProblem;
use crate::domain::DeviceSetpoint;
use crate::error::DrError;

/// Solves a reduction problem and returns the new power for every device,
/// index-aligned with the problem's bounds.
pub trait ReductionSolver: Send + Sync {
    fn name(&self) -> &'static str;

    fn solve(&self, problem: &ReductionProblem) -> Result<Vec<f64>, DrError>;
}

/// Solver selected through configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverKind {
    #[default]
    LinearProgram,
    ProjectedGradient,
}

/// Outcome of one engine run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    /// One entry per input device, in input order.
    pub setpoints: Vec<DeviceSetpoint>,
    pub recommendations: Vec<String>,
    pub baseline_total_kw: f64,
    pub optimized_total_kw: f64,
    /// `(baseline - optimized) / baseline`, zero for an idle plant.
    pub reduction_fraction: f64,
}

impl OptimizationResult {
    pub fn is_empty(&self) -> bool {
        self.setpoints.is_empty()
    }

    pub fn reduction_kw(&self) -> f64 {
        self.baseline_total_kw - self.optimized_total_kw
    }
}
