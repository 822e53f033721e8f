use tracing::debug;

use crate::error::DrError;
use crate::optimizer::{ReductionProblem, ReductionSolver};

/// Gradient-based solver: steps along the scaled negative gradient and
/// projects back onto the per-device bounds after every step.
///
/// The gradient is scaled per device by `step_fraction * upper_kw * C`, so
/// each step moves a device by a fixed share of its current power
/// regardless of plant size. A device within `tolerance` kW of its lower
/// bound is snapped onto it. Converges once the projected gradient is zero,
/// i.e. every device with a positive gradient sits on its lower bound.
#[derive(Debug, Clone, Copy)]
pub struct ProjectedGradientSolver {
    pub step_fraction: f64,
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for ProjectedGradientSolver {
    fn default() -> Self {
        Self {
            step_fraction: 0.25,
            max_iterations: 200,
            tolerance: 1e-6,
        }
    }
}

impl ProjectedGradientSolver {
    pub fn new(max_iterations: usize, tolerance: f64) -> Self {
        Self {
            max_iterations,
            tolerance,
            ..Self::default()
        }
    }
}

impl ReductionSolver for ProjectedGradientSolver {
    fn name(&self) -> &'static str {
        "projected-gradient"
    }

    fn solve(&self, problem: &ReductionProblem) -> Result<Vec<f64>, DrError> {
        if problem.is_empty() {
            return Ok(Vec::new());
        }

        let mut x = problem.initial.clone();
        let gradient = problem.objective_gradient();
        let baseline = problem.baseline_total_kw();

        for iteration in 1..=self.max_iterations {
            for bound in &problem.bounds {
                let i = bound.index;
                let step = self.step_fraction * bound.upper_kw * baseline * gradient[i];
                let mut next = (x[i] - step).clamp(bound.lower_kw, bound.upper_kw);
                if next - bound.lower_kw <= self.tolerance {
                    next = bound.lower_kw;
                }
                x[i] = next;
            }

            if x.iter().any(|v| !v.is_finite()) {
                return Err(DrError::OptimizationFailed(format!(
                    "projected gradient diverged at iteration {iteration}"
                )));
            }

            let stationary = problem
                .bounds
                .iter()
                .all(|b| gradient[b.index] <= 0.0 || x[b.index] <= b.lower_kw);
            if stationary {
                debug!(
                    iterations = iteration,
                    objective = problem.objective(&x),
                    "projected gradient converged"
                );
                return Ok(x);
            }
        }

        Err(DrError::OptimizationFailed(format!(
            "projected gradient did not converge within {} iterations",
            self.max_iterations
        )))
    }
}
