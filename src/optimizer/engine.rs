//! Demand-response optimization engine
//!
//! Turns a list of devices into a reduction problem, hands it to the
//! configured solver and derives everything downstream of the new power
//! setpoints: dependent attributes, pump status and recommendation text.
//!
//! The objective has no term tying the total reduction to an external
//! target (e.g. a curtailment request from the grid operator), so every
//! device ends on its reduction floor. Re-running on already-reduced
//! values compounds the floor.

use tracing::debug;

use super::{
    LinearProgramSolver, OptimizationResult, ProjectedGradientSolver, ReductionProblem,
    ReductionSolver, SolverKind, BOUND_TOLERANCE_KW,
};
use crate::config::OptimizerConfig;
use crate::domain::{DeviceKind, DeviceSetpoint, DeviceState, GridSnapshot, PumpStatus};
use crate::error::DrError;

pub struct DemandResponseEngine {
    solver: Box<dyn ReductionSolver>,
}

impl Default for DemandResponseEngine {
    fn default() -> Self {
        Self::new(Box::new(LinearProgramSolver))
    }
}

impl DemandResponseEngine {
    pub fn new(solver: Box<dyn ReductionSolver>) -> Self {
        Self { solver }
    }

    pub fn from_config(cfg: &OptimizerConfig) -> Self {
        let solver: Box<dyn ReductionSolver> = match cfg.solver {
            SolverKind::LinearProgram => Box::new(LinearProgramSolver),
            SolverKind::ProjectedGradient => Box::new(ProjectedGradientSolver::new(
                cfg.max_iterations,
                cfg.tolerance,
            )),
        };
        Self::new(solver)
    }

    pub fn solver_name(&self) -> &'static str {
        self.solver.name()
    }

    /// Computes new power setpoints for `devices`.
    ///
    /// Results are positional: `setpoints[i]` belongs to `devices[i]`.
    /// An empty device list yields an empty result.
    pub fn optimize(
        &self,
        devices: &[DeviceState],
        grid: &GridSnapshot,
        max_reduction: f64,
    ) -> Result<OptimizationResult, DrError> {
        if devices.is_empty() {
            return Ok(OptimizationResult::default());
        }

        if let Some(bad) = devices
            .iter()
            .find(|d| !d.power_kw.is_finite() || d.power_kw < 0.0)
        {
            return Err(DrError::InvalidSnapshot(format!(
                "{} {} has invalid power {}",
                bad.kind, bad.id, bad.power_kw
            )));
        }

        let problem = ReductionProblem::new(devices, max_reduction)?;
        let solution = self.solver.solve(&problem)?;
        let solution = settle_into_bounds(&problem, solution, self.solver.name())?;

        let mut setpoints = Vec::with_capacity(devices.len());
        let mut recommendations = Vec::new();
        for (device, &new_power_kw) in devices.iter().zip(&solution) {
            let setpoint = derive_setpoint(device, new_power_kw);
            if let Some(text) = recommendation(device.kind, &device.id, device.power_kw, new_power_kw) {
                recommendations.push(text);
            }
            setpoints.push(setpoint);
        }

        let baseline_total_kw = problem.baseline_total_kw();
        let optimized_total_kw: f64 = solution.iter().sum();
        let reduction_fraction = -problem.objective(&solution);

        debug!(
            solver = self.solver.name(),
            devices = devices.len(),
            baseline_total_kw,
            optimized_total_kw,
            reduction_pct = reduction_fraction * 100.0,
            grid_demand_kw = grid.demand_kw,
            grid_price = grid.price_per_kwh,
            "optimization complete"
        );

        Ok(OptimizationResult {
            setpoints,
            recommendations,
            baseline_total_kw,
            optimized_total_kw,
            reduction_fraction,
        })
    }
}

/// Rejects solutions outside the bounds and clamps away solver round-off.
fn settle_into_bounds(
    problem: &ReductionProblem,
    mut solution: Vec<f64>,
    solver: &str,
) -> Result<Vec<f64>, DrError> {
    if solution.len() != problem.len() {
        return Err(DrError::OptimizationFailed(format!(
            "{solver} returned {} values for {} devices",
            solution.len(),
            problem.len()
        )));
    }
    if !problem.is_feasible(&solution, BOUND_TOLERANCE_KW) {
        return Err(DrError::OptimizationFailed(format!(
            "{solver} returned a solution outside the reduction bounds"
        )));
    }
    for bound in &problem.bounds {
        let value = &mut solution[bound.index];
        *value = value.clamp(bound.lower_kw, bound.upper_kw);
    }
    Ok(solution)
}

/// Scales the dependent attribute linearly with the power ratio. A device
/// drawing no power keeps its attribute.
fn derive_setpoint(device: &DeviceState, new_power_kw: f64) -> DeviceSetpoint {
    let ratio = if device.power_kw == 0.0 {
        1.0
    } else {
        new_power_kw / device.power_kw
    };
    DeviceSetpoint {
        kind: device.kind,
        id: device.id.clone(),
        power_kw: new_power_kw,
        dependent_attribute: device.dependent_attribute * ratio,
        status: match device.kind {
            DeviceKind::Pump => Some(PumpStatus::from_power(new_power_kw)),
            DeviceKind::AerationBasin => None,
        },
    }
}

/// Human-readable advice for one device, `None` when power is unchanged.
pub fn recommendation(kind: DeviceKind, id: &str, current_kw: f64, optimized_kw: f64) -> Option<String> {
    if optimized_kw < current_kw {
        Some(format!(
            "Reduce power of {kind} {id} from {current_kw:.2} to {optimized_kw:.2}"
        ))
    } else if optimized_kw > current_kw {
        Some(format!(
            "Increase power of {kind} {id} from {current_kw:.2} to {optimized_kw:.2}"
        ))
    } else {
        None
    }
}
