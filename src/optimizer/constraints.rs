use serde::{Deserialize, Serialize};

use crate::domain::DeviceState;
use crate::error::DrError;

/// Allowed drift (kW) between a solver's answer and its bounds.
pub const BOUND_TOLERANCE_KW: f64 = 1e-6;

/// Box constraint for one decision variable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReductionBound {
    pub index: usize,
    /// Reduction floor, `power * (1 - max_reduction)`.
    pub lower_kw: f64,
    /// Current power; the engine never proposes an increase.
    pub upper_kw: f64,
}

impl ReductionBound {
    pub fn contains(&self, value_kw: f64, tolerance: f64) -> bool {
        value_kw >= self.lower_kw - tolerance && value_kw <= self.upper_kw + tolerance
    }
}

/// Decision vector, starting point and bounds for one solve.
#[derive(Debug, Clone, PartialEq)]
pub struct ReductionProblem {
    /// Starting point: current power of every device (always feasible).
    pub initial: Vec<f64>,
    pub bounds: Vec<ReductionBound>,
}

impl ReductionProblem {
    pub fn new(devices: &[DeviceState], max_reduction: f64) -> Result<Self, DrError> {
        if !max_reduction.is_finite() || max_reduction < 0.0 {
            return Err(DrError::OptimizationFailed(format!(
                "max reduction {max_reduction} is outside [0, 1)"
            )));
        }
        if max_reduction >= 1.0 {
            return Err(DrError::OptimizationFailed(format!(
                "max reduction {max_reduction} puts the reduction floor at or below zero"
            )));
        }

        let bounds = devices
            .iter()
            .enumerate()
            .map(|(index, device)| ReductionBound {
                index,
                lower_kw: device.power_kw * (1.0 - max_reduction),
                upper_kw: device.power_kw,
            })
            .collect();

        Ok(Self {
            initial: devices.iter().map(|d| d.power_kw).collect(),
            bounds,
        })
    }

    pub fn len(&self) -> usize {
        self.initial.len()
    }

    pub fn is_empty(&self) -> bool {
        self.initial.is_empty()
    }

    pub fn baseline_total_kw(&self) -> f64 {
        self.initial.iter().sum()
    }

    /// Negative fractional reduction of total power; lower is better.
    pub fn objective(&self, x: &[f64]) -> f64 {
        let baseline = self.baseline_total_kw();
        if baseline <= 0.0 {
            return 0.0;
        }
        let new_total: f64 = x.iter().sum();
        -(baseline - new_total) / baseline
    }

    /// Gradient of [`Self::objective`]. Constant because the objective is linear.
    pub fn objective_gradient(&self) -> Vec<f64> {
        let baseline = self.baseline_total_kw();
        let component = if baseline > 0.0 { 1.0 / baseline } else { 0.0 };
        vec![component; self.len()]
    }

    pub fn is_feasible(&self, x: &[f64], tolerance: f64) -> bool {
        x.len() == self.len()
            && self
                .bounds
                .iter()
                .all(|b| x[b.index].is_finite() && b.contains(x[b.index], tolerance))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DeviceKind;

    fn devices(powers: &[f64]) -> Vec<DeviceState> {
        powers
            .iter()
            .enumerate()
            .map(|(i, p)| DeviceState {
                kind: DeviceKind::Pump,
                id: format!("pump{:03}", i + 1),
                power_kw: *p,
                dependent_attribute: 0.8,
            })
            .collect()
    }

    #[test]
    fn test_bounds_follow_reduction_floor() {
        let problem = ReductionProblem::new(&devices(&[100.0, 50.0]), 0.3).unwrap();
        assert_eq!(problem.initial, vec![100.0, 50.0]);
        assert!((problem.bounds[0].lower_kw - 70.0).abs() < 1e-9);
        assert_eq!(problem.bounds[0].upper_kw, 100.0);
        assert!((problem.bounds[1].lower_kw - 35.0).abs() < 1e-9);
        assert_eq!(problem.bounds[1].index, 1);
    }

    #[test]
    fn test_initial_guess_is_feasible() {
        let problem = ReductionProblem::new(&devices(&[100.0, 0.0, 12.0]), 0.3).unwrap();
        assert!(problem.is_feasible(&problem.initial, 0.0));
        assert!(!problem.is_feasible(&[100.0, 0.0], 0.0));
        assert!(!problem.is_feasible(&[101.0, 0.0, 12.0], BOUND_TOLERANCE_KW));
    }

    #[test]
    fn test_rejects_reduction_at_or_above_one() {
        assert!(matches!(
            ReductionProblem::new(&devices(&[100.0]), 1.5),
            Err(DrError::OptimizationFailed(_))
        ));
        assert!(ReductionProblem::new(&devices(&[100.0]), 1.0).is_err());
        assert!(ReductionProblem::new(&devices(&[100.0]), -0.1).is_err());
        assert!(ReductionProblem::new(&devices(&[100.0]), f64::NAN).is_err());
    }

    #[test]
    fn test_objective_is_negative_fractional_reduction() {
        let problem = ReductionProblem::new(&devices(&[100.0, 100.0]), 0.3).unwrap();
        assert_eq!(problem.objective(&problem.initial), 0.0);
        assert!((problem.objective(&[70.0, 70.0]) + 0.3).abs() < 1e-12);
        assert_eq!(problem.objective_gradient(), vec![0.005, 0.005]);
    }

    #[test]
    fn test_idle_plant_has_flat_objective() {
        let problem = ReductionProblem::new(&devices(&[0.0, 0.0]), 0.3).unwrap();
        assert_eq!(problem.objective(&[0.0, 0.0]), 0.0);
        assert_eq!(problem.objective_gradient(), vec![0.0, 0.0]);
    }
}
