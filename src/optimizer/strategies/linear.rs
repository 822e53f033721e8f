//! Linear-programming reduction solver
//!
//! The reduction objective and the per-device bounds are both linear, so
//! the problem is solved exactly as an LP. Only good_lp's pure-Rust simplex
//! backend is enabled, so `default_solver` resolves to it and the binary
//! stays free of native solver libraries.

use good_lp::{
    constraint, default_solver, variable, Expression, ProblemVariables, Solution, SolverModel,
    Variable,
};

use crate::error::DrError;
use crate::optimizer::{ReductionProblem, ReductionSolver};

#[derive(Debug, Clone, Copy, Default)]
pub struct LinearProgramSolver;

impl ReductionSolver for LinearProgramSolver {
    fn name(&self) -> &'static str {
        "linear-program"
    }

    fn solve(&self, problem: &ReductionProblem) -> Result<Vec<f64>, DrError> {
        if problem.is_empty() {
            return Ok(Vec::new());
        }

        let mut vars = ProblemVariables::new();
        let x: Vec<Variable> = vars.add_vector(variable(), problem.len());

        // -(C - sum(x)) / C differs from sum(x) / C by a constant, which
        // does not move the optimum.
        let baseline = problem.baseline_total_kw();
        let scale = if baseline > 0.0 { 1.0 / baseline } else { 1.0 };
        let new_total: Expression = x.iter().copied().sum();

        let mut model = vars.minimise(new_total * scale).using(default_solver);
        for bound in &problem.bounds {
            let xi = x[bound.index];
            model = model.with(constraint!(xi >= bound.lower_kw));
            model = model.with(constraint!(xi <= bound.upper_kw));
        }

        let solution = model
            .solve()
            .map_err(|e| DrError::OptimizationFailed(format!("linear program: {e}")))?;

        Ok(x.iter().map(|v| solution.value(*v)).collect())
    }
}
