//! Implements a solver interface for Clarabel
use ::clarabel::algebra::CscMatrix;
use ::clarabel::solver::{
    DefaultSettings, DefaultSolver, IPSolver, SolverStatus, SupportedConeT,
};
use indexmap::IndexMap;
use nalgebra_sparse::{CooMatrix, CscMatrix as SparseCscMatrix};
use tracing::trace;

use crate::configuration::SolverSettings;
use crate::optimize::constraint::Constraint;
use crate::optimize::objective::ObjectiveSense;
use crate::optimize::problem::Problem;
use crate::optimize::solvers::{Solver, SolverError};
use crate::optimize::{OptimizationStatus, ProblemSolution};

/// Solves linear problems with the Clarabel interior point solver
///
/// Clarabel works with problems of the form `min q'x s.t. Ax + s = b, s in K`, so every
/// equality (and fixed variable) becomes a row of the zero cone, and every finite side of
/// an inequality or variable bound becomes a row of the non-negative cone.
#[derive(Clone, Debug)]
pub struct ClarabelSolver {
    /// Maximum number of interior point iterations
    pub max_iter: u32,
}

impl Default for ClarabelSolver {
    fn default() -> Self {
        ClarabelSolver { max_iter: 200 }
    }
}

impl From<&SolverSettings> for ClarabelSolver {
    fn from(settings: &SolverSettings) -> Self {
        ClarabelSolver {
            max_iter: settings.max_iter,
        }
    }
}

/// A single row of `Ax + s = b`
struct Row {
    terms: Vec<(usize, f64)>,
    rhs: f64,
}

/// Where the dual value of a constraint can be found
enum DualRows {
    Zero(usize),
    NonNegative {
        upper: Option<usize>,
        lower: Option<usize>,
    },
}

/// The problem in the form Clarabel expects
struct ConicForm {
    zero_rows: Vec<Row>,
    nonnegative_rows: Vec<Row>,
    duals: Vec<(String, DualRows)>,
}

impl ConicForm {
    fn from_problem(problem: &Problem) -> Self {
        let mut form = ConicForm {
            zero_rows: Vec::new(),
            nonnegative_rows: Vec::new(),
            duals: Vec::new(),
        };
        for constraint in problem.constraints() {
            let terms: Vec<(usize, f64)> = constraint
                .get_terms()
                .iter()
                .map(|t| (t.variable, t.coefficient))
                .collect();
            let rows = match constraint {
                Constraint::Equality { equals, .. } => form.push_zero(terms, *equals),
                Constraint::Inequality {
                    lower_bound,
                    upper_bound,
                    ..
                } => form.push_range(terms, *lower_bound, *upper_bound),
            };
            form.duals.push((constraint.get_id().to_string(), rows));
        }
        for variable in problem.variables() {
            form.push_range(
                vec![(variable.index(), 1.)],
                variable.lower_bound,
                variable.upper_bound,
            );
        }
        form
    }

    fn push_zero(&mut self, terms: Vec<(usize, f64)>, rhs: f64) -> DualRows {
        self.zero_rows.push(Row { terms, rhs });
        DualRows::Zero(self.zero_rows.len() - 1)
    }

    /// Add `lower <= terms <= upper`, skipping infinite sides
    fn push_range(&mut self, terms: Vec<(usize, f64)>, lower: f64, upper: f64) -> DualRows {
        if lower == upper {
            return self.push_zero(terms, lower);
        }
        let mut upper_row = None;
        let mut lower_row = None;
        if upper.is_finite() {
            self.nonnegative_rows.push(Row {
                terms: terms.clone(),
                rhs: upper,
            });
            upper_row = Some(self.nonnegative_rows.len() - 1);
        }
        if lower.is_finite() {
            self.nonnegative_rows.push(Row {
                terms: terms.iter().map(|(j, v)| (*j, -v)).collect(),
                rhs: -lower,
            });
            lower_row = Some(self.nonnegative_rows.len() - 1);
        }
        DualRows::NonNegative {
            upper: upper_row,
            lower: lower_row,
        }
    }

    /// Assemble the constraint matrix and right hand side
    fn assemble(&self, num_variables: usize) -> (CscMatrix<f64>, Vec<f64>) {
        let num_rows = self.zero_rows.len() + self.nonnegative_rows.len();
        let mut coo = CooMatrix::new(num_rows, num_variables);
        let mut rhs = Vec::with_capacity(num_rows);
        for (i, row) in self
            .zero_rows
            .iter()
            .chain(self.nonnegative_rows.iter())
            .enumerate()
        {
            for (j, value) in &row.terms {
                if *value != 0. {
                    coo.push(i, *j, *value);
                }
            }
            rhs.push(row.rhs);
        }
        // Duplicate entries are summed, and row indices sorted, during the conversion
        let csc = SparseCscMatrix::from(&coo);
        let a = CscMatrix::new(
            num_rows,
            num_variables,
            csc.col_offsets().to_vec(),
            csc.row_indices().to_vec(),
            csc.values().to_vec(),
        );
        (a, rhs)
    }

    fn cones(&self) -> Vec<SupportedConeT<f64>> {
        let mut cones = Vec::new();
        if !self.zero_rows.is_empty() {
            cones.push(SupportedConeT::ZeroConeT(self.zero_rows.len()));
        }
        if !self.nonnegative_rows.is_empty() {
            cones.push(SupportedConeT::NonnegativeConeT(self.nonnegative_rows.len()));
        }
        cones
    }

    /// Dual value of a constraint, expressed as the change in the problem's own objective
    /// per unit relaxation of its active side
    fn dual(&self, rows: &DualRows, z: &[f64]) -> f64 {
        let offset = self.zero_rows.len();
        match rows {
            DualRows::Zero(row) => z[*row],
            DualRows::NonNegative { upper, lower } => {
                upper.map(|r| z[offset + r]).unwrap_or(0.)
                    - lower.map(|r| z[offset + r]).unwrap_or(0.)
            }
        }
    }
}

fn map_status(status: SolverStatus) -> OptimizationStatus {
    #[allow(unreachable_patterns)]
    match status {
        SolverStatus::Unsolved => OptimizationStatus::Unoptimized,
        SolverStatus::Solved => OptimizationStatus::Optimal,
        SolverStatus::AlmostSolved => OptimizationStatus::AlmostOptimal,
        SolverStatus::PrimalInfeasible | SolverStatus::AlmostPrimalInfeasible => {
            OptimizationStatus::Infeasible
        }
        SolverStatus::DualInfeasible | SolverStatus::AlmostDualInfeasible => {
            OptimizationStatus::Unbounded
        }
        SolverStatus::NumericalError => OptimizationStatus::NumericalError,
        _ => OptimizationStatus::SolverHalted,
    }
}

impl Solver for ClarabelSolver {
    fn solve(&self, problem: &Problem) -> Result<ProblemSolution, SolverError> {
        let num_variables = problem.num_variables();
        if num_variables == 0 {
            return Ok(ProblemSolution {
                status: OptimizationStatus::Optimal,
                objective_value: Some(0.),
                variable_values: Some(IndexMap::new()),
                dual_values: Some(IndexMap::new()),
            });
        }
        trace!(
            variables = num_variables,
            constraints = problem.num_constraints(),
            "Solving with Clarabel"
        );
        let form = ConicForm::from_problem(problem);
        let (a, b) = form.assemble(num_variables);
        let cones = form.cones();

        // Clarabel always minimizes
        let sign = match problem.objective().sense() {
            ObjectiveSense::Minimize => 1.,
            ObjectiveSense::Maximize => -1.,
        };
        let q: Vec<f64> = problem
            .objective()
            .dense_coefficients(num_variables)
            .into_iter()
            .map(|c| sign * c)
            .collect();
        let p = CscMatrix::new(
            num_variables,
            num_variables,
            vec![0; num_variables + 1],
            Vec::new(),
            Vec::new(),
        );

        let mut settings = DefaultSettings::<f64>::default();
        settings.verbose = false;
        settings.max_iter = self.max_iter;

        let mut solver = DefaultSolver::new(&p, &q, &a, &b, &cones, settings);
        solver.solve();

        let status = map_status(solver.solution.status);
        if !status.has_solution() {
            return Ok(ProblemSolution::unsolved(status));
        }
        let x = &solver.solution.x;
        let z = &solver.solution.z;
        let variable_values = problem
            .variables()
            .map(|var| (var.id.clone(), x[var.index()]))
            .collect();
        // The internal problem is a minimization, so flip back for maximization problems
        let dual_values = form
            .duals
            .iter()
            .map(|(id, rows)| (id.clone(), -sign * form.dual(rows, z)))
            .collect();
        Ok(ProblemSolution {
            status,
            objective_value: Some(problem.objective().evaluate(x)),
            variable_values: Some(variable_values),
            dual_values: Some(dual_values),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_linear_program() {
        // max x + y s.t. x + 2y <= 4, 0 <= x <= 3, 0 <= y <= 10
        let mut problem = Problem::new_maximization();
        problem.add_new_variable("x", 0., 3.).unwrap();
        problem.add_new_variable("y", 0., 10.).unwrap();
        problem
            .add_new_inequality_constraint_by_id(
                "capacity",
                &["x", "y"],
                &[1., 2.],
                f64::NEG_INFINITY,
                4.,
            )
            .unwrap();
        problem.add_linear_objective_term_by_id("x", 1.).unwrap();
        problem.add_linear_objective_term_by_id("y", 1.).unwrap();

        let solution = ClarabelSolver::default().solve(&problem).unwrap();
        assert_eq!(solution.status, OptimizationStatus::Optimal);
        assert!((solution.objective_value.unwrap() - 3.5).abs() < 1e-5);
        assert!((solution.value_at(0).unwrap() - 3.).abs() < 1e-5);
        assert!((solution.value_at(1).unwrap() - 0.5).abs() < 1e-5);
        // One more unit of capacity buys half a unit of y
        assert!((solution.dual("capacity").unwrap() - 0.5).abs() < 1e-5);
    }

    #[test]
    fn minimization_with_equality() {
        // min x + y s.t. x - y = 1, 0 <= x, y <= 5
        let mut problem = Problem::new_minimization();
        problem.add_new_variable("x", 0., 5.).unwrap();
        problem.add_new_variable("y", 0., 5.).unwrap();
        problem
            .add_new_equality_constraint_by_id("difference", &["x", "y"], &[1., -1.], 1.)
            .unwrap();
        problem.add_linear_objective_term_by_id("x", 1.).unwrap();
        problem.add_linear_objective_term_by_id("y", 1.).unwrap();

        let solution = ClarabelSolver::default().solve(&problem).unwrap();
        assert!(solution.status.has_solution());
        assert!((solution.objective_value.unwrap() - 1.).abs() < 1e-5);
        assert!((solution.value_at(0).unwrap() - 1.).abs() < 1e-5);
        assert!(solution.value_at(1).unwrap().abs() < 1e-5);
    }

    #[test]
    fn infeasible_problem() {
        let mut problem = Problem::new_maximization();
        problem.add_new_variable("x", 0., 1.).unwrap();
        problem
            .add_new_equality_constraint_by_id("impossible", &["x"], &[1.], 2.)
            .unwrap();
        problem.add_linear_objective_term_by_id("x", 1.).unwrap();

        let solution = ClarabelSolver::default().solve(&problem).unwrap();
        assert_eq!(solution.status, OptimizationStatus::Infeasible);
        assert!(solution.variable_values.is_none());
    }
}
