//! Flux balance analysis, parsimonious flux balance analysis, and flux variability analysis
//! of a [`ModelSnapshot`]
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::configuration::{SolverSettings, DEFAULT_TOLERANCE};
use crate::metabolic_model::snapshot::ModelSnapshot;
use crate::optimize::constraint::Constraint;
use crate::optimize::objective::ObjectiveSense;
use crate::optimize::problem::Problem;
use crate::optimize::solvers::clarabel::ClarabelSolver;
use crate::optimize::solvers::{Solver, SolverError};
use crate::optimize::ProblemSolution;

/// Id of the constraint holding the original objective near its optimum
const OBJECTIVE_FLOOR_ID: &str = "objective_floor";

/// Fluxes of a parsimonious optimum
#[derive(Clone, Debug, PartialEq)]
pub struct FluxSolution {
    /// Value of the objective that was optimized
    pub objective_value: f64,
    /// Net flux through each reaction, in model order
    pub fluxes: IndexMap<String, f64>,
}

/// Fluxes and reduced costs of an optimum of the model objective
#[derive(Clone, Debug, PartialEq)]
pub struct OptimumSolution {
    pub objective_value: f64,
    pub fluxes: IndexMap<String, f64>,
    /// Change in the objective per unit of flux forced through each reaction
    pub reduced_costs: IndexMap<String, f64>,
}

/// Range of net flux a reaction can carry
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FluxRange {
    pub minimum: f64,
    pub maximum: f64,
}

/// Flux analyses which can be run against a model snapshot
pub trait FluxSolver: Send + Sync {
    /// Optimize the model objective, then minimize the total absolute flux while keeping the
    /// objective at its optimum
    ///
    /// The objective value reported is the minimized total flux.
    fn parsimonious_optimum(&self, snapshot: &ModelSnapshot) -> Result<FluxSolution, SolverError>;

    /// Optimize the model objective, reporting fluxes and reduced costs
    fn optimum(&self, snapshot: &ModelSnapshot) -> Result<OptimumSolution, SolverError>;

    /// Find the minimum and maximum flux of reactions while the objective is held at
    /// `fraction_of_optimum` of its optimum
    ///
    /// # Parameters
    /// - `reactions`: Reactions to analyze, `None` analyzes every reaction
    fn variability(
        &self,
        snapshot: &ModelSnapshot,
        fraction_of_optimum: f64,
        reactions: Option<&[String]>,
    ) -> Result<IndexMap<String, FluxRange>, SolverError>;
}

/// Flux solver which builds a linear [`Problem`] from the snapshot and hands it to a [`Solver`]
///
/// Every reaction is split into a forward and a reverse variable, both non-negative, so the
/// net flux of reaction `k` is `x[2k] - x[2k + 1]`.
#[derive(Clone, Debug)]
pub struct ConstraintBasedSolver<S: Solver = ClarabelSolver> {
    solver: S,
    tolerance: f64,
}

impl<S: Solver> ConstraintBasedSolver<S> {
    pub fn new(solver: S, tolerance: f64) -> Self {
        Self { solver, tolerance }
    }
}

impl Default for ConstraintBasedSolver<ClarabelSolver> {
    fn default() -> Self {
        Self::new(ClarabelSolver::default(), DEFAULT_TOLERANCE)
    }
}

impl From<&SolverSettings> for ConstraintBasedSolver<ClarabelSolver> {
    fn from(settings: &SolverSettings) -> Self {
        Self::new(ClarabelSolver::from(settings), settings.tolerance)
    }
}

/// A flux balance problem together with the net form of its objective
struct FluxProblem {
    problem: Problem,
    objective: Vec<(usize, f64)>,
    reaction_ids: Vec<String>,
}

impl FluxProblem {
    fn forward_index(reaction: usize) -> usize {
        2 * reaction
    }

    fn reverse_index(reaction: usize) -> usize {
        2 * reaction + 1
    }

    /// Net flux of every reaction in a solution
    fn fluxes(&self, solution: &ProblemSolution) -> IndexMap<String, f64> {
        self.reaction_ids
            .iter()
            .enumerate()
            .map(|(k, id)| {
                let forward = solution.value_at(Self::forward_index(k)).unwrap_or(0.);
                let reverse = solution.value_at(Self::reverse_index(k)).unwrap_or(0.);
                (id.clone(), forward - reverse)
            })
            .collect()
    }

    /// Replace the objective with the net flux of a single reaction
    fn target_reaction(&mut self, reaction: usize, sense: ObjectiveSense) -> Result<(), SolverError> {
        self.problem.remove_all_objective_terms();
        self.problem.update_objective_sense(sense);
        self.problem
            .add_linear_objective_term(Self::forward_index(reaction), 1.)?;
        self.problem
            .add_linear_objective_term(Self::reverse_index(reaction), -1.)?;
        Ok(())
    }

    /// Constrain the original objective to stay at or above `floor`
    fn hold_objective(&mut self, floor: f64) -> Result<(), SolverError> {
        let (variables, coefficients): (Vec<usize>, Vec<f64>) =
            self.objective.iter().copied().unzip();
        self.problem.remove_constraint(OBJECTIVE_FLOOR_ID);
        self.problem
            .add_constraint(Constraint::new_inequality(
                OBJECTIVE_FLOOR_ID,
                &variables,
                &coefficients,
                floor,
                f64::INFINITY,
            ))?;
        Ok(())
    }
}

impl<S: Solver> ConstraintBasedSolver<S> {
    fn build(&self, snapshot: &ModelSnapshot) -> Result<FluxProblem, SolverError> {
        let model = snapshot.model();
        let mut problem = Problem::new_maximization();
        let mut reaction_ids = Vec::with_capacity(model.reactions.len());
        let mut balances: IndexMap<&str, (Vec<usize>, Vec<f64>)> = model
            .metabolites
            .keys()
            .map(|id| (id.as_str(), (Vec::new(), Vec::new())))
            .collect();

        for (k, (reaction, bounds)) in snapshot.reactions().enumerate() {
            let (forward_lb, forward_ub) = bounds.forward();
            let (reverse_lb, reverse_ub) = bounds.reverse();
            problem.add_new_variable(&reaction.get_forward_id(), forward_lb, forward_ub)?;
            problem.add_new_variable(&reaction.get_reverse_id(), reverse_lb, reverse_ub)?;
            for (metabolite, coefficient) in &reaction.metabolites {
                let (variables, coefficients) = balances.entry(metabolite.as_str()).or_default();
                variables.push(FluxProblem::forward_index(k));
                coefficients.push(*coefficient);
                variables.push(FluxProblem::reverse_index(k));
                coefficients.push(-*coefficient);
            }
            reaction_ids.push(reaction.id.clone());
        }

        // Steady state, one row per metabolite
        for (metabolite, (variables, coefficients)) in &balances {
            if variables.is_empty() {
                continue;
            }
            problem.add_constraint(Constraint::new_equality(
                metabolite,
                variables,
                coefficients,
                0.,
            ))?;
        }

        let mut objective = Vec::new();
        for (reaction_id, coefficient) in &model.objective {
            if *coefficient == 0. {
                continue;
            }
            let k = reaction_ids
                .iter()
                .position(|id| id == reaction_id)
                .ok_or_else(|| SolverError::UnknownReaction(reaction_id.clone()))?;
            objective.push((FluxProblem::forward_index(k), *coefficient));
            objective.push((FluxProblem::reverse_index(k), -*coefficient));
        }
        if objective.is_empty() {
            return Err(SolverError::NoObjective);
        }
        for (variable, coefficient) in &objective {
            problem.add_linear_objective_term(*variable, *coefficient)?;
        }

        Ok(FluxProblem {
            problem,
            objective,
            reaction_ids,
        })
    }

    /// Solve, turning any status without a solution into an error
    fn solve_checked(&self, problem: &Problem) -> Result<ProblemSolution, SolverError> {
        let solution = self.solver.solve(problem)?;
        if !solution.status.has_solution() {
            return Err(SolverError::from_status(solution.status));
        }
        Ok(solution)
    }

    fn objective_value(solution: &ProblemSolution) -> Result<f64, SolverError> {
        solution
            .objective_value
            .ok_or(SolverError::NotSolved(solution.status))
    }

    /// Lowest objective value allowed when holding the objective at a fraction of `optimum`
    fn objective_floor(&self, optimum: f64, fraction_of_optimum: f64) -> f64 {
        optimum - (1. - fraction_of_optimum) * optimum.abs() - self.tolerance
    }
}

impl<S: Solver + Send + Sync> FluxSolver for ConstraintBasedSolver<S> {
    fn parsimonious_optimum(&self, snapshot: &ModelSnapshot) -> Result<FluxSolution, SolverError> {
        let mut flux_problem = self.build(snapshot)?;
        let optimum = Self::objective_value(&self.solve_checked(&flux_problem.problem)?)?;

        flux_problem.hold_objective(self.objective_floor(optimum, 1.))?;
        flux_problem.problem.remove_all_objective_terms();
        flux_problem
            .problem
            .update_objective_sense(ObjectiveSense::Minimize);
        for variable in 0..flux_problem.problem.num_variables() {
            flux_problem.problem.add_linear_objective_term(variable, 1.)?;
        }

        let solution = self.solve_checked(&flux_problem.problem)?;
        Ok(FluxSolution {
            objective_value: Self::objective_value(&solution)?,
            fluxes: flux_problem.fluxes(&solution),
        })
    }

    fn optimum(&self, snapshot: &ModelSnapshot) -> Result<OptimumSolution, SolverError> {
        let flux_problem = self.build(snapshot)?;
        let solution = self.solve_checked(&flux_problem.problem)?;
        let model = snapshot.model();

        let reduced_costs = flux_problem
            .reaction_ids
            .iter()
            .map(|id| {
                let cost = model.objective.get(id).copied().unwrap_or(0.);
                let priced: f64 = model
                    .reactions
                    .get(id)
                    .map(|reaction| {
                        reaction
                            .metabolites
                            .iter()
                            .map(|(met, coefficient)| {
                                coefficient * solution.dual(met).unwrap_or(0.)
                            })
                            .sum()
                    })
                    .unwrap_or(0.);
                (id.clone(), cost - priced)
            })
            .collect();

        Ok(OptimumSolution {
            objective_value: Self::objective_value(&solution)?,
            fluxes: flux_problem.fluxes(&solution),
            reduced_costs,
        })
    }

    fn variability(
        &self,
        snapshot: &ModelSnapshot,
        fraction_of_optimum: f64,
        reactions: Option<&[String]>,
    ) -> Result<IndexMap<String, FluxRange>, SolverError> {
        let mut flux_problem = self.build(snapshot)?;
        let targets: Vec<(usize, String)> = match reactions {
            Some(ids) => ids
                .iter()
                .map(|id| {
                    flux_problem
                        .reaction_ids
                        .iter()
                        .position(|r| r == id)
                        .map(|k| (k, id.clone()))
                        .ok_or_else(|| SolverError::UnknownReaction(id.clone()))
                })
                .collect::<Result<_, _>>()?,
            None => flux_problem.reaction_ids.iter().cloned().enumerate().collect(),
        };

        let optimum = Self::objective_value(&self.solve_checked(&flux_problem.problem)?)?;
        flux_problem.hold_objective(self.objective_floor(optimum, fraction_of_optimum))?;

        let mut ranges = IndexMap::with_capacity(targets.len());
        for (k, id) in targets {
            flux_problem.target_reaction(k, ObjectiveSense::Minimize)?;
            let minimum = Self::objective_value(&self.solve_checked(&flux_problem.problem)?)?;
            flux_problem.target_reaction(k, ObjectiveSense::Maximize)?;
            let maximum = Self::objective_value(&self.solve_checked(&flux_problem.problem)?)?;
            debug!(reaction = %id, minimum, maximum, "flux variability");
            ranges.insert(id, FluxRange { minimum, maximum });
        }
        Ok(ranges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metabolic_model::reaction::ReactionBounds;
    use crate::testing::linear_pathway;

    fn snapshot() -> ModelSnapshot {
        ModelSnapshot::new(linear_pathway()).unwrap()
    }

    #[test]
    fn optimum_of_linear_pathway() {
        let solution = ConstraintBasedSolver::default()
            .optimum(&snapshot())
            .unwrap();
        assert!((solution.objective_value - 10.).abs() < 1e-3);
        for id in ["EX_A", "R1", "EX_B"] {
            assert!((solution.fluxes[id] - 10.).abs() < 1e-3);
        }
        // Only the uptake limits the objective
        assert!((solution.reduced_costs["EX_A"] - 1.).abs() < 1e-3);
        assert!(solution.reduced_costs["R1"].abs() < 1e-3);
        assert!(solution.reduced_costs["EX_B"].abs() < 1e-3);
    }

    #[test]
    fn parsimonious_reports_total_flux() {
        let solution = ConstraintBasedSolver::default()
            .parsimonious_optimum(&snapshot())
            .unwrap();
        assert!((solution.objective_value - 30.).abs() < 1e-3);
        assert_eq!(solution.fluxes.len(), 3);
        assert!(solution.fluxes.values().all(|f| (f - 10.).abs() < 1e-3));
    }

    #[test]
    fn variability_at_fraction() {
        let solver = ConstraintBasedSolver::default();
        let ranges = solver.variability(&snapshot(), 0.9, None).unwrap();
        assert_eq!(ranges.len(), 3);
        for range in ranges.values() {
            assert!((range.minimum - 9.).abs() < 1e-3);
            assert!((range.maximum - 10.).abs() < 1e-3);
        }

        let only = solver
            .variability(&snapshot(), 1., Some(&["R1".to_string()]))
            .unwrap();
        assert_eq!(only.keys().collect::<Vec<_>>(), vec!["R1"]);
        assert!((only["R1"].minimum - 10.).abs() < 1e-3);

        assert_eq!(
            solver.variability(&snapshot(), 0.9, Some(&["missing".to_string()])),
            Err(SolverError::UnknownReaction("missing".to_string()))
        );
    }

    #[test]
    fn infeasible_bounds() {
        let mut snapshot = snapshot();
        snapshot
            .set_bounds("EX_B", ReactionBounds::new(20., 1000.).unwrap())
            .unwrap();
        let solver = ConstraintBasedSolver::default();
        assert_eq!(
            solver.parsimonious_optimum(&snapshot),
            Err(SolverError::Infeasible)
        );
        assert_eq!(solver.optimum(&snapshot), Err(SolverError::Infeasible));
    }

    #[test]
    fn missing_objective() {
        let mut model = linear_pathway();
        model.objective.clear();
        let snapshot = ModelSnapshot::new(model).unwrap();
        assert_eq!(
            ConstraintBasedSolver::default().optimum(&snapshot),
            Err(SolverError::NoObjective)
        );
    }
}
