//! Models and solvers shared by the unit tests
use std::sync::atomic::{AtomicUsize, Ordering};

use indexmap::IndexMap;

use crate::metabolic_model::metabolite::Metabolite;
use crate::metabolic_model::model::Model;
use crate::metabolic_model::reaction::ReactionBuilder;
use crate::metabolic_model::snapshot::ModelSnapshot;
use crate::optimize::flux_analysis::{FluxRange, FluxSolution, FluxSolver, OptimumSolution};
use crate::optimize::solvers::SolverError;

fn stoichiometry(entries: &[(&str, f64)]) -> IndexMap<String, f64> {
    entries
        .iter()
        .map(|(met, coefficient)| (met.to_string(), *coefficient))
        .collect()
}

/// `-> A -> B ->` in compartment "c", with uptake of A limited to 10 and export of B as the
/// objective
pub(crate) fn linear_pathway() -> Model {
    let mut model = Model::new_empty();
    model.add_metabolite(Metabolite::in_compartment("A_c", "c"));
    model.add_metabolite(Metabolite::in_compartment("B_c", "c"));
    model.add_reaction(
        ReactionBuilder::default()
            .id("EX_A".to_string())
            .metabolites(stoichiometry(&[("A_c", 1.)]))
            .lower_bound(0.)
            .upper_bound(10.)
            .build()
            .unwrap(),
    );
    model.add_reaction(
        ReactionBuilder::default()
            .id("R1".to_string())
            .metabolites(stoichiometry(&[("A_c", -1.), ("B_c", 1.)]))
            .lower_bound(0.)
            .upper_bound(1000.)
            .build()
            .unwrap(),
    );
    model.add_reaction(
        ReactionBuilder::default()
            .id("EX_B".to_string())
            .metabolites(stoichiometry(&[("B_c", -1.)]))
            .lower_bound(0.)
            .upper_bound(1000.)
            .build()
            .unwrap(),
    );
    model.set_objective_coefficient("EX_B", 1.);
    model
}

/// A NAD/NADH cycle in compartment "c", `R_NAD` is reversible within [-100, 100]
pub(crate) fn two_reactions() -> Model {
    let mut model = Model::new_empty();
    model.add_metabolite(Metabolite::in_compartment("nad_c", "c"));
    model.add_metabolite(Metabolite::in_compartment("nadh_c", "c"));
    model.add_reaction(
        ReactionBuilder::default()
            .id("R_NAD".to_string())
            .metabolites(stoichiometry(&[("nad_c", -1.), ("nadh_c", 1.)]))
            .lower_bound(-100.)
            .upper_bound(100.)
            .build()
            .unwrap(),
    );
    model.add_reaction(
        ReactionBuilder::default()
            .id("R_OTHER".to_string())
            .metabolites(stoichiometry(&[("nadh_c", -1.), ("nad_c", 1.)]))
            .lower_bound(0.)
            .upper_bound(1000.)
            .build()
            .unwrap(),
    );
    model.set_objective_coefficient("R_OTHER", 1.);
    model
}

/// Deterministic flux solver
///
/// Every reaction carries its preset flux (zero if none), clamped into its current bounds.
/// Variability ranges span `fraction * flux` to `flux`, and reduced costs are all zero.
pub(crate) struct StubSolver {
    fluxes: IndexMap<String, f64>,
    infeasible: bool,
    /// Number of analyses run
    pub solves: AtomicUsize,
}

impl StubSolver {
    pub(crate) fn with_fluxes(fluxes: &[(&str, f64)]) -> Self {
        StubSolver {
            fluxes: stoichiometry(fluxes),
            infeasible: false,
            solves: AtomicUsize::new(0),
        }
    }

    pub(crate) fn infeasible() -> Self {
        StubSolver {
            fluxes: IndexMap::new(),
            infeasible: true,
            solves: AtomicUsize::new(0),
        }
    }

    fn clamped(&self, snapshot: &ModelSnapshot) -> Result<IndexMap<String, f64>, SolverError> {
        self.solves.fetch_add(1, Ordering::SeqCst);
        if self.infeasible {
            return Err(SolverError::Infeasible);
        }
        Ok(snapshot
            .bounds_table()
            .iter()
            .map(|(id, bounds)| {
                let flux = self.fluxes.get(id).copied().unwrap_or(0.);
                (
                    id.clone(),
                    flux.clamp(bounds.lower_bound(), bounds.upper_bound()),
                )
            })
            .collect())
    }
}

impl FluxSolver for StubSolver {
    fn parsimonious_optimum(&self, snapshot: &ModelSnapshot) -> Result<FluxSolution, SolverError> {
        let fluxes = self.clamped(snapshot)?;
        Ok(FluxSolution {
            objective_value: fluxes.values().map(|f| f.abs()).sum(),
            fluxes,
        })
    }

    fn optimum(&self, snapshot: &ModelSnapshot) -> Result<OptimumSolution, SolverError> {
        let fluxes = self.clamped(snapshot)?;
        let objective_value = snapshot
            .model()
            .objective
            .iter()
            .map(|(id, coefficient)| coefficient * fluxes.get(id).copied().unwrap_or(0.))
            .sum();
        Ok(OptimumSolution {
            objective_value,
            reduced_costs: fluxes.keys().map(|id| (id.clone(), 0.)).collect(),
            fluxes,
        })
    }

    fn variability(
        &self,
        snapshot: &ModelSnapshot,
        fraction_of_optimum: f64,
        reactions: Option<&[String]>,
    ) -> Result<IndexMap<String, FluxRange>, SolverError> {
        let fluxes = self.clamped(snapshot)?;
        let range = |flux: f64| {
            let reduced = fraction_of_optimum * flux;
            FluxRange {
                minimum: reduced.min(flux),
                maximum: reduced.max(flux),
            }
        };
        match reactions {
            None => Ok(fluxes
                .iter()
                .map(|(id, flux)| (id.clone(), range(*flux)))
                .collect()),
            Some(ids) => ids
                .iter()
                .map(|id| {
                    fluxes
                        .get(id)
                        .map(|flux| (id.clone(), range(*flux)))
                        .ok_or_else(|| SolverError::UnknownReaction(id.clone()))
                })
                .collect(),
        }
    }
}
