//! Rebinding a model's reaction bounds to a new cofactor concentration
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::configuration::IntegrationSettings;
use crate::integration::rescale::{rescale_point, rescale_range, RescaleError};
use crate::kinetics::mapping::IdentifierMapping;
use crate::kinetics::selector::{select_km, KmUnavailable};
use crate::kinetics::table::KineticTable;
use crate::metabolic_model::reaction::ReactionBounds;
use crate::metabolic_model::snapshot::ModelSnapshot;
use crate::optimize::flux_analysis::{FluxRange, FluxSolver};
use crate::optimize::solvers::SolverError;

/// Cofactor concentration of each compartment
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConcentrationMap(IndexMap<String, f64>);

impl ConcentrationMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, compartment: &str, concentration: f64) {
        self.0.insert(compartment.to_string(), concentration);
    }

    pub fn get(&self, compartment: &str) -> Option<f64> {
        self.0.get(compartment).copied()
    }

    /// Every concentration multiplied by `ratio`
    pub fn scaled(&self, ratio: f64) -> Self {
        ConcentrationMap(
            self.0
                .iter()
                .map(|(compartment, c)| (compartment.clone(), c * ratio))
                .collect(),
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(compartment, c)| (compartment.as_str(), *c))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check that every concentration is a positive finite number
    pub fn validate(&self) -> Result<(), InvalidConcentration> {
        match self.iter().find(|(_, c)| !(c.is_finite() && *c > 0.)) {
            Some((compartment, concentration)) => Err(InvalidConcentration {
                compartment: compartment.to_string(),
                concentration,
            }),
            None => Ok(()),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("Concentration {concentration} of compartment {compartment} is not a positive number")]
pub struct InvalidConcentration {
    pub compartment: String,
    pub concentration: f64,
}

impl FromIterator<(String, f64)> for ConcentrationMap {
    fn from_iter<T: IntoIterator<Item = (String, f64)>>(iter: T) -> Self {
        ConcentrationMap(iter.into_iter().collect())
    }
}

/// Where the fluxes that get rescaled come from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Baseline {
    /// A parsimonious optimum, each flux becomes a bound between zero and its rescaled value
    Parsimonious,
    /// Flux variability at the configured fraction of the optimum
    Variability,
    /// The snapshot's current bounds, no solve needed
    ExistingBounds,
}

/// A reaction whose bounds were rescaled
#[derive(Clone, Debug, PartialEq)]
pub struct AdjustedReaction {
    pub reaction: String,
    pub km: f64,
    pub before: ReactionBounds,
    pub after: ReactionBounds,
}

/// A reaction left at its bounds because no Km was available
#[derive(Clone, Debug, PartialEq)]
pub struct SkippedReaction {
    pub reaction: String,
    pub reason: KmUnavailable,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RebindReport {
    pub adjusted: Vec<AdjustedReaction>,
    pub skipped: Vec<SkippedReaction>,
}

/// A rebound snapshot together with what was done to get it
#[derive(Clone, Debug)]
pub struct Rebound {
    pub snapshot: ModelSnapshot,
    pub report: RebindReport,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RebindError {
    #[error("No concentration for compartment {compartment:?} of reaction {reaction}")]
    UnknownCompartment {
        reaction: String,
        compartment: Option<String>,
    },
    #[error("Failed to rescale reaction {reaction}")]
    Rescale {
        reaction: String,
        #[source]
        source: RescaleError,
    },
    #[error("The baseline has no flux for reaction {0}")]
    MissingBaseline(String),
    #[error("Failed to solve for the baseline fluxes")]
    Solver(#[from] SolverError),
}

/// A reaction which has a Km, with the concentrations of its compartment
struct Adjustment {
    reaction: String,
    km: f64,
    c_old: f64,
    c_new: f64,
}

enum BaselineFluxes {
    Points(IndexMap<String, f64>),
    Ranges(IndexMap<String, FluxRange>),
    Existing,
}

/// Rescales reaction bounds of model snapshots using a fixed set of kinetic data
#[derive(Clone, Debug)]
pub struct Rebinder {
    mapping: IdentifierMapping,
    table: KineticTable,
    settings: IntegrationSettings,
}

impl Rebinder {
    pub fn new(mapping: IdentifierMapping, table: KineticTable, settings: IntegrationSettings) -> Self {
        Rebinder {
            mapping,
            table,
            settings,
        }
    }

    pub fn settings(&self) -> &IntegrationSettings {
        &self.settings
    }

    pub fn mapping(&self) -> &IdentifierMapping {
        &self.mapping
    }

    pub fn table(&self) -> &KineticTable {
        &self.table
    }

    /// Rebind the snapshot from concentrations `c_old` to `c_new`
    ///
    /// Reactions without a Km keep their bounds and are listed in the report. The input
    /// snapshot is left as it is, the returned one shares its topology.
    pub fn rebind<S: FluxSolver + ?Sized>(
        &self,
        snapshot: &ModelSnapshot,
        solver: &S,
        c_old: &ConcentrationMap,
        c_new: &ConcentrationMap,
        baseline: Baseline,
    ) -> Result<Rebound, RebindError> {
        let (adjustments, skipped) = self.plan(snapshot, c_old, c_new)?;
        let fluxes = match baseline {
            Baseline::ExistingBounds => BaselineFluxes::Existing,
            // Nothing will be rescaled, so the baseline isn't needed
            _ if adjustments.is_empty() => BaselineFluxes::Existing,
            Baseline::Parsimonious => {
                BaselineFluxes::Points(solver.parsimonious_optimum(snapshot)?.fluxes)
            }
            Baseline::Variability => {
                let reactions: Vec<String> =
                    adjustments.iter().map(|a| a.reaction.clone()).collect();
                BaselineFluxes::Ranges(solver.variability(
                    snapshot,
                    self.settings.fraction_of_optimum,
                    Some(&reactions),
                )?)
            }
        };
        let rebound = self.apply(snapshot, adjustments, skipped, &fluxes)?;
        info!(
            ?baseline,
            adjusted = rebound.report.adjusted.len(),
            skipped = rebound.report.skipped.len(),
            "rebound model"
        );
        Ok(rebound)
    }

    /// Rebind using a parsimonious optimum as the baseline
    pub fn rebind_parsimonious<S: FluxSolver + ?Sized>(
        &self,
        snapshot: &ModelSnapshot,
        solver: &S,
        c_old: &ConcentrationMap,
        c_new: &ConcentrationMap,
    ) -> Result<Rebound, RebindError> {
        self.rebind(snapshot, solver, c_old, c_new, Baseline::Parsimonious)
    }

    /// Rebind using flux variability as the baseline
    pub fn rebind_variability<S: FluxSolver + ?Sized>(
        &self,
        snapshot: &ModelSnapshot,
        solver: &S,
        c_old: &ConcentrationMap,
        c_new: &ConcentrationMap,
    ) -> Result<Rebound, RebindError> {
        self.rebind(snapshot, solver, c_old, c_new, Baseline::Variability)
    }

    /// Rebind using the snapshot's current bounds as the baseline
    pub fn rebind_bounds(
        &self,
        snapshot: &ModelSnapshot,
        c_old: &ConcentrationMap,
        c_new: &ConcentrationMap,
    ) -> Result<Rebound, RebindError> {
        let (adjustments, skipped) = self.plan(snapshot, c_old, c_new)?;
        let rebound = self.apply(snapshot, adjustments, skipped, &BaselineFluxes::Existing)?;
        info!(
            baseline = ?Baseline::ExistingBounds,
            adjusted = rebound.report.adjusted.len(),
            skipped = rebound.report.skipped.len(),
            "rebound model"
        );
        Ok(rebound)
    }

    /// Select the Km of every reaction and look up the concentrations of those which have one
    fn plan(
        &self,
        snapshot: &ModelSnapshot,
        c_old: &ConcentrationMap,
        c_new: &ConcentrationMap,
    ) -> Result<(Vec<Adjustment>, Vec<SkippedReaction>), RebindError> {
        let model = snapshot.model();
        let mut adjustments = Vec::new();
        let mut skipped = Vec::new();
        for reaction_id in snapshot.bounds_table().keys() {
            let km = match select_km(
                reaction_id,
                &self.mapping,
                &self.table,
                self.settings.id_type,
                &self.settings.preference,
                self.settings.tie_break,
            ) {
                Ok(km) => km,
                Err(reason) => {
                    debug!(reaction = %reaction_id, %reason, "no Km, keeping bounds");
                    skipped.push(SkippedReaction {
                        reaction: reaction_id.clone(),
                        reason,
                    });
                    continue;
                }
            };
            let compartment = model.reaction_compartment(reaction_id);
            let concentrations =
                compartment.and_then(|comp| Some((c_old.get(comp)?, c_new.get(comp)?)));
            let Some((old, new)) = concentrations else {
                return Err(RebindError::UnknownCompartment {
                    reaction: reaction_id.clone(),
                    compartment: compartment.map(str::to_string),
                });
            };
            adjustments.push(Adjustment {
                reaction: reaction_id.clone(),
                km,
                c_old: old,
                c_new: new,
            });
        }
        Ok((adjustments, skipped))
    }

    /// Build the new bounds table, failing before anything is returned if any reaction can't
    /// be rescaled
    fn apply(
        &self,
        snapshot: &ModelSnapshot,
        adjustments: Vec<Adjustment>,
        skipped: Vec<SkippedReaction>,
        fluxes: &BaselineFluxes,
    ) -> Result<Rebound, RebindError> {
        let mut bounds = snapshot.bounds_table().clone();
        let mut adjusted = Vec::with_capacity(adjustments.len());
        for adjustment in adjustments {
            let Adjustment {
                reaction,
                km,
                c_old,
                c_new,
            } = adjustment;
            let Some(before) = bounds.get(&reaction).copied() else {
                return Err(RebindError::MissingBaseline(reaction));
            };
            let rescaled = match fluxes {
                BaselineFluxes::Points(points) => {
                    let flux = points
                        .get(&reaction)
                        .copied()
                        .ok_or_else(|| RebindError::MissingBaseline(reaction.clone()))?;
                    rescale_point(flux, km, c_old, c_new)
                }
                BaselineFluxes::Ranges(ranges) => {
                    let range = ranges
                        .get(&reaction)
                        .ok_or_else(|| RebindError::MissingBaseline(reaction.clone()))?;
                    rescale_range(range.minimum, range.maximum, km, c_old, c_new)
                }
                BaselineFluxes::Existing => rescale_range(
                    before.lower_bound(),
                    before.upper_bound(),
                    km,
                    c_old,
                    c_new,
                ),
            };
            let after = rescaled.map_err(|source| RebindError::Rescale {
                reaction: reaction.clone(),
                source,
            })?;
            debug!(
                reaction = %reaction,
                km,
                lower = after.lower_bound(),
                upper = after.upper_bound(),
                "rescaled bounds"
            );
            bounds.insert(reaction.clone(), after);
            adjusted.push(AdjustedReaction {
                reaction,
                km,
                before,
                after,
            });
        }
        Ok(Rebound {
            snapshot: snapshot.with_bounds(bounds),
            report: RebindReport { adjusted, skipped },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinetics::table::KineticRecord;
    use crate::optimize::flux_analysis::ConstraintBasedSolver;
    use crate::testing::{linear_pathway, two_reactions, StubSolver};

    fn concentrations(c: f64) -> ConcentrationMap {
        let mut map = ConcentrationMap::new();
        map.insert("c", c);
        map
    }

    fn rebinder(reaction: &str) -> Rebinder {
        let mut mapping = IdentifierMapping::new();
        mapping.insert(reaction, vec!["1.1.1.1".to_string()]);
        let table: KineticTable = vec![
            KineticRecord::new("homo sapiens", Some("1.1.1.1"), None, 1.),
            KineticRecord::new("mus musculus", Some("1.1.1.1"), None, 0.2),
        ]
        .into_iter()
        .collect();
        Rebinder::new(mapping, table, IntegrationSettings::default())
    }

    #[test]
    fn parsimonious_baseline() {
        let snapshot = ModelSnapshot::new(two_reactions()).unwrap();
        let solver = StubSolver::with_fluxes(&[("R_NAD", 10.), ("R_OTHER", 10.)]);
        let rebound = rebinder("R_NAD")
            .rebind_parsimonious(&snapshot, &solver, &concentrations(2.), &concentrations(1.))
            .unwrap();

        let bounds = rebound.snapshot.bounds("R_NAD").unwrap();
        assert!((bounds.upper_bound() - 7.5).abs() < 1e-12);
        assert_eq!(bounds.lower_bound(), 0.);
        assert_eq!(
            rebound.snapshot.bounds("R_OTHER"),
            snapshot.bounds("R_OTHER")
        );

        assert_eq!(rebound.report.adjusted.len(), 1);
        assert!((rebound.report.adjusted[0].km - 1.).abs() < 1e-12);
        assert_eq!(
            rebound.report.skipped,
            vec![SkippedReaction {
                reaction: "R_OTHER".to_string(),
                reason: KmUnavailable::MissingMapping
            }]
        );
        assert!(rebound.snapshot.shares_topology_with(&snapshot));
    }

    #[test]
    fn input_is_not_mutated() {
        let snapshot = ModelSnapshot::new(two_reactions()).unwrap();
        let before = snapshot.bounds_table().clone();
        let solver = StubSolver::with_fluxes(&[("R_NAD", -4.), ("R_OTHER", 1.)]);
        let rebinder = rebinder("R_NAD");
        for baseline in [
            Baseline::Parsimonious,
            Baseline::Variability,
            Baseline::ExistingBounds,
        ] {
            let rebound = rebinder
                .rebind(&snapshot, &solver, &concentrations(2.), &concentrations(0.5), baseline)
                .unwrap();
            assert_ne!(rebound.snapshot.bounds_table(), &before);
        }
        assert_eq!(snapshot.bounds_table(), &before);
        assert_eq!(snapshot.model(), &two_reactions());
    }

    #[test]
    fn variability_baseline() {
        let snapshot = ModelSnapshot::new(two_reactions()).unwrap();
        // The stub reports a range of [0.9 * flux, flux]
        let solver = StubSolver::with_fluxes(&[("R_NAD", 10.), ("R_OTHER", 3.)]);
        let rebound = rebinder("R_NAD")
            .rebind_variability(&snapshot, &solver, &concentrations(2.), &concentrations(1.))
            .unwrap();
        let bounds = rebound.snapshot.bounds("R_NAD").unwrap();
        assert_eq!(bounds.lower_bound(), 0.);
        assert!((bounds.upper_bound() - 7.5).abs() < 1e-12);
    }

    #[test]
    fn existing_bounds_baseline() {
        let snapshot = ModelSnapshot::new(two_reactions()).unwrap();
        let rebound = rebinder("R_NAD")
            .rebind_bounds(&snapshot, &concentrations(2.), &concentrations(1.))
            .unwrap();
        // R_NAD starts at [-100, 100]
        let bounds = rebound.snapshot.bounds("R_NAD").unwrap();
        assert!((bounds.lower_bound() + 75.).abs() < 1e-9);
        assert!((bounds.upper_bound() - 75.).abs() < 1e-9);
    }

    #[test]
    fn unknown_compartment_is_fatal() {
        let snapshot = ModelSnapshot::new(two_reactions()).unwrap();
        let mut c_old = ConcentrationMap::new();
        c_old.insert("m", 2.);
        let result = rebinder("R_NAD").rebind_bounds(&snapshot, &c_old, &c_old.scaled(0.5));
        assert_eq!(
            result.map(|r| r.report),
            Err(RebindError::UnknownCompartment {
                reaction: "R_NAD".to_string(),
                compartment: Some("c".to_string())
            })
        );
    }

    #[test]
    fn concentrations_must_be_positive() {
        assert_eq!(concentrations(2.).validate(), Ok(()));
        for bad in [0., -1., f64::INFINITY] {
            assert_eq!(
                concentrations(bad).validate(),
                Err(InvalidConcentration {
                    compartment: "c".to_string(),
                    concentration: bad
                })
            );
        }
        let mut map = concentrations(2.);
        map.insert("m", f64::NAN);
        let err = map.validate().unwrap_err();
        assert_eq!(err.compartment, "m");
        assert!(err.concentration.is_nan());
    }

    #[test]
    fn zero_concentration_is_fatal() {
        let snapshot = ModelSnapshot::new(two_reactions()).unwrap();
        let solver = StubSolver::with_fluxes(&[("R_NAD", 10.), ("R_OTHER", 10.)]);
        let result = rebinder("R_NAD").rebind_parsimonious(
            &snapshot,
            &solver,
            &concentrations(0.),
            &concentrations(1.),
        );
        match result {
            Err(RebindError::Rescale { reaction, source }) => {
                assert_eq!(reaction, "R_NAD");
                assert_eq!(
                    source,
                    RescaleError::DivisionByZero {
                        km: 1.,
                        c_old: 0.,
                        c_new: 1.
                    }
                );
            }
            other => panic!("Expected a rescale error, got {other:?}"),
        }
    }

    #[test]
    fn solver_failures_propagate() {
        let snapshot = ModelSnapshot::new(two_reactions()).unwrap();
        let solver = StubSolver::infeasible();
        let result = rebinder("R_NAD").rebind_parsimonious(
            &snapshot,
            &solver,
            &concentrations(2.),
            &concentrations(1.),
        );
        assert_eq!(
            result.map(|r| r.report),
            Err(RebindError::Solver(SolverError::Infeasible))
        );
        // Nothing mapped means nothing to solve for
        let unmapped = Rebinder::new(
            IdentifierMapping::new(),
            KineticTable::new(),
            IntegrationSettings::default(),
        );
        let rebound = unmapped
            .rebind_parsimonious(&snapshot, &solver, &concentrations(2.), &concentrations(1.))
            .unwrap();
        assert!(rebound.report.adjusted.is_empty());
        assert_eq!(rebound.report.skipped.len(), 2);
    }

    #[test]
    fn rebind_with_linear_solver() {
        let snapshot = ModelSnapshot::new(linear_pathway()).unwrap();
        let solver = ConstraintBasedSolver::default();
        let rebound = rebinder("R1")
            .rebind_parsimonious(&snapshot, &solver, &concentrations(2.), &concentrations(1.))
            .unwrap();
        let bounds = rebound.snapshot.bounds("R1").unwrap();
        assert!((bounds.upper_bound() - 7.5).abs() < 1e-3);

        let optimum = solver.optimum(&rebound.snapshot).unwrap();
        assert!((optimum.objective_value - 7.5).abs() < 1e-3);
    }

    #[test]
    fn scaled_concentrations() {
        let mut map = ConcentrationMap::new();
        map.insert("c", 2.);
        map.insert("m", 0.5);
        let half = map.scaled(0.5);
        assert_eq!(half.get("c"), Some(1.));
        assert_eq!(half.get("m"), Some(0.25));
        assert_eq!(half.get("x"), None);
        assert_eq!(map.get("c"), Some(2.));
    }
}
