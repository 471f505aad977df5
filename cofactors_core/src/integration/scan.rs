//! Sweeping the cofactor concentration and recording how the model responds
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::configuration::ScanSettings;
use crate::integration::rebind::{Baseline, ConcentrationMap, RebindError, Rebinder};
use crate::metabolic_model::snapshot::ModelSnapshot;
use crate::optimize::flux_analysis::{FluxRange, FluxSolver};
use crate::optimize::solvers::SolverError;

/// Number of concentration steps in a scan
pub const SCAN_STEPS: usize = 98;

/// Step indices with their concentration ratio, `i / 100` for `i` in `1..=98`
pub fn scan_ratios() -> impl Iterator<Item = (usize, f64)> {
    (1..=SCAN_STEPS).map(|index| (index, index as f64 / 100.))
}

/// Baseline used to rebind the model at every step of a scan
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RebindMode {
    #[default]
    Parsimonious,
    Variability,
}

impl From<RebindMode> for Baseline {
    fn from(mode: RebindMode) -> Self {
        match mode {
            RebindMode::Parsimonious => Baseline::Parsimonious,
            RebindMode::Variability => Baseline::Variability,
        }
    }
}

/// Observation made at one concentration
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScanStep<T> {
    /// Step index, from 1 to [`SCAN_STEPS`]
    pub index: usize,
    /// Fraction of the original concentration used at this step
    pub ratio: f64,
    pub value: T,
}

/// Observations of a scan in order of increasing ratio
pub type ScanResult<T> = Vec<ScanStep<T>>;

/// Flux and reduced cost of a single reaction
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ReactionObservation {
    pub flux: f64,
    pub reduced_cost: f64,
}

/// Fluxes and reduced costs of every reaction
#[derive(Clone, Debug, PartialEq)]
pub struct ReactionTable {
    pub fluxes: IndexMap<String, f64>,
    pub reduced_costs: IndexMap<String, f64>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScanError {
    #[error("Reaction {0} is not in the model")]
    UnknownReaction(String),
    #[error("Scan exceeded its {timeout:?} timeout before step {index}")]
    Aborted { index: usize, timeout: Duration },
    #[error("Rebinding failed at step {index} (ratio {ratio})")]
    Rebind {
        index: usize,
        ratio: f64,
        #[source]
        source: RebindError,
    },
    #[error("Solving failed at step {index} (ratio {ratio})")]
    Solver {
        index: usize,
        ratio: f64,
        #[source]
        source: SolverError,
    },
    #[error("Failed to start scan workers: {0}")]
    Workers(String),
}

/// Runs concentration scans of one model snapshot
///
/// Every step scales all concentrations of `c_old` by the step ratio, rebinds the original
/// snapshot to those concentrations and observes the rebound model. Steps don't depend on
/// each other, so with more than one process they run on a thread pool.
pub struct ConcentrationScanner<'a, S: FluxSolver + ?Sized> {
    rebinder: &'a Rebinder,
    solver: &'a S,
    snapshot: &'a ModelSnapshot,
    c_old: &'a ConcentrationMap,
    mode: RebindMode,
    processes: usize,
    timeout: Option<Duration>,
    variability_fraction: f64,
}

impl<'a, S: FluxSolver + ?Sized> ConcentrationScanner<'a, S> {
    pub fn new(
        rebinder: &'a Rebinder,
        solver: &'a S,
        snapshot: &'a ModelSnapshot,
        c_old: &'a ConcentrationMap,
    ) -> Self {
        let defaults = ScanSettings::default();
        ConcentrationScanner {
            rebinder,
            solver,
            snapshot,
            c_old,
            mode: defaults.mode,
            processes: defaults.processes,
            timeout: defaults.timeout_secs.map(Duration::from_secs),
            variability_fraction: defaults.variability_fraction,
        }
    }

    /// Apply every field of the scan settings
    pub fn with_settings(self, settings: &ScanSettings) -> Self {
        self.mode(settings.mode)
            .processes(settings.processes)
            .timeout(settings.timeout_secs.map(Duration::from_secs))
            .variability_fraction(settings.variability_fraction)
    }

    pub fn mode(mut self, mode: RebindMode) -> Self {
        self.mode = mode;
        self
    }

    /// Number of steps run at the same time, at least one
    pub fn processes(mut self, processes: usize) -> Self {
        self.processes = processes.max(1);
        self
    }

    /// Time allowed for the whole scan
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fraction of the optimum held when observing flux variability
    pub fn variability_fraction(mut self, fraction: f64) -> Self {
        self.variability_fraction = fraction;
        self
    }

    /// Flux (parsimonious) and reduced cost of one reaction at every step
    pub fn scan_reaction(
        &self,
        reaction_id: &str,
    ) -> Result<ScanResult<ReactionObservation>, ScanError> {
        self.check_reaction(reaction_id)?;
        self.scan(|snapshot| {
            let parsimonious = self.solver.parsimonious_optimum(snapshot)?;
            let optimum = self.solver.optimum(snapshot)?;
            let missing = || SolverError::UnknownReaction(reaction_id.to_string());
            Ok(ReactionObservation {
                flux: *parsimonious.fluxes.get(reaction_id).ok_or_else(missing)?,
                reduced_cost: *optimum.reduced_costs.get(reaction_id).ok_or_else(missing)?,
            })
        })
    }

    /// Parsimonious fluxes of every reaction at every step
    pub fn scan_all_fluxes(&self) -> Result<ScanResult<IndexMap<String, f64>>, ScanError> {
        self.scan(|snapshot| Ok(self.solver.parsimonious_optimum(snapshot)?.fluxes))
    }

    /// Total flux of the parsimonious optimum at every step
    pub fn scan_total_flux(&self) -> Result<ScanResult<f64>, ScanError> {
        self.scan(|snapshot| Ok(self.solver.parsimonious_optimum(snapshot)?.objective_value))
    }

    /// Parsimonious fluxes and reduced costs of every reaction at every step
    pub fn scan_all_reactions(&self) -> Result<ScanResult<ReactionTable>, ScanError> {
        self.scan(|snapshot| {
            let parsimonious = self.solver.parsimonious_optimum(snapshot)?;
            let optimum = self.solver.optimum(snapshot)?;
            Ok(ReactionTable {
                fluxes: parsimonious.fluxes,
                reduced_costs: optimum.reduced_costs,
            })
        })
    }

    /// Flux range of one reaction at every step
    pub fn scan_reaction_variance(
        &self,
        reaction_id: &str,
    ) -> Result<ScanResult<FluxRange>, ScanError> {
        self.check_reaction(reaction_id)?;
        let reactions = [reaction_id.to_string()];
        self.scan(|snapshot| {
            let ranges = self.solver.variability(
                snapshot,
                self.variability_fraction,
                Some(&reactions),
            )?;
            ranges
                .get(reaction_id)
                .copied()
                .ok_or_else(|| SolverError::UnknownReaction(reaction_id.to_string()))
        })
    }

    /// Flux range of every reaction at every step
    pub fn scan_all_variance(&self) -> Result<ScanResult<IndexMap<String, FluxRange>>, ScanError> {
        self.scan(|snapshot| {
            self.solver
                .variability(snapshot, self.variability_fraction, None)
        })
    }

    /// Run a scan recording a custom observation of each rebound snapshot
    pub fn scan<T, F>(&self, observe: F) -> Result<ScanResult<T>, ScanError>
    where
        T: Send,
        F: Fn(&ModelSnapshot) -> Result<T, SolverError> + Sync,
    {
        let started = Instant::now();
        let deadline = self.timeout.map(|timeout| started + timeout);
        let steps: Vec<(usize, f64)> = scan_ratios().collect();

        let result = self.run_steps(&steps, deadline, &observe)?;
        info!(
            steps = result.len(),
            mode = ?self.mode,
            processes = self.processes,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "finished concentration scan"
        );
        Ok(result)
    }

    fn run_steps<T, F>(
        &self,
        steps: &[(usize, f64)],
        deadline: Option<Instant>,
        observe: &F,
    ) -> Result<ScanResult<T>, ScanError>
    where
        T: Send,
        F: Fn(&ModelSnapshot) -> Result<T, SolverError> + Sync,
    {
        cfg_if::cfg_if! {
            if #[cfg(feature = "parallel")] {
                if self.processes > 1 {
                    use rayon::prelude::*;
                    let pool = rayon::ThreadPoolBuilder::new()
                        .num_threads(self.processes)
                        .build()
                        .map_err(|e| ScanError::Workers(e.to_string()))?;
                    // Indexed parallel iterators collect in order
                    return pool.install(|| {
                        steps
                            .par_iter()
                            .map(|(index, ratio)| self.step(*index, *ratio, deadline, observe))
                            .collect()
                    });
                }
            } else {
                if self.processes > 1 {
                    tracing::warn!(
                        processes = self.processes,
                        "built without the parallel feature, running steps one at a time"
                    );
                }
            }
        }
        steps
            .iter()
            .map(|(index, ratio)| self.step(*index, *ratio, deadline, observe))
            .collect()
    }

    fn step<T, F>(
        &self,
        index: usize,
        ratio: f64,
        deadline: Option<Instant>,
        observe: &F,
    ) -> Result<ScanStep<T>, ScanError>
    where
        F: Fn(&ModelSnapshot) -> Result<T, SolverError>,
    {
        if let (Some(deadline), Some(timeout)) = (deadline, self.timeout) {
            if Instant::now() >= deadline {
                return Err(ScanError::Aborted { index, timeout });
            }
        }
        let c_new = self.c_old.scaled(ratio);
        let rebound = self
            .rebinder
            .rebind(self.snapshot, self.solver, self.c_old, &c_new, self.mode.into())
            .map_err(|source| ScanError::Rebind {
                index,
                ratio,
                source,
            })?;
        let value = observe(&rebound.snapshot).map_err(|source| ScanError::Solver {
            index,
            ratio,
            source,
        })?;
        Ok(ScanStep {
            index,
            ratio,
            value,
        })
    }

    fn check_reaction(&self, reaction_id: &str) -> Result<(), ScanError> {
        if self.snapshot.bounds(reaction_id).is_none() {
            return Err(ScanError::UnknownReaction(reaction_id.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::configuration::{IntegrationSettings, ScanSettingsBuilder};
    use crate::kinetics::mapping::IdentifierMapping;
    use crate::kinetics::table::{KineticRecord, KineticTable};
    use crate::optimize::flux_analysis::ConstraintBasedSolver;
    use crate::testing::{linear_pathway, two_reactions, StubSolver};

    fn rebinder(reaction: &str) -> Rebinder {
        let mut mapping = IdentifierMapping::new();
        mapping.insert(reaction, vec!["1.1.1.1".to_string()]);
        let table: KineticTable =
            vec![KineticRecord::new("homo sapiens", Some("1.1.1.1"), None, 1.)]
                .into_iter()
                .collect();
        Rebinder::new(mapping, table, IntegrationSettings::default())
    }

    fn c_old() -> ConcentrationMap {
        let mut map = ConcentrationMap::new();
        map.insert("c", 2.);
        map
    }

    #[test]
    fn ratios() {
        let ratios: Vec<_> = scan_ratios().collect();
        assert_eq!(ratios.len(), 98);
        assert_eq!(ratios[0], (1, 0.01));
        assert_eq!(ratios[97], (98, 0.98));
    }

    #[test]
    fn ordered_steps_with_stub() {
        let snapshot = ModelSnapshot::new(two_reactions()).unwrap();
        let solver = StubSolver::with_fluxes(&[("R_NAD", 10.), ("R_OTHER", 5.)]);
        let rebinder = rebinder("R_NAD");
        let c_old = c_old();
        let scanner = ConcentrationScanner::new(&rebinder, &solver, &snapshot, &c_old);

        let result = scanner.scan_reaction("R_NAD").unwrap();
        assert_eq!(result.len(), SCAN_STEPS);
        for (step, (index, ratio)) in result.iter().zip(scan_ratios()) {
            assert_eq!(step.index, index);
            assert_eq!(step.ratio, ratio);
            // Km 1, c_old 2: 10 * (2r / (1 + 2r)) * 1.5
            let expected = 10. * (2. * ratio / (1. + 2. * ratio)) * 1.5;
            assert!((step.value.flux - expected).abs() < 1e-9);
        }
        assert!(result
            .windows(2)
            .all(|pair| pair[0].ratio < pair[1].ratio && pair[0].value.flux < pair[1].value.flux));
    }

    #[test]
    fn observables() {
        let snapshot = ModelSnapshot::new(two_reactions()).unwrap();
        let solver = StubSolver::with_fluxes(&[("R_NAD", 10.), ("R_OTHER", 5.)]);
        let rebinder = rebinder("R_NAD");
        let c_old = c_old();
        let scanner = ConcentrationScanner::new(&rebinder, &solver, &snapshot, &c_old);

        let totals = scanner.scan_total_flux().unwrap();
        assert_eq!(totals.len(), SCAN_STEPS);
        let last = &totals[SCAN_STEPS - 1];
        let expected = 10. * (1.96 / 2.96) * 1.5 + 5.;
        assert!((last.value - expected).abs() < 1e-9);

        let fluxes = scanner.scan_all_fluxes().unwrap();
        assert_eq!(fluxes[0].value.len(), 2);
        assert!((fluxes[0].value["R_OTHER"] - 5.).abs() < 1e-12);

        let table = scanner.scan_all_reactions().unwrap();
        assert_eq!(table[10].value.reduced_costs.len(), 2);

        let ranges = scanner.scan_reaction_variance("R_OTHER").unwrap();
        assert!((ranges[0].value.maximum - 5.).abs() < 1e-12);
        assert!((ranges[0].value.minimum - 4.95).abs() < 1e-12);

        let all = scanner.scan_all_variance().unwrap();
        assert_eq!(all[97].value.len(), 2);
    }

    #[test]
    fn unknown_reaction_fails_before_solving() {
        let snapshot = ModelSnapshot::new(two_reactions()).unwrap();
        let solver = StubSolver::with_fluxes(&[("R_NAD", 10.)]);
        let rebinder = rebinder("R_NAD");
        let c_old = c_old();
        let scanner = ConcentrationScanner::new(&rebinder, &solver, &snapshot, &c_old);
        assert_eq!(
            scanner.scan_reaction("missing").map(|r| r.len()),
            Err(ScanError::UnknownReaction("missing".to_string()))
        );
        assert_eq!(
            scanner.scan_reaction_variance("missing").map(|r| r.len()),
            Err(ScanError::UnknownReaction("missing".to_string()))
        );
        assert_eq!(solver.solves.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn failures_carry_the_step() {
        let snapshot = ModelSnapshot::new(two_reactions()).unwrap();
        let solver = StubSolver::infeasible();
        let rebinder = rebinder("R_NAD");
        let c_old = c_old();
        let scanner = ConcentrationScanner::new(&rebinder, &solver, &snapshot, &c_old);
        match scanner.scan_total_flux() {
            Err(ScanError::Rebind { index, source, .. }) => {
                assert_eq!(index, 1);
                assert_eq!(source, RebindError::Solver(SolverError::Infeasible));
            }
            other => panic!("Expected a rebind failure, got {other:?}"),
        }

        // Without any mapped reaction the rebind needs no solve, the observation fails instead
        let unmapped = Rebinder::new(
            IdentifierMapping::new(),
            KineticTable::new(),
            IntegrationSettings::default(),
        );
        let scanner = ConcentrationScanner::new(&unmapped, &solver, &snapshot, &c_old);
        assert!(matches!(
            scanner.scan_total_flux(),
            Err(ScanError::Solver { index: 1, .. })
        ));
    }

    #[test]
    fn timeout_aborts() {
        let snapshot = ModelSnapshot::new(two_reactions()).unwrap();
        let solver = StubSolver::with_fluxes(&[("R_NAD", 10.), ("R_OTHER", 5.)]);
        let rebinder = rebinder("R_NAD");
        let c_old = c_old();
        let scanner = ConcentrationScanner::new(&rebinder, &solver, &snapshot, &c_old)
            .timeout(Some(Duration::ZERO));
        assert!(matches!(
            scanner.scan_total_flux(),
            Err(ScanError::Aborted { index: 1, .. })
        ));
    }

    #[test]
    fn parallel_matches_sequential() {
        let snapshot = ModelSnapshot::new(two_reactions()).unwrap();
        let solver = StubSolver::with_fluxes(&[("R_NAD", -8.), ("R_OTHER", 5.)]);
        let rebinder = rebinder("R_NAD");
        let c_old = c_old();
        let sequential = ConcentrationScanner::new(&rebinder, &solver, &snapshot, &c_old)
            .scan_all_fluxes()
            .unwrap();
        let settings = ScanSettingsBuilder::default().processes(4).build().unwrap();
        let parallel = ConcentrationScanner::new(&rebinder, &solver, &snapshot, &c_old)
            .with_settings(&settings)
            .scan_all_fluxes()
            .unwrap();
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn scan_with_linear_solver() {
        let snapshot = ModelSnapshot::new(linear_pathway()).unwrap();
        let solver = ConstraintBasedSolver::default();
        let rebinder = rebinder("R1");
        let c_old = c_old();
        let result = ConcentrationScanner::new(&rebinder, &solver, &snapshot, &c_old)
            .mode(RebindMode::Variability)
            .scan_reaction("EX_B")
            .unwrap();
        assert_eq!(result.len(), SCAN_STEPS);
        // FVA at 90% gives R1 a range of [9, 10], only the upper end matters
        let half = &result[49];
        let expected = 10. * (1. / 2.) * 1.5;
        assert!((half.value.flux - expected).abs() < 1e-3);
    }
}
