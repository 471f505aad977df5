//! Defaults and run settings
//!
//! Settings are plain values handed to the components that need them, there is no shared
//! global configuration.
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::integration::scan::RebindMode;
use crate::kinetics::selector::{KmDecision, SpeciesPreference};
use crate::kinetics::table::IdentifierKind;

/// Lower bound given to reactions which don't specify one
pub const DEFAULT_LOWER_BOUND: f64 = -1000.;
/// Upper bound given to reactions which don't specify one
pub const DEFAULT_UPPER_BOUND: f64 = 1000.;
/// Slack allowed when holding an objective at its optimum
pub const DEFAULT_TOLERANCE: f64 = 1e-07;
/// Species whose kinetic data is preferred, in order of preference
pub const DEFAULT_SPECIES_PREFERENCE: [&str; 5] = [
    "homo sapiens",
    "sus scrofa",
    "bos taurus",
    "rattus norvegicus",
    "mus musculus",
];
/// Cofactors whose Km values are kept when reading kinetic data
pub const DEFAULT_COFACTORS: [&str; 4] = ["NAD+", "NADH", "NADP+", "NADPH"];

/// Settings controlling how kinetic data is turned into new reaction bounds
#[derive(Builder, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[builder(default, build_fn(validate = "Self::validate"))]
#[serde(default)]
pub struct IntegrationSettings {
    /// How a single Km is chosen when several are available
    pub tie_break: KmDecision,
    /// Which identifiers the reaction mapping holds
    pub id_type: IdentifierKind,
    /// Fraction of the optimum held during variability analysis of the baseline
    pub fraction_of_optimum: f64,
    /// Species to take kinetic data from, in order of preference
    pub preference: SpeciesPreference,
}

impl Default for IntegrationSettings {
    fn default() -> Self {
        IntegrationSettings {
            tie_break: KmDecision::default(),
            id_type: IdentifierKind::default(),
            fraction_of_optimum: 0.9,
            preference: SpeciesPreference::default(),
        }
    }
}

impl IntegrationSettings {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        check_fraction("fraction_of_optimum", self.fraction_of_optimum)
    }
}

impl IntegrationSettingsBuilder {
    fn validate(&self) -> Result<(), String> {
        match self.fraction_of_optimum {
            Some(fraction) => {
                check_fraction("fraction_of_optimum", fraction).map_err(|e| e.to_string())
            }
            None => Ok(()),
        }
    }
}

/// Settings controlling a concentration scan
#[derive(Builder, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[builder(default, build_fn(validate = "Self::validate"))]
#[serde(default)]
pub struct ScanSettings {
    /// Baseline used to rebind the model at each step
    pub mode: RebindMode,
    /// Fraction of the optimum held when tracking flux variability
    pub variability_fraction: f64,
    /// Number of steps run at the same time
    pub processes: usize,
    /// Time allowed for the whole scan, in seconds
    pub timeout_secs: Option<u64>,
}

impl Default for ScanSettings {
    fn default() -> Self {
        ScanSettings {
            mode: RebindMode::default(),
            variability_fraction: 0.99,
            processes: 1,
            timeout_secs: None,
        }
    }
}

impl ScanSettings {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        check_fraction("variability_fraction", self.variability_fraction)?;
        check_processes(self.processes)
    }
}

impl ScanSettingsBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(fraction) = self.variability_fraction {
            check_fraction("variability_fraction", fraction).map_err(|e| e.to_string())?;
        }
        if let Some(processes) = self.processes {
            check_processes(processes).map_err(|e| e.to_string())?;
        }
        Ok(())
    }
}

/// Settings passed to the linear solver
#[derive(Builder, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[builder(default, build_fn(validate = "Self::validate"))]
#[serde(default)]
pub struct SolverSettings {
    /// Slack allowed when holding an objective at its optimum
    pub tolerance: f64,
    /// Maximum number of solver iterations
    pub max_iter: u32,
}

impl Default for SolverSettings {
    fn default() -> Self {
        SolverSettings {
            tolerance: DEFAULT_TOLERANCE,
            max_iter: 200,
        }
    }
}

impl SolverSettings {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        check_tolerance(self.tolerance)
    }
}

impl SolverSettingsBuilder {
    fn validate(&self) -> Result<(), String> {
        match self.tolerance {
            Some(tolerance) => check_tolerance(tolerance).map_err(|e| e.to_string()),
            None => Ok(()),
        }
    }
}

/// All settings of a run
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub integration: IntegrationSettings,
    pub scan: ScanSettings,
    pub solver: SolverSettings,
}

impl Configuration {
    /// Check every settings table, settings read from files skip the builders' checks
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.integration.validate()?;
        self.scan.validate()?;
        self.solver.validate()
    }
}

fn check_fraction(name: &'static str, value: f64) -> Result<(), ConfigurationError> {
    if value > 0. && value <= 1. {
        Ok(())
    } else {
        Err(ConfigurationError::FractionOutOfRange { name, value })
    }
}

fn check_processes(processes: usize) -> Result<(), ConfigurationError> {
    if processes == 0 {
        return Err(ConfigurationError::NoProcesses);
    }
    Ok(())
}

fn check_tolerance(tolerance: f64) -> Result<(), ConfigurationError> {
    if tolerance >= 0. {
        Ok(())
    } else {
        Err(ConfigurationError::NegativeTolerance(tolerance))
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("{name} must be in (0, 1], got {value}")]
    FractionOutOfRange { name: &'static str, value: f64 },
    #[error("At least one process is needed")]
    NoProcesses,
    #[error("Tolerance must not be negative, got {0}")]
    NegativeTolerance(f64),
}
