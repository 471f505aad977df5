//! # cofactors
//!
//! Command-line interface for integrating cofactor concentrations into metabolic models.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cofactors_core::configuration::{Configuration, DEFAULT_COFACTORS};
use cofactors_core::integration::rebind::{Baseline, ConcentrationMap, Rebinder};
use cofactors_core::integration::scan::ConcentrationScanner;
use cofactors_core::io::kinetics::{read_brenda, read_sabio, read_table, write_table};
use cofactors_core::io::results::write_scan;
use cofactors_core::kinetics::mapping::IdentifierMapping;
use cofactors_core::kinetics::table::{IdentifierKind, KineticTable};
use cofactors_core::metabolic_model::model::Model;
use cofactors_core::metabolic_model::snapshot::ModelSnapshot;
use cofactors_core::optimize::flux_analysis::ConstraintBasedSolver;

#[derive(Parser)]
#[command(name = "cofactors")]
#[command(version)]
#[command(about = "Rescale reaction bounds of metabolic models for cofactor concentrations", long_about = None)]
struct Cli {
    /// Log debug output from the integration
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a reaction to identifier mapping from model annotations
    Map {
        /// Model in COBRA json format
        #[arg(short, long)]
        model: PathBuf,
        /// Where to write the mapping
        #[arg(short, long)]
        output: PathBuf,
        /// Only map reactions with a metabolite whose id contains this tag
        #[arg(short, long)]
        tag: Option<String>,
        /// Identifiers to collect (ec or up)
        #[arg(long, default_value = "ec")]
        id_type: IdentifierKind,
    },

    /// Rebind a model for a single concentration ratio
    Rebind {
        #[command(flatten)]
        inputs: Inputs,
        /// New concentration as a fraction of the configured one
        #[arg(short, long)]
        ratio: f64,
        /// Fluxes the new bounds are derived from
        #[arg(short, long, value_enum, default_value_t = BaselineArg::Parsimonious)]
        baseline: BaselineArg,
        /// Where to write the rebound model
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Observe the model over a sweep of concentration ratios
    Scan {
        #[command(flatten)]
        inputs: Inputs,
        /// Where to write the scan table
        #[arg(short, long)]
        output: PathBuf,
        #[command(subcommand)]
        observable: Observable,
    },

    /// Normalize kinetic data exports into a single table
    Kinetics {
        #[command(flatten)]
        kinetics: KineticInputs,
        /// Where to write the table
        #[arg(short, long)]
        output: PathBuf,
    },
}

#[derive(Args)]
struct KineticInputs {
    /// SABIO-RK export, may be given more than once
    #[arg(long)]
    sabio: Vec<PathBuf>,
    /// BRENDA Km table, may be given more than once
    #[arg(long)]
    brenda: Vec<PathBuf>,
    /// Table written by the kinetics command, may be given more than once
    #[arg(long)]
    table: Vec<PathBuf>,
    /// Cofactor Km values to keep from SABIO-RK exports
    #[arg(long = "cofactor")]
    cofactors: Vec<String>,
}

#[derive(Args)]
struct Inputs {
    /// Model in COBRA json format
    #[arg(short, long)]
    model: PathBuf,
    /// Reaction to identifier mapping
    #[arg(long)]
    mapping: PathBuf,
    #[command(flatten)]
    kinetics: KineticInputs,
    /// TOML run file with the concentrations and settings
    #[arg(short, long)]
    config: PathBuf,
}

#[derive(Clone, Copy, ValueEnum)]
enum BaselineArg {
    Parsimonious,
    Variability,
    Bounds,
}

impl From<BaselineArg> for Baseline {
    fn from(arg: BaselineArg) -> Self {
        match arg {
            BaselineArg::Parsimonious => Baseline::Parsimonious,
            BaselineArg::Variability => Baseline::Variability,
            BaselineArg::Bounds => Baseline::ExistingBounds,
        }
    }
}

#[derive(Subcommand)]
enum Observable {
    /// Total flux of the parsimonious optimum
    Total,
    /// Every flux of the optimum
    Fluxes,
    /// Every flux and reduced cost of the optimum
    Reactions,
    /// Flux and reduced cost of one reaction
    Reaction { id: String },
    /// Flux range of one reaction
    Variance { id: String },
    /// Flux ranges of every reaction
    AllVariance,
}

/// Contents of a run file
#[derive(Debug, Deserialize)]
struct RunConfig {
    /// Cofactor concentration of each compartment, in mM
    concentrations: ConcentrationMap,
    #[serde(flatten)]
    settings: Configuration,
}

impl RunConfig {
    fn read(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Unable to read run file {}", path.display()))?;
        Self::from_toml(&contents)
            .with_context(|| format!("Invalid run file {}", path.display()))
    }

    fn from_toml(contents: &str) -> Result<Self> {
        let config: RunConfig = toml::from_str(contents)?;
        config.settings.validate()?;
        if config.concentrations.is_empty() {
            bail!("No concentrations were given");
        }
        config.concentrations.validate()?;
        Ok(config)
    }
}

impl KineticInputs {
    fn read(&self) -> Result<KineticTable> {
        let cofactors: Vec<String> = if self.cofactors.is_empty() {
            DEFAULT_COFACTORS.iter().map(|c| c.to_string()).collect()
        } else {
            self.cofactors.clone()
        };
        let mut table = KineticTable::new();
        for path in &self.sabio {
            table.extend(
                read_sabio(path, &cofactors)
                    .with_context(|| format!("Unable to read SABIO-RK export {}", path.display()))?,
            );
        }
        for path in &self.brenda {
            table.extend(
                read_brenda(path)
                    .with_context(|| format!("Unable to read BRENDA table {}", path.display()))?,
            );
        }
        for path in &self.table {
            table.extend(
                read_table(path)
                    .with_context(|| format!("Unable to read kinetic table {}", path.display()))?,
            );
        }
        if table.is_empty() {
            warn!("No kinetic data was read, every reaction will keep its bounds");
        } else {
            info!(
                records = table.len(),
                species = table.species().len(),
                "Collected kinetic data"
            );
        }
        Ok(table)
    }
}

/// Everything needed to rebind a model
struct Session {
    snapshot: ModelSnapshot,
    rebinder: Rebinder,
    solver: ConstraintBasedSolver,
    config: RunConfig,
}

impl Session {
    fn load(inputs: &Inputs) -> Result<Self> {
        let config = RunConfig::read(&inputs.config)?;
        let model = Model::read_json(&inputs.model)
            .with_context(|| format!("Unable to read model {}", inputs.model.display()))?;
        let snapshot = ModelSnapshot::new(model)?;
        let mapping = IdentifierMapping::read(&inputs.mapping)
            .with_context(|| format!("Unable to read mapping {}", inputs.mapping.display()))?;
        let table = inputs.kinetics.read()?;
        let rebinder = Rebinder::new(mapping, table, config.settings.integration.clone());
        let solver = ConstraintBasedSolver::from(&config.settings.solver);
        Ok(Session {
            snapshot,
            rebinder,
            solver,
            config,
        })
    }

    fn scanner(&self) -> ConcentrationScanner<'_, ConstraintBasedSolver> {
        ConcentrationScanner::new(
            &self.rebinder,
            &self.solver,
            &self.snapshot,
            &self.config.concentrations,
        )
        .with_settings(&self.config.settings.scan)
    }
}

fn scan(inputs: &Inputs, output: &Path, observable: &Observable) -> Result<()> {
    let session = Session::load(inputs)?;
    let scanner = session.scanner();
    let start = Instant::now();
    match observable {
        Observable::Total => write_scan(&scanner.scan_total_flux()?, "total_flux", output)?,
        Observable::Fluxes => write_scan(&scanner.scan_all_fluxes()?, "", output)?,
        Observable::Reactions => write_scan(&scanner.scan_all_reactions()?, "", output)?,
        Observable::Reaction { id } => write_scan(&scanner.scan_reaction(id)?, id, output)?,
        Observable::Variance { id } => {
            write_scan(&scanner.scan_reaction_variance(id)?, id, output)?
        }
        Observable::AllVariance => write_scan(&scanner.scan_all_variance()?, "", output)?,
    }
    info!(
        output = %output.display(),
        elapsed = ?start.elapsed(),
        "Finished scan"
    );
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "cofactors_core=debug,info"
    } else {
        "cofactors_core=info,info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    match cli.command {
        Commands::Map {
            model,
            output,
            tag,
            id_type,
        } => {
            let model = Model::read_json(&model)
                .with_context(|| format!("Unable to read model {}", model.display()))?;
            let mapping = IdentifierMapping::from_model(&model, id_type, tag.as_deref());
            mapping
                .write(&output)
                .with_context(|| format!("Unable to write mapping {}", output.display()))?;
        }

        Commands::Rebind {
            inputs,
            ratio,
            baseline,
            output,
        } => {
            let session = Session::load(&inputs)?;
            let c_new = session.config.concentrations.scaled(ratio);
            let rebound = session.rebinder.rebind(
                &session.snapshot,
                &session.solver,
                &session.config.concentrations,
                &c_new,
                baseline.into(),
            )?;
            for skipped in &rebound.report.skipped {
                info!(reaction = %skipped.reaction, reason = %skipped.reason, "Kept bounds");
            }
            rebound
                .snapshot
                .write_json(&output)
                .with_context(|| format!("Unable to write model {}", output.display()))?;
        }

        Commands::Scan {
            inputs,
            output,
            observable,
        } => scan(&inputs, &output, &observable)?,

        Commands::Kinetics { kinetics, output } => {
            let table = kinetics.read()?;
            write_table(&table, &output)
                .with_context(|| format!("Unable to write kinetic table {}", output.display()))?;
            info!(output = %output.display(), "Wrote kinetic table");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cofactors_core::integration::scan::RebindMode;
    use cofactors_core::kinetics::selector::KmDecision;

    #[test]
    fn run_file_with_settings() {
        let config: RunConfig = toml::from_str(
            r#"
[concentrations]
c = 2.0
m = 0.5

[integration]
tie_break = "median"
id_type = "up"

[scan]
mode = "variability"
processes = 4
"#,
        )
        .unwrap();
        assert_eq!(config.concentrations.get("c"), Some(2.));
        assert_eq!(config.concentrations.get("m"), Some(0.5));
        assert_eq!(config.settings.integration.tie_break, KmDecision::Median);
        assert_eq!(config.settings.integration.id_type, IdentifierKind::Uniprot);
        assert_eq!(config.settings.integration.fraction_of_optimum, 0.9);
        assert_eq!(config.settings.scan.mode, RebindMode::Variability);
        assert_eq!(config.settings.scan.processes, 4);
        assert!(config.settings.validate().is_ok());
    }

    #[test]
    fn run_file_needs_concentrations() {
        assert!(RunConfig::from_toml("[scan]\nprocesses = 2\n").is_err());
        assert!(RunConfig::from_toml("[concentrations]\n").is_err());
    }

    #[test]
    fn run_file_rejects_bad_concentrations() {
        assert!(RunConfig::from_toml("[concentrations]\nc = 2.0\n").is_ok());
        for bad in ["0.0", "-1.0", "nan", "inf"] {
            let contents = format!("[concentrations]\nc = 2.0\nm = {bad}\n");
            let err = RunConfig::from_toml(&contents).unwrap_err();
            assert!(err.to_string().contains("compartment m"), "{err}");
        }
    }

    #[test]
    fn kinetic_table_feeds_back_in() {
        let data_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("../cofactors_core/test_data");
        let sabio = data_dir.join("sabio.tsv").display().to_string();
        let brenda = data_dir.join("brenda.tsv").display().to_string();
        let dir = tempfile::tempdir().unwrap();
        let table_path = dir.path().join("km.tsv");
        let table = table_path.display().to_string();

        let cli = Cli::try_parse_from([
            "cofactors",
            "kinetics",
            "--sabio",
            sabio.as_str(),
            "--brenda",
            brenda.as_str(),
            "--output",
            table.as_str(),
        ])
        .unwrap();
        let Commands::Kinetics { kinetics, .. } = cli.command else {
            panic!("expected the kinetics command");
        };
        let written = kinetics.read().unwrap();
        write_table(&written, &table_path).unwrap();

        let cli = Cli::try_parse_from([
            "cofactors",
            "rebind",
            "--model",
            "model.json",
            "--mapping",
            "mapping.txt",
            "--table",
            table.as_str(),
            "--config",
            "run.toml",
            "--ratio",
            "0.5",
            "--output",
            "out.json",
        ])
        .unwrap();
        let Commands::Rebind { inputs, .. } = cli.command else {
            panic!("expected the rebind command");
        };
        assert_eq!(inputs.kinetics.table, vec![table_path.clone()]);
        assert!(inputs.kinetics.sabio.is_empty());
        assert_eq!(inputs.kinetics.read().unwrap(), written);
    }

    #[test]
    fn parses_scan_command() {
        let cli = Cli::try_parse_from([
            "cofactors",
            "scan",
            "--model",
            "model.json",
            "--mapping",
            "mapping.txt",
            "--sabio",
            "a.tsv",
            "--sabio",
            "b.tsv",
            "--config",
            "run.toml",
            "--output",
            "out.tsv",
            "variance",
            "R1",
        ])
        .unwrap();
        match cli.command {
            Commands::Scan {
                inputs, observable, ..
            } => {
                assert_eq!(inputs.kinetics.sabio.len(), 2);
                assert!(matches!(observable, Observable::Variance { id } if id == "R1"));
            }
            _ => panic!("expected the scan command"),
        }
    }
}
