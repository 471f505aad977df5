//! Tab separated output of concentration scans
use std::io::Write;
use std::path::Path;

use csv::WriterBuilder;
use indexmap::IndexMap;
use thiserror::Error;

use crate::integration::scan::{ReactionObservation, ReactionTable, ScanResult};
use crate::optimize::flux_analysis::FluxRange;

/// Values observed at a scan step, flattened into named columns
pub trait ScanColumns {
    /// Column names and values, `label` names single valued observations
    fn columns(&self, label: &str) -> Vec<(String, f64)>;
}

impl ScanColumns for f64 {
    fn columns(&self, label: &str) -> Vec<(String, f64)> {
        vec![(label.to_string(), *self)]
    }
}

impl ScanColumns for ReactionObservation {
    fn columns(&self, label: &str) -> Vec<(String, f64)> {
        vec![
            (format!("flux:{label}"), self.flux),
            (format!("reduced_cost:{label}"), self.reduced_cost),
        ]
    }
}

impl ScanColumns for FluxRange {
    fn columns(&self, label: &str) -> Vec<(String, f64)> {
        vec![
            (format!("{label}:min"), self.minimum),
            (format!("{label}:max"), self.maximum),
        ]
    }
}

impl ScanColumns for IndexMap<String, f64> {
    fn columns(&self, _label: &str) -> Vec<(String, f64)> {
        self.iter().map(|(id, flux)| (id.clone(), *flux)).collect()
    }
}

impl ScanColumns for IndexMap<String, FluxRange> {
    fn columns(&self, _label: &str) -> Vec<(String, f64)> {
        self.iter().flat_map(|(id, range)| range.columns(id)).collect()
    }
}

impl ScanColumns for ReactionTable {
    fn columns(&self, _label: &str) -> Vec<(String, f64)> {
        self.fluxes
            .iter()
            .map(|(id, flux)| (format!("flux:{id}"), *flux))
            .chain(
                self.reduced_costs
                    .iter()
                    .map(|(id, cost)| (format!("reduced_cost:{id}"), *cost)),
            )
            .collect()
    }
}

/// Write a scan as a `step, ratio, columns...` table to `path`
pub fn write_scan<T: ScanColumns, P: AsRef<Path>>(
    result: &ScanResult<T>,
    label: &str,
    path: P,
) -> Result<(), ResultsError> {
    let file = std::fs::File::create(path)?;
    write_scan_to(result, label, file)
}

/// Write a scan table to any writer
pub fn write_scan_to<T: ScanColumns, W: Write>(
    result: &ScanResult<T>,
    label: &str,
    writer: W,
) -> Result<(), ResultsError> {
    let mut writer = WriterBuilder::new().delimiter(b'\t').from_writer(writer);
    let mut header: Option<Vec<String>> = None;
    for step in result {
        let columns = step.value.columns(label);
        let names: Vec<String> = columns.iter().map(|(name, _)| name.clone()).collect();
        match &header {
            None => {
                writer.write_record(
                    ["step".to_string(), "ratio".to_string()]
                        .into_iter()
                        .chain(names.iter().cloned()),
                )?;
                header = Some(names);
            }
            Some(expected) if *expected != names => {
                return Err(ResultsError::InconsistentColumns(step.index));
            }
            Some(_) => {}
        }
        writer.write_record(
            [step.index.to_string(), step.ratio.to_string()]
                .into_iter()
                .chain(columns.iter().map(|(_, value)| value.to_string())),
        )?;
    }
    writer.flush()?;
    Ok(())
}

#[derive(Error, Debug)]
pub enum ResultsError {
    #[error("Step {0} has different columns than the steps before it")]
    InconsistentColumns(usize),
    #[error("Unable to write scan results due to {0}")]
    Csv(#[from] csv::Error),
    #[error("Unable to write scan results")]
    Io(#[from] std::io::Error),
}
