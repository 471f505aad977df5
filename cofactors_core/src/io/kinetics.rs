//! Reading kinetic parameter exports into a [`KineticTable`]
//!
//! Two source layouts are understood, SABIO-RK tab separated exports (with a header) and
//! BRENDA Km tables (without one). Both end up as millimolar [`KineticRecord`]s. A table can
//! also be written to and read back from a normalized tab separated file.
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::kinetics::table::{KineticRecord, KineticTable, MILLIMOLAR};

const SABIO_ORGANISM: &str = "Organism";
const SABIO_UNIPROT: &str = "UniprotID";
const SABIO_EC: &str = "ECNumber";
const SABIO_TYPE: &str = "parameter.type";
const SABIO_SPECIES: &str = "parameter.associatedSpecies";
const SABIO_VALUE: &str = "parameter.startValue";
const SABIO_UNIT: &str = "parameter.unit";

const BRENDA_EC: usize = 0;
const BRENDA_KM: usize = 1;
const BRENDA_ORGANISM: usize = 4;

/// Convert a concentration to millimolar, `None` for units that are not concentrations
///
/// SABIO-RK reports molar values without a unit, so a missing unit is treated as molar.
pub fn to_millimolar(value: f64, unit: Option<&str>) -> Option<f64> {
    let factor = match unit.map(str::trim).filter(|u| !u.is_empty()) {
        None | Some("M") => 1e3,
        Some("mM") => 1.,
        Some("uM") | Some("µM") | Some("μM") => 1e-3,
        Some("nM") => 1e-6,
        Some(_) => return None,
    };
    Some(value * factor)
}

fn tab_reader<R: Read>(reader: R, has_headers: bool) -> csv::Reader<R> {
    ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(has_headers)
        .flexible(true)
        .from_reader(reader)
}

fn column(headers: &StringRecord, name: &str) -> Result<usize, KineticsIoError> {
    headers
        .iter()
        .position(|h| h.trim() == name)
        .ok_or_else(|| KineticsIoError::MissingColumn(name.to_string()))
}

fn field<'r>(row: &'r StringRecord, index: usize) -> Option<&'r str> {
    row.get(index).map(str::trim).filter(|f| !f.is_empty())
}

/// Read a SABIO-RK export, keeping only Km values measured for one of `cofactors`
pub fn read_sabio<P: AsRef<Path>>(
    path: P,
    cofactors: &[String],
) -> Result<KineticTable, KineticsIoError> {
    let path = path.as_ref();
    let table = sabio_from_reader(File::open(path)?, cofactors)?;
    info!(path = %path.display(), records = table.len(), "Read SABIO-RK Km values");
    Ok(table)
}

/// Parse a SABIO-RK export from any reader
pub fn sabio_from_reader<R: Read>(
    reader: R,
    cofactors: &[String],
) -> Result<KineticTable, KineticsIoError> {
    let mut reader = tab_reader(reader, true);
    let headers = reader.headers()?.clone();
    let mut table = KineticTable::new();
    if headers.iter().all(|h| h.trim().is_empty()) {
        warn!("SABIO-RK export is empty");
        return Ok(table);
    }
    let organism = column(&headers, SABIO_ORGANISM)?;
    let uniprot = column(&headers, SABIO_UNIPROT)?;
    let ec = column(&headers, SABIO_EC)?;
    let parameter_type = column(&headers, SABIO_TYPE)?;
    let species = column(&headers, SABIO_SPECIES)?;
    let value = column(&headers, SABIO_VALUE)?;
    let unit = headers.iter().position(|h| h.trim() == SABIO_UNIT);

    for row in reader.records() {
        let row = row?;
        if field(&row, parameter_type) != Some("Km") {
            continue;
        }
        let Some(cofactor) = field(&row, species) else {
            continue;
        };
        if !cofactors.iter().any(|c| c == cofactor) {
            continue;
        }
        let Some(raw) = field(&row, value)
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|v| v.is_finite())
        else {
            continue;
        };
        let row_unit = unit.and_then(|u| field(&row, u));
        let Some(km) = to_millimolar(raw, row_unit) else {
            debug!(unit = row_unit, "Skipping Km value with unsupported unit");
            continue;
        };
        let Some(organism) = field(&row, organism) else {
            continue;
        };
        table.push(KineticRecord::new(
            organism,
            field(&row, ec),
            field(&row, uniprot),
            km,
        ));
    }
    Ok(table)
}

/// Read a BRENDA Km table, values are already millimolar
pub fn read_brenda<P: AsRef<Path>>(path: P) -> Result<KineticTable, KineticsIoError> {
    let path = path.as_ref();
    let table = brenda_from_reader(File::open(path)?)?;
    info!(path = %path.display(), records = table.len(), "Read BRENDA Km values");
    Ok(table)
}

/// Parse a BRENDA Km table from any reader
///
/// Columns are `ec, km, substrate, commentary, organism, ligand id, literature`. Values that
/// are not positive finite numbers, including BRENDA's `-999` placeholder, are skipped.
pub fn brenda_from_reader<R: Read>(reader: R) -> Result<KineticTable, KineticsIoError> {
    let mut reader = tab_reader(reader, false);
    let mut table = KineticTable::new();
    let mut rows = 0usize;
    for row in reader.records() {
        let row = row?;
        rows += 1;
        let Some(km) = field(&row, BRENDA_KM)
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|km| km.is_finite() && *km > 0.)
        else {
            continue;
        };
        let (Some(ec), Some(organism)) = (field(&row, BRENDA_EC), field(&row, BRENDA_ORGANISM))
        else {
            continue;
        };
        table.push(KineticRecord::new(organism, Some(ec), None, km));
    }
    if rows == 0 {
        warn!("BRENDA table is empty");
    }
    Ok(table)
}

/// Write a table as `species, ec, uniprot, value, unit` tab separated rows
pub fn write_table<P: AsRef<Path>>(table: &KineticTable, path: P) -> Result<(), KineticsIoError> {
    let mut writer = WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(path.as_ref())?;
    for record in table.records() {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read a table written by [`write_table`]
pub fn read_table<P: AsRef<Path>>(path: P) -> Result<KineticTable, KineticsIoError> {
    let path = path.as_ref();
    let mut reader = tab_reader(File::open(path)?, true);
    let mut table = KineticTable::new();
    for record in reader.deserialize::<KineticRecord>() {
        let record = record?;
        match to_millimolar(record.value, Some(&record.unit)).filter(|v| v.is_finite()) {
            Some(value) => table.push(KineticRecord::new(
                &record.species,
                record.ec.as_deref(),
                record.uniprot.as_deref(),
                value,
            )),
            None => warn!(
                unit = %record.unit,
                value = record.value,
                "Skipping record with unsupported unit or value"
            ),
        }
    }
    if table.is_empty() {
        warn!(path = %path.display(), "Kinetic table is empty");
    }
    Ok(table)
}

#[derive(Error, Debug)]
pub enum KineticsIoError {
    #[error("Kinetic data file is missing the {0} column")]
    MissingColumn(String),
    #[error("Unable to read kinetic data due to {0}")]
    Csv(#[from] csv::Error),
    #[error("Unable to access kinetic data file")]
    Io(#[from] std::io::Error),
}
