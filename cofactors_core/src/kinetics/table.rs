//! Kinetic parameter records, normalized to millimolar
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unit every Km value is stored in
pub const MILLIMOLAR: &str = "mM";

/// Kind of enzyme identifier used to match reactions with kinetic records
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdentifierKind {
    /// Enzyme Commission number
    #[default]
    #[serde(rename = "ec")]
    Ec,
    /// UniProt accession
    #[serde(rename = "up", alias = "uniprot")]
    Uniprot,
}

impl FromStr for IdentifierKind {
    type Err = UnknownIdentifierKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ec" => Ok(IdentifierKind::Ec),
            "up" | "uniprot" => Ok(IdentifierKind::Uniprot),
            _ => Err(UnknownIdentifierKind(s.to_string())),
        }
    }
}

impl Display for IdentifierKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            IdentifierKind::Ec => write!(f, "ec"),
            IdentifierKind::Uniprot => write!(f, "up"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("Unknown identifier kind {0}, expected ec or up")]
pub struct UnknownIdentifierKind(pub String);

/// A single Km measurement
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KineticRecord {
    /// Scientific name of the species the enzyme was measured in, lowercase
    pub species: String,
    pub ec: Option<String>,
    pub uniprot: Option<String>,
    /// Km value in millimolar
    pub value: f64,
    pub unit: String,
}

impl KineticRecord {
    /// Create a record from a value already converted to millimolar
    pub fn new(species: &str, ec: Option<&str>, uniprot: Option<&str>, value: f64) -> Self {
        let clean = |id: Option<&str>| {
            id.map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
        };
        KineticRecord {
            species: species.trim().to_lowercase(),
            ec: clean(ec),
            uniprot: clean(uniprot),
            value,
            unit: MILLIMOLAR.to_string(),
        }
    }

    /// Identifier of the given kind, if the record has one
    pub fn identifier(&self, kind: IdentifierKind) -> Option<&str> {
        match kind {
            IdentifierKind::Ec => self.ec.as_deref(),
            IdentifierKind::Uniprot => self.uniprot.as_deref(),
        }
    }

    /// Whether the record was measured in `species`, ignoring case
    pub fn is_species(&self, species: &str) -> bool {
        self.species.to_lowercase() == species.to_lowercase()
    }
}

/// Unordered collection of kinetic records
#[derive(Clone, Debug, Default, PartialEq)]
pub struct KineticTable {
    records: Vec<KineticRecord>,
}

impl KineticTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: KineticRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[KineticRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records whose identifier of the given kind is one of `ids`
    pub fn matching<'a>(
        &'a self,
        kind: IdentifierKind,
        ids: &'a [String],
    ) -> impl Iterator<Item = &'a KineticRecord> + 'a {
        self.records.iter().filter(move |record| {
            record
                .identifier(kind)
                .is_some_and(|id| ids.iter().any(|wanted| wanted == id))
        })
    }

    /// Distinct species in the table, in order of first appearance
    pub fn species(&self) -> Vec<&str> {
        self.records
            .iter()
            .map(|record| record.species.as_str())
            .collect::<IndexSet<_>>()
            .into_iter()
            .collect()
    }
}

impl FromIterator<KineticRecord> for KineticTable {
    fn from_iter<T: IntoIterator<Item = KineticRecord>>(iter: T) -> Self {
        KineticTable {
            records: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for KineticTable {
    type Item = KineticRecord;
    type IntoIter = std::vec::IntoIter<KineticRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl Extend<KineticRecord> for KineticTable {
    fn extend<T: IntoIterator<Item = KineticRecord>>(&mut self, iter: T) {
        self.records.extend(iter);
    }
}
