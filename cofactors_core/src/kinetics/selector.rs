//! Choosing a single Km for a reaction out of the available kinetic data
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::configuration::DEFAULT_SPECIES_PREFERENCE;
use crate::kinetics::mapping::IdentifierMapping;
use crate::kinetics::table::{IdentifierKind, KineticTable};

/// How one Km is picked when a species has several measurements
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KmDecision {
    /// Smallest value
    #[default]
    Min,
    /// Arithmetic mean
    #[serde(alias = "avg")]
    Mean,
    /// Median, the mean of the two middle values for an even count
    #[serde(alias = "med")]
    Median,
}

impl KmDecision {
    /// Reduce the values to one, `None` if there are no values
    pub fn apply(&self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        match self {
            KmDecision::Min => values.iter().copied().reduce(f64::min),
            KmDecision::Mean => Some(values.iter().sum::<f64>() / values.len() as f64),
            KmDecision::Median => {
                let mut sorted = values.to_vec();
                sorted.sort_by(f64::total_cmp);
                let middle = sorted.len() / 2;
                if sorted.len() % 2 == 0 {
                    Some((sorted[middle - 1] + sorted[middle]) / 2.)
                } else {
                    Some(sorted[middle])
                }
            }
        }
    }
}

impl FromStr for KmDecision {
    type Err = UnknownKmDecision;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "min" => Ok(KmDecision::Min),
            "mean" | "avg" => Ok(KmDecision::Mean),
            "median" | "med" => Ok(KmDecision::Median),
            _ => Err(UnknownKmDecision(s.to_string())),
        }
    }
}

impl Display for KmDecision {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            KmDecision::Min => write!(f, "min"),
            KmDecision::Mean => write!(f, "mean"),
            KmDecision::Median => write!(f, "median"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("Unknown Km decision {0}, expected min, mean or median")]
pub struct UnknownKmDecision(pub String);

/// Species to take kinetic data from, most preferred first
///
/// Names are stored lowercase. An empty preference pools the data of every species.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct SpeciesPreference(Vec<String>);

impl SpeciesPreference {
    pub fn new<I, S>(species: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        SpeciesPreference(
            species
                .into_iter()
                .map(|s| s.as_ref().trim().to_lowercase())
                .collect(),
        )
    }

    /// Preference which pools every species
    pub fn any() -> Self {
        SpeciesPreference(Vec::new())
    }

    pub fn species(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for SpeciesPreference {
    fn default() -> Self {
        SpeciesPreference::new(DEFAULT_SPECIES_PREFERENCE)
    }
}

impl From<Vec<String>> for SpeciesPreference {
    fn from(species: Vec<String>) -> Self {
        SpeciesPreference::new(species)
    }
}

impl From<SpeciesPreference> for Vec<String> {
    fn from(preference: SpeciesPreference) -> Self {
        preference.0
    }
}

/// Why no Km could be chosen for a reaction
///
/// None of these are errors in the data, the reaction simply keeps its bounds.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum KmUnavailable {
    #[error("No enzyme identifiers are mapped to the reaction")]
    MissingMapping,
    #[error("No kinetic data matches the reaction's identifiers")]
    NoKmData,
    #[error("None of the preferred species have kinetic data, available: {available:?}")]
    NoPreferredSpeciesFound { available: Vec<String> },
}

/// Pick the Km of a reaction
///
/// The identifiers mapped to the reaction select the candidate records. The first species in
/// `preference` with at least one candidate restricts the candidates to that species, and
/// `tie_break` reduces their values to the returned Km (in mM).
pub fn select_km(
    reaction_id: &str,
    mapping: &IdentifierMapping,
    table: &KineticTable,
    id_kind: IdentifierKind,
    preference: &SpeciesPreference,
    tie_break: KmDecision,
) -> Result<f64, KmUnavailable> {
    let ids = mapping
        .identifiers(reaction_id)
        .ok_or(KmUnavailable::MissingMapping)?;
    let candidates: Vec<_> = table.matching(id_kind, ids).collect();
    if candidates.is_empty() {
        return Err(KmUnavailable::NoKmData);
    }

    let values: Vec<f64> = if preference.is_empty() {
        candidates.iter().map(|record| record.value).collect()
    } else {
        let chosen = preference
            .species()
            .iter()
            .find(|species| candidates.iter().any(|record| record.is_species(species)))
            .ok_or_else(|| {
                let mut available: Vec<String> = candidates
                    .iter()
                    .map(|record| record.species.to_lowercase())
                    .collect();
                available.sort();
                available.dedup();
                KmUnavailable::NoPreferredSpeciesFound { available }
            })?;
        candidates
            .iter()
            .filter(|record| record.is_species(chosen))
            .map(|record| record.value)
            .collect()
    };
    tie_break.apply(&values).ok_or(KmUnavailable::NoKmData)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinetics::table::KineticRecord;

    fn mapping() -> IdentifierMapping {
        let mut mapping = IdentifierMapping::new();
        mapping.insert("R1", vec!["1.1.1.1".to_string()]);
        mapping.insert("R2", vec!["9.9.9.9".to_string()]);
        mapping.insert(
            "R3",
            vec!["1.1.1.37".to_string(), "1.1.1.37".to_string()],
        );
        mapping
    }

    fn table() -> KineticTable {
        vec![
            KineticRecord::new("bos taurus", Some("1.1.1.1"), None, 0.5),
            KineticRecord::new("homo sapiens", Some("1.1.1.37"), None, 0.4),
            KineticRecord::new("homo sapiens", Some("1.1.1.37"), None, 0.1),
            KineticRecord::new("homo sapiens", Some("1.1.1.37"), None, 0.3),
            KineticRecord::new("homo sapiens", Some("1.1.1.37"), None, 0.2),
            KineticRecord::new("Mus musculus", Some("1.1.1.37"), None, 0.01),
        ]
        .into_iter()
        .collect()
    }

    fn select(reaction: &str, preference: &SpeciesPreference, tie_break: KmDecision) -> Result<f64, KmUnavailable> {
        select_km(
            reaction,
            &mapping(),
            &table(),
            IdentifierKind::Ec,
            preference,
            tie_break,
        )
    }

    #[test]
    fn falls_through_to_available_species() {
        let preference = SpeciesPreference::new(["homo sapiens", "bos taurus"]);
        let km = select("R1", &preference, KmDecision::Min).unwrap();
        assert!((km - 0.5).abs() < 1e-12);
    }

    #[test]
    fn no_data() {
        let preference = SpeciesPreference::default();
        assert_eq!(
            select("R2", &preference, KmDecision::Min),
            Err(KmUnavailable::NoKmData)
        );
        assert_eq!(
            select("unmapped", &preference, KmDecision::Min),
            Err(KmUnavailable::MissingMapping)
        );
    }

    #[test]
    fn no_preferred_species() {
        let preference = SpeciesPreference::new(["Rattus norvegicus"]);
        assert_eq!(
            select("R3", &preference, KmDecision::Min),
            Err(KmUnavailable::NoPreferredSpeciesFound {
                available: vec!["homo sapiens".to_string(), "mus musculus".to_string()]
            })
        );
    }

    #[test]
    fn tie_breaks_within_species() {
        // Mouse data is ignored because humans come first
        let preference = SpeciesPreference::default();
        let min = select("R3", &preference, KmDecision::Min).unwrap();
        assert!((min - 0.1).abs() < 1e-12);
        let mean = select("R3", &preference, KmDecision::Mean).unwrap();
        assert!((mean - 0.25).abs() < 1e-12);
        let median = select("R3", &preference, KmDecision::Median).unwrap();
        assert!((median - 0.25).abs() < 1e-12);
    }

    #[test]
    fn empty_preference_pools_species() {
        let km = select("R3", &SpeciesPreference::any(), KmDecision::Min).unwrap();
        assert!((km - 0.01).abs() < 1e-12);
    }

    #[test]
    fn decisions() {
        assert_eq!(KmDecision::Median.apply(&[3., 1., 2.]), Some(2.));
        assert_eq!(KmDecision::Median.apply(&[4., 1., 2., 3.]), Some(2.5));
        assert_eq!(KmDecision::Mean.apply(&[1., 2.]), Some(1.5));
        assert_eq!(KmDecision::Min.apply(&[]), None);
        assert_eq!("avg".parse::<KmDecision>(), Ok(KmDecision::Mean));
        assert_eq!("med".parse::<KmDecision>(), Ok(KmDecision::Median));
        assert!("max".parse::<KmDecision>().is_err());
    }

    #[test]
    fn preference_is_lowercase() {
        let preference: SpeciesPreference =
            serde_json::from_str(r#"["Homo Sapiens", " Sus scrofa"]"#).unwrap();
        assert_eq!(preference.species(), ["homo sapiens", "sus scrofa"]);
        assert_eq!(
            serde_json::to_string(&preference).unwrap(),
            r#"["homo sapiens","sus scrofa"]"#
        );
    }
}
