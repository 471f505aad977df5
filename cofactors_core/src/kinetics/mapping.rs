//! Association of model reactions with enzyme identifiers
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use tracing::info;

use crate::kinetics::table::IdentifierKind;
use crate::metabolic_model::model::Model;
use crate::metabolic_model::reaction::Reaction;

/// Separators found between identifiers in annotation values
static SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",|\+|\band\b|\bor\b").expect("valid separator pattern"));

/// Full EC numbers in free text
static EC_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]\.[0-9]+\.[0-9]+\.[0-9]+").expect("valid EC pattern"));

/// Annotation key holding EC numbers
const EC_ANNOTATION: &str = "ec-code";
/// Note keys holding EC numbers
const EC_NOTES: [&str; 2] = ["EC NUMBER", "EC Number"];
/// Annotation key holding UniProt accessions
const UNIPROT_ANNOTATION: &str = "uniprot";

/// Identifiers of each mapped reaction, in insertion order
///
/// Identifiers are kept as given, duplicates included.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IdentifierMapping {
    entries: IndexMap<String, Vec<String>>,
}

impl IdentifierMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the identifiers of a reaction, replacing any it already had
    pub fn insert(&mut self, reaction_id: &str, identifiers: Vec<String>) {
        self.entries.insert(reaction_id.to_string(), identifiers);
    }

    pub fn identifiers(&self, reaction_id: &str) -> Option<&[String]> {
        self.entries.get(reaction_id).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(reaction, ids)| (reaction.as_str(), ids.as_slice()))
    }

    /// Build a mapping from the annotations of a model
    ///
    /// # Parameters
    /// - `kind`: Which identifiers to collect
    /// - `tag`: Only reactions with a metabolite whose id contains the tag are mapped, `None`
    ///   maps every reaction
    pub fn from_model(model: &Model, kind: IdentifierKind, tag: Option<&str>) -> Self {
        let mut mapping = IdentifierMapping::new();
        let mut unmapped = 0usize;
        for reaction in model.reactions.values() {
            if tag.is_some_and(|tag| !reaction.involves(tag)) {
                continue;
            }
            let identifiers = reaction_identifiers(reaction, kind);
            if identifiers.is_empty() {
                unmapped += 1;
            } else {
                mapping.insert(&reaction.id, identifiers);
            }
        }
        info!(
            mapped = mapping.len(),
            unmapped,
            kind = %kind,
            "built identifier mapping from model annotations"
        );
        mapping
    }
}

impl FromIterator<(String, Vec<String>)> for IdentifierMapping {
    fn from_iter<T: IntoIterator<Item = (String, Vec<String>)>>(iter: T) -> Self {
        IdentifierMapping {
            entries: iter.into_iter().collect(),
        }
    }
}

fn reaction_identifiers(reaction: &Reaction, kind: IdentifierKind) -> Vec<String> {
    match kind {
        IdentifierKind::Ec => {
            let mut identifiers: Vec<String> = reaction
                .annotation_values(EC_ANNOTATION)
                .iter()
                .flat_map(|value| split_identifiers(value, kind))
                .collect();
            for key in EC_NOTES {
                for note in reaction.note_values(key) {
                    identifiers.extend(extract_ec_numbers(&note));
                }
            }
            identifiers
        }
        IdentifierKind::Uniprot => reaction
            .annotation_values(UNIPROT_ANNOTATION)
            .iter()
            .flat_map(|value| split_identifiers(value, kind))
            .collect(),
    }
}

/// Split an annotation value holding several identifiers
///
/// Entries are separated by `,`, `+`, `and` or `or`. EC entries without a `.` are partial
/// matches and dropped.
pub fn split_identifiers(raw: &str, kind: IdentifierKind) -> Vec<String> {
    SEPARATORS
        .split(raw)
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter(|entry| kind != IdentifierKind::Ec || entry.contains('.'))
        .map(str::to_string)
        .collect()
}

/// Find every complete EC number in a piece of text
pub fn extract_ec_numbers(text: &str) -> Vec<String> {
    EC_NUMBER
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}
