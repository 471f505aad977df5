//! This module provides a struct for representing reactions, and their flux bounds
use derive_builder::Builder;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::configuration::{DEFAULT_LOWER_BOUND, DEFAULT_UPPER_BOUND};

/// Represents a reaction in the metabolic model
#[derive(Builder, Debug, Clone, PartialEq)]
pub struct Reaction {
    /// Used to identify the reaction
    pub id: String,
    /// Metabolite stoichiometry of the reaction
    #[builder(default = "IndexMap::new()")]
    pub metabolites: IndexMap<String, f64>,
    /// Human-readable reaction name
    #[builder(default = "None")]
    pub name: Option<String>,
    /// Lower flux bound the reaction was loaded with
    #[builder(default = "DEFAULT_LOWER_BOUND")]
    pub lower_bound: f64,
    /// Upper flux bound the reaction was loaded with
    #[builder(default = "DEFAULT_UPPER_BOUND")]
    pub upper_bound: f64,
    /// Compartment of the reaction, takes precedence over the metabolite compartments
    #[builder(default = "None")]
    pub compartment: Option<String>,
    /// Reaction subsystem
    #[builder(default = "None")]
    pub subsystem: Option<String>,
    /// Gene reaction rule, kept as written in the model file
    #[builder(default = "None")]
    pub gene_reaction_rule: Option<String>,
    /// Notes about the reaction, stored as a JSON string
    #[builder(default = "None")]
    pub notes: Option<String>,
    /// Reaction Annotations, stored as a JSON string
    #[builder(default = "None")]
    pub annotation: Option<String>,
}

impl Reaction {
    /// Determine the id to be associated with the forward reaction in the optimization problem
    ///
    /// # Note:
    /// The forward id is "{reaction_id}_forward"
    pub fn get_forward_id(&self) -> String {
        format!("{}_forward", &self.id)
    }

    /// Determine the id to be associated with the reverse reaction in the optimization problem
    ///
    /// # Note:
    /// The reverse id is "{reaction_id}_reverse"
    pub fn get_reverse_id(&self) -> String {
        format!("{}_reverse", &self.id)
    }

    /// The bounds the reaction was loaded with
    pub fn initial_bounds(&self) -> Result<ReactionBounds, BoundsError> {
        ReactionBounds::new(self.lower_bound, self.upper_bound)
    }

    /// Whether any metabolite id of the reaction contains `tag` (case-insensitive)
    pub fn involves(&self, tag: &str) -> bool {
        let tag = tag.to_lowercase();
        self.metabolites
            .keys()
            .any(|met| met.to_lowercase().contains(&tag))
    }

    /// Values stored under `key` in the reaction annotation
    pub fn annotation_values(&self, key: &str) -> Vec<String> {
        json_field_values(self.annotation.as_deref(), key)
    }

    /// Values stored under `key` in the reaction notes
    pub fn note_values(&self, key: &str) -> Vec<String> {
        json_field_values(self.notes.as_deref(), key)
    }
}

/// Pull the string values of a field out of a JSON object string, a field may hold either a
/// single value or a list of values
fn json_field_values(raw: Option<&str>, key: &str) -> Vec<String> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    let Ok(Value::Object(map)) = serde_json::from_str::<Value>(raw) else {
        return Vec::new();
    };
    match map.get(key) {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Number(n)) => vec![n.to_string()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Flux bounds of a single reaction, always ordered so that `lower_bound <= upper_bound`
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReactionBounds {
    lower_bound: f64,
    upper_bound: f64,
}

impl ReactionBounds {
    /// Create new bounds, failing if they are not ordered
    pub fn new(lower_bound: f64, upper_bound: f64) -> Result<Self, BoundsError> {
        // Also rejects NaN on either side
        if !(lower_bound <= upper_bound) {
            return Err(BoundsError::Inverted {
                lower: lower_bound,
                upper: upper_bound,
            });
        }
        Ok(Self {
            lower_bound,
            upper_bound,
        })
    }

    /// Create bounds which always include zero, taking `min(low, 0)` as the lower bound and
    /// `max(high, 0)` as the upper bound
    pub fn straddling_zero(low: f64, high: f64) -> Self {
        Self {
            lower_bound: low.min(0.),
            upper_bound: high.max(0.),
        }
    }

    pub fn lower_bound(&self) -> f64 {
        self.lower_bound
    }

    pub fn upper_bound(&self) -> f64 {
        self.upper_bound
    }

    /// Bounds of the variable associated with the forward reaction
    pub(crate) fn forward(&self) -> (f64, f64) {
        (self.lower_bound.max(0.), self.upper_bound.max(0.))
    }

    /// Bounds of the variable associated with the reverse reaction
    pub(crate) fn reverse(&self) -> (f64, f64) {
        ((-self.upper_bound).max(0.), (-self.lower_bound).max(0.))
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BoundsError {
    #[error("Invalid reaction bounds, lower bound {lower} is not below upper bound {upper}")]
    Inverted { lower: f64, upper: f64 },
}
