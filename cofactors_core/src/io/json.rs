//! Module providing JSON IO for metabolic models in the COBRA json layout
use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::metabolic_model::metabolite::Metabolite;
use crate::metabolic_model::model::Model;
use crate::metabolic_model::reaction::{Reaction, ReactionBuilder, ReactionBuilderError};
use crate::metabolic_model::snapshot::ModelSnapshot;

// region JSON Model
/// Represents a JSON serialized model, used for reading and writing models in json format
///
/// Gene entries are accepted but not kept, reactions keep their gene reaction rule as text.
#[derive(Serialize, Deserialize)]
struct JsonModel {
    metabolites: Vec<JsonMetabolite>,
    reactions: Vec<JsonReaction>,
    #[serde(default)]
    genes: Vec<Value>,
    id: Option<String>,
    compartments: Option<IndexMap<String, String>>,
    version: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct JsonMetabolite {
    id: String,
    name: Option<String>,
    compartment: Option<String>,
    charge: Option<i32>,
    formula: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    notes: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    annotation: Option<Value>,
}

#[derive(Serialize, Deserialize)]
struct JsonReaction {
    id: String,
    name: Option<String>,
    metabolites: IndexMap<String, f64>,
    lower_bound: f64,
    upper_bound: f64,
    #[serde(default)]
    gene_reaction_rule: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    objective_coefficient: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    compartment: Option<String>,
    subsystem: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    notes: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    annotation: Option<Value>,
}
// endregion JSON Model

// region Conversions
/// Notes and annotations are kept as JSON strings, anything that no longer parses is written
/// back out as a plain string
fn to_json_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

impl From<JsonMetabolite> for Metabolite {
    fn from(m: JsonMetabolite) -> Self {
        Self {
            id: m.id,
            name: m.name,
            compartment: m.compartment,
            charge: m.charge.unwrap_or_default(),
            formula: m.formula,
            notes: m.notes.map(|v| v.to_string()),
            annotation: m.annotation.map(|v| v.to_string()),
        }
    }
}

impl From<&Metabolite> for JsonMetabolite {
    fn from(m: &Metabolite) -> Self {
        Self {
            id: m.id.clone(),
            name: m.name.clone(),
            compartment: m.compartment.clone(),
            charge: Some(m.charge),
            formula: m.formula.clone(),
            notes: m.notes.as_deref().map(to_json_value),
            annotation: m.annotation.as_deref().map(to_json_value),
        }
    }
}

impl TryFrom<JsonReaction> for Reaction {
    type Error = ReactionBuilderError;

    fn try_from(rxn: JsonReaction) -> Result<Self, Self::Error> {
        let gene_reaction_rule = Some(rxn.gene_reaction_rule).filter(|rule| !rule.is_empty());
        ReactionBuilder::default()
            .id(rxn.id)
            .metabolites(rxn.metabolites)
            .name(rxn.name)
            .lower_bound(rxn.lower_bound)
            .upper_bound(rxn.upper_bound)
            .compartment(rxn.compartment)
            .subsystem(rxn.subsystem)
            .gene_reaction_rule(gene_reaction_rule)
            .notes(rxn.notes.map(|v| v.to_string()))
            .annotation(rxn.annotation.map(|v| v.to_string()))
            .build()
    }
}

impl Model {
    /// Read a model from a COBRA json file
    pub fn read_json<P: AsRef<Path>>(path: P) -> Result<Model, JsonError> {
        let model_str =
            fs::read_to_string(path).map_err(|err| JsonError::UnableToRead(err.to_string()))?;
        Model::from_json_str(&model_str)
    }

    /// Parse a model from a COBRA json string
    pub fn from_json_str(model_str: &str) -> Result<Model, JsonError> {
        let json_model = serde_json::from_str::<JsonModel>(model_str)
            .map_err(|err| JsonError::UnableToParse(err.to_string()))?;
        Model::from_json(json_model)
    }

    /// Write the model to `path` in the COBRA json layout
    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<(), JsonError> {
        let model_string = self.to_json_string()?;
        fs::write(path, model_string)?;
        Ok(())
    }

    /// Serialize the model to a COBRA json string
    pub fn to_json_string(&self) -> Result<String, JsonError> {
        Ok(serde_json::to_string_pretty(&self.to_json())?)
    }

    fn from_json(json_model: JsonModel) -> Result<Self, JsonError> {
        let mut model = Model::new_empty();
        json_model
            .metabolites
            .into_iter()
            .for_each(|m| model.add_metabolite(Metabolite::from(m)));
        for rxn in json_model.reactions {
            // Only nonzero coefficients make up the objective
            if let Some(coef) = rxn.objective_coefficient.filter(|c| *c != 0.) {
                model.set_objective_coefficient(&rxn.id, coef);
            }
            model.add_reaction(Reaction::try_from(rxn)?);
        }
        model.id = json_model.id;
        model.compartments = json_model.compartments;
        model.version = json_model.version;
        debug!(
            reactions = model.reactions.len(),
            metabolites = model.metabolites.len(),
            "Read json model"
        );
        Ok(model)
    }

    fn to_json(&self) -> JsonModel {
        let reactions = self
            .reactions
            .values()
            .map(|r| JsonReaction {
                id: r.id.clone(),
                name: r.name.clone(),
                metabolites: r.metabolites.clone(),
                lower_bound: r.lower_bound,
                upper_bound: r.upper_bound,
                gene_reaction_rule: r.gene_reaction_rule.clone().unwrap_or_default(),
                objective_coefficient: self.objective.get(&r.id).copied(),
                compartment: r.compartment.clone(),
                subsystem: r.subsystem.clone(),
                notes: r.notes.as_deref().map(to_json_value),
                annotation: r.annotation.as_deref().map(to_json_value),
            })
            .collect();
        JsonModel {
            metabolites: self.metabolites.values().map(JsonMetabolite::from).collect(),
            reactions,
            genes: Vec::new(),
            id: self.id.clone(),
            compartments: self.compartments.clone(),
            version: self.version.clone(),
        }
    }
}

impl ModelSnapshot {
    /// Write the model with this snapshot's bounds as its reaction bounds
    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<(), JsonError> {
        self.to_model().write_json(path)
    }
}

#[derive(Error, Debug)]
pub enum JsonError {
    #[error("Unable to read file due to {0}")]
    UnableToRead(String),
    #[error("Unable to parse json due to {0}")]
    UnableToParse(String),
    #[error("Unable to build reaction")]
    UnableToBuildReaction(#[from] ReactionBuilderError),
    #[error("Serde json parse error")]
    SerdeJsonParseError(#[from] serde_json::Error),
    #[error("Unable to write to file")]
    UnableToWrite(#[from] std::io::Error),
}

// endregion Conversions
