//! This module provides the Model struct for representing the topology of a metabolic model
use indexmap::IndexMap;

use crate::metabolic_model::metabolite::Metabolite;
use crate::metabolic_model::reaction::Reaction;

/// Represents a Genome Scale Metabolic Model
///
/// The model only holds the topology (reactions, metabolites, stoichiometry, objective) and
/// the bounds reactions were loaded with. Bounds used for analysis live in a
/// [`ModelSnapshot`](crate::metabolic_model::snapshot::ModelSnapshot).
#[derive(Clone, Debug, PartialEq)]
pub struct Model {
    /// Map of reaction ids to Reaction Objects
    pub reactions: IndexMap<String, Reaction>,
    /// Map of metabolite ids to Metabolite Objects
    pub metabolites: IndexMap<String, Metabolite>,
    /// Map of reaction ids to objective function coefficients
    pub objective: IndexMap<String, f64>,
    /// Id associated with the Model
    pub id: Option<String>,
    /// Compartments in the model
    ///
    /// An IndexMap<String, String> of {short name: long name}
    pub compartments: Option<IndexMap<String, String>>,
    /// A version identifier for the Model, stored as a string
    pub version: Option<String>,
}

impl Model {
    pub fn new_empty() -> Self {
        Model {
            reactions: IndexMap::new(),
            metabolites: IndexMap::new(),
            objective: IndexMap::new(),
            id: None,
            compartments: None,
            version: None,
        }
    }

    /// Add a reaction to the model
    ///
    /// # Parameters
    /// - reaction: Reaction to add
    ///
    /// # Examples
    /// ```rust
    /// use cofactors_core::metabolic_model::model::Model;
    /// use cofactors_core::metabolic_model::reaction::ReactionBuilder;
    /// let mut model = Model::new_empty();
    /// let new_reaction = ReactionBuilder::default().id("new_reaction".to_string()).build().unwrap();
    /// model.add_reaction(new_reaction);
    /// ```
    pub fn add_reaction(&mut self, reaction: Reaction) {
        let id = reaction.id.clone();
        self.reactions.insert(id, reaction);
    }

    /// Add a metabolite to the model
    pub fn add_metabolite(&mut self, metabolite: Metabolite) {
        let id = metabolite.id.clone();
        self.metabolites.insert(id, metabolite);
    }

    /// Set the objective coefficient of a reaction
    pub fn set_objective_coefficient(&mut self, reaction_id: &str, coefficient: f64) {
        self.objective.insert(reaction_id.to_string(), coefficient);
    }

    /// Compartment used when looking up the cofactor concentration for a reaction
    ///
    /// This is the reaction's own compartment if it has one, otherwise the compartment of the
    /// first metabolite (in stoichiometry order) that is assigned to a compartment.
    pub fn reaction_compartment(&self, reaction_id: &str) -> Option<&str> {
        let reaction = self.reactions.get(reaction_id)?;
        if let Some(compartment) = reaction.compartment.as_deref() {
            return Some(compartment);
        }
        reaction.metabolites.keys().find_map(|met_id| {
            self.metabolites
                .get(met_id)
                .and_then(|met| met.compartment.as_deref())
        })
    }
}
