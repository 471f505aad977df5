//! Snapshots pair a shared, read-only model topology with an owned table of reaction bounds
use std::sync::Arc;

use indexmap::IndexMap;
use thiserror::Error;

use crate::metabolic_model::model::Model;
use crate::metabolic_model::reaction::{BoundsError, Reaction, ReactionBounds};

/// A metabolic model at one set of reaction bounds
///
/// Cloning a snapshot only copies the bounds table, the topology is shared between all
/// snapshots derived from the same model.
#[derive(Clone, Debug)]
pub struct ModelSnapshot {
    model: Arc<Model>,
    bounds: IndexMap<String, ReactionBounds>,
}

impl ModelSnapshot {
    /// Create a snapshot from a model, using the bounds the reactions were loaded with
    pub fn new(model: Model) -> Result<Self, SnapshotError> {
        Self::from_shared(Arc::new(model))
    }

    /// Create a snapshot from an already shared model
    pub fn from_shared(model: Arc<Model>) -> Result<Self, SnapshotError> {
        let mut bounds = IndexMap::with_capacity(model.reactions.len());
        for (id, reaction) in &model.reactions {
            let reaction_bounds =
                reaction
                    .initial_bounds()
                    .map_err(|source| SnapshotError::InvalidBounds {
                        reaction: id.clone(),
                        source,
                    })?;
            bounds.insert(id.clone(), reaction_bounds);
        }
        Ok(Self { model, bounds })
    }

    /// Underlying model topology
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Current bounds of a reaction
    pub fn bounds(&self, reaction_id: &str) -> Option<ReactionBounds> {
        self.bounds.get(reaction_id).copied()
    }

    /// The full bounds table, keyed by reaction id in model order
    pub fn bounds_table(&self) -> &IndexMap<String, ReactionBounds> {
        &self.bounds
    }

    /// Iterate over reactions together with their current bounds
    pub fn reactions(&self) -> impl Iterator<Item = (&Reaction, ReactionBounds)> + '_ {
        self.model
            .reactions
            .values()
            .filter_map(|reaction| self.bounds(&reaction.id).map(|b| (reaction, b)))
    }

    /// Replace the bounds of a single reaction
    pub fn set_bounds(
        &mut self,
        reaction_id: &str,
        bounds: ReactionBounds,
    ) -> Result<(), SnapshotError> {
        match self.bounds.get_mut(reaction_id) {
            Some(current) => {
                *current = bounds;
                Ok(())
            }
            None => Err(SnapshotError::UnknownReaction(reaction_id.to_string())),
        }
    }

    /// Create a new snapshot sharing this topology with a different bounds table
    pub(crate) fn with_bounds(&self, bounds: IndexMap<String, ReactionBounds>) -> Self {
        Self {
            model: Arc::clone(&self.model),
            bounds,
        }
    }

    /// Whether two snapshots were derived from the same model
    pub fn shares_topology_with(&self, other: &ModelSnapshot) -> bool {
        Arc::ptr_eq(&self.model, &other.model)
    }

    /// Build a standalone model whose reactions carry this snapshot's bounds
    pub fn to_model(&self) -> Model {
        let mut model = (*self.model).clone();
        for (id, reaction) in model.reactions.iter_mut() {
            if let Some(bounds) = self.bounds.get(id) {
                reaction.lower_bound = bounds.lower_bound();
                reaction.upper_bound = bounds.upper_bound();
            }
        }
        model
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SnapshotError {
    #[error("Reaction {reaction} has invalid bounds")]
    InvalidBounds {
        reaction: String,
        #[source]
        source: BoundsError,
    },
    #[error("Reaction {0} is not in the model")]
    UnknownReaction(String),
}
