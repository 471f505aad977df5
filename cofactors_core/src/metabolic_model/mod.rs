//! Module providing the Model struct for representing a metabolic model, and snapshots of its
//! reaction bounds.

pub mod metabolite;
pub mod model;
pub mod reaction;
pub mod snapshot;
