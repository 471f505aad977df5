//! Integration of cofactor concentrations into reaction bounds
//!
//! [`rescale`] holds the Michaelis-Menten correction, [`rebind`] applies it to every reaction
//! of a model snapshot, and [`scan`] sweeps the concentration while observing the model.

pub mod rebind;
pub mod rescale;
pub mod scan;
