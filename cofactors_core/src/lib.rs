//! Core implementation of cofactor concentration integration for constraint based metabolic
//! models.
//!
//! Reaction flux bounds are rescaled with a Michaelis-Menten correction when the
//! concentration of a cofactor such as NAD+ changes, using Km values selected from kinetic
//! databases.

pub mod configuration;
pub mod integration;
pub mod io;
pub mod kinetics;
pub mod metabolic_model;
pub mod optimize;
#[cfg(test)]
mod testing;
