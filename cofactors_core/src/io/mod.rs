//! Reading and writing models, kinetic data, identifier mappings and scan results
pub mod json;
pub mod kinetics;
pub mod mapping;
pub mod results;
