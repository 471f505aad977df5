//! Kinetic data: the Km repository, the reaction to enzyme mapping, and Km selection

pub mod mapping;
pub mod selector;
pub mod table;
