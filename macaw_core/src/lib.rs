//! Core rust implementation of MACAW, a crate providing a battery of static and
//! flux-based consistency checks for Genome-Scale Metabolic Models.

pub mod checks;
mod configuration;
pub mod metabolic_model;
pub mod optimize;
mod utils;

pub use configuration::CONFIGURATION;
