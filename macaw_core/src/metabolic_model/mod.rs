//! Provides the representation of a Genome Scale Metabolic Model

pub mod metabolite;
pub mod model;
pub mod reaction;

pub use metabolite::Metabolite;
pub use model::Model;
pub use reaction::Reaction;
