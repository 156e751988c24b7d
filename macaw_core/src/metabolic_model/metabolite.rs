//! This module provides the metabolite struct representing a metabolite

use std::hash::Hash;

use derive_builder::Builder;

/// Represents a metabolite
#[derive(Builder, Debug, Clone)]
pub struct Metabolite {
    /// Used to identify the metabolite (must be unique)
    pub id: String,
    /// Human Readable name of the metabolite
    #[builder(default = "None")]
    pub name: Option<String>,
    /// Which compartment the metabolite is in
    #[builder(default = "None")]
    pub compartment: Option<String>,
}

impl Metabolite {
    /// The display name, falling back to the id when no name is set
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// The display name with any trailing compartment tag removed
    ///
    /// Metabolite names in curated models frequently end with their
    /// compartment in brackets or parentheses (e.g. "pyruvate [c]"); the
    /// bare name is what identifies the same compound across compartments.
    pub fn bare_name(&self) -> String {
        let name = self.display_name();
        if let Some(ref compartment) = self.compartment {
            for (open, close) in [('[', ']'), ('(', ')'), ('{', '}')] {
                let suffix = format!("{}{}{}", open, compartment, close);
                if let Some(stripped) = name.strip_suffix(&suffix) {
                    return stripped.trim_end().to_string();
                }
            }
        }
        name.to_string()
    }
}

impl Hash for Metabolite {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state); // Hash by id
                             // If the metabolite has an associated compartment, also hash by that
        if let Some(ref compartment) = self.compartment {
            compartment.hash(state)
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_name_strips_compartment_suffix() {
        let met = MetaboliteBuilder::default()
            .id("pyr_c".to_string())
            .name(Some("pyruvate [c]".to_string()))
            .compartment(Some("c".to_string()))
            .build()
            .unwrap();
        assert_eq!(met.bare_name(), "pyruvate");
    }

    #[test]
    fn bare_name_without_suffix_is_unchanged() {
        let met = MetaboliteBuilder::default()
            .id("pyr_m".to_string())
            .name(Some("pyruvate".to_string()))
            .compartment(Some("m".to_string()))
            .build()
            .unwrap();
        assert_eq!(met.bare_name(), "pyruvate");
    }
}
