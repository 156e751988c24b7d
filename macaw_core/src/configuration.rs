use std::sync::{LazyLock, RwLock};

pub static CONFIGURATION: LazyLock<RwLock<Configuration>> =
    LazyLock::new(|| RwLock::new(Configuration::default()));

pub struct Configuration {
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub zero_threshold: f64,
    pub dilution_factor: f64,
    pub solver: Solver,
    pub processes: u32,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            lower_bound: -1000.,
            upper_bound: 1000.,
            zero_threshold: 1e-08,
            dilution_factor: 1000.,
            solver: Solver::Clarabel,
            processes: 1,
        }
    }
}

/// Enum used to specify the default solver to use
pub enum Solver {
    /// Use the Clarabel interior point solver
    Clarabel,
}
