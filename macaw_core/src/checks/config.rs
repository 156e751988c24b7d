//! Per-run configuration shared by the checks

use crate::optimize::flux::CancelFlag;
use derive_builder::Builder;

/// Knobs recognized by the checks
///
/// Build one with [`TestConfigBuilder`]; every field has a default so
/// `TestConfig::default()` runs every check with its standard settings (the
/// redox and diphosphate classifications quietly pass everything when their
/// metabolite id lists are left empty).
#[derive(Builder, Debug, Clone)]
pub struct TestConfig {
    /// Pairs of (oxidized, reduced) metabolite ids for the redox duplicate
    /// classification
    #[builder(default = "Vec::new()")]
    pub redox_pairs: Vec<(String, String)>,
    /// Ids of the metabolites representing protons
    #[builder(default = "Vec::new()")]
    pub proton_ids: Vec<String>,
    /// Ids of the metabolites representing diphosphate ions
    #[builder(default = "Vec::new()")]
    pub ppi_ids: Vec<String>,
    /// Ids of the metabolites representing inorganic monophosphate ions
    #[builder(default = "Vec::new()")]
    pub pi_ids: Vec<String>,
    /// Metabolites (by id or name) whose uptake stays open during the
    /// dilution test; None leaves every exchange bound alone
    #[builder(default = "None")]
    pub media_mets: Option<Vec<String>>,
    /// Restrict the dilution experiments to these metabolite ids; None tests
    /// every metabolite that doesn't match the tRNA/cytochrome skip list
    #[builder(default = "None")]
    pub mets_to_dilute: Option<Vec<String>>,
    /// LP-derived magnitudes within this distance of zero count as zero
    #[builder(default = "1e-08")]
    pub zero_threshold: f64,
    /// Minimum |Pearson correlation| for a loop-test edge
    #[builder(default = "0.9")]
    pub corr_threshold: f64,
    /// Number of flux distributions sampled in loop phase 2
    #[builder(default = "1000")]
    pub flux_samples: usize,
    /// Seed of the hit-and-run sampler's ChaCha12 stream
    #[builder(default = "20240708")]
    pub sample_seed: u64,
    /// Wall-clock budget in seconds for one per-metabolite dilution experiment
    #[builder(default = "1800.")]
    pub timeout: f64,
    /// Times a timed-out dilution experiment is retried before its
    /// participating reactions are conservatively flagged
    #[builder(default = "3")]
    pub max_attempts: u32,
    /// Bound of the leakage reactions added before the dilution experiments;
    /// 0 disables them
    #[builder(default = "1.")]
    pub leak_flux: f64,
    /// Render metabolite names instead of ids in the equation column
    #[builder(default = "false")]
    pub use_names: bool,
    /// Append compartment tags to the metabolite tokens in the equation column
    #[builder(default = "false")]
    pub add_suffixes: bool,
    /// 0 silent, 1 default summaries, 2 chatty
    #[builder(default = "1")]
    pub verbose: u8,
    /// Worker count for the per-metabolite and per-reaction fan-outs
    #[builder(default = "1")]
    pub threads: usize,
    /// Cooperative cancellation flag polled between LP solves
    #[builder(default = "None")]
    pub cancel: Option<CancelFlag>,
}

impl Default for TestConfig {
    fn default() -> Self {
        TestConfigBuilder::default()
            .build()
            .expect("every TestConfig field has a default")
    }
}
