//! The results table and the driver that runs every check
//!
//! Verdicts live as typed enums until they hit the CSV boundary; the writer
//! emits the canonical string alphabet of each test, one row per reaction.

use std::io::Write;
use std::path::Path;

use indexmap::IndexMap;
use log::info;
use serde::Serialize;

use crate::checks::config::TestConfig;
use crate::checks::dead_end::{dead_end_test, DeadEndVerdict};
use crate::checks::dilution::{dilution_test, DilutionVerdict};
use crate::checks::diphosphate::{diphosphate_test, DiphosphateVerdict};
use crate::checks::duplicate::{duplicate_test, DuplicateVerdict};
use crate::checks::graph::{form_pathways, EdgeSet};
use crate::checks::loops::{loop_test, LoopVerdict};
use crate::checks::MacawError;
use crate::metabolic_model::model::Model;
use crate::utils::equations::reaction_equation;

/// One row of the results table
#[derive(Debug, Clone)]
pub struct ReactionResult {
    pub reaction_id: String,
    pub reaction_equation: String,
    pub dead_end: DeadEndVerdict,
    pub dilution: DilutionVerdict,
    pub diphosphate: DiphosphateVerdict,
    pub duplicate_exact: DuplicateVerdict,
    pub duplicate_directions: DuplicateVerdict,
    pub duplicate_coefficients: DuplicateVerdict,
    pub duplicate_redox: DuplicateVerdict,
    pub loop_verdict: LoopVerdict,
    pub pathway: u32,
}

/// The joined verdicts of every check, one row per reaction
#[derive(Debug, Clone)]
pub struct ResultsTable {
    pub rows: Vec<ReactionResult>,
}

/// String form of a row, only materialized at the serialization boundary
#[derive(Serialize)]
struct CsvRow<'a> {
    reaction_id: &'a str,
    reaction_equation: &'a str,
    dead_end_test: String,
    dilution_test: String,
    diphosphate_test: String,
    duplicate_test_exact: String,
    duplicate_test_directions: String,
    duplicate_test_coefficients: String,
    duplicate_test_redox: String,
    loop_test: String,
    pathway: u32,
}

impl ResultsTable {
    /// The row for a particular reaction
    pub fn row(&self, reaction_id: &str) -> Option<&ReactionResult> {
        self.rows.iter().find(|row| row.reaction_id == reaction_id)
    }

    /// Write the table as CSV for the downstream figure scripts
    pub fn to_csv<W: Write>(&self, writer: W) -> Result<(), MacawError> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        for row in &self.rows {
            csv_writer.serialize(CsvRow {
                reaction_id: &row.reaction_id,
                reaction_equation: &row.reaction_equation,
                dead_end_test: row.dead_end.to_string(),
                dilution_test: row.dilution.to_string(),
                diphosphate_test: row.diphosphate.to_string(),
                duplicate_test_exact: row.duplicate_exact.to_string(),
                duplicate_test_directions: row.duplicate_directions.to_string(),
                duplicate_test_coefficients: row.duplicate_coefficients.to_string(),
                duplicate_test_redox: row.duplicate_redox.to_string(),
                loop_test: row.loop_verdict.to_string(),
                pathway: row.pathway,
            })?;
        }
        csv_writer.flush().map_err(csv::Error::from)?;
        Ok(())
    }

    /// Write the table to a CSV file
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<(), MacawError> {
        let file = std::fs::File::create(path).map_err(csv::Error::from)?;
        self.to_csv(file)
    }
}

/// Run the five checks in dependency order and synthesize the pathways
///
/// The dead-end test goes first because the dilution test consumes its
/// verdicts; the other checks are independent of each other. Returns the
/// joined results table and the union of every emitted edge list.
pub fn run_all_tests(
    model: &Model,
    config: &TestConfig,
) -> Result<(ResultsTable, EdgeSet), MacawError> {
    model.validate()?;
    let dead_ends = dead_end_test(model, config);
    let duplicates = duplicate_test(model, config);
    let diphosphate = diphosphate_test(model, config);
    let dilution = dilution_test(model, Some(&dead_ends), config)?;
    let loops = loop_test(model, config)?;

    let mut edges = EdgeSet::new();
    edges.extend(dead_ends.edges.iter().cloned());
    edges.extend(dilution.edges.iter().cloned());
    edges.extend(duplicates.edges.iter().cloned());
    edges.extend(loops.edges.iter().cloned());
    let pathways: IndexMap<String, u32> = form_pathways(&edges);

    let rows = model
        .reactions
        .values()
        .map(|reaction| ReactionResult {
            reaction_id: reaction.id.clone(),
            reaction_equation: reaction_equation(
                reaction,
                model,
                config.use_names,
                config.add_suffixes,
            ),
            dead_end: dead_ends.verdicts[&reaction.id].clone(),
            dilution: dilution.verdicts[&reaction.id].clone(),
            diphosphate: diphosphate[&reaction.id].clone(),
            duplicate_exact: duplicates.exact[&reaction.id].clone(),
            duplicate_directions: duplicates.directions[&reaction.id].clone(),
            duplicate_coefficients: duplicates.coefficients[&reaction.id].clone(),
            duplicate_redox: duplicates.redox[&reaction.id].clone(),
            loop_verdict: loops.verdicts[&reaction.id].clone(),
            pathway: pathways.get(&reaction.id).copied().unwrap_or(0),
        })
        .collect();
    if config.verbose > 0 {
        info!(
            "all tests finished: {} reactions, {} edges, {} pathways",
            model.reactions.len(),
            edges.len(),
            pathways.values().collect::<std::collections::HashSet<_>>().len()
        );
    }
    Ok((ResultsTable { rows }, edges))
}
