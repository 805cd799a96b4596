// ========================================================================================
//
//                               The run orchestrator: t1dgrs
//
// ========================================================================================
//
// Owns the lifecycle of a scoring run: validate inputs, load the configuration and
// every reference table, hand the pipeline a PLINK-backed port, then write results.
// Outputs are written only once every stage has succeeded.

use crate::score::config::GrsConfig;
use crate::score::output::{self, OutputPaths};
use crate::score::pipeline::{self, MetricsInputs, PipelineError, PipelineInputs};
use crate::score::plink::PlinkRunner;
use crate::score::tables;
use crate::shared::files::validate_plink_fileset;
use itertools::Itertools;
use log::info;
use std::fs;
use std::path::Path;
use std::time::Instant;

const ALL_VARIANTS_LABEL: &str = "all";
const DQ_VARIANTS_LABEL: &str = "dq";

/// Loads every table named by the configuration.
pub fn load_inputs(config: &GrsConfig) -> Result<PipelineInputs, PipelineError> {
    info!("Loading reference tables");
    let mapping = tables::load_mapping_table(&config.input.hla_map)?;
    let ranks = tables::load_rank_table(&config.input.dq_rank)?;
    let interactions = tables::load_interaction_weights(&config.scores.interaction)?;
    let all_variants =
        tables::load_linear_weights(ALL_VARIANTS_LABEL, &config.scores.all_variants)?;
    let dq_variants = config
        .scores
        .hla_variants
        .as_deref()
        .map(|path| tables::load_linear_weights(DQ_VARIANTS_LABEL, path))
        .transpose()?;
    let metrics = match &config.metrics {
        Some(m) => Some(MetricsInputs {
            curve: tables::load_reference_curve(&m.centiles_file)?,
            fit: tables::load_logistic_fit(&m.params_file)?,
        }),
        None => None,
    };
    Ok(PipelineInputs {
        mapping,
        ranks,
        interactions,
        all_variants,
        dq_variants,
        metrics,
    })
}

/// Scores every individual in `bfile` and writes the three result files under `output_prefix`.
pub fn run_grs_with_args(
    bfile: &Path,
    config_path: &Path,
    output_prefix: &Path,
) -> Result<OutputPaths, PipelineError> {
    let overall_start = Instant::now();
    let bfile = validate_plink_fileset(bfile)?;
    let config = GrsConfig::load(config_path)?;
    let inputs = load_inputs(&config)?;
    let with_dq = inputs.dq_variants.is_some();

    if let Some(parent) = output_prefix.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let results = {
        let runner = PlinkRunner::new(&config.plink, &bfile, output_prefix)?;
        pipeline::run(&runner, inputs)?
    };
    info!("{} individuals scored", results.scores.join.scored);

    let paths = output::write_all(output_prefix, &results, with_dq)?;
    info!(
        "Success! Total execution time: {:.2?}",
        overall_start.elapsed()
    );
    Ok(paths)
}

/// Every distinct variant ID the configuration will score, sorted.
pub fn list_variants(config_path: &Path) -> Result<Vec<String>, PipelineError> {
    let config = GrsConfig::load(config_path)?;
    let mapping = tables::load_mapping_table(&config.input.hla_map)?;
    let mut weight_files = vec![tables::load_linear_weights(
        ALL_VARIANTS_LABEL,
        &config.scores.all_variants,
    )?];
    if let Some(path) = &config.scores.hla_variants {
        weight_files.push(tables::load_linear_weights(DQ_VARIANTS_LABEL, path)?);
    }

    Ok(mapping
        .rows
        .into_iter()
        .map(|entry| entry.variant_id)
        .chain(weight_files.into_iter().flat_map(|w| w.variant_ids))
        .sorted()
        .dedup()
        .collect())
}
