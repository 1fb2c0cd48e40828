//! Pipeline execution module
//!
//! Opens the input, runs the parallel pipeline and writes the report.

use anyhow::{Context, Result};
use log::{debug, info};
use std::io::{self, Write};

use crate::config::ConntopConfig;
use crate::decompression;
use crate::parallel::ParallelProcessor;
use crate::stats::StatsSnapshot;

/// Result of one run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub stats: StatsSnapshot,
    /// Distinct matched hosts in the global tally.
    pub matched_keys: usize,
    pub grand_total: i64,
    /// Report lines (text) or entries (json) written.
    pub entries_written: usize,
}

/// Run the whole pipeline for `config`, writing the report to `output`.
///
/// Progress lines, when enabled, go to stderr.
pub fn run_with_config<W: Write>(config: &ConntopConfig, output: W) -> Result<RunSummary> {
    run_with_progress(config, output, io::stderr())
}

pub fn run_with_progress<W: Write, P: Write>(
    config: &ConntopConfig,
    output: W,
    progress: P,
) -> Result<RunSummary> {
    config.validate()?;

    let reader = decompression::open_input(&config.input.path, config.input.decompressor.as_deref())
        .with_context(|| format!("Failed to open input: {}", config.input.path))?;
    debug!(
        "processing {} with {} parsers, {} reducers, queue capacity {}",
        config.input.path,
        config.performance.parser_pool_size,
        config.performance.aggregator_pool_size,
        config.performance.queue_capacity
    );

    let processor = ParallelProcessor::new(config.performance.clone());
    let tally = processor.process(
        reader,
        config.processing.schema.clone(),
        config.processing.matcher.clone(),
        progress,
    )?;
    let entries_written = processor.report(&tally, &config.output.report, output)?;

    let stats = processor.stats();
    info!(
        "{} lines, {} records, {} matched hosts",
        stats.lines_read,
        stats.records_parsed,
        tally.len()
    );

    Ok(RunSummary {
        stats,
        matched_keys: tally.len(),
        grand_total: tally.grand_total(),
        entries_written,
    })
}
