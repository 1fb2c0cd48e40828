//! Stage bodies run by the processor
//!
//! source -> parser pool -> aggregator pool -> merger, each on its own thread.

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender};
use log::debug;
use std::io::Read;
use std::sync::Arc;

use super::pool::StagePool;
use super::types::{PipelineState, StateCell};
use crate::error::ConntopError;
use crate::matcher::AddressMatcher;
use crate::record::{RecordBatch, RecordSchema};
use crate::source::{RawChunk, SourceStream};
use crate::stats::PipelineStats;
use crate::tally::{GlobalTally, PartialTally};

/// Read the input and push one chunk per line; closes `output` on return.
pub(crate) fn source_thread<R: Read>(
    mut stream: SourceStream<R>,
    output: Sender<RawChunk>,
    stats: Arc<PipelineStats>,
    state: Arc<StateCell>,
) -> Result<()> {
    for chunk in stream.by_ref() {
        let chunk = chunk.context("Failed to read input")?;
        if state.is_failed() {
            debug!("source stopping: pipeline failed");
            return Ok(());
        }
        stats.add_line_read();
        output
            .send(chunk)
            .map_err(|_| ConntopError::StageDisconnected { stage: "source" })?;
    }

    stats.set_bytes_read(stream.bytes_read());
    if state.transition(PipelineState::Running, PipelineState::Draining) {
        debug!(
            "source finished after {} bytes, pipeline draining",
            stream.bytes_read()
        );
    }
    Ok(())
}

/// Parse each chunk on a bounded pool; closes `output` once the pool drains.
pub(crate) fn parser_stage(
    input: Receiver<RawChunk>,
    output: Sender<RecordBatch>,
    schema: RecordSchema,
    pool_size: usize,
    stats: Arc<PipelineStats>,
    state: Arc<StateCell>,
) -> Result<()> {
    let handler = move |chunk: RawChunk| {
        let batch = schema.parse_chunk(&chunk);
        stats.add_chunk_parsed(batch.len(), batch.skipped);
        batch
    };
    let pool = StagePool::spawn("parser", pool_size, output, handler)?;
    let dispatched = dispatch("parser", &input, &pool, &state);
    drop(input);
    settle(dispatched, pool.finish())
}

/// Fold each batch into a partial tally on a bounded pool.
pub(crate) fn aggregator_stage(
    input: Receiver<RecordBatch>,
    output: Sender<PartialTally>,
    matcher: AddressMatcher,
    pool_size: usize,
    stats: Arc<PipelineStats>,
    state: Arc<StateCell>,
) -> Result<()> {
    let handler = move |batch: RecordBatch| {
        let tally = PartialTally::fold(&batch, &matcher);
        stats.add_batch_folded();
        tally
    };
    let pool = StagePool::spawn("reducer", pool_size, output, handler)?;
    let dispatched = dispatch("reducer", &input, &pool, &state);
    drop(input);
    settle(dispatched, pool.finish())
}

/// Sequentially fold every partial tally into the global tally.
///
/// `_done` is dropped on return, which tells the driver the merge is over.
pub(crate) fn merger_thread(
    input: Receiver<PartialTally>,
    stats: Arc<PipelineStats>,
    _done: Sender<()>,
) -> Result<GlobalTally> {
    let mut global = GlobalTally::new();
    for partial in input.iter() {
        global.merge(partial);
        stats.add_tally_merged();
    }
    debug!(
        "merger folded {} partial tallies into {} keys",
        global.partials_merged(),
        global.len()
    );
    Ok(global)
}

fn dispatch<I: Send + 'static>(
    stage: &'static str,
    input: &Receiver<I>,
    pool: &StagePool<I>,
    state: &StateCell,
) -> Result<()> {
    for item in input.iter() {
        if state.is_failed() {
            debug!("{} stopping: pipeline failed", stage);
            return Ok(());
        }
        pool.submit(item)?;
    }
    debug!("{} input closed, waiting for {} outstanding tasks", stage, pool.outstanding());
    Ok(())
}

/// A worker's own error explains a failed submission better than the submission does.
fn settle(dispatched: Result<()>, finished: Result<()>) -> Result<()> {
    match (dispatched, finished) {
        (_, Err(e)) => Err(e),
        (dispatched, Ok(())) => dispatched,
    }
}
