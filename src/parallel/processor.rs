//! Main parallel processor
//!
//! Contains the ParallelProcessor struct that wires the stages together and
//! watches them until the merger is done.

use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, select, tick, Receiver};
use log::debug;
use std::io::{Read, Write};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::stages::{aggregator_stage, merger_thread, parser_stage, source_thread};
use super::types::{ParallelConfig, PipelineState, StateCell};
use crate::error::ConntopError;
use crate::matcher::AddressMatcher;
use crate::record::{RecordBatch, RecordSchema};
use crate::report::ReportOptions;
use crate::source::{RawChunk, SourceStream};
use crate::stats::{PipelineStats, StatsSnapshot};
use crate::tally::{GlobalTally, PartialTally};

/// Runs one input through the four-stage pipeline. Not restartable.
pub struct ParallelProcessor {
    config: ParallelConfig,
    stats: Arc<PipelineStats>,
    state: Arc<StateCell>,
}

impl ParallelProcessor {
    pub fn new(config: ParallelConfig) -> Self {
        Self {
            config,
            stats: Arc::new(PipelineStats::new()),
            state: Arc::new(StateCell::default()),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state.get()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Run every stage to completion and return the merged tally.
    ///
    /// Progress lines, when enabled, go to `progress`. On error the pipeline is
    /// left `Failed`; on success it is `Draining` until [`report`](Self::report).
    pub fn process<R, P>(
        &self,
        reader: R,
        schema: RecordSchema,
        matcher: AddressMatcher,
        progress: P,
    ) -> Result<GlobalTally>
    where
        R: Read + Send + 'static,
        P: Write,
    {
        self.config.validate()?;
        if !self
            .state
            .transition(PipelineState::Idle, PipelineState::Running)
        {
            return Err(anyhow!(
                "pipeline cannot be restarted (state {:?})",
                self.state.get()
            ));
        }

        let result = self.run_stages(reader, schema, matcher, progress);
        if result.is_err() {
            self.state.fail();
        }
        result
    }

    /// Write the report for a processed tally and mark the pipeline done.
    pub fn report<W: Write>(
        &self,
        tally: &GlobalTally,
        options: &ReportOptions,
        out: W,
    ) -> Result<usize> {
        if self.state.get() != PipelineState::Draining {
            return Err(anyhow!(
                "no report for a pipeline in state {:?}",
                self.state.get()
            ));
        }
        let written = crate::report::write_report(out, tally, options)?;
        self.state
            .transition(PipelineState::Draining, PipelineState::Done);
        Ok(written)
    }

    fn run_stages<R, P>(
        &self,
        reader: R,
        schema: RecordSchema,
        matcher: AddressMatcher,
        progress: P,
    ) -> Result<GlobalTally>
    where
        R: Read + Send + 'static,
        P: Write,
    {
        let capacity = self.config.queue_capacity;
        let (chunk_sender, chunk_receiver) = bounded::<RawChunk>(capacity);
        let (batch_sender, batch_receiver) = bounded::<RecordBatch>(capacity);
        let (tally_sender, tally_receiver) = bounded::<PartialTally>(capacity);
        let (done_sender, done_receiver) = bounded::<()>(0);

        let source_handle = {
            let stream = SourceStream::new(reader, self.config.block_size);
            let stats = Arc::clone(&self.stats);
            let state = Arc::clone(&self.state);
            spawn_stage("source", &self.state, move || {
                source_thread(stream, chunk_sender, stats, state)
            })?
        };

        let parser_handle = {
            let pool_size = self.config.parser_pool_size;
            let stats = Arc::clone(&self.stats);
            let state = Arc::clone(&self.state);
            spawn_stage("parser", &self.state, move || {
                parser_stage(chunk_receiver, batch_sender, schema, pool_size, stats, state)
            })?
        };

        let reducer_handle = {
            let pool_size = self.config.aggregator_pool_size;
            let stats = Arc::clone(&self.stats);
            let state = Arc::clone(&self.state);
            spawn_stage("reducer", &self.state, move || {
                aggregator_stage(batch_receiver, tally_sender, matcher, pool_size, stats, state)
            })?
        };

        let merger_handle = {
            let stats = Arc::clone(&self.stats);
            spawn_stage("merger", &self.state, move || {
                merger_thread(tally_receiver, stats, done_sender)
            })?
        };

        self.monitor(&done_receiver, progress);

        // Wait for all threads to complete
        let outcomes = [
            join_stage("source", source_handle),
            join_stage("parser", parser_handle),
            join_stage("reducer", reducer_handle),
        ];
        let merged = join_stage("merger", merger_handle);

        let mut errors: Vec<anyhow::Error> = outcomes.into_iter().filter_map(Result::err).collect();
        let tally = match merged {
            Ok(tally) => Some(tally),
            Err(e) => {
                errors.push(e);
                None
            }
        };

        if let Some(root) = root_cause(errors) {
            return Err(root);
        }
        tally.ok_or_else(|| anyhow!("merger produced no result"))
    }

    /// Block until the merger drops its done signal, printing progress on each tick.
    fn monitor<P: Write>(&self, done: &Receiver<()>, mut progress: P) {
        let Some(interval) = self.config.progress_interval else {
            let _ = done.recv();
            return;
        };

        let ticker = tick(interval);
        loop {
            select! {
                recv(done) -> _ => break,
                recv(ticker) -> _ => {
                    let line = self.stats.snapshot().format_progress();
                    let _ = write!(progress, "\r{:>70}", line);
                    let _ = progress.flush();
                }
            }
        }
        let _ = writeln!(progress, "\r{:>70}", self.stats.snapshot().format_progress());
    }
}

fn spawn_stage<T, F>(name: &'static str, state: &Arc<StateCell>, body: F) -> Result<JoinHandle<Result<T>>>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let state = Arc::clone(state);
    let handle = thread::Builder::new()
        .name(format!("conntop-{}", name))
        .spawn(move || {
            debug!("{} stage started", name);
            let result = body();
            match &result {
                Ok(_) => debug!("{} stage finished", name),
                Err(e) => {
                    debug!("{} stage failed: {:#}", name, e);
                    state.fail();
                }
            }
            result
        })?;
    Ok(handle)
}

fn join_stage<T>(name: &'static str, handle: JoinHandle<Result<T>>) -> Result<T> {
    handle
        .join()
        .unwrap_or_else(|_| Err(ConntopError::StagePanicked { stage: name }.into()))
}

/// A disconnected queue is a symptom; prefer the error that caused it.
fn root_cause(errors: Vec<anyhow::Error>) -> Option<anyhow::Error> {
    let is_symptom = |e: &anyhow::Error| {
        matches!(
            e.downcast_ref::<ConntopError>(),
            Some(ConntopError::StageDisconnected { .. })
        )
    };
    let mut symptoms = Vec::new();
    for error in errors {
        if is_symptom(&error) {
            symptoms.push(error);
        } else {
            return Some(error);
        }
    }
    symptoms.into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor};

    fn conn_line(origin: &str, responder: &str, orig_bytes: u64, resp_bytes: u64) -> String {
        let mut fields = vec!["-".to_string(); 21];
        fields[2] = origin.to_string();
        fields[4] = responder.to_string();
        fields[16] = orig_bytes.to_string();
        fields[18] = resp_bytes.to_string();
        fields.join("\t")
    }

    fn small_config() -> ParallelConfig {
        ParallelConfig {
            block_size: 7,
            parser_pool_size: 3,
            aggregator_pool_size: 2,
            queue_capacity: 4,
            progress_interval: None,
        }
    }

    struct BrokenReader;

    impl Read for BrokenReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "disk on fire"))
        }
    }

    #[test]
    fn test_process_sums_matching_hosts() {
        let input = [
            "#fields\tts\tuid".to_string(),
            conn_line("a", "b", 100, 50),
            conn_line("a", "b", 30, 20),
        ]
        .join("\n");

        let processor = ParallelProcessor::new(small_config());
        let tally = processor
            .process(
                Cursor::new(input.into_bytes()),
                RecordSchema::default(),
                AddressMatcher::parse(&["a"]).unwrap(),
                io::sink(),
            )
            .unwrap();

        assert_eq!(tally.get("a"), Some(200));
        assert_eq!(tally.get("b"), None);
        assert_eq!(processor.state(), PipelineState::Draining);

        let stats = processor.stats();
        assert_eq!(stats.lines_read, 3);
        assert_eq!(stats.records_parsed, 2);
        assert_eq!(stats.lines_skipped, 1);
        assert_eq!(stats.tallies_merged, 3);
    }

    #[test]
    fn test_report_marks_pipeline_done() {
        let processor = ParallelProcessor::new(small_config());
        let tally = processor
            .process(
                Cursor::new(conn_line("10.0.0.1", "1.1.1.1", 5, 5).into_bytes()),
                RecordSchema::default(),
                AddressMatcher::parse(&["10.0.0.0/8"]).unwrap(),
                io::sink(),
            )
            .unwrap();

        let mut out = Vec::new();
        let written = processor
            .report(&tally, &ReportOptions::default(), &mut out)
            .unwrap();
        assert_eq!(written, 1);
        assert_eq!(processor.state(), PipelineState::Done);
        assert!(String::from_utf8(out).unwrap().contains("10.0.0.1 100.0000%"));
    }

    #[test]
    fn test_read_failure_fails_pipeline_without_report() {
        let processor = ParallelProcessor::new(small_config());
        let result = processor.process(
            BrokenReader,
            RecordSchema::default(),
            AddressMatcher::parse(&["a"]).unwrap(),
            io::sink(),
        );

        let err = result.unwrap_err();
        assert!(format!("{:#}", err).contains("disk on fire"));
        assert_eq!(processor.state(), PipelineState::Failed);

        let mut out = Vec::new();
        assert!(processor
            .report(&GlobalTally::new(), &ReportOptions::default(), &mut out)
            .is_err());
        assert!(out.is_empty());
    }

    #[test]
    fn test_processor_cannot_restart() {
        let processor = ParallelProcessor::new(small_config());
        let matcher = AddressMatcher::parse(&["a"]).unwrap();
        processor
            .process(Cursor::new(Vec::new()), RecordSchema::default(), matcher.clone(), io::sink())
            .unwrap();
        assert!(processor
            .process(Cursor::new(Vec::new()), RecordSchema::default(), matcher, io::sink())
            .is_err());
    }

    #[test]
    fn test_many_lines_with_tiny_queues() {
        let mut input = String::new();
        for i in 0..2000u64 {
            input.push_str(&conn_line(&format!("10.0.{}.{}", i % 3, i % 7), "8.8.8.8", i, 1));
            input.push('\n');
        }

        let processor = ParallelProcessor::new(ParallelConfig {
            queue_capacity: 1,
            ..small_config()
        });
        let tally = processor
            .process(
                Cursor::new(input.into_bytes()),
                RecordSchema::default(),
                AddressMatcher::parse(&["10.0."]).unwrap(),
                io::sink(),
            )
            .unwrap();

        let expected: i64 = (0..2000i64).map(|i| i + 1).sum();
        assert_eq!(tally.grand_total(), expected);
        assert_eq!(tally.len(), 21);
    }

    #[test]
    fn test_progress_line_is_written() {
        let processor = ParallelProcessor::new(ParallelConfig {
            progress_interval: Some(std::time::Duration::from_millis(1)),
            ..small_config()
        });
        let mut progress = Vec::new();
        processor
            .process(
                Cursor::new(conn_line("a", "b", 1, 1).into_bytes()),
                RecordSchema::default(),
                AddressMatcher::parse(&["a"]).unwrap(),
                &mut progress,
            )
            .unwrap();

        let text = String::from_utf8(progress).unwrap();
        assert!(text.contains("Merger -> (1 done)"));
        assert!(text.ends_with('\n'));
    }
}
