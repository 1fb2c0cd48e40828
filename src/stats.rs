use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Counters shared by every pipeline stage.
///
/// Each counter has a single writing stage; the driver only reads them for the
/// progress line and the final summary.
#[derive(Debug)]
pub struct PipelineStats {
    lines_read: AtomicU64,
    bytes_read: AtomicU64,
    chunks_parsed: AtomicU64,
    records_parsed: AtomicU64,
    lines_skipped: AtomicU64,
    batches_folded: AtomicU64,
    tallies_merged: AtomicU64,
    start_time: Instant,
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStats {
    pub fn new() -> Self {
        Self {
            lines_read: AtomicU64::new(0),
            bytes_read: AtomicU64::new(0),
            chunks_parsed: AtomicU64::new(0),
            records_parsed: AtomicU64::new(0),
            lines_skipped: AtomicU64::new(0),
            batches_folded: AtomicU64::new(0),
            tallies_merged: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn add_line_read(&self) {
        self.lines_read.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_bytes_read(&self, bytes: u64) {
        self.bytes_read.store(bytes, Ordering::Relaxed);
    }

    pub fn add_chunk_parsed(&self, records: usize, skipped: usize) {
        self.records_parsed
            .fetch_add(records as u64, Ordering::Relaxed);
        self.lines_skipped.fetch_add(skipped as u64, Ordering::Relaxed);
        self.chunks_parsed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_batch_folded(&self) {
        self.batches_folded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_tally_merged(&self) {
        self.tallies_merged.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            lines_read: self.lines_read.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            chunks_parsed: self.chunks_parsed.load(Ordering::Relaxed),
            records_parsed: self.records_parsed.load(Ordering::Relaxed),
            lines_skipped: self.lines_skipped.load(Ordering::Relaxed),
            batches_folded: self.batches_folded.load(Ordering::Relaxed),
            tallies_merged: self.tallies_merged.load(Ordering::Relaxed),
            elapsed: self.start_time.elapsed(),
        }
    }
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub lines_read: u64,
    pub bytes_read: u64,
    pub chunks_parsed: u64,
    pub records_parsed: u64,
    pub lines_skipped: u64,
    pub batches_folded: u64,
    pub tallies_merged: u64,
    pub elapsed: Duration,
}

impl StatsSnapshot {
    /// Chunks read but not yet parsed, whether queued or in a parser.
    pub fn raw_queue_depth(&self) -> u64 {
        self.lines_read.saturating_sub(self.chunks_parsed)
    }

    /// Batches parsed but not yet folded, whether queued or in a reducer.
    pub fn batch_queue_depth(&self) -> u64 {
        self.chunks_parsed.saturating_sub(self.batches_folded)
    }

    /// Partial tallies folded but not yet merged, whether queued or in the merger.
    pub fn tally_queue_depth(&self) -> u64 {
        self.batches_folded.saturating_sub(self.tallies_merged)
    }

    pub fn format_progress(&self) -> String {
        format!(
            "Reader -> ({}) -> Parser -> ({}) -> Reducer -> ({}) -> Merger -> ({} done)",
            self.raw_queue_depth(),
            self.batch_queue_depth(),
            self.tally_queue_depth(),
            self.tallies_merged
        )
    }

    pub fn format_stats(&self, matched_keys: usize) -> String {
        let mut output = format!(
            "Lines processed: {} total, {} records, {} skipped",
            self.lines_read, self.records_parsed, self.lines_skipped
        );

        output.push_str(&format!(
            "; {} batches folded, {} matched hosts",
            self.batches_folded, matched_keys
        ));

        let processing_time_ms = self.elapsed.as_millis();
        output.push_str(&format!(" in {}ms", processing_time_ms));

        if processing_time_ms > 0 && self.lines_read > 0 {
            let lines_per_sec = (self.lines_read as f64 * 1000.0) / processing_time_ms as f64;
            output.push_str(&format!(" ({:.0} lines/s)", lines_per_sec));
        }

        output
    }
}
