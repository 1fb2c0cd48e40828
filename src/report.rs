//! Final ranked report
//!
//! Text output keeps the classic `key percentage%` layout; JSON output is a
//! single document for scripting.

use anyhow::{Context, Result};
use clap::ValueEnum;
use log::warn;
use serde::Serialize;
use std::io::Write;

use crate::tally::{GlobalTally, ReportEntry};

pub const DEFAULT_TOP_N: usize = 10;

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportOptions {
    pub format: ReportFormat,
    pub top_n: usize,
    /// Append the raw byte total to each text line.
    pub show_totals: bool,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            format: ReportFormat::Text,
            top_n: DEFAULT_TOP_N,
            show_totals: false,
        }
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    grand_total: i64,
    entries: &'a [ReportEntry],
}

/// Write the top entries of `tally` and return how many were written.
pub fn write_report<W: Write>(
    mut out: W,
    tally: &GlobalTally,
    options: &ReportOptions,
) -> Result<usize> {
    if tally.is_empty() {
        warn!("no matching records");
    }

    let entries = tally.ranked(options.top_n);
    match options.format {
        ReportFormat::Text => {
            for entry in &entries {
                writeln!(out, "{}", format_text_line(entry, options.show_totals))
                    .context("Failed to write report")?;
            }
        }
        ReportFormat::Json => {
            let report = JsonReport {
                grand_total: tally.grand_total(),
                entries: &entries,
            };
            serde_json::to_writer(&mut out, &report).context("Failed to write report")?;
            writeln!(out).context("Failed to write report")?;
        }
    }
    out.flush().context("Failed to flush report")?;

    Ok(entries.len())
}

pub fn format_text_line(entry: &ReportEntry, show_totals: bool) -> String {
    if show_totals {
        format!("{:>15} {:.4}% {}", entry.key, entry.percent, entry.total)
    } else {
        format!("{:>15} {:.4}%", entry.key, entry.percent)
    }
}
