//! Connection record extraction from delimited log lines.
//!
//! Field positions are configurable. The defaults follow the Zeek `conn.log`
//! layout: `id.orig_h` (2), `id.resp_h` (4), `orig_ip_bytes` (16) and
//! `resp_ip_bytes` (18).

use log::trace;

use crate::error::ConntopError;
use crate::source::RawChunk;

pub const DEFAULT_ORIGIN_FIELD: usize = 2;
pub const DEFAULT_RESPONDER_FIELD: usize = 4;
pub const DEFAULT_BYTES_FIELDS: [usize; 2] = [16, 18];

/// One connection with the byte fields already summed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRecord {
    pub origin: String,
    pub responder: String,
    pub byte_count: u64,
}

/// Records parsed from one chunk, plus how many of its lines were skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordBatch {
    pub records: Vec<ConnectionRecord>,
    pub skipped: usize,
}

impl RecordBatch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Where the interesting fields live in a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSchema {
    pub delimiter: char,
    pub comment_marker: String,
    pub origin_field: usize,
    pub responder_field: usize,
    pub bytes_fields: Vec<usize>,
}

impl Default for RecordSchema {
    fn default() -> Self {
        Self {
            delimiter: '\t',
            comment_marker: "#".to_string(),
            origin_field: DEFAULT_ORIGIN_FIELD,
            responder_field: DEFAULT_RESPONDER_FIELD,
            bytes_fields: DEFAULT_BYTES_FIELDS.to_vec(),
        }
    }
}

impl RecordSchema {
    pub fn validate(&self) -> Result<(), ConntopError> {
        if self.bytes_fields.is_empty() {
            return Err(ConntopError::config("at least one bytes field is required"));
        }
        let mut positions = self.bytes_fields.clone();
        positions.sort_unstable();
        if let Some(pair) = positions.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(ConntopError::config(format!(
                "bytes field {} is listed more than once",
                pair[0]
            )));
        }
        if self.origin_field == self.responder_field {
            return Err(ConntopError::config(format!(
                "origin and responder fields must differ (both are {})",
                self.origin_field
            )));
        }
        Ok(())
    }

    /// Number of fields a line needs before it is considered a record.
    pub fn min_fields(&self) -> usize {
        let highest_bytes = self.bytes_fields.iter().copied().max().unwrap_or(0);
        self.origin_field.max(self.responder_field).max(highest_bytes) + 1
    }

    /// Parse a single line. Comment lines, empty lines and lines with too
    /// few fields yield `None`; unparsable byte fields count as zero.
    pub fn parse_line(&self, line: &str) -> Option<ConnectionRecord> {
        if line.is_empty()
            || (!self.comment_marker.is_empty() && line.starts_with(&self.comment_marker))
        {
            return None;
        }

        let needed = self.min_fields();
        let mut origin = None;
        let mut responder = None;
        let mut byte_count = 0u64;
        let mut seen = 0usize;

        for (idx, field) in line.split(self.delimiter).take(needed).enumerate() {
            seen = idx + 1;
            if idx == self.origin_field {
                origin = Some(field);
            }
            if idx == self.responder_field {
                responder = Some(field);
            }
            if self.bytes_fields.contains(&idx) {
                byte_count = byte_count.saturating_add(parse_byte_field(field));
            }
        }

        if seen < needed {
            return None;
        }

        Some(ConnectionRecord {
            origin: origin?.to_string(),
            responder: responder?.to_string(),
            byte_count,
        })
    }

    /// Parse every line of a chunk into one batch.
    pub fn parse_chunk(&self, chunk: &RawChunk) -> RecordBatch {
        let text = chunk.as_text();
        let mut batch = RecordBatch::default();

        for line in text.split('\n') {
            match self.parse_line(line) {
                Some(record) => batch.records.push(record),
                None => {
                    trace!("skipping line {}: {:?}", chunk.line_no, line);
                    batch.skipped += 1;
                }
            }
        }
        batch
    }
}

fn parse_byte_field(field: &str) -> u64 {
    field.trim().parse::<u64>().unwrap_or(0)
}
