// Core library for the conntop connection-log ranker

pub mod cli;
pub mod config;
pub mod config_file;
pub mod decompression;
pub mod error;
pub mod matcher;
pub mod parallel;
pub mod platform;
pub mod record;
pub mod report;
pub mod runner;
pub mod source;
pub mod stats;
pub mod tally;

pub use cli::Cli;
pub use config::ConntopConfig;
pub use error::ConntopError;
pub use matcher::AddressMatcher;
pub use parallel::{ParallelConfig, ParallelProcessor, PipelineState};
pub use record::{ConnectionRecord, RecordBatch, RecordSchema};
pub use report::{ReportFormat, ReportOptions};
pub use runner::{run_with_config, RunSummary};
pub use tally::{GlobalTally, PartialTally, ReportEntry};
