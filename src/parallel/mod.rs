//! Parallel pipeline for conntop
//!
//! Four stages connected by bounded queues: the source thread frames lines,
//! a parser pool turns lines into record batches, a reducer pool folds batches
//! into partial tallies, and a single merger sums them.
//!
//! # Module Structure
//!
//! - `types`: Pool configuration and pipeline lifecycle state
//! - `limiter`: Counting limiter with RAII permits
//! - `pool`: Fixed worker pool whose `finish` is the stage drain
//! - `stages`: Thread bodies for each stage
//! - `processor`: Main ParallelProcessor orchestration

mod limiter;
mod pool;
mod processor;
mod stages;
mod types;

// Re-export public types
pub use limiter::{Permit, TaskLimiter};
pub use pool::StagePool;
pub use processor::ParallelProcessor;
pub use types::{
    ParallelConfig, PipelineState, StateCell, DEFAULT_AGGREGATOR_POOL_SIZE,
    DEFAULT_PARSER_POOL_SIZE, DEFAULT_QUEUE_CAPACITY,
};
