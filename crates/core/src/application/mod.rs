// Application Layer - Use Cases and Orchestration

pub mod counters;
pub mod filters;
pub mod pipeline;

// Re-exports
pub use counters::ChannelCounters;
pub use filters::{BlacklistEntry, JobFilter};
pub use pipeline::{IngestReport, Pipeline, PipelineConfig, RunReport};
