//! Asynchronous chart-analysis job pipeline.
//!
//! A submitted job (tabular data plus an analysis goal) is admitted per owner,
//! stored as `pending`, and executed through one of three paths: inline on the
//! caller, on a bounded worker pool, or through a durable queue drained by
//! [`consumer::JobConsumer`]. Every path moves the job with compare-and-set
//! transitions, so a job leaves `pending` at most once.

pub mod admission;
pub mod broker;
pub mod config;
pub mod consumer;
pub mod dispatch;
pub mod error;
pub mod job;
pub mod llm;
pub mod prompt;
pub mod segmenter;
pub mod service;
pub mod stats;
pub mod telemetry;

#[cfg(test)]
mod testing;

pub use error::PipelineError;
pub use service::JobService;
