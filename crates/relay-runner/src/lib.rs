//! `relay-runner` — wires the source pager, store and dispatcher into a
//! single ingestion pass. The `relay` binary is a thin CLI over [`Pipeline`].

pub mod pipeline;

pub use pipeline::{Pipeline, PipelineError, RunSummary};
