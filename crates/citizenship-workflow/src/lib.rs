//! Citizenship application workflow: the lifecycle state machine, its transition rules,
//! and the transactional engine that moves applications through the approval pipeline.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
