//! permitflow: a phase-gated licensing application workflow.
//!
//! Applications move through a fixed chain of review phases, each owned
//! by exactly one role. The owning role advances an application one step
//! with a single transactional operation that merges the role's section
//! data, appends documents and a history record, and bumps the version.

pub mod api;
pub mod authorize;
pub mod config;
pub mod db;
pub mod errors;
pub mod events;
pub mod models;
pub mod phases;
pub mod server;
pub mod service;
