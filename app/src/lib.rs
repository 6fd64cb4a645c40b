// ==============================================================================
// lib.rs - Cluster Processor Library
// ==============================================================================
// Description: Library interface for the sketch cluster assignment pipeline
// Author: Matt Barham
// Created: 2026-10-17
// Modified: 2026-10-17
// Version: 1.0.0
// ==============================================================================

pub mod cache;
pub mod engine;
pub mod error;
pub mod job_processor;
pub mod models;
pub mod network;
pub mod parsers;
pub mod pipeline;
pub mod pruner;
pub mod queue;
pub mod registry;
pub mod rehydrate;
pub mod sketch;
pub mod store;

pub use error::{ClusterError, Result};

/// Processor crate version, reported by the services
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
