//! # Wurzelwerk Scan Engine
//!
//! Core library of Wurzelwerk, a disk-usage scanning and size-aggregation
//! engine. It walks directory trees asynchronously, deduplicates hardlinks,
//! and lands the discovered nodes either in an in-memory tree or in a
//! persistent SQLite store that serves bounded subtree views.
//!
//! ## Architecture
//!
//! The engine is built using:
//! - **Tokio**: Async runtime hosting the walk and the session actor
//! - **SQLx**: Asynchronous database operations with SQLite
//! - **Serde**: Serialization of events and tree snapshots
//! - **Tracing**: Structured logging throughout
//!
//! ## Core Components
//!
//! - [`config`]: Engine configuration management
//! - [`controller`]: The scan session state machine
//! - [`db`]: SQLite pool setup and pragmas
//! - [`error`]: Centralized error handling
//! - [`exclude`]: Path exclusion rules (prefixes, cloud-sync folders, globs)
//! - [`metrics`]: Process-lifetime counters
//! - [`refresh`]: Exponential-backoff preview trigger
//! - [`scanner`]: The directory walker and its storage sink trait
//! - [`session`]: Message-passing session actor
//! - [`store`]: Persistent node store, size aggregation, subtree views
//! - [`types`]: Events, stats, and tree types

pub mod config;
pub mod controller;
pub mod db;
pub mod error;
pub mod exclude;
pub mod metrics;
pub mod refresh;
pub mod scanner;
pub mod session;
pub mod store;
pub mod types;

#[cfg(test)]
mod tests;
