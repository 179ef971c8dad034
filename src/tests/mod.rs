//! Integration and unit tests for the Wurzelwerk scan engine.
//!
//! ## Test Modules
//!
//! - **scanner_tests**: Directory walking, hardlink dedup, symlink handling
//! - **store_tests**: Persistent store, aggregation, subtree views
//! - **controller_tests**: Session state machine and event stream
//! - **exclude_tests**: Exclusion prefixes, signatures, glob patterns
//! - **refresh_tests**: Backoff trigger cadence
//! - **config_tests**: Configuration loading and validation
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test
//! ```

pub mod config_tests;
pub mod exclude_tests;
pub mod scanner_tests;
