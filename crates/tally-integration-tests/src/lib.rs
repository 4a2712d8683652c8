//! Integration test crate for the Tally vault engine.
//!
//! This crate has no library code. It only contains integration tests
//! that drive the oracle, vault, database and simulation crates together.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p tally-integration-tests
//! ```
