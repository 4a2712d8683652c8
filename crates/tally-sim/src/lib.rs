//! # tally-sim
//!
//! Simulation host for the vault engine: loads a TOML scenario, wires the
//! engine to scheduled price feeds and in-memory collaborators, replays
//! the steps under one lock, and persists every step to SQLite.
//!
//! ## Modules
//!
//! - [`config`] — Configuration file and scenario steps
//! - [`feed`] — Scheduled price source
//! - [`host`] — Vault construction, shared handle, persistence sinks
//! - [`scenario`] — Step replay and summary

pub mod config;
pub mod feed;
pub mod host;
pub mod scenario;
