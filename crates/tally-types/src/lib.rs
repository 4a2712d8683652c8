//! # tally-types
//!
//! Shared domain types for the Tally vault accounting engine.
//!
//! Every persisted or exchanged structure lives here so the oracle, vault,
//! database and host crates agree on one definition.
//!
//! ## Modules
//!
//! - [`price`] — Feed readings, observations, oracle configuration
//! - [`vault`] — Vault totals and snapshot forms
//! - [`events`] — Events emitted by vault operations
//! - [`codec`] — Serde adapters for wide integers and account ids

pub mod codec;
pub mod events;
pub mod price;
pub mod vault;

pub use ethnum::U256;

/// Identifier of a share owner, receiver or privileged caller.
pub type AccountId = [u8; 32];

/// Fixed-point scale used for every price inside the engine.
pub const CANONICAL_DECIMALS: u8 = 18;

/// `10^CANONICAL_DECIMALS`.
pub const PRICE_SCALE: u128 = 1_000_000_000_000_000_000;

/// Basis-point denominator (100%).
pub const BPS_DENOMINATOR: u128 = 10_000;

/// Default number of slots in the TWAP ring buffer.
pub const DEFAULT_TWAP_CAPACITY: usize = 24;

/// Default staleness ceiling for a feed reading, in seconds (1 hour).
pub const DEFAULT_MAX_STALENESS_SECS: u64 = 3600;

/// Default maximum deviation between consecutive accepted prices (10%).
pub const DEFAULT_MAX_DEVIATION_BPS: u32 = 1_000;

/// Build an [`AccountId`] from a short human label (test and simulation
/// helper). Labels longer than 32 bytes are truncated.
pub fn account_from_label(label: &str) -> AccountId {
    let mut id = [0u8; 32];
    let bytes = label.as_bytes();
    let len = bytes.len().min(32);
    id[..len].copy_from_slice(&bytes[..len]);
    id
}
