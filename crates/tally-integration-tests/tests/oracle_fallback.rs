//! Integration test: oracle tier failover seen through the vault.
//!
//! Walks one vault through every oracle tier:
//! 1. Healthy primary feed gates deposits
//! 2. Staleness boundary: age == max accepted, age == max + 1 rejected
//! 3. Stale primary falls over to the fallback feed
//! 4. A primary jump beyond the deviation limit falls over as well
//! 5. Both feeds down: the last-known-good cache is served degraded,
//!    deposits are refused, exits continue
//! 6. Cache expired: deposits fail with `AllSourcesExhausted`, exits are
//!    valued at the internal ratio
//! 7. An administrator installs a new feed and deposits resume
//!
//! Uses tally-oracle and tally-vault with shared-handle static sources.

use tally_oracle::source::StaticSource;
use tally_oracle::{OracleAggregator, OracleError, PriceTier, TierFailure};
use tally_types::events::{PricePath, VaultEvent};
use tally_types::price::{OracleConfig, RawFeedReading};
use tally_types::{account_from_label, AccountId, PRICE_SCALE};
use tally_vault::memory::{AdminSet, MemoryAssetBook, MemoryShareLedger};
use tally_vault::{VaultAccounting, VaultConfig, VaultError};

type Vault = VaultAccounting<MemoryAssetBook, MemoryShareLedger, AdminSet>;

const T0: u64 = 1_700_000_000;

/// Feed answers carry 8 decimals.
const FEED_UNIT: i128 = 100_000_000;

fn alice() -> AccountId {
    account_from_label("alice")
}

fn admin() -> AccountId {
    account_from_label("admin")
}

fn oracle_config() -> OracleConfig {
    OracleConfig {
        max_staleness_seconds: 600,
        max_deviation_bps: 500,
        min_price: PRICE_SCALE,
        max_price: 100_000 * PRICE_SCALE,
    }
}

/// Vault with a live primary, an offline fallback, and a TWAP window
/// longer than the test so exits never find a covering average.
fn setup() -> (Vault, StaticSource, StaticSource) {
    let primary = StaticSource::new(
        "primary",
        RawFeedReading {
            price: 2_000 * FEED_UNIT,
            updated_at: T0,
            round_id: 1,
            answered_in_round: 1,
            decimals: 8,
        },
    );
    let fallback = StaticSource::offline("fallback");
    let oracle = OracleAggregator::new(
        oracle_config(),
        Box::new(primary.clone()),
        Some(Box::new(fallback.clone())),
    )
    .expect("oracle should build");

    let mut book = MemoryAssetBook::new();
    book.fund(alice(), 1_000_000);
    let vault = VaultAccounting::new(
        VaultConfig {
            twap_window_seconds: 7_200,
            ..VaultConfig::default()
        },
        oracle,
        book,
        MemoryShareLedger::new(),
        AdminSet::new([admin()]),
    );
    (vault, primary, fallback)
}

#[test]
fn vault_survives_every_oracle_tier() {
    let (mut vault, primary, fallback) = setup();

    // =========================================================
    // Step 1: Healthy primary
    // =========================================================
    let receipt = vault
        .deposit(alice(), alice(), 1_000, T0)
        .expect("deposit with healthy primary should succeed");
    assert_eq!(receipt.gate_price.tier, PriceTier::Primary);
    assert_eq!(receipt.gate_price.price, 2_000 * PRICE_SCALE);

    // =========================================================
    // Step 2: Staleness boundary is inclusive
    // =========================================================
    let receipt = vault
        .deposit(alice(), alice(), 100, T0 + 600)
        .expect("reading exactly max_staleness old should be accepted");
    assert_eq!(receipt.gate_price.tier, PriceTier::Primary);

    // =========================================================
    // Step 3: Stale primary falls over to fallback
    // =========================================================
    fallback.publish(2_010 * FEED_UNIT, T0 + 601);
    let receipt = vault
        .deposit(alice(), alice(), 100, T0 + 601)
        .expect("fallback should gate the deposit");
    assert_eq!(receipt.gate_price.tier, PriceTier::Fallback);
    assert_eq!(receipt.gate_price.price, 2_010 * PRICE_SCALE);
    assert_eq!(vault.oracle().last_known_good().price, 2_010 * PRICE_SCALE);

    // =========================================================
    // Step 4: Primary jumps 24% and is rejected on deviation
    // =========================================================
    primary.publish(2_500 * FEED_UNIT, T0 + 700);
    let price = vault.spot_price(T0 + 700).expect("fallback should answer");
    assert_eq!(price.tier, PriceTier::Fallback);
    assert_eq!(price.price, 2_010 * PRICE_SCALE);

    // =========================================================
    // Step 5: Both feeds down, cache served degraded
    // =========================================================
    primary.go_offline();
    fallback.go_offline();
    vault.drain_events();

    let err = vault
        .deposit(alice(), alice(), 100, T0 + 800)
        .expect_err("degraded price must not gate deposits");
    assert!(matches!(err, VaultError::Oracle(OracleError::Degraded { .. })));
    assert!(err.is_transient(), "Degraded means try again later");

    let receipt = vault
        .redeem(alice(), alice(), alice(), 100, T0 + 800)
        .expect("exits stay open on a degraded oracle");
    assert_eq!(
        receipt.path,
        PricePath::Spot {
            price: 2_010 * PRICE_SCALE,
            degraded: true
        }
    );
    assert_eq!(receipt.quote_value, Some(201_000));
    let events = vault.drain_events();
    assert!(
        events
            .iter()
            .any(|e| matches!(e, VaultEvent::PriceDegraded { .. })),
        "Serving the cache must be recorded"
    );

    // Cache observed at T0 + 601 lives until T0 + 601 + 1200.
    let edge = vault
        .spot_price(T0 + 1_801)
        .expect("cache served at exactly twice the staleness ceiling");
    assert!(edge.is_degraded());

    // =========================================================
    // Step 6: Cache expired
    // =========================================================
    let err = vault
        .deposit(alice(), alice(), 100, T0 + 1_802)
        .expect_err("no tier left");
    match &err {
        VaultError::Oracle(OracleError::AllSourcesExhausted { primary, fallback }) => {
            assert!(matches!(primary, TierFailure::Source(_)));
            assert!(matches!(fallback, TierFailure::Source(_)));
        }
        other => panic!("Expected AllSourcesExhausted, got {other:?}"),
    }
    assert!(err.is_transient());

    let receipt = vault
        .redeem(alice(), alice(), alice(), 100, T0 + 1_802)
        .expect("exits never depend on the oracle");
    assert_eq!(receipt.path, PricePath::InternalRatio);
    assert_eq!(receipt.quote_value, None);
    assert_eq!(receipt.assets, 100);

    // =========================================================
    // Step 7: Administrator installs a new feed
    // =========================================================
    let replacement = StaticSource::new(
        "replacement",
        RawFeedReading {
            price: 2_020 * FEED_UNIT,
            updated_at: T0 + 1_900,
            round_id: 7,
            answered_in_round: 7,
            decimals: 8,
        },
    );
    assert_eq!(
        vault.update_price_sources(alice(), Box::new(replacement.clone()), None),
        Err(VaultError::Unauthorized)
    );
    vault
        .update_price_sources(admin(), Box::new(replacement), None)
        .expect("admin may replace sources");
    assert!(!vault.oracle().has_fallback());

    let receipt = vault
        .deposit(alice(), alice(), 100, T0 + 1_900)
        .expect("deposits resume on the new feed");
    assert_eq!(receipt.gate_price.tier, PriceTier::Primary);
    assert_eq!(receipt.gate_price.price, 2_020 * PRICE_SCALE);

    assert_eq!(vault.total_assets(), 1_100);
    assert_eq!(vault.total_shares(), 1_100);
    assert_eq!(vault.assets().vault_balance(), vault.total_assets());
}

#[test]
fn primary_one_second_past_staleness_is_rejected() {
    let (mut vault, _primary, _fallback) = setup();
    vault
        .deposit(alice(), alice(), 1_000, T0)
        .expect("seed deposit should succeed");

    // No fallback answer: the cache is the only tier left.
    let price = vault
        .spot_price(T0 + 601)
        .expect("cache should still answer");
    assert_eq!(price.tier, PriceTier::LastKnownGood);
    assert_eq!(price.observed_at, T0);
}

#[test]
fn invalid_config_update_keeps_previous() {
    let (mut vault, _primary, _fallback) = setup();
    let inverted = OracleConfig {
        min_price: 10 * PRICE_SCALE,
        max_price: PRICE_SCALE,
        ..oracle_config()
    };
    let err = vault
        .update_oracle_config(admin(), inverted)
        .expect_err("inverted bounds must be rejected");
    assert!(matches!(err, VaultError::Oracle(OracleError::InvalidConfig(_))));
    assert!(!err.is_transient());
    assert_eq!(vault.oracle().config(), &oracle_config());

    // Tighter bounds exclude the live price.
    let tight = OracleConfig {
        max_price: 1_000 * PRICE_SCALE,
        ..oracle_config()
    };
    vault
        .update_oracle_config(admin(), tight)
        .expect("valid config should apply");
    let err = vault
        .deposit(alice(), alice(), 1_000, T0)
        .expect_err("2000 is above the new ceiling and nothing is cached");
    match err {
        VaultError::Oracle(OracleError::AllSourcesExhausted { primary, .. }) => {
            assert!(matches!(
                primary,
                TierFailure::Price(tally_oracle::PriceError::OutOfBounds { .. })
            ));
        }
        other => panic!("Expected AllSourcesExhausted, got {other:?}"),
    }
}
