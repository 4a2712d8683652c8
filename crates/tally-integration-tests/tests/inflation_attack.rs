//! Integration test: share-price inflation by direct donation.
//!
//! Exercises the classic first-depositor attack against the vault:
//! 1. Attacker deposits 1 asset unit and receives 1 share
//! 2. Attacker donates a large amount, inflating the share price
//! 3. A victim deposit that would round to zero shares is rejected
//!    with `ZeroShares` and leaves no trace
//! 4. A victim deposit large enough to mint shares is priced at the
//!    pool's own ratio, never above it
//! 5. Randomized sweep: no deposit is ever accepted for zero shares
//!
//! Uses tally-vault with in-memory collaborators and a static price feed.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tally_oracle::source::StaticSource;
use tally_oracle::OracleAggregator;
use tally_types::price::{OracleConfig, RawFeedReading};
use tally_types::{account_from_label, AccountId};
use tally_vault::memory::{AdminSet, MemoryAssetBook, MemoryShareLedger};
use tally_vault::{ShareLedger, VaultAccounting, VaultConfig, VaultError};

type Vault = VaultAccounting<MemoryAssetBook, MemoryShareLedger, AdminSet>;

const NOW: u64 = 1_700_000_000;

/// Starting balance of every funded account.
const FUNDING: u128 = 1_000_000_000_000;

fn attacker() -> AccountId {
    account_from_label("attacker")
}

fn victim() -> AccountId {
    account_from_label("victim")
}

fn vault() -> Vault {
    let primary = StaticSource::new(
        "primary",
        RawFeedReading {
            price: 2_000_00000000,
            updated_at: NOW,
            round_id: 1,
            answered_in_round: 1,
            decimals: 8,
        },
    );
    let oracle = OracleAggregator::new(OracleConfig::default(), Box::new(primary), None)
        .expect("oracle should build with default config");
    let mut book = MemoryAssetBook::new();
    book.fund(attacker(), FUNDING);
    book.fund(victim(), FUNDING);
    VaultAccounting::new(
        VaultConfig::default(),
        oracle,
        book,
        MemoryShareLedger::new(),
        AdminSet::default(),
    )
}

#[test]
fn donation_cannot_steal_small_deposit() {
    let mut vault = vault();

    // =========================================================
    // Step 1: Attacker takes the first share
    // =========================================================
    let seed = vault
        .deposit(attacker(), attacker(), 1, NOW)
        .expect("bootstrap deposit should succeed");
    assert_eq!(seed.shares, 1, "Bootstrap must mint 1:1");

    // =========================================================
    // Step 2: Inflate the share price by donation
    // =========================================================
    vault
        .donate(attacker(), 1_000_000, NOW)
        .expect("donation should succeed");
    assert_eq!(vault.total_assets(), 1_000_001);
    assert_eq!(vault.total_shares(), 1);

    // =========================================================
    // Step 3: Victim deposit that rounds to zero is refused
    // =========================================================
    let before = vault.state();
    let err = vault
        .deposit(victim(), victim(), 500_000, NOW)
        .expect_err("deposit worth half a share must be rejected");
    assert_eq!(err, VaultError::ZeroShares { assets: 500_000 });
    assert!(!err.is_transient(), "ZeroShares is a hard stop");
    assert_eq!(vault.state(), before, "Rejected deposit must not move totals");
    assert_eq!(
        vault.assets().balance_of(victim()),
        FUNDING,
        "Rejected deposit must not pull assets"
    );
    assert_eq!(vault.ledger().balance_of(victim()), 0);
}

#[test]
fn donation_does_not_misprice_large_deposit() {
    let mut vault = vault();
    vault
        .deposit(attacker(), attacker(), 1, NOW)
        .expect("bootstrap deposit should succeed");
    vault
        .donate(attacker(), 1_000_000, NOW)
        .expect("donation should succeed");

    // =========================================================
    // Step 4: A deposit that clears one share is priced fairly
    // =========================================================
    let assets = 2_000_000;
    let receipt = vault
        .deposit(victim(), victim(), assets, NOW)
        .expect("deposit worth two shares should succeed");

    // floor(2_000_000 * 1 / 1_000_001) = 1
    assert_eq!(receipt.shares, 1);
    assert_eq!(vault.total_assets(), 3_000_001);
    assert_eq!(vault.total_shares(), 2);

    // The victim's shares never redeem for more than they paid, and the
    // rounding loss stays below the price of one share at entry.
    let redeemable = vault
        .preview_redeem(receipt.shares)
        .expect("preview should succeed");
    assert!(redeemable <= assets);
    assert!(
        assets - redeemable < 1_000_001,
        "Loss {} must stay below one pre-deposit share",
        assets - redeemable
    );
    assert_eq!(vault.assets().vault_balance(), vault.total_assets());
}

#[test]
fn randomized_donations_never_mint_zero_shares() {
    let mut rng = StdRng::seed_from_u64(0x7a11_7a11);

    for round in 0..200 {
        let mut vault = vault();
        let seed_assets: u128 = rng.gen_range(1..=1_000);
        let donation: u128 = rng.gen_range(1..=1_000_000_000);
        let deposit: u128 = rng.gen_range(1..=1_000_000_000);

        vault
            .deposit(attacker(), attacker(), seed_assets, NOW)
            .expect("bootstrap deposit should succeed");
        vault
            .donate(attacker(), donation, NOW)
            .expect("donation should succeed");

        let state = vault.state();
        match vault.deposit(victim(), victim(), deposit, NOW) {
            Ok(receipt) => {
                assert!(receipt.shares > 0, "round {round}: accepted for zero shares");
                // shares <= assets * TS / TA, checked without division.
                assert!(
                    receipt.shares * state.total_assets <= deposit * state.total_shares,
                    "round {round}: shares priced above the pool ratio"
                );
                assert_eq!(receipt.assets, deposit);
            }
            Err(VaultError::ZeroShares { assets }) => {
                assert_eq!(assets, deposit);
                assert!(
                    deposit * state.total_shares < state.total_assets,
                    "round {round}: rejected a deposit worth a whole share"
                );
                assert_eq!(vault.state(), state);
            }
            Err(other) => panic!("round {round}: unexpected error {other}"),
        }
    }
}
