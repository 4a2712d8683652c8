//! Integration test: randomized accounting properties.
//!
//! Checks, over seeded random inputs:
//! 1. Rounding direction of all four conversions against the exact ratio
//! 2. Every preview equals the amount the operation then moves
//! 3. Depositing and immediately redeeming never returns a profit
//! 4. TWAP over three observations matches the hand-computed average
//!    within one unit of truncation
//!
//! Uses tally-vault (shares, accounting) and tally-oracle (twap).

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tally_oracle::source::StaticSource;
use tally_oracle::{OracleAggregator, TwapRingBuffer};
use tally_types::price::{OracleConfig, RawFeedReading};
use tally_types::vault::VaultState;
use tally_types::{account_from_label, AccountId, U256, PRICE_SCALE};
use tally_vault::memory::{AdminSet, MemoryAssetBook, MemoryShareLedger};
use tally_vault::shares;
use tally_vault::{VaultAccounting, VaultConfig, VaultError};

type Vault = VaultAccounting<MemoryAssetBook, MemoryShareLedger, AdminSet>;

const NOW: u64 = 1_700_000_000;
const ROUNDS: usize = 500;

fn holder() -> AccountId {
    account_from_label("holder")
}

fn user() -> AccountId {
    account_from_label("user")
}

fn random_state(rng: &mut StdRng) -> VaultState {
    // Ratios from heavy loss to heavy gain.
    VaultState {
        total_assets: rng.gen_range(1..=1_000_000_000_000u128),
        total_shares: rng.gen_range(1..=1_000_000_000_000u128),
    }
}

fn wide(v: u128) -> U256 {
    U256::from(v)
}

/// A vault already holding `state`, owned entirely by `holder`, with
/// `user` funded for any deposit.
fn vault_at(state: VaultState) -> Vault {
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
    let fresh = VaultAccounting::new(
        VaultConfig::default(),
        OracleAggregator::new(OracleConfig::default(), Box::new(primary.clone()), None)
            .expect("oracle should build"),
        MemoryAssetBook::new(),
        MemoryShareLedger::new(),
        AdminSet::default(),
    );
    let mut snapshot = fresh.snapshot();
    snapshot.state = state;

    let mut book = MemoryAssetBook::new();
    book.set_vault_balance(state.total_assets);
    book.fund(user(), 1 << 100);
    let ledger = MemoryShareLedger::from_balances([(holder(), state.total_shares)])
        .expect("ledger should build");
    Vault::restore(
        VaultConfig::default(),
        &snapshot,
        Box::new(primary),
        None,
        book,
        ledger,
        AdminSet::default(),
    )
    .expect("consistent state should restore")
}

#[test]
fn conversions_round_toward_the_vault() {
    let mut rng = StdRng::seed_from_u64(1);
    for _ in 0..ROUNDS {
        let state = random_state(&mut rng);
        let amount: u128 = rng.gen_range(1..=1_000_000_000_000);
        let (ta, ts) = (wide(state.total_assets), wide(state.total_shares));

        // shares <= amount * ts / ta
        let s = shares::shares_for_deposit(&state, amount).expect("deposit conversion");
        assert!(wide(s) * ta <= wide(amount) * ts, "deposit over-minted at {state:?}");
        assert!((wide(s) + 1) * ta > wide(amount) * ts, "deposit not the floor");

        // assets >= amount * ta / ts
        let a = shares::assets_for_mint(&state, amount).expect("mint conversion");
        assert!(wide(a) * ts >= wide(amount) * ta, "mint under-charged at {state:?}");
        assert!(a == 0 || (wide(a) - 1) * ts < wide(amount) * ta, "mint not the ceiling");

        // shares >= amount * ts / ta
        let s = shares::shares_for_withdraw(&state, amount).expect("withdraw conversion");
        assert!(wide(s) * ta >= wide(amount) * ts, "withdraw under-burned at {state:?}");

        // assets <= amount * ta / ts
        let a = shares::assets_for_redeem(&state, amount).expect("redeem conversion");
        assert!(wide(a) * ts <= wide(amount) * ta, "redeem over-paid at {state:?}");
    }
}

#[test]
fn previews_match_execution() {
    let mut rng = StdRng::seed_from_u64(2);
    for round in 0..ROUNDS {
        let state = random_state(&mut rng);
        let mut vault = vault_at(state);
        let amount: u128 = rng.gen_range(1..=1_000_000_000);

        match rng.gen_range(0..4) {
            0 => {
                let preview = vault.preview_deposit(amount).expect("preview");
                match vault.deposit(user(), user(), amount, NOW) {
                    Ok(receipt) => assert_eq!(receipt.shares, preview, "round {round}"),
                    Err(e) => {
                        assert_eq!(preview, 0, "round {round}: {e}");
                        assert_eq!(e, VaultError::ZeroShares { assets: amount });
                    }
                }
            }
            1 => {
                let preview = vault.preview_mint(amount).expect("preview");
                let receipt = vault
                    .mint(user(), user(), amount, NOW)
                    .expect("mint should succeed");
                assert_eq!(receipt.assets, preview, "round {round}");
            }
            2 => {
                let assets = amount.min(vault.max_withdraw(holder()));
                let preview = vault.preview_withdraw(assets).expect("preview");
                let receipt = vault
                    .withdraw(holder(), holder(), holder(), assets, NOW)
                    .expect("withdraw should succeed");
                assert_eq!(receipt.shares, preview, "round {round}");
            }
            _ => {
                let shares = amount.min(state.total_shares);
                let preview = vault.preview_redeem(shares).expect("preview");
                match vault.redeem(holder(), holder(), holder(), shares, NOW) {
                    Ok(receipt) => assert_eq!(receipt.assets, preview, "round {round}"),
                    Err(e) => {
                        assert_eq!(preview, 0, "round {round}: {e}");
                        assert_eq!(e, VaultError::ZeroAssets { shares });
                    }
                }
            }
        }
        assert_eq!(
            vault.assets().vault_balance(),
            vault.total_assets(),
            "round {round}: holdings drifted from totals"
        );
    }
}

#[test]
fn deposit_then_redeem_never_profits() {
    let mut rng = StdRng::seed_from_u64(3);
    for round in 0..ROUNDS {
        let state = random_state(&mut rng);
        let mut vault = vault_at(state);
        let amount: u128 = rng.gen_range(1..=1_000_000_000);

        let shares = match vault.deposit(user(), user(), amount, NOW) {
            Ok(receipt) => receipt.shares,
            Err(VaultError::ZeroShares { .. }) => continue,
            Err(e) => panic!("round {round}: unexpected deposit error {e}"),
        };
        let returned = match vault.redeem(user(), user(), user(), shares, NOW) {
            Ok(receipt) => receipt.assets,
            Err(VaultError::ZeroAssets { .. }) => 0,
            Err(e) => panic!("round {round}: unexpected redeem error {e}"),
        };
        assert!(
            returned <= amount,
            "round {round}: deposited {amount}, got back {returned}"
        );
    }
}

#[test]
fn twap_matches_manual_average() {
    let mut rng = StdRng::seed_from_u64(4);
    for _ in 0..ROUNDS {
        let mut ring = TwapRingBuffer::new(8).expect("ring");
        let t0: u64 = rng.gen_range(1_000..1_000_000);
        let t1 = t0 + rng.gen_range(1..10_000);
        let t2 = t1 + rng.gen_range(1..10_000);
        let p0: u128 = rng.gen_range(1..=100_000) * PRICE_SCALE / 7;
        let p1: u128 = rng.gen_range(1..=100_000) * PRICE_SCALE / 3;
        let p2: u128 = rng.gen_range(1..=100_000) * PRICE_SCALE;

        ring.record(p0, t0).expect("record t0");
        ring.record(p1, t1).expect("record t1");
        ring.record(p2, t2).expect("record t2");

        // Each price is weighted by the interval ending at its timestamp.
        let weighted = wide(p1) * wide(u128::from(t1 - t0)) + wide(p2) * wide(u128::from(t2 - t1));
        let expected = weighted / wide(u128::from(t2 - t0));

        let twap = ring.get_twap(t2 - t0, t2).expect("window covered");
        let diff = if wide(twap) > expected {
            wide(twap) - expected
        } else {
            expected - wide(twap)
        };
        assert!(diff <= U256::ONE, "twap {twap} vs expected {expected}");
    }
}
