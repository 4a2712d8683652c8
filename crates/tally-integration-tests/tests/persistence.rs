//! Integration test: scenario replay, persistence and restart.
//!
//! Exercises the simulation host end to end:
//! 1. Parse a scenario document and build a shared vault
//! 2. Replay it with every step written to a SQLite database on disk
//! 3. Reopen the database and restore the vault from the stored snapshot
//! 4. Verify totals, share balances, oracle cache and TWAP history survive
//! 5. Continue replaying against the restored vault
//! 6. Concurrent tasks on one shared vault keep the books balanced
//!
//! Uses tally-sim (config, host, scenario) over tally-db and tally-vault.

use std::path::PathBuf;

use tally_sim::config::SimConfig;
use tally_sim::host::{self, DbSink};
use tally_sim::scenario;
use tally_types::account_from_label;
use tally_vault::ShareLedger;

const FIRST_RUN: &str = r#"
    [oracle]
    max_staleness_seconds = 600
    max_deviation_bps = 500

    [vault]
    twap_window_seconds = 100

    [access]
    admins = ["admin"]

    [[account]]
    name = "alice"
    balance = 100_000

    [[account]]
    name = "bob"
    balance = 100_000

    [[feed.primary]]
    at = 1000
    price = 2000_00000000

    [[feed.primary]]
    at = 1100
    price = 2020_00000000

    [[feed.primary]]
    at = 1200
    price = 2040_00000000

    [[step]]
    action = "deposit"
    at = 1000
    caller = "alice"
    assets = 10_000

    [[step]]
    action = "deposit"
    at = 1100
    caller = "bob"
    assets = 5_000

    [[step]]
    action = "donate"
    at = 1100
    from = "bob"
    assets = 1_500

    [[step]]
    action = "redeem"
    at = 1200
    caller = "alice"
    shares = 1_000
"#;

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("tally-it-{name}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).expect("scratch dir should be creatable");
    dir
}

#[tokio::test]
async fn replay_persist_and_restart() {
    let dir = scratch_dir("restart");
    let db_path = dir.join("tally.db");
    let config = SimConfig::parse(FIRST_RUN).expect("scenario should parse");
    let alice = account_from_label("alice");
    let bob = account_from_label("bob");

    // =========================================================
    // Step 1-2: Replay into an on-disk database
    // =========================================================
    let conn = tally_db::open(&db_path).expect("database should open");
    let vault = host::share(host::open_vault(&config, &conn).expect("fresh vault"));
    let mut sink = DbSink::new(conn);
    let summary = scenario::run(&vault, &config.steps, &mut sink)
        .await
        .expect("replay should complete");

    assert_eq!(summary.steps, 4);
    assert_eq!(summary.succeeded, 4, "failures: {:?}", summary.failed);
    // 16_500 assets over 15_000 shares; 1_000 shares redeem for 1_100.
    assert_eq!(summary.total_shares, 14_000);
    assert_eq!(summary.total_assets, 15_400);
    assert_eq!(summary.price_paths.get("twap"), Some(&1));

    let stored_events = tally_db::queries::events::recent(sink.connection(), 100)
        .expect("events should load");
    assert_eq!(stored_events.len(), summary.events);
    assert_eq!(
        tally_db::queries::events::count_by_type(sink.connection(), "deposit")
            .expect("count should succeed"),
        2
    );

    let before = vault.lock().await.snapshot();
    drop(sink);

    // =========================================================
    // Step 3-4: Reopen and restore
    // =========================================================
    let conn = tally_db::open(&db_path).expect("database should reopen");
    let restored = host::open_vault(&config, &conn).expect("stored vault should restore");
    assert_eq!(restored.snapshot(), before, "Snapshot must survive a restart");
    assert_eq!(restored.ledger().balance_of(alice), 9_000);
    assert_eq!(restored.ledger().balance_of(bob), 5_000);
    assert_eq!(restored.assets().vault_balance(), 15_400);
    assert_eq!(restored.oracle().twap().len(), 2);
    assert_eq!(
        restored.oracle().last_known_good(),
        before.last_known_good,
        "Oracle cache must survive a restart"
    );

    // =========================================================
    // Step 5: Keep going on the restored vault
    // =========================================================
    let more = SimConfig::parse(
        r#"
        [[step]]
        action = "redeem"
        at = 1250
        caller = "bob"
        shares = 5_000

        [[step]]
        action = "redeem"
        at = 1250
        caller = "bob"
        shares = 1
        "#,
    )
    .expect("follow-up should parse");
    let vault = host::share(restored);
    let mut sink = DbSink::new(conn);
    let summary = scenario::run(&vault, &more.steps, &mut sink)
        .await
        .expect("follow-up replay should complete");
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].action, "redeem");
    assert!(!summary.failed[0].transient);
    assert_eq!(summary.total_shares, 9_000);

    let balances = tally_db::queries::balances::load_all(sink.connection())
        .expect("balances should load");
    assert_eq!(balances, vec![(alice, 9_000)], "Zero balances are not stored");

    drop(sink);
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn concurrent_tasks_share_one_vault() {
    let config = SimConfig::parse(
        r#"
        [[account]]
        name = "alice"
        balance = 1_000_000

        [[account]]
        name = "bob"
        balance = 1_000_000

        [[feed.primary]]
        at = 0
        price = 2000_00000000
        "#,
    )
    .expect("config should parse");
    let vault = host::share(host::build_vault(&config).expect("vault should build"));

    // =========================================================
    // Step 6: Interleave deposits and redeems from two tasks
    // =========================================================
    let mut handles = Vec::new();
    for name in ["alice", "bob"] {
        let vault = vault.clone();
        handles.push(tokio::spawn(async move {
            let account = account_from_label(name);
            for i in 0..20u64 {
                {
                    let mut guard = vault.lock().await;
                    guard
                        .deposit(account, account, 1_000, 10 + i)
                        .expect("deposit should succeed");
                }
                tokio::task::yield_now().await;
                {
                    let mut guard = vault.lock().await;
                    guard
                        .redeem(account, account, account, 300, 10 + i)
                        .expect("redeem should succeed");
                }
            }
        }));
    }
    for handle in handles {
        handle.await.expect("task should not panic");
    }

    let guard = vault.lock().await;
    assert_eq!(guard.total_shares(), 2 * 20 * 700);
    assert_eq!(guard.total_assets(), 2 * 20 * 700);
    assert_eq!(guard.ledger().total_supply(), guard.total_shares());
    assert_eq!(guard.assets().vault_balance(), guard.total_assets());
}
