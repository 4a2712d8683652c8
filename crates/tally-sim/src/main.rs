//! tally-sim: replay a vault scenario.
//!
//! Usage: `tally-sim [config.toml]`. Without an argument the configuration
//! is read from `$TALLY_DATA_DIR/config.toml`, falling back to defaults.

use std::path::PathBuf;

use tracing::info;

use tally_sim::config::SimConfig;
use tally_sim::host::{self, DbSink, NullSink, StepSink};
use tally_sim::scenario;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = SimConfig::load(config_path.as_deref())?;

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new(&config.advanced.log_level))?,
        )
        .init();

    info!(steps = config.steps.len(), "tally-sim starting");

    let (vault, mut sink): (_, Box<dyn StepSink>) = if config.storage.ephemeral {
        (host::build_vault(&config)?, Box::new(NullSink))
    } else {
        let data_dir = config.data_dir();
        std::fs::create_dir_all(&data_dir)?;
        let db_path = data_dir.join("tally.db");
        info!("opening database at {:?}", db_path);
        let conn = tally_db::open(&db_path)?;
        let vault = host::open_vault(&config, &conn)?;
        (vault, Box::new(DbSink::new(conn)))
    };

    let shared = host::share(vault);
    let summary = scenario::run(&shared, &config.steps, sink.as_mut()).await?;

    info!(
        succeeded = summary.succeeded,
        failed = summary.failed.len(),
        "tally-sim finished"
    );
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
