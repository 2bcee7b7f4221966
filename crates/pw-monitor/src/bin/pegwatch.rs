use anyhow::Context;
use tracing::{info, warn};

use pw_monitor::{init_tracing, MonitorConfig, MonitoringEngine};
use pw_types::AlertType;

/// Optional path to a JSON config file.
const CONFIG_ENV: &str = "PEGWATCH_CONFIG";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let mut config = match std::env::var(CONFIG_ENV) {
        Ok(path) => MonitorConfig::from_json_file(&path)
            .with_context(|| format!("loading config from {path}"))?,
        Err(_) => MonitorConfig::default(),
    };
    config
        .apply_env_overrides()
        .context("applying PEGWATCH_* overrides")?;

    let engine = MonitoringEngine::with_simulated_source(config)?;

    let _analyses = engine.subscribe_analyses(|snapshot| {
        if let Some(level) = snapshot.max_level() {
            info!(assets = snapshot.len(), highest = %level, "snapshot updated");
        }
    });
    let _alerts = engine.subscribe_alerts(|alerts| {
        if let Some(latest) = alerts.first() {
            match latest.alert_type {
                AlertType::Critical | AlertType::Warning => {
                    warn!(id = latest.id, coin = %latest.coin, title = %latest.title, "{}", latest.message)
                }
                AlertType::Info => {
                    info!(id = latest.id, coin = %latest.coin, title = %latest.title, "{}", latest.message)
                }
            }
        }
    });

    engine.start_default()?;
    info!(assets = ?engine.tracked_assets(), "PegWatch running; press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;

    engine.stop().await;
    let stats = engine.stats();
    info!(
        ticks = stats.ticks_completed,
        refreshed = stats.assets_refreshed,
        failures = stats.asset_failures,
        alerts = stats.alerts_raised,
        "PegWatch stopped"
    );
    println!("{}", serde_json::to_string_pretty(&engine.performance_metrics())?);
    Ok(())
}
