//! VALUEBETS: sports odds value-bet evaluation engine
//!
//! Entry point. Loads configuration, initialises structured logging,
//! restores the fingerprint memory from disk, and runs the
//! fetch→evaluate→deliver loop with graceful shutdown.

use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use valuebets::config;
use valuebets::dashboard::{self, routes::DashboardState};
use valuebets::engine::ValueEngine;
use valuebets::provider::the_odds_api::TheOddsApiClient;
use valuebets::provider::OddsProvider;
use valuebets::sink::webhook::WebhookSink;
use valuebets::sink::{deliver_all, RecommendationSink, TracingSink};
use valuebets::storage::{self, history::HistoryStore};
use valuebets::strategy::stake::StakeAdvisor;

const BANNER: &str = r#"
 __     ___    _    _   _ _____ ____  _____ _____ ____
 \ \   / / \  | |  | | | | ____| __ )| ____|_   _/ ___|
  \ \ / / _ \ | |  | | | |  _| |  _ \|  _|   | | \___ \
   \ V / ___ \| |__| |_| | |___| |_) | |___  | |  ___) |
    \_/_/   \_\_____\___/|_____|____/|_____| |_| |____/

  Value-bet evaluation engine v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    // Load configuration from TOML
    let cfg = config::AppConfig::load("config.toml")?;

    // Initialise structured logging
    init_logging();

    println!("{BANNER}");
    info!(
        agent_name = %cfg.agent.name,
        cycle_interval_secs = cfg.agent.cycle_interval_secs,
        sports = ?cfg.provider.sports,
        "VALUEBETS starting up"
    );

    // -- Restore memory --------------------------------------------------

    let memory_file = cfg.agent.memory_file.as_str();
    let memory = storage::load_memory(Some(memory_file), Utc::now())?;
    let mut engine = ValueEngine::with_memory(cfg.engine.clone(), memory);

    // -- Initialise components -------------------------------------------

    let provider = TheOddsApiClient::from_config(&cfg.provider)?;

    let history = match &cfg.agent.history_db {
        Some(url) => match HistoryStore::connect(url).await {
            Ok(store) => Some(store),
            Err(e) => {
                warn!(error = %e, "History store unavailable, continuing without it");
                None
            }
        },
        None => None,
    };

    let sink: Box<dyn RecommendationSink> =
        match WebhookSink::from_config(&cfg.sinks, StakeAdvisor::new(cfg.stake.clone()))? {
            Some(webhooks) => {
                info!(tiers = ?webhooks.configured_tiers(), "Posting to webhooks");
                Box::new(webhooks)
            }
            None => {
                warn!("No webhooks configured, recommendations will only be logged");
                Box::new(TracingSink)
            }
        };

    let stakes = StakeAdvisor::new(cfg.stake.clone());

    let dash_state = Arc::new(DashboardState::new(&cfg.agent.name, history.clone()));
    if cfg.dashboard.enabled {
        dashboard::spawn_dashboard(dash_state.clone(), cfg.dashboard.port);
    }

    // -- Main loop -------------------------------------------------------

    let mut interval = tokio::time::interval(Duration::from_secs(cfg.agent.cycle_interval_secs));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        interval_secs = cfg.agent.cycle_interval_secs,
        "Entering main loop. Press Ctrl+C to stop."
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let batch = match provider.fetch_batch().await {
                    Ok(b) => b,
                    Err(e) => {
                        error!(provider = provider.name(), error = %e, "Fetch failed, continuing to next cycle");
                        continue;
                    }
                };

                let output = match engine.run_cycle(&batch, Utc::now()) {
                    Ok(o) => o,
                    Err(e) => {
                        error!(error = %e, "Cycle aborted");
                        continue;
                    }
                };

                let delivery = deliver_all(sink.as_ref(), &output.recommendations).await;
                let failed = delivery.failed_tiers();
                if !failed.is_empty() {
                    warn!(failed = ?failed, "Some tiers were not delivered, retrying next cycle");
                    engine.release_undelivered(&output.recommendations, &failed);
                }

                if let Some(store) = &history {
                    let delivered = output
                        .recommendations
                        .iter()
                        .filter(|(tier, _)| !failed.contains(tier))
                        .flat_map(|(_, recs)| recs);
                    for rec in delivered {
                        if let Err(e) = store.record(rec, &stakes.plan(rec)).await {
                            error!(error = %e, "Failed to record recommendation");
                        }
                    }
                }

                // Persist memory after each cycle
                if let Err(e) = storage::save_memory(engine.memory(), Some(memory_file)) {
                    error!(error = %e, "Failed to save memory");
                }

                dash_state.record_cycle(output.report, output.recommendations).await;
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    storage::save_memory(engine.memory(), Some(memory_file))?;
    info!(
        cycles = engine.cycles_run(),
        remembered = engine.memory().len(),
        "VALUEBETS shut down cleanly."
    );

    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("valuebets=info"));

    let json_logging = std::env::var("VALUEBETS_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
