//! # fieldhubd: fieldhub daemon
//!
//! Composition root that wires all adapters together and starts the server.
//!
//! ## Responsibilities
//! - Parse configuration (config file, env vars)
//! - Initialize the `SQLite` connection pool and run migrations
//! - Construct repository implementations (adapters)
//! - Construct application services, injecting repositories via port traits
//! - Start the MQTT bridge and the periodic jobs
//! - Build the axum router and serve it
//! - Handle graceful shutdown (SIGTERM/SIGINT)
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer: no domain logic belongs here.

mod config;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use fieldhub_adapter_http_axum::state::AppState;
use fieldhub_adapter_mqtt::{MqttBridge, ShellyController};
use fieldhub_adapter_storage_sqlite_sqlx::{
    Config as StorageConfig, SqliteAutomationRepository, SqliteDeviceRepository,
    SqliteGatewayRepository, SqliteMarketPriceRepository, SqliteNotificationRepository,
    SqliteTelemetryRepository,
};
use fieldhub_app::automation_engine::AutomationEngine;
use fieldhub_app::event_bus::InProcessEventBus;
use fieldhub_app::scheduler::{JobPolicy, Scheduler};
use fieldhub_app::services::anomaly_service::AnomalyDetector;
use fieldhub_app::services::device_control::BrandRouter;
use fieldhub_app::services::ingestion_service::IngestionService;
use fieldhub_app::services::sweep_service::OrganizationSweep;
use fieldhub_app::services::watchdog_service::Watchdog;

use crate::config::Config;

const EVENT_BUS_CAPACITY: usize = 256;

#[tokio::main]
#[allow(clippy::too_many_lines)]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("failed to load configuration")?;
    init_tracing(&config.logging.filter);

    // Database
    let db = StorageConfig {
        database_url: config.database_url().to_string(),
    }
    .build()
    .await
    .context("failed to open database")?;
    let pool = db.pool().clone();

    // Repositories
    let devices = Arc::new(SqliteDeviceRepository::new(pool.clone()));
    let gateways = Arc::new(SqliteGatewayRepository::new(pool.clone()));
    let telemetry = Arc::new(SqliteTelemetryRepository::new(pool.clone()));
    let rules = Arc::new(SqliteAutomationRepository::new(pool.clone()));
    let notifications = Arc::new(SqliteNotificationRepository::new(pool.clone()));
    let prices = Arc::new(SqliteMarketPriceRepository::new(pool));

    // Event bus and shutdown signal
    let event_bus = Arc::new(InProcessEventBus::new(EVENT_BUS_CAPACITY));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Services
    let anomaly_config = config.anomaly_config();
    let detector = || {
        AnomalyDetector::new(
            Arc::clone(&devices),
            Arc::clone(&telemetry),
            Arc::clone(&notifications),
            Arc::clone(&event_bus),
            anomaly_config,
        )
    };
    let ingestion = Arc::new(IngestionService::new(
        Arc::clone(&devices),
        Arc::clone(&telemetry),
        Arc::clone(&event_bus),
        detector(),
    ));

    // MQTT
    let (bridge, commands) =
        MqttBridge::start(&config.mqtt, ingestion, shutdown_rx.clone());
    let controller = BrandRouter::new(Some(ShellyController::new(
        commands.clone(),
        config.mqtt.client_id.clone(),
    )));

    let engine = Arc::new(AutomationEngine::new(
        rules,
        Arc::clone(&devices),
        Arc::clone(&telemetry),
        prices,
        Arc::clone(&notifications),
        Arc::clone(&event_bus),
        controller,
        config.engine_config(),
    ));
    let watchdog = Watchdog::new(
        Arc::clone(&devices),
        Arc::clone(&gateways),
        Arc::clone(&notifications),
        commands,
        config.watchdog_config(),
    );
    let sweep = Arc::new(OrganizationSweep::new(
        Arc::clone(&devices),
        gateways,
        watchdog,
        detector(),
    ));

    // Periodic jobs
    let schedule = &config.scheduler;
    let retry_delay = Duration::from_secs(schedule.retry_delay_secs);
    let mut scheduler = Scheduler::new(shutdown_rx.clone());

    let job_engine = Arc::clone(&engine);
    scheduler.spawn(
        "automations",
        JobPolicy::every(Duration::from_secs(schedule.automation_interval_secs)),
        move || {
            let engine = Arc::clone(&job_engine);
            async move {
                let summary = engine.run_all().await?;
                tracing::info!(
                    evaluated = summary.evaluated,
                    fired = summary.fired,
                    failed = summary.failed,
                    "automation pass finished"
                );
                Ok(())
            }
        },
    );

    let job_sweep = Arc::clone(&sweep);
    scheduler.spawn(
        "device_check",
        JobPolicy::every(Duration::from_secs(schedule.device_check_interval_secs))
            .with_retries(schedule.max_retries, retry_delay),
        move || {
            let sweep = Arc::clone(&job_sweep);
            async move {
                let offline = sweep.check_devices().await?;
                tracing::info!(offline, "device check finished");
                Ok(())
            }
        },
    );

    let job_sweep = Arc::clone(&sweep);
    scheduler.spawn(
        "org_sweep",
        JobPolicy::every(Duration::from_secs(schedule.sweep_interval_secs))
            .with_retries(schedule.max_retries, retry_delay),
        move || {
            let sweep = Arc::clone(&job_sweep);
            async move {
                let summary = sweep.run().await?;
                tracing::info!(
                    organizations = summary.organizations,
                    issues = summary.issues,
                    anomalies = summary.anomalies,
                    "organization sweep finished"
                );
                Ok(())
            }
        },
    );

    // HTTP
    let state = AppState::new(Arc::clone(&event_bus), shutdown_rx.clone());
    let app = fieldhub_adapter_http_axum::router::build(state);

    let bind_addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "fieldhubd listening");

    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    let mut http_shutdown = shutdown_rx;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = http_shutdown.wait_for(|stop| *stop).await;
        })
        .await
        .context("HTTP server failed")?;

    scheduler.shutdown().await;
    bridge.join().await;
    tracing::info!("fieldhubd stopped");

    Ok(())
}

fn init_tracing(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|err| {
        eprintln!("invalid log filter `{filter}` ({err}), falling back to `info`");
        EnvFilter::new("info")
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Resolve on ctrl-c or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(%err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(%err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
