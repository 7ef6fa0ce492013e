use std::sync::Arc;

use clap::Parser;
use rand::Rng;
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing::{error, info, warn};

use crate::adapters::{CsvFileParser, HttpSearchProvider, LogAuditSink, StubDescriptorExtractor};
use crate::cli::{Args, ServiceName};
use crate::config::Config;
use crate::control::RetryController;
use crate::db::DbContext;
use crate::events::EventBuffer;
use crate::services::manager::ServiceManager;
use crate::services::{ServiceResult, web::WebService};
use crate::state::AppState;
use crate::status::ServiceStatusRegistry;
use crate::worker::PricingDeps;

mod adapters;
mod cli;
mod config;
mod control;
mod db;
mod domain;
mod error;
mod events;
mod formatter;
mod ingest;
mod logging;
mod pricing;
mod services;
mod state;
mod status;
mod web;
mod worker;

/// A new identity per process; a crashed process's stale locks are
/// attributable to it and expire by `lock_ttl` rather than needing explicit
/// cleanup by that exact process.
fn generate_worker_id() -> Arc<str> {
    let suffix: u64 = rand::rng().random();
    Arc::from(format!("worker-{suffix:016x}"))
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let config = Config::load().expect("failed to load config");

    logging::setup_logging(&config, args.tracing.clone());

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = if cfg!(debug_assertions) { "development" } else { "production" },
        "starting claimpricer"
    );

    let db_pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .expect("failed to create database pool");

    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .expect("failed to run migrations");

    info!(
        port = config.port,
        shutdown_timeout = format!("{:.2?}", config.shutdown_timeout),
        "configuration loaded"
    );

    let events = Arc::new(EventBuffer::new(1024));
    let db = DbContext::new(db_pool.clone(), events);

    // Items left PROCESSING from an unclean shutdown would otherwise sit
    // until their lock_ttl expires on the next claim; force_unlock_all lets
    // the next kickoff pick them up immediately instead of waiting it out.
    match db.items().force_unlock_all().await {
        Ok(0) => {}
        Ok(n) => warn!(recovered = n, "recovered items stuck PROCESSING from a prior run"),
        Err(e) => error!(error = %e, "failed to recover stuck items on startup"),
    }

    let retry = Arc::new(RetryController::new(config.provider.clone(), &config.worker));
    let pricing_deps = PricingDeps {
        search_provider: Arc::new(HttpSearchProvider::new("reference", config.provider.search_endpoint.clone())),
        descriptor_extractor: Arc::new(StubDescriptorExtractor),
        audit_sink: Arc::new(LogAuditSink),
        retry,
        policy: config.policy.clone(),
        max_attempts_error: config.worker.max_attempts_error,
        max_attempts_not_found: config.worker.max_attempts_not_found,
    };

    let app_state = AppState::new(
        db,
        Arc::new(config.auth.clone()),
        Arc::new(config.ingest.clone()),
        Arc::new(config.worker.clone()),
        pricing_deps,
        Arc::new(CsvFileParser),
        generate_worker_id(),
        ServiceStatusRegistry::new(),
    );

    let mut service_manager = ServiceManager::new();
    let web_service = Box::new(WebService::new(config.port, app_state));
    service_manager.register_service(ServiceName::Web.as_str(), web_service);
    service_manager.spawn_all();

    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install CTRL+C signal handler");
        info!("received ctrl+c, gracefully shutting down...");
    };

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm_stream = signal(SignalKind::terminate()).expect("failed to install SIGTERM signal handler");
        sigterm_stream.recv().await;
        info!("received SIGTERM, gracefully shutting down...");
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    let shutdown_timeout = config.shutdown_timeout;
    let mut exit_code = 0;

    tokio::select! {
        (service_name, result) = service_manager.run() => {
            match result {
                ServiceResult::GracefulShutdown => {
                    info!(service = service_name, "service completed gracefully");
                }
                ServiceResult::NormalCompletion => {
                    warn!(service = service_name, "service completed unexpectedly");
                    exit_code = 1;
                }
                ServiceResult::Error(e) => {
                    error!(service = service_name, error = ?e, "service failed");
                    exit_code = 1;
                }
            }

            if let Err(pending) = service_manager.shutdown(shutdown_timeout).await {
                warn!(pending_count = pending.len(), pending_services = ?pending, "graceful shutdown elapsed with pending services");
                exit_code = if exit_code == 0 { 2 } else { exit_code };
            }
        }
        _ = ctrl_c => {
            info!("user requested shutdown via ctrl+c");
            if let Err(pending) = service_manager.shutdown(shutdown_timeout).await {
                warn!(pending_count = pending.len(), pending_services = ?pending, "graceful shutdown elapsed with pending services");
                exit_code = 2;
            }
        }
        _ = sigterm => {
            info!("system requested shutdown via SIGTERM");
            if let Err(pending) = service_manager.shutdown(shutdown_timeout).await {
                warn!(pending_count = pending.len(), pending_services = ?pending, "graceful shutdown elapsed with pending services");
                exit_code = 2;
            }
        }
    }

    info!(exit_code, "application shutdown complete");
    std::process::exit(exit_code);
}
