//! Application state shared by the HTTP layer (C13) and the worker kickoff
//! path (C4), built once in `main` and cloned cheaply into every handler.

use std::sync::Arc;

use crate::adapters::FileParser;
use crate::config::{AuthConfig, IngestConfig, WorkerConfig};
use crate::db::DbContext;
use crate::status::ServiceStatusRegistry;
use crate::worker::PricingDeps;

#[derive(Clone)]
pub struct AppState {
    pub db: DbContext,
    pub auth: Arc<AuthConfig>,
    pub ingest_config: Arc<IngestConfig>,
    pub worker_config: Arc<WorkerConfig>,
    pub pricing_deps: PricingDeps,
    pub file_parser: Arc<dyn FileParser>,
    /// Stable identity this process claims items under; carried on every
    /// `kickoff` call so a crashed process's locks are attributable to it.
    pub worker_id: Arc<str>,
    pub service_statuses: ServiceStatusRegistry,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: DbContext,
        auth: Arc<AuthConfig>,
        ingest_config: Arc<IngestConfig>,
        worker_config: Arc<WorkerConfig>,
        pricing_deps: PricingDeps,
        file_parser: Arc<dyn FileParser>,
        worker_id: Arc<str>,
        service_statuses: ServiceStatusRegistry,
    ) -> Self {
        Self {
            db,
            auth,
            ingest_config,
            worker_config,
            pricing_deps,
            file_parser,
            worker_id,
            service_statuses,
        }
    }
}
