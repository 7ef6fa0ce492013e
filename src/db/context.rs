//! Database context with automatic event emission.

use sqlx::PgPool;
use std::sync::Arc;

use crate::db::audit_events::AuditEventOps;
use crate::db::items::JobItemOps;
use crate::db::jobs::JobOps;
use crate::db::search_events::SearchEventOps;
use crate::events::EventBuffer;

/// Database context that wraps the pool and the event buffer.
///
/// All operations that should emit a real-time event go through this
/// context, so the buffer publish always happens next to the write it
/// describes rather than scattered across callers.
#[derive(Clone)]
pub struct DbContext {
    pool: PgPool,
    events: Arc<EventBuffer>,
}

impl DbContext {
    pub fn new(pool: PgPool, events: Arc<EventBuffer>) -> Self {
        Self { pool, events }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn events(&self) -> &EventBuffer {
        &self.events
    }

    pub fn jobs(&self) -> JobOps<'_> {
        JobOps::new(self)
    }

    pub fn items(&self) -> JobItemOps<'_> {
        JobItemOps::new(self)
    }

    pub fn search_events(&self) -> SearchEventOps<'_> {
        SearchEventOps::new(self)
    }

    pub fn audit_events(&self) -> AuditEventOps<'_> {
        AuditEventOps::new(self)
    }
}
