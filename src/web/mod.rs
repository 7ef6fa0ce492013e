//! HTTP surface (C10): job lifecycle endpoints, keyset-paginated listings,
//! and process status/health.

pub mod error;
pub mod extractors;
pub mod items;
pub mod jobs;
pub mod routes;

pub use routes::create_router;
