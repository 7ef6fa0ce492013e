use chrono::{DateTime, Utc};
use sqlx::PgPool;

/// Insert a job row directly via SQL, returning the generated ID.
pub async fn insert_job(pool: &PgPool, owner_id: &str, job_type: &str, queue_state: &str) -> i64 {
    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO jobs (owner_id, job_type, queue_state) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(owner_id)
    .bind(job_type)
    .bind(queue_state)
    .fetch_one(pool)
    .await
    .expect("insert_job failed");

    id
}

/// Insert a job item row directly via SQL, returning the generated ID.
#[allow(clippy::too_many_arguments)]
pub async fn insert_item(
    pool: &PgPool,
    job_id: i64,
    owner_id: &str,
    job_type: &str,
    status: &str,
    input_json: serde_json::Value,
    locked_by: Option<&str>,
    locked_at: Option<DateTime<Utc>>,
) -> i64 {
    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO job_items (job_id, owner_id, job_type, status, input_json, locked_by, locked_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING id",
    )
    .bind(job_id)
    .bind(owner_id)
    .bind(job_type)
    .bind(status)
    .bind(input_json)
    .bind(locked_by)
    .bind(locked_at)
    .fetch_one(pool)
    .await
    .expect("insert_item failed");

    id
}

/// A minimal normalized descriptor for item fixtures that need one.
pub fn sample_input(title: &str, brand: &str) -> serde_json::Value {
    serde_json::json!({ "title": title, "brand": brand })
}
