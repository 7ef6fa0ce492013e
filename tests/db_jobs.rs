//! Integration tests for job lifecycle operations and counter recomputation.

use std::sync::Arc;

use claimpricer::db::DbContext;
use claimpricer::domain::model::QueueState;
use claimpricer::events::EventBuffer;

mod helpers;

fn ctx(pool: sqlx::PgPool) -> DbContext {
    DbContext::new(pool, Arc::new(EventBuffer::new(256)))
}

#[sqlx::test]
async fn recompute_counters_reflects_item_status_histogram(pool: sqlx::PgPool) {
    let job_id = helpers::insert_job(&pool, "owner-a", "SINGLE", "RUNNING").await;
    helpers::insert_item(
        &pool,
        job_id,
        "owner-a",
        "SINGLE",
        "DONE",
        helpers::sample_input("Lamp", "Ikea"),
        None,
        None,
    )
    .await;
    helpers::insert_item(
        &pool,
        job_id,
        "owner-a",
        "SINGLE",
        "ERROR",
        helpers::sample_input("Chair", "Ikea"),
        None,
        None,
    )
    .await;
    helpers::insert_item(
        &pool,
        job_id,
        "owner-a",
        "SINGLE",
        "PENDING",
        helpers::sample_input("Desk", "Ikea"),
        None,
        None,
    )
    .await;

    let ctx = ctx(pool.clone());
    let job = ctx.jobs().recompute_counters(job_id).await.unwrap();

    assert_eq!(job.total_items, 3);
    assert_eq!(job.processed_items, 1);
    assert_eq!(job.failed_items, 1);
    assert_eq!(job.queue_state, QueueState::Running);
    // processed_items + failed_items + (pending+processing) == total_items, always.
    assert_eq!(job.processed_items + job.failed_items + 1, job.total_items);
}

#[sqlx::test]
async fn recompute_counters_transitions_to_done_when_complete(pool: sqlx::PgPool) {
    let job_id = helpers::insert_job(&pool, "owner-a", "SINGLE", "RUNNING").await;
    helpers::insert_item(
        &pool,
        job_id,
        "owner-a",
        "SINGLE",
        "DONE",
        helpers::sample_input("Lamp", "Ikea"),
        None,
        None,
    )
    .await;

    let ctx = ctx(pool.clone());
    let job = ctx.jobs().recompute_counters(job_id).await.unwrap();

    assert_eq!(job.queue_state, QueueState::Done);
}

#[sqlx::test]
async fn recompute_counters_leaves_job_running_with_pending_items(pool: sqlx::PgPool) {
    let job_id = helpers::insert_job(&pool, "owner-a", "SINGLE", "RUNNING").await;
    helpers::insert_item(
        &pool,
        job_id,
        "owner-a",
        "SINGLE",
        "PENDING",
        helpers::sample_input("Lamp", "Ikea"),
        None,
        None,
    )
    .await;

    let ctx = ctx(pool.clone());
    let job = ctx.jobs().recompute_counters(job_id).await.unwrap();

    assert_eq!(job.queue_state, QueueState::Running);
    assert_eq!(job.processed_items, 0);
}

#[sqlx::test]
async fn transition_updates_queue_state(pool: sqlx::PgPool) {
    let job_id = helpers::insert_job(&pool, "owner-a", "SINGLE", "RUNNING").await;
    let ctx = ctx(pool.clone());

    ctx.jobs().transition(job_id, QueueState::Paused).await.unwrap();

    let job = ctx.jobs().get_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.queue_state, QueueState::Paused);
}
