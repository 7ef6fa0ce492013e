//! Integration tests for claim/checkpoint lock semantics and keyset listing.

use std::sync::Arc;
use std::time::Duration;

use claimpricer::db::{CheckpointOutcome, DbContext, ReprocessScope};
use claimpricer::domain::model::{JobItemStatus, JobType, MatchQuality};
use claimpricer::events::{DomainEvent, EventBuffer, ItemEvent};

mod helpers;

fn ctx(pool: sqlx::PgPool) -> DbContext {
    DbContext::new(pool, Arc::new(EventBuffer::new(256)))
}

#[sqlx::test]
async fn claim_items_is_atomic_under_skip_locked(pool: sqlx::PgPool) {
    let job_id = helpers::insert_job(&pool, "owner-a", "SINGLE", "RUNNING").await;
    for _ in 0..5 {
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
    }

    let ctx = ctx(pool.clone());
    let a = ctx.items().claim_items(job_id, "worker-a", 3, Duration::from_secs(30)).await.unwrap();
    let b = ctx.items().claim_items(job_id, "worker-b", 3, Duration::from_secs(30)).await.unwrap();

    assert_eq!(a.len(), 3);
    assert_eq!(b.len(), 2);

    let a_ids: std::collections::HashSet<_> = a.iter().map(|i| i.id).collect();
    let b_ids: std::collections::HashSet<_> = b.iter().map(|i| i.id).collect();
    assert!(a_ids.is_disjoint(&b_ids));
}

#[sqlx::test]
async fn stale_lock_is_stolen_and_original_checkpoint_is_rejected(pool: sqlx::PgPool) {
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

    // worker-a claims with a lock_ttl of zero, so it is immediately stale.
    let claimed = ctx.items().claim_items(job_id, "worker-a", 1, Duration::from_secs(0)).await.unwrap();
    assert_eq!(claimed.len(), 1);
    let item_id = claimed[0].id;

    // worker-b now sees it as eligible (PROCESSING past its ttl) and steals it.
    let stolen = ctx.items().claim_items(job_id, "worker-b", 1, Duration::from_secs(0)).await.unwrap();
    assert_eq!(stolen.len(), 1);
    assert_eq!(stolen[0].id, item_id);

    // worker-a's checkpoint must be rejected: it no longer holds the lock.
    let outcome = ctx
        .items()
        .checkpoint_item(item_id, job_id, "worker-a", JobItemStatus::Done, None, None, None)
        .await
        .unwrap();
    assert_eq!(outcome, CheckpointOutcome::StaleLock);

    // worker-b's checkpoint applies.
    let outcome = ctx
        .items()
        .checkpoint_item(item_id, job_id, "worker-b", JobItemStatus::Done, None, None, None)
        .await
        .unwrap();
    assert_eq!(outcome, CheckpointOutcome::Applied);
}

#[sqlx::test]
async fn checkpoint_bumps_attempts_only_for_error_and_not_found(pool: sqlx::PgPool) {
    let job_id = helpers::insert_job(&pool, "owner-a", "SINGLE", "RUNNING").await;
    let ctx = ctx(pool.clone());

    let item_id = helpers::insert_item(
        &pool,
        job_id,
        "owner-a",
        "SINGLE",
        "PROCESSING",
        helpers::sample_input("Lamp", "Ikea"),
        Some("worker-a"),
        Some(chrono::Utc::now()),
    )
    .await;

    ctx.items()
        .checkpoint_item(item_id, job_id, "worker-a", JobItemStatus::Error, None, None, Some("boom"))
        .await
        .unwrap();

    let item = ctx.items().get_item(item_id).await.unwrap().unwrap();
    assert_eq!(item.attempts, 1);
    assert_eq!(item.status, JobItemStatus::Error);
}

#[sqlx::test]
async fn list_items_paginates_in_updated_at_id_order(pool: sqlx::PgPool) {
    let job_id = helpers::insert_job(&pool, "owner-a", "SINGLE", "RUNNING").await;
    let ctx = ctx(pool.clone());

    for i in 0..5 {
        helpers::insert_item(
            &pool,
            job_id,
            "owner-a",
            "SINGLE",
            "PENDING",
            helpers::sample_input(&format!("Item {i}"), "Acme"),
            None,
            None,
        )
        .await;
    }

    let first_page = ctx.items().list_items(job_id, None, 2).await.unwrap();
    assert_eq!(first_page.items.len(), 2);
    let cursor = first_page.next_cursor.expect("page has a cursor");

    let second_page = ctx.items().list_items(job_id, Some(&cursor), 2).await.unwrap();
    assert_eq!(second_page.items.len(), 2);

    let first_ids: Vec<_> = first_page.items.iter().map(|i| i.id).collect();
    let second_ids: Vec<_> = second_page.items.iter().map(|i| i.id).collect();
    assert!(first_ids.iter().all(|id| !second_ids.contains(id)));
}

#[sqlx::test]
async fn malformed_cursor_restarts_from_the_beginning(pool: sqlx::PgPool) {
    let job_id = helpers::insert_job(&pool, "owner-a", "SINGLE", "RUNNING").await;
    let ctx = ctx(pool.clone());

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

    let with_garbage = ctx.items().list_items(job_id, Some("not-a-real-cursor"), 10).await.unwrap();
    let from_scratch = ctx.items().list_items(job_id, None, 10).await.unwrap();
    assert_eq!(with_garbage.items.len(), from_scratch.items.len());
}

#[sqlx::test]
async fn reprocess_excludes_processing_items(pool: sqlx::PgPool) {
    let job_id = helpers::insert_job(&pool, "owner-a", "SINGLE", "RUNNING").await;
    let ctx = ctx(pool.clone());

    let error_item = helpers::insert_item(
        &pool,
        job_id,
        "owner-a",
        "SINGLE",
        "ERROR",
        helpers::sample_input("Lamp", "Ikea"),
        None,
        None,
    )
    .await;
    let processing_item = helpers::insert_item(
        &pool,
        job_id,
        "owner-a",
        "SINGLE",
        "PROCESSING",
        helpers::sample_input("Chair", "Ikea"),
        Some("worker-a"),
        Some(chrono::Utc::now()),
    )
    .await;

    let affected = ctx.items().reprocess(job_id, ReprocessScope::ErrorsOnly, false, 5, 2).await.unwrap();
    assert_eq!(affected, 1);

    let error_item = ctx.items().get_item(error_item).await.unwrap().unwrap();
    assert_eq!(error_item.status, JobItemStatus::Pending);

    let processing_item = ctx.items().get_item(processing_item).await.unwrap().unwrap();
    assert_eq!(processing_item.status, JobItemStatus::Processing);
}

#[sqlx::test]
async fn checkpoint_publishes_the_result_jsons_actual_match_quality(pool: sqlx::PgPool) {
    let job_id = helpers::insert_job(&pool, "owner-a", "SINGLE", "RUNNING").await;
    let events = Arc::new(EventBuffer::new(256));
    let ctx = DbContext::new(pool.clone(), events.clone());

    let item_id = helpers::insert_item(
        &pool,
        job_id,
        "owner-a",
        "SINGLE",
        "PROCESSING",
        helpers::sample_input("Lamp", "Ikea"),
        Some("worker-a"),
        Some(chrono::Utc::now()),
    )
    .await;

    let (cursor, _) = events.subscribe();
    let result_json = serde_json::json!({
        "price": 42.0,
        "currency": "USD",
        "source": "retailer.example",
        "url": "https://retailer.example/dp/X",
        "match_quality": "trusted",
        "is_estimated": false,
    });

    ctx.items()
        .checkpoint_item(item_id, job_id, "worker-a", JobItemStatus::Done, None, Some(&result_json), None)
        .await
        .unwrap();

    let event = events.read(cursor).expect("resolved event published");
    match event {
        DomainEvent::Item(ItemEvent::Resolved { match_quality, .. }) => {
            assert_eq!(match_quality, MatchQuality::Trusted);
        }
        other => panic!("expected ItemEvent::Resolved, got {other:?}"),
    }
}

#[sqlx::test]
async fn reprocess_all_skips_done_items_and_items_past_their_attempt_cap(pool: sqlx::PgPool) {
    let job_id = helpers::insert_job(&pool, "owner-a", "SINGLE", "RUNNING").await;
    let ctx = ctx(pool.clone());

    let done_item = helpers::insert_item(
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
    let error_item = helpers::insert_item(
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
    let exhausted_not_found = helpers::insert_item(
        &pool,
        job_id,
        "owner-a",
        "SINGLE",
        "NOT_FOUND",
        helpers::sample_input("Desk", "Ikea"),
        None,
        None,
    )
    .await;
    sqlx::query("UPDATE job_items SET attempts = $2 WHERE id = $1")
        .bind(exhausted_not_found)
        .bind(2i32)
        .execute(&pool)
        .await
        .unwrap();

    // max_attempts_error=5, max_attempts_not_found=2: the NOT_FOUND item has
    // already reached the cap and must not be requeued.
    let affected = ctx.items().reprocess(job_id, ReprocessScope::All, false, 5, 2).await.unwrap();
    assert_eq!(affected, 1);

    let done_item = ctx.items().get_item(done_item).await.unwrap().unwrap();
    assert_eq!(done_item.status, JobItemStatus::Done);

    let error_item = ctx.items().get_item(error_item).await.unwrap().unwrap();
    assert_eq!(error_item.status, JobItemStatus::Pending);

    let exhausted_not_found = ctx.items().get_item(exhausted_not_found).await.unwrap().unwrap();
    assert_eq!(exhausted_not_found.status, JobItemStatus::NotFound);
}

#[sqlx::test]
async fn list_pending_filters_by_owner_and_status(pool: sqlx::PgPool) {
    let job_a = helpers::insert_job(&pool, "owner-a", "SINGLE", "RUNNING").await;
    let job_b = helpers::insert_job(&pool, "owner-b", "SINGLE", "RUNNING").await;
    let ctx = ctx(pool.clone());

    helpers::insert_item(
        &pool,
        job_a,
        "owner-a",
        "SINGLE",
        "ERROR",
        helpers::sample_input("Lamp", "Ikea"),
        None,
        None,
    )
    .await;
    helpers::insert_item(
        &pool,
        job_b,
        "owner-b",
        "SINGLE",
        "ERROR",
        helpers::sample_input("Chair", "Ikea"),
        None,
        None,
    )
    .await;

    let page = ctx
        .items()
        .list_pending(Some("owner-a"), Some(&[JobItemStatus::Error]), Some(JobType::Single), None, 10)
        .await
        .unwrap();

    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].job_id, job_a);
}
