#![cfg(feature = "postgres-tests")]

use chrono::{Duration, Utc};
use serde_json::json;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use codetop_core::ports::{BeginOutcome, IdempotencyRepository};
use codetop_storage::PgIdempotencyRepository;

const GRACE_SECS: i64 = 30;

fn protocol(e: anyhow::Error) -> sqlx::Error {
    sqlx::Error::Protocol(e.to_string())
}

#[sqlx::test(migrations = "./migrations")]
async fn first_claim_starts_then_replays_completed(pool: PgPool) -> Result<(), sqlx::Error> {
    let repo = PgIdempotencyRepository::new(pool.clone());
    let user = Uuid::new_v4();
    let now = Utc::now();

    let outcome = repo
        .begin("req-1", user, "review_submit", now, GRACE_SECS)
        .await
        .map_err(protocol)?;
    assert_eq!(outcome, BeginOutcome::Started);

    let result = json!({"cardId": "abc", "intervalDays": 3});
    repo.complete("req-1", user, "review_submit", &result)
        .await
        .map_err(protocol)?;

    // A resubmission long after the grace window still replays; COMPLETED
    // records are never taken over.
    let outcome = repo
        .begin(
            "req-1",
            user,
            "review_submit",
            now + Duration::seconds(120),
            GRACE_SECS,
        )
        .await
        .map_err(protocol)?;
    assert_eq!(outcome, BeginOutcome::Replayed(result));

    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
async fn duplicate_within_grace_is_rejected(pool: PgPool) -> Result<(), sqlx::Error> {
    let repo = PgIdempotencyRepository::new(pool.clone());
    let user = Uuid::new_v4();
    let now = Utc::now();

    let first = repo
        .begin("req-1", user, "review_submit", now, GRACE_SECS)
        .await
        .map_err(protocol)?;
    assert_eq!(first, BeginOutcome::Started);

    let duplicate = repo
        .begin(
            "req-1",
            user,
            "review_submit",
            now + Duration::seconds(5),
            GRACE_SECS,
        )
        .await
        .map_err(protocol)?;
    assert_eq!(duplicate, BeginOutcome::InFlight);

    // Same request id under a different user is an independent claim.
    let other_user = repo
        .begin("req-1", Uuid::new_v4(), "review_submit", now, GRACE_SECS)
        .await
        .map_err(protocol)?;
    assert_eq!(other_user, BeginOutcome::Started);

    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
async fn abandoned_claim_is_taken_over(pool: PgPool) -> Result<(), sqlx::Error> {
    let repo = PgIdempotencyRepository::new(pool.clone());
    let user = Uuid::new_v4();
    let t0 = Utc::now();

    repo.begin("req-1", user, "review_submit", t0, GRACE_SECS)
        .await
        .map_err(protocol)?;

    // Past the grace window the stale IN_PROGRESS claim must be retaken,
    // not wedged behind InFlight forever.
    let retaken = repo
        .begin(
            "req-1",
            user,
            "review_submit",
            t0 + Duration::seconds(GRACE_SECS + 10),
            GRACE_SECS,
        )
        .await
        .map_err(protocol)?;
    assert_eq!(retaken, BeginOutcome::Started);

    let row = sqlx::query(
        "SELECT attempt, status FROM idempotency_records \
         WHERE request_id = $1 AND user_id = $2 AND operation = $3",
    )
    .bind("req-1")
    .bind(user)
    .bind("review_submit")
    .fetch_one(&pool)
    .await?;
    let attempt: i32 = row.try_get("attempt")?;
    let status: String = row.try_get("status")?;
    assert_eq!(attempt, 1, "takeover must bump the claim counter");
    assert_eq!(status, "IN_PROGRESS");

    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
async fn takeover_cas_admits_exactly_one_competitor(pool: PgPool) -> Result<(), sqlx::Error> {
    let repo = PgIdempotencyRepository::new(pool.clone());
    let user = Uuid::new_v4();
    let t0 = Utc::now();

    repo.begin("req-1", user, "review_submit", t0, GRACE_SECS)
        .await
        .map_err(protocol)?;

    let stale_at = t0 + Duration::seconds(GRACE_SECS + 10);
    let winner = repo
        .begin("req-1", user, "review_submit", stale_at, GRACE_SECS)
        .await
        .map_err(protocol)?;
    assert_eq!(winner, BeginOutcome::Started);

    // A competitor that raced the winner holds the pre-takeover view
    // (attempt = 0); its CAS must find zero rows.
    let raced = sqlx::query(
        "UPDATE idempotency_records \
         SET status = 'IN_PROGRESS', created_at = $4, attempt = attempt + 1 \
         WHERE request_id = $1 AND user_id = $2 AND operation = $3 \
           AND status = 'IN_PROGRESS' AND attempt = 0",
    )
    .bind("req-1")
    .bind(user)
    .bind("review_submit")
    .bind(stale_at)
    .execute(&pool)
    .await?;
    assert_eq!(raced.rows_affected(), 0);

    // And through the repository, the loser now sees a live claim.
    let loser = repo
        .begin("req-1", user, "review_submit", stale_at, GRACE_SECS)
        .await
        .map_err(protocol)?;
    assert_eq!(loser, BeginOutcome::InFlight);

    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
async fn failed_claim_is_immediately_retryable(pool: PgPool) -> Result<(), sqlx::Error> {
    let repo = PgIdempotencyRepository::new(pool.clone());
    let user = Uuid::new_v4();
    let now = Utc::now();

    repo.begin("req-1", user, "review_submit", now, GRACE_SECS)
        .await
        .map_err(protocol)?;
    repo.fail("req-1", user, "review_submit", "TransientError")
        .await
        .map_err(protocol)?;

    // FAILED records skip the grace window entirely.
    let retry = repo
        .begin(
            "req-1",
            user,
            "review_submit",
            now + Duration::seconds(1),
            GRACE_SECS,
        )
        .await
        .map_err(protocol)?;
    assert_eq!(retry, BeginOutcome::Started);

    let row = sqlx::query(
        "SELECT error_class FROM idempotency_records \
         WHERE request_id = $1 AND user_id = $2 AND operation = $3",
    )
    .bind("req-1")
    .bind(user)
    .bind("review_submit")
    .fetch_one(&pool)
    .await?;
    let error_class: Option<String> = row.try_get("error_class")?;
    assert_eq!(error_class, None, "takeover must clear the stale failure");

    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
async fn purge_removes_only_expired_records(pool: PgPool) -> Result<(), sqlx::Error> {
    let repo = PgIdempotencyRepository::new(pool.clone());
    let user = Uuid::new_v4();
    let now = Utc::now();

    repo.begin("old", user, "review_submit", now - Duration::hours(48), GRACE_SECS)
        .await
        .map_err(protocol)?;
    repo.begin("fresh", user, "review_submit", now, GRACE_SECS)
        .await
        .map_err(protocol)?;

    let purged = repo
        .purge_older_than(now - Duration::hours(24))
        .await
        .map_err(protocol)?;
    assert_eq!(purged, 1);

    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM idempotency_records")
        .fetch_one(&pool)
        .await?;
    assert_eq!(remaining, 1);

    Ok(())
}
