#![cfg(feature = "postgres-tests")]

use chrono::{Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use codetop_core::ports::{CardRepository, ReviewLogRepository};
use codetop_storage::{PgCardRepository, PgReviewLogRepository};
use codetop_domain::{Card, CardState, ReviewLog, ReviewType};

fn protocol(e: anyhow::Error) -> sqlx::Error {
    sqlx::Error::Protocol(e.to_string())
}

fn reviewed_card(user_id: Uuid, problem_id: i64, state: CardState, stability: f64) -> Card {
    let now = Utc::now();
    let mut card = Card::new(user_id, problem_id, now);
    card.state = state;
    card.stability = stability;
    card.difficulty = 5.0;
    card.review_count = 1;
    card.last_review = Some(now);
    card.next_review = Some(now - Duration::days(problem_id));
    card.interval_days = 1;
    card.last_rating = 3;
    card
}

fn log_for(card: &Card, rating: i32) -> ReviewLog {
    ReviewLog {
        id: Uuid::new_v4(),
        user_id: card.user_id,
        problem_id: card.problem_id,
        card_id: card.id,
        rating,
        elapsed_days: 2.0,
        review_type: ReviewType::Scheduled,
        old_state: CardState::New,
        new_state: card.state,
        old_stability: 0.0,
        new_stability: card.stability,
        reviewed_at: Utc::now(),
    }
}

#[sqlx::test(migrations = "./migrations")]
async fn save_review_upserts_card_and_appends_log(pool: PgPool) -> Result<(), sqlx::Error> {
    let cards = PgCardRepository::new(pool.clone());
    let logs = PgReviewLogRepository::new(pool.clone());
    let user = Uuid::new_v4();

    // First submission inserts through the ON CONFLICT arm's insert path.
    let mut card = reviewed_card(user, 7, CardState::Learning, 2.4);
    cards
        .save_review(&card, &log_for(&card, 3))
        .await
        .map_err(protocol)?;

    // Second submission for the same (user, problem) updates in place.
    card.state = CardState::Review;
    card.stability = 5.8;
    card.review_count = 2;
    card.lapses = 0;
    cards
        .save_review(&card, &log_for(&card, 4))
        .await
        .map_err(protocol)?;

    let loaded = cards
        .get_card(user, 7)
        .await
        .map_err(protocol)?
        .expect("card should exist");
    assert_eq!(loaded.id, card.id);
    assert_eq!(loaded.state, CardState::Review);
    assert_eq!(loaded.review_count, 2);
    assert!((loaded.stability - 5.8).abs() < 1e-9);

    // Both logs appended; none overwritten.
    let count = logs.count_for_user(user).await.map_err(protocol)?;
    assert_eq!(count, 2);

    let card_rows: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM cards WHERE user_id = $1 AND problem_id = 7")
            .bind(user)
            .fetch_one(&pool)
            .await?;
    assert_eq!(card_rows, 1, "upsert must not duplicate the card row");

    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
async fn list_due_filters_by_state_and_orders_by_due_date(
    pool: PgPool,
) -> Result<(), sqlx::Error> {
    let cards = PgCardRepository::new(pool.clone());
    let user = Uuid::new_v4();

    // problem_id doubles as days-overdue, so 3 is the most overdue.
    for (problem_id, state) in [
        (1, CardState::Review),
        (2, CardState::Learning),
        (3, CardState::Review),
    ] {
        let card = reviewed_card(user, problem_id, state, 4.0);
        cards
            .save_review(&card, &log_for(&card, 3))
            .await
            .map_err(protocol)?;
    }

    let due = cards
        .list_due(user, &[CardState::Review], Utc::now(), 10)
        .await
        .map_err(protocol)?;
    let problem_ids: Vec<i64> = due.iter().map(|c| c.problem_id).collect();
    assert_eq!(problem_ids, vec![3, 1], "earliest due date first, learning excluded");

    let learning = cards
        .list_due(
            user,
            &[CardState::Learning, CardState::Relearning],
            Utc::now(),
            10,
        )
        .await
        .map_err(protocol)?;
    assert_eq!(learning.len(), 1);
    assert_eq!(learning[0].problem_id, 2);

    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
async fn state_counts_and_mastered_listing(pool: PgPool) -> Result<(), sqlx::Error> {
    let cards = PgCardRepository::new(pool.clone());
    let user = Uuid::new_v4();

    for (problem_id, state, stability) in [
        (1, CardState::Learning, 0.5),
        (2, CardState::Review, 30.0),
        (3, CardState::Review, 45.0),
        (4, CardState::Relearning, 2.0),
    ] {
        let card = reviewed_card(user, problem_id, state, stability);
        cards
            .save_review(&card, &log_for(&card, 3))
            .await
            .map_err(protocol)?;
    }

    let counts = cards
        .state_counts(user, Utc::now())
        .await
        .map_err(protocol)?;
    assert_eq!(counts.total_cards, 4);
    assert_eq!(counts.learning, 1);
    assert_eq!(counts.review, 2);
    assert_eq!(counts.relearning, 1);
    assert_eq!(counts.due_now, 4);

    // Another user's cards are invisible.
    let other = cards
        .state_counts(Uuid::new_v4(), Utc::now())
        .await
        .map_err(protocol)?;
    assert_eq!(other.total_cards, 0);

    let mastered = cards
        .list_mastered(user, 21.0, 10)
        .await
        .map_err(protocol)?;
    let problem_ids: Vec<i64> = mastered.iter().map(|c| c.problem_id).collect();
    assert_eq!(problem_ids, vec![3, 2], "most stable first, floor applied");

    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
async fn training_window_returns_newest_first(pool: PgPool) -> Result<(), sqlx::Error> {
    let cards = PgCardRepository::new(pool.clone());
    let logs = PgReviewLogRepository::new(pool.clone());
    let user = Uuid::new_v4();

    // Review ages 10, 8, 6, 4, 2 days; three fall inside a 7-day window.
    let card = reviewed_card(user, 1, CardState::Review, 4.0);
    for i in 0..5i64 {
        let mut log = log_for(&card, 3);
        log.reviewed_at = Utc::now() - Duration::days(10 - 2 * i);
        cards.save_review(&card, &log).await.map_err(protocol)?;
    }

    let window = logs.list_for_training(user, 3).await.map_err(protocol)?;
    assert_eq!(window.len(), 3);
    assert!(window[0].reviewed_at >= window[1].reviewed_at);
    assert!(window[1].reviewed_at >= window[2].reviewed_at);

    let since = Utc::now() - Duration::days(7);
    let recent = logs.list_recent(user, since, 10).await.map_err(protocol)?;
    assert_eq!(recent.len(), 3, "only logs inside the window");

    Ok(())
}
