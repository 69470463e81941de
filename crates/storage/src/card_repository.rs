//! Card and review-log repositories.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use codetop_core::ports::{CardRepository, ReviewLogRepository, StateCounts};
use codetop_domain::{Card, CardState, ReviewLog, ReviewType};

/// Card row from database.
#[derive(Debug, Clone, sqlx::FromRow)]
struct CardRow {
    id: Uuid,
    user_id: Uuid,
    problem_id: i64,
    state: String,
    difficulty: f64,
    stability: f64,
    review_count: i32,
    lapses: i32,
    last_review: Option<DateTime<Utc>>,
    next_review: Option<DateTime<Utc>>,
    interval_days: i32,
    last_rating: i32,
    deleted: bool,
    created_at: DateTime<Utc>,
}

impl From<CardRow> for Card {
    fn from(row: CardRow) -> Self {
        Card {
            id: row.id,
            user_id: row.user_id,
            problem_id: row.problem_id,
            state: CardState::parse(&row.state),
            difficulty: row.difficulty,
            stability: row.stability,
            review_count: row.review_count,
            lapses: row.lapses,
            last_review: row.last_review,
            next_review: row.next_review,
            interval_days: row.interval_days,
            last_rating: row.last_rating,
            deleted: row.deleted,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct ReviewLogRow {
    id: Uuid,
    user_id: Uuid,
    problem_id: i64,
    card_id: Uuid,
    rating: i32,
    elapsed_days: f64,
    review_type: String,
    old_state: String,
    new_state: String,
    old_stability: f64,
    new_stability: f64,
    reviewed_at: DateTime<Utc>,
}

impl From<ReviewLogRow> for ReviewLog {
    fn from(row: ReviewLogRow) -> Self {
        ReviewLog {
            id: row.id,
            user_id: row.user_id,
            problem_id: row.problem_id,
            card_id: row.card_id,
            rating: row.rating,
            elapsed_days: row.elapsed_days,
            review_type: ReviewType::parse(&row.review_type),
            old_state: CardState::parse(&row.old_state),
            new_state: CardState::parse(&row.new_state),
            old_stability: row.old_stability,
            new_stability: row.new_stability,
            reviewed_at: row.reviewed_at,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct CountsRow {
    due_now: i64,
    learning: i64,
    review: i64,
    relearning: i64,
    total_cards: i64,
}

const CARD_COLUMNS: &str = "id, user_id, problem_id, state, difficulty, stability, review_count, \
     lapses, last_review, next_review, interval_days, last_rating, deleted, created_at";

/// Card repository.
#[derive(Clone)]
pub struct PgCardRepository {
    pool: PgPool,
}

impl PgCardRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CardRepository for PgCardRepository {
    async fn get_card(&self, user_id: Uuid, problem_id: i64) -> anyhow::Result<Option<Card>> {
        let row = sqlx::query_as::<_, CardRow>(&format!(
            "SELECT {CARD_COLUMNS} FROM cards \
             WHERE user_id = $1 AND problem_id = $2 AND deleted = FALSE"
        ))
        .bind(user_id)
        .bind(problem_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Card::from))
    }

    async fn save_review(&self, card: &Card, log: &ReviewLog) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        // Serialize concurrent submissions on the same card. New cards have
        // no row yet; the unique constraint arbitrates their insert race.
        sqlx::query("SELECT id FROM cards WHERE user_id = $1 AND problem_id = $2 FOR UPDATE")
            .bind(card.user_id)
            .bind(card.problem_id)
            .fetch_optional(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO cards (id, user_id, problem_id, state, difficulty, stability,
                               review_count, lapses, last_review, next_review,
                               interval_days, last_rating, deleted, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (user_id, problem_id) DO UPDATE SET
                state = EXCLUDED.state,
                difficulty = EXCLUDED.difficulty,
                stability = EXCLUDED.stability,
                review_count = EXCLUDED.review_count,
                lapses = EXCLUDED.lapses,
                last_review = EXCLUDED.last_review,
                next_review = EXCLUDED.next_review,
                interval_days = EXCLUDED.interval_days,
                last_rating = EXCLUDED.last_rating
            "#,
        )
        .bind(card.id)
        .bind(card.user_id)
        .bind(card.problem_id)
        .bind(card.state.as_str())
        .bind(card.difficulty)
        .bind(card.stability)
        .bind(card.review_count)
        .bind(card.lapses)
        .bind(card.last_review)
        .bind(card.next_review)
        .bind(card.interval_days)
        .bind(card.last_rating)
        .bind(card.deleted)
        .bind(card.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO review_logs (id, user_id, problem_id, card_id, rating, elapsed_days,
                                     review_type, old_state, new_state, old_stability,
                                     new_stability, reviewed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(log.id)
        .bind(log.user_id)
        .bind(log.problem_id)
        .bind(log.card_id)
        .bind(log.rating)
        .bind(log.elapsed_days)
        .bind(log.review_type.as_str())
        .bind(log.old_state.as_str())
        .bind(log.new_state.as_str())
        .bind(log.old_stability)
        .bind(log.new_stability)
        .bind(log.reviewed_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_due(
        &self,
        user_id: Uuid,
        states: &[CardState],
        due_before: DateTime<Utc>,
        limit: u32,
    ) -> anyhow::Result<Vec<Card>> {
        let state_names: Vec<String> = states.iter().map(|s| s.as_str().to_string()).collect();
        let rows = sqlx::query_as::<_, CardRow>(&format!(
            "SELECT {CARD_COLUMNS} FROM cards \
             WHERE user_id = $1 AND state = ANY($2) AND deleted = FALSE \
               AND next_review IS NOT NULL AND next_review <= $3 \
             ORDER BY next_review ASC, problem_id ASC \
             LIMIT $4"
        ))
        .bind(user_id)
        .bind(&state_names)
        .bind(due_before)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Card::from).collect())
    }

    async fn list_mastered(
        &self,
        user_id: Uuid,
        min_stability: f64,
        limit: u32,
    ) -> anyhow::Result<Vec<Card>> {
        let rows = sqlx::query_as::<_, CardRow>(&format!(
            "SELECT {CARD_COLUMNS} FROM cards \
             WHERE user_id = $1 AND stability >= $2 AND deleted = FALSE \
             ORDER BY stability DESC, problem_id ASC \
             LIMIT $3"
        ))
        .bind(user_id)
        .bind(min_stability)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Card::from).collect())
    }

    async fn state_counts(&self, user_id: Uuid, now: DateTime<Utc>) -> anyhow::Result<StateCounts> {
        let row = sqlx::query_as::<_, CountsRow>(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE next_review IS NOT NULL AND next_review <= $2) AS due_now,
                COUNT(*) FILTER (WHERE state = 'LEARNING') AS learning,
                COUNT(*) FILTER (WHERE state = 'REVIEW') AS review,
                COUNT(*) FILTER (WHERE state = 'RELEARNING') AS relearning,
                COUNT(*) AS total_cards
            FROM cards
            WHERE user_id = $1 AND deleted = FALSE
            "#,
        )
        .bind(user_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(StateCounts {
            due_now: row.due_now,
            learning: row.learning,
            review: row.review,
            relearning: row.relearning,
            total_cards: row.total_cards,
        })
    }
}

const LOG_COLUMNS: &str = "id, user_id, problem_id, card_id, rating, elapsed_days, review_type, \
     old_state, new_state, old_stability, new_stability, reviewed_at";

/// Review-log repository. Logs are append-only; the insert lives inside
/// the card transaction in `PgCardRepository::save_review`.
#[derive(Clone)]
pub struct PgReviewLogRepository {
    pool: PgPool,
}

impl PgReviewLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReviewLogRepository for PgReviewLogRepository {
    async fn list_recent(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
        limit: u32,
    ) -> anyhow::Result<Vec<ReviewLog>> {
        let rows = sqlx::query_as::<_, ReviewLogRow>(&format!(
            "SELECT {LOG_COLUMNS} FROM review_logs \
             WHERE user_id = $1 AND reviewed_at >= $2 \
             ORDER BY reviewed_at DESC \
             LIMIT $3"
        ))
        .bind(user_id)
        .bind(since)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ReviewLog::from).collect())
    }

    async fn list_for_training(&self, user_id: Uuid, limit: u32) -> anyhow::Result<Vec<ReviewLog>> {
        // Training rows need finite memory fields; NaN/Inf never enter via
        // the write path, so column presence is the only filter here.
        let rows = sqlx::query_as::<_, ReviewLogRow>(&format!(
            "SELECT {LOG_COLUMNS} FROM review_logs \
             WHERE user_id = $1 \
             ORDER BY reviewed_at DESC \
             LIMIT $2"
        ))
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ReviewLog::from).collect())
    }

    async fn count_for_user(&self, user_id: Uuid) -> anyhow::Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM review_logs WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn count_since(&self, user_id: Uuid, since: DateTime<Utc>) -> anyhow::Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM review_logs WHERE user_id = $1 AND reviewed_at > $2",
        )
        .bind(user_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}
