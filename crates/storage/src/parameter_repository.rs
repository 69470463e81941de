//! User-parameter repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use codetop_core::ports::ParameterRepository;
use codetop_domain::UserParameters;

use crate::StorageError;

#[derive(Debug, Clone, sqlx::FromRow)]
struct ParameterRow {
    id: Uuid,
    user_id: Uuid,
    weights: serde_json::Value,
    request_retention: f64,
    maximum_interval: i32,
    is_active: bool,
    training_count: i32,
    optimized_at: Option<DateTime<Utc>>,
    performance_improvement: Option<f64>,
    created_at: DateTime<Utc>,
}

impl TryFrom<ParameterRow> for UserParameters {
    type Error = StorageError;

    fn try_from(row: ParameterRow) -> Result<Self, Self::Error> {
        let weights: Vec<f64> = serde_json::from_value(row.weights)
            .map_err(|e| StorageError::Decode(e.to_string()))?;
        let weights: [f64; 17] = weights.try_into().map_err(|v: Vec<f64>| {
            StorageError::Decode(format!("expected 17 weights, found {}", v.len()))
        })?;
        Ok(UserParameters {
            id: row.id,
            user_id: row.user_id,
            weights,
            request_retention: row.request_retention,
            maximum_interval: row.maximum_interval,
            is_active: row.is_active,
            training_count: row.training_count,
            optimized_at: row.optimized_at,
            performance_improvement: row.performance_improvement,
            created_at: row.created_at,
        })
    }
}

const PARAM_COLUMNS: &str = "id, user_id, weights, request_retention, maximum_interval, \
     is_active, training_count, optimized_at, performance_improvement, created_at";

#[derive(Clone)]
pub struct PgParameterRepository {
    pool: PgPool,
}

impl PgParameterRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn bind_insert<'q>(
        query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
        params: &'q UserParameters,
        weights: serde_json::Value,
    ) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
        query
            .bind(params.id)
            .bind(params.user_id)
            .bind(weights)
            .bind(params.request_retention)
            .bind(params.maximum_interval)
            .bind(params.is_active)
            .bind(params.training_count)
            .bind(params.optimized_at)
            .bind(params.performance_improvement)
            .bind(params.created_at)
    }
}

const INSERT_SQL: &str = r#"
    INSERT INTO user_parameters (id, user_id, weights, request_retention, maximum_interval,
                                 is_active, training_count, optimized_at,
                                 performance_improvement, created_at)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
"#;

#[async_trait]
impl ParameterRepository for PgParameterRepository {
    async fn get_active(&self, user_id: Uuid) -> anyhow::Result<Option<UserParameters>> {
        let row = sqlx::query_as::<_, ParameterRow>(&format!(
            "SELECT {PARAM_COLUMNS} FROM user_parameters \
             WHERE user_id = $1 AND is_active = TRUE AND deleted = FALSE"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(UserParameters::try_from).transpose()?)
    }

    async fn insert_initial(&self, params: &UserParameters) -> anyhow::Result<()> {
        let weights = serde_json::to_value(params.weights.to_vec())?;
        // Concurrent first reviews race on the partial unique index; the
        // loser's default row is identical, so the conflict is ignorable.
        let sql = format!("{INSERT_SQL} ON CONFLICT (user_id) WHERE is_active = TRUE DO NOTHING");
        Self::bind_insert(sqlx::query(&sql), params, weights)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn activate(&self, params: &UserParameters) -> anyhow::Result<()> {
        let weights = serde_json::to_value(params.weights.to_vec())?;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE user_parameters SET is_active = FALSE \
             WHERE user_id = $1 AND is_active = TRUE",
        )
        .bind(params.user_id)
        .execute(&mut *tx)
        .await?;

        Self::bind_insert(sqlx::query(INSERT_SQL), params, weights)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_reoptimization_candidates(
        &self,
        min_new_reviews: i32,
        limit: u32,
    ) -> anyhow::Result<Vec<Uuid>> {
        let user_ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT p.user_id
            FROM user_parameters p
            WHERE p.is_active = TRUE AND p.deleted = FALSE
              AND (
                  SELECT COUNT(*)
                  FROM review_logs r
                  WHERE r.user_id = p.user_id
                    AND (p.optimized_at IS NULL OR r.reviewed_at > p.optimized_at)
              ) >= $1
            ORDER BY p.optimized_at ASC NULLS FIRST
            LIMIT $2
            "#,
        )
        .bind(min_new_reviews as i64)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(user_ids)
    }
}
