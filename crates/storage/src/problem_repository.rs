//! Problem repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use codetop_core::ports::ProblemRepository;
use codetop_domain::{Problem, ProblemDifficulty};

#[derive(Debug, Clone, sqlx::FromRow)]
struct ProblemRow {
    id: i64,
    title: String,
    difficulty: String,
    tags: Vec<String>,
    categories: Vec<String>,
    deleted: bool,
    created_at: DateTime<Utc>,
}

impl From<ProblemRow> for Problem {
    fn from(row: ProblemRow) -> Self {
        Problem {
            id: row.id,
            title: row.title,
            difficulty: ProblemDifficulty::parse(&row.difficulty),
            tags: row.tags,
            categories: row.categories,
            deleted: row.deleted,
            created_at: row.created_at,
        }
    }
}

const PROBLEM_COLUMNS: &str = "id, title, difficulty, tags, categories, deleted, created_at";

#[derive(Clone)]
pub struct PgProblemRepository {
    pool: PgPool,
}

impl PgProblemRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProblemRepository for PgProblemRepository {
    async fn get(&self, problem_id: i64) -> anyhow::Result<Option<Problem>> {
        let row = sqlx::query_as::<_, ProblemRow>(&format!(
            "SELECT {PROBLEM_COLUMNS} FROM problems WHERE id = $1 AND deleted = FALSE"
        ))
        .bind(problem_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Problem::from))
    }

    async fn get_many(&self, problem_ids: &[i64]) -> anyhow::Result<Vec<Problem>> {
        if problem_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, ProblemRow>(&format!(
            "SELECT {PROBLEM_COLUMNS} FROM problems WHERE id = ANY($1) AND deleted = FALSE"
        ))
        .bind(problem_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Problem::from).collect())
    }

    async fn list_unseen(&self, user_id: Uuid, limit: u32) -> anyhow::Result<Vec<Problem>> {
        let rows = sqlx::query_as::<_, ProblemRow>(&format!(
            "SELECT {PROBLEM_COLUMNS} FROM problems p \
             WHERE p.deleted = FALSE \
               AND NOT EXISTS ( \
                   SELECT 1 FROM cards c \
                   WHERE c.user_id = $1 AND c.problem_id = p.id AND c.deleted = FALSE \
               ) \
             ORDER BY p.created_at ASC, p.id ASC \
             LIMIT $2"
        ))
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Problem::from).collect())
    }
}
