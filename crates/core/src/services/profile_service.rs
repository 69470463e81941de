/// Cached user-profile computation.
///
/// Cache-aside over the profiler: read the 1h-TTL entry, rebuild from the
/// review window on miss. `ReviewCompleted` events evict the entry via the
/// cache invalidator, so a fresh profile follows the next read after any
/// review.
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use codetop_config::CacheTtlConfig;
use codetop_domain::Problem;
use uuid::Uuid;

use crate::cache::{keys, CacheStore};
use crate::ports::{ProblemRepository, ReviewLogRepository};
use crate::profile::{UserProfile, UserProfiler};

pub struct ProfileService {
    logs: Arc<dyn ReviewLogRepository>,
    problems: Arc<dyn ProblemRepository>,
    profiler: UserProfiler,
    cache: CacheStore,
    ttl: Duration,
}

impl ProfileService {
    pub fn new(
        logs: Arc<dyn ReviewLogRepository>,
        problems: Arc<dyn ProblemRepository>,
        profiler: UserProfiler,
        cache: CacheStore,
        ttl_config: &CacheTtlConfig,
    ) -> Self {
        Self {
            logs,
            problems,
            profiler,
            cache,
            ttl: Duration::from_secs(ttl_config.user_profile_secs),
        }
    }

    pub async fn get(&self, user_id: Uuid, now: DateTime<Utc>) -> anyhow::Result<UserProfile> {
        let key = keys::user_profile(user_id);
        if let Some(profile) = self.cache.get::<UserProfile>(&key) {
            return Ok(profile);
        }

        let config = self.profiler.config();
        let since = now - chrono::Duration::days(config.window_days);
        let logs = self
            .logs
            .list_recent(user_id, since, config.max_logs as u32)
            .await?;

        let problem_ids: Vec<i64> = logs
            .iter()
            .map(|log| log.problem_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let problems: HashMap<i64, Problem> = self
            .problems
            .get_many(&problem_ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let profile = self.profiler.build(user_id, &logs, &problems, now);
        self.cache.put(&key, &profile, self.ttl);
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Metrics;
    use crate::ports::{MockProblemRepository, MockReviewLogRepository};
    use codetop_config::ProfilerConfig;
    use codetop_domain::{CardState, ProblemDifficulty, ReviewLog, ReviewType};

    fn service(logs: MockReviewLogRepository, problems: MockProblemRepository) -> ProfileService {
        ProfileService::new(
            Arc::new(logs),
            Arc::new(problems),
            UserProfiler::new(ProfilerConfig::default()),
            CacheStore::new(Arc::new(Metrics::new())),
            &CacheTtlConfig::default(),
        )
    }

    fn log(problem_id: i64, rating: i32) -> ReviewLog {
        ReviewLog {
            id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            problem_id,
            card_id: Uuid::from_u128(problem_id as u128),
            rating,
            elapsed_days: 2.0,
            review_type: ReviewType::Scheduled,
            old_state: CardState::Review,
            new_state: CardState::Review,
            old_stability: 5.0,
            new_stability: 6.0,
            reviewed_at: Utc::now(),
        }
    }

    fn problem(id: i64) -> Problem {
        Problem {
            id,
            title: format!("Problem {id}"),
            difficulty: ProblemDifficulty::Easy,
            tags: vec!["array".to_string()],
            categories: vec![],
            deleted: false,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_second_read_hits_cache() {
        let mut logs = MockReviewLogRepository::new();
        logs.expect_list_recent()
            .times(1) // only the first call reaches the repository
            .returning(|_, _, _| Ok(vec![log(1, 3), log(1, 3)]));
        let mut problems = MockProblemRepository::new();
        problems
            .expect_get_many()
            .times(1)
            .returning(|_| Ok(vec![problem(1)]));

        let service = service(logs, problems);
        let now = Utc::now();
        let first = service.get(Uuid::from_u128(1), now).await.unwrap();
        let second = service.get(Uuid::from_u128(1), now).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_empty_history_builds_empty_profile() {
        let mut logs = MockReviewLogRepository::new();
        logs.expect_list_recent().returning(|_, _, _| Ok(vec![]));
        let mut problems = MockProblemRepository::new();
        problems.expect_get_many().returning(|_| Ok(vec![]));

        let profile = service(logs, problems)
            .get(Uuid::from_u128(2), Utc::now())
            .await
            .unwrap();
        assert_eq!(profile.total_problems_reviewed, 0);
    }
}
