/// Ranking providers.
///
/// Providers are polymorphic over one capability: accept a candidate pool,
/// return ranked items. Variants are registered by kind at startup and the
/// chain executor visits them in declared order; the scheduler fallback is
/// the terminal provider that never fails.
use async_trait::async_trait;
use codetop_config::ProviderNodeConfig;
use codetop_domain::{DomainError, RequestContext};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use super::types::{ProblemCandidate, ProviderResult, RankOptions, RankedItem};

pub const SOURCE_LLM: &str = "LLM";
pub const SOURCE_SCHEDULER: &str = "FSRS";

#[async_trait]
pub trait RankingProvider: Send + Sync {
    fn name(&self) -> &str;

    fn model(&self) -> Option<&str> {
        None
    }

    async fn rank(
        &self,
        ctx: &RequestContext,
        candidates: &[ProblemCandidate],
        options: &RankOptions,
    ) -> Result<ProviderResult, DomainError>;
}

// ============================================================================
// TERMINAL SCHEDULER FALLBACK
// ============================================================================

/// Scheduler-only ranking: top-N of the pool by urgency, descending, with
/// problem id as the stable tie-break. Pure and infallible; every deny and
/// failure path in the pipeline lands here.
pub fn scheduler_fallback(candidates: &[ProblemCandidate], limit: usize) -> Vec<RankedItem> {
    let mut ordered: Vec<&ProblemCandidate> = candidates.iter().collect();
    ordered.sort_by(|a, b| {
        b.urgency_score
            .partial_cmp(&a.urgency_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.id.cmp(&b.id))
    });

    ordered
        .into_iter()
        .take(limit)
        .map(|candidate| RankedItem {
            problem_id: candidate.id,
            score: candidate.urgency_score,
            reason: fallback_reason_text(candidate),
            source: SOURCE_SCHEDULER.to_string(),
            confidence: 0.5,
            model: None,
        })
        .collect()
}

fn fallback_reason_text(candidate: &ProblemCandidate) -> String {
    if candidate.days_overdue >= 1.0 {
        format!(
            "Review due: {:.0} days overdue in {}",
            candidate.days_overdue, candidate.topic
        )
    } else if candidate.attempts == 0 {
        format!("New problem in {}", candidate.topic)
    } else {
        format!("Scheduled review in {}", candidate.topic)
    }
}

// ============================================================================
// MOCK PROVIDER
// ============================================================================

/// Deterministic stand-in for an external model. Scores blend urgency with
/// a mild struggle signal so output is plausible but reproducible.
pub struct MockRankingProvider {
    name: String,
    model: Option<String>,
}

impl MockRankingProvider {
    pub fn new(name: impl Into<String>, model: Option<String>) -> Self {
        Self {
            name: name.into(),
            model,
        }
    }
}

#[async_trait]
impl RankingProvider for MockRankingProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    async fn rank(
        &self,
        _ctx: &RequestContext,
        candidates: &[ProblemCandidate],
        options: &RankOptions,
    ) -> Result<ProviderResult, DomainError> {
        let mut items: Vec<RankedItem> = candidates
            .iter()
            .map(|candidate| {
                let struggle = (1.0 - candidate.recent_accuracy).clamp(0.0, 1.0);
                let score = (0.7 * candidate.urgency_score + 0.3 * struggle).clamp(0.0, 1.0);
                RankedItem {
                    problem_id: candidate.id,
                    score,
                    reason: format!(
                        "Practice {} to reinforce {}",
                        candidate.topic,
                        candidate.tags.first().map(String::as_str).unwrap_or("fundamentals")
                    ),
                    source: SOURCE_LLM.to_string(),
                    confidence: 0.0,
                    model: self.model.clone(),
                }
            })
            .collect();

        items.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.problem_id.cmp(&b.problem_id))
        });
        items.truncate(options.limit.max(1) * 2);

        Ok(ProviderResult {
            provider: self.name.clone(),
            model: self.model.clone(),
            items,
        })
    }
}

// ============================================================================
// HTTP MODEL PROVIDER
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RankRequestBody<'a> {
    prompt_version: &'a str,
    limit: usize,
    candidates: &'a [ProblemCandidate],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RankResponseBody {
    items: Vec<RankResponseItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RankResponseItem {
    problem_id: i64,
    score: f64,
    #[serde(default)]
    reason: String,
}

/// External model client over a JSON ranking endpoint.
pub struct HttpRankingProvider {
    name: String,
    model: Option<String>,
    endpoint: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpRankingProvider {
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        model: Option<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            model,
            endpoint: endpoint.into(),
            api_key,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl RankingProvider for HttpRankingProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    async fn rank(
        &self,
        ctx: &RequestContext,
        candidates: &[ProblemCandidate],
        options: &RankOptions,
    ) -> Result<ProviderResult, DomainError> {
        let body = RankRequestBody {
            prompt_version: &ctx.prompt_version,
            limit: options.limit,
            candidates,
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DomainError::Provider(format!("{}: {e}", self.name)))?;

        if !response.status().is_success() {
            return Err(DomainError::Provider(format!(
                "{}: upstream returned {}",
                self.name,
                response.status()
            )));
        }

        let parsed: RankResponseBody = response
            .json()
            .await
            .map_err(|e| DomainError::Provider(format!("{}: malformed response: {e}", self.name)))?;

        // Only items referring to real candidates survive; scores clamp to
        // the unit interval.
        let known: HashMap<i64, &ProblemCandidate> =
            candidates.iter().map(|c| (c.id, c)).collect();
        let items = parsed
            .items
            .into_iter()
            .filter(|item| known.contains_key(&item.problem_id))
            .map(|item| RankedItem {
                problem_id: item.problem_id,
                score: item.score.clamp(0.0, 1.0),
                reason: if item.reason.is_empty() {
                    "Recommended for your current level".to_string()
                } else {
                    item.reason
                },
                source: SOURCE_LLM.to_string(),
                confidence: 0.0,
                model: self.model.clone(),
            })
            .collect();

        Ok(ProviderResult {
            provider: self.name.clone(),
            model: self.model.clone(),
            items,
        })
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

/// Provider instances keyed by node id, built once from the chain config.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn RankingProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// Instantiate providers for every enabled node of every chain.
    /// Unknown kinds fall back to the mock so a config typo degrades
    /// instead of panicking.
    pub fn from_nodes<'a>(nodes: impl Iterator<Item = &'a ProviderNodeConfig>) -> Self {
        let mut registry = Self::new();
        for node in nodes {
            let provider: Arc<dyn RankingProvider> = match node.provider.as_str() {
                "http" => {
                    let endpoint = node.endpoint.clone().unwrap_or_default();
                    let api_key = node
                        .api_key_env
                        .as_deref()
                        .and_then(|var| std::env::var(var).ok());
                    Arc::new(HttpRankingProvider::new(
                        node.id.clone(),
                        endpoint,
                        node.model.clone(),
                        api_key,
                    ))
                }
                "mock" => Arc::new(MockRankingProvider::new(node.id.clone(), node.model.clone())),
                other => {
                    tracing::warn!(node = %node.id, kind = %other, "unknown provider kind, using mock");
                    Arc::new(MockRankingProvider::new(node.id.clone(), node.model.clone()))
                }
            };
            registry.register(node.id.clone(), provider);
        }
        registry
    }

    pub fn register(&mut self, node_id: String, provider: Arc<dyn RankingProvider>) {
        self.providers.insert(node_id, provider);
    }

    pub fn get(&self, node_id: &str) -> Option<Arc<dyn RankingProvider>> {
        self.providers.get(node_id).cloned()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codetop_domain::{ProblemDifficulty, Tier};
    use uuid::Uuid;

    fn candidate(id: i64, urgency: f64, accuracy: f64) -> ProblemCandidate {
        ProblemCandidate {
            id,
            topic: "arrays".to_string(),
            difficulty: ProblemDifficulty::Medium,
            tags: vec!["array".to_string()],
            attempts: 3,
            recent_accuracy: accuracy,
            urgency_score: urgency,
            retention_probability: 0.8,
            days_overdue: 2.0,
        }
    }

    fn ctx() -> RequestContext {
        RequestContext {
            user_id: Uuid::from_u128(1),
            tier: Tier::Gold,
            ab_group: "A".to_string(),
            route: "ai-recommendations".to_string(),
            prompt_version: "v3".to_string(),
            trace_id: "trace".to_string(),
        }
    }

    #[test]
    fn test_scheduler_fallback_orders_by_urgency() {
        let candidates = vec![
            candidate(1, 0.2, 0.5),
            candidate(2, 0.9, 0.5),
            candidate(3, 0.6, 0.5),
        ];
        let items = scheduler_fallback(&candidates, 2);
        let ids: Vec<i64> = items.iter().map(|i| i.problem_id).collect();
        assert_eq!(ids, vec![2, 3]);
        assert!(items.iter().all(|i| i.source == SOURCE_SCHEDULER));
    }

    #[test]
    fn test_scheduler_fallback_tie_breaks_on_problem_id() {
        let candidates = vec![candidate(9, 0.5, 0.5), candidate(4, 0.5, 0.5)];
        let items = scheduler_fallback(&candidates, 2);
        let ids: Vec<i64> = items.iter().map(|i| i.problem_id).collect();
        assert_eq!(ids, vec![4, 9]);
    }

    #[tokio::test]
    async fn test_mock_provider_is_deterministic() {
        let provider = MockRankingProvider::new("mock", Some("mock-1".to_string()));
        let candidates = vec![candidate(1, 0.4, 0.9), candidate(2, 0.8, 0.2)];
        let options = RankOptions { limit: 5 };

        let a = provider.rank(&ctx(), &candidates, &options).await.unwrap();
        let b = provider.rank(&ctx(), &candidates, &options).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.items[0].problem_id, 2, "struggling + urgent ranks first");
    }

    #[test]
    fn test_registry_builds_from_nodes() {
        let nodes = vec![
            ProviderNodeConfig {
                id: "mock-a".to_string(),
                ..Default::default()
            },
            ProviderNodeConfig {
                id: "weird".to_string(),
                provider: "carrier-pigeon".to_string(),
                ..Default::default()
            },
        ];
        let registry = ProviderRegistry::from_nodes(nodes.iter());
        assert!(registry.get("mock-a").is_some());
        assert!(registry.get("weird").is_some(), "unknown kind degrades to mock");
        assert!(registry.get("absent").is_none());
    }
}
