/// Provider-chain execution.
///
/// Walks the selected chain's enabled nodes in declared order under
/// per-node rate limits, timeouts, and a bounded retry. A node that fails
/// or is rate-limited falls through to the next; when every node has
/// fallen through, the terminal strategy answers exactly once, and it
/// cannot fail. The hop list records each node visited and why it was
/// left, for the `X-Provider-Chain` response header.
use std::sync::Arc;
use std::time::Duration;

use codetop_config::{ChainConfig, TerminalStrategy};
use codetop_domain::{DomainError, RequestContext};

use super::limiter::NodeRateLimiters;
use super::providers::{scheduler_fallback, ProviderRegistry};
use super::types::{FallbackReason, ProblemCandidate, RankOptions, RankedItem};
use crate::metrics::Metrics;

/// Result of one chain execution, terminal included.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainOutcome {
    pub items: Vec<RankedItem>,
    pub provider: String,
    pub model: Option<String>,
    pub chain_id: String,
    /// One entry per node visited, e.g. `gpt-node:OK` or
    /// `gpt-node:GLOBAL_RATE_LIMIT`.
    pub hops: Vec<String>,
    pub fallback_reason: Option<String>,
    pub busy: bool,
    pub from_terminal: bool,
}

pub struct ChainExecutor {
    registry: Arc<ProviderRegistry>,
    limiters: Arc<NodeRateLimiters>,
    metrics: Arc<Metrics>,
}

impl ChainExecutor {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        limiters: Arc<NodeRateLimiters>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            registry,
            limiters,
            metrics,
        }
    }

    pub async fn execute(
        &self,
        chain_id: &str,
        chain: &ChainConfig,
        ctx: &RequestContext,
        candidates: &[ProblemCandidate],
        options: &RankOptions,
    ) -> ChainOutcome {
        let mut hops: Vec<String> = Vec::new();
        let mut last_reason: Option<FallbackReason> = None;

        for node in chain.nodes.iter().filter(|n| n.enabled) {
            if !self.limiters.try_acquire_node(&node.id, node.rps) {
                hops.push(format!("{}:{}", node.id, FallbackReason::GlobalRateLimit));
                last_reason = Some(FallbackReason::GlobalRateLimit);
                self.metrics.record_provider_fallback();
                continue;
            }
            if !self
                .limiters
                .try_acquire_user(&node.id, ctx.user_id, node.per_user_rps)
            {
                hops.push(format!("{}:{}", node.id, FallbackReason::UserRateLimit));
                last_reason = Some(FallbackReason::UserRateLimit);
                self.metrics.record_provider_fallback();
                continue;
            }

            let Some(provider) = self.registry.get(&node.id) else {
                hops.push(format!("{}:UNREGISTERED", node.id));
                last_reason = Some(FallbackReason::ProviderError("Unregistered".to_string()));
                continue;
            };

            // First attempt plus at most one bounded retry.
            let tries = 1 + node.attempts.min(1);
            let timeout = Duration::from_millis(node.timeout_ms);
            let mut node_error: Option<FallbackReason> = None;

            for attempt in 0..tries {
                match tokio::time::timeout(timeout, provider.rank(ctx, candidates, options)).await
                {
                    Ok(Ok(result)) => {
                        hops.push(format!("{}:OK", node.id));
                        return ChainOutcome {
                            items: result.items,
                            provider: result.provider,
                            model: result.model,
                            chain_id: chain_id.to_string(),
                            hops,
                            fallback_reason: None,
                            busy: false,
                            from_terminal: false,
                        };
                    }
                    Ok(Err(err)) => {
                        tracing::warn!(
                            node = %node.id,
                            attempt,
                            error = %err,
                            "provider invocation failed"
                        );
                        node_error =
                            Some(FallbackReason::ProviderError(err.class().to_string()));
                    }
                    Err(_) => {
                        tracing::warn!(node = %node.id, attempt, "provider timed out");
                        node_error = Some(FallbackReason::Timeout);
                    }
                }
            }

            let reason = node_error
                .unwrap_or_else(|| FallbackReason::ProviderError("Unknown".to_string()));
            hops.push(format!("{}:{}", node.id, reason));
            self.metrics.record_provider_fallback();

            // An empty onErrorsToNext list means any error falls through;
            // otherwise only listed classes do, and unlisted ones abort the
            // walk straight into the terminal.
            let class = reason.to_string();
            let falls_through = node.on_errors_to_next.is_empty()
                || node.on_errors_to_next.iter().any(|listed| listed == &class);
            last_reason = Some(reason);
            if !falls_through {
                break;
            }
        }

        self.terminal(chain_id, chain, candidates, options, hops, last_reason)
    }

    /// Terminal default; invoked at most once per execution.
    fn terminal(
        &self,
        chain_id: &str,
        chain: &ChainConfig,
        candidates: &[ProblemCandidate],
        options: &RankOptions,
        hops: Vec<String>,
        last_reason: Option<FallbackReason>,
    ) -> ChainOutcome {
        let fallback_reason = Some(
            last_reason
                .map(|reason| reason.to_string())
                .unwrap_or_else(|| "NO_ENABLED_NODES".to_string()),
        );

        match chain.terminal {
            TerminalStrategy::SchedulerFallback => {
                self.metrics.record_scheduler_fallback();
                ChainOutcome {
                    items: scheduler_fallback(candidates, options.limit),
                    provider: "scheduler-fallback".to_string(),
                    model: None,
                    chain_id: chain_id.to_string(),
                    hops,
                    fallback_reason,
                    busy: false,
                    from_terminal: true,
                }
            }
            TerminalStrategy::Busy => ChainOutcome {
                items: Vec::new(),
                provider: "busy".to_string(),
                model: None,
                chain_id: chain_id.to_string(),
                hops,
                fallback_reason,
                busy: true,
                from_terminal: true,
            },
            TerminalStrategy::Empty => ChainOutcome {
                items: Vec::new(),
                provider: "empty".to_string(),
                model: None,
                chain_id: chain_id.to_string(),
                hops,
                fallback_reason,
                busy: false,
                from_terminal: true,
            },
        }
    }
}
