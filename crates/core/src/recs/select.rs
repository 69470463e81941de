/// Chain routing: deterministic AB-group assignment and first-match rule
/// evaluation over the startup-validated routing table.
use codetop_config::{ChainConfig, RecommendationConfig, RouteConditions};
use codetop_domain::RequestContext;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Deterministic AB-group assignment: SHA-256 of the user id, first eight
/// bytes as a big-endian integer, modulo the configured label list. Stable
/// across deployments and process restarts.
pub fn assign_ab_group(user_id: Uuid, groups: &[String]) -> String {
    if groups.is_empty() {
        return "A".to_string();
    }
    let digest = Sha256::digest(user_id.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    let bucket = u64::from_be_bytes(prefix) % groups.len() as u64;
    groups[bucket as usize].clone()
}

pub struct ChainSelector {
    config: RecommendationConfig,
}

impl ChainSelector {
    pub fn new(config: RecommendationConfig) -> Self {
        Self { config }
    }

    /// Select the chain for a request: first matching rule wins, then the
    /// default chain. A selected chain that is disabled (or somehow absent)
    /// falls back to the first usable chain by id; `None` means only the
    /// terminal default can answer.
    pub fn select<'a>(&'a self, ctx: &RequestContext) -> Option<(&'a str, &'a ChainConfig)> {
        let chain_id = self
            .config
            .routing
            .rules
            .iter()
            .find(|rule| rule_matches(&rule.when, ctx))
            .map(|rule| rule.use_chain.as_str())
            .unwrap_or(&self.config.routing.default_chain_id);

        if let Some(chain) = self.usable(chain_id) {
            return Some((chain_id, chain));
        }

        // Deterministic scan for any usable chain.
        let mut ids: Vec<&String> = self.config.chains.keys().collect();
        ids.sort();
        ids.into_iter()
            .find_map(|id| self.usable(id).map(|chain| (id.as_str(), chain)))
    }

    fn usable(&self, chain_id: &str) -> Option<&ChainConfig> {
        self.config
            .chains
            .get(chain_id)
            .filter(|chain| chain.enabled && chain.nodes.iter().any(|n| n.enabled))
    }
}

/// A rule matches when every condition it lists is satisfied. Tier values
/// are uppercased at load, so comparison is effectively case-insensitive;
/// abGroup and route compare case-sensitively.
fn rule_matches(when: &RouteConditions, ctx: &RequestContext) -> bool {
    if let Some(tiers) = &when.tier {
        if !tiers.iter().any(|t| t == ctx.tier.as_str()) {
            return false;
        }
    }
    if let Some(groups) = &when.ab_group {
        if !groups.iter().any(|g| g == &ctx.ab_group) {
            return false;
        }
    }
    if let Some(routes) = &when.route {
        if !routes.iter().any(|r| r == &ctx.route) {
            return false;
        }
    }
    true
}
