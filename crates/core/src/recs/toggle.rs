/// Segment-based feature gating for the LLM pipeline.
///
/// Pure in `(context, config)`. Checks run in a strict order; the first
/// matching deny wins, and override-mode allow-listing short-circuits every
/// later check.
use codetop_config::{AllowListMode, ToggleConfig};
use codetop_domain::RequestContext;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleDecision {
    Allow,
    Deny { reason: String },
}

impl ToggleDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, ToggleDecision::Allow)
    }

    fn deny(reason: impl Into<String>) -> Self {
        ToggleDecision::Deny {
            reason: reason.into(),
        }
    }
}

pub struct ToggleGate {
    config: ToggleConfig,
}

impl ToggleGate {
    pub fn new(config: ToggleConfig) -> Self {
        Self { config }
    }

    pub fn decide(&self, ctx: &RequestContext) -> ToggleDecision {
        let user_key = ctx.user_id.to_string();

        // 1. Global kill switch.
        if !self.config.enabled {
            return ToggleDecision::deny("GLOBAL_DISABLED");
        }

        // 2. Explicit deny list.
        if self.config.deny_user_ids.contains(&user_key) {
            return ToggleDecision::deny("USER_DENIED");
        }

        // 3. Override allow-list bypasses all remaining checks.
        if self.config.allow_list_mode == AllowListMode::Override
            && self.config.allow_user_ids.contains(&user_key)
        {
            return ToggleDecision::Allow;
        }

        // 4. Route toggle.
        if self.config.by_route.get(&ctx.route) == Some(&false) {
            return ToggleDecision::deny(format!("ROUTE_DISABLED:{}", ctx.route));
        }

        // 5. Tier toggle (keys normalized to uppercase at load).
        let tier = ctx.tier.as_str();
        if self.config.by_tier.get(tier) == Some(&false) {
            return ToggleDecision::deny(format!("TIER_DISABLED:{tier}"));
        }

        // 6. AB-group toggle.
        if self.config.by_ab_group.get(&ctx.ab_group) == Some(&false) {
            return ToggleDecision::deny(format!("ABGROUP_DISABLED:{}", ctx.ab_group));
        }

        // 7. Whitelist mode requires membership.
        if self.config.allow_list_mode == AllowListMode::Whitelist
            && !self.config.allow_user_ids.contains(&user_key)
        {
            return ToggleDecision::deny("NOT_WHITELISTED");
        }

        ToggleDecision::Allow
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codetop_domain::Tier;
    use uuid::Uuid;

    fn ctx(user: Uuid, tier: Tier, ab_group: &str, route: &str) -> RequestContext {
        RequestContext {
            user_id: user,
            tier,
            ab_group: ab_group.to_string(),
            route: route.to_string(),
            prompt_version: "v3".to_string(),
            trace_id: "trace".to_string(),
        }
    }

    fn default_ctx() -> RequestContext {
        ctx(Uuid::from_u128(1), Tier::Gold, "A", "ai-recommendations")
    }

    #[test]
    fn test_default_config_allows() {
        let gate = ToggleGate::new(ToggleConfig::default());
        assert_eq!(gate.decide(&default_ctx()), ToggleDecision::Allow);
    }

    #[test]
    fn test_global_disable_wins_over_everything() {
        let user = Uuid::from_u128(1);
        let mut config = ToggleConfig::default();
        config.enabled = false;
        config.allow_list_mode = AllowListMode::Override;
        config.allow_user_ids.insert(user.to_string());

        let gate = ToggleGate::new(config);
        assert_eq!(
            gate.decide(&default_ctx()),
            ToggleDecision::Deny {
                reason: "GLOBAL_DISABLED".to_string()
            }
        );
    }

    #[test]
    fn test_deny_list_beats_override_allow() {
        let user = Uuid::from_u128(1);
        let mut config = ToggleConfig::default();
        config.allow_list_mode = AllowListMode::Override;
        config.allow_user_ids.insert(user.to_string());
        config.deny_user_ids.insert(user.to_string());

        let gate = ToggleGate::new(config);
        assert_eq!(
            gate.decide(&default_ctx()),
            ToggleDecision::Deny {
                reason: "USER_DENIED".to_string()
            }
        );
    }

    #[test]
    fn test_override_allow_bypasses_tier_disable() {
        let user = Uuid::from_u128(1);
        let mut config = ToggleConfig::default();
        config.by_tier.insert("GOLD".to_string(), false);
        config.allow_list_mode = AllowListMode::Override;
        config.allow_user_ids.insert(user.to_string());

        let gate = ToggleGate::new(config);
        assert_eq!(gate.decide(&default_ctx()), ToggleDecision::Allow);
    }

    #[test]
    fn test_route_disable() {
        let mut config = ToggleConfig::default();
        config
            .by_route
            .insert("ai-recommendations".to_string(), false);
        let gate = ToggleGate::new(config);
        assert_eq!(
            gate.decide(&default_ctx()),
            ToggleDecision::Deny {
                reason: "ROUTE_DISABLED:ai-recommendations".to_string()
            }
        );
    }

    #[test]
    fn test_tier_disable_for_free_users() {
        // Toggle deny by tier: FREE user with byTier.FREE=false.
        let mut config = ToggleConfig::default();
        config.by_tier.insert("FREE".to_string(), false);
        let gate = ToggleGate::new(config);

        let decision = gate.decide(&ctx(
            Uuid::from_u128(2),
            Tier::Free,
            "A",
            "ai-recommendations",
        ));
        match decision {
            ToggleDecision::Deny { reason } => {
                assert!(reason.starts_with("TIER_DISABLED"));
            }
            ToggleDecision::Allow => panic!("FREE tier should be denied"),
        }
    }

    #[test]
    fn test_ab_group_disable() {
        let mut config = ToggleConfig::default();
        config.by_ab_group.insert("B".to_string(), false);
        let gate = ToggleGate::new(config);

        let denied = gate.decide(&ctx(Uuid::from_u128(1), Tier::Gold, "B", "r"));
        assert_eq!(
            denied,
            ToggleDecision::Deny {
                reason: "ABGROUP_DISABLED:B".to_string()
            }
        );
        let allowed = gate.decide(&ctx(Uuid::from_u128(1), Tier::Gold, "A", "r"));
        assert_eq!(allowed, ToggleDecision::Allow);
    }

    #[test]
    fn test_whitelist_mode_requires_membership() {
        let listed = Uuid::from_u128(1);
        let unlisted = Uuid::from_u128(2);
        let mut config = ToggleConfig::default();
        config.allow_list_mode = AllowListMode::Whitelist;
        config.allow_user_ids.insert(listed.to_string());
        let gate = ToggleGate::new(config);

        assert!(gate
            .decide(&ctx(listed, Tier::Free, "A", "r"))
            .is_allowed());
        assert!(!gate
            .decide(&ctx(unlisted, Tier::Free, "A", "r"))
            .is_allowed());
    }

    #[test]
    fn test_decision_is_pure() {
        let gate = ToggleGate::new(ToggleConfig::default());
        let ctx = default_ctx();
        assert_eq!(gate.decide(&ctx), gate.decide(&ctx));
    }
}
