//! Cache key builder.
//!
//! Every key in the system is built here, under the `codetop:` namespace
//! with the domain as the second segment. User-scoped keys embed the user
//! id; the recommendation key embeds every dimension that changes the
//! output (prompt version, tier, AB group, selected chain) so segments
//! never see each other's entries.

use uuid::Uuid;

pub const NAMESPACE: &str = "codetop";

pub const DOMAIN_USER_PROFILE: &str = "user-profile";
pub const DOMAIN_FSRS: &str = "fsrs";
pub const DOMAIN_PROBLEM: &str = "problem";
pub const DOMAIN_RECOMMENDATION: &str = "rec";

fn key(domain: &str, rest: &str) -> String {
    format!("{NAMESPACE}:{domain}:{rest}")
}

/// Domain segment of a key built by this module.
pub fn domain_of(cache_key: &str) -> Option<&str> {
    cache_key.strip_prefix("codetop:")?.split(':').next()
}

pub fn user_profile(user_id: Uuid) -> String {
    key(DOMAIN_USER_PROFILE, &user_id.to_string())
}

pub fn fsrs_queue(user_id: Uuid, limit: usize) -> String {
    key(DOMAIN_FSRS, &format!("queue:{user_id}:{limit}"))
}

pub fn fsrs_stats(user_id: Uuid) -> String {
    key(DOMAIN_FSRS, &format!("stats:{user_id}"))
}

pub fn fsrs_user_prefix(user_id: Uuid) -> Vec<String> {
    vec![
        key(DOMAIN_FSRS, &format!("queue:{user_id}")),
        key(DOMAIN_FSRS, &format!("stats:{user_id}")),
    ]
}

pub fn problem(problem_id: i64) -> String {
    key(DOMAIN_PROBLEM, &problem_id.to_string())
}

/// Recommendation cache key; a pure function of every segmentation input.
pub fn recommendation(
    user_id: Uuid,
    limit: usize,
    prompt_version: &str,
    tier: &str,
    ab_group: &str,
    chain_id: &str,
) -> String {
    key(
        DOMAIN_RECOMMENDATION,
        &format!("ai:{user_id}:{limit}:{prompt_version}:{tier}:{ab_group}:{chain_id}"),
    )
}

pub fn recommendation_user_prefix(user_id: Uuid) -> String {
    key(DOMAIN_RECOMMENDATION, &format!("ai:{user_id}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recommendation_key_is_pure_in_inputs() {
        let user = Uuid::from_u128(42);
        let a = recommendation(user, 5, "v3", "GOLD", "B", "premium");
        let b = recommendation(user, 5, "v3", "GOLD", "B", "premium");
        assert_eq!(a, b);

        // Any changed dimension changes the key.
        assert_ne!(a, recommendation(user, 6, "v3", "GOLD", "B", "premium"));
        assert_ne!(a, recommendation(user, 5, "v4", "GOLD", "B", "premium"));
        assert_ne!(a, recommendation(user, 5, "v3", "FREE", "B", "premium"));
        assert_ne!(a, recommendation(user, 5, "v3", "GOLD", "A", "premium"));
        assert_ne!(a, recommendation(user, 5, "v3", "GOLD", "B", "standard"));
    }

    #[test]
    fn test_domain_extraction() {
        let user = Uuid::from_u128(1);
        assert_eq!(domain_of(&user_profile(user)), Some(DOMAIN_USER_PROFILE));
        assert_eq!(domain_of(&fsrs_queue(user, 10)), Some(DOMAIN_FSRS));
        assert_eq!(domain_of(&problem(3)), Some(DOMAIN_PROBLEM));
        assert_eq!(domain_of("unrelated"), None);
    }

    #[test]
    fn test_user_scoped_keys_embed_user() {
        let user = Uuid::from_u128(9);
        assert!(user_profile(user).contains(&user.to_string()));
        assert!(fsrs_stats(user).contains(&user.to_string()));
    }
}
