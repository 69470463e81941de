/// Token-bucket rate limiting at provider-node granularity.
///
/// One bucket per node (global rps) and one per (node, user). Buckets
/// refill continuously at their configured rate and cap at one second of
/// tokens. Acquisition is non-blocking: a denied token is a fallback
/// signal, not a wait.
use std::time::Instant;

use dashmap::DashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_refill: now,
        }
    }

    /// Refill to at most `capacity` and take one token if available.
    fn try_take(&mut self, rate_per_sec: f64, capacity: f64, now: Instant) -> bool {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate_per_sec).min(capacity);
        self.last_refill = now;
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Default)]
pub struct NodeRateLimiters {
    node_buckets: DashMap<String, Bucket>,
    user_buckets: DashMap<(String, Uuid), Bucket>,
}

impl NodeRateLimiters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a global token for the node. `rps == 0` disables the limit.
    pub fn try_acquire_node(&self, node_id: &str, rps: u32) -> bool {
        self.try_acquire_node_at(node_id, rps, Instant::now())
    }

    /// Take a per-(node, user) token. `per_user_rps == 0` disables it.
    pub fn try_acquire_user(&self, node_id: &str, user_id: Uuid, per_user_rps: u32) -> bool {
        self.try_acquire_user_at(node_id, user_id, per_user_rps, Instant::now())
    }

    fn try_acquire_node_at(&self, node_id: &str, rps: u32, now: Instant) -> bool {
        if rps == 0 {
            return true;
        }
        let capacity = rps as f64;
        let mut bucket = self
            .node_buckets
            .entry(node_id.to_string())
            .or_insert_with(|| Bucket::new(capacity, now));
        bucket.try_take(capacity, capacity, now)
    }

    fn try_acquire_user_at(
        &self,
        node_id: &str,
        user_id: Uuid,
        per_user_rps: u32,
        now: Instant,
    ) -> bool {
        if per_user_rps == 0 {
            return true;
        }
        let capacity = per_user_rps as f64;
        let mut bucket = self
            .user_buckets
            .entry((node_id.to_string(), user_id))
            .or_insert_with(|| Bucket::new(capacity, now));
        bucket.try_take(capacity, capacity, now)
    }
}
