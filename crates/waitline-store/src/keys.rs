//! Store key layout.
//!
//! Every key of a tenant carries the concert id inside a `{...}` hash tag so
//! that a cluster places them in one slot and a single script may touch
//! the wait list, the active set and the lease hashes together.

/// Builds every key the queue uses, under an optional prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueKeys {
    prefix: String,
}

impl QueueKeys {
    /// Key builder with the given prefix (may be empty).
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Return the configured prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Wait list (sorted set scored by arrival ms).
    pub fn wait(&self, concert_id: &str) -> String {
        format!("{}queue:wait:{{{concert_id}}}", self.prefix)
    }

    /// Active set (sorted set scored by lease expiry ms).
    pub fn active(&self, concert_id: &str) -> String {
        format!("{}queue:active:{{{concert_id}}}", self.prefix)
    }

    /// Lease hash of one user.
    pub fn lease(&self, concert_id: &str, user_id: &str) -> String {
        format!("{}{user_id}", self.lease_prefix(concert_id))
    }

    /// Everything before the user id in a lease key. Scripts append the
    /// user id to address lease hashes of popped or expired members.
    pub fn lease_prefix(&self, concert_id: &str) -> String {
        format!("{}active:token:{{{concert_id}}}:", self.prefix)
    }

    /// Scheduler lock for one named pass of one tenant.
    pub fn scheduler_lock(&self, scheduler: &str, concert_id: &str) -> String {
        format!("{}scheduler:lock:{scheduler}:{{{concert_id}}}", self.prefix)
    }

    /// Token bucket of one user's status polling.
    pub fn rate_limit(&self, concert_id: &str, user_id: &str) -> String {
        format!("{}rate_limit:queue:{{{concert_id}}}:{user_id}", self.prefix)
    }

    /// SCAN patterns matching every wait list and every active set.
    pub fn tenant_patterns(&self) -> [String; 2] {
        [
            format!("{}queue:wait:{{*}}", self.prefix),
            format!("{}queue:active:{{*}}", self.prefix),
        ]
    }

    /// Extract the concert id from a wait or active key.
    pub fn concert_from_key(&self, key: &str) -> Option<String> {
        let rest = key.strip_prefix(self.prefix.as_str())?;
        let rest = rest
            .strip_prefix("queue:wait:")
            .or_else(|| rest.strip_prefix("queue:active:"))?;
        let inner = rest.strip_prefix('{')?.strip_suffix('}')?;
        if inner.is_empty() {
            None
        } else {
            Some(inner.to_string())
        }
    }
}
