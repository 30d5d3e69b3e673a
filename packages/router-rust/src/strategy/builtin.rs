use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use quick_cache::sync::Cache;
use rand::Rng;
use tokio::time::Instant;
use waypoint_core::{PickRequest, ServiceInstance, Strategy};

use super::{STRATEGY_RANDOM, STRATEGY_ROUND_ROBIN, STRATEGY_SESSION_STICKINESS};

// ---------------------------------------------------------------------------
// RoundRobinStrategy
// ---------------------------------------------------------------------------

/// Cycles through the candidate list. Values built from the same factory share
/// one cursor, so consecutive selections advance it.
#[derive(Debug, Clone, Default)]
pub struct RoundRobinStrategy {
    cursor: Arc<AtomicUsize>,
}

impl RoundRobinStrategy {
    #[must_use]
    pub fn with_cursor(cursor: Arc<AtomicUsize>) -> Self {
        Self { cursor }
    }
}

impl Strategy for RoundRobinStrategy {
    fn name(&self) -> &str {
        STRATEGY_ROUND_ROBIN
    }

    fn pick(&self, instances: &[ServiceInstance], _request: &PickRequest<'_>) -> Option<ServiceInstance> {
        if instances.is_empty() {
            return None;
        }
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % instances.len();
        instances.get(idx).cloned()
    }
}

// ---------------------------------------------------------------------------
// RandomStrategy
// ---------------------------------------------------------------------------

/// Picks a uniformly random candidate.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomStrategy;

impl Strategy for RandomStrategy {
    fn name(&self) -> &str {
        STRATEGY_RANDOM
    }

    fn pick(&self, instances: &[ServiceInstance], _request: &PickRequest<'_>) -> Option<ServiceInstance> {
        if instances.is_empty() {
            return None;
        }
        let idx = rand::rng().random_range(0..instances.len());
        instances.get(idx).cloned()
    }
}

// ---------------------------------------------------------------------------
// SessionStore
// ---------------------------------------------------------------------------

/// How long a session binding lives without being used.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(30);
/// Maximum number of session bindings kept at once.
pub const DEFAULT_SESSION_CAPACITY: usize = 10_000;

/// State of a session token's binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionBinding {
    /// Calls with the token go to this instance.
    Active(String),
    /// Calls with the token gave up on this instance and should move elsewhere.
    Released(String),
}

#[derive(Debug, Clone)]
struct Entry {
    binding: SessionBinding,
    touched_at: Instant,
}

/// Session token -> instance bindings shared by all sticky selections.
///
/// Bounded in size, and a binding expires once it has gone unused for the
/// store's TTL.
pub struct SessionStore {
    entries: Cache<String, Entry>,
    ttl: Duration,
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_SESSION_CAPACITY, DEFAULT_SESSION_TTL)
    }

    #[must_use]
    pub fn with_limits(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: Cache::new(capacity.max(1)),
            ttl,
        }
    }

    /// Binds `token` to `instance_id`, restarting its expiry.
    pub fn bind(&self, token: &str, instance_id: &str) {
        self.put(token, SessionBinding::Active(instance_id.to_string()));
    }

    /// Marks the binding of `token` released and returns the instance it
    /// pointed at. Unknown or expired tokens yield `None`.
    pub fn release(&self, token: &str) -> Option<String> {
        match self.lookup(token)? {
            SessionBinding::Active(id) => {
                self.put(token, SessionBinding::Released(id.clone()));
                Some(id)
            }
            SessionBinding::Released(_) => None,
        }
    }

    /// Current binding of `token`, dropping it if it has expired.
    #[must_use]
    pub fn lookup(&self, token: &str) -> Option<SessionBinding> {
        let entry = self.entries.get(token)?;
        if entry.touched_at.elapsed() >= self.ttl {
            self.entries.remove(token);
            return None;
        }
        Some(entry.binding)
    }

    /// Instance `token` is actively bound to.
    #[must_use]
    pub fn get(&self, token: &str) -> Option<String> {
        match self.lookup(token)? {
            SessionBinding::Active(id) => Some(id),
            SessionBinding::Released(_) => None,
        }
    }

    pub fn remove(&self, token: &str) -> Option<String> {
        self.entries.remove(token).map(|(_, entry)| match entry.binding {
            SessionBinding::Active(id) | SessionBinding::Released(id) => id,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn put(&self, token: &str, binding: SessionBinding) {
        self.entries.insert(
            token.to_string(),
            Entry {
                binding,
                touched_at: Instant::now(),
            },
        );
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore")
            .field("len", &self.len())
            .field("ttl", &self.ttl)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// SessionStickinessStrategy
// ---------------------------------------------------------------------------

/// Prefers the instance bound to the call's session token.
///
/// An empty token means "no affinity yet" and falls back to round robin. A
/// non-empty token that is unknown, expired, or whose instance has left the
/// candidate list, is (re)bound to the fallback's choice. A released binding
/// steers the fallback away from its instance while others remain.
#[derive(Debug, Clone)]
pub struct SessionStickinessStrategy {
    store: Arc<SessionStore>,
    fallback: RoundRobinStrategy,
}

impl SessionStickinessStrategy {
    #[must_use]
    pub fn new(store: Arc<SessionStore>, fallback: RoundRobinStrategy) -> Self {
        Self { store, fallback }
    }
}

impl Strategy for SessionStickinessStrategy {
    fn name(&self) -> &str {
        STRATEGY_SESSION_STICKINESS
    }

    fn pick(&self, instances: &[ServiceInstance], request: &PickRequest<'_>) -> Option<ServiceInstance> {
        let token = request.session_token;
        let mut avoid = None;
        if !token.is_empty() {
            match self.store.lookup(token) {
                Some(SessionBinding::Active(bound)) => {
                    if let Some(ins) = instances.iter().find(|ins| ins.id == bound) {
                        self.store.bind(token, &ins.id);
                        return Some(ins.clone());
                    }
                    tracing::debug!(
                        target_service = request.target_service,
                        instance = %bound,
                        "sticky instance no longer available, rebinding session"
                    );
                }
                Some(SessionBinding::Released(failed)) => avoid = Some(failed),
                None => {}
            }
        }

        let remaining: Vec<ServiceInstance>;
        let candidates = match avoid.as_deref() {
            Some(failed) if instances.iter().any(|ins| ins.id != failed) => {
                remaining = instances.iter().filter(|ins| ins.id != failed).cloned().collect();
                &remaining[..]
            }
            _ => instances,
        };

        let chosen = self.fallback.pick(candidates, request)?;
        if !token.is_empty() {
            self.store.bind(token, &chosen.id);
        }
        Some(chosen)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn instances(ids: &[&str]) -> Vec<ServiceInstance> {
        ids.iter()
            .map(|id| ServiceInstance::new(*id, "orders").with_endpoint("http", format!("{id}:80")))
            .collect()
    }

    fn request(token: &str) -> PickRequest<'_> {
        PickRequest {
            target_service: "orders",
            session_token: token,
        }
    }

    #[test]
    fn round_robin_cycles_and_shares_cursor() {
        let cursor = Arc::new(AtomicUsize::new(0));
        let list = instances(&["a", "b", "c"]);
        let picks: Vec<String> = (0..4)
            .map(|_| {
                // A fresh strategy value per pick, as a factory would produce.
                RoundRobinStrategy::with_cursor(cursor.clone())
                    .pick(&list, &request(""))
                    .unwrap()
                    .id
            })
            .collect();
        assert_eq!(picks, vec!["a", "b", "c", "a"]);
    }

    #[test]
    fn empty_candidates_yield_none() {
        assert!(RoundRobinStrategy::default().pick(&[], &request("")).is_none());
        assert!(RandomStrategy.pick(&[], &request("")).is_none());
    }

    #[test]
    fn random_picks_a_candidate() {
        let list = instances(&["a", "b"]);
        for _ in 0..20 {
            let picked = RandomStrategy.pick(&list, &request("")).unwrap();
            assert!(picked.id == "a" || picked.id == "b");
        }
    }

    #[test]
    fn sticky_honours_bound_instance() {
        let store = Arc::new(SessionStore::new());
        store.bind("tok", "c");
        let strategy = SessionStickinessStrategy::new(store, RoundRobinStrategy::default());
        let list = instances(&["a", "b", "c"]);
        for _ in 0..3 {
            assert_eq!(strategy.pick(&list, &request("tok")).unwrap().id, "c");
        }
    }

    #[test]
    fn sticky_binds_unknown_token_to_fallback_choice() {
        let store = Arc::new(SessionStore::new());
        let strategy = SessionStickinessStrategy::new(store.clone(), RoundRobinStrategy::default());
        let list = instances(&["a", "b"]);

        let first = strategy.pick(&list, &request("new-token")).unwrap();
        assert_eq!(store.get("new-token"), Some(first.id.clone()));
        // Subsequent picks stick even though round robin would move on.
        assert_eq!(strategy.pick(&list, &request("new-token")).unwrap().id, first.id);
    }

    #[test]
    fn sticky_empty_token_is_not_bound() {
        let store = Arc::new(SessionStore::new());
        let strategy = SessionStickinessStrategy::new(store.clone(), RoundRobinStrategy::default());
        let list = instances(&["a", "b"]);
        assert_eq!(strategy.pick(&list, &request("")).unwrap().id, "a");
        assert_eq!(strategy.pick(&list, &request("")).unwrap().id, "b");
        assert!(store.is_empty());
    }

    #[test]
    fn sticky_rebinds_when_instance_left() {
        let store = Arc::new(SessionStore::new());
        store.bind("tok", "gone");
        let strategy = SessionStickinessStrategy::new(store.clone(), RoundRobinStrategy::default());
        let list = instances(&["a", "b"]);
        let picked = strategy.pick(&list, &request("tok")).unwrap();
        assert_eq!(picked.id, "a");
        assert_eq!(store.get("tok").as_deref(), Some("a"));
        assert_eq!(store.remove("tok").as_deref(), Some("a"));
        assert_eq!(store.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_binding_falls_back_to_round_robin() {
        let store = Arc::new(SessionStore::with_limits(16, Duration::from_secs(30)));
        store.bind("tok", "c");
        let strategy = SessionStickinessStrategy::new(store.clone(), RoundRobinStrategy::default());
        let list = instances(&["a", "b", "c"]);

        tokio::time::advance(Duration::from_secs(29)).await;
        assert_eq!(strategy.pick(&list, &request("tok")).unwrap().id, "c");

        // The pick above refreshed the binding; let it lapse.
        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(store.get("tok"), None);
        assert_eq!(strategy.pick(&list, &request("tok")).unwrap().id, "a");
        assert_eq!(store.get("tok").as_deref(), Some("a"));
    }

    #[test]
    fn store_stays_bounded() {
        let store = SessionStore::with_limits(256, DEFAULT_SESSION_TTL);
        for n in 0..10_000 {
            store.bind(&format!("token-{n}"), "a");
        }
        assert!(!store.is_empty());
        assert!(store.len() <= 512, "store kept {} bindings", store.len());
    }

    #[test]
    fn released_binding_steers_away_from_failed_instance() {
        let store = Arc::new(SessionStore::new());
        let strategy = SessionStickinessStrategy::new(store.clone(), RoundRobinStrategy::default());
        let list = instances(&["a", "b"]);
        store.bind("tok", "a");

        assert_eq!(store.release("tok").as_deref(), Some("a"));
        assert_eq!(store.lookup("tok"), Some(SessionBinding::Released("a".to_string())));
        assert_eq!(store.get("tok"), None);

        // Round robin would start on "a"; the released instance is skipped.
        assert_eq!(strategy.pick(&list, &request("tok")).unwrap().id, "b");
        assert_eq!(store.lookup("tok"), Some(SessionBinding::Active("b".to_string())));
    }

    #[test]
    fn released_instance_is_used_when_it_is_the_only_one() {
        let store = Arc::new(SessionStore::new());
        let strategy = SessionStickinessStrategy::new(store.clone(), RoundRobinStrategy::default());
        store.bind("tok", "a");
        store.release("tok");
        assert_eq!(strategy.pick(&instances(&["a"]), &request("tok")).unwrap().id, "a");
    }

    #[test]
    fn release_unknown_token_is_none() {
        let store = SessionStore::new();
        assert_eq!(store.release("nobody"), None);
        store.bind("tok", "a");
        store.release("tok");
        assert_eq!(store.release("tok"), None);
    }
}
