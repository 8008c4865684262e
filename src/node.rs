//! A single service endpoint and its liveness state machine.
//!
//! Liveness is tracked lock-free: an `AtomicU8` tag plus a couple of supporting atomics,
//! transitioned with `compare_exchange` rather than a mutex. A node's state is really a tiny
//! circuit breaker in its own right (closed = alive, open = dead, half-open = resurrecting);
//! `NodePool` just owns many of them.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use crate::backoff::Backoff;
use crate::clock::Clock;

const STATE_ALIVE: u8 = 0;
const STATE_DEAD: u8 = 1;

/// The liveness state a caller observes when inspecting a node.
///
/// `Dead` and `Resurrecting` are both represented internally by the `DEAD` tag; the distinction
/// is purely a function of whether `dead_until` has elapsed. "Resurrecting" isn't a fourth
/// stored tag, it's what an expired `Dead` looks like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// The node may be used for ordinary API calls.
    Alive,
    /// The node's dead-until timestamp has elapsed; it's a candidate for a revival ping.
    Resurrecting {
        /// Consecutive failed attempts that led to the most recent `mark_dead`.
        failed_attempts: u32,
    },
    /// The node is dead and `until` has not yet elapsed.
    Dead {
        /// Millis (on the injected [`Clock`]) after which the node becomes `Resurrecting`.
        until_millis: u64,
        /// Consecutive failed attempts that led to this state.
        failed_attempts: u32,
    },
}

#[derive(Debug)]
struct NodeLiveness {
    state: AtomicU8,
    dead_until_millis: AtomicU64,
    failed_attempts: AtomicU32,
    /// Set by `NodePool::nodes()` traversal when a `Resurrecting` node is handed out as this
    /// call's single revival candidate; cleared by `mark_alive`/`mark_dead`. See
    /// `DESIGN.md`'s "claim-on-yield" resolution of the Resurrecting-node Open Question.
    resurrection_claimed: AtomicBool,
}

impl NodeLiveness {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(STATE_ALIVE),
            dead_until_millis: AtomicU64::new(0),
            failed_attempts: AtomicU32::new(0),
            resurrection_claimed: AtomicBool::new(false),
        }
    }
}

/// Product-supplied identity attached to a node after a successful sniff (cluster name, node
/// name, version) — opaque to the core beyond display/diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct NodeIdentity {
    /// Product-assigned node id.
    pub id: Option<String>,
    /// Human-readable node name.
    pub name: Option<String>,
    /// Product version string.
    pub version: Option<String>,
}

/// A single addressable service endpoint.
///
/// `Node` is cheap to clone (the liveness state lives behind an `Arc`), so the pipeline and
/// pool both hold references to the same underlying atomics without a lock.
#[derive(Debug, Clone)]
pub struct Node {
    uri: String,
    capabilities: Arc<Vec<String>>,
    identity: Arc<std::sync::Mutex<Option<NodeIdentity>>>,
    liveness: Arc<NodeLiveness>,
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.uri == other.uri
    }
}
impl Eq for Node {}

impl std::hash::Hash for Node {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.uri.hash(state);
    }
}

impl Node {
    /// Builds a new, initially-`Alive` node at `uri` with the given capability tags
    /// (e.g. `"data"`, `"master_eligible"`, `"http"`).
    pub fn new(uri: impl Into<String>, capabilities: Vec<String>) -> Self {
        Self {
            uri: uri.into(),
            capabilities: Arc::new(capabilities),
            identity: Arc::new(std::sync::Mutex::new(None)),
            liveness: Arc::new(NodeLiveness::new()),
        }
    }

    /// The node's address (scheme://host:port/root-path). Unique within a pool.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Opaque capability tags as reported by the last sniff (or the seed configuration).
    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    /// `true` if `tag` is present in this node's capability set.
    pub fn has_capability(&self, tag: &str) -> bool {
        self.capabilities.iter().any(|c| c == tag)
    }

    /// Product-supplied identity, if a sniff or ping has populated one.
    pub fn identity(&self) -> Option<NodeIdentity> {
        self.identity.lock().unwrap().clone()
    }

    /// Records product-supplied identity (called by `ProductRegistration::sniff`/`ping`).
    pub fn set_identity(&self, identity: NodeIdentity) {
        *self.identity.lock().unwrap() = Some(identity);
    }

    /// Current liveness state, resolving an elapsed `Dead` into `Resurrecting` lazily.
    pub fn state(&self, clock: &dyn Clock) -> NodeState {
        let tag = self.liveness.state.load(Ordering::Acquire);
        if tag == STATE_ALIVE {
            return NodeState::Alive;
        }
        let until_millis = self.liveness.dead_until_millis.load(Ordering::Acquire);
        let failed_attempts = self.liveness.failed_attempts.load(Ordering::Acquire);
        if clock.now_millis() >= until_millis {
            NodeState::Resurrecting { failed_attempts }
        } else {
            NodeState::Dead { until_millis, failed_attempts }
        }
    }

    /// Attempts to claim this node as the current call's single revival candidate.
    ///
    /// Returns `true` only if the node is currently `Resurrecting` *and* no other concurrent
    /// traversal has already claimed it since the last `mark_dead`/`mark_alive`. See
    /// `DESIGN.md`, Open Question 1.
    pub fn try_claim_resurrection(&self, clock: &dyn Clock) -> bool {
        if !matches!(self.state(clock), NodeState::Resurrecting { .. }) {
            return false;
        }
        self.liveness
            .resurrection_claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Marks the node dead after a failed attempt, scheduling resurrection at
    /// `now + min(max_dead_timeout, dead_timeout * 2^min(failed_attempts, cap))`.
    pub fn mark_dead(&self, clock: &dyn Clock, dead_timeout: std::time::Duration, max_dead_timeout: std::time::Duration) {
        let attempt = self.liveness.failed_attempts.fetch_add(1, Ordering::AcqRel) + 1;
        let delay = Backoff::exponential(dead_timeout).with_max(max_dead_timeout).delay(attempt as usize);
        let until_millis = clock.now_millis().saturating_add(delay.as_millis() as u64);
        self.liveness.dead_until_millis.store(until_millis, Ordering::Release);
        self.liveness.resurrection_claimed.store(false, Ordering::Release);
        self.liveness.state.store(STATE_DEAD, Ordering::Release);
    }

    /// Marks the node alive, resetting the failure count.
    pub fn mark_alive(&self) {
        self.liveness.failed_attempts.store(0, Ordering::Release);
        self.liveness.resurrection_claimed.store(false, Ordering::Release);
        self.liveness.state.store(STATE_ALIVE, Ordering::Release);
    }

    /// The soonest-reviving `until_millis` for this node, or `None` if it is not dead.
    pub fn dead_until_millis(&self, clock: &dyn Clock) -> Option<u64> {
        match self.state(clock) {
            NodeState::Dead { until_millis, .. } => Some(until_millis),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ManualClock;
    use std::time::Duration;

    #[test]
    fn starts_alive() {
        let clock = ManualClock::new();
        let node = Node::new("http://localhost:9200", vec!["data".into()]);
        assert_eq!(node.state(&clock), NodeState::Alive);
    }

    #[test]
    fn mark_dead_then_resurrects_after_timeout() {
        let clock = ManualClock::new();
        let node = Node::new("http://localhost:9200", vec![]);
        node.mark_dead(&clock, Duration::from_millis(100), Duration::from_secs(10));
        assert!(matches!(node.state(&clock), NodeState::Dead { .. }));

        clock.advance(Duration::from_millis(150));
        assert!(matches!(node.state(&clock), NodeState::Resurrecting { failed_attempts: 1 }));
    }

    #[test]
    fn repeated_failures_back_off_exponentially() {
        let clock = ManualClock::new();
        let node = Node::new("http://localhost:9200", vec![]);
        let dead_timeout = Duration::from_millis(100);
        let max = Duration::from_secs(10);

        node.mark_dead(&clock, dead_timeout, max);
        let first_until = node.dead_until_millis(&clock).unwrap();
        clock.advance(Duration::from_millis(150));
        node.mark_dead(&clock, dead_timeout, max);
        let second_until = node.dead_until_millis(&clock).unwrap();

        // second backoff (attempt 2 => 200ms) is longer than the first (attempt 1 => 100ms)
        assert!(second_until - clock.now_millis() > first_until - 150);
    }

    #[test]
    fn mark_alive_resets_failure_count() {
        let clock = ManualClock::new();
        let node = Node::new("http://localhost:9200", vec![]);
        node.mark_dead(&clock, Duration::from_millis(100), Duration::from_secs(10));
        node.mark_alive();
        assert_eq!(node.state(&clock), NodeState::Alive);
    }

    #[test]
    fn resurrection_can_only_be_claimed_once() {
        let clock = ManualClock::new();
        let node = Node::new("http://localhost:9200", vec![]);
        node.mark_dead(&clock, Duration::from_millis(10), Duration::from_secs(10));
        clock.advance(Duration::from_millis(20));

        assert!(node.try_claim_resurrection(&clock));
        assert!(!node.try_claim_resurrection(&clock));

        node.mark_alive();
        node.mark_dead(&clock, Duration::from_millis(10), Duration::from_secs(10));
        clock.advance(Duration::from_millis(20));
        assert!(node.try_claim_resurrection(&clock));
    }

    #[test]
    fn nodes_with_equal_uri_are_equal() {
        let a = Node::new("http://localhost:9200", vec!["data".into()]);
        let b = Node::new("http://localhost:9200", vec![]);
        assert_eq!(a, b);
    }
}
