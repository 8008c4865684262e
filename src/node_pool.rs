//! The set of known endpoints for a `Transport`, with liveness-aware traversal and atomic reseed.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;

use crate::clock::Clock;
use crate::error::ConfigError;
use crate::node::{Node, NodeState};

/// Controls which traversal/reseed rules apply to a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    /// Always the one configured node. Never reseeds.
    Single,
    /// Round-robins over a fixed seed set. Never reseeds.
    Static,
    /// Round-robins like `Static`, but may be replaced wholesale by a successful sniff.
    Sniffing,
    /// A single managed endpoint (e.g. a cloud control-plane URL). Never reseeds.
    Cloud,
}

struct PoolSnapshot {
    nodes: Vec<Node>,
    generation: u64,
}

/// An ordered collection of [`Node`]s with liveness tracking and (for sniffing pools) the
/// ability to be atomically replaced by a fresh node set.
///
/// Reads (`nodes()`, `mark_alive`) observe a consistent snapshot even while a concurrent
/// `reseed` is in flight: `arc_swap::ArcSwap` guarantees callers see either the whole old node
/// set or the whole new one, never a partial mix.
pub struct NodePool {
    kind: PoolKind,
    using_ssl: std::sync::atomic::AtomicBool,
    seed_nodes: Vec<Node>,
    snapshot: ArcSwap<PoolSnapshot>,
    cursor: AtomicUsize,
    last_sniff_millis: AtomicU64,
    sniffed_once: AtomicBool,
    clock: Arc<dyn Clock>,
}

impl NodePool {
    /// Builds a pool over `nodes`. `Single` and `Cloud` pools must be constructed with exactly
    /// one node; all kinds reject an empty node list — a pool is never empty after construction.
    pub fn new(
        kind: PoolKind,
        nodes: Vec<Node>,
        using_ssl: bool,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        if nodes.is_empty() {
            return Err(ConfigError::EmptyNodePool);
        }
        let now = clock.now_millis();
        Ok(Self {
            kind,
            using_ssl: std::sync::atomic::AtomicBool::new(using_ssl),
            seed_nodes: nodes.clone(),
            snapshot: ArcSwap::new(Arc::new(PoolSnapshot { nodes, generation: 0 })),
            cursor: AtomicUsize::new(0),
            last_sniff_millis: AtomicU64::new(now),
            sniffed_once: AtomicBool::new(false),
            clock,
        })
    }

    /// `true` if this pool has ever completed a sniff attempt (startup sniff fires only once).
    pub fn has_sniffed_once(&self) -> bool {
        self.sniffed_once.load(Ordering::Acquire)
    }

    /// Records that a sniff attempt (successful or not) has run against this pool.
    pub fn mark_sniffed_once(&self) {
        self.sniffed_once.store(true, Ordering::Release);
    }

    /// The pool's traversal/reseed category.
    pub fn kind(&self) -> PoolKind {
        self.kind
    }

    /// Whether a successful sniff may replace this pool's node set.
    pub fn supports_reseeding(&self) -> bool {
        matches!(self.kind, PoolKind::Sniffing)
    }

    /// Whether nodes in this pool are addressed over HTTPS.
    pub fn using_ssl(&self) -> bool {
        self.using_ssl.load(Ordering::Acquire)
    }

    /// The node set this pool was originally constructed with.
    pub fn seed_nodes(&self) -> &[Node] {
        &self.seed_nodes
    }

    /// Current number of nodes in the pool (live or dead).
    pub fn len(&self) -> usize {
        self.snapshot.load().nodes.len()
    }

    /// `true` if the pool currently has no nodes — never true after construction, since
    /// `reseed` on an empty set is rejected, but exposed for callers computing defaults.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Monotonically-increasing counter bumped on every successful reseed.
    pub fn generation(&self) -> u64 {
        self.snapshot.load().generation
    }

    /// Time elapsed since the pool was last (re)seeded by a sniff, used for
    /// `sniff_on_stale_cluster` staleness checks. Construction counts as the initial "sniff".
    pub fn age(&self) -> Duration {
        let last = self.last_sniff_millis.load(Ordering::Acquire);
        let now = self.clock.now_millis();
        Duration::from_millis(now.saturating_sub(last))
    }

    /// Marks the pool as freshly sniffed without changing its node set (used when a sniff
    /// attempt runs but yields an identical topology, or by `reseed`).
    pub fn touch_sniff(&self) {
        self.last_sniff_millis.store(self.clock.now_millis(), Ordering::Release);
    }

    /// Atomically replaces the node set. No-op (returns `false`) for pools that don't support
    /// reseeding. Applying the same new set twice in a row is idempotent in content, though
    /// `generation` still strictly increases each time, since each call is itself a fresh reseed
    /// event.
    pub fn reseed(&self, new_nodes: Vec<Node>, using_ssl: bool) -> bool {
        if !self.supports_reseeding() || new_nodes.is_empty() {
            return false;
        }
        let next_generation = self.snapshot.load().generation + 1;
        self.snapshot.store(Arc::new(PoolSnapshot { nodes: new_nodes, generation: next_generation }));
        self.using_ssl.store(using_ssl, Ordering::Release);
        self.touch_sniff();
        true
    }

    /// Marks `node` dead using this pool's clock and the supplied back-off bounds.
    pub fn mark_dead(&self, node: &Node, dead_timeout: Duration, max_dead_timeout: Duration) {
        node.mark_dead(&*self.clock, dead_timeout, max_dead_timeout);
    }

    /// Marks `node` alive.
    pub fn mark_alive(&self, node: &Node) {
        node.mark_alive();
    }

    /// A lazy(-ish), restartable, finite traversal of candidate nodes in this pool's order,
    /// skipping nodes still `Dead` and yielding at most one `Resurrecting` node. Advances the
    /// pool's round-robin cursor iff at least one node was produced.
    pub fn nodes(&self) -> NodeTraversal {
        let snapshot = self.snapshot.load_full();
        let n = snapshot.nodes.len();
        if n == 0 {
            return NodeTraversal { candidates: Vec::new().into_iter() };
        }
        let start = self.cursor.load(Ordering::Acquire) % n;
        let mut candidates = Vec::with_capacity(n);
        let mut claimed_a_resurrection = false;

        for i in 0..n {
            let idx = (start + i) % n;
            let node = snapshot.nodes[idx].clone();
            match node.state(&*self.clock) {
                NodeState::Alive => candidates.push(node),
                NodeState::Resurrecting { .. } => {
                    if !claimed_a_resurrection && node.try_claim_resurrection(&*self.clock) {
                        claimed_a_resurrection = true;
                        candidates.push(node);
                    }
                }
                NodeState::Dead { .. } => {}
            }
        }

        if !candidates.is_empty() {
            self.cursor.store((start + 1) % n, Ordering::Release);
        }
        NodeTraversal { candidates: candidates.into_iter() }
    }

    /// Borrows this pool's clock, for callers (the pipeline) that need to evaluate `Node::state`
    /// between pool operations without owning a clock of their own.
    pub fn clock_ref(&self) -> &dyn Clock {
        &*self.clock
    }

    /// The node whose `dead_until` is soonest, for the "all nodes dead" forced-attempt rule.
    /// `None` only if the pool is somehow empty.
    pub fn soonest_reviving(&self) -> Option<Node> {
        let snapshot = self.snapshot.load_full();
        snapshot
            .nodes
            .iter()
            .min_by_key(|n| n.dead_until_millis(&*self.clock).unwrap_or(0))
            .cloned()
    }
}

/// Iterator over the candidate nodes produced by [`NodePool::nodes`].
pub struct NodeTraversal {
    candidates: std::vec::IntoIter<Node>,
}

impl Iterator for NodeTraversal {
    type Item = Node;

    fn next(&mut self) -> Option<Node> {
        self.candidates.next()
    }
}
