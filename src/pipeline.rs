//! `RequestPipeline`: the core state machine.
//!
//! Unlike a generic resilience stack that composes independent policies — retry/timeout/
//! circuit-breaker/bulkhead — over one opaque operation closure, this loop's retry target changes
//! *which node* each iteration and must consult `NodePool`/`ProductRegistration` between
//! attempts. A generic `RetryPolicy<E>` can't express "ask the pool for the next candidate, maybe
//! ping it, maybe trigger a sniff" between retries, so `run` is one bespoke `#[instrument]` async
//! function implementing the state machine directly.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::audit::{AuditEvent, AuditEventKind, AuditTrail};
use crate::config::BoundConfiguration;
use crate::diagnostics::{self, DiagnosticEvent, DiagnosticSink};
use crate::endpoint::{Endpoint, HttpMethod};
use crate::error::TransportError;
use crate::invoker::{InvokerError, RequestInvoker};
use crate::node::{Node, NodeState};
use crate::node_pool::NodePool;
use crate::post_data::PostData;
use crate::product::ProductRegistration;
use crate::response::{ResponseFactory, TransportResponse};
use crate::serializer::Serializer;

/// The result a sniff attempt broadcasts to any callers waiting on the same pool's
/// [`SniffCoordinator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SniffOutcome {
    Reseeded { generation: u64 },
    Unchanged,
    Failed,
}

/// Why the node-traversal loop ended without a successful attempt, used to pick the terminal
/// audit event: always `MaxTimeoutReached` or `MaxRetriesReached`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopExit {
    DeadlineExceeded,
    AttemptsExhausted,
    TraversalExhausted,
}

/// Single-flight coordination for a pool's sniff requests: at most one sniff is in flight per
/// pool at a time, and attempts arriving while one is in flight wait on it and reuse its result.
///
/// Built on `tokio::sync::{Mutex, watch}` rather than a semaphore that would just reject excess
/// callers: late arrivals here must *wait for and reuse* the in-flight winner's result.
#[derive(Debug)]
pub struct SniffCoordinator {
    mutex: tokio::sync::Mutex<()>,
    broadcast: tokio::sync::watch::Sender<Option<SniffOutcome>>,
}

impl Default for SniffCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl SniffCoordinator {
    pub fn new() -> Self {
        let (tx, _rx) = tokio::sync::watch::channel(None);
        Self { mutex: tokio::sync::Mutex::new(()), broadcast: tx }
    }

    /// Runs `op` if no sniff is currently in flight, otherwise waits (bounded by `wait_budget`)
    /// for the in-flight winner's result. Cancellation aborts the wait immediately.
    pub async fn run_or_join<F, Fut>(&self, wait_budget: Duration, cancellation: &CancellationToken, op: F) -> SniffOutcome
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = SniffOutcome>,
    {
        match self.mutex.try_lock() {
            Ok(_guard) => {
                let outcome = op().await;
                let _ = self.broadcast.send(Some(outcome));
                outcome
            }
            Err(_) => {
                let mut receiver = self.broadcast.subscribe();
                tokio::select! {
                    _ = cancellation.cancelled() => SniffOutcome::Failed,
                    result = tokio::time::timeout(wait_budget, receiver.changed()) => {
                        match result {
                            Ok(Ok(())) => receiver.borrow().unwrap_or(SniffOutcome::Failed),
                            _ => SniffOutcome::Failed,
                        }
                    }
                }
            }
        }
    }
}

/// Orchestrates one logical call: sniff-first, ping-on-revival, node iteration with retry/
/// failover, and failure aggregation.
pub struct RequestPipeline<D: DiagnosticSink = diagnostics::NullSink> {
    pool: Arc<NodePool>,
    invoker: Arc<dyn RequestInvoker>,
    product: Arc<dyn ProductRegistration>,
    response_factory: Arc<ResponseFactory>,
    sniff_coordinator: Arc<SniffCoordinator>,
    diagnostics: D,
    using_ssl: bool,
}

impl<D: DiagnosticSink> RequestPipeline<D> {
    pub fn new(
        pool: Arc<NodePool>,
        invoker: Arc<dyn RequestInvoker>,
        product: Arc<dyn ProductRegistration>,
        response_factory: Arc<ResponseFactory>,
        sniff_coordinator: Arc<SniffCoordinator>,
        diagnostics: D,
        using_ssl: bool,
    ) -> Self {
        Self { pool, invoker, product, response_factory, sniff_coordinator, diagnostics, using_ssl }
    }

    /// Runs one logical call to completion: selects nodes, attempts requests, pings revived
    /// nodes, triggers sniffs, and retries until success, exhaustion, or cancellation.
    #[tracing::instrument(skip(self, body, serializer, bound_config, cancellation), fields(method = %method))]
    pub async fn run<T, S>(
        &self,
        method: HttpMethod,
        path_and_query: &str,
        body: Option<&PostData>,
        bound_config: &BoundConfiguration,
        serializer: &S,
        cancellation: &CancellationToken,
    ) -> Result<TransportResponse<T>, TransportError>
    where
        T: DeserializeOwned,
        S: Serializer,
    {
        let start = Instant::now();
        let mut audit = AuditTrail::new();
        let deadline = start + bound_config.max_retry_timeout();
        let max_attempts = bound_config.max_retries() + 1;

        if self.product.supports_sniff()
            && !bound_config.disable_sniff_on_startup()
            && !self.pool.has_sniffed_once()
        {
            self.sniff(bound_config, cancellation, &mut audit, start, AuditEventKind::SniffOnStartup).await;
        }

        let mut attempts_made = 0usize;
        let mut last_error: Option<TransportError> = None;

        let mut traversal: Vec<Node> = self.pool.nodes().collect();
        if traversal.is_empty() {
            if let Some(soonest) = self.pool.soonest_reviving() {
                audit.push(AuditEvent::new(AuditEventKind::AllNodesDead, Some(&soonest), elapsed_millis(start), Duration::ZERO));
                traversal.push(soonest);
            } else {
                audit.push(AuditEvent::new(AuditEventKind::NoNodesAttempted, None, elapsed_millis(start), Duration::ZERO));
            }
        }

        let mut exit_reason = LoopExit::TraversalExhausted;

        for node in traversal {
            if cancellation.is_cancelled() {
                audit.push(AuditEvent::new(AuditEventKind::CancellationRequested, Some(&node), elapsed_millis(start), start.elapsed()));
                return Err(TransportError::Cancelled);
            }
            if Instant::now() >= deadline {
                exit_reason = LoopExit::DeadlineExceeded;
                break;
            }
            if attempts_made >= max_attempts {
                exit_reason = LoopExit::AttemptsExhausted;
                break;
            }

            if self.product.supports_sniff()
                && bound_config.sniff_on_stale_cluster()
                && self.pool.age() > bound_config.sniff_lifespan()
            {
                self.sniff(bound_config, cancellation, &mut audit, start, AuditEventKind::SniffOnStaleCluster).await;
            }

            if matches!(node.state(self.clock()), NodeState::Resurrecting { .. })
                && self.product.supports_ping()
                && !bound_config.disable_pings()
            {
                audit.push(AuditEvent::new(AuditEventKind::Resurrection, Some(&node), elapsed_millis(start), Duration::ZERO));
                if !self.ping(&node, bound_config, &mut audit, start).await {
                    self.pool.mark_dead(&node, bound_config.dead_timeout(), bound_config.max_dead_timeout());
                    continue;
                }
            }

            attempts_made += 1;
            let endpoint = Endpoint::new(method, path_and_query, node.clone());
            diagnostics::emit_best_effort(self.diagnostics.clone(), DiagnosticEvent::AttemptStarted { node: node.uri().to_string(), method }).await;
            let attempt_start = Instant::now();

            match self.invoker.request(&endpoint, bound_config, body).await {
                Ok(outcome) => {
                    let status = outcome.status;
                    let elapsed = attempt_start.elapsed();
                    diagnostics::emit_best_effort(
                        self.diagnostics.clone(),
                        DiagnosticEvent::AttemptFinished { node: node.uri().to_string(), method, status: Some(status), duration: elapsed },
                    )
                    .await;

                    if !bound_config.is_retryable_status(method, status) && !self.product.http_status_code_classifier(method, status) {
                        audit.push(AuditEvent::new(AuditEventKind::HealthyResponse, Some(&node), elapsed_millis(start), elapsed));
                        self.pool.mark_alive(&node);
                        let request_body_in_bytes = body.and_then(|b| b.captured_bytes());
                        return Ok(self.response_factory.build::<T, S>(
                            serializer,
                            self.product.as_ref(),
                            method,
                            endpoint.uri(),
                            outcome,
                            bound_config,
                            audit,
                            request_body_in_bytes,
                        ));
                    }

                    if self.product.http_status_code_classifier(method, status) {
                        audit.push(AuditEvent::new(AuditEventKind::HealthyResponse, Some(&node), elapsed_millis(start), elapsed));
                        self.pool.mark_alive(&node);
                        let request_body_in_bytes = body.and_then(|b| b.captured_bytes());
                        return Ok(self.response_factory.build::<T, S>(
                            serializer,
                            self.product.as_ref(),
                            method,
                            endpoint.uri(),
                            outcome,
                            bound_config,
                            audit,
                            request_body_in_bytes,
                        ));
                    }

                    tracing::warn!(node = %node.uri(), status, "non-success response, marking node dead");
                    audit.push(
                        AuditEvent::new(AuditEventKind::BadResponse, Some(&node), elapsed_millis(start), elapsed)
                            .with_exception(format!("status {status}")),
                    );
                    self.pool.mark_dead(&node, bound_config.dead_timeout(), bound_config.max_dead_timeout());
                    last_error = Some(TransportError::NonSuccess { status, method: method.to_string(), path: path_and_query.to_string() });
                    continue;
                }
                Err(InvokerError::Cancelled) => {
                    audit.push(AuditEvent::new(AuditEventKind::CancellationRequested, Some(&node), elapsed_millis(start), attempt_start.elapsed()));
                    return Err(TransportError::Cancelled);
                }
                Err(err) => {
                    let elapsed = attempt_start.elapsed();
                    tracing::warn!(node = %node.uri(), error = %err, "transient error, marking node dead");
                    audit.push(
                        AuditEvent::new(AuditEventKind::BadResponse, Some(&node), elapsed_millis(start), elapsed).with_exception(err.to_string()),
                    );
                    self.pool.mark_dead(&node, bound_config.dead_timeout(), bound_config.max_dead_timeout());

                    last_error = Some(match err {
                        InvokerError::Timeout { elapsed, limit } => TransportError::Timeout { node: node.uri().to_string(), elapsed, limit },
                        InvokerError::Transient(source) => TransportError::Transient { node: node.uri().to_string(), source },
                        InvokerError::Cancelled => unreachable!("handled above"),
                    });

                    if self.product.supports_sniff() && !bound_config.disable_sniff_on_connection_failure() {
                        self.sniff(bound_config, cancellation, &mut audit, start, AuditEventKind::SniffOnFailure).await;
                    }

                    if attempts_made >= max_attempts {
                        exit_reason = LoopExit::AttemptsExhausted;
                        break;
                    }
                    if Instant::now() >= deadline {
                        exit_reason = LoopExit::DeadlineExceeded;
                        break;
                    }
                    continue;
                }
            }
        }

        tracing::error!(attempts = attempts_made, "node pool exhausted");
        let terminal_kind = match exit_reason {
            LoopExit::DeadlineExceeded => AuditEventKind::MaxTimeoutReached,
            LoopExit::AttemptsExhausted => AuditEventKind::MaxRetriesReached,
            LoopExit::TraversalExhausted => AuditEventKind::FailedOverAllNodes,
        };
        audit.push(AuditEvent::new(terminal_kind, None, elapsed_millis(start), start.elapsed()));

        let error = TransportError::PoolExhausted {
            attempts: attempts_made,
            last: last_error.map(|e| e.to_string()).unwrap_or_else(|| "no candidate node was available".to_string()),
            audit,
        };
        Err(error)
    }

    async fn sniff(
        &self,
        bound_config: &BoundConfiguration,
        cancellation: &CancellationToken,
        audit: &mut AuditTrail,
        call_start: Instant,
        trigger: AuditEventKind,
    ) -> SniffOutcome {
        audit.push(AuditEvent::new(trigger, None, elapsed_millis(call_start), Duration::ZERO));
        diagnostics::emit_best_effort(self.diagnostics.clone(), DiagnosticEvent::SniffStarted).await;
        let sniff_start = Instant::now();

        let pool = Arc::clone(&self.pool);
        let invoker = Arc::clone(&self.invoker);
        let product = Arc::clone(&self.product);
        let bound_config = bound_config.clone();
        let using_ssl = self.using_ssl;

        let outcome = self
            .sniff_coordinator
            .run_or_join(bound_config.ping_timeout(), cancellation, move || async move {
                let mut candidates: Vec<Node> = pool.seed_nodes().to_vec();
                candidates.sort_by_key(|n| product.sniff_order(n));
                for candidate in candidates {
                    if !product.node_predicate(&candidate) {
                        continue;
                    }
                    let endpoint = product.create_sniff_endpoint(&candidate, &bound_config);
                    match product.sniff(invoker.as_ref(), using_ssl, &endpoint, &bound_config).await {
                        Ok((_outcome, new_nodes)) if !new_nodes.is_empty() => {
                            if pool.reseed(new_nodes, using_ssl) {
                                return SniffOutcome::Reseeded { generation: pool.generation() };
                            }
                            return SniffOutcome::Unchanged;
                        }
                        Ok(_) => continue,
                        Err(_) => continue,
                    }
                }
                pool.touch_sniff();
                SniffOutcome::Failed
            })
            .await;

        self.pool.mark_sniffed_once();
        diagnostics::emit_best_effort(
            self.diagnostics.clone(),
            DiagnosticEvent::SniffFinished {
                discovered_nodes: if matches!(outcome, SniffOutcome::Reseeded { .. }) { self.pool.len() } else { 0 },
                duration: sniff_start.elapsed(),
            },
        )
        .await;
        let outcome_kind = match outcome {
            SniffOutcome::Reseeded { .. } | SniffOutcome::Unchanged => AuditEventKind::SniffSuccess,
            SniffOutcome::Failed => AuditEventKind::SniffFailure,
        };
        audit.push(AuditEvent::new(outcome_kind, None, elapsed_millis(call_start), sniff_start.elapsed()));
        outcome
    }

    async fn ping(&self, node: &Node, bound_config: &BoundConfiguration, audit: &mut AuditTrail, start: Instant) -> bool {
        diagnostics::emit_best_effort(self.diagnostics.clone(), DiagnosticEvent::PingStarted { node: node.uri().to_string() }).await;
        let ping_start = Instant::now();
        let endpoint = self.product.create_ping_endpoint(node, bound_config);
        let success = self.product.ping(self.invoker.as_ref(), &endpoint, bound_config).await.is_ok();
        diagnostics::emit_best_effort(
            self.diagnostics.clone(),
            DiagnosticEvent::PingFinished { node: node.uri().to_string(), success, duration: ping_start.elapsed() },
        )
        .await;

        if success {
            self.pool.mark_alive(node);
            audit.push(AuditEvent::new(AuditEventKind::PingSuccess, Some(node), elapsed_millis(start), ping_start.elapsed()));
        } else {
            audit.push(AuditEvent::new(AuditEventKind::PingFailure, Some(node), elapsed_millis(start), ping_start.elapsed()));
        }
        success
    }

    fn clock(&self) -> &dyn crate::clock::Clock {
        // `NodePool` already owns the authoritative clock; this just borrows its reference for
        // the pipeline's own `node.state()` checks between pool operations.
        self.pool.clock_ref()
    }
}

fn elapsed_millis(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

const _: fn() = || {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<SniffCoordinator>();
};

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sniff_coordinator_runs_single_winner_and_broadcasts() {
        let coordinator = SniffCoordinator::new();
        let cancellation = CancellationToken::new();
        let outcome = coordinator
            .run_or_join(Duration::from_millis(50), &cancellation, || async { SniffOutcome::Reseeded { generation: 1 } })
            .await;
        assert_eq!(outcome, SniffOutcome::Reseeded { generation: 1 });
    }

    #[tokio::test]
    async fn sniff_coordinator_join_times_out_without_winner() {
        let coordinator = SniffCoordinator::new();
        let cancellation = CancellationToken::new();
        let _guard = coordinator.mutex.lock().await;
        let outcome = coordinator.run_or_join(Duration::from_millis(10), &cancellation, || async { SniffOutcome::Unchanged }).await;
        assert_eq!(outcome, SniffOutcome::Failed);
    }
}
