//! Trade routing and execution control
//!
//! The router is the single dispatch point between normalized trade
//! requests and venue adapters. It owns the per-venue execution slots
//! (one mutating call per venue at a time), the idempotency ledger that
//! makes client retries replay-safe, and the retry policy for transient
//! venue outages.

use crate::config::RouterConfig;
use crate::error::{GatewayError, Result};
use crate::types::{Balances, TradeRequest, TradeResult, TradeStatus, Venue};
use crate::venue::{AdapterRegistry, VenueAdapter};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::RwLock;
use rand::Rng;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Background poller gives up after this many attempts; the ledger keeps
/// the pending entry either way so the order is never forgotten.
const BACKGROUND_POLL_ATTEMPTS: u32 = 120;

#[derive(Clone)]
struct LedgerEntry {
    result: TradeResult,
    recorded_at: DateTime<Utc>,
}

type LedgerKey = (Venue, String);

pub struct TradeRouter {
    registry: Arc<AdapterRegistry>,
    config: RouterConfig,
    /// Lazily created exclusive execution slot per venue
    slots: Mutex<HashMap<Venue, Arc<Mutex<()>>>>,
    /// Outcomes keyed by (venue, idempotency key), bounded by a time window
    ledger: Arc<RwLock<HashMap<LedgerKey, LedgerEntry>>>,
}

impl TradeRouter {
    pub fn new(registry: Arc<AdapterRegistry>, config: RouterConfig) -> Self {
        Self {
            registry,
            config,
            slots: Mutex::new(HashMap::new()),
            ledger: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn registry(&self) -> &Arc<AdapterRegistry> {
        &self.registry
    }

    /// Execute a trade with at-most-once semantics per idempotency key.
    ///
    /// Requests for different venues proceed fully in parallel; requests
    /// for the same venue are serialized by the venue slot. Adapter-level
    /// failures come back as a `failed` TradeResult carrying the taxonomy
    /// kind; only a missing adapter or an invalid request is a hard error.
    pub async fn execute(
        &self,
        request: &TradeRequest,
        idempotency_key: &str,
    ) -> Result<TradeResult> {
        request.validate()?;

        let adapter = self
            .registry
            .get(request.venue)
            .await
            .ok_or(GatewayError::UnknownVenue(request.venue))?;

        let slot = self.slot(request.venue).await;
        let _guard = slot.lock().await;

        let key: LedgerKey = (request.venue, idempotency_key.to_string());
        if let Some(entry) = self.ledger.read().get(&key) {
            tracing::debug!(
                venue = %request.venue,
                idempotency_key,
                "replaying recorded outcome"
            );
            return Ok(entry.result.clone());
        }
        self.evict_stale();

        let trade_id = uuid::Uuid::new_v4().to_string();
        tracing::info!(
            venue = %request.venue,
            %trade_id,
            kind = %request.kind,
            symbol = %request.symbol,
            amount = %request.amount,
            "executing trade"
        );

        // Each arm records its outcome before the slot is released so a
        // concurrent duplicate cannot race past the replay check.
        let result = match self.call_with_retry(adapter.as_ref(), &trade_id, request).await {
            Ok(result) if !result.is_terminal() => {
                // Keep the non-terminal entry in the ledger: eviction will
                // not touch it and a duplicate request replays it instead
                // of re-submitting.
                self.record(&key, result.clone());
                self.resolve_pending(adapter.clone(), key.clone(), result).await
            }
            Ok(result) => {
                self.record(&key, result.clone());
                result
            }
            Err(e) => {
                tracing::warn!(venue = %request.venue, %trade_id, error = %e, "trade failed");
                let mut failed = TradeResult::failed(request.venue, &e);
                failed.trade_id = trade_id;
                self.record(&key, failed.clone());
                failed
            }
        };
        Ok(result)
    }

    /// Balances read; runs concurrently with in-flight executions.
    pub async fn balance(&self, venue: Venue, symbol: Option<&str>) -> Result<Balances> {
        let adapter = self
            .registry
            .get(venue)
            .await
            .ok_or(GatewayError::UnknownVenue(venue))?;
        adapter.get_balance(symbol).await
    }

    /// Balances across every registered venue; venues that fail to
    /// answer report empty rather than poisoning the others.
    pub async fn all_balances(&self) -> HashMap<Venue, Balances> {
        let mut out = HashMap::new();
        for venue in self.registry.list().await {
            match self.balance(venue, None).await {
                Ok(balances) => {
                    out.insert(venue, balances);
                }
                Err(e) => {
                    tracing::warn!(%venue, error = %e, "balance fetch failed");
                    out.insert(venue, Balances::new());
                }
            }
        }
        out
    }

    pub async fn price(&self, venue: Venue, symbol: &str) -> Result<Decimal> {
        let adapter = self
            .registry
            .get(venue)
            .await
            .ok_or(GatewayError::UnknownVenue(venue))?;
        adapter.get_price(symbol).await
    }

    pub async fn order_status(&self, venue: Venue, order_id: &str) -> Result<TradeResult> {
        let adapter = self
            .registry
            .get(venue)
            .await
            .ok_or(GatewayError::UnknownVenue(venue))?;
        adapter.get_order_status(order_id).await
    }

    pub async fn cancel(&self, venue: Venue, order_id: &str) -> Result<bool> {
        let adapter = self
            .registry
            .get(venue)
            .await
            .ok_or(GatewayError::UnknownVenue(venue))?;
        adapter.cancel_order(order_id).await
    }

    /// Previously recorded outcome for an idempotency key, if any is
    /// still within the ledger window.
    pub fn recorded_outcome(&self, venue: Venue, idempotency_key: &str) -> Option<TradeResult> {
        self.ledger
            .read()
            .get(&(venue, idempotency_key.to_string()))
            .map(|e| e.result.clone())
    }

    pub fn ledger_len(&self) -> usize {
        self.ledger.read().len()
    }

    async fn slot(&self, venue: Venue) -> Arc<Mutex<()>> {
        self.slots
            .lock()
            .await
            .entry(venue)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn record(&self, key: &LedgerKey, result: TradeResult) {
        self.ledger.write().insert(
            key.clone(),
            LedgerEntry {
                result,
                recorded_at: Utc::now(),
            },
        );
    }

    /// Drop terminal outcomes older than the ledger window. Entries whose
    /// terminal status is still unknown are never evicted.
    fn evict_stale(&self) {
        let cutoff = Utc::now() - ChronoDuration::seconds(self.config.ledger_window_secs);
        self.ledger
            .write()
            .retain(|_, entry| !entry.result.is_terminal() || entry.recorded_at > cutoff);
    }

    /// Call the adapter, retrying only transient failures.
    ///
    /// Every attempt reuses the same trade id and idempotency key; a
    /// call-level timeout is terminal-unknown and is never retried.
    async fn call_with_retry(
        &self,
        adapter: &dyn VenueAdapter,
        trade_id: &str,
        request: &TradeRequest,
    ) -> Result<TradeResult> {
        let call_timeout = Duration::from_secs(self.config.call_timeout_secs);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            match tokio::time::timeout(call_timeout, adapter.execute_trade(trade_id, request)).await
            {
                Err(_) => {
                    return Err(GatewayError::Timeout(format!(
                        "venue call exceeded {}s; poll order status for the outcome",
                        self.config.call_timeout_secs
                    )))
                }
                Ok(Ok(result)) => return Ok(result),
                Ok(Err(e)) if e.is_transient() && attempt < self.config.max_attempts => {
                    let delay = self.backoff(attempt);
                    tracing::warn!(
                        venue = %request.venue,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient venue failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Ok(Err(e)) => return Err(e),
            }
        }
    }

    /// Exponential backoff with jitter, capped.
    fn backoff(&self, attempt: u32) -> Duration {
        let base = self
            .config
            .backoff_base_ms
            .saturating_mul(1u64 << (attempt - 1).min(16))
            .min(self.config.backoff_cap_ms);
        let jitter = rand::rng().random_range(0..=base / 2);
        Duration::from_millis(base + jitter)
    }

    /// Poll a pending result toward terminal within the caller's wait
    /// window; past the window, hand off to a background poller and
    /// surface `Timeout` while the ledger keeps the pending entry.
    ///
    /// A polled terminal outcome is recorded here; the synthetic timeout
    /// copy handed to the caller never overwrites the pending entry.
    async fn resolve_pending(
        &self,
        adapter: Arc<dyn VenueAdapter>,
        key: LedgerKey,
        pending: TradeResult,
    ) -> TradeResult {
        let Some(order_ref) = pending.tx_ref.clone() else {
            // Nothing to poll against; the pending entry stands as-is.
            return pending;
        };

        let deadline =
            tokio::time::Instant::now() + Duration::from_secs(self.config.pending_poll_secs);
        let interval = Duration::from_millis(self.config.poll_interval_ms);

        while tokio::time::Instant::now() < deadline {
            tokio::time::sleep(interval).await;
            match adapter.get_order_status(&order_ref).await {
                Ok(polled) if polled.status.is_terminal() => {
                    let resolved = merge_poll(&pending, polled);
                    self.record(&key, resolved.clone());
                    return resolved;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(order_ref = %order_ref, error = %e, "status poll failed");
                }
            }
        }

        tracing::warn!(
            venue = %pending.venue,
            trade_id = %pending.trade_id,
            order_ref = %order_ref,
            "pending order did not resolve within the wait window"
        );
        self.spawn_background_poll(adapter, key, pending.clone(), order_ref);

        let mut timed_out = pending;
        timed_out.status = TradeStatus::Failed;
        timed_out.error = Some(format!(
            "timeout: order still pending after {}s, poll order status for the outcome",
            self.config.pending_poll_secs
        ));
        timed_out
    }

    /// Keep polling after the caller's wait expired; the terminal result
    /// lands in the ledger for a later status query with the same key.
    fn spawn_background_poll(
        &self,
        adapter: Arc<dyn VenueAdapter>,
        key: LedgerKey,
        pending: TradeResult,
        order_ref: String,
    ) {
        let ledger = Arc::clone(&self.ledger);
        let interval = Duration::from_millis(self.config.poll_interval_ms.max(1_000) * 4);

        tokio::spawn(async move {
            for _ in 0..BACKGROUND_POLL_ATTEMPTS {
                tokio::time::sleep(interval).await;
                match adapter.get_order_status(&order_ref).await {
                    Ok(polled) if polled.status.is_terminal() => {
                        let resolved = merge_poll(&pending, polled);
                        tracing::info!(
                            trade_id = %resolved.trade_id,
                            status = ?resolved.status,
                            "pending order resolved in background"
                        );
                        ledger.write().insert(
                            key,
                            LedgerEntry {
                                result: resolved,
                                recorded_at: Utc::now(),
                            },
                        );
                        return;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::debug!(order_ref = %order_ref, error = %e, "background poll failed");
                    }
                }
            }
            tracing::warn!(order_ref = %order_ref, "background poll gave up, entry stays pending");
        });
    }
}

/// Fold a polled status into the original result, keeping the router's
/// trade identity and the original venue.
fn merge_poll(original: &TradeResult, polled: TradeResult) -> TradeResult {
    TradeResult {
        trade_id: original.trade_id.clone(),
        venue: original.venue,
        status: polled.status,
        tx_ref: original.tx_ref.clone().or(polled.tx_ref),
        executed_amount: polled.executed_amount.or(original.executed_amount),
        executed_price: polled.executed_price.or(original.executed_price),
        fee: polled.fee.or(original.fee),
        timestamp: Utc::now(),
        error: polled.error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubAdapter;
    use crate::types::TradeKind;
    use rust_decimal_macros::dec;

    fn test_config() -> RouterConfig {
        RouterConfig {
            max_attempts: 3,
            call_timeout_secs: 5,
            backoff_base_ms: 1,
            backoff_cap_ms: 2,
            ledger_window_secs: 900,
            pending_poll_secs: 2,
            poll_interval_ms: 10,
        }
    }

    async fn router_with_stub(venue: Venue) -> (TradeRouter, Arc<StubAdapter>) {
        let registry = Arc::new(AdapterRegistry::new());
        let stub = Arc::new(StubAdapter::new(venue));
        registry.register_adapter(venue, stub.clone()).await;
        (TradeRouter::new(registry, test_config()), stub)
    }

    fn swap_request() -> TradeRequest {
        TradeRequest::new(Venue::Dex, TradeKind::Swap, "SOL/USDC", dec!(1.0))
            .with_slippage(dec!(0.01))
    }

    fn pending_result(venue: Venue, order_ref: &str) -> TradeResult {
        TradeResult {
            trade_id: String::new(),
            venue,
            status: TradeStatus::Pending,
            tx_ref: Some(order_ref.to_string()),
            executed_amount: None,
            executed_price: None,
            fee: None,
            timestamp: Utc::now(),
            error: None,
        }
    }

    #[tokio::test]
    async fn completed_trade_round_trips() {
        let (router, stub) = router_with_stub(Venue::Dex).await;

        let result = router.execute(&swap_request(), "key-1").await.unwrap();
        assert_eq!(result.status, TradeStatus::Completed);
        assert_eq!(result.venue, Venue::Dex);
        assert_eq!(result.executed_amount, Some(dec!(1.0)));
        assert_eq!(result.executed_price, Some(dec!(100)));
        assert_eq!(stub.execute_calls(), 1);
    }

    #[tokio::test]
    async fn unknown_venue_is_hard_error_and_ledger_untouched() {
        let registry = Arc::new(AdapterRegistry::new());
        let router = TradeRouter::new(registry, test_config());

        let err = router.execute(&swap_request(), "key-1").await.unwrap_err();
        assert_eq!(err.kind(), "unknown_venue");
        assert_eq!(router.ledger_len(), 0);
    }

    #[tokio::test]
    async fn invalid_request_never_reaches_adapter() {
        let (router, stub) = router_with_stub(Venue::Dex).await;

        let mut request = swap_request();
        request.amount = dec!(-1);
        let err = router.execute(&request, "key-1").await.unwrap_err();
        assert_eq!(err.kind(), "invalid_request");
        assert_eq!(stub.execute_calls(), 0);
    }

    #[tokio::test]
    async fn duplicate_key_replays_without_reexecuting() {
        let (router, stub) = router_with_stub(Venue::Dex).await;
        let request = swap_request();

        let first = router.execute(&request, "key-dup").await.unwrap();
        let second = router.execute(&request, "key-dup").await.unwrap();

        assert_eq!(first.trade_id, second.trade_id);
        assert_eq!(stub.execute_calls(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_duplicates_execute_at_most_once() {
        let (router, stub) = router_with_stub(Venue::Dex).await;
        let router = Arc::new(router);
        let request = swap_request();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let router = router.clone();
            let request = request.clone();
            handles.push(tokio::spawn(async move {
                router.execute(&request, "key-race").await.unwrap()
            }));
        }

        let mut trade_ids = Vec::new();
        for handle in handles {
            trade_ids.push(handle.await.unwrap().trade_id);
        }

        trade_ids.dedup();
        assert_eq!(trade_ids.len(), 1, "all callers must see the same outcome");
        assert_eq!(stub.execute_calls(), 1);
    }

    #[tokio::test]
    async fn transient_failures_retry_until_success() {
        let (router, stub) = router_with_stub(Venue::Dex).await;
        stub.push_execute(Err(GatewayError::VenueUnavailable("down".into())));
        stub.push_execute(Err(GatewayError::VenueUnavailable("down".into())));
        // Third attempt falls through to the default completed fill.

        let result = router.execute(&swap_request(), "key-retry").await.unwrap();
        assert_eq!(result.status, TradeStatus::Completed);
        assert_eq!(stub.execute_calls(), 3);
    }

    #[tokio::test]
    async fn retry_budget_exhaustion_surfaces_failed_result() {
        let (router, stub) = router_with_stub(Venue::Dex).await;
        for _ in 0..3 {
            stub.push_execute(Err(GatewayError::VenueUnavailable("down".into())));
        }

        let result = router.execute(&swap_request(), "key-down").await.unwrap();
        assert_eq!(result.status, TradeStatus::Failed);
        assert!(result.error.as_deref().unwrap().contains("venue_unavailable"));
        assert_eq!(stub.execute_calls(), 3);
    }

    #[tokio::test]
    async fn business_rejections_are_never_retried() {
        let (router, stub) = router_with_stub(Venue::Dex).await;
        stub.push_execute(Err(GatewayError::Rejected("market closed".into())));

        let result = router.execute(&swap_request(), "key-rej").await.unwrap();
        assert_eq!(result.status, TradeStatus::Failed);
        assert!(result.error.as_deref().unwrap().contains("rejected"));
        assert_eq!(stub.execute_calls(), 1);
    }

    #[tokio::test]
    async fn failed_outcome_is_replayed_for_duplicate_key() {
        let (router, stub) = router_with_stub(Venue::Dex).await;
        stub.push_execute(Err(GatewayError::Rejected("market closed".into())));

        let first = router.execute(&swap_request(), "key-rep").await.unwrap();
        let second = router.execute(&swap_request(), "key-rep").await.unwrap();

        assert_eq!(first.trade_id, second.trade_id);
        assert_eq!(second.status, TradeStatus::Failed);
        assert_eq!(stub.execute_calls(), 1);
    }

    #[tokio::test]
    async fn pending_result_polls_to_terminal() {
        let (router, stub) = router_with_stub(Venue::Dex).await;
        stub.push_execute(Ok(pending_result(Venue::Dex, "order-77")));
        // First poll answers with the default completed status result.

        let result = router.execute(&swap_request(), "key-pending").await.unwrap();
        assert_eq!(result.status, TradeStatus::Completed);
        assert_eq!(result.tx_ref.as_deref(), Some("order-77"));
        assert!(stub.status_calls() >= 1);
    }

    #[tokio::test]
    async fn unresolved_pending_times_out_but_ledger_keeps_pending_entry() {
        let registry = Arc::new(AdapterRegistry::new());
        let stub = Arc::new(StubAdapter::new(Venue::Dex));
        registry.register_adapter(Venue::Dex, stub.clone()).await;

        let config = RouterConfig {
            pending_poll_secs: 0, // caller wait expires immediately
            poll_interval_ms: 10,
            ..test_config()
        };
        let router = TradeRouter::new(registry, config);
        stub.push_execute(Ok(pending_result(Venue::Dex, "order-slow")));

        let result = router.execute(&swap_request(), "key-slow").await.unwrap();
        assert_eq!(result.status, TradeStatus::Failed);
        assert!(result.error.as_deref().unwrap().contains("timeout"));
        assert_eq!(result.tx_ref.as_deref(), Some("order-slow"));

        // The ledger still holds the non-terminal entry; a duplicate
        // request replays instead of re-submitting.
        let recorded = router.recorded_outcome(Venue::Dex, "key-slow").unwrap();
        assert_eq!(recorded.status, TradeStatus::Pending);

        let replay = router.execute(&swap_request(), "key-slow").await.unwrap();
        assert_eq!(replay.status, TradeStatus::Pending);
        assert_eq!(stub.execute_calls(), 1);
    }

    #[tokio::test]
    async fn eviction_drops_only_stale_terminal_entries() {
        let registry = Arc::new(AdapterRegistry::new());
        let config = RouterConfig {
            ledger_window_secs: 0,
            ..test_config()
        };
        let router = TradeRouter::new(registry, config);

        let old = Utc::now() - ChronoDuration::seconds(60);
        let terminal = TradeResult {
            trade_id: "t-done".into(),
            venue: Venue::Dex,
            status: TradeStatus::Completed,
            tx_ref: None,
            executed_amount: None,
            executed_price: None,
            fee: None,
            timestamp: old,
            error: None,
        };
        let mut pending = terminal.clone();
        pending.trade_id = "t-wait".into();
        pending.status = TradeStatus::Pending;
        let mut executing = terminal.clone();
        executing.trade_id = "t-run".into();
        executing.status = TradeStatus::Executing;

        router.ledger.write().insert(
            (Venue::Dex, "done".into()),
            LedgerEntry {
                result: terminal,
                recorded_at: old,
            },
        );
        router.ledger.write().insert(
            (Venue::Dex, "wait".into()),
            LedgerEntry {
                result: pending,
                recorded_at: old,
            },
        );
        router.ledger.write().insert(
            (Venue::Dex, "run".into()),
            LedgerEntry {
                result: executing,
                recorded_at: old,
            },
        );

        router.evict_stale();

        assert!(router.recorded_outcome(Venue::Dex, "done").is_none());
        assert!(router.recorded_outcome(Venue::Dex, "wait").is_some());
        assert!(router.recorded_outcome(Venue::Dex, "run").is_some());
    }

    #[tokio::test]
    async fn reads_do_not_take_the_execution_slot() {
        let (router, _stub) = router_with_stub(Venue::Dex).await;

        // Hold the dex slot as an in-flight execution would.
        let slot = router.slot(Venue::Dex).await;
        let _guard = slot.lock().await;

        let price = tokio::time::timeout(
            Duration::from_millis(200),
            router.price(Venue::Dex, "SOL/USDC"),
        )
        .await
        .expect("price read must not wait on the execution slot")
        .unwrap();
        assert_eq!(price, dec!(100));

        let balances = tokio::time::timeout(
            Duration::from_millis(200),
            router.balance(Venue::Dex, None),
        )
        .await
        .expect("balance read must not wait on the execution slot")
        .unwrap();
        assert!(balances.contains_key("USDC"));
    }
}
