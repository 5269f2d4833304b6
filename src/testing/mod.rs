//! Test support: scriptable stub adapters and providers
//!
//! Used by unit and integration tests across the crate; kept in the
//! library so binaries can wire a paper venue for dry runs as well.

use crate::agent::provider::{ChunkStream, CompletionProvider, CompletionRequest};
use crate::error::{GatewayError, Result};
use crate::types::{Balances, TradeRequest, TradeResult, TradeStatus, Venue};
use crate::venue::VenueAdapter;
use async_trait::async_trait;
use chrono::Utc;
use futures_util::StreamExt;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Scriptable in-memory venue adapter with call counting.
///
/// With an empty script every trade completes at the configured fill
/// price; queued outcomes are consumed first, one per call.
pub struct StubAdapter {
    venue: Venue,
    fill_price: Mutex<Decimal>,
    balances: Mutex<Balances>,
    execute_script: Mutex<VecDeque<Result<TradeResult>>>,
    status_script: Mutex<VecDeque<TradeResult>>,
    execute_calls: AtomicUsize,
    status_calls: AtomicUsize,
}

impl StubAdapter {
    pub fn new(venue: Venue) -> Self {
        let mut balances = Balances::new();
        balances.insert("USDC".to_string(), Decimal::new(10_000, 0));

        Self {
            venue,
            fill_price: Mutex::new(Decimal::new(100, 0)),
            balances: Mutex::new(balances),
            execute_script: Mutex::new(VecDeque::new()),
            status_script: Mutex::new(VecDeque::new()),
            execute_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_fill_price(self, price: Decimal) -> Self {
        *self.fill_price.lock() = price;
        self
    }

    pub fn set_balances(&self, balances: Balances) {
        *self.balances.lock() = balances;
    }

    /// Queue an outcome for the next `execute_trade` call.
    pub fn push_execute(&self, result: Result<TradeResult>) {
        self.execute_script.lock().push_back(result);
    }

    /// Queue an outcome for the next `get_order_status` call.
    pub fn push_status(&self, result: TradeResult) {
        self.status_script.lock().push_back(result);
    }

    pub fn execute_calls(&self) -> usize {
        self.execute_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    /// A completed fill for `request` at the configured price.
    pub fn completed_result(&self, trade_id: &str, request: &TradeRequest) -> TradeResult {
        TradeResult {
            trade_id: trade_id.to_string(),
            venue: self.venue,
            status: TradeStatus::Completed,
            tx_ref: Some(format!("stub-tx-{}", trade_id)),
            executed_amount: Some(request.amount),
            executed_price: Some(*self.fill_price.lock()),
            fee: Some(Decimal::ZERO),
            timestamp: Utc::now(),
            error: None,
        }
    }
}

#[async_trait]
impl VenueAdapter for StubAdapter {
    fn venue(&self) -> Venue {
        self.venue
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn execute_trade(&self, trade_id: &str, request: &TradeRequest) -> Result<TradeResult> {
        self.execute_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(scripted) = self.execute_script.lock().pop_front() {
            // Scripted results keep their own status but adopt the
            // caller's trade id so ledger assertions line up.
            return scripted.map(|mut r| {
                r.trade_id = trade_id.to_string();
                r
            });
        }
        Ok(self.completed_result(trade_id, request))
    }

    async fn get_balance(&self, symbol: Option<&str>) -> Result<Balances> {
        let mut balances = self.balances.lock().clone();
        if let Some(symbol) = symbol {
            balances.retain(|k, _| k == symbol);
        }
        Ok(balances)
    }

    async fn get_price(&self, _symbol: &str) -> Result<Decimal> {
        Ok(*self.fill_price.lock())
    }

    async fn get_order_status(&self, order_id: &str) -> Result<TradeResult> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(scripted) = self.status_script.lock().pop_front() {
            return Ok(scripted);
        }
        Ok(TradeResult {
            trade_id: order_id.to_string(),
            venue: self.venue,
            status: TradeStatus::Completed,
            tx_ref: Some(order_id.to_string()),
            executed_amount: None,
            executed_price: None,
            fee: None,
            timestamp: Utc::now(),
            error: None,
        })
    }

    async fn cancel_order(&self, _order_id: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Canned-response completion provider.
pub struct StubProvider {
    responses: Mutex<VecDeque<Result<String>>>,
    chunks: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl StubProvider {
    pub fn new(response: &str) -> Self {
        let mut responses = VecDeque::new();
        responses.push_back(Ok(response.to_string()));
        Self {
            responses: Mutex::new(responses),
            chunks: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: GatewayError) -> Self {
        let mut responses = VecDeque::new();
        responses.push_back(Err(error));
        Self {
            responses: Mutex::new(responses),
            chunks: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_chunks(self, chunks: &[&str]) -> Self {
        *self.chunks.lock() = chunks.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionProvider for StubProvider {
    async fn complete(&self, _request: &CompletionRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok("hold".to_string()))
    }

    async fn stream(&self, _request: &CompletionRequest) -> Result<ChunkStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let chunks: Vec<Result<String>> =
            self.chunks.lock().iter().cloned().map(Ok).collect();
        Ok(futures_util::stream::iter(chunks).boxed())
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}
