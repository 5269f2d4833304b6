//! Core types shared across the gateway
//!
//! Normalized request/response shapes that every venue adapter and the
//! decision pipeline speak, independent of any venue's native API.

use crate::error::{GatewayError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// A distinct trading platform the gateway can route to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Venue {
    /// On-chain DEX aggregator (swap execution)
    #[serde(rename = "dex")]
    Dex,
    /// Prediction-market platform (binary outcome shares)
    #[serde(rename = "prediction-market")]
    PredictionMarket,
    /// Event-contract exchange (whole-contract fills)
    #[serde(rename = "event-contract")]
    EventContract,
}

impl Venue {
    pub fn all() -> [Venue; 3] {
        [Venue::Dex, Venue::PredictionMarket, Venue::EventContract]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Venue::Dex => "dex",
            Venue::PredictionMarket => "prediction-market",
            Venue::EventContract => "event-contract",
        }
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Venue {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "dex" => Ok(Venue::Dex),
            "prediction-market" => Ok(Venue::PredictionMarket),
            "event-contract" => Ok(Venue::EventContract),
            other => Err(GatewayError::InvalidRequest(format!(
                "unrecognized venue '{}'",
                other
            ))),
        }
    }
}

/// Trade operation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeKind {
    Buy,
    Sell,
    Swap,
}

impl fmt::Display for TradeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeKind::Buy => f.write_str("buy"),
            TradeKind::Sell => f.write_str("sell"),
            TradeKind::Swap => f.write_str("swap"),
        }
    }
}

impl FromStr for TradeKind {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "buy" => Ok(TradeKind::Buy),
            "sell" => Ok(TradeKind::Sell),
            "swap" => Ok(TradeKind::Swap),
            other => Err(GatewayError::InvalidRequest(format!(
                "unrecognized trade kind '{}'",
                other
            ))),
        }
    }
}

/// Execution status of a routed trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    Pending,
    Executing,
    Completed,
    Failed,
    Cancelled,
}

impl TradeStatus {
    /// Terminal statuses are never mutated again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TradeStatus::Completed | TradeStatus::Failed | TradeStatus::Cancelled
        )
    }
}

fn default_slippage() -> Decimal {
    Decimal::new(1, 2) // 0.01
}

/// Normalized trade request submitted to the router.
///
/// A value type with no identity of its own; a trade id is assigned only
/// once the router accepts the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRequest {
    pub venue: Venue,
    pub kind: TradeKind,
    pub symbol: String,
    pub amount: Decimal,
    /// Optional limit price; market execution when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    /// Acceptable execution price drift, fraction in [0, 1]
    #[serde(default = "default_slippage")]
    pub slippage: Decimal,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl TradeRequest {
    pub fn new(venue: Venue, kind: TradeKind, symbol: &str, amount: Decimal) -> Self {
        Self {
            venue,
            kind,
            symbol: symbol.to_string(),
            amount,
            price: None,
            slippage: default_slippage(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_price(mut self, price: Decimal) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_slippage(mut self, slippage: Decimal) -> Self {
        self.slippage = slippage;
        self
    }

    /// Structural validation applied before any venue call.
    pub fn validate(&self) -> Result<()> {
        if self.symbol.trim().is_empty() {
            return Err(GatewayError::InvalidRequest("symbol is empty".into()));
        }
        if self.amount <= Decimal::ZERO {
            return Err(GatewayError::InvalidRequest(format!(
                "amount must be positive, got {}",
                self.amount
            )));
        }
        if self.slippage < Decimal::ZERO || self.slippage > Decimal::ONE {
            return Err(GatewayError::InvalidRequest(format!(
                "slippage must be within [0, 1], got {}",
                self.slippage
            )));
        }
        if let Some(price) = self.price {
            if price <= Decimal::ZERO {
                return Err(GatewayError::InvalidRequest(format!(
                    "limit price must be positive, got {}",
                    price
                )));
            }
        }
        Ok(())
    }
}

/// Normalized outcome of a routed trade.
///
/// Created by the router, filled in by the adapter during execution,
/// immutable once the status is terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeResult {
    /// Router-generated id, unique per accepted request
    pub trade_id: String,
    pub venue: Venue,
    pub status: TradeStatus,
    /// Venue-native reference (tx signature, order id)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executed_amount: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executed_price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee: Option<Decimal>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TradeResult {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Failed result carrying the taxonomy kind and reason.
    pub fn failed(venue: Venue, error: &GatewayError) -> Self {
        Self {
            trade_id: uuid::Uuid::new_v4().to_string(),
            venue,
            status: TradeStatus::Failed,
            tx_ref: None,
            executed_amount: None,
            executed_price: None,
            fee: None,
            timestamp: Utc::now(),
            error: Some(format!("{}: {}", error.kind(), error)),
        }
    }
}

/// Per-venue account balances, symbol -> quantity.
pub type Balances = HashMap<String, Decimal>;

/// Opaque venue credential bag.
///
/// Owned by the credential store; the core only holds a short-lived
/// reference while constructing an adapter and never persists it.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passphrase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpc_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

// Secrets must never reach logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("api_secret", &self.api_secret.as_ref().map(|_| "***"))
            .field("passphrase", &self.passphrase.as_ref().map(|_| "***"))
            .field("private_key", &self.private_key.as_ref().map(|_| "***"))
            .field("wallet_address", &self.wallet_address)
            .field("rpc_url", &self.rpc_url)
            .field("api_url", &self.api_url)
            .finish()
    }
}

/// AI provider family an agent talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
}

fn default_max_position() -> Decimal {
    Decimal::new(1000, 0)
}

fn default_risk_limit() -> Decimal {
    Decimal::new(1, 1) // 0.10
}

/// Configuration of one decision agent.
///
/// Immutable after registration except by explicit update, which never
/// affects decisions already in flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentPolicy {
    pub name: String,
    pub provider: ProviderKind,
    pub model: String,
    #[serde(default)]
    pub system_prompt: String,
    /// Hard cap on the notional value of any single proposed trade
    #[serde(default = "default_max_position")]
    pub max_position_size: Decimal,
    /// Maximum acceptable worst-case loss as a fraction of portfolio value
    #[serde(default = "default_risk_limit")]
    pub risk_limit: Decimal,
    /// Venues this agent is allowed to route to; must be non-empty
    pub venues: Vec<Venue>,
}

impl AgentPolicy {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(GatewayError::InvalidRequest("agent name is empty".into()));
        }
        if self.model.trim().is_empty() {
            return Err(GatewayError::InvalidRequest("model is empty".into()));
        }
        if self.max_position_size <= Decimal::ZERO {
            return Err(GatewayError::InvalidRequest(
                "max_position_size must be positive".into(),
            ));
        }
        if self.risk_limit <= Decimal::ZERO || self.risk_limit > Decimal::ONE {
            return Err(GatewayError::InvalidRequest(
                "risk_limit must be within (0, 1]".into(),
            ));
        }
        if self.venues.is_empty() {
            return Err(GatewayError::InvalidRequest(
                "agent must be allowed at least one venue".into(),
            ));
        }
        Ok(())
    }

    pub fn allows_venue(&self, venue: Venue) -> bool {
        self.venues.contains(&venue)
    }
}

/// What the agent decided to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionAction {
    Hold,
    Trade,
}

/// Output of a single decision-pipeline invocation. Ephemeral; produced
/// per call and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub action: DecisionAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<TradeRequest>,
    pub rationale: String,
    /// Verbatim provider output the decision was parsed from
    pub raw: String,
}

impl Decision {
    pub fn hold(rationale: &str, raw: &str) -> Self {
        Self {
            action: DecisionAction::Hold,
            request: None,
            rationale: rationale.to_string(),
            raw: raw.to_string(),
        }
    }
}

/// Snapshot of holdings handed to the risk policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Portfolio {
    /// Total portfolio value in the account's quote currency
    pub total_value: Decimal,
    /// Open positions, symbol -> quantity
    #[serde(default)]
    pub positions: HashMap<String, Decimal>,
    /// Last known prices, symbol -> price
    #[serde(default)]
    pub mark_prices: HashMap<String, Decimal>,
}

impl Portfolio {
    pub fn mark_price(&self, symbol: &str) -> Option<Decimal> {
        self.mark_prices.get(symbol).copied()
    }
}

/// Free-form market snapshot handed to agent prompts verbatim.
pub type MarketData = serde_json::Map<String, serde_json::Value>;
