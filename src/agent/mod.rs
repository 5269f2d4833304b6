//! AI decision agents
//!
//! Turns market data into a trade-or-hold decision under a risk policy.
//! Agents are stateless across calls: the only state they carry is the
//! policy they were registered with, and in-flight decisions keep the
//! policy snapshot they started with.

pub mod provider;
pub mod stream;

#[cfg(test)]
mod tests;

pub use provider::{CompletionProvider, CompletionRequest};
pub use stream::{AnalysisStream, StreamCoordinator};

use crate::config::ProvidersConfig;
use crate::error::{GatewayError, Result};
use crate::risk::{self, RiskVerdict};
use crate::router::TradeRouter;
use crate::types::{
    AgentPolicy, Decision, DecisionAction, MarketData, Portfolio, ProviderKind, TradeKind,
    TradeRequest, TradeResult, Venue,
};
use provider::{AnthropicProvider, OpenAiProvider};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Fixed guidance appended to every agent's system prompt.
const TRADING_GUIDELINES: &str = "\
Trading guidelines:
- Always consider risk management and position sizing
- Analyze market conditions before making decisions
- Account for slippage and fees in trade calculations
- Never exceed the maximum position size or risk limit
- Provide clear reasoning for each decision";

/// Response format instructions for trade generation.
const DECISION_FORMAT: &str = r#"If you decide to execute a trade, respond with a JSON object:
{
  "action": "trade",
  "venue": "dex|prediction-market|event-contract",
  "kind": "buy|sell|swap",
  "symbol": "symbol or market identifier",
  "amount": 0.0,
  "price": 0.0,
  "slippage": 0.01,
  "reasoning": "your reasoning"
}

If you decide not to trade, respond with:
{
  "action": "hold",
  "reasoning": "your reasoning"
}"#;

/// An agent as registered: immutable policy plus its provider client.
pub struct AgentHandle {
    pub policy: AgentPolicy,
    pub provider: Arc<dyn CompletionProvider>,
}

impl std::fmt::Debug for AgentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentHandle")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Compact listing row for registered agents.
#[derive(Debug, Clone, Serialize)]
pub struct AgentSummary {
    pub name: String,
    pub provider: ProviderKind,
    pub model: String,
    pub venues: Vec<Venue>,
}

/// Owned registry of decision agents.
pub struct AgentManager {
    providers: ProvidersConfig,
    agents: RwLock<HashMap<String, Arc<AgentHandle>>>,
}

impl AgentManager {
    pub fn new(providers: ProvidersConfig) -> Self {
        Self {
            providers,
            agents: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new agent. The provider client is constructed once at
    /// registration so a missing key surfaces here, not on first use.
    pub async fn create(&self, policy: AgentPolicy) -> Result<()> {
        policy.validate()?;
        if self.agents.read().await.contains_key(&policy.name) {
            return Err(GatewayError::InvalidRequest(format!(
                "agent '{}' already exists",
                policy.name
            )));
        }

        let provider = self.build_provider(policy.provider)?;
        self.install(policy, provider).await;
        Ok(())
    }

    /// Replace an existing agent's policy. Decisions already in flight
    /// keep the handle they resolved earlier.
    pub async fn update(&self, policy: AgentPolicy) -> Result<()> {
        policy.validate()?;
        if !self.agents.read().await.contains_key(&policy.name) {
            return Err(GatewayError::AgentNotFound(policy.name));
        }

        let provider = self.build_provider(policy.provider)?;
        self.install(policy, provider).await;
        Ok(())
    }

    /// Register an agent with an explicit provider client. Used by tests
    /// and paper setups that bypass provider configuration.
    pub async fn create_with_provider(
        &self,
        policy: AgentPolicy,
        provider: Arc<dyn CompletionProvider>,
    ) -> Result<()> {
        policy.validate()?;
        self.install(policy, provider).await;
        Ok(())
    }

    async fn install(&self, policy: AgentPolicy, provider: Arc<dyn CompletionProvider>) {
        let name = policy.name.clone();
        let handle = Arc::new(AgentHandle { policy, provider });
        self.agents.write().await.insert(name.clone(), handle);
        tracing::info!(agent = %name, "agent registered");
    }

    pub async fn get(&self, name: &str) -> Result<Arc<AgentHandle>> {
        self.agents
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| GatewayError::AgentNotFound(name.to_string()))
    }

    pub async fn list(&self) -> Vec<AgentSummary> {
        let mut summaries: Vec<AgentSummary> = self
            .agents
            .read()
            .await
            .values()
            .map(|h| AgentSummary {
                name: h.policy.name.clone(),
                provider: h.policy.provider,
                model: h.policy.model.clone(),
                venues: h.policy.venues.clone(),
            })
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    pub async fn delete(&self, name: &str) -> Result<()> {
        match self.agents.write().await.remove(name) {
            Some(_) => {
                tracing::info!(agent = %name, "agent deleted");
                Ok(())
            }
            None => Err(GatewayError::AgentNotFound(name.to_string())),
        }
    }

    fn build_provider(&self, kind: ProviderKind) -> Result<Arc<dyn CompletionProvider>> {
        match kind {
            ProviderKind::OpenAi => {
                let endpoint = self.providers.openai.as_ref().ok_or_else(|| {
                    GatewayError::Config("no openai provider configured".into())
                })?;
                Ok(Arc::new(OpenAiProvider::new(endpoint)?))
            }
            ProviderKind::Anthropic => {
                let endpoint = self.providers.anthropic.as_ref().ok_or_else(|| {
                    GatewayError::Config("no anthropic provider configured".into())
                })?;
                Ok(Arc::new(AnthropicProvider::new(endpoint)?))
            }
        }
    }
}

/// Orchestrates provider calls, risk evaluation, and optional routing
/// for a single agent invocation.
pub struct DecisionPipeline {
    router: Arc<TradeRouter>,
}

impl DecisionPipeline {
    pub fn new(router: Arc<TradeRouter>) -> Self {
        Self { router }
    }

    /// Market analysis. The returned decision is informational only:
    /// no risk check runs and nothing is ever routed from this path.
    pub async fn analyze(
        &self,
        agent: &AgentHandle,
        market_data: &MarketData,
        context: &str,
    ) -> Result<Decision> {
        let request = CompletionRequest {
            model: agent.policy.model.clone(),
            system_prompt: build_system_prompt(&agent.policy, false),
            user_message: format!(
                "{}\n\n{}\n\nProvide market analysis and insights.",
                build_market_context(market_data, None, &agent.policy),
                context
            ),
        };

        let raw = agent.provider.complete(&request).await?;
        Ok(parse_decision(&raw))
    }

    /// Generate a trade-or-hold decision, risk-gate it, and optionally
    /// submit it to the router.
    pub async fn generate_trade(
        &self,
        agent: &AgentHandle,
        market_data: &MarketData,
        portfolio: &Portfolio,
        context: &str,
        execute: bool,
    ) -> Result<(Decision, Option<TradeResult>)> {
        let request = CompletionRequest {
            model: agent.policy.model.clone(),
            system_prompt: build_system_prompt(&agent.policy, true),
            user_message: format!(
                "{}\n\n{}\n\nShould we execute a trade?",
                build_market_context(market_data, Some(portfolio), &agent.policy),
                context
            ),
        };

        let raw = agent.provider.complete(&request).await?;
        let decision = parse_decision(&raw);

        let Some(trade) = decision.request.clone() else {
            // Hold: no risk check, no router call.
            return Ok((decision, None));
        };

        // Risk gate runs before any venue call, outside any lock.
        match risk::evaluate(&agent.policy, &trade, portfolio) {
            RiskVerdict::Allow => {}
            RiskVerdict::Deny { reason, detail } => {
                tracing::info!(
                    agent = %agent.policy.name,
                    %reason,
                    "trade denied by risk policy, downgrading to hold"
                );
                let held = Decision {
                    action: DecisionAction::Hold,
                    request: None,
                    rationale: format!("risk policy denied trade ({}): {}", reason, detail),
                    raw: decision.raw,
                };
                return Ok((held, None));
            }
        }

        if !execute {
            // Preview mode: the proposed trade goes back to the caller
            // without touching the router.
            return Ok((decision, None));
        }

        let idempotency_key = uuid::Uuid::new_v4().to_string();
        let result = self.router.execute(&trade, &idempotency_key).await?;
        Ok((decision, Some(result)))
    }
}

/// Assemble the system prompt: policy prompt, fixed guidelines, allowed
/// venues, and (for trade generation) the response format.
fn build_system_prompt(policy: &AgentPolicy, for_trading: bool) -> String {
    let venues = policy
        .venues
        .iter()
        .map(|v| v.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    let mut prompt = format!(
        "{}\n\n{}\n\nAvailable venues: {}",
        policy.system_prompt, TRADING_GUIDELINES, venues
    );
    if for_trading {
        prompt.push_str("\n\n");
        prompt.push_str(DECISION_FORMAT);
    }
    prompt
}

/// Render market data, portfolio, and the agent's limits into the user
/// message.
fn build_market_context(
    market_data: &MarketData,
    portfolio: Option<&Portfolio>,
    policy: &AgentPolicy,
) -> String {
    let mut parts = vec!["Market data:".to_string()];
    for (key, value) in market_data {
        parts.push(format!("- {}: {}", key, value));
    }

    if let Some(portfolio) = portfolio {
        parts.push(format!("\nPortfolio value: {}", portfolio.total_value));
        for (symbol, quantity) in &portfolio.positions {
            parts.push(format!("- {}: {}", symbol, quantity));
        }
    }

    parts.push(format!("\nMax position size: {}", policy.max_position_size));
    parts.push(format!("Risk limit: {}%", policy.risk_limit * Decimal::ONE_HUNDRED));
    parts.join("\n")
}

/// Parse provider output into a decision.
///
/// A provider answering in prose instead of structured JSON is expected,
/// not exceptional: anything that fails to parse into a recognizable
/// trade becomes a hold with the raw text preserved as rationale.
fn parse_decision(raw: &str) -> Decision {
    let Some(start) = raw.find('{') else {
        return Decision::hold(raw.trim(), raw);
    };
    let Some(end) = raw.rfind('}').filter(|end| *end > start) else {
        return Decision::hold(raw.trim(), raw);
    };

    let Ok(value) = serde_json::from_str::<serde_json::Value>(&raw[start..=end]) else {
        return Decision::hold(raw.trim(), raw);
    };

    let rationale = value["reasoning"]
        .as_str()
        .unwrap_or("")
        .to_string();

    match value["action"].as_str() {
        Some("trade") => match parse_trade_request(&value) {
            Ok(trade) => Decision {
                action: DecisionAction::Trade,
                request: Some(trade),
                rationale,
                raw: raw.to_string(),
            },
            Err(e) => Decision::hold(
                &format!("proposed trade was malformed ({}); holding", e),
                raw,
            ),
        },
        Some("hold") => Decision {
            action: DecisionAction::Hold,
            request: None,
            rationale: if rationale.is_empty() {
                raw.trim().to_string()
            } else {
                rationale
            },
            raw: raw.to_string(),
        },
        _ => Decision::hold(raw.trim(), raw),
    }
}

fn parse_trade_request(value: &serde_json::Value) -> Result<TradeRequest> {
    let venue = value["venue"]
        .as_str()
        .ok_or_else(|| GatewayError::InvalidRequest("missing venue".into()))
        .and_then(Venue::from_str)?;

    let kind = match value["kind"].as_str() {
        Some("buy") => TradeKind::Buy,
        Some("sell") => TradeKind::Sell,
        Some("swap") => TradeKind::Swap,
        other => {
            return Err(GatewayError::InvalidRequest(format!(
                "unrecognized trade kind {:?}",
                other
            )))
        }
    };

    let symbol = value["symbol"]
        .as_str()
        .ok_or_else(|| GatewayError::InvalidRequest("missing symbol".into()))?;

    let amount = decimal_field(&value["amount"])
        .ok_or_else(|| GatewayError::InvalidRequest("missing amount".into()))?;

    let mut request = TradeRequest::new(venue, kind, symbol, amount);
    if let Some(price) = decimal_field(&value["price"]) {
        request.price = Some(price);
    }
    if let Some(slippage) = decimal_field(&value["slippage"]) {
        request.slippage = slippage;
    }

    request.validate()?;
    Ok(request)
}

/// Decimal from a JSON number or numeric string.
fn decimal_field(value: &serde_json::Value) -> Option<Decimal> {
    match value {
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Decimal::new(i, 0))
            } else {
                n.as_f64().and_then(Decimal::from_f64_retain)
            }
        }
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
