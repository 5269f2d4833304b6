//! Risk policy evaluation
//!
//! Pure, deterministic checks of a proposed trade against an agent's
//! configured limits. Runs before any venue call, never after, and has
//! no side effects so it can be property-tested in isolation.

use crate::types::{AgentPolicy, Portfolio, TradeRequest};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

/// Why a proposed trade was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    VenueNotAllowed,
    PositionLimitExceeded,
    RiskLimitExceeded,
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenialReason::VenueNotAllowed => f.write_str("venue not allowed"),
            DenialReason::PositionLimitExceeded => f.write_str("position limit exceeded"),
            DenialReason::RiskLimitExceeded => f.write_str("risk limit exceeded"),
        }
    }
}

/// Outcome of a risk evaluation. A denial is not an error: the pipeline
/// reports it as a normal hold decision carrying the reason.
#[derive(Debug, Clone)]
pub enum RiskVerdict {
    Allow,
    Deny { reason: DenialReason, detail: String },
}

impl RiskVerdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RiskVerdict::Allow)
    }
}

/// Evaluate a proposed trade against the agent's limits.
///
/// Rules apply in order and the first violation wins:
/// 1. the venue must be in the agent's allowed set;
/// 2. the notional (amount x limit price, falling back to the last known
///    mark price, then 1) must not exceed `max_position_size`;
/// 3. the worst-case loss (notional x slippage) as a fraction of
///    portfolio value must not exceed `risk_limit`.
pub fn evaluate(policy: &AgentPolicy, trade: &TradeRequest, portfolio: &Portfolio) -> RiskVerdict {
    if !policy.allows_venue(trade.venue) {
        return RiskVerdict::Deny {
            reason: DenialReason::VenueNotAllowed,
            detail: format!("agent '{}' is not configured for venue {}", policy.name, trade.venue),
        };
    }

    let reference_price = trade
        .price
        .or_else(|| portfolio.mark_price(&trade.symbol))
        .unwrap_or(Decimal::ONE);
    let notional = trade.amount * reference_price;

    if notional > policy.max_position_size {
        return RiskVerdict::Deny {
            reason: DenialReason::PositionLimitExceeded,
            detail: format!(
                "notional {} exceeds max position size {}",
                notional, policy.max_position_size
            ),
        };
    }

    let worst_case_loss = notional * trade.slippage;
    if worst_case_loss > Decimal::ZERO {
        // A portfolio with no value cannot absorb any loss.
        if portfolio.total_value <= Decimal::ZERO {
            return RiskVerdict::Deny {
                reason: DenialReason::RiskLimitExceeded,
                detail: "portfolio has no value to risk against".to_string(),
            };
        }
        let loss_fraction = worst_case_loss / portfolio.total_value;
        if loss_fraction > policy.risk_limit {
            return RiskVerdict::Deny {
                reason: DenialReason::RiskLimitExceeded,
                detail: format!(
                    "worst-case loss {} is {:.4} of portfolio value, limit is {}",
                    worst_case_loss, loss_fraction, policy.risk_limit
                ),
            };
        }
    }

    RiskVerdict::Allow
}
