//! Venue adapters
//!
//! One adapter per supported venue, each translating the normalized
//! trade/balance/price operations into that venue's native API and
//! mapping its failures into the gateway error taxonomy.

pub mod dex;
pub mod event;
pub mod prediction;
pub mod registry;

pub use dex::DexAdapter;
pub use event::EventAdapter;
pub use prediction::PredictionAdapter;
pub use registry::AdapterRegistry;

use crate::error::{GatewayError, Result};
use crate::types::{Balances, TradeRequest, TradeResult, Venue};
use async_trait::async_trait;
use rust_decimal::Decimal;

/// Common capability every venue implementation exposes.
///
/// `execute_trade` is synchronous from the caller's view (it may await
/// network confirmation internally) and must return a terminal or
/// `pending` result — a submitted order is never silently dropped.
#[async_trait]
pub trait VenueAdapter: Send + Sync {
    /// Venue this adapter serves
    fn venue(&self) -> Venue;

    /// Connectivity handshake performed before the adapter becomes
    /// visible in the registry
    async fn ping(&self) -> Result<()>;

    /// Execute a trade. `trade_id` is the router-assigned identity the
    /// returned result must carry.
    async fn execute_trade(&self, trade_id: &str, request: &TradeRequest) -> Result<TradeResult>;

    /// Account balances, optionally narrowed to one symbol
    async fn get_balance(&self, symbol: Option<&str>) -> Result<Balances>;

    /// Current price for a symbol
    async fn get_price(&self, symbol: &str) -> Result<Decimal>;

    /// Status of a previously submitted order
    async fn get_order_status(&self, order_id: &str) -> Result<TradeResult>;

    /// Cancel a pending order; false when the venue cannot cancel it
    async fn cancel_order(&self, order_id: &str) -> Result<bool>;
}

/// Map an HTTP error status into the shared taxonomy.
///
/// Venue APIs differ in their bodies but agree closely enough on status
/// semantics that one mapping covers all three REST venues; adapters
/// refine the result where the body carries a more specific code.
pub(crate) fn map_http_status(status: reqwest::StatusCode, body: &str) -> GatewayError {
    let reason = if body.trim().is_empty() {
        status.to_string()
    } else {
        format!("{}: {}", status, body.trim())
    };

    match status.as_u16() {
        401 | 403 => GatewayError::InvalidCredentials(reason),
        404 => GatewayError::InvalidSymbol(reason),
        400 | 409 | 422 => {
            let lower = body.to_lowercase();
            if lower.contains("insufficient") {
                GatewayError::InsufficientFunds(reason)
            } else if lower.contains("slippage") {
                GatewayError::SlippageExceeded(reason)
            } else {
                GatewayError::Rejected(reason)
            }
        }
        429 => GatewayError::VenueUnavailable(reason),
        s if s >= 500 => GatewayError::VenueUnavailable(reason),
        _ => GatewayError::Api(reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn unauthorized_maps_to_invalid_credentials() {
        let err = map_http_status(StatusCode::UNAUTHORIZED, "bad key");
        assert_eq!(err.kind(), "invalid_credentials");
    }

    #[test]
    fn not_found_maps_to_invalid_symbol() {
        let err = map_http_status(StatusCode::NOT_FOUND, "");
        assert_eq!(err.kind(), "invalid_symbol");
    }

    #[test]
    fn body_refines_client_errors() {
        let err = map_http_status(StatusCode::UNPROCESSABLE_ENTITY, "insufficient balance");
        assert_eq!(err.kind(), "insufficient_funds");

        let err = map_http_status(StatusCode::BAD_REQUEST, "slippage tolerance exceeded");
        assert_eq!(err.kind(), "slippage_exceeded");

        let err = map_http_status(StatusCode::BAD_REQUEST, "market closed");
        assert_eq!(err.kind(), "rejected");
    }

    #[test]
    fn server_errors_are_transient() {
        let err = map_http_status(StatusCode::BAD_GATEWAY, "");
        assert_eq!(err.kind(), "venue_unavailable");
        assert!(err.is_transient());

        let err = map_http_status(StatusCode::TOO_MANY_REQUESTS, "");
        assert!(err.is_transient());
    }
}
