//! Event-contract exchange adapter
//!
//! Token-authenticated REST client. The venue deals in whole contracts,
//! so fractional amounts are truncated to an integer count before
//! submission.

use crate::error::{GatewayError, Result};
use crate::types::{Balances, Credentials, TradeKind, TradeRequest, TradeResult, TradeStatus, Venue};
use crate::venue::{map_http_status, VenueAdapter};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Method};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::sync::RwLock;

const DEFAULT_API_URL: &str = "https://api.elections.kalshi.com/trade-api/v2";

/// Contract prices are quoted in cents.
const CENTS: i64 = 100;

pub struct EventAdapter {
    http: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    token: RwLock<Option<String>>,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
struct OrderEnvelope {
    order: OrderBody,
}

#[derive(Debug, Deserialize)]
struct OrderBody {
    order_id: String,
    status: String,
    #[serde(default)]
    filled_count: Option<i64>,
    #[serde(default)]
    avg_fill_price_cents: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    balance_cents: i64,
}

#[derive(Debug, Deserialize)]
struct MarketEnvelope {
    market: MarketBody,
}

#[derive(Debug, Deserialize)]
struct MarketBody {
    yes_price_cents: i64,
}

impl EventAdapter {
    pub fn new(credentials: &Credentials) -> Result<Self> {
        let api_key = credentials.api_key.clone().ok_or_else(|| {
            GatewayError::InvalidCredentials("event venue requires an api key".into())
        })?;
        let api_secret = credentials
            .api_secret
            .clone()
            .or_else(|| credentials.private_key.clone())
            .ok_or_else(|| {
                GatewayError::InvalidCredentials("event venue requires an api secret".into())
            })?;

        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            base_url: credentials
                .api_url
                .as_deref()
                .unwrap_or(DEFAULT_API_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key,
            api_secret,
            token: RwLock::new(None),
        })
    }

    async fn login(&self) -> Result<String> {
        let url = format!("{}/login", self.base_url);
        let body = serde_json::json!({
            "api_key_id": self.api_key,
            "secret": self.api_secret,
        });

        let resp = self.http.post(&url).json(&body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            // A failed login is a credential problem, not a symbol lookup.
            return Err(match map_http_status(status, &text) {
                GatewayError::InvalidSymbol(reason) => GatewayError::InvalidCredentials(reason),
                other => other,
            });
        }

        let login: LoginResponse = resp.json().await?;
        Ok(login.token)
    }

    async fn bearer(&self) -> Result<String> {
        if let Some(token) = self.token.read().await.clone() {
            return Ok(token);
        }
        let token = self.login().await?;
        *self.token.write().await = Some(token.clone());
        Ok(token)
    }

    async fn request_json<T: serde::de::DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T> {
        let token = self.bearer().await?;
        let url = format!("{}{}", self.base_url, path);

        let mut req = self
            .http
            .request(method, &url)
            .header("Authorization", format!("Bearer {}", token));
        if let Some(body) = body {
            req = req.json(&body);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if status.as_u16() == 401 {
            // Session token expired; force a fresh login on the next call.
            *self.token.write().await = None;
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(map_http_status(status, &text));
        }
        Ok(resp.json().await?)
    }

    fn map_order_status(status: &str) -> TradeStatus {
        match status {
            "executed" | "filled" => TradeStatus::Completed,
            "resting" | "pending" => TradeStatus::Pending,
            "canceled" | "cancelled" => TradeStatus::Cancelled,
            _ => TradeStatus::Failed,
        }
    }

    fn order_result(order: OrderBody, trade_id: &str) -> TradeResult {
        let status = Self::map_order_status(&order.status);
        TradeResult {
            trade_id: trade_id.to_string(),
            venue: Venue::EventContract,
            status,
            tx_ref: Some(order.order_id),
            executed_amount: order.filled_count.map(|c| Decimal::new(c, 0)),
            executed_price: order
                .avg_fill_price_cents
                .map(|c| Decimal::new(c, 0) / Decimal::new(CENTS, 0)),
            fee: None,
            timestamp: Utc::now(),
            error: match status {
                TradeStatus::Failed => Some(format!("order status: {}", order.status)),
                _ => None,
            },
        }
    }
}

#[async_trait]
impl VenueAdapter for EventAdapter {
    fn venue(&self) -> Venue {
        Venue::EventContract
    }

    async fn ping(&self) -> Result<()> {
        // Login doubles as the connectivity handshake; a bad key set
        // surfaces here instead of on the first trade.
        let token = self.login().await?;
        *self.token.write().await = Some(token);
        Ok(())
    }

    async fn execute_trade(&self, trade_id: &str, request: &TradeRequest) -> Result<TradeResult> {
        let action = match request.kind {
            TradeKind::Buy => "buy",
            TradeKind::Sell => "sell",
            TradeKind::Swap => {
                return Err(GatewayError::Rejected(
                    "event venue does not support swaps".into(),
                ))
            }
        };

        let count = request.amount.trunc().to_i64().unwrap_or(0);
        if count < 1 {
            return Err(GatewayError::Rejected(format!(
                "event venue trades whole contracts, amount {} rounds to zero",
                request.amount
            )));
        }

        let body = serde_json::json!({
            "ticker": request.symbol,
            "action": action,
            "count": count,
            "type": if request.price.is_some() { "limit" } else { "market" },
            "price_cents": request
                .price
                .map(|p| (p * Decimal::new(CENTS, 0)).trunc()),
        });

        let envelope: OrderEnvelope = self
            .request_json(Method::POST, "/portfolio/orders", Some(body))
            .await?;
        tracing::info!(order_id = %envelope.order.order_id, "event order placed");

        Ok(Self::order_result(envelope.order, trade_id))
    }

    async fn get_balance(&self, symbol: Option<&str>) -> Result<Balances> {
        let resp: BalanceResponse = self
            .request_json(Method::GET, "/portfolio/balance", None)
            .await?;

        let mut balances = Balances::new();
        balances.insert(
            "USD".to_string(),
            Decimal::new(resp.balance_cents, 0) / Decimal::new(CENTS, 0),
        );
        if let Some(symbol) = symbol {
            balances.retain(|k, _| k == symbol);
        }
        Ok(balances)
    }

    async fn get_price(&self, symbol: &str) -> Result<Decimal> {
        let path = format!("/markets/{}", symbol);
        let envelope: MarketEnvelope = self.request_json(Method::GET, &path, None).await?;
        Ok(Decimal::new(envelope.market.yes_price_cents, 0) / Decimal::new(CENTS, 0))
    }

    async fn get_order_status(&self, order_id: &str) -> Result<TradeResult> {
        let path = format!("/portfolio/orders/{}", order_id);
        let envelope: OrderEnvelope = self.request_json(Method::GET, &path, None).await?;
        Ok(Self::order_result(envelope.order, order_id))
    }

    async fn cancel_order(&self, order_id: &str) -> Result<bool> {
        let token = self.bearer().await?;
        let url = format!("{}/portfolio/orders/{}", self.base_url, order_id);

        let resp = self
            .http
            .delete(&url)
            .header("Authorization", format!("Bearer {}", token))
            .send()
            .await?;
        match resp.status().as_u16() {
            200 | 204 => Ok(true),
            404 | 409 => Ok(false),
            _ => {
                let status = resp.status();
                let text = resp.text().await.unwrap_or_default();
                Err(map_http_status(status, &text))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn creds() -> Credentials {
        Credentials {
            api_key: Some("key-id".into()),
            api_secret: Some("secret".into()),
            ..Default::default()
        }
    }

    #[test]
    fn new_requires_key_and_secret() {
        assert!(EventAdapter::new(&Credentials::default()).is_err());
        assert!(EventAdapter::new(&creds()).is_ok());
    }

    #[tokio::test]
    async fn fractional_amounts_round_to_zero_are_rejected() {
        let adapter = EventAdapter::new(&creds()).unwrap();
        let request = TradeRequest::new(
            Venue::EventContract,
            TradeKind::Buy,
            "RAIN-NYC",
            dec!(0.4),
        );

        let err = adapter.execute_trade("t1", &request).await.unwrap_err();
        assert_eq!(err.kind(), "rejected");
    }

    #[test]
    fn order_status_mapping() {
        assert_eq!(
            EventAdapter::map_order_status("executed"),
            TradeStatus::Completed
        );
        assert_eq!(
            EventAdapter::map_order_status("resting"),
            TradeStatus::Pending
        );
        assert_eq!(
            EventAdapter::map_order_status("canceled"),
            TradeStatus::Cancelled
        );
    }
}
