//! Prediction-market adapter
//!
//! Signed REST client for a CLOB-style prediction market. Every request
//! carries an HMAC-SHA256 signature over timestamp + method + path + body,
//! computed with the base64-decoded API secret.

use crate::error::{GatewayError, Result};
use crate::types::{Balances, Credentials, TradeKind, TradeRequest, TradeResult, TradeStatus, Venue};
use crate::venue::{map_http_status, VenueAdapter};
use async_trait::async_trait;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method};
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::Sha256;
use std::collections::HashMap;

const DEFAULT_API_URL: &str = "https://clob.polymarket.com";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug)]
pub struct PredictionAdapter {
    http: Client,
    base_url: String,
    api_key: String,
    secret: Vec<u8>,
    passphrase: String,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    #[serde(rename = "orderID")]
    order_id: String,
    status: String,
    #[serde(default)]
    filled_size: Option<Decimal>,
    #[serde(default)]
    avg_price: Option<Decimal>,
    #[serde(default)]
    fee: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct BalancesResponse {
    balances: HashMap<String, Decimal>,
}

#[derive(Debug, Deserialize)]
struct PriceResponse {
    price: Decimal,
}

impl PredictionAdapter {
    pub fn new(credentials: &Credentials) -> Result<Self> {
        let api_key = credentials.api_key.clone().ok_or_else(|| {
            GatewayError::InvalidCredentials("prediction venue requires an api key".into())
        })?;
        let secret_b64 = credentials.api_secret.clone().ok_or_else(|| {
            GatewayError::InvalidCredentials("prediction venue requires an api secret".into())
        })?;
        let secret = base64::engine::general_purpose::STANDARD
            .decode(&secret_b64)
            .map_err(|e| {
                GatewayError::InvalidCredentials(format!("api secret is not valid base64: {}", e))
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
            secret,
            passphrase: credentials.passphrase.clone().unwrap_or_default(),
        })
    }

    fn sign(&self, timestamp: &str, method: &str, path: &str, body: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .expect("hmac accepts any key length");
        mac.update(timestamp.as_bytes());
        mac.update(method.as_bytes());
        mac.update(path.as_bytes());
        mac.update(body.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<reqwest::Response> {
        let timestamp = Utc::now().timestamp().to_string();
        let body_text = body
            .as_ref()
            .map(|b| b.to_string())
            .unwrap_or_default();
        let signature = self.sign(&timestamp, method.as_str(), path, &body_text);

        let url = format!("{}{}", self.base_url, path);
        let mut req = self
            .http
            .request(method, &url)
            .header("X-VENUE-KEY", &self.api_key)
            .header("X-VENUE-SIGN", signature)
            .header("X-VENUE-TIMESTAMP", timestamp)
            .header("X-VENUE-PASSPHRASE", &self.passphrase);

        if let Some(body) = body {
            req = req.json(&body);
        }

        Ok(req.send().await?)
    }

    async fn request_json<T: serde::de::DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T> {
        let resp = self.request(method, path, body).await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(map_http_status(status, &text));
        }
        Ok(resp.json().await?)
    }

    fn map_order_status(status: &str) -> TradeStatus {
        match status {
            "matched" | "filled" => TradeStatus::Completed,
            "live" | "open" | "delayed" => TradeStatus::Pending,
            "cancelled" => TradeStatus::Cancelled,
            _ => TradeStatus::Failed,
        }
    }
}

#[async_trait]
impl VenueAdapter for PredictionAdapter {
    fn venue(&self) -> Venue {
        Venue::PredictionMarket
    }

    async fn ping(&self) -> Result<()> {
        let resp = self.request(Method::GET, "/time", None).await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            Err(map_http_status(status, &text))
        }
    }

    async fn execute_trade(&self, trade_id: &str, request: &TradeRequest) -> Result<TradeResult> {
        let side = match request.kind {
            TradeKind::Buy => "BUY",
            TradeKind::Sell => "SELL",
            TradeKind::Swap => {
                return Err(GatewayError::Rejected(
                    "prediction venue does not support swaps".into(),
                ))
            }
        };

        let body = serde_json::json!({
            "market": request.symbol,
            "side": side,
            "size": request.amount,
            "price": request.price,
            "slippage": request.slippage,
        });

        let order: OrderResponse = self
            .request_json(Method::POST, "/orders", Some(body))
            .await?;
        let status = Self::map_order_status(&order.status);
        tracing::info!(order_id = %order.order_id, status = %order.status, "prediction order placed");

        Ok(TradeResult {
            trade_id: trade_id.to_string(),
            venue: Venue::PredictionMarket,
            status,
            tx_ref: Some(order.order_id),
            executed_amount: order.filled_size,
            executed_price: order.avg_price,
            fee: order.fee,
            timestamp: Utc::now(),
            error: match status {
                TradeStatus::Failed => Some(format!("order status: {}", order.status)),
                _ => None,
            },
        })
    }

    async fn get_balance(&self, symbol: Option<&str>) -> Result<Balances> {
        let resp: BalancesResponse = self.request_json(Method::GET, "/balances", None).await?;
        let mut balances = resp.balances;
        if let Some(symbol) = symbol {
            balances.retain(|k, _| k == symbol);
        }
        Ok(balances)
    }

    async fn get_price(&self, symbol: &str) -> Result<Decimal> {
        let path = format!("/markets/{}/price", symbol);
        let resp: PriceResponse = self.request_json(Method::GET, &path, None).await?;
        Ok(resp.price)
    }

    async fn get_order_status(&self, order_id: &str) -> Result<TradeResult> {
        let path = format!("/orders/{}", order_id);
        let order: OrderResponse = self.request_json(Method::GET, &path, None).await?;
        let status = Self::map_order_status(&order.status);

        Ok(TradeResult {
            trade_id: order_id.to_string(),
            venue: Venue::PredictionMarket,
            status,
            tx_ref: Some(order.order_id),
            executed_amount: order.filled_size,
            executed_price: order.avg_price,
            fee: order.fee,
            timestamp: Utc::now(),
            error: None,
        })
    }

    async fn cancel_order(&self, order_id: &str) -> Result<bool> {
        let path = format!("/orders/{}", order_id);
        let resp = self.request(Method::DELETE, &path, None).await?;
        match resp.status().as_u16() {
            200 | 204 => Ok(true),
            // Already matched or already gone; nothing left to cancel.
            404 | 409 => Ok(false),
            _ => {
                let status = resp.status();
                let text = resp.text().await.unwrap_or_default();
                Err(map_http_status(status, &text))
            }
        }
    }
}
