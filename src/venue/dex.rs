//! DEX aggregator adapter
//!
//! Routes swaps through an aggregator's quote/swap REST API and reads
//! balances and transaction status from a JSON-RPC node. On-chain
//! submissions cannot be cancelled once sent.

use crate::error::{GatewayError, Result};
use crate::types::{Balances, Credentials, TradeKind, TradeRequest, TradeResult, TradeStatus, Venue};
use crate::venue::{map_http_status, VenueAdapter};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;

const DEFAULT_QUOTE_URL: &str = "https://quote-api.jup.ag/v6";
const DEFAULT_RPC_URL: &str = "https://api.mainnet-beta.solana.com";

/// Lamports per native token unit
const NATIVE_UNIT: i64 = 1_000_000_000;

#[derive(Debug)]
pub struct DexAdapter {
    http: Client,
    quote_url: String,
    rpc_url: String,
    wallet_address: String,
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    price: Decimal,
    #[serde(default)]
    fee: Option<Decimal>,
    #[serde(default, rename = "priceImpact")]
    price_impact: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct SwapResponse {
    signature: String,
}

impl DexAdapter {
    pub fn new(credentials: &Credentials) -> Result<Self> {
        let wallet_address = credentials
            .wallet_address
            .clone()
            .or_else(|| credentials.private_key.clone())
            .ok_or_else(|| {
                GatewayError::InvalidCredentials(
                    "dex venue requires a wallet address or private key".into(),
                )
            })?;

        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            quote_url: credentials
                .api_url
                .as_deref()
                .unwrap_or(DEFAULT_QUOTE_URL)
                .trim_end_matches('/')
                .to_string(),
            rpc_url: credentials
                .rpc_url
                .as_deref()
                .unwrap_or(DEFAULT_RPC_URL)
                .trim_end_matches('/')
                .to_string(),
            wallet_address,
        })
    }

    async fn rpc_call(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let resp = self.http.post(&self.rpc_url).json(&body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(map_http_status(status, &text));
        }

        let value: serde_json::Value = resp.json().await?;
        if let Some(err) = value.get("error") {
            return Err(GatewayError::Api(format!("rpc error: {}", err)));
        }
        Ok(value["result"].clone())
    }

    async fn get_quote(&self, request: &TradeRequest) -> Result<QuoteResponse> {
        let url = format!("{}/quote", self.quote_url);
        let slippage_bps = (request.slippage * Decimal::new(10_000, 0)).trunc();

        let resp = self
            .http
            .get(&url)
            .query(&[
                ("symbol", request.symbol.as_str()),
                ("amount", &request.amount.to_string()),
                ("slippageBps", &slippage_bps.to_string()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(map_http_status(status, &text));
        }

        Ok(resp.json().await?)
    }
}

#[async_trait]
impl VenueAdapter for DexAdapter {
    fn venue(&self) -> Venue {
        Venue::Dex
    }

    async fn ping(&self) -> Result<()> {
        let health = self.rpc_call("getHealth", serde_json::json!([])).await?;
        match health.as_str() {
            Some("ok") => Ok(()),
            other => Err(GatewayError::VenueUnavailable(format!(
                "rpc node unhealthy: {:?}",
                other
            ))),
        }
    }

    async fn execute_trade(&self, trade_id: &str, request: &TradeRequest) -> Result<TradeResult> {
        if request.kind != TradeKind::Swap {
            return Err(GatewayError::Rejected(format!(
                "dex venue only supports swap orders, got {}",
                request.kind
            )));
        }

        let quote = self.get_quote(request).await?;

        // The aggregator reports expected impact up front; reject before
        // submitting rather than after a failed fill.
        if let Some(impact) = quote.price_impact {
            if impact > request.slippage {
                return Err(GatewayError::SlippageExceeded(format!(
                    "quoted price impact {} exceeds tolerance {}",
                    impact, request.slippage
                )));
            }
        }

        let url = format!("{}/swap", self.quote_url);
        let body = serde_json::json!({
            "symbol": request.symbol,
            "amount": request.amount,
            "slippageBps": (request.slippage * Decimal::new(10_000, 0)).trunc(),
            "userPublicKey": self.wallet_address,
        });

        let resp = self.http.post(&url).json(&body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(map_http_status(status, &text));
        }

        let swap: SwapResponse = resp.json().await?;
        tracing::info!(signature = %swap.signature, symbol = %request.symbol, "dex swap submitted");

        Ok(TradeResult {
            trade_id: trade_id.to_string(),
            venue: Venue::Dex,
            status: TradeStatus::Completed,
            tx_ref: Some(swap.signature),
            executed_amount: Some(request.amount),
            executed_price: Some(quote.price),
            fee: quote.fee,
            timestamp: Utc::now(),
            error: None,
        })
    }

    async fn get_balance(&self, symbol: Option<&str>) -> Result<Balances> {
        let result = self
            .rpc_call(
                "getBalance",
                serde_json::json!([self.wallet_address]),
            )
            .await?;

        let lamports = result["value"]
            .as_i64()
            .ok_or_else(|| GatewayError::Api("malformed balance response".into()))?;
        let native = Decimal::new(lamports, 0) / Decimal::new(NATIVE_UNIT, 0);

        let mut balances = Balances::new();
        balances.insert("SOL".to_string(), native);

        if let Some(symbol) = symbol {
            balances.retain(|k, _| k == symbol);
        }
        Ok(balances)
    }

    async fn get_price(&self, symbol: &str) -> Result<Decimal> {
        let url = format!("{}/price", self.quote_url);
        let resp = self.http.get(&url).query(&[("ids", symbol)]).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(map_http_status(status, &text));
        }

        let value: serde_json::Value = resp.json().await?;
        value["data"][symbol]["price"]
            .as_str()
            .and_then(|s| s.parse().ok())
            .or_else(|| {
                value["data"][symbol]["price"]
                    .as_f64()
                    .and_then(Decimal::from_f64_retain)
            })
            .ok_or_else(|| GatewayError::InvalidSymbol(format!("no price for {}", symbol)))
    }

    async fn get_order_status(&self, order_id: &str) -> Result<TradeResult> {
        let result = self
            .rpc_call(
                "getTransaction",
                serde_json::json!([order_id, {"commitment": "confirmed"}]),
            )
            .await?;

        let status = if result.is_null() {
            TradeStatus::Pending
        } else if result["meta"]["err"].is_null() {
            TradeStatus::Completed
        } else {
            TradeStatus::Failed
        };

        Ok(TradeResult {
            trade_id: order_id.to_string(),
            venue: Venue::Dex,
            status,
            tx_ref: Some(order_id.to_string()),
            executed_amount: None,
            executed_price: None,
            fee: None,
            timestamp: Utc::now(),
            error: match status {
                TradeStatus::Failed => Some(format!("transaction failed: {}", result["meta"]["err"])),
                _ => None,
            },
        })
    }

    async fn cancel_order(&self, _order_id: &str) -> Result<bool> {
        // On-chain transactions cannot be recalled once submitted.
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn creds() -> Credentials {
        Credentials {
            wallet_address: Some("wallet123".into()),
            ..Default::default()
        }
    }

    #[test]
    fn new_requires_wallet_or_key() {
        let err = DexAdapter::new(&Credentials::default()).unwrap_err();
        assert_eq!(err.kind(), "invalid_credentials");

        assert!(DexAdapter::new(&creds()).is_ok());
    }

    #[tokio::test]
    async fn non_swap_kinds_are_rejected() {
        let adapter = DexAdapter::new(&creds()).unwrap();
        let request = TradeRequest::new(Venue::Dex, TradeKind::Buy, "SOL/USDC", dec!(1));

        let err = adapter.execute_trade("t1", &request).await.unwrap_err();
        assert_eq!(err.kind(), "rejected");
    }

    #[tokio::test]
    async fn cancel_is_never_possible() {
        let adapter = DexAdapter::new(&creds()).unwrap();
        assert!(!adapter.cancel_order("sig").await.unwrap());
    }
}
