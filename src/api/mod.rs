//! Gateway HTTP API
//!
//! The request/response surface consumed by the presentation layer.
//! Handlers stay thin: parse, delegate to the router / pipeline, map
//! errors onto status codes with the taxonomy kind in the body.

use crate::agent::{AgentManager, AgentSummary, DecisionPipeline, StreamCoordinator};
use crate::error::GatewayError;
use crate::router::TradeRouter;
use crate::types::{
    AgentPolicy, Balances, Credentials, Decision, MarketData, Portfolio, TradeRequest,
    TradeResult, Venue,
};
use crate::venue::AdapterRegistry;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post, put};
use axum::Router;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

pub struct AppState {
    pub registry: Arc<AdapterRegistry>,
    pub router: Arc<TradeRouter>,
    pub agents: Arc<AgentManager>,
    pub pipeline: Arc<DecisionPipeline>,
    pub streams: Arc<StreamCoordinator>,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/api/platforms", get(list_platforms))
        .route("/api/platforms/register", post(register_platform))
        .route("/api/platforms/unregister", post(unregister_platform))
        .route("/api/balances", get(all_balances))
        .route("/api/balances/{venue}", get(venue_balance))
        .route("/api/price/{venue}/{symbol}", get(price))
        .route("/api/trade/execute", post(execute_trade))
        .route(
            "/api/orders/{venue}/{order_id}",
            get(order_status).delete(cancel_order),
        )
        .route("/api/agents", post(create_agent).get(list_agents))
        .route("/api/agents/{name}", put(update_agent).delete(delete_agent))
        .route("/api/agents/{name}/analyze", post(analyze))
        .route("/api/agents/{name}/trade", post(generate_trade))
        .route("/api/agents/{name}/stream", post(stream_analyze))
        .with_state(state)
}

/// Serve the API until the process is stopped.
pub async fn serve(state: Arc<AppState>, host: &str, port: u16) -> std::io::Result<()> {
    let app = build_router(state);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "gateway API listening");
    axum::serve(listener, app).await
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

struct ApiError(GatewayError);

impl From<GatewayError> for ApiError {
    fn from(e: GatewayError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            GatewayError::UnknownVenue(_) | GatewayError::AgentNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            GatewayError::InvalidRequest(_)
            | GatewayError::InvalidSymbol(_)
            | GatewayError::InvalidCredentials(_)
            | GatewayError::Connectivity(_) => StatusCode::BAD_REQUEST,
            GatewayError::InsufficientFunds(_)
            | GatewayError::SlippageExceeded(_)
            | GatewayError::Rejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
            GatewayError::VenueUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Provider(_) | GatewayError::Http(_) | GatewayError::Api(_) => {
                StatusCode::BAD_GATEWAY
            }
            GatewayError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({
            "kind": self.0.kind(),
            "error": self.0.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

// ---------------------------------------------------------------------------
// Request/response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RegisterBody {
    venue: Venue,
    credentials: Credentials,
}

#[derive(Debug, Deserialize)]
struct UnregisterBody {
    venue: Venue,
}

#[derive(Debug, Serialize)]
struct OkBody {
    success: bool,
    venue: Venue,
}

#[derive(Debug, Deserialize)]
struct BalanceQuery {
    symbol: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExecuteBody {
    #[serde(flatten)]
    request: TradeRequest,
    /// Client-supplied replay token; generated when absent
    idempotency_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnalyzeBody {
    #[serde(default)]
    market_data: MarketData,
    #[serde(default)]
    context: String,
}

#[derive(Debug, Deserialize)]
struct GenerateTradeBody {
    #[serde(default)]
    market_data: MarketData,
    #[serde(default)]
    portfolio: Portfolio,
    #[serde(default)]
    context: String,
    #[serde(default)]
    execute: bool,
}

#[derive(Debug, Serialize)]
struct GenerateTradeResponse {
    decision: Decision,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<TradeResult>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "tradegate",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
    }))
}

async fn list_platforms(State(state): State<Arc<AppState>>) -> Json<Vec<Venue>> {
    Json(state.registry.list().await)
}

async fn register_platform(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RegisterBody>,
) -> ApiResult<Json<OkBody>> {
    state.registry.register(body.venue, &body.credentials).await?;
    Ok(Json(OkBody {
        success: true,
        venue: body.venue,
    }))
}

async fn unregister_platform(
    State(state): State<Arc<AppState>>,
    Json(body): Json<UnregisterBody>,
) -> ApiResult<Json<OkBody>> {
    state.registry.unregister(body.venue).await?;
    Ok(Json(OkBody {
        success: true,
        venue: body.venue,
    }))
}

async fn all_balances(
    State(state): State<Arc<AppState>>,
) -> Json<HashMap<Venue, Balances>> {
    Json(state.router.all_balances().await)
}

async fn venue_balance(
    State(state): State<Arc<AppState>>,
    Path(venue): Path<Venue>,
    Query(query): Query<BalanceQuery>,
) -> ApiResult<Json<Balances>> {
    let balances = state
        .router
        .balance(venue, query.symbol.as_deref())
        .await?;
    Ok(Json(balances))
}

async fn price(
    State(state): State<Arc<AppState>>,
    Path((venue, symbol)): Path<(Venue, String)>,
) -> ApiResult<Json<Decimal>> {
    let price = state.router.price(venue, &symbol).await?;
    Ok(Json(price))
}

async fn execute_trade(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ExecuteBody>,
) -> ApiResult<Json<TradeResult>> {
    let key = body
        .idempotency_key
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let result = state.router.execute(&body.request, &key).await?;
    Ok(Json(result))
}

async fn order_status(
    State(state): State<Arc<AppState>>,
    Path((venue, order_id)): Path<(Venue, String)>,
) -> ApiResult<Json<TradeResult>> {
    let result = state.router.order_status(venue, &order_id).await?;
    Ok(Json(result))
}

async fn cancel_order(
    State(state): State<Arc<AppState>>,
    Path((venue, order_id)): Path<(Venue, String)>,
) -> ApiResult<Json<serde_json::Value>> {
    let cancelled = state.router.cancel(venue, &order_id).await?;
    Ok(Json(serde_json::json!({ "cancelled": cancelled })))
}

async fn create_agent(
    State(state): State<Arc<AppState>>,
    Json(policy): Json<AgentPolicy>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let name = policy.name.clone();
    state.agents.create(policy).await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "success": true, "agent": name })),
    ))
}

async fn update_agent(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(mut policy): Json<AgentPolicy>,
) -> ApiResult<Json<serde_json::Value>> {
    policy.name = name.clone();
    state.agents.update(policy).await?;
    Ok(Json(serde_json::json!({ "success": true, "agent": name })))
}

async fn list_agents(State(state): State<Arc<AppState>>) -> Json<Vec<AgentSummary>> {
    Json(state.agents.list().await)
}

async fn delete_agent(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    state.agents.delete(&name).await?;
    Ok(Json(serde_json::json!({ "success": true, "agent": name })))
}

async fn analyze(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(body): Json<AnalyzeBody>,
) -> ApiResult<Json<Decision>> {
    let agent = state.agents.get(&name).await?;
    let decision = state
        .pipeline
        .analyze(&agent, &body.market_data, &body.context)
        .await?;
    Ok(Json(decision))
}

async fn generate_trade(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(body): Json<GenerateTradeBody>,
) -> ApiResult<Json<GenerateTradeResponse>> {
    let agent = state.agents.get(&name).await?;
    let (decision, result) = state
        .pipeline
        .generate_trade(
            &agent,
            &body.market_data,
            &body.portfolio,
            &body.context,
            body.execute,
        )
        .await?;
    Ok(Json(GenerateTradeResponse { decision, result }))
}

async fn stream_analyze(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(body): Json<AnalyzeBody>,
) -> ApiResult<Sse<impl futures_util::Stream<Item = std::result::Result<Event, Infallible>>>> {
    let agent = state.agents.get(&name).await?;
    let stream = state.streams.stream(&agent, &body.market_data, &body.context);

    // Client disconnect drops the SSE stream, which drops the analysis
    // stream, which cancels the provider call.
    let events = futures_util::stream::unfold(stream, |mut stream| async move {
        let chunk = stream.next_chunk().await?;
        let event = match chunk {
            Ok(text) => Event::default().data(text),
            Err(e) => Event::default().event("error").data(e.to_string()),
        };
        Some((Ok(event), stream))
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
