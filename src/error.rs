//! Error taxonomy for the gateway
//!
//! Every venue adapter maps its platform-specific failures into this
//! taxonomy so callers see one consistent set of kinds regardless of
//! which venue a request was routed to. Risk denials are deliberately
//! absent: a denied trade is a normal `hold` decision, not an error.

use crate::types::Venue;

pub type Result<T> = std::result::Result<T, GatewayError>;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// No adapter registered for the requested venue
    #[error("unknown venue: {0}")]
    UnknownVenue(Venue),

    /// Adapter construction or handshake failed at registration time
    #[error("connectivity error: {0}")]
    Connectivity(String),

    /// Venue rejected the credential set
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    /// Account balance cannot cover the requested trade
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    /// Symbol / market identifier not recognized by the venue
    #[error("invalid symbol: {0}")]
    InvalidSymbol(String),

    /// Execution price moved beyond the request's slippage tolerance
    #[error("slippage exceeded: {0}")]
    SlippageExceeded(String),

    /// Transient venue outage; retried internally by the router
    #[error("venue unavailable: {0}")]
    VenueUnavailable(String),

    /// Permanent venue-side business rejection; never retried
    #[error("rejected by venue: {0}")]
    Rejected(String),

    /// Terminal-unknown outcome; caller must poll order status
    #[error("timed out: {0}")]
    Timeout(String),

    /// AI completion call failed (distinct from a parse failure,
    /// which is not an error)
    #[error("provider error: {0}")]
    Provider(String),

    /// No agent registered under the given name
    #[error("unknown agent: {0}")]
    AgentNotFound(String),

    /// Request failed structural validation before reaching any venue
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Malformed or unexpected venue API response
    #[error("api error: {0}")]
    Api(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl GatewayError {
    /// Whether the router may retry the failed call.
    ///
    /// Only genuinely transient failures qualify; retrying a business
    /// rejection or an already-ambiguous timeout is unsafe.
    pub fn is_transient(&self) -> bool {
        match self {
            GatewayError::VenueUnavailable(_) => true,
            GatewayError::Http(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }

    /// Short machine-readable kind tag used in API responses and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::UnknownVenue(_) => "unknown_venue",
            GatewayError::Connectivity(_) => "connectivity",
            GatewayError::InvalidCredentials(_) => "invalid_credentials",
            GatewayError::InsufficientFunds(_) => "insufficient_funds",
            GatewayError::InvalidSymbol(_) => "invalid_symbol",
            GatewayError::SlippageExceeded(_) => "slippage_exceeded",
            GatewayError::VenueUnavailable(_) => "venue_unavailable",
            GatewayError::Rejected(_) => "rejected",
            GatewayError::Timeout(_) => "timeout",
            GatewayError::Provider(_) => "provider_error",
            GatewayError::AgentNotFound(_) => "agent_not_found",
            GatewayError::InvalidRequest(_) => "invalid_request",
            GatewayError::Api(_) => "api_error",
            GatewayError::Config(_) => "config_error",
            GatewayError::Http(_) => "http_error",
        }
    }
}
