//! Tests for the error taxonomy

#[cfg(test)]
mod tests {
    use super::super::error::GatewayError;
    use crate::types::Venue;

    #[test]
    fn test_only_outages_are_transient() {
        assert!(GatewayError::VenueUnavailable("down".into()).is_transient());

        assert!(!GatewayError::Rejected("no".into()).is_transient());
        assert!(!GatewayError::Timeout("slow".into()).is_transient());
        assert!(!GatewayError::InsufficientFunds("broke".into()).is_transient());
        assert!(!GatewayError::InvalidCredentials("bad".into()).is_transient());
        assert!(!GatewayError::SlippageExceeded("moved".into()).is_transient());
        assert!(!GatewayError::UnknownVenue(Venue::Dex).is_transient());
    }

    #[test]
    fn test_kind_tags_are_stable() {
        assert_eq!(GatewayError::UnknownVenue(Venue::Dex).kind(), "unknown_venue");
        assert_eq!(GatewayError::Connectivity("x".into()).kind(), "connectivity");
        assert_eq!(GatewayError::Provider("x".into()).kind(), "provider_error");
        assert_eq!(GatewayError::Timeout("x".into()).kind(), "timeout");
        assert_eq!(GatewayError::Rejected("x".into()).kind(), "rejected");
    }

    #[test]
    fn test_display_includes_reason() {
        let err = GatewayError::SlippageExceeded("moved 3%".into());
        assert_eq!(err.to_string(), "slippage exceeded: moved 3%");

        let err = GatewayError::UnknownVenue(Venue::PredictionMarket);
        assert!(err.to_string().contains("prediction-market"));
    }
}
