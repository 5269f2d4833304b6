//! Tests for core types

#[cfg(test)]
mod tests {
    use super::super::types::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::str::FromStr;

    #[test]
    fn test_venue_serialization() {
        assert_eq!(serde_json::to_string(&Venue::Dex).unwrap(), "\"dex\"");
        assert_eq!(
            serde_json::to_string(&Venue::PredictionMarket).unwrap(),
            "\"prediction-market\""
        );
        assert_eq!(
            serde_json::to_string(&Venue::EventContract).unwrap(),
            "\"event-contract\""
        );
    }

    #[test]
    fn test_venue_from_str_round_trip() {
        for venue in Venue::all() {
            assert_eq!(Venue::from_str(venue.as_str()).unwrap(), venue);
        }
        assert!(Venue::from_str("nyse").is_err());
    }

    #[test]
    fn test_trade_kind_serialization() {
        assert_eq!(serde_json::to_string(&TradeKind::Buy).unwrap(), "\"buy\"");
        assert_eq!(serde_json::to_string(&TradeKind::Swap).unwrap(), "\"swap\"");
        let kind: TradeKind = serde_json::from_str("\"sell\"").unwrap();
        assert_eq!(kind, TradeKind::Sell);
    }

    #[test]
    fn test_trade_status_terminality() {
        assert!(TradeStatus::Completed.is_terminal());
        assert!(TradeStatus::Failed.is_terminal());
        assert!(TradeStatus::Cancelled.is_terminal());
        assert!(!TradeStatus::Pending.is_terminal());
        assert!(!TradeStatus::Executing.is_terminal());
    }

    #[test]
    fn test_trade_request_defaults() {
        let request = TradeRequest::new(Venue::Dex, TradeKind::Swap, "SOL/USDC", dec!(1));
        assert_eq!(request.slippage, dec!(0.01));
        assert!(request.price.is_none());
        assert!(request.metadata.is_empty());
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_trade_request_validation_bounds() {
        let ok = TradeRequest::new(Venue::Dex, TradeKind::Buy, "SOL", dec!(1));
        assert!(ok.validate().is_ok());

        let mut bad = ok.clone();
        bad.amount = Decimal::ZERO;
        assert!(bad.validate().is_err());

        let mut bad = ok.clone();
        bad.slippage = dec!(1.5);
        assert!(bad.validate().is_err());

        let mut bad = ok.clone();
        bad.slippage = dec!(-0.1);
        assert!(bad.validate().is_err());

        let mut bad = ok.clone();
        bad.symbol = "  ".into();
        assert!(bad.validate().is_err());

        let mut bad = ok;
        bad.price = Some(Decimal::ZERO);
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_trade_request_deserializes_with_defaults() {
        let json = r#"{"venue":"dex","kind":"swap","symbol":"SOL/USDC","amount":"1.0"}"#;
        let request: TradeRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.amount, dec!(1.0));
        assert_eq!(request.slippage, dec!(0.01));
    }

    #[test]
    fn test_trade_result_failed_carries_kind() {
        let err = crate::error::GatewayError::Rejected("market closed".into());
        let result = TradeResult::failed(Venue::Dex, &err);
        assert_eq!(result.status, TradeStatus::Failed);
        assert_eq!(result.venue, Venue::Dex);
        let message = result.error.unwrap();
        assert!(message.starts_with("rejected:"));
        assert!(message.contains("market closed"));
    }

    #[test]
    fn test_credentials_debug_redacts_secrets() {
        let creds = Credentials {
            api_key: Some("key".into()),
            api_secret: Some("secret".into()),
            private_key: Some("pk".into()),
            rpc_url: Some("https://rpc.example.org".into()),
            ..Default::default()
        };
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("secret"));
        assert!(!debug.contains("pk"));
        assert!(debug.contains("***"));
        assert!(debug.contains("rpc.example.org"));
    }

    #[test]
    fn test_agent_policy_validation() {
        let policy = AgentPolicy {
            name: "alpha".into(),
            provider: ProviderKind::OpenAi,
            model: "gpt-x".into(),
            system_prompt: String::new(),
            max_position_size: dec!(100),
            risk_limit: dec!(0.05),
            venues: vec![Venue::Dex],
        };
        assert!(policy.validate().is_ok());
        assert!(policy.allows_venue(Venue::Dex));
        assert!(!policy.allows_venue(Venue::EventContract));

        let mut bad = policy.clone();
        bad.venues.clear();
        assert!(bad.validate().is_err());

        let mut bad = policy.clone();
        bad.risk_limit = dec!(1.5);
        assert!(bad.validate().is_err());

        let mut bad = policy.clone();
        bad.risk_limit = Decimal::ZERO;
        assert!(bad.validate().is_err());

        let mut bad = policy;
        bad.max_position_size = Decimal::ZERO;
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_agent_policy_deserializes_with_defaults() {
        let json = r#"{"name":"a","provider":"anthropic","model":"m","venues":["dex"]}"#;
        let policy: AgentPolicy = serde_json::from_str(json).unwrap();
        assert_eq!(policy.max_position_size, dec!(1000));
        assert_eq!(policy.risk_limit, dec!(0.1));
        assert!(policy.system_prompt.is_empty());
    }

    #[test]
    fn test_decision_hold_constructor() {
        let decision = Decision::hold("waiting", "raw output");
        assert_eq!(decision.action, DecisionAction::Hold);
        assert!(decision.request.is_none());
        assert_eq!(decision.rationale, "waiting");
        assert_eq!(decision.raw, "raw output");
    }

    #[test]
    fn test_portfolio_mark_price_lookup() {
        let mut portfolio = Portfolio::default();
        portfolio.mark_prices.insert("SOL".into(), dec!(150));
        assert_eq!(portfolio.mark_price("SOL"), Some(dec!(150)));
        assert_eq!(portfolio.mark_price("ETH"), None);
    }
}
