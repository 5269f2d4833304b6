//! Unit tests for the agent pipeline

use super::provider::MockCompletionProvider;
use super::*;
use crate::config::RouterConfig;
use crate::testing::{StubAdapter, StubProvider};
use crate::types::TradeStatus;
use crate::venue::AdapterRegistry;
use rust_decimal_macros::dec;

fn policy(venues: Vec<Venue>) -> AgentPolicy {
    AgentPolicy {
        name: "momentum".into(),
        provider: ProviderKind::Anthropic,
        model: "model-x".into(),
        system_prompt: "You are a trading agent.".into(),
        max_position_size: dec!(1000),
        risk_limit: dec!(0.1),
        venues,
    }
}

fn portfolio(total: Decimal) -> Portfolio {
    Portfolio {
        total_value: total,
        ..Default::default()
    }
}

fn market_data() -> MarketData {
    let mut data = MarketData::new();
    data.insert("SOL/USDC".into(), serde_json::json!({"price": 100.0}));
    data
}

const TRADE_JSON: &str = r#"{"action":"trade","venue":"dex","kind":"swap","symbol":"SOL/USDC","amount":1.5,"slippage":0.01,"reasoning":"clear momentum"}"#;
const HOLD_JSON: &str = r#"{"action":"hold","reasoning":"market is choppy"}"#;

struct Harness {
    manager: AgentManager,
    pipeline: DecisionPipeline,
    adapter: Arc<StubAdapter>,
}

async fn harness(response: &str) -> Harness {
    let registry = Arc::new(AdapterRegistry::new());
    let adapter = Arc::new(StubAdapter::new(Venue::Dex));
    registry.register_adapter(Venue::Dex, adapter.clone()).await;

    let router = Arc::new(TradeRouter::new(registry, RouterConfig::default()));
    let manager = AgentManager::new(ProvidersConfig::default());
    manager
        .create_with_provider(policy(vec![Venue::Dex]), Arc::new(StubProvider::new(response)))
        .await
        .unwrap();

    Harness {
        manager,
        pipeline: DecisionPipeline::new(router),
        adapter,
    }
}

mod parsing {
    use super::*;

    #[test]
    fn prose_becomes_hold_with_raw_preserved() {
        let raw = "The market looks uncertain today, I would wait.";
        let decision = parse_decision(raw);
        assert_eq!(decision.action, DecisionAction::Hold);
        assert!(decision.request.is_none());
        assert_eq!(decision.raw, raw);
        assert_eq!(decision.rationale, raw);
    }

    #[test]
    fn hold_json_keeps_reasoning() {
        let decision = parse_decision(HOLD_JSON);
        assert_eq!(decision.action, DecisionAction::Hold);
        assert_eq!(decision.rationale, "market is choppy");
    }

    #[test]
    fn trade_json_parses_into_request() {
        let decision = parse_decision(TRADE_JSON);
        assert_eq!(decision.action, DecisionAction::Trade);
        let trade = decision.request.unwrap();
        assert_eq!(trade.venue, Venue::Dex);
        assert_eq!(trade.kind, TradeKind::Swap);
        assert_eq!(trade.symbol, "SOL/USDC");
        assert_eq!(trade.amount, dec!(1.5));
        assert_eq!(decision.rationale, "clear momentum");
    }

    #[test]
    fn trade_json_embedded_in_prose_still_parses() {
        let raw = format!("Here is my decision:\n{}\nGood luck!", TRADE_JSON);
        let decision = parse_decision(&raw);
        assert_eq!(decision.action, DecisionAction::Trade);
    }

    #[test]
    fn malformed_trade_downgrades_to_hold() {
        let raw = r#"{"action":"trade","venue":"mars-exchange","kind":"buy","symbol":"X","amount":1}"#;
        let decision = parse_decision(raw);
        assert_eq!(decision.action, DecisionAction::Hold);
        assert!(decision.rationale.contains("malformed"));

        let raw = r#"{"action":"trade","venue":"dex","kind":"swap","symbol":"X","amount":-5}"#;
        let decision = parse_decision(raw);
        assert_eq!(decision.action, DecisionAction::Hold);
    }

    #[test]
    fn truncated_json_becomes_hold() {
        let raw = r#"{"action":"trade","venue":"dex","#;
        let decision = parse_decision(raw);
        assert_eq!(decision.action, DecisionAction::Hold);
        assert_eq!(decision.raw, raw);
    }
}

mod manager {
    use super::*;

    #[tokio::test]
    async fn create_list_delete_lifecycle() {
        let manager = AgentManager::new(ProvidersConfig::default());
        manager
            .create_with_provider(policy(vec![Venue::Dex]), Arc::new(StubProvider::new("hold")))
            .await
            .unwrap();

        let listed = manager.list().await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "momentum");
        assert_eq!(listed[0].venues, vec![Venue::Dex]);

        manager.delete("momentum").await.unwrap();
        assert!(manager.list().await.is_empty());
        let err = manager.get("momentum").await.unwrap_err();
        assert_eq!(err.kind(), "agent_not_found");
    }

    #[tokio::test]
    async fn create_rejects_invalid_policy() {
        let manager = AgentManager::new(ProvidersConfig::default());

        let mut bad = policy(vec![]);
        bad.name = "no-venues".into();
        let err = manager
            .create_with_provider(bad, Arc::new(StubProvider::new("hold")))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_request");
    }

    #[tokio::test]
    async fn create_requires_configured_provider() {
        let manager = AgentManager::new(ProvidersConfig::default());
        let err = manager.create(policy(vec![Venue::Dex])).await.unwrap_err();
        assert_eq!(err.kind(), "config_error");
    }

    #[tokio::test]
    async fn inflight_decisions_keep_their_policy_snapshot() {
        let manager = AgentManager::new(ProvidersConfig::default());
        manager
            .create_with_provider(policy(vec![Venue::Dex]), Arc::new(StubProvider::new("hold")))
            .await
            .unwrap();

        let snapshot = manager.get("momentum").await.unwrap();

        let mut updated = policy(vec![Venue::Dex, Venue::EventContract]);
        updated.max_position_size = dec!(5);
        manager
            .create_with_provider(updated, Arc::new(StubProvider::new("hold")))
            .await
            .unwrap();

        // The earlier handle still sees the original limits.
        assert_eq!(snapshot.policy.max_position_size, dec!(1000));
        let current = manager.get("momentum").await.unwrap();
        assert_eq!(current.policy.max_position_size, dec!(5));
    }
}

mod pipeline {
    use super::*;

    #[tokio::test]
    async fn hold_returns_immediately_without_routing() {
        let h = harness(HOLD_JSON).await;
        let agent = h.manager.get("momentum").await.unwrap();

        let (decision, result) = h
            .pipeline
            .generate_trade(&agent, &market_data(), &portfolio(dec!(10_000)), "", true)
            .await
            .unwrap();

        assert_eq!(decision.action, DecisionAction::Hold);
        assert!(result.is_none());
        assert_eq!(h.adapter.execute_calls(), 0);
    }

    #[tokio::test]
    async fn preview_mode_never_touches_the_adapter() {
        let h = harness(TRADE_JSON).await;
        let agent = h.manager.get("momentum").await.unwrap();

        let (decision, result) = h
            .pipeline
            .generate_trade(&agent, &market_data(), &portfolio(dec!(10_000)), "", false)
            .await
            .unwrap();

        assert_eq!(decision.action, DecisionAction::Trade);
        assert!(decision.request.is_some());
        assert!(result.is_none());
        assert_eq!(h.adapter.execute_calls(), 0);
    }

    #[tokio::test]
    async fn execute_mode_routes_the_trade() {
        let h = harness(TRADE_JSON).await;
        let agent = h.manager.get("momentum").await.unwrap();

        let (decision, result) = h
            .pipeline
            .generate_trade(&agent, &market_data(), &portfolio(dec!(10_000)), "", true)
            .await
            .unwrap();

        assert_eq!(decision.action, DecisionAction::Trade);
        let result = result.unwrap();
        assert_eq!(result.status, TradeStatus::Completed);
        assert_eq!(result.venue, Venue::Dex);
        assert_eq!(h.adapter.execute_calls(), 1);
    }

    #[tokio::test]
    async fn risk_denial_downgrades_to_hold_and_skips_router() {
        // Worst-case loss 15 * 10 * 1.0 = 150 on a 1000 portfolio: 15%
        // against a 10% risk limit.
        let response = r#"{"action":"trade","venue":"dex","kind":"swap","symbol":"SOL/USDC","amount":15,"price":10,"slippage":1.0,"reasoning":"all in"}"#;
        let h = harness(response).await;
        let agent = h.manager.get("momentum").await.unwrap();

        let (decision, result) = h
            .pipeline
            .generate_trade(&agent, &market_data(), &portfolio(dec!(1000)), "", true)
            .await
            .unwrap();

        assert_eq!(decision.action, DecisionAction::Hold);
        assert!(decision.rationale.contains("risk limit exceeded"));
        assert!(result.is_none());
        assert_eq!(h.adapter.execute_calls(), 0);
    }

    #[tokio::test]
    async fn disallowed_venue_is_held_not_routed() {
        let response = r#"{"action":"trade","venue":"event-contract","kind":"buy","symbol":"RAIN-NYC","amount":2,"reasoning":"sure thing"}"#;
        let h = harness(response).await;
        let agent = h.manager.get("momentum").await.unwrap();

        let (decision, result) = h
            .pipeline
            .generate_trade(&agent, &market_data(), &portfolio(dec!(10_000)), "", true)
            .await
            .unwrap();

        assert_eq!(decision.action, DecisionAction::Hold);
        assert!(decision.rationale.contains("venue not allowed"));
        assert!(result.is_none());
        assert_eq!(h.adapter.execute_calls(), 0);
    }

    #[tokio::test]
    async fn prose_response_is_hold_not_error() {
        let h = harness("I think we should wait for more volume.").await;
        let agent = h.manager.get("momentum").await.unwrap();

        let (decision, result) = h
            .pipeline
            .generate_trade(&agent, &market_data(), &portfolio(dec!(10_000)), "", true)
            .await
            .unwrap();

        assert_eq!(decision.action, DecisionAction::Hold);
        assert_eq!(decision.rationale, "I think we should wait for more volume.");
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn provider_failure_is_a_hard_error() {
        let registry = Arc::new(AdapterRegistry::new());
        let router = Arc::new(TradeRouter::new(registry, RouterConfig::default()));
        let pipeline = DecisionPipeline::new(router);

        let mut mock = MockCompletionProvider::new();
        mock.expect_complete()
            .returning(|_| Err(GatewayError::Provider("connection reset".into())));

        let manager = AgentManager::new(ProvidersConfig::default());
        manager
            .create_with_provider(policy(vec![Venue::Dex]), Arc::new(mock))
            .await
            .unwrap();
        let agent = manager.get("momentum").await.unwrap();

        let err = pipeline
            .generate_trade(&agent, &market_data(), &portfolio(dec!(10_000)), "", true)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "provider_error");
    }

    #[tokio::test]
    async fn analyze_never_executes_even_on_trade_output() {
        let h = harness(TRADE_JSON).await;
        let agent = h.manager.get("momentum").await.unwrap();

        let decision = h.pipeline.analyze(&agent, &market_data(), "").await.unwrap();
        assert_eq!(decision.action, DecisionAction::Trade);
        assert_eq!(h.adapter.execute_calls(), 0);
    }
}

mod streaming {
    use super::*;

    #[tokio::test]
    async fn chunks_arrive_in_order_and_terminate() {
        let manager = AgentManager::new(ProvidersConfig::default());
        let provider = StubProvider::new("").with_chunks(&["The ", "market ", "is calm."]);
        manager
            .create_with_provider(policy(vec![Venue::Dex]), Arc::new(provider))
            .await
            .unwrap();
        let agent = manager.get("momentum").await.unwrap();

        let coordinator = StreamCoordinator::new();
        let mut stream = coordinator.stream(&agent, &market_data(), "");

        let mut collected = String::new();
        while let Some(chunk) = stream.next_chunk().await {
            collected.push_str(&chunk.unwrap());
        }
        assert_eq!(collected, "The market is calm.");

        // Finished stream yields nothing further.
        assert!(stream.next_chunk().await.is_none());
    }

    #[tokio::test]
    async fn cancel_stops_chunk_delivery() {
        let manager = AgentManager::new(ProvidersConfig::default());
        let chunks: Vec<String> = (0..1000).map(|i| format!("chunk-{} ", i)).collect();
        let chunk_refs: Vec<&str> = chunks.iter().map(|s| s.as_str()).collect();
        let provider = StubProvider::new("").with_chunks(&chunk_refs);
        manager
            .create_with_provider(policy(vec![Venue::Dex]), Arc::new(provider))
            .await
            .unwrap();
        let agent = manager.get("momentum").await.unwrap();

        let coordinator = StreamCoordinator::new();
        let mut stream = coordinator.stream(&agent, &market_data(), "");

        let first = stream.next_chunk().await.unwrap().unwrap();
        assert!(first.starts_with("chunk-"));

        stream.cancel();
        // After cancellation the sequence ends; no chunk after the ones
        // already buffered may arrive once the channel is closed.
        assert!(stream.next_chunk().await.is_none());
    }

    #[tokio::test]
    async fn provider_stream_error_is_surfaced_as_chunk() {
        let manager = AgentManager::new(ProvidersConfig::default());
        let mut mock = MockCompletionProvider::new();
        mock.expect_stream()
            .returning(|_| Err(GatewayError::Provider("stream refused".into())));
        manager
            .create_with_provider(policy(vec![Venue::Dex]), Arc::new(mock))
            .await
            .unwrap();
        let agent = manager.get("momentum").await.unwrap();

        let coordinator = StreamCoordinator::new();
        let mut stream = coordinator.stream(&agent, &market_data(), "");

        let chunk = stream.next_chunk().await.unwrap();
        assert_eq!(chunk.unwrap_err().kind(), "provider_error");
        assert!(stream.next_chunk().await.is_none());
    }
}
