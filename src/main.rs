//! Multi-Venue Agent Trading Gateway
//!
//! Serves the gateway API and offers one-shot commands for balances,
//! prices, manual trades, and ad-hoc agent analysis.

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::sync::Arc;
use tradegate::{
    agent::{AgentManager, DecisionPipeline, StreamCoordinator},
    api::{self, AppState},
    config::Config,
    credentials::{ConfigCredentialStore, CredentialStore},
    router::TradeRouter,
    types::{AgentPolicy, ProviderKind, TradeKind, TradeRequest, Venue},
    venue::AdapterRegistry,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "tradegate")]
#[command(about = "Multi-venue agent trading gateway")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gateway API server
    Serve,
    /// Show balances across registered venues
    Balances,
    /// Show the current price for a symbol on a venue
    Price { venue: Venue, symbol: String },
    /// Submit a trade manually (previews unless --execute is given)
    Trade {
        venue: Venue,
        kind: TradeKind,
        symbol: String,
        amount: Decimal,
        /// Optional limit price
        #[arg(long)]
        price: Option<Decimal>,
        /// Slippage tolerance, fraction in [0, 1]
        #[arg(long, default_value = "0.01")]
        slippage: Decimal,
        /// Actually submit instead of previewing
        #[arg(long)]
        execute: bool,
    },
    /// Run a one-shot market analysis with an ad-hoc agent
    Analyze {
        /// Provider family to use
        #[arg(long, default_value = "anthropic")]
        provider: String,
        /// Model identifier
        #[arg(long)]
        model: String,
        /// Market data as a JSON object
        #[arg(long, default_value = "{}")]
        data: String,
        /// Extra free-form context
        #[arg(long, default_value = "")]
        context: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Serve => serve(config).await,
        Commands::Balances => show_balances(config).await,
        Commands::Price { venue, symbol } => show_price(config, venue, &symbol).await,
        Commands::Trade {
            venue,
            kind,
            symbol,
            amount,
            price,
            slippage,
            execute,
        } => submit_trade(config, venue, kind, &symbol, amount, price, slippage, execute).await,
        Commands::Analyze {
            provider,
            model,
            data,
            context,
        } => analyze(config, &provider, &model, &data, &context).await,
    }
}

/// Wire the registry, router, and agent manager from config, registering
/// every venue that has stored credentials.
async fn build_state(config: &Config) -> Arc<AppState> {
    let registry = Arc::new(AdapterRegistry::new());
    let store = ConfigCredentialStore::new(config.venues.clone());

    for venue in config.venues.configured() {
        match store.lookup(venue) {
            Ok(credentials) => {
                if let Err(e) = registry.register(venue, &credentials).await {
                    tracing::warn!(%venue, error = %e, "startup registration failed");
                }
            }
            Err(e) => tracing::warn!(%venue, error = %e, "credential lookup failed"),
        }
    }

    let router = Arc::new(TradeRouter::new(registry.clone(), config.router.clone()));
    let agents = Arc::new(AgentManager::new(config.providers.clone()));
    let pipeline = Arc::new(DecisionPipeline::new(router.clone()));

    Arc::new(AppState {
        registry,
        router,
        agents,
        pipeline,
        streams: Arc::new(StreamCoordinator::new()),
    })
}

async fn serve(config: Config) -> anyhow::Result<()> {
    tracing::info!("starting trade gateway");
    let state = build_state(&config).await;

    let registered = state.registry.list().await;
    if registered.is_empty() {
        tracing::warn!("no venues registered; register one over the API before trading");
    } else {
        tracing::info!(?registered, "venues ready");
    }

    api::serve(state, &config.api.host, config.api.port).await?;
    Ok(())
}

async fn show_balances(config: Config) -> anyhow::Result<()> {
    let state = build_state(&config).await;
    let balances = state.router.all_balances().await;

    if balances.is_empty() {
        println!("No venues registered.");
        return Ok(());
    }

    println!("\n💰 Balances\n");
    for (venue, venue_balances) in &balances {
        println!("{}:", venue);
        if venue_balances.is_empty() {
            println!("  (unavailable)");
        }
        for (symbol, quantity) in venue_balances {
            println!("  {:<12} {:.4}", symbol, quantity);
        }
    }
    Ok(())
}

async fn show_price(config: Config, venue: Venue, symbol: &str) -> anyhow::Result<()> {
    let state = build_state(&config).await;
    let price = state.router.price(venue, symbol).await?;
    println!("{} on {}: {}", symbol, venue, price);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn submit_trade(
    config: Config,
    venue: Venue,
    kind: TradeKind,
    symbol: &str,
    amount: Decimal,
    price: Option<Decimal>,
    slippage: Decimal,
    execute: bool,
) -> anyhow::Result<()> {
    let state = build_state(&config).await;

    let mut request = TradeRequest::new(venue, kind, symbol, amount).with_slippage(slippage);
    request.price = price;
    request.validate()?;

    if !execute {
        println!("📝 Preview (pass --execute to submit):");
        println!("{}", serde_json::to_string_pretty(&request)?);
        return Ok(());
    }

    let key = uuid::Uuid::new_v4().to_string();
    let result = state.router.execute(&request, &key).await?;

    println!("\nTrade {}", result.trade_id);
    println!("  status:  {:?}", result.status);
    if let Some(tx_ref) = &result.tx_ref {
        println!("  ref:     {}", tx_ref);
    }
    if let (Some(amount), Some(price)) = (result.executed_amount, result.executed_price) {
        println!("  filled:  {} @ {}", amount, price);
    }
    if let Some(error) = &result.error {
        println!("  error:   {}", error);
    }
    Ok(())
}

async fn analyze(
    config: Config,
    provider: &str,
    model: &str,
    data: &str,
    context: &str,
) -> anyhow::Result<()> {
    let state = build_state(&config).await;

    let provider = match provider {
        "openai" => ProviderKind::OpenAi,
        "anthropic" => ProviderKind::Anthropic,
        other => anyhow::bail!("unrecognized provider '{}'", other),
    };

    let market_data: tradegate::types::MarketData = serde_json::from_str(data)?;
    let policy = AgentPolicy {
        name: "cli".into(),
        provider,
        model: model.to_string(),
        system_prompt: "You are a trading analyst.".into(),
        max_position_size: Decimal::new(1000, 0),
        risk_limit: Decimal::new(1, 1),
        venues: Venue::all().to_vec(),
    };
    state.agents.create(policy).await?;
    let agent = state.agents.get("cli").await?;

    let decision = state
        .pipeline
        .analyze(&agent, &market_data, context)
        .await?;

    println!("\n🤖 Analysis ({:?})\n", decision.action);
    println!("{}", decision.rationale);
    Ok(())
}
