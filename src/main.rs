use agentlink::{
    config::Config,
    handlers::*,
    middleware::{payment_gate, PaymentGateway},
    services::*,
};
use anyhow::Result;
use axum::{middleware as axum_middleware, routing::get, Router};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    tracing::info!("Starting AgentLink gateway v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Network: {}, paying to: {:?}",
        config.network_name,
        config.seller_address
    );

    // Initialize services
    let cache = Arc::new(CacheService::new(&config.redis_url).await?);
    let chain = Arc::new(HttpChainClient::connect(&config.chain_rpc_url).await?);
    let events = Arc::new(EventLog::new(config.events_capacity));
    let market = Arc::new(MarketService::new(&config.market_api_url, cache.clone()));

    let analyst = config
        .ai_api_key
        .as_ref()
        .map(|key| Arc::new(AnalystService::new(&config.ai_api_url, key, &config.ai_model)));
    match &analyst {
        Some(_) => tracing::info!("AI signal provider enabled ({})", config.ai_model),
        None => tracing::info!("AI signal provider disabled (no AI_API_KEY)"),
    }

    // Initialize the payment gateway
    let gateway = Arc::new(PaymentGateway::new(
        InvoiceIssuer::new(config.price_spec()),
        VerificationEngine::new(
            chain.clone(),
            RetryPolicy {
                max_attempts: config.verify_max_attempts,
                delay: config.verify_retry_delay(),
            },
        ),
        ReplayGuard::new(
            &config.redis_url,
            Duration::from_secs(config.proof_retention_secs),
        )
        .await,
        events.clone(),
    ));

    // Build application state
    let app_state = AppState {
        market: market.clone(),
        analyst,
    };

    let health_state = HealthState {
        cache: cache.clone(),
        chain: chain.clone(),
        events: events.clone(),
    };

    // Build router
    let app = Router::new()
        // Public endpoints (no payment required)
        .route("/health", get(health_check))
        .with_state(health_state)
        .route("/stats", get(get_stats))
        .route("/ops/events", get(recent_events))
        .with_state(events.clone())
        // Metered endpoint (payment required)
        .route(
            "/api/analyze/:token",
            get(analyze_token).layer(axum_middleware::from_fn({
                let gateway = gateway.clone();
                move |req, next| {
                    let gateway = gateway.clone();
                    async move { payment_gate(gateway, req, next).await }
                }
            })),
        )
        .with_state(app_state)
        // Global middleware
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
        .layer(CorsLayer::permissive());

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("Metered endpoint: http://{}/api/analyze/:token", addr);
    tracing::info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to listen for ctrl+c");
    tracing::info!("Shutting down gracefully...");
}
