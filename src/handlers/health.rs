use crate::{
    models::HealthStatus,
    services::{CacheService, EventLog, HttpChainClient},
};
use axum::{extract::State, Json};
use chrono::Utc;
use std::sync::Arc;

#[derive(Clone)]
pub struct HealthState {
    pub cache: Arc<CacheService>,
    pub chain: Arc<HttpChainClient>,
    pub events: Arc<EventLog>,
}

pub async fn health_check(State(state): State<HealthState>) -> Json<HealthStatus> {
    let redis_ok = state.cache.ping().await.unwrap_or(false);
    let chain_ok = state.chain.block_number().await.is_ok();

    // The gateway can still verify payments without Redis; it cannot
    // without the chain.
    let status = if redis_ok && chain_ok {
        "healthy"
    } else if chain_ok {
        "degraded"
    } else {
        "unhealthy"
    };

    Json(HealthStatus {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        redis: redis_ok,
        chain_rpc: chain_ok,
        uptime_seconds: state.events.uptime_seconds(),
        timestamp: Utc::now(),
    })
}
