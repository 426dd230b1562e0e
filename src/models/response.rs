use crate::models::MarketStats;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Success envelope of the metered endpoint, returned only after the
/// payment gateway admits the request.
#[derive(Serialize, Deserialize, Debug)]
pub struct AnalysisResponse {
    pub success: bool,
    pub source: String,
    pub token: String,
    pub data: String,
    pub market_stats: MarketStats,
    pub served_by: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub redis: bool,
    pub chain_rpc: bool,
    pub uptime_seconds: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct GatewayStats {
    pub challenges_issued: u64,
    pub payments_admitted: u64,
    pub payments_rejected: u64,
    pub uptime_seconds: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ChallengeIssued,
    Admitted,
    Rejected,
}

/// One gateway decision, as kept in the bounded event buffer and served on
/// the operational endpoint.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct GatewayEvent {
    pub request_id: Uuid,
    pub at: DateTime<Utc>,
    pub kind: EventKind,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    pub detail: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct EventsResponse {
    pub events: Vec<GatewayEvent>,
}
