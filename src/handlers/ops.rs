use crate::{
    models::{EventsResponse, GatewayStats},
    services::EventLog,
};
use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

const DEFAULT_EVENTS_LIMIT: usize = 50;

#[derive(Deserialize)]
pub struct EventsQuery {
    pub limit: Option<usize>,
}

pub async fn get_stats(State(events): State<Arc<EventLog>>) -> Json<GatewayStats> {
    Json(events.stats())
}

/// Newest-first slice of the gateway decision buffer.
pub async fn recent_events(
    State(events): State<Arc<EventLog>>,
    Query(query): Query<EventsQuery>,
) -> Json<EventsResponse> {
    let limit = query.limit.unwrap_or(DEFAULT_EVENTS_LIMIT);
    Json(EventsResponse {
        events: events.recent(limit),
    })
}
