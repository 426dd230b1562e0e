use crate::{
    error::GatewayError,
    models::AnalysisResponse,
    services::{AnalystService, MarketService},
};
use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

const SERVED_BY: &str = "AgentLink Pro";
const MARKET_SOURCE: &str = "Crypto.com Exchange";

#[derive(Clone)]
pub struct AppState {
    pub market: Arc<MarketService>,
    pub analyst: Option<Arc<AnalystService>>,
}

/// The metered endpoint. Reached only after the payment gate admits the
/// request; everything here is plain downstream business logic.
pub async fn analyze_token(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<AnalysisResponse>, GatewayError> {
    let symbol = normalize_symbol(&token)?;

    tracing::info!("Fetching analysis for {}", symbol);
    let stats = state.market.ticker(&symbol).await?;

    // The AI layer is optional; without it the response carries the market
    // data with an empty commentary field.
    let analysis = match &state.analyst {
        Some(analyst) => analyst.trading_signal(&symbol, &stats.price).await?,
        None => String::new(),
    };

    Ok(Json(AnalysisResponse {
        success: true,
        source: MARKET_SOURCE.to_string(),
        token: symbol,
        data: analysis,
        market_stats: stats,
        served_by: SERVED_BY.to_string(),
    }))
}

/// Symbols are embedded into an exchange instrument name, so only short
/// ASCII alphanumerics pass.
fn normalize_symbol(raw: &str) -> Result<String, GatewayError> {
    let symbol = raw.trim().to_ascii_uppercase();
    if symbol.is_empty()
        || symbol.len() > 12
        || !symbol.bytes().all(|b| b.is_ascii_alphanumeric())
    {
        return Err(GatewayError::BadRequest(format!(
            "invalid token symbol: {:?}",
            raw
        )));
    }
    Ok(symbol)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbols_are_uppercased_and_trimmed() {
        assert_eq!(normalize_symbol("cro").unwrap(), "CRO");
        assert_eq!(normalize_symbol(" pepe ").unwrap(), "PEPE");
        assert_eq!(normalize_symbol("BTC2").unwrap(), "BTC2");
    }

    #[test]
    fn hostile_or_empty_symbols_are_rejected() {
        assert!(normalize_symbol("").is_err());
        assert!(normalize_symbol("   ").is_err());
        assert!(normalize_symbol("../etc/passwd").is_err());
        assert!(normalize_symbol("CRO_USDT").is_err());
        assert!(normalize_symbol("AVERYLONGSYMBOLNAME").is_err());
    }
}
