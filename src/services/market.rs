use std::sync::Arc;

use crate::error::GatewayError;
use crate::models::{MarketStats, TickerEnvelope};
use crate::services::CacheService;

/// Exchange ticker lookups for the metered endpoint. Responses are cached
/// for a few seconds so a burst of paid requests does not hammer the
/// public API.
pub struct MarketService {
    http: reqwest::Client,
    base_url: String,
    cache: Arc<CacheService>,
}

const TICKER_CACHE_TTL_SECS: u64 = 10;

impl MarketService {
    pub fn new(base_url: &str, cache: Arc<CacheService>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            cache,
        }
    }

    pub async fn ticker(&self, symbol: &str) -> Result<MarketStats, GatewayError> {
        let cache_key = format!("ticker:{}", symbol);
        if let Some(cached) = self.cache.get::<MarketStats>(&cache_key).await.ok().flatten() {
            tracing::debug!("Returning cached ticker for {}", symbol);
            return Ok(cached);
        }

        let url = format!(
            "{}/public/get-ticker?instrument_name={}_USDT",
            self.base_url, symbol
        );
        tracing::info!("Fetching ticker for {}_USDT", symbol);

        let response = self.http.get(&url).send().await.map_err(|e| {
            GatewayError::Provider {
                detail: format!("market api request failed: {}", e),
            }
        })?;

        if !response.status().is_success() {
            return Err(GatewayError::Provider {
                detail: format!("market api returned {}", response.status()),
            });
        }

        let envelope: TickerEnvelope =
            response.json().await.map_err(|e| GatewayError::Provider {
                detail: format!("market api returned invalid JSON: {}", e),
            })?;

        let stats = envelope
            .result
            .and_then(|r| r.data.into_iter().next())
            .map(|row| row.stats())
            .ok_or_else(|| GatewayError::Provider {
                detail: format!("no ticker data for {}_USDT", symbol),
            })?;

        if let Err(e) = self
            .cache
            .set(&cache_key, &stats, TICKER_CACHE_TTL_SECS)
            .await
        {
            tracing::warn!("Failed to cache ticker for {}: {}", symbol, e);
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn service(base_url: &str) -> MarketService {
        let cache = Arc::new(CacheService::new("redis://127.0.0.1:1/").await.unwrap());
        MarketService::new(base_url, cache)
    }

    #[tokio::test]
    async fn fetches_and_normalizes_a_ticker() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/public/get-ticker?instrument_name=CRO_USDT")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"code":0,"result":{"data":[{"i":"CRO_USDT","a":"0.0812","v":"120345.6"}]}}"#)
            .create_async()
            .await;

        let stats = service(&server.url()).await.ticker("CRO").await.unwrap();

        assert_eq!(stats.price, "0.0812");
        assert_eq!(stats.volume, "120345.6");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn second_lookup_is_served_from_cache() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/public/get-ticker?instrument_name=BTC_USDT")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"code":0,"result":{"data":[{"i":"BTC_USDT","a":64250.5,"v":321}]}}"#)
            .expect(1)
            .create_async()
            .await;

        let svc = service(&server.url()).await;
        let first = svc.ticker("BTC").await.unwrap();
        let second = svc.ticker("BTC").await.unwrap();

        assert_eq!(first.price, "64250.5");
        assert_eq!(second.price, "64250.5");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn empty_result_is_a_provider_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/public/get-ticker?instrument_name=NOPE_USDT")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"code":10004,"result":{"data":[]}}"#)
            .create_async()
            .await;

        let err = service(&server.url()).await.ticker("NOPE").await.unwrap_err();

        match err {
            GatewayError::Provider { detail } => assert!(detail.contains("NOPE_USDT")),
            other => panic!("expected Provider error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn upstream_5xx_is_a_provider_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/public/get-ticker?instrument_name=CRO_USDT")
            .with_status(503)
            .create_async()
            .await;

        let err = service(&server.url()).await.ticker("CRO").await.unwrap_err();

        match err {
            GatewayError::Provider { detail } => assert!(detail.contains("503")),
            other => panic!("expected Provider error, got {:?}", other),
        }
    }
}
