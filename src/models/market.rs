use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The slice of ticker data the metered endpoint returns. Kept as decimal
/// strings end to end; prices never pass through a float.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketStats {
    pub price: String,
    pub volume: String,
}

/// Envelope shape of the exchange's public ticker endpoint:
/// `{code, result: {data: [...]}}` with `code == 0` on success.
#[derive(Debug, Deserialize)]
pub struct TickerEnvelope {
    pub code: i64,
    #[serde(default)]
    pub result: Option<TickerResult>,
}

#[derive(Debug, Deserialize)]
pub struct TickerResult {
    #[serde(default)]
    pub data: Vec<TickerData>,
}

/// One instrument row. The exchange's field names are single letters
/// (`a` latest trade price, `v` 24h volume).
#[derive(Debug, Deserialize)]
pub struct TickerData {
    #[serde(rename = "i", default)]
    pub instrument: Option<String>,
    #[serde(rename = "a", default)]
    pub last_price: Option<Value>,
    #[serde(rename = "v", default)]
    pub volume: Option<Value>,
}

impl TickerData {
    pub fn stats(&self) -> MarketStats {
        MarketStats {
            price: scalar_string(self.last_price.as_ref()),
            volume: scalar_string(self.volume.as_ref()),
        }
    }
}

/// The exchange serves numeric fields inconsistently across deployments:
/// sometimes JSON strings, sometimes raw numbers. Normalize both.
fn scalar_string(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => "0".to_string(),
    }
}
