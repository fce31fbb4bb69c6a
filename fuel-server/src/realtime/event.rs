//! Parsing of pushed price events.

use serde::Deserialize;
use serde_json::Value;

use crate::backend::value_as_timestamp;
use crate::domain::{RealtimeUpdate, StationId};

use super::error::RealtimeError;

/// Wire shape of a pushed event: `{rowId, fuelType?, price?, timestamp}`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEvent {
    row_id: Value,
    #[serde(default)]
    fuel_type: Option<String>,
    #[serde(default)]
    price: Option<Value>,
    timestamp: Value,
}

/// Parse one event payload.
///
/// `fuelType` and `price` together are a one-fuel delta; neither is a
/// station-level touch. Only one of them is malformed.
pub fn parse_event(payload: &str) -> Result<RealtimeUpdate, RealtimeError> {
    let raw: RawEvent =
        serde_json::from_str(payload).map_err(|e| RealtimeError::malformed(e.to_string()))?;

    let station_id = match &raw.row_id {
        Value::String(s) if !s.trim().is_empty() => StationId::new(s.trim()),
        Value::Number(n) if n.is_u64() || n.is_i64() => StationId::new(n.to_string()),
        other => return Err(RealtimeError::malformed(format!("invalid rowId {other}"))),
    };

    let timestamp = value_as_timestamp(&raw.timestamp)
        .ok_or_else(|| RealtimeError::malformed(format!("invalid timestamp {}", raw.timestamp)))?;

    let fuel_type = raw
        .fuel_type
        .as_deref()
        .map(str::trim)
        .filter(|f| !f.is_empty());
    let price = raw.price.filter(|p| !p.is_null());

    match (fuel_type, price) {
        (Some(fuel), Some(price)) => {
            let price = price_value(&price)
                .ok_or_else(|| RealtimeError::malformed(format!("invalid price {price}")))?;
            Ok(RealtimeUpdate::price(station_id, fuel, price, timestamp))
        }
        (None, None) => Ok(RealtimeUpdate::touch(station_id, timestamp)),
        (Some(_), None) => Err(RealtimeError::malformed("fuelType without price")),
        (None, Some(_)) => Err(RealtimeError::malformed("price without fuelType")),
    }
}

fn price_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', ".").parse().ok(),
        _ => None,
    }
    .filter(|p: &f64| p.is_finite())
}
