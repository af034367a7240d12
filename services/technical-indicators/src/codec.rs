//! JSON wire format for inbound events and outbound records
//!
//! Inbound lines are either trades or already aggregated candles; a line is
//! treated as a candle when it carries `window_start_ms`. Trades may name the
//! pair `product_id`, as upstream producers do. Unknown fields (such as the
//! ISO `timestamp` string) are ignored; `timestamp_ms` is authoritative.

use crate::aggregators::EmittedRecord;
use crate::errors::EventError;
use crate::types::{Candle, Trade};
use serde::Deserialize;
use serde_json::Value;

/// Decoded inbound event
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// Raw trade
    Trade(Trade),
    /// Upstream candle
    Candle(Candle),
}

#[derive(Debug, Deserialize)]
struct TradeMessage {
    #[serde(alias = "product_id")]
    pair: String,
    price: f64,
    quantity: f64,
    timestamp_ms: i64,
}

impl From<TradeMessage> for Trade {
    fn from(msg: TradeMessage) -> Self {
        Self::new(msg.pair, msg.price, msg.quantity, msg.timestamp_ms)
    }
}

/// Decode and validate a single trade
pub fn decode_trade(line: &str) -> Result<Trade, EventError> {
    let trade: Trade = serde_json::from_str::<TradeMessage>(line)?.into();
    trade.validate()?;
    Ok(trade)
}

/// Decode one inbound line, trade or candle
pub fn decode_event(line: &str) -> Result<InboundEvent, EventError> {
    let value: Value = serde_json::from_str(line)?;
    if !value.is_object() {
        return Err(EventError::Malformed(format!(
            "expected a JSON object, got {}",
            json_kind(&value)
        )));
    }

    if value.get("window_start_ms").is_some() {
        let candle: Candle = serde_json::from_value(value)?;
        candle.validate()?;
        Ok(InboundEvent::Candle(candle))
    } else {
        let trade: Trade = serde_json::from_value::<TradeMessage>(value)?.into();
        trade.validate()?;
        Ok(InboundEvent::Trade(trade))
    }
}

/// Encode an emitted record as a single JSON line (no trailing newline)
pub fn encode_record(record: &EmittedRecord) -> Result<String, serde_json::Error> {
    serde_json::to_string(record)
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
