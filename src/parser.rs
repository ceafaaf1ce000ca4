//! Parser module for the OKX v3 WebSocket feed
//!
//! Handles keepalive filtering, raw-deflate inflation and classification of
//! the message envelope into feed messages.

use flate2::read::DeflateDecoder;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::io::Read;

use crate::error::{FeedError, Result};

/// Keepalive request payload sent on the ping timer
pub const PING: &str = "ping";
/// Keepalive reply payload, filtered before decoding
pub const PONG: &str = "pong";

/// Depth channel table name
pub const TABLE_DEPTH: &str = "futures/depth_l2_tbt";
/// Mark price channel table name
pub const TABLE_MARK_PRICE: &str = "futures/mark_price";
/// Ticker channel table name, carries the last traded price
pub const TABLE_TICKER: &str = "futures/ticker";

/// A raw frame as received from the transport
#[derive(Debug, Clone)]
pub enum FeedFrame {
    Text(String),
    Binary(Vec<u8>),
}

/// A classified feed message, ready for the book engine
#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
    /// Incremental depth rows per side; each row is
    /// `[price, quantity, ...]` with trailing metadata ignored.
    /// Values stay as strings until the engine validates them.
    DepthDelta {
        asks: Vec<Vec<String>>,
        bids: Vec<Vec<String>>,
    },
    /// Mark price update; `None` when the payload carried no value
    MarkPrice(Option<Decimal>),
    /// Last traded price update; `None` when the payload carried no value
    LastTradePrice(Option<Decimal>),
}

/// Subscribe command sent once per connection
#[derive(Debug, Clone, Serialize)]
pub struct SubscribeRequest {
    pub op: String,
    pub args: Vec<String>,
}

impl SubscribeRequest {
    pub fn new(channels: Vec<String>) -> Self {
        Self {
            op: "subscribe".to_string(),
            args: channels,
        }
    }
}

/// Feed message envelope
#[derive(Debug, Clone, Deserialize)]
struct Envelope {
    /// Channel table; absent on event acks
    table: Option<String>,

    /// Data payload rows
    #[serde(default)]
    data: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct DepthData {
    #[serde(default)]
    asks: Vec<Vec<String>>,
    #[serde(default)]
    bids: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
struct MarkPriceData {
    #[serde(default)]
    mark_price: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize)]
struct TickerData {
    #[serde(default)]
    last: Option<Decimal>,
}

/// Decode a raw transport frame into a feed message.
///
/// Returns `Ok(None)` for frames that carry no downstream event: the literal
/// keepalive reply and envelopes without a `table` field (event acks).
pub fn decode_frame(frame: &FeedFrame) -> Result<Option<FeedMessage>> {
    let text = match frame {
        FeedFrame::Text(t) if t == PONG => return Ok(None),
        FeedFrame::Text(t) => t.clone(),
        FeedFrame::Binary(data) => inflate_raw(data)?,
    };
    classify(&text)
}

/// Inflate a raw-deflate compressed frame into text
fn inflate_raw(data: &[u8]) -> Result<String> {
    let mut decoder = DeflateDecoder::new(data);
    let mut text = String::new();
    decoder.read_to_string(&mut text)?;
    Ok(text)
}

/// Classify an envelope by its `table` field
pub fn classify(raw: &str) -> Result<Option<FeedMessage>> {
    let envelope: Envelope = serde_json::from_str(raw)?;

    let Some(table) = envelope.table else {
        // Subscribe acks and error events have no table; nothing to deliver
        return Ok(None);
    };

    match table.as_str() {
        TABLE_DEPTH => {
            let Some(row) = envelope.data.into_iter().next() else {
                return Ok(None);
            };
            let depth: DepthData = serde_json::from_value(row)?;
            Ok(Some(FeedMessage::DepthDelta {
                asks: depth.asks,
                bids: depth.bids,
            }))
        }
        TABLE_MARK_PRICE => {
            let value = match envelope.data.into_iter().next() {
                Some(row) => serde_json::from_value::<MarkPriceData>(row)?.mark_price,
                None => None,
            };
            Ok(Some(FeedMessage::MarkPrice(value)))
        }
        TABLE_TICKER => {
            let value = match envelope.data.into_iter().next() {
                Some(row) => serde_json::from_value::<TickerData>(row)?.last,
                None => None,
            };
            Ok(Some(FeedMessage::LastTradePrice(value)))
        }
        other => Err(FeedError::UnsupportedFeedKind(other.to_string())),
    }
}
