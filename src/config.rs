//! Configuration module for the depth feed

use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;
use std::str::FromStr;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Futures instrument to subscribe to (e.g. "BTC-USD-210625")
    pub instrument: String,

    /// WebSocket endpoint for the OKX v3 stream
    pub ws_endpoint: String,

    /// Throttle window for coalesced message delivery, in milliseconds
    pub throttle_ms: u64,

    /// Fixed delay between reconnect attempts, in milliseconds
    pub reconnect_delay_ms: u64,

    /// Reconnect attempts before the connection is declared failed
    pub max_reconnect_attempts: u32,

    /// Keepalive ping interval in seconds
    pub keepalive_interval_secs: u64,

    /// Initial price bucket width for depth aggregation
    pub bucket_width: Decimal,
}

impl Config {
    /// Load configuration from environment variables
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            instrument: env::var("INSTRUMENT")
                .unwrap_or_else(|_| "BTC-USD-210625".to_string())
                .trim()
                .to_uppercase(),
            ws_endpoint: env::var("WS_ENDPOINT")
                .unwrap_or_else(|_| "wss://real.okx.com:8443/ws/v3".to_string()),
            throttle_ms: env::var("THROTTLE_MS")
                .unwrap_or_else(|_| "500".to_string())
                .parse()
                .unwrap_or(500),
            reconnect_delay_ms: env::var("RECONNECT_DELAY_MS")
                .unwrap_or_else(|_| "2000".to_string())
                .parse()
                .unwrap_or(2000),
            max_reconnect_attempts: env::var("MAX_RECONNECT_ATTEMPTS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .unwrap_or(5),
            keepalive_interval_secs: env::var("KEEPALIVE_INTERVAL_SECS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .unwrap_or(5),
            bucket_width: env::var("BUCKET_WIDTH")
                .ok()
                .and_then(|v| Decimal::from_str(&v).ok())
                .unwrap_or_else(|| Decimal::new(5, 1)),
        })
    }

    /// Channel names for the subscribe request, derived from the instrument
    pub fn channels(&self) -> Vec<String> {
        vec![
            format!("futures/depth_l2_tbt:{}", self.instrument),
            format!("futures/mark_price:{}", self.instrument),
            format!("futures/ticker:{}", self.instrument),
        ]
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            instrument: "BTC-USD-210625".to_string(),
            ws_endpoint: "wss://real.okx.com:8443/ws/v3".to_string(),
            throttle_ms: 500,
            reconnect_delay_ms: 2000,
            max_reconnect_attempts: 5,
            keepalive_interval_secs: 5,
            bucket_width: Decimal::new(5, 1),
        }
    }
}
