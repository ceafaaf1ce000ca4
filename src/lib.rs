//! Depth-aggregated futures order book over the OKX v3 WebSocket feed
//!
//! This crate maintains a live, bucket-aggregated order book for a single
//! futures instrument and keeps the feed connection alive across transient
//! failures.

pub mod book;
pub mod config;
pub mod error;
pub mod parser;
pub mod websocket;

pub use book::{Book, BookEngine, PriceLevel, TradeDirection};
pub use config::Config;
pub use error::{FeedError, Result};
pub use parser::{FeedFrame, FeedMessage, SubscribeRequest};
pub use websocket::{ConnectionManager, ConnectionState};
