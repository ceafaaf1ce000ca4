//! Order book module
//!
//! Holds the depth-aggregated book state for a single futures instrument.

mod engine;

pub use engine::BookEngine;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction of the last traded price relative to the previous one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TradeDirection {
    Up,
    Down,
    /// No ticker update observed yet
    #[default]
    Unknown,
}

/// A single aggregated level in the book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub quantity: Decimal,
    /// Running quantity sum from the best price outward; derived,
    /// recomputed whenever the side is rebuilt
    pub cumulative: Decimal,
}

impl PriceLevel {
    pub fn new(price: Decimal, quantity: Decimal) -> Self {
        Self {
            price,
            quantity,
            cumulative: Decimal::ZERO,
        }
    }
}

/// Depth-aggregated book for a single instrument.
///
/// One instance exists per session; the engine mutates it in place and
/// consumers treat each returned reference as the current authoritative state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Book {
    /// Ask levels, ascending by price (best ask first)
    pub asks: Vec<PriceLevel>,
    /// Bid levels, descending by price (best bid first)
    pub bids: Vec<PriceLevel>,
    pub last_traded_price: Option<Decimal>,
    pub mark_price: Option<Decimal>,
    pub last_trade_direction: TradeDirection,
    /// Sum of each side's last cumulative value
    pub total_visible_quantity: Decimal,
}

impl Book {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask levels in display order, cheapest ask adjacent to the spread
    pub fn asks_display(&self) -> impl Iterator<Item = &PriceLevel> {
        self.asks.iter().rev()
    }

    /// Best (lowest) ask price
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first().map(|l| l.price)
    }

    /// Best (highest) bid price
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first().map(|l| l.price)
    }
}
