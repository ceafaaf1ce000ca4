//! Depth aggregation engine
//!
//! Converts classified feed messages into book mutations: bucketing raw
//! price rows by the configured width, merging them into the held side,
//! recomputing cumulative totals and truncating to the visible depth.

use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

use super::{Book, PriceLevel, TradeDirection};
use crate::error::{FeedError, Result};
use crate::parser::FeedMessage;

/// Maximum visible levels per side
const MAX_VISIBLE_LEVELS: usize = 6;

/// Single-writer owner of the book state.
///
/// Not reentrant-safe: callers must serialize `apply_message` invocations,
/// because cumulative recomputation reads and writes a whole side at a time.
#[derive(Debug)]
pub struct BookEngine {
    book: Book,
    bucket_width: Decimal,
}

impl Default for BookEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl BookEngine {
    /// Create an engine with an empty book and the default 0.5 bucket width
    pub fn new() -> Self {
        Self {
            book: Book::new(),
            bucket_width: Decimal::new(5, 1),
        }
    }

    /// Current book state
    pub fn book(&self) -> &Book {
        &self.book
    }

    /// Set the price bucket width.
    ///
    /// Takes effect on subsequent deltas only; already-held levels keep
    /// their binning.
    pub fn set_bucket_width(&mut self, width: Decimal) -> Result<()> {
        if width <= Decimal::ZERO {
            return Err(FeedError::Config(format!(
                "bucket width must be positive, got {width}"
            )));
        }
        self.bucket_width = width;
        Ok(())
    }

    /// Apply a classified feed message, returning the current book state.
    ///
    /// On error the book is left exactly as it was before the call.
    pub fn apply_message(&mut self, msg: &FeedMessage) -> Result<&Book> {
        match msg {
            FeedMessage::DepthDelta { asks, bids } => self.apply_depth_delta(asks, bids)?,
            FeedMessage::MarkPrice(value) => self.apply_mark_price(*value),
            FeedMessage::LastTradePrice(value) => self.apply_last_trade_price(*value),
        }
        Ok(&self.book)
    }

    fn apply_depth_delta(&mut self, asks: &[Vec<String>], bids: &[Vec<String>]) -> Result<()> {
        // Both sides are staged before committing so that a malformed row
        // anywhere in the delta leaves the book untouched.
        let ask_rows = parse_rows(asks)?;
        let bid_rows = parse_rows(bids)?;
        let width = self.bucket_width;

        // An empty incoming side reuses the held side unchanged; absence is
        // not "clear book".
        let new_asks = if ask_rows.is_empty() {
            None
        } else {
            let anchor = rounded_price(ask_rows[0].0, width);
            let bucketed = bucket_rows(&ask_rows, |p| ask_bucket_key(p, anchor, width));
            let mut merged = merge_levels(&self.book.asks, bucketed);
            merged.sort_by(|a, b| a.price.cmp(&b.price));
            accumulate(&mut merged);
            merged.truncate(MAX_VISIBLE_LEVELS);
            Some(merged)
        };

        let new_bids = if bid_rows.is_empty() {
            None
        } else {
            // Bid rows arrive sorted best-first, so the cheapest row is last
            // and anchors the bucket grid. This leans on the feed's per-side
            // ordering; no global sort is assumed.
            let anchor = rounded_price(bid_rows[bid_rows.len() - 1].0, width);
            let bucketed = bucket_rows(&bid_rows, |p| bid_bucket_key(p, anchor, width));
            let mut merged = merge_levels(&self.book.bids, bucketed);
            merged.sort_by(|a, b| b.price.cmp(&a.price));
            accumulate(&mut merged);
            merged.truncate(MAX_VISIBLE_LEVELS);
            Some(merged)
        };

        if let Some(levels) = new_asks {
            self.book.asks = levels;
        }
        if let Some(levels) = new_bids {
            self.book.bids = levels;
        }
        self.book.total_visible_quantity =
            last_cumulative(&self.book.asks) + last_cumulative(&self.book.bids);
        Ok(())
    }

    fn apply_mark_price(&mut self, value: Option<Decimal>) {
        if let Some(value) = value {
            self.book.mark_price = Some(rounded_price(value, self.bucket_width));
        }
    }

    fn apply_last_trade_price(&mut self, value: Option<Decimal>) {
        let Some(value) = value else {
            return;
        };
        // The raw value compares against the stored (rounded) prior. The
        // first observation has no prior and classifies as Down.
        self.book.last_trade_direction = match self.book.last_traded_price {
            Some(prev) if value > prev => TradeDirection::Up,
            _ => TradeDirection::Down,
        };
        self.book.last_traded_price = Some(rounded_price(value, self.bucket_width));
    }
}

/// Round a price per the active bucket width: to the nearest half-integer
/// when the width is 0.5, to the nearest integer for any other width.
pub fn rounded_price(price: Decimal, width: Decimal) -> Decimal {
    if width == Decimal::new(5, 1) {
        round_half_up(price * Decimal::TWO) / Decimal::TWO
    } else {
        round_half_up(price)
    }
}

fn round_half_up(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
}

/// Ask bucket key: bins extend upward from the anchor, so every price
/// within one width above a grid point shares its bucket.
fn ask_bucket_key(price: Decimal, anchor: Decimal, width: Decimal) -> Decimal {
    anchor + ((price - anchor) / width).floor() * width
}

/// Bid bucket key: mirror of the ask form, bins extend downward
fn bid_bucket_key(price: Decimal, anchor: Decimal, width: Decimal) -> Decimal {
    anchor - ((anchor - price) / width).floor() * width
}

/// Parse raw `[price, quantity, ...]` rows, ignoring trailing metadata
fn parse_rows(rows: &[Vec<String>]) -> Result<Vec<(Decimal, Decimal)>> {
    rows.iter()
        .map(|row| {
            let (price, quantity) = match (row.first(), row.get(1)) {
                (Some(p), Some(q)) => (p, q),
                _ => {
                    return Err(FeedError::MalformedLevel(format!(
                        "depth row too short: {row:?}"
                    )))
                }
            };
            let price = Decimal::from_str(price)
                .map_err(|_| FeedError::MalformedLevel(format!("bad price: {price}")))?;
            let quantity = Decimal::from_str(quantity)
                .map_err(|_| FeedError::MalformedLevel(format!("bad quantity: {quantity}")))?;
            Ok((price, quantity))
        })
        .collect()
}

/// Group rows by bucket key, summing quantities within a bucket
fn bucket_rows(
    rows: &[(Decimal, Decimal)],
    key_fn: impl Fn(Decimal) -> Decimal,
) -> Vec<PriceLevel> {
    let mut bucketed: Vec<PriceLevel> = Vec::with_capacity(rows.len());
    for &(price, quantity) in rows {
        let key = key_fn(price);
        match bucketed.iter_mut().find(|l| l.price == key) {
            Some(level) => level.quantity += quantity,
            None => bucketed.push(PriceLevel::new(key, quantity)),
        }
    }
    bucketed
}

/// Merge bucketed incoming levels into the held side.
///
/// A held level at the same price has its quantity summed with the incoming
/// one (delta-accumulation merge); new prices are appended.
fn merge_levels(held: &[PriceLevel], incoming: Vec<PriceLevel>) -> Vec<PriceLevel> {
    let mut merged = held.to_vec();
    for level in incoming {
        match merged.iter_mut().find(|l| l.price == level.price) {
            Some(existing) => existing.quantity += level.quantity,
            None => merged.push(level),
        }
    }
    merged
}

/// Recompute cumulative totals left-to-right over a sorted side
fn accumulate(levels: &mut [PriceLevel]) {
    let mut running = Decimal::ZERO;
    for level in levels.iter_mut() {
        running += level.quantity;
        level.cumulative = running;
    }
}

fn last_cumulative(levels: &[PriceLevel]) -> Decimal {
    levels.last().map(|l| l.cumulative).unwrap_or(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn rows(values: &[(&str, &str)]) -> Vec<Vec<String>> {
        values
            .iter()
            .map(|(p, q)| vec![p.to_string(), q.to_string(), "0".to_string(), "1".to_string()])
            .collect()
    }

    fn delta(asks: &[(&str, &str)], bids: &[(&str, &str)]) -> FeedMessage {
        FeedMessage::DepthDelta {
            asks: rows(asks),
            bids: rows(bids),
        }
    }

    fn assert_side_invariants(levels: &[PriceLevel], ascending: bool) {
        assert!(levels.len() <= 6);
        let mut running = Decimal::ZERO;
        for (i, level) in levels.iter().enumerate() {
            running += level.quantity;
            assert_eq!(level.cumulative, running, "cumulative broken at {i}");
            if i > 0 {
                if ascending {
                    assert!(levels[i - 1].price < level.price);
                } else {
                    assert!(levels[i - 1].price > level.price);
                }
            }
        }
    }

    #[test]
    fn test_rounded_price() {
        assert_eq!(rounded_price(dec!(100.26), dec!(0.5)), dec!(100.5));
        assert_eq!(rounded_price(dec!(100.2), dec!(1)), dec!(100));
        assert_eq!(rounded_price(dec!(100.2), dec!(0.5)), dec!(100.0));
        assert_eq!(rounded_price(dec!(100.6), dec!(2)), dec!(101));
    }

    #[test]
    fn test_bucketing_same_bucket() {
        // Raw asks at 100.2 and 100.3 share the bucket anchored at 100
        let mut engine = BookEngine::new();
        let book = engine
            .apply_message(&delta(&[("100.2", "1"), ("100.3", "2")], &[]))
            .unwrap();

        assert_eq!(book.asks.len(), 1);
        assert_eq!(book.asks[0].price, dec!(100.0));
        assert_eq!(book.asks[0].quantity, dec!(3));
    }

    #[test]
    fn test_delta_scenario() {
        let mut engine = BookEngine::new();
        let book = engine
            .apply_message(&delta(&[("100", "5"), ("100.4", "3")], &[("99", "2")]))
            .unwrap();

        assert_eq!(book.asks.len(), 1);
        assert_eq!(book.asks[0].price, dec!(100));
        assert_eq!(book.asks[0].quantity, dec!(8));
        assert_eq!(book.asks[0].cumulative, dec!(8));

        assert_eq!(book.bids.len(), 1);
        assert_eq!(book.bids[0].price, dec!(99));
        assert_eq!(book.bids[0].quantity, dec!(2));
        assert_eq!(book.bids[0].cumulative, dec!(2));

        assert_eq!(book.total_visible_quantity, dec!(10));
    }

    #[test]
    fn test_cumulative_and_ordering_invariants() {
        let mut engine = BookEngine::new();
        engine
            .apply_message(&delta(
                &[("101", "1"), ("102.5", "2"), ("100", "4"), ("103", "1.5")],
                &[("99.5", "3"), ("98", "1"), ("97.5", "2")],
            ))
            .unwrap();
        engine
            .apply_message(&delta(&[("101.5", "2"), ("100.5", "1")], &[("99", "4")]))
            .unwrap();

        let book = engine.book();
        assert_side_invariants(&book.asks, true);
        assert_side_invariants(&book.bids, false);

        let ask_total = book.asks.last().map(|l| l.cumulative).unwrap();
        let bid_total = book.bids.last().map(|l| l.cumulative).unwrap();
        assert_eq!(book.total_visible_quantity, ask_total + bid_total);
    }

    #[test]
    fn test_bounded_depth() {
        let mut engine = BookEngine::new();
        let asks: Vec<(String, String)> = (0..9)
            .map(|i| (format!("{}", 100 + i), "1".to_string()))
            .collect();
        let ask_refs: Vec<(&str, &str)> =
            asks.iter().map(|(p, q)| (p.as_str(), q.as_str())).collect();
        let book = engine.apply_message(&delta(&ask_refs, &[])).unwrap();

        // The nearest-to-market six survive truncation
        assert_eq!(book.asks.len(), 6);
        assert_eq!(book.asks[0].price, dec!(100));
        assert_eq!(book.asks[5].price, dec!(105));
        assert_eq!(book.total_visible_quantity, dec!(6));
    }

    #[test]
    fn test_empty_side_reuses_held_levels() {
        let mut engine = BookEngine::new();
        engine
            .apply_message(&delta(&[("100", "5")], &[("99", "2")]))
            .unwrap();
        let held_asks = engine.book().asks.clone();

        let book = engine.apply_message(&delta(&[], &[("98.5", "1")])).unwrap();
        assert_eq!(book.asks, held_asks);
        assert_eq!(book.bids.len(), 2);
    }

    #[test]
    fn test_repeated_price_sums_quantity() {
        // Delta-accumulation merge: a repeated price adds to the held
        // quantity instead of replacing it
        let mut engine = BookEngine::new();
        engine.apply_message(&delta(&[("100", "5")], &[])).unwrap();
        let book = engine.apply_message(&delta(&[("100", "3")], &[])).unwrap();

        assert_eq!(book.asks.len(), 1);
        assert_eq!(book.asks[0].quantity, dec!(8));
    }

    #[test]
    fn test_malformed_level_rejects_whole_delta() {
        let mut engine = BookEngine::new();
        engine
            .apply_message(&delta(&[("100", "5")], &[("99", "2")]))
            .unwrap();
        let before = engine.book().clone();

        // Valid ask side, malformed bid side: nothing may be applied
        let result = engine.apply_message(&delta(&[("100.5", "1")], &[("99.5", "bogus")]));
        match result {
            Err(FeedError::MalformedLevel(_)) => {}
            other => panic!("Expected MalformedLevel, got {other:?}"),
        }

        let after = engine.book();
        assert_eq!(after.asks, before.asks);
        assert_eq!(after.bids, before.bids);
        assert_eq!(after.total_visible_quantity, before.total_visible_quantity);
    }

    #[test]
    fn test_short_row_is_malformed() {
        let mut engine = BookEngine::new();
        let msg = FeedMessage::DepthDelta {
            asks: vec![vec!["100".to_string()]],
            bids: vec![],
        };
        assert!(matches!(
            engine.apply_message(&msg),
            Err(FeedError::MalformedLevel(_))
        ));
    }

    #[test]
    fn test_mark_price_rounds_and_stores() {
        let mut engine = BookEngine::new();
        let book = engine
            .apply_message(&FeedMessage::MarkPrice(Some(dec!(100.26))))
            .unwrap();
        assert_eq!(book.mark_price, Some(dec!(100.5)));
        assert!(book.asks.is_empty());
        assert!(book.bids.is_empty());
    }

    #[test]
    fn test_absent_values_are_noops() {
        let mut engine = BookEngine::new();
        engine
            .apply_message(&FeedMessage::LastTradePrice(Some(dec!(100))))
            .unwrap();
        let before = engine.book().clone();

        engine.apply_message(&FeedMessage::MarkPrice(None)).unwrap();
        engine
            .apply_message(&FeedMessage::LastTradePrice(None))
            .unwrap();

        let after = engine.book();
        assert_eq!(after.mark_price, before.mark_price);
        assert_eq!(after.last_traded_price, before.last_traded_price);
        assert_eq!(after.last_trade_direction, before.last_trade_direction);
    }

    #[test]
    fn test_trade_direction_sequence() {
        let mut engine = BookEngine::new();
        assert_eq!(engine.book().last_trade_direction, TradeDirection::Unknown);

        // First observation has no prior value and classifies as Down
        let book = engine
            .apply_message(&FeedMessage::LastTradePrice(Some(dec!(100.2))))
            .unwrap();
        assert_eq!(book.last_trade_direction, TradeDirection::Down);
        assert_eq!(book.last_traded_price, Some(dec!(100.0)));

        let book = engine
            .apply_message(&FeedMessage::LastTradePrice(Some(dec!(100.4))))
            .unwrap();
        assert_eq!(book.last_trade_direction, TradeDirection::Up);
        assert_eq!(book.last_traded_price, Some(dec!(100.5)));

        let book = engine
            .apply_message(&FeedMessage::LastTradePrice(Some(dec!(100.3))))
            .unwrap();
        assert_eq!(book.last_trade_direction, TradeDirection::Down);
    }

    #[test]
    fn test_bucket_width_validation() {
        let mut engine = BookEngine::new();
        assert!(matches!(
            engine.set_bucket_width(dec!(0)),
            Err(FeedError::Config(_))
        ));
        assert!(matches!(
            engine.set_bucket_width(dec!(-0.5)),
            Err(FeedError::Config(_))
        ));
        assert!(engine.set_bucket_width(dec!(1)).is_ok());
    }

    #[test]
    fn test_bucket_width_applies_to_next_delta() {
        let mut engine = BookEngine::new();
        engine.apply_message(&delta(&[("100.2", "1")], &[])).unwrap();
        assert_eq!(engine.book().asks[0].price, dec!(100.0));

        engine.set_bucket_width(dec!(1)).unwrap();
        // The held 100.0 level keeps its binning; new rows use the wider grid
        let book = engine.apply_message(&delta(&[("104.2", "2")], &[])).unwrap();
        assert_eq!(book.asks.len(), 2);
        assert_eq!(book.asks[1].price, dec!(104));
    }

    #[test]
    fn test_bid_anchor_from_last_row() {
        // Bid rows arrive best-first; the cheapest (last) row anchors the grid
        let mut engine = BookEngine::new();
        let book = engine
            .apply_message(&delta(&[], &[("99.5", "1"), ("99", "2"), ("98.5", "3")]))
            .unwrap();

        assert_side_invariants(&book.bids, false);
        assert_eq!(book.bids[0].price, dec!(99.5));
        assert_eq!(book.bids[2].price, dec!(98.5));
        assert_eq!(book.total_visible_quantity, dec!(6));
    }

    #[test]
    fn test_asks_display_order() {
        let mut engine = BookEngine::new();
        engine
            .apply_message(&delta(&[("100", "1"), ("101", "2"), ("102", "3")], &[]))
            .unwrap();

        let display: Vec<Decimal> = engine.book().asks_display().map(|l| l.price).collect();
        // Cheapest ask sits adjacent to the spread
        assert_eq!(display, vec![dec!(102), dec!(101), dec!(100)]);
    }
}
