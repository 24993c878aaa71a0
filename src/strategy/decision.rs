//! Entry and exit decisions
//!
//! Pure functions over prices and positions. No IO, no state.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{Instrument, OrderSide};

/// Gap thresholds, fixed for the strategy's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Minimum gap between prior close and evening close, in points
    pub day_rate: Decimal,
    /// Minimum move of the last bar away from the evening close, in points
    pub evening_rate: Decimal,
}

/// Which branch of the entry tree produced a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryBranch {
    /// Evening closed well above the prior close
    GapUp,
    /// Evening closed well below, and the last bar bounced above it
    GapDownRebound,
    /// Evening closed well below, and the last bar kept falling
    GapDownExtension,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryDecision {
    pub side: OrderSide,
    pub branch: EntryBranch,
}

/// Evaluate the entry tree. The first matching branch wins.
///
/// * `close` - prior-day close
/// * `evening` - same-day evening session close
/// * `last` - close of the latest bar
pub fn decide_entry(
    close: Decimal,
    evening: Decimal,
    last: Decimal,
    thresholds: &Thresholds,
) -> Option<EntryDecision> {
    if evening - close > thresholds.day_rate {
        return Some(EntryDecision {
            side: OrderSide::Sell,
            branch: EntryBranch::GapUp,
        });
    }

    if close - evening > thresholds.day_rate {
        if last - evening > thresholds.evening_rate {
            return Some(EntryDecision {
                side: OrderSide::Sell,
                branch: EntryBranch::GapDownRebound,
            });
        }
        if evening - last > thresholds.evening_rate {
            return Some(EntryDecision {
                side: OrderSide::Buy,
                branch: EntryBranch::GapDownExtension,
            });
        }
    }

    None
}

/// Protective stop level for an entry, rounded to the price step
pub fn protective_stop(
    instrument: &Instrument,
    side: OrderSide,
    price: Decimal,
    stop_loss_pct: Decimal,
) -> Decimal {
    let offset = stop_loss_pct / Decimal::ONE_HUNDRED;
    let raw = match side {
        OrderSide::Sell => price * (Decimal::ONE + offset),
        OrderSide::Buy => price * (Decimal::ONE - offset),
    };
    instrument.shrink_price(raw)
}

/// How to flatten a position at the exit gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitPlan {
    pub side: OrderSide,
    pub volume: Decimal,
}

impl ExitPlan {
    /// Exit against the opposing side of the book: sells hit the bid, buys lift the ask
    pub fn hits_bid(&self) -> bool {
        self.side == OrderSide::Sell
    }
}

/// None when flat
pub fn plan_time_exit(position: Decimal) -> Option<ExitPlan> {
    if position.is_zero() {
        return None;
    }
    let side = if position > Decimal::ZERO {
        OrderSide::Sell
    } else {
        OrderSide::Buy
    };
    Some(ExitPlan {
        side,
        volume: position.abs(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn rates(day: Decimal, evening: Decimal) -> Thresholds {
        Thresholds {
            day_rate: day,
            evening_rate: evening,
        }
    }

    #[test]
    fn test_gap_up_sells() {
        let d = decide_entry(dec!(100), dec!(110), dec!(108), &rates(dec!(5), dec!(3))).unwrap();
        assert_eq!(d.side, OrderSide::Sell);
        assert_eq!(d.branch, EntryBranch::GapUp);
    }

    #[test]
    fn test_gap_up_ignores_last_bar() {
        // last far below evening would be a buy in the gap-down branch; gap up wins first
        let d = decide_entry(dec!(100), dec!(110), dec!(50), &rates(dec!(5), dec!(3))).unwrap();
        assert_eq!(d.side, OrderSide::Sell);
    }

    #[test]
    fn test_gap_down_extension_buys() {
        let d = decide_entry(dec!(110), dec!(100), dec!(96), &rates(dec!(5), dec!(3))).unwrap();
        assert_eq!(d.side, OrderSide::Buy);
        assert_eq!(d.branch, EntryBranch::GapDownExtension);
    }

    #[test]
    fn test_gap_down_rebound_sells() {
        let d = decide_entry(dec!(110), dec!(100), dec!(104), &rates(dec!(5), dec!(3))).unwrap();
        assert_eq!(d.side, OrderSide::Sell);
        assert_eq!(d.branch, EntryBranch::GapDownRebound);
    }

    #[test]
    fn test_gap_down_inside_evening_band_is_flat() {
        // last - evening = 3, not > 3; evening - last = -3
        assert_eq!(
            decide_entry(dec!(110), dec!(100), dec!(103), &rates(dec!(5), dec!(3))),
            None
        );
    }

    #[test]
    fn test_thresholds_are_strict() {
        // gap exactly equal to day_rate does not count
        assert_eq!(
            decide_entry(dec!(100), dec!(105), dec!(105), &rates(dec!(5), dec!(3))),
            None
        );
        assert_eq!(
            decide_entry(dec!(105), dec!(100), dec!(90), &rates(dec!(5), dec!(3))),
            None
        );
    }

    #[test]
    fn test_protective_stop_levels() {
        let ri = Instrument::new("RIZ5", dec!(10));
        assert_eq!(
            protective_stop(&ri, OrderSide::Sell, dec!(100000), dec!(1.5)),
            dec!(101500)
        );
        assert_eq!(
            protective_stop(&ri, OrderSide::Buy, dec!(100000), dec!(1.5)),
            dec!(98500)
        );
    }

    #[test]
    fn test_exit_plan_long_short_flat() {
        let long = plan_time_exit(dec!(10)).unwrap();
        assert_eq!(long.side, OrderSide::Sell);
        assert_eq!(long.volume, dec!(10));
        assert!(long.hits_bid());

        let short = plan_time_exit(dec!(-10)).unwrap();
        assert_eq!(short.side, OrderSide::Buy);
        assert_eq!(short.volume, dec!(10));
        assert!(!short.hits_bid());

        assert!(plan_time_exit(Decimal::ZERO).is_none());
    }
}
