use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Instrument;

/// Order side (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }

    /// Signed position change produced by filling `volume` on this side
    pub fn signed(&self, volume: Decimal) -> Decimal {
        match self {
            OrderSide::Buy => volume,
            OrderSide::Sell => -volume,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Order type. Every order this rule places rests on the book at a price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Limit,
}

/// What an order is for. Replaces matching on the free-form comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderTag {
    /// Opens a new position at the entry gate
    Entry,
    /// Unwinds an open position at the exit gate
    TimeExit,
}

impl OrderTag {
    /// Short marker used in the human-readable order comment
    pub fn marker(&self) -> &'static str {
        match self {
            OrderTag::Entry => "enter",
            OrderTag::TimeExit => "t",
        }
    }
}

/// Order status as reported through the lifecycle stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    /// Handed to the gateway, not yet acknowledged
    Submitted,
    /// Accepted by the venue and resting
    Registered,
    /// Filled
    Matched,
    /// Cancelled before fill
    Cancelled,
    /// Refused by the venue
    Rejected,
    /// Expiry date passed without fill
    Expired,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Submitted => "SUBMITTED",
            OrderStatus::Registered => "REGISTERED",
            OrderStatus::Matched => "MATCHED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Rejected => "REJECTED",
            OrderStatus::Expired => "EXPIRED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Matched
                | OrderStatus::Cancelled
                | OrderStatus::Rejected
                | OrderStatus::Expired
        )
    }

    /// Still working at the venue (counts as pending)
    pub fn is_active(&self) -> bool {
        matches!(self, OrderStatus::Submitted | OrderStatus::Registered)
    }

    /// Check if this status can transition to another status
    pub fn can_transition_to(&self, target: OrderStatus) -> bool {
        use OrderStatus::*;

        match (self, target) {
            (Submitted, Registered) => true,
            // venue may report the fill before the acknowledgement
            (Submitted, Matched) => true,
            (Submitted, Cancelled) => true,
            (Submitted, Rejected) => true,

            (Registered, Matched) => true,
            (Registered, Cancelled) => true,
            (Registered, Expired) => true,

            _ => false,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Order request (what we want the gateway to do)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub client_order_id: String,
    /// Name of the strategy that owns the order
    pub strategy: String,
    pub code: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub price: Decimal,
    pub volume: Decimal,
    pub expiry: Option<NaiveDateTime>,
    pub tag: OrderTag,
}

impl OrderRequest {
    /// Limit order with the price rounded to the instrument's price step
    pub fn limit(
        strategy: &str,
        instrument: &Instrument,
        side: OrderSide,
        price: Decimal,
        volume: Decimal,
        tag: OrderTag,
    ) -> Self {
        Self {
            client_order_id: Uuid::new_v4().to_string(),
            strategy: strategy.to_string(),
            code: instrument.code.clone(),
            side,
            order_type: OrderType::Limit,
            price: instrument.shrink_price(price),
            volume,
            expiry: None,
            tag,
        }
    }

    pub fn with_expiry(mut self, expiry: NaiveDateTime) -> Self {
        self.expiry = Some(expiry);
        self
    }

    /// Human-readable comment, e.g. "CloseRts, enter"
    pub fn comment(&self) -> String {
        format!("{}, {}", self.strategy, self.tag.marker())
    }
}

/// Lifecycle notification for a submitted order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderUpdate {
    pub order_id: String,
    pub status: OrderStatus,
    pub timestamp: DateTime<Utc>,
    /// Venue message for rejections and cancels
    pub reason: Option<String>,
}

impl OrderUpdate {
    pub fn new(order_id: impl Into<String>, status: OrderStatus) -> Self {
        Self {
            order_id: order_id.into(),
            status,
            timestamp: Utc::now(),
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_limit_request_rounds_price_and_tags() {
        let ri = Instrument::new("RIZ5", dec!(10));
        let req = OrderRequest::limit(
            "CloseRts",
            &ri,
            OrderSide::Sell,
            dec!(112347),
            dec!(2),
            OrderTag::Entry,
        );
        assert_eq!(req.price, dec!(112350));
        assert_eq!(req.order_type, OrderType::Limit);
        assert_eq!(req.comment(), "CloseRts, enter");
        assert!(req.expiry.is_none());
    }

    #[test]
    fn test_client_order_ids_are_unique() {
        let ri = Instrument::new("RIZ5", dec!(10));
        let a = OrderRequest::limit("s", &ri, OrderSide::Buy, dec!(1), dec!(1), OrderTag::TimeExit);
        let b = OrderRequest::limit("s", &ri, OrderSide::Buy, dec!(1), dec!(1), OrderTag::TimeExit);
        assert_ne!(a.client_order_id, b.client_order_id);
        assert_eq!(a.comment(), "s, t");
    }

    #[test]
    fn test_status_transitions() {
        use OrderStatus::*;
        assert!(Submitted.can_transition_to(Registered));
        assert!(Registered.can_transition_to(Matched));
        assert!(Registered.can_transition_to(Expired));
        assert!(!Submitted.can_transition_to(Expired));
        assert!(!Matched.can_transition_to(Matched));
        assert!(!Cancelled.can_transition_to(Registered));
        assert!(!Registered.can_transition_to(Submitted));
    }

    #[test]
    fn test_terminal_and_active_are_disjoint() {
        use OrderStatus::*;
        for status in [Submitted, Registered, Matched, Cancelled, Rejected, Expired] {
            assert!(!(status.is_terminal() && status.is_active()), "{status}");
            assert!(status.is_terminal() || status.is_active(), "{status}");
        }
    }

    #[test]
    fn test_signed_volume() {
        assert_eq!(OrderSide::Buy.signed(dec!(3)), dec!(3));
        assert_eq!(OrderSide::Sell.signed(dec!(3)), dec!(-3));
    }
}
