use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Fields every order must carry
pub const REQUIRED_FIELDS: [&str; 4] = ["id", "pair", "side", "amount"];

/// Order side (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "buy"),
            OrderSide::Sell => write!(f, "sell"),
        }
    }
}

impl TryFrom<&str> for OrderSide {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.trim().to_lowercase().as_str() {
            "buy" => Ok(OrderSide::Buy),
            "sell" => Ok(OrderSide::Sell),
            other => Err(format!("side must be buy or sell, got {:?}", other)),
        }
    }
}

/// An admitted order. Immutable once it enters the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    /// Globally unique; doubles as the queue idempotency key
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Trading pair, e.g. "SOL/USDC"
    pub pair: String,
    pub side: OrderSide,
    pub amount: Decimal,
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Order {
    pub fn new(id: impl Into<String>, pair: impl Into<String>, side: OrderSide, amount: Decimal) -> Self {
        Self {
            id: id.into(),
            user_id: None,
            pair: pair.into(),
            side,
            amount,
            timestamp: None,
        }
    }
}

/// Unvalidated order body as received from ingress
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDraft {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub pair: Option<String>,
    #[serde(default)]
    pub side: Option<String>,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl OrderDraft {
    /// Check the shape and build an [`Order`], reporting every problem at once.
    pub fn validate(self) -> Result<Order, ValidationError> {
        let mut err = ValidationError::default();

        let id = non_blank(self.id);
        if id.is_none() {
            err.missing.push("id");
        }

        let pair = non_blank(self.pair);
        match &pair {
            None => err.missing.push("pair"),
            Some(p) if !is_pair(p) => {
                err.invalid.push(format!("pair must look like BASE/QUOTE, got {:?}", p))
            }
            Some(_) => {}
        }

        let side = match non_blank(self.side) {
            None => {
                err.missing.push("side");
                None
            }
            Some(raw) => match OrderSide::try_from(raw.as_str()) {
                Ok(side) => Some(side),
                Err(reason) => {
                    err.invalid.push(reason);
                    None
                }
            },
        };

        match self.amount {
            None => err.missing.push("amount"),
            Some(amount) if amount <= Decimal::ZERO => {
                err.invalid.push(format!("amount must be greater than 0, got {}", amount))
            }
            Some(_) => {}
        }

        match (id, pair, side, self.amount) {
            (Some(id), Some(pair), Some(side), Some(amount)) if err.is_empty() => Ok(Order {
                id,
                user_id: non_blank(self.user_id),
                pair,
                side,
                amount,
                timestamp: self.timestamp,
            }),
            _ => Err(err),
        }
    }
}

impl From<Order> for OrderDraft {
    fn from(order: Order) -> Self {
        Self {
            id: Some(order.id),
            user_id: order.user_id,
            pair: Some(order.pair),
            side: Some(order.side.to_string()),
            amount: Some(order.amount),
            timestamp: order.timestamp,
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn is_pair(pair: &str) -> bool {
    match pair.split_once('/') {
        Some((base, quote)) => {
            !base.trim().is_empty() && !quote.trim().is_empty() && !quote.contains('/')
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn draft() -> OrderDraft {
        OrderDraft {
            id: Some("ord-1".into()),
            user_id: Some("user-7".into()),
            pair: Some("SOL/USDC".into()),
            side: Some("BUY".into()),
            amount: Some(dec!(1.5)),
            timestamp: None,
        }
    }

    #[test]
    fn test_valid_draft() {
        let order = draft().validate().unwrap();
        assert_eq!(order.id, "ord-1");
        assert_eq!(order.side, OrderSide::Buy);
        assert_eq!(order.amount, dec!(1.5));
        assert_eq!(order.user_id.as_deref(), Some("user-7"));
    }

    #[test]
    fn test_missing_fields_are_all_reported() {
        let err = OrderDraft::default().validate().unwrap_err();
        assert_eq!(err.missing, REQUIRED_FIELDS.to_vec());
    }

    #[test]
    fn test_blank_id_counts_as_missing() {
        let mut d = draft();
        d.id = Some("   ".into());
        let err = d.validate().unwrap_err();
        assert_eq!(err.missing, vec!["id"]);
    }

    #[test]
    fn test_non_positive_amount_rejected() {
        for amount in [dec!(0), dec!(-3)] {
            let mut d = draft();
            d.amount = Some(amount);
            let err = d.validate().unwrap_err();
            assert!(err.missing.is_empty());
            assert_eq!(err.invalid.len(), 1);
        }
    }

    #[test]
    fn test_bad_side_and_pair() {
        let mut d = draft();
        d.side = Some("hold".into());
        d.pair = Some("SOLUSDC".into());
        let err = d.validate().unwrap_err();
        assert_eq!(err.invalid.len(), 2);
    }

    #[test]
    fn test_draft_from_json_with_millis_timestamp() {
        let d: OrderDraft = serde_json::from_str(
            r#"{"id":"a","pair":"SOL/USDC","side":"sell","amount":2,"timestamp":1700000000000}"#,
        )
        .unwrap();
        let order = d.validate().unwrap();
        assert_eq!(order.side, OrderSide::Sell);
        assert_eq!(order.timestamp.map(|t| t.timestamp_millis()), Some(1_700_000_000_000));
    }
}
