//! Upstream commerce platform: read-only order lookup.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::claim::normalize_order_number;

/// One line on an upstream order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderLineItem {
    #[serde(default)]
    pub inventory_item_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

/// What the engine needs to know about an upstream order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderSummary {
    pub order_id: String,
    #[serde(default)]
    pub order_number: Option<String>,
    /// Raw upstream timestamp; parsed by the warranty calculator.
    #[serde(default)]
    pub processed_at: Option<String>,
    #[serde(default)]
    pub financial_status: Option<String>,
    #[serde(default)]
    pub fulfillment_status: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub line_items: Vec<OrderLineItem>,
}

impl OrderSummary {
    /// Case-insensitive check that `email` placed this order.
    pub fn owned_by(&self, email: &str) -> bool {
        match &self.email {
            Some(owner) => owner.trim().eq_ignore_ascii_case(email.trim()),
            None => false,
        }
    }

    /// The line item carrying `serial`, compared after normalization.
    pub fn line_item_for_serial(&self, serial: &str) -> Option<&OrderLineItem> {
        let wanted = crate::serial::normalize_serial(serial)?;
        self.line_items.iter().find(|item| {
            item.serial_number
                .as_deref()
                .and_then(crate::serial::normalize_serial)
                .as_deref()
                == Some(wanted.as_str())
        })
    }
}

/// Errors from an order lookup backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// The platform could not be reached or answered with an error.
    Unavailable { message: String },
    /// The platform answered with something we could not read.
    InvalidResponse { message: String },
}

impl fmt::Display for LookupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupError::Unavailable { message } => {
                write!(f, "order platform unavailable: {}", message)
            }
            LookupError::InvalidResponse { message } => {
                write!(f, "invalid order platform response: {}", message)
            }
        }
    }
}

impl std::error::Error for LookupError {}

/// Read-only access to upstream orders.
#[async_trait]
pub trait OrderLookup: Send + Sync {
    /// Find an order by upstream id or by order number (with or without a
    /// leading `#`). `Ok(None)` when no such order exists.
    async fn find_order(&self, reference: &str) -> Result<Option<OrderSummary>, LookupError>;
}

/// Fixed set of orders held in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticOrderLookup {
    orders: Vec<OrderSummary>,
}

impl StaticOrderLookup {
    pub fn new(orders: Vec<OrderSummary>) -> Self {
        StaticOrderLookup { orders }
    }

    pub fn push(&mut self, order: OrderSummary) {
        self.orders.push(order);
    }
}

#[async_trait]
impl OrderLookup for StaticOrderLookup {
    async fn find_order(&self, reference: &str) -> Result<Option<OrderSummary>, LookupError> {
        let reference = reference.trim();
        let by_number = normalize_order_number(reference);
        Ok(self
            .orders
            .iter()
            .find(|order| {
                order.order_id == reference
                    || order
                        .order_number
                        .as_deref()
                        .and_then(normalize_order_number)
                        .is_some_and(|n| Some(n) == by_number)
            })
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order() -> OrderSummary {
        OrderSummary {
            order_id: "gid-77".to_string(),
            order_number: Some("#1001".to_string()),
            processed_at: Some("2025-01-10T08:00:00Z".to_string()),
            email: Some("Buyer@Example.com".to_string()),
            line_items: vec![OrderLineItem {
                serial_number: Some("abc123".to_string()),
                brand: Some("Acme".to_string()),
                ..OrderLineItem::default()
            }],
            ..OrderSummary::default()
        }
    }

    #[tokio::test]
    async fn finds_by_id_or_number() {
        let lookup = StaticOrderLookup::new(vec![order()]);
        assert!(lookup.find_order("gid-77").await.unwrap().is_some());
        assert!(lookup.find_order("1001").await.unwrap().is_some());
        assert!(lookup.find_order(" #1001 ").await.unwrap().is_some());
        assert!(lookup.find_order("1002").await.unwrap().is_none());
    }

    #[test]
    fn ownership_ignores_case() {
        assert!(order().owned_by("buyer@example.com "));
        assert!(!order().owned_by("other@example.com"));
    }

    #[test]
    fn line_item_matches_normalized_serial() {
        let o = order();
        let item = o.line_item_for_serial(" ABC123").unwrap();
        assert_eq!(item.brand.as_deref(), Some("Acme"));
        assert!(o.line_item_for_serial("zzz").is_none());
    }
}
