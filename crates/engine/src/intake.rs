//! Claim intake adapters.
//!
//! Each inbound channel shapes its payload differently. [`ClaimSource`] is
//! the tagged union of those shapes; [`normalize_claim`] turns any of them
//! into one [`Claim`], enriching it from the order platform.

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use rma_storage::{ClaimOrigin, Priority, Stage};

use crate::claim::Claim;
use crate::error::{EngineError, ValidationErrors};
use crate::lookup::{OrderLookup, OrderSummary};
use crate::registry::SerialHints;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnLineItem {
    #[serde(default)]
    pub inventory_item_id: Option<String>,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

/// Return request pushed by the commerce platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookClaim {
    pub return_id: String,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub order_number: Option<String>,
    #[serde(default)]
    pub customer: CustomerInfo,
    #[serde(default)]
    pub line_items: Vec<ReturnLineItem>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}

/// Customer-submitted warranty form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicFormClaim {
    pub order_number: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub issue_summary: Option<String>,
    #[serde(default)]
    pub issue_details: Option<serde_json::Value>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

/// Case opened by staff.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperatorClaim {
    #[serde(default)]
    pub idempotency_key: Option<String>,
    #[serde(default)]
    pub return_id: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub order_number: Option<String>,
    #[serde(default)]
    pub customer: CustomerInfo,
    #[serde(default)]
    pub inventory_item_id: Option<String>,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub issue_summary: Option<String>,
    #[serde(default)]
    pub issue_details: Option<serde_json::Value>,
    #[serde(default)]
    pub initial_stage: Option<Stage>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub inbound_tracking_number: Option<String>,
    #[serde(default)]
    pub unit_received: bool,
}

/// Inbound claim, tagged by channel:
///
/// ```json
/// { "source": "public_form", "order_number": "#1001", "email": "a@b.co" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ClaimSource {
    Webhook(WebhookClaim),
    PublicForm(PublicFormClaim),
    Operator(OperatorClaim),
}

impl ClaimSource {
    pub fn origin(&self) -> ClaimOrigin {
        match self {
            ClaimSource::Webhook(_) => ClaimOrigin::Webhook,
            ClaimSource::PublicForm(_) => ClaimOrigin::PublicForm,
            ClaimSource::Operator(_) => ClaimOrigin::Operator,
        }
    }
}

/// Turn a channel payload into a [`Claim`].
///
/// Public form claims must name an existing order placed by the submitting
/// email. Other channels are enriched from the order when it is found and
/// accepted as-is when it is not.
pub async fn normalize_claim(
    source: ClaimSource,
    lookup: &dyn OrderLookup,
) -> Result<Claim, EngineError> {
    match source {
        ClaimSource::Webhook(payload) => {
            let order = match payload.order_id.as_deref().or(payload.order_number.as_deref()) {
                Some(reference) => lookup.find_order(reference).await?,
                None => None,
            };
            let item = payload
                .line_items
                .iter()
                .find(|item| has_text(item.serial_number.as_deref()))
                .or_else(|| payload.line_items.first());

            let mut claim = Claim {
                upstream_return_id: Some(payload.return_id),
                order_id: payload.order_id,
                order_number: payload.order_number,
                inventory_item_id: item.and_then(|i| i.inventory_item_id.clone()),
                serial_number: item.and_then(|i| i.serial_number.clone()),
                serial_hints: SerialHints::new(
                    item.and_then(|i| i.brand.as_deref()),
                    item.and_then(|i| i.model.as_deref()),
                ),
                customer_name: payload.customer.name,
                customer_email: payload.customer.email,
                customer_phone: payload.customer.phone,
                issue_summary: payload.reason,
                issue_details: payload.details,
                ..Claim::new(ClaimOrigin::Webhook)
            };
            if let Some(order) = &order {
                enrich_from_order(&mut claim, order);
            }
            Ok(claim)
        }

        ClaimSource::PublicForm(payload) => {
            let mut errors = ValidationErrors::new();
            let order = lookup.find_order(&payload.order_number).await?;
            let order = match order {
                Some(order) if order.owned_by(&payload.email) => order,
                Some(_) => {
                    errors.push("email", "does not match the order");
                    return Err(errors.into());
                }
                None => {
                    errors.push("order_number", "no such order");
                    return Err(errors.into());
                }
            };

            let mut claim = Claim {
                idempotency_key: payload.idempotency_key,
                order_number: Some(payload.order_number),
                serial_number: payload.serial_number,
                customer_name: payload.name,
                customer_email: Some(payload.email),
                customer_phone: payload.phone,
                issue_summary: payload.issue_summary,
                issue_details: payload.issue_details,
                ..Claim::new(ClaimOrigin::PublicForm)
            };
            enrich_from_order(&mut claim, &order);
            Ok(claim)
        }

        ClaimSource::Operator(payload) => {
            let order = match payload.order_id.as_deref().or(payload.order_number.as_deref()) {
                Some(reference) => lookup.find_order(reference).await?,
                None => None,
            };
            let mut claim = Claim {
                idempotency_key: payload.idempotency_key,
                upstream_return_id: payload.return_id,
                order_id: payload.order_id,
                order_number: payload.order_number,
                inventory_item_id: payload.inventory_item_id,
                serial_number: payload.serial_number,
                serial_hints: SerialHints::new(payload.brand.as_deref(), payload.model.as_deref()),
                customer_name: payload.customer.name,
                customer_email: payload.customer.email,
                customer_phone: payload.customer.phone,
                issue_summary: payload.issue_summary,
                issue_details: payload.issue_details,
                initial_stage: payload.initial_stage,
                priority: payload.priority,
                assigned_to: payload.assigned_to,
                inbound_tracking_number: payload.inbound_tracking_number,
                unit_received: payload.unit_received,
                ..Claim::new(ClaimOrigin::Operator)
            };
            if let Some(order) = &order {
                enrich_from_order(&mut claim, order);
            }
            if claim.dedup_key().is_none() {
                let key = format!("operator-{}", Uuid::new_v4());
                debug!(idempotency_key = %key, "operator claim without linkage");
                claim.idempotency_key = Some(key);
            }
            Ok(claim)
        }
    }
}

/// Fill gaps in `claim` from the order. Values already on the claim win.
fn enrich_from_order(claim: &mut Claim, order: &OrderSummary) {
    claim.order_processed_at = claim
        .order_processed_at
        .take()
        .or_else(|| order.processed_at.clone());
    if claim.order_id.is_none() {
        claim.order_id = Some(order.order_id.clone());
    }
    if claim.order_number.is_none() {
        claim.order_number = order.order_number.clone();
    }
    if !has_text(claim.customer_email.as_deref()) {
        claim.customer_email = order.email.clone();
    }
    if claim.customer_name.is_none() {
        claim.customer_name = order.customer_name.clone();
    }

    let item = match claim.serial_number.as_deref() {
        Some(serial) => order.line_item_for_serial(serial),
        None => {
            let mut with_serial = order
                .line_items
                .iter()
                .filter(|i| has_text(i.serial_number.as_deref()));
            // Only adopt the order's serial when there is exactly one candidate.
            match (with_serial.next(), with_serial.next()) {
                (Some(only), None) => {
                    claim.serial_number = only.serial_number.clone();
                    Some(only)
                }
                _ => None,
            }
        }
    };
    if let Some(item) = item {
        if claim.serial_hints.brand.is_none() {
            claim.serial_hints.brand = SerialHints::new(item.brand.as_deref(), None).brand;
        }
        if claim.serial_hints.model.is_none() {
            claim.serial_hints.model = SerialHints::new(None, item.model.as_deref()).model;
        }
        if claim.inventory_item_id.is_none() {
            claim.inventory_item_id = item.inventory_item_id.clone();
        }
    }
}

fn has_text(value: Option<&str>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty())
}
