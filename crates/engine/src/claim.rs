//! Normalized claim accepted by case creation.
//!
//! Source-specific payloads are turned into a [`Claim`] by
//! [`crate::intake`]; the creation service only ever sees this struct.

use serde::{Deserialize, Serialize};

use rma_storage::{ClaimOrigin, Priority, Stage};

use crate::error::ValidationErrors;
use crate::registry::SerialHints;

/// Longest accepted issue summary, in characters.
pub const MAX_ISSUE_SUMMARY_CHARS: usize = 500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub origin: ClaimOrigin,

    /// Explicit submitter-supplied dedup key. Wins over every other linkage.
    #[serde(default)]
    pub idempotency_key: Option<String>,
    /// Upstream return identifier.
    #[serde(default)]
    pub upstream_return_id: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub order_number: Option<String>,
    /// Raw processed timestamp of the originating order.
    #[serde(default)]
    pub order_processed_at: Option<String>,

    #[serde(default)]
    pub inventory_item_id: Option<String>,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub serial_hints: SerialHints,

    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub customer_phone: Option<String>,

    #[serde(default)]
    pub issue_summary: Option<String>,
    #[serde(default)]
    pub issue_details: Option<serde_json::Value>,

    /// Stage the case opens in; `received` when absent.
    #[serde(default)]
    pub initial_stage: Option<Stage>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub inbound_tracking_number: Option<String>,
    /// The unit is physically on hand at intake (walk-in or bench intake).
    #[serde(default)]
    pub unit_received: bool,
}

impl Claim {
    /// An empty claim from `origin`; fill in fields with struct update syntax.
    pub fn new(origin: ClaimOrigin) -> Self {
        Claim {
            origin,
            idempotency_key: None,
            upstream_return_id: None,
            order_id: None,
            order_number: None,
            order_processed_at: None,
            inventory_item_id: None,
            serial_number: None,
            serial_hints: SerialHints::default(),
            customer_name: None,
            customer_email: None,
            customer_phone: None,
            issue_summary: None,
            issue_details: None,
            initial_stage: None,
            priority: None,
            assigned_to: None,
            inbound_tracking_number: None,
            unit_received: false,
        }
    }

    /// Field-level checks run before any store lookup.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Some(key) = &self.idempotency_key {
            if key.trim().is_empty() {
                errors.push("idempotency_key", "must not be blank");
            }
        }
        if let Some(id) = &self.upstream_return_id {
            if id.trim().is_empty() {
                errors.push("upstream_return_id", "must not be blank");
            }
        }
        if let Some(email) = &self.customer_email {
            if !looks_like_email(email) {
                errors.push("customer_email", "is not an email address");
            }
        }
        if let Some(summary) = &self.issue_summary {
            if summary.chars().count() > MAX_ISSUE_SUMMARY_CHARS {
                errors.push(
                    "issue_summary",
                    format!("is longer than {MAX_ISSUE_SUMMARY_CHARS} characters"),
                );
            }
        }
        if self.initial_stage.is_some_and(Stage::is_terminal) {
            errors.push("initial_stage", "a case cannot open in back_to_customer");
        }

        if errors.is_empty() && self.dedup_key().is_none() {
            let has_order = self
                .order_number
                .as_deref()
                .and_then(normalize_order_number)
                .is_some();
            if has_order {
                errors.push("customer_email", "is required with an order number");
            } else {
                errors.push(
                    "order_number",
                    "one of idempotency_key, upstream_return_id or order_number with customer_email is required",
                );
            }
        }

        errors.into_result()
    }

    /// Stable dedup key, in priority order: idempotency key, upstream return
    /// id, order number with customer email.
    pub fn dedup_key(&self) -> Option<String> {
        if let Some(key) = non_blank(self.idempotency_key.as_deref()) {
            return Some(format!("idem:{key}"));
        }
        if let Some(id) = non_blank(self.upstream_return_id.as_deref()) {
            return Some(format!("return:{id}"));
        }
        let number = self.order_number.as_deref().and_then(normalize_order_number)?;
        let email = non_blank(self.customer_email.as_deref())?.to_lowercase();
        Some(format!("order:{number}:{email}"))
    }

    /// Priority, defaulting to `normal`.
    pub fn priority(&self) -> Priority {
        self.priority.unwrap_or_default()
    }

    pub fn initial_stage(&self) -> Stage {
        self.initial_stage.unwrap_or(Stage::Received)
    }
}

/// Trim, drop a leading `#`, lowercase. Blank numbers yield `None`.
pub fn normalize_order_number(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix('#').unwrap_or(trimmed).trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn looks_like_email(raw: &str) -> bool {
    let raw = raw.trim();
    match raw.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !raw.contains(char::is_whitespace)
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order_claim() -> Claim {
        Claim {
            order_number: Some(" #A1001 ".to_string()),
            customer_email: Some("Buyer@Example.COM".to_string()),
            ..Claim::new(ClaimOrigin::PublicForm)
        }
    }

    #[test]
    fn order_key_is_normalized() {
        assert_eq!(
            order_claim().dedup_key().as_deref(),
            Some("order:a1001:buyer@example.com")
        );
    }

    #[test]
    fn same_order_and_email_give_same_key() {
        let other = Claim {
            order_number: Some("a1001".to_string()),
            customer_email: Some("buyer@example.com".to_string()),
            ..Claim::new(ClaimOrigin::Webhook)
        };
        assert_eq!(other.dedup_key(), order_claim().dedup_key());
    }

    #[test]
    fn key_priority() {
        let mut claim = order_claim();
        claim.upstream_return_id = Some("R-9".to_string());
        assert_eq!(claim.dedup_key().as_deref(), Some("return:R-9"));
        claim.idempotency_key = Some("form-42".to_string());
        assert_eq!(claim.dedup_key().as_deref(), Some("idem:form-42"));
    }

    #[test]
    fn claim_without_linkage_is_rejected() {
        let err = Claim::new(ClaimOrigin::Webhook).validate().unwrap_err();
        assert_eq!(err.fields(), vec!["order_number"]);

        let claim = Claim {
            order_number: Some("1001".to_string()),
            ..Claim::new(ClaimOrigin::Webhook)
        };
        assert_eq!(claim.validate().unwrap_err().fields(), vec!["customer_email"]);
    }

    #[test]
    fn field_errors_are_collected() {
        let claim = Claim {
            idempotency_key: Some("  ".to_string()),
            customer_email: Some("not-an-email".to_string()),
            initial_stage: Some(Stage::BackToCustomer),
            ..Claim::new(ClaimOrigin::Operator)
        };
        let err = claim.validate().unwrap_err();
        assert_eq!(
            err.fields(),
            vec!["idempotency_key", "customer_email", "initial_stage"]
        );
    }

    #[test]
    fn long_summary_is_rejected() {
        let claim = Claim {
            issue_summary: Some("x".repeat(MAX_ISSUE_SUMMARY_CHARS + 1)),
            ..order_claim()
        };
        assert_eq!(claim.validate().unwrap_err().fields(), vec!["issue_summary"]);
        assert!(order_claim().validate().is_ok());
    }

    #[test]
    fn order_number_normalization() {
        assert_eq!(normalize_order_number("#1001").as_deref(), Some("1001"));
        assert_eq!(normalize_order_number("  # "), None);
    }
}
