//! Conformance test suite for `ReturnStore` implementations.
//!
//! This module provides a backend-agnostic test suite that any `ReturnStore`
//! implementation can run to verify correctness. The suite covers:
//!
//! - **Cases**: insert/read, not-found, open-reference uniqueness, listing
//! - **Version validation / OCC**: optimistic concurrency conflict detection
//! - **Registry**: serial upsert semantics and case counting
//! - **Ledger**: append-only service events and communications, ordering
//! - **Schema**: writes honour the reported capability flags
//! - **Concurrency**: atomic upsert, racing inserts and racing updates
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function that
//! creates a fresh, empty storage instance for each test:
//!
//! ```ignore
//! use rma_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn postgres_conformance() {
//!     let report = run_conformance_suite(|| async {
//!         create_test_postgres_store().await
//!     }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod cases;
mod concurrent;
mod ledger;
mod registry;
mod schema;
mod version;

use std::fmt;
use std::future::Future;

use time::macros::datetime;
use time::OffsetDateTime;

use crate::record::{
    CaseRecord, ClaimOrigin, Priority, SerialUpsert, ServiceEventRecord, ServiceEventType, Stage,
    WarrantyBasis, WarrantyStatus,
};
use crate::ReturnStore;

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "cases", "registry", "concurrent").
    pub category: String,
    /// Test name (e.g. "insert_then_get_returns_same_case").
    pub name: String,
    /// Whether the test passed.
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn pass(category: &str, name: &str) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: true,
            message: None,
        }
    }

    fn fail(category: &str, name: &str, msg: String) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: false,
            message: Some(msg),
        }
    }

    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self::pass(category, name),
            Err(msg) => Self::fail(category, name, msg),
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against a storage backend.
///
/// The `factory` function is called once per test to create a fresh, empty
/// storage instance, ensuring test isolation.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: ReturnStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(cases::run_case_tests(&factory).await);
    results.extend(version::run_version_tests(&factory).await);
    results.extend(registry::run_registry_tests(&factory).await);
    results.extend(ledger::run_ledger_tests(&factory).await);
    results.extend(schema::run_schema_tests(&factory).await);
    results.extend(concurrent::run_concurrent_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers: record constructors with sensible defaults ──────────────────────

const T0: OffsetDateTime = datetime!(2025-01-01 00:00 UTC);

/// A minimal open case that every schema generation can store.
pub(crate) fn make_case(id: &str, external_reference: &str) -> CaseRecord {
    CaseRecord {
        id: id.to_string(),
        version: 0,
        order_id: Some("order-1".to_string()),
        order_number: Some("1001".to_string()),
        external_reference: external_reference.to_string(),
        claim_origin: ClaimOrigin::Webhook,
        inventory_item_id: None,
        serial_number: Some("SN-1".to_string()),
        customer_name: Some("Test Customer".to_string()),
        customer_email: Some("customer@example.com".to_string()),
        customer_phone: None,
        warranty_status: WarrantyStatus::Unknown,
        warranty_basis: WarrantyBasis::Unknown,
        warranty_expires_at: None,
        warranty_checked_at: None,
        warranty_notes: None,
        stage: Stage::Received,
        priority: Priority::Normal,
        assigned_to: None,
        sla_due_at: None,
        received_at: None,
        inspected_at: None,
        shipped_back_at: None,
        closed_at: None,
        inbound_tracking_number: None,
        outbound_carrier: None,
        outbound_tracking_number: None,
        delivered_back_at: None,
        issue_summary: Some("does not power on".to_string()),
        issue_details: None,
        arrival_condition_report: None,
        arrival_condition_images: Vec::new(),
        external_ticket_id: None,
        created_at: T0,
        updated_at: T0,
    }
}

/// A case with every optional column populated.
fn make_full_case(id: &str, external_reference: &str) -> CaseRecord {
    let mut case = make_case(id, external_reference);
    case.warranty_status = WarrantyStatus::InWarranty;
    case.warranty_basis = WarrantyBasis::Manufacturer;
    case.warranty_expires_at = Some(datetime!(2026-01-01 00:00 UTC));
    case.warranty_checked_at = Some(T0);
    case.priority = Priority::High;
    case.sla_due_at = Some(datetime!(2025-01-06 00:00 UTC));
    case.inventory_item_id = Some("inv-7".to_string());
    case.issue_details = Some(serde_json::json!({"symptom": "no power"}));
    case.received_at = Some(T0);
    case
}

fn make_serial_upsert(candidate_id: &str, serial_number: &str) -> SerialUpsert {
    SerialUpsert {
        candidate_id: candidate_id.to_string(),
        serial_number: serial_number.to_string(),
        brand: None,
        model: None,
        touched_at: T0,
    }
}

fn make_event(
    id: &str,
    serial_id: &str,
    case_id: Option<&str>,
    event_type: ServiceEventType,
    created_at: OffsetDateTime,
) -> ServiceEventRecord {
    ServiceEventRecord {
        id: id.to_string(),
        serial_id: serial_id.to_string(),
        case_id: case_id.map(|c| c.to_string()),
        event_type,
        summary: format!("{event_type} event"),
        notes: None,
        metadata: serde_json::json!({}),
        created_at,
    }
}
