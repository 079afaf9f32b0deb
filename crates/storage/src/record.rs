use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

// ── Enumerations ─────────────────────────────────────────────────────────────

/// Workflow stage of a return case.
///
/// The declaration order is the canonical forward order of the workflow and
/// is part of the persisted layout: backends store the snake_case name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Received,
    Testing,
    SentToManufacturer,
    RepairedReplaced,
    BackToCustomer,
}

impl Stage {
    /// All stages in canonical order.
    pub const ALL: [Stage; 5] = [
        Stage::Received,
        Stage::Testing,
        Stage::SentToManufacturer,
        Stage::RepairedReplaced,
        Stage::BackToCustomer,
    ];

    /// Position of this stage in the canonical order.
    pub fn index(self) -> usize {
        match self {
            Stage::Received => 0,
            Stage::Testing => 1,
            Stage::SentToManufacturer => 2,
            Stage::RepairedReplaced => 3,
            Stage::BackToCustomer => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Received => "received",
            Stage::Testing => "testing",
            Stage::SentToManufacturer => "sent_to_manufacturer",
            Stage::RepairedReplaced => "repaired_replaced",
            Stage::BackToCustomer => "back_to_customer",
        }
    }

    /// `back_to_customer` is the only terminal stage.
    pub fn is_terminal(self) -> bool {
        self == Stage::BackToCustomer
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown enumeration value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl FromStr for Stage {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| ParseEnumError {
                kind: "stage",
                value: s.to_string(),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarrantyStatus {
    InWarranty,
    OutOfWarranty,
    #[default]
    Unknown,
}

impl WarrantyStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            WarrantyStatus::InWarranty => "in_warranty",
            WarrantyStatus::OutOfWarranty => "out_of_warranty",
            WarrantyStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for WarrantyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WarrantyStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_warranty" => Ok(WarrantyStatus::InWarranty),
            "out_of_warranty" => Ok(WarrantyStatus::OutOfWarranty),
            "unknown" => Ok(WarrantyStatus::Unknown),
            other => Err(ParseEnumError {
                kind: "warranty status",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarrantyBasis {
    Manufacturer,
    #[default]
    Unknown,
}

impl WarrantyBasis {
    pub fn as_str(self) -> &'static str {
        match self {
            WarrantyBasis::Manufacturer => "manufacturer",
            WarrantyBasis::Unknown => "unknown",
        }
    }
}

impl FromStr for WarrantyBasis {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manufacturer" => Ok(WarrantyBasis::Manufacturer),
            "unknown" => Ok(WarrantyBasis::Unknown),
            other => Err(ParseEnumError {
                kind: "warranty basis",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

impl FromStr for Priority {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            other => Err(ParseEnumError {
                kind: "priority",
                value: other.to_string(),
            }),
        }
    }
}

/// Where the claim that opened a case came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimOrigin {
    Webhook,
    PublicForm,
    Operator,
}

/// Ledger event types. One per stage, plus warranty decisions and notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceEventType {
    Received,
    Testing,
    SentToManufacturer,
    RepairedReplaced,
    BackToCustomer,
    WarrantyDecision,
    ServiceNote,
}

impl ServiceEventType {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceEventType::Received => "received",
            ServiceEventType::Testing => "testing",
            ServiceEventType::SentToManufacturer => "sent_to_manufacturer",
            ServiceEventType::RepairedReplaced => "repaired_replaced",
            ServiceEventType::BackToCustomer => "back_to_customer",
            ServiceEventType::WarrantyDecision => "warranty_decision",
            ServiceEventType::ServiceNote => "service_note",
        }
    }
}

impl fmt::Display for ServiceEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommunicationChannel {
    Email,
    Sms,
    Phone,
    Portal,
}

// ── Records ──────────────────────────────────────────────────────────────────

/// One return/repair claim tracked end-to-end.
///
/// `version` is the optimistic concurrency counter: it starts at 0 on insert
/// and every successful [`update_case`](crate::ReturnStore::update_case)
/// increments it by one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseRecord {
    pub id: String,
    pub version: i64,

    pub order_id: Option<String>,
    pub order_number: Option<String>,
    /// Dedup key. Unique among open cases.
    pub external_reference: String,
    pub claim_origin: ClaimOrigin,
    pub inventory_item_id: Option<String>,
    pub serial_number: Option<String>,

    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,

    #[serde(default)]
    pub warranty_status: WarrantyStatus,
    #[serde(default)]
    pub warranty_basis: WarrantyBasis,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub warranty_expires_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub warranty_checked_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub warranty_notes: Option<String>,

    pub stage: Stage,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub sla_due_at: Option<OffsetDateTime>,

    #[serde(default, with = "time::serde::rfc3339::option")]
    pub received_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub inspected_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub shipped_back_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub closed_at: Option<OffsetDateTime>,

    #[serde(default)]
    pub inbound_tracking_number: Option<String>,
    #[serde(default)]
    pub outbound_carrier: Option<String>,
    #[serde(default)]
    pub outbound_tracking_number: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub delivered_back_at: Option<OffsetDateTime>,

    pub issue_summary: Option<String>,
    #[serde(default)]
    pub issue_details: Option<serde_json::Value>,
    #[serde(default)]
    pub arrival_condition_report: Option<String>,
    #[serde(default)]
    pub arrival_condition_images: Vec<String>,

    #[serde(default)]
    pub external_ticket_id: Option<String>,

    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl CaseRecord {
    /// A case is open until it reaches the terminal stage.
    pub fn is_open(&self) -> bool {
        !self.stage.is_terminal()
    }

    /// Names of populated columns that only exist once the optional-column
    /// migration has been applied.
    pub fn optional_columns_in_use(&self) -> Vec<&'static str> {
        let mut cols = Vec::new();
        if self.warranty_status != WarrantyStatus::Unknown {
            cols.push("warranty_status");
        }
        if self.warranty_basis != WarrantyBasis::Unknown {
            cols.push("warranty_basis");
        }
        if self.warranty_expires_at.is_some() {
            cols.push("warranty_expires_at");
        }
        if self.warranty_checked_at.is_some() {
            cols.push("warranty_checked_at");
        }
        if self.warranty_notes.is_some() {
            cols.push("warranty_notes");
        }
        if self.priority != Priority::Normal {
            cols.push("priority");
        }
        if self.assigned_to.is_some() {
            cols.push("assigned_to");
        }
        if self.sla_due_at.is_some() {
            cols.push("sla_due_at");
        }
        if self.inventory_item_id.is_some() {
            cols.push("inventory_item_id");
        }
        if self.issue_details.is_some() {
            cols.push("issue_details");
        }
        if self.inbound_tracking_number.is_some() {
            cols.push("inbound_tracking_number");
        }
        if self.arrival_condition_report.is_some() {
            cols.push("arrival_condition_report");
        }
        if !self.arrival_condition_images.is_empty() {
            cols.push("arrival_condition_images");
        }
        if self.external_ticket_id.is_some() {
            cols.push("external_ticket_id");
        }
        cols
    }

    /// Names of populated stage timestamp columns that require the
    /// stage-timestamp migration. `closed_at` predates it and is not listed.
    pub fn stage_timestamp_columns_in_use(&self) -> Vec<&'static str> {
        let mut cols = Vec::new();
        if self.received_at.is_some() {
            cols.push("received_at");
        }
        if self.inspected_at.is_some() {
            cols.push("inspected_at");
        }
        if self.shipped_back_at.is_some() {
            cols.push("shipped_back_at");
        }
        cols
    }

    /// Drop every value the backend cannot store under `caps`.
    pub fn reduce_to(mut self, caps: SchemaCapabilities) -> Self {
        if !caps.optional_case_columns {
            self.warranty_status = WarrantyStatus::Unknown;
            self.warranty_basis = WarrantyBasis::Unknown;
            self.warranty_expires_at = None;
            self.warranty_checked_at = None;
            self.warranty_notes = None;
            self.priority = Priority::Normal;
            self.assigned_to = None;
            self.sla_due_at = None;
            self.inventory_item_id = None;
            self.issue_details = None;
            self.inbound_tracking_number = None;
            self.arrival_condition_report = None;
            self.arrival_condition_images.clear();
            self.external_ticket_id = None;
        }
        if !caps.stage_timestamps {
            self.received_at = None;
            self.inspected_at = None;
            self.shipped_back_at = None;
        }
        self
    }
}

/// Set-only column patch applied by [`update_case`](crate::ReturnStore::update_case).
///
/// `None` leaves the column untouched. There is no way to clear a column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CasePatch {
    pub stage: Option<Stage>,
    pub received_at: Option<OffsetDateTime>,
    pub inspected_at: Option<OffsetDateTime>,
    pub shipped_back_at: Option<OffsetDateTime>,
    pub closed_at: Option<OffsetDateTime>,

    pub warranty_status: Option<WarrantyStatus>,
    pub warranty_basis: Option<WarrantyBasis>,
    pub warranty_checked_at: Option<OffsetDateTime>,
    pub warranty_notes: Option<String>,

    pub priority: Option<Priority>,
    pub assigned_to: Option<String>,
    pub sla_due_at: Option<OffsetDateTime>,

    pub inbound_tracking_number: Option<String>,
    pub outbound_carrier: Option<String>,
    pub outbound_tracking_number: Option<String>,
    pub delivered_back_at: Option<OffsetDateTime>,

    pub arrival_condition_report: Option<String>,
    pub arrival_condition_images: Option<Vec<String>>,

    pub external_ticket_id: Option<String>,
}

impl CasePatch {
    pub fn is_empty(&self) -> bool {
        self.columns().is_empty()
    }

    /// Names of the columns this patch writes.
    pub fn columns(&self) -> Vec<&'static str> {
        let mut cols = Vec::new();
        macro_rules! track {
            ($($field:ident),* $(,)?) => {
                $(if self.$field.is_some() { cols.push(stringify!($field)); })*
            };
        }
        track!(
            stage,
            received_at,
            inspected_at,
            shipped_back_at,
            closed_at,
            warranty_status,
            warranty_basis,
            warranty_checked_at,
            warranty_notes,
            priority,
            assigned_to,
            sla_due_at,
            inbound_tracking_number,
            outbound_carrier,
            outbound_tracking_number,
            delivered_back_at,
            arrival_condition_report,
            arrival_condition_images,
            external_ticket_id,
        );
        cols
    }

    /// Columns written by this patch that the backend cannot store under `caps`.
    pub fn unsupported_columns(&self, caps: SchemaCapabilities) -> Vec<&'static str> {
        self.columns()
            .into_iter()
            .filter(|col| {
                let stage_ts = matches!(*col, "received_at" | "inspected_at" | "shipped_back_at");
                let optional = matches!(
                    *col,
                    "warranty_status"
                        | "warranty_basis"
                        | "warranty_checked_at"
                        | "warranty_notes"
                        | "priority"
                        | "assigned_to"
                        | "sla_due_at"
                        | "inbound_tracking_number"
                        | "arrival_condition_report"
                        | "arrival_condition_images"
                        | "external_ticket_id"
                );
                (stage_ts && !caps.stage_timestamps) || (optional && !caps.optional_case_columns)
            })
            .collect()
    }

    /// Write every set column into `case`.
    pub fn apply_to(&self, case: &mut CaseRecord) {
        macro_rules! assign {
            ($($field:ident),* $(,)?) => {
                $(if let Some(v) = &self.$field { case.$field = v.clone().into(); })*
            };
        }
        if let Some(stage) = self.stage {
            case.stage = stage;
        }
        if let Some(status) = self.warranty_status {
            case.warranty_status = status;
        }
        if let Some(basis) = self.warranty_basis {
            case.warranty_basis = basis;
        }
        if let Some(priority) = self.priority {
            case.priority = priority;
        }
        if let Some(images) = &self.arrival_condition_images {
            case.arrival_condition_images = images.clone();
        }
        assign!(
            received_at,
            inspected_at,
            shipped_back_at,
            closed_at,
            warranty_checked_at,
            warranty_notes,
            assigned_to,
            sla_due_at,
            inbound_tracking_number,
            outbound_carrier,
            outbound_tracking_number,
            delivered_back_at,
            arrival_condition_report,
            external_ticket_id,
        );
    }
}

/// Which optional parts of the case schema the backend supports.
///
/// Resolved once when an engine is constructed; the engine picks the full or
/// reduced write path from these flags instead of probing on every write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaCapabilities {
    /// `received_at`, `inspected_at` and `shipped_back_at` exist.
    pub stage_timestamps: bool,
    /// Warranty snapshot, workflow, logistics and narrative extras exist.
    pub optional_case_columns: bool,
}

impl SchemaCapabilities {
    pub const CURRENT: SchemaCapabilities = SchemaCapabilities {
        stage_timestamps: true,
        optional_case_columns: true,
    };

    /// A store that never had the optional-column migrations applied.
    pub const LEGACY: SchemaCapabilities = SchemaCapabilities {
        stage_timestamps: false,
        optional_case_columns: false,
    };
}

impl Default for SchemaCapabilities {
    fn default() -> Self {
        SchemaCapabilities::CURRENT
    }
}

/// Aggregate record for one normalized serial number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerialRecord {
    pub id: String,
    pub serial_number: String,
    pub brand: Option<String>,
    pub model: Option<String>,
    /// Number of cases opened for this serial.
    pub case_count: i64,
    pub last_case_id: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub first_seen_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_touched_at: OffsetDateTime,
}

/// Input to [`upsert_serial`](crate::ReturnStore::upsert_serial).
///
/// `candidate_id` is only used when the upsert creates a new entry.
#[derive(Debug, Clone, PartialEq)]
pub struct SerialUpsert {
    pub candidate_id: String,
    pub serial_number: String,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub touched_at: OffsetDateTime,
}

/// One append-only ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceEventRecord {
    pub id: String,
    pub serial_id: String,
    pub case_id: Option<String>,
    pub event_type: ServiceEventType,
    pub summary: String,
    pub notes: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Record that a customer communication happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunicationRecord {
    pub id: String,
    pub case_id: String,
    pub channel: CommunicationChannel,
    pub template: Option<String>,
    pub recipient: String,
    pub body: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

// ── Query filters ────────────────────────────────────────────────────────────

/// Filters for [`list_cases`](crate::ReturnStore::list_cases). Empty filter
/// matches every case. `limit == 0` means no limit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseFilter {
    #[serde(default)]
    pub stage: Option<Stage>,
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub open_only: bool,
    #[serde(default)]
    pub limit: usize,
}

impl CaseFilter {
    pub fn matches(&self, case: &CaseRecord) -> bool {
        if let Some(stage) = self.stage {
            if case.stage != stage {
                return false;
            }
        }
        if let Some(assignee) = &self.assigned_to {
            if case.assigned_to.as_deref() != Some(assignee.as_str()) {
                return false;
            }
        }
        if let Some(serial) = &self.serial_number {
            if case.serial_number.as_deref() != Some(serial.as_str()) {
                return false;
            }
        }
        !(self.open_only && !case.is_open())
    }
}

/// Filters for [`list_service_events`](crate::ReturnStore::list_service_events).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    pub serial_id: Option<String>,
    pub case_id: Option<String>,
}

impl EventFilter {
    pub fn for_case(case_id: &str) -> Self {
        EventFilter {
            serial_id: None,
            case_id: Some(case_id.to_string()),
        }
    }

    pub fn for_serial(serial_id: &str) -> Self {
        EventFilter {
            serial_id: Some(serial_id.to_string()),
            case_id: None,
        }
    }

    pub fn matches(&self, event: &ServiceEventRecord) -> bool {
        if let Some(serial_id) = &self.serial_id {
            if &event.serial_id != serial_id {
                return false;
            }
        }
        if let Some(case_id) = &self.case_id {
            if event.case_id.as_deref() != Some(case_id.as_str()) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn sample_case() -> CaseRecord {
        let at = datetime!(2025-01-01 00:00 UTC);
        CaseRecord {
            id: "case-1".to_string(),
            version: 0,
            order_id: None,
            order_number: Some("1001".to_string()),
            external_reference: "order:1001:a@example.com".to_string(),
            claim_origin: ClaimOrigin::Webhook,
            inventory_item_id: None,
            serial_number: Some("ABC123".to_string()),
            customer_name: None,
            customer_email: Some("a@example.com".to_string()),
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
            issue_summary: None,
            issue_details: None,
            arrival_condition_report: None,
            arrival_condition_images: Vec::new(),
            external_ticket_id: None,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn stage_order_matches_declaration() {
        for (i, stage) in Stage::ALL.iter().enumerate() {
            assert_eq!(stage.index(), i);
        }
        assert!(Stage::Received < Stage::BackToCustomer);
    }

    #[test]
    fn stage_parses_snake_case_names() {
        assert_eq!(
            "sent_to_manufacturer".parse::<Stage>().unwrap(),
            Stage::SentToManufacturer
        );
        let err = "shipped".parse::<Stage>().unwrap_err();
        assert_eq!(err.to_string(), "unknown stage 'shipped'");
    }

    #[test]
    fn stage_serializes_as_snake_case() {
        let json = serde_json::to_value(Stage::RepairedReplaced).unwrap();
        assert_eq!(json, serde_json::json!("repaired_replaced"));
    }

    #[test]
    fn reduce_to_legacy_drops_optional_columns() {
        let mut case = sample_case();
        case.priority = Priority::Urgent;
        case.sla_due_at = Some(datetime!(2025-01-05 00:00 UTC));
        case.received_at = Some(datetime!(2025-01-02 00:00 UTC));
        assert_eq!(case.optional_columns_in_use(), vec!["priority", "sla_due_at"]);
        assert_eq!(case.stage_timestamp_columns_in_use(), vec!["received_at"]);

        let reduced = case.reduce_to(SchemaCapabilities::LEGACY);
        assert!(reduced.optional_columns_in_use().is_empty());
        assert!(reduced.stage_timestamp_columns_in_use().is_empty());
        assert_eq!(reduced.serial_number.as_deref(), Some("ABC123"));
    }

    #[test]
    fn patch_reports_unsupported_columns() {
        let patch = CasePatch {
            stage: Some(Stage::BackToCustomer),
            closed_at: Some(datetime!(2025-01-02 00:00 UTC)),
            shipped_back_at: Some(datetime!(2025-01-02 00:00 UTC)),
            ..CasePatch::default()
        };
        assert_eq!(
            patch.unsupported_columns(SchemaCapabilities::LEGACY),
            vec!["shipped_back_at"]
        );
        assert!(patch
            .unsupported_columns(SchemaCapabilities::CURRENT)
            .is_empty());
    }

    #[test]
    fn patch_apply_sets_only_given_columns() {
        let mut case = sample_case();
        let patch = CasePatch {
            outbound_carrier: Some("UPS".to_string()),
            priority: Some(Priority::High),
            ..CasePatch::default()
        };
        patch.apply_to(&mut case);
        assert_eq!(case.outbound_carrier.as_deref(), Some("UPS"));
        assert_eq!(case.priority, Priority::High);
        assert_eq!(case.stage, Stage::Received);
        assert_eq!(patch.columns(), vec!["priority", "outbound_carrier"]);
    }

    #[test]
    fn case_filter_open_only_excludes_terminal() {
        let mut case = sample_case();
        let filter = CaseFilter {
            open_only: true,
            ..CaseFilter::default()
        };
        assert!(filter.matches(&case));
        case.stage = Stage::BackToCustomer;
        assert!(!filter.matches(&case));
    }
}
