//! Serial registry and service event ledger.
//!
//! The registry keeps one aggregate per normalized serial; the ledger is an
//! append-only audit trail per registry entry. Both are best-effort: the
//! engine logs and reports their failures but never fails a case mutation
//! because of them.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use rma_storage::{
    ReturnStore, SerialRecord, SerialUpsert, ServiceEventRecord, ServiceEventType, Stage,
    StorageError,
};

use crate::serial::normalize_serial;

/// Brand/model hints used to create or refine a registry entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialHints {
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

impl SerialHints {
    pub fn new(brand: Option<&str>, model: Option<&str>) -> Self {
        SerialHints {
            brand: non_blank(brand),
            model: non_blank(model),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Create or refine the registry entry for `serial`.
///
/// Returns `Ok(None)` when the serial is blank. The case count is never
/// changed here; see [`ReturnStore::increment_serial_case_count`].
pub async fn upsert_registry<S: ReturnStore + ?Sized>(
    store: &S,
    serial: &str,
    hints: &SerialHints,
    now: OffsetDateTime,
) -> Result<Option<SerialRecord>, StorageError> {
    let Some(serial_number) = normalize_serial(serial) else {
        debug!("blank serial, registry skipped");
        return Ok(None);
    };
    let record = store
        .upsert_serial(SerialUpsert {
            candidate_id: Uuid::new_v4().to_string(),
            serial_number,
            brand: hints.brand.clone(),
            model: hints.model.clone(),
            touched_at: now,
        })
        .await?;
    debug!(serial = %record.serial_number, serial_id = %record.id, "registry entry touched");
    Ok(Some(record))
}

/// The ledger event type recorded when a case enters `stage`.
pub fn map_stage_to_event_type(stage: Stage) -> ServiceEventType {
    match stage {
        Stage::Received => ServiceEventType::Received,
        Stage::Testing => ServiceEventType::Testing,
        Stage::SentToManufacturer => ServiceEventType::SentToManufacturer,
        Stage::RepairedReplaced => ServiceEventType::RepairedReplaced,
        Stage::BackToCustomer => ServiceEventType::BackToCustomer,
    }
}

/// Build a ledger entry with a fresh id.
pub fn new_service_event(
    serial_id: &str,
    case_id: Option<&str>,
    event_type: ServiceEventType,
    summary: impl Into<String>,
    notes: Option<String>,
    metadata: serde_json::Value,
    now: OffsetDateTime,
) -> ServiceEventRecord {
    ServiceEventRecord {
        id: Uuid::new_v4().to_string(),
        serial_id: serial_id.to_string(),
        case_id: case_id.map(str::to_string),
        event_type,
        summary: summary.into(),
        notes,
        metadata,
        created_at: now,
    }
}

/// A registry entry together with its ledger, oldest event first.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceHistory {
    pub serial: SerialRecord,
    pub events: Vec<ServiceEventRecord>,
}
