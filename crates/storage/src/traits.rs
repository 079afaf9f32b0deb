use async_trait::async_trait;
use time::OffsetDateTime;

use crate::error::StorageError;
use crate::record::{
    CaseFilter, CasePatch, CaseRecord, CommunicationRecord, EventFilter, SchemaCapabilities,
    SerialRecord, SerialUpsert, ServiceEventRecord,
};

/// The storage trait for RMA case backends.
///
/// A `ReturnStore` provides row-level storage for cases, the serial registry,
/// the service event ledger and the communication log.
///
/// ## OCC Conflict Detection
///
/// `update_case` performs an optimistic concurrency check:
/// `UPDATE ... WHERE id = ? AND version = expected_version`. If zero rows are
/// affected, the method returns `Err(StorageError::ConcurrentConflict { ... })`.
///
/// ## Uniqueness
///
/// - `external_reference` is unique among open cases. `insert_case` returns
///   `Err(StorageError::DuplicateReference { ... })` on violation, and so
///   does an `update_case` that moves a closed case back to an open stage
///   while another open case holds its reference.
/// - `serial_number` is unique in the registry. `upsert_serial` must be an
///   atomic upsert (`INSERT ... ON CONFLICT`), never read-then-write.
///
/// ## Schema capabilities
///
/// Backends report which optional columns exist via `capabilities`. Writes
/// that touch a missing column fail with `StorageError::UnsupportedColumns`.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` so one store can be
/// shared across concurrent requests.
#[async_trait]
pub trait ReturnStore: Send + Sync + 'static {
    /// Report which optional parts of the schema are present.
    async fn capabilities(&self) -> Result<SchemaCapabilities, StorageError>;

    // ── Cases ────────────────────────────────────────────────────────────────

    /// Insert a new case at the version carried by the record (normally 0).
    async fn insert_case(&self, record: CaseRecord) -> Result<CaseRecord, StorageError>;

    /// Read a case by id.
    ///
    /// Returns `Err(StorageError::CaseNotFound)` if the case does not exist.
    async fn get_case(&self, case_id: &str) -> Result<CaseRecord, StorageError>;

    /// Find the open case carrying `external_reference`, if any.
    async fn find_open_case_by_reference(
        &self,
        external_reference: &str,
    ) -> Result<Option<CaseRecord>, StorageError>;

    /// Apply a version-validated patch to a case (OCC).
    ///
    /// Returns the updated record with `version = expected_version + 1`.
    async fn update_case(
        &self,
        case_id: &str,
        expected_version: i64,
        patch: &CasePatch,
        updated_at: OffsetDateTime,
    ) -> Result<CaseRecord, StorageError>;

    /// List cases matching `filter`, newest first.
    async fn list_cases(&self, filter: &CaseFilter) -> Result<Vec<CaseRecord>, StorageError>;

    // ── Serial registry ──────────────────────────────────────────────────────

    /// Create or refine the registry entry for `upsert.serial_number`.
    ///
    /// A new entry starts with `case_count = 0`. On an existing entry, only
    /// non-null hints replace stored ones and `last_touched_at` is bumped;
    /// the case count is never changed here.
    async fn upsert_serial(&self, upsert: SerialUpsert) -> Result<SerialRecord, StorageError>;

    /// Atomically add one to the entry's case count and record `case_id` as
    /// the last case seen.
    ///
    /// Returns `Err(StorageError::SerialNotFound)` if the entry does not exist.
    async fn increment_serial_case_count(
        &self,
        serial_id: &str,
        case_id: &str,
    ) -> Result<SerialRecord, StorageError>;

    /// Look up a registry entry by normalized serial number.
    async fn get_serial(&self, serial_number: &str) -> Result<Option<SerialRecord>, StorageError>;

    // ── Ledger ───────────────────────────────────────────────────────────────

    /// Append a service event. Events are never updated or deleted.
    async fn append_service_event(&self, event: ServiceEventRecord) -> Result<(), StorageError>;

    /// List events matching `filter`, oldest first (by `created_at`, ties in
    /// append order).
    async fn list_service_events(
        &self,
        filter: &EventFilter,
    ) -> Result<Vec<ServiceEventRecord>, StorageError>;

    // ── Communications ───────────────────────────────────────────────────────

    /// Append a communication record.
    async fn append_communication(&self, record: CommunicationRecord)
        -> Result<(), StorageError>;

    /// List communications for a case, oldest first.
    async fn list_communications(
        &self,
        case_id: &str,
    ) -> Result<Vec<CommunicationRecord>, StorageError>;
}
