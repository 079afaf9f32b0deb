//! In-process `ReturnStore` backend.
//!
//! All tables live behind one `tokio::sync::RwLock`, so every trait method
//! is atomic with respect to every other: the serial upsert and the
//! open-reference uniqueness check happen under the write lock, never as a
//! caller-side read-then-write.
//!
//! The store can be exported to and rebuilt from a [`StoreSnapshot`], which
//! is how the `rma` CLI persists state between invocations.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::error::StorageError;
use crate::record::{
    CaseFilter, CasePatch, CaseRecord, CommunicationRecord, EventFilter, SchemaCapabilities,
    SerialRecord, SerialUpsert, ServiceEventRecord,
};
use crate::traits::ReturnStore;

/// Serializable dump of every table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub capabilities: Option<SchemaCapabilities>,
    #[serde(default)]
    pub cases: Vec<CaseRecord>,
    #[serde(default)]
    pub serials: Vec<SerialRecord>,
    #[serde(default)]
    pub service_events: Vec<ServiceEventRecord>,
    #[serde(default)]
    pub communications: Vec<CommunicationRecord>,
}

#[derive(Debug, Default)]
struct Tables {
    cases: BTreeMap<String, CaseRecord>,
    /// Keyed by normalized serial number.
    serials: BTreeMap<String, SerialRecord>,
    service_events: Vec<ServiceEventRecord>,
    communications: Vec<CommunicationRecord>,
}

/// In-memory backend.
#[derive(Debug)]
pub struct MemoryStore {
    capabilities: SchemaCapabilities,
    tables: RwLock<Tables>,
    fail_service_events: AtomicBool,
}

impl MemoryStore {
    /// Empty store with the current schema.
    pub fn new() -> Self {
        Self::with_capabilities(SchemaCapabilities::CURRENT)
    }

    /// Empty store emulating a schema with the given capabilities.
    pub fn with_capabilities(capabilities: SchemaCapabilities) -> Self {
        MemoryStore {
            capabilities,
            tables: RwLock::new(Tables::default()),
            fail_service_events: AtomicBool::new(false),
        }
    }

    /// Rebuild a store from a snapshot. Snapshot capabilities win over the
    /// current schema when present.
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let capabilities = snapshot.capabilities.unwrap_or_default();
        let tables = Tables {
            cases: snapshot
                .cases
                .into_iter()
                .map(|c| (c.id.clone(), c))
                .collect(),
            serials: snapshot
                .serials
                .into_iter()
                .map(|s| (s.serial_number.clone(), s))
                .collect(),
            service_events: snapshot.service_events,
            communications: snapshot.communications,
        };
        MemoryStore {
            capabilities,
            tables: RwLock::new(tables),
            fail_service_events: AtomicBool::new(false),
        }
    }

    /// Export every table.
    pub async fn snapshot(&self) -> StoreSnapshot {
        let tables = self.tables.read().await;
        StoreSnapshot {
            capabilities: Some(self.capabilities),
            cases: tables.cases.values().cloned().collect(),
            serials: tables.serials.values().cloned().collect(),
            service_events: tables.service_events.clone(),
            communications: tables.communications.clone(),
        }
    }

    /// Make every subsequent ledger append fail with a backend error.
    /// Used to exercise degraded paths.
    pub fn set_fail_service_events(&self, fail: bool) {
        self.fail_service_events.store(fail, Ordering::SeqCst);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReturnStore for MemoryStore {
    async fn capabilities(&self) -> Result<SchemaCapabilities, StorageError> {
        Ok(self.capabilities)
    }

    async fn insert_case(&self, record: CaseRecord) -> Result<CaseRecord, StorageError> {
        let mut unsupported = Vec::new();
        if !self.capabilities.optional_case_columns {
            unsupported.extend(record.optional_columns_in_use());
        }
        if !self.capabilities.stage_timestamps {
            unsupported.extend(record.stage_timestamp_columns_in_use());
        }
        if !unsupported.is_empty() {
            return Err(StorageError::UnsupportedColumns {
                table: "cases",
                columns: unsupported,
            });
        }

        let mut tables = self.tables.write().await;
        if tables.cases.contains_key(&record.id) {
            return Err(StorageError::Backend(format!(
                "duplicate primary key: {}",
                record.id
            )));
        }
        if record.is_open() {
            if let Some(existing) = tables
                .cases
                .values()
                .find(|c| c.is_open() && c.external_reference == record.external_reference)
            {
                return Err(StorageError::DuplicateReference {
                    external_reference: record.external_reference.clone(),
                    existing_case_id: existing.id.clone(),
                });
            }
        }
        tables.cases.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn get_case(&self, case_id: &str) -> Result<CaseRecord, StorageError> {
        let tables = self.tables.read().await;
        tables
            .cases
            .get(case_id)
            .cloned()
            .ok_or_else(|| StorageError::CaseNotFound {
                case_id: case_id.to_string(),
            })
    }

    async fn find_open_case_by_reference(
        &self,
        external_reference: &str,
    ) -> Result<Option<CaseRecord>, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables
            .cases
            .values()
            .find(|c| c.is_open() && c.external_reference == external_reference)
            .cloned())
    }

    async fn update_case(
        &self,
        case_id: &str,
        expected_version: i64,
        patch: &CasePatch,
        updated_at: OffsetDateTime,
    ) -> Result<CaseRecord, StorageError> {
        let unsupported = patch.unsupported_columns(self.capabilities);
        if !unsupported.is_empty() {
            return Err(StorageError::UnsupportedColumns {
                table: "cases",
                columns: unsupported,
            });
        }

        let mut tables = self.tables.write().await;
        let current = tables
            .cases
            .get(case_id)
            .ok_or_else(|| StorageError::CaseNotFound {
                case_id: case_id.to_string(),
            })?;
        if current.version != expected_version {
            return Err(StorageError::ConcurrentConflict {
                case_id: case_id.to_string(),
                expected_version,
            });
        }
        let reopens = !current.is_open() && patch.stage.is_some_and(|s| !s.is_terminal());
        if reopens {
            if let Some(existing) = tables.cases.values().find(|c| {
                c.id != case_id && c.is_open() && c.external_reference == current.external_reference
            }) {
                return Err(StorageError::DuplicateReference {
                    external_reference: existing.external_reference.clone(),
                    existing_case_id: existing.id.clone(),
                });
            }
        }
        let Some(case) = tables.cases.get_mut(case_id) else {
            return Err(StorageError::CaseNotFound {
                case_id: case_id.to_string(),
            });
        };
        patch.apply_to(case);
        case.version += 1;
        case.updated_at = updated_at;
        Ok(case.clone())
    }

    async fn list_cases(&self, filter: &CaseFilter) -> Result<Vec<CaseRecord>, StorageError> {
        let tables = self.tables.read().await;
        let mut cases: Vec<CaseRecord> = tables
            .cases
            .values()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect();
        cases.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        if filter.limit > 0 {
            cases.truncate(filter.limit);
        }
        Ok(cases)
    }

    async fn upsert_serial(&self, upsert: SerialUpsert) -> Result<SerialRecord, StorageError> {
        let mut tables = self.tables.write().await;
        let entry = tables
            .serials
            .entry(upsert.serial_number.clone())
            .or_insert_with(|| SerialRecord {
                id: upsert.candidate_id.clone(),
                serial_number: upsert.serial_number.clone(),
                brand: None,
                model: None,
                case_count: 0,
                last_case_id: None,
                first_seen_at: upsert.touched_at,
                last_touched_at: upsert.touched_at,
            });
        if upsert.brand.is_some() {
            entry.brand = upsert.brand;
        }
        if upsert.model.is_some() {
            entry.model = upsert.model;
        }
        entry.last_touched_at = upsert.touched_at;
        Ok(entry.clone())
    }

    async fn increment_serial_case_count(
        &self,
        serial_id: &str,
        case_id: &str,
    ) -> Result<SerialRecord, StorageError> {
        let mut tables = self.tables.write().await;
        let entry = tables
            .serials
            .values_mut()
            .find(|s| s.id == serial_id)
            .ok_or_else(|| StorageError::SerialNotFound {
                serial_id: serial_id.to_string(),
            })?;
        entry.case_count += 1;
        entry.last_case_id = Some(case_id.to_string());
        Ok(entry.clone())
    }

    async fn get_serial(&self, serial_number: &str) -> Result<Option<SerialRecord>, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables.serials.get(serial_number).cloned())
    }

    async fn append_service_event(&self, event: ServiceEventRecord) -> Result<(), StorageError> {
        if self.fail_service_events.load(Ordering::SeqCst) {
            return Err(StorageError::Backend(
                "service_events table unavailable".to_string(),
            ));
        }
        let mut tables = self.tables.write().await;
        if !tables.serials.values().any(|s| s.id == event.serial_id) {
            return Err(StorageError::SerialNotFound {
                serial_id: event.serial_id,
            });
        }
        tables.service_events.push(event);
        Ok(())
    }

    async fn list_service_events(
        &self,
        filter: &EventFilter,
    ) -> Result<Vec<ServiceEventRecord>, StorageError> {
        let tables = self.tables.read().await;
        let mut events: Vec<ServiceEventRecord> = tables
            .service_events
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        // Stable: equal timestamps keep append order.
        events.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(events)
    }

    async fn append_communication(
        &self,
        record: CommunicationRecord,
    ) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        if !tables.cases.contains_key(&record.case_id) {
            return Err(StorageError::CaseNotFound {
                case_id: record.case_id,
            });
        }
        tables.communications.push(record);
        Ok(())
    }

    async fn list_communications(
        &self,
        case_id: &str,
    ) -> Result<Vec<CommunicationRecord>, StorageError> {
        let tables = self.tables.read().await;
        let mut records: Vec<CommunicationRecord> = tables
            .communications
            .iter()
            .filter(|c| c.case_id == case_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(records)
    }
}
