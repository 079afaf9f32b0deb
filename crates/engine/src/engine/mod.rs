//! The return case engine.
//!
//! [`Engine`] wires the pure components (state machine, warranty calculator,
//! SLA deriver) to the injected collaborators: a [`ReturnStore`], an
//! [`OrderLookup`], an optional ticket mirror and a [`Clock`]. Schema
//! capabilities are read from the store once, in [`Engine::connect`].

mod create;
mod decision;
mod dispatch;
mod report;
mod transition;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use rma_storage::{
    CaseFilter, CaseRecord, CommunicationChannel, CommunicationRecord, EventFilter, ReturnStore,
    SchemaCapabilities, ServiceEventRecord, Stage,
};

use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigError, EngineConfig};
use crate::error::{EngineError, ValidationErrors};
use crate::lookup::{OrderLookup, StaticOrderLookup};
use crate::mirror::{HttpTicketMirror, TicketMirror, TicketSync};
use crate::registry::ServiceHistory;
use crate::serial::normalize_serial;

pub use create::CreateOutcome;
pub use decision::WarrantyDecision;
pub use dispatch::{AuxStatus, SideEffectReport};
pub use transition::{ArrivalReport, CaseUpdate, LogisticsUpdate, WorkflowUpdate};

/// Attempts made by an optimistic-concurrency update before giving up.
pub const MAX_UPDATE_ATTEMPTS: u32 = 3;

/// Input to [`Engine::append_communication`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCommunication {
    pub channel: CommunicationChannel,
    #[serde(default)]
    pub template: Option<String>,
    pub recipient: String,
    pub body: String,
}

pub struct Engine<S: ReturnStore + ?Sized> {
    store: Arc<S>,
    config: EngineConfig,
    caps: SchemaCapabilities,
    clock: Arc<dyn Clock>,
    lookup: Arc<dyn OrderLookup>,
    tickets: Option<TicketSync>,
}

impl<S: ReturnStore + ?Sized> Engine<S> {
    /// Build an engine over `store`.
    ///
    /// Resolves the store's schema capabilities and, when `[ticket_mirror]`
    /// is configured, an HTTP ticket mirror.
    pub async fn connect(store: Arc<S>, config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let caps = store.capabilities().await?;

        let tickets = match &config.ticket_mirror {
            Some(mirror_config) => {
                let mirror = HttpTicketMirror::from_config(mirror_config)
                    .map_err(|e| ConfigError::Invalid(vec![e.to_string()]))?;
                Some(TicketSync::new(
                    Arc::new(mirror),
                    mirror_config.stage_map()?,
                ))
            }
            None => None,
        };

        info!(
            stage_timestamps = caps.stage_timestamps,
            optional_case_columns = caps.optional_case_columns,
            ticket_mirror = tickets.is_some(),
            "engine connected"
        );

        Ok(Engine {
            store,
            config,
            caps,
            clock: Arc::new(SystemClock),
            lookup: Arc::new(StaticOrderLookup::default()),
            tickets,
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_order_lookup(mut self, lookup: Arc<dyn OrderLookup>) -> Self {
        self.lookup = lookup;
        self
    }

    /// Replace the configured mirror (if any) with `mirror`.
    pub fn with_ticket_mirror(
        mut self,
        mirror: Arc<dyn TicketMirror>,
        stages: BTreeMap<Stage, String>,
    ) -> Self {
        self.tickets = Some(TicketSync::new(mirror, stages));
        self
    }

    pub fn without_ticket_mirror(mut self) -> Self {
        self.tickets = None;
        self
    }

    pub fn capabilities(&self) -> SchemaCapabilities {
        self.caps
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub async fn get_case(&self, case_id: &str) -> Result<CaseRecord, EngineError> {
        Ok(self.store.get_case(case_id).await?)
    }

    /// Cases matching `filter`, newest first.
    pub async fn list_cases(&self, filter: &CaseFilter) -> Result<Vec<CaseRecord>, EngineError> {
        let mut filter = filter.clone();
        if let Some(serial) = &filter.serial_number {
            filter.serial_number = normalize_serial(serial);
        }
        Ok(self.store.list_cases(&filter).await?)
    }

    /// Ledger events recorded for one case, oldest first.
    pub async fn case_events(&self, case_id: &str) -> Result<Vec<ServiceEventRecord>, EngineError> {
        self.store.get_case(case_id).await?;
        Ok(self
            .store
            .list_service_events(&EventFilter::for_case(case_id))
            .await?)
    }

    /// Registry entry and full ledger for a serial number.
    pub async fn service_history(&self, serial: &str) -> Result<ServiceHistory, EngineError> {
        let normalized = normalize_serial(serial).ok_or_else(|| {
            let mut errors = ValidationErrors::new();
            errors.push("serial_number", "must not be blank");
            EngineError::Validation(errors)
        })?;
        let entry = self
            .store
            .get_serial(&normalized)
            .await?
            .ok_or_else(|| EngineError::NotFound {
                kind: "serial",
                id: normalized.clone(),
            })?;
        let events = self
            .store
            .list_service_events(&EventFilter::for_serial(&entry.id))
            .await?;
        Ok(ServiceHistory {
            serial: entry,
            events,
        })
    }

    /// Record that a customer communication took place.
    pub async fn append_communication(
        &self,
        case_id: &str,
        communication: NewCommunication,
    ) -> Result<CommunicationRecord, EngineError> {
        let mut errors = ValidationErrors::new();
        if communication.recipient.trim().is_empty() {
            errors.push("recipient", "must not be blank");
        }
        if communication.body.trim().is_empty() {
            errors.push("body", "must not be blank");
        }
        errors.into_result()?;

        self.store.get_case(case_id).await?;

        let record = CommunicationRecord {
            id: Uuid::new_v4().to_string(),
            case_id: case_id.to_string(),
            channel: communication.channel,
            template: communication
                .template
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
            recipient: communication.recipient.trim().to_string(),
            body: communication.body,
            created_at: self.clock.now(),
        };
        self.store.append_communication(record.clone()).await?;
        info!(case_id = %case_id, channel = ?record.channel, "communication recorded");
        Ok(record)
    }

    pub async fn communications(
        &self,
        case_id: &str,
    ) -> Result<Vec<CommunicationRecord>, EngineError> {
        Ok(self.store.list_communications(case_id).await?)
    }
}
