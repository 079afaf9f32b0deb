//! Return case lifecycle engine.
//!
//! Tracks a returned unit from intake to return-to-customer: deduplicated
//! case creation, the stage state machine and its evidence gates, the
//! per-serial service ledger, warranty snapshots, and SLA and logistics
//! projections. Storage lives behind [`rma_storage::ReturnStore`].

pub mod claim;
pub mod clock;
pub mod config;
mod engine;
pub mod error;
pub mod intake;
pub mod lookup;
pub mod machine;
pub mod mirror;
pub mod registry;
pub mod serial;
pub mod sla;
pub mod warranty;

pub use claim::Claim;
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{ConfigError, EngineConfig, SlaPolicy, TicketMirrorConfig};
pub use engine::{
    ArrivalReport, AuxStatus, CaseUpdate, CreateOutcome, Engine, LogisticsUpdate,
    NewCommunication, SideEffectReport, WarrantyDecision, WorkflowUpdate, MAX_UPDATE_ATTEMPTS,
};
pub use error::{EngineError, FieldError, TransitionError, ValidationErrors};
pub use intake::ClaimSource;
pub use lookup::{OrderLookup, OrderSummary, StaticOrderLookup};
pub use mirror::{TicketMirror, TicketSync, TicketSyncStatus};
pub use registry::{map_stage_to_event_type, ServiceHistory};
pub use serial::normalize_serial;
pub use sla::{CaseExceptions, LogisticsException, StageAge};
pub use warranty::{compute_warranty, WarrantyPolicy, WarrantySnapshot};

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use rma_storage::{
        CaseRecord, ClaimOrigin, MemoryStore, Priority, SchemaCapabilities, Stage,
        WarrantyBasis, WarrantyStatus,
    };
    use time::macros::datetime;
    use time::OffsetDateTime;

    use crate::{EngineConfig, Engine, FixedClock};

    pub const NOW: OffsetDateTime = datetime!(2025-03-01 09:00 UTC);

    /// Engine over a fresh in-memory store, clock fixed at [`NOW`].
    pub async fn engine_at(caps: SchemaCapabilities) -> (Engine<MemoryStore>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::with_capabilities(caps));
        let engine = Engine::connect(store.clone(), EngineConfig::default())
            .await
            .unwrap()
            .with_clock(Arc::new(FixedClock::new(NOW)));
        (engine, store)
    }

    pub fn sample_case() -> CaseRecord {
        let at = datetime!(2025-02-01 00:00 UTC);
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
}
