//! End-to-end case lifecycle over the in-memory store.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use time::macros::datetime;
use time::{Duration, OffsetDateTime};

use rma_engine::intake::{CustomerInfo, PublicFormClaim, ReturnLineItem, WebhookClaim};
use rma_engine::lookup::OrderLineItem;
use rma_engine::mirror::{MirrorCall, RecordingTicketMirror};
use rma_engine::registry::{upsert_registry, SerialHints};
use rma_engine::{
    Claim, ClaimSource, Engine, EngineConfig, EngineError, FixedClock, LogisticsUpdate,
    NewCommunication, OrderSummary, StaticOrderLookup, WarrantyPolicy,
};
use rma_storage::{
    CaseFilter, CasePatch, CaseRecord, ClaimOrigin, CommunicationChannel, CommunicationRecord,
    EventFilter, MemoryStore, ReturnStore, SchemaCapabilities, SerialRecord, SerialUpsert,
    ServiceEventRecord, ServiceEventType, Stage, StorageError, WarrantyStatus,
};

const NOW: OffsetDateTime = datetime!(2025-06-01 12:00 UTC);

async fn engine_with(
    caps: SchemaCapabilities,
) -> (Engine<MemoryStore>, Arc<MemoryStore>, Arc<FixedClock>) {
    let store = Arc::new(MemoryStore::with_capabilities(caps));
    let clock = Arc::new(FixedClock::new(NOW));
    let engine = Engine::connect(store.clone(), EngineConfig::default())
        .await
        .unwrap()
        .with_clock(clock.clone());
    (engine, store, clock)
}

fn processed_days_ago(days: i64) -> String {
    (NOW - Duration::days(days))
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap()
}

fn abc123_claim() -> Claim {
    Claim {
        order_number: Some("1001".to_string()),
        customer_email: Some("buyer@example.com".to_string()),
        serial_number: Some("abc123".to_string()),
        order_processed_at: Some(processed_days_ago(400)),
        issue_summary: Some("won't power on".to_string()),
        ..Claim::new(ClaimOrigin::Webhook)
    }
}

async fn events_for(store: &MemoryStore, case_id: &str) -> Vec<ServiceEventRecord> {
    store
        .list_service_events(&EventFilter::for_case(case_id))
        .await
        .unwrap()
}

/// Walk a new case up to `repaired_replaced` with all evidence recorded.
async fn case_in_repaired(engine: &Engine<MemoryStore>) -> CaseRecord {
    let case = engine.create_case(abc123_claim()).await.unwrap().case;
    engine
        .record_arrival(&case.id, Default::default())
        .await
        .unwrap();
    engine.transition(&case.id, Stage::Testing, None).await.unwrap();
    engine
        .transition(&case.id, Stage::RepairedReplaced, Some("board swapped"))
        .await
        .unwrap()
        .case
}

// ── Creation ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn out_of_warranty_claim_opens_received_case() {
    let (engine, store, _) = engine_with(SchemaCapabilities::CURRENT).await;
    let outcome = engine.create_case(abc123_claim()).await.unwrap();
    let case = &outcome.case;

    assert!(!outcome.deduped);
    assert_eq!(case.stage, Stage::Received);
    assert_eq!(case.warranty_status, WarrantyStatus::OutOfWarranty);

    let entry = store.get_serial("ABC123").await.unwrap().unwrap();
    assert_eq!(entry.case_count, 1);
    assert_eq!(entry.last_case_id.as_deref(), Some(case.id.as_str()));

    let events = events_for(&store, &case.id).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, ServiceEventType::ServiceNote);
    assert!(outcome.side_effects.registry.success);
    assert!(outcome.side_effects.ledger.success);
    assert!(!outcome.side_effects.ticket.attempted);
}

#[tokio::test]
async fn duplicate_claim_returns_same_case_without_writes() {
    let (engine, store, _) = engine_with(SchemaCapabilities::CURRENT).await;
    let first = engine.create_case(abc123_claim()).await.unwrap();
    let second = engine
        .create_case(Claim {
            order_number: Some("#1001".to_string()),
            customer_email: Some("BUYER@example.com".to_string()),
            ..abc123_claim()
        })
        .await
        .unwrap();

    assert!(second.deduped);
    assert_eq!(second.case.id, first.case.id);
    assert_eq!(events_for(&store, &first.case.id).await.len(), 1);
    assert_eq!(
        store.get_serial("ABC123").await.unwrap().unwrap().case_count,
        1
    );
}

#[tokio::test]
async fn closed_case_does_not_absorb_new_claim() {
    let (engine, _, _) = engine_with(SchemaCapabilities::CURRENT).await;
    let case = case_in_repaired(&engine).await;
    engine
        .update_logistics(
            &case.id,
            LogisticsUpdate {
                outbound_carrier: Some("UPS".to_string()),
                outbound_tracking_number: Some("1Z-OUT".to_string()),
                ..LogisticsUpdate::default()
            },
        )
        .await
        .unwrap();
    engine
        .transition(&case.id, Stage::BackToCustomer, None)
        .await
        .unwrap();

    let again = engine.create_case(abc123_claim()).await.unwrap();
    assert!(!again.deduped);
    assert_ne!(again.case.id, case.id);
}

#[tokio::test]
async fn concurrent_duplicate_creates_yield_one_case() {
    let (engine, store, _) = engine_with(SchemaCapabilities::CURRENT).await;
    let engine = Arc::new(engine);

    let mut handles = Vec::new();
    for _ in 0..20 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine.create_case(abc123_claim()).await.unwrap()
        }));
    }
    let mut ids = Vec::new();
    let mut fresh = 0;
    for handle in handles {
        let outcome = handle.await.unwrap();
        if !outcome.deduped {
            fresh += 1;
        }
        ids.push(outcome.case.id);
    }

    ids.dedup();
    assert_eq!(ids.len(), 1);
    assert_eq!(fresh, 1);
    assert_eq!(store.snapshot().await.cases.len(), 1);
}

#[tokio::test]
async fn concurrent_registry_upserts_create_one_entry() {
    let store = Arc::new(MemoryStore::new());
    let mut handles = Vec::new();
    for i in 0..50 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let serial = if i % 2 == 0 { "sn-50" } else { " SN-50 " };
            upsert_registry(store.as_ref(), serial, &SerialHints::default(), NOW)
                .await
                .unwrap()
                .unwrap()
        }));
    }
    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().id);
    }
    ids.dedup();
    assert_eq!(ids.len(), 1);
    assert_eq!(store.snapshot().await.serials.len(), 1);
}

#[tokio::test]
async fn public_form_intake_checks_ownership() {
    let (engine, _, _) = engine_with(SchemaCapabilities::CURRENT).await;
    let lookup = StaticOrderLookup::new(vec![OrderSummary {
        order_id: "gid-9".to_string(),
        order_number: Some("#2002".to_string()),
        processed_at: Some(processed_days_ago(60)),
        email: Some("owner@example.com".to_string()),
        line_items: vec![OrderLineItem {
            serial_number: Some("XYZ-1".to_string()),
            brand: Some("Acme".to_string()),
            model: Some("Z1".to_string()),
            ..OrderLineItem::default()
        }],
        ..OrderSummary::default()
    }]);
    let engine = engine.with_order_lookup(Arc::new(lookup));

    let form = |email: &str| {
        ClaimSource::PublicForm(PublicFormClaim {
            order_number: "2002".to_string(),
            email: email.to_string(),
            name: None,
            phone: None,
            serial_number: None,
            issue_summary: Some("dead pixel".to_string()),
            issue_details: None,
            idempotency_key: None,
        })
    };

    let err = engine.intake(form("thief@example.com")).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let outcome = engine.intake(form("owner@example.com")).await.unwrap();
    assert_eq!(outcome.case.claim_origin, ClaimOrigin::PublicForm);
    assert_eq!(outcome.case.warranty_status, WarrantyStatus::InWarranty);
    assert_eq!(outcome.case.serial_number.as_deref(), Some("XYZ-1"));

    let history = engine.service_history("xyz-1").await.unwrap();
    assert_eq!(history.serial.brand.as_deref(), Some("Acme"));
    assert_eq!(history.serial.case_count, 1);
}

#[tokio::test]
async fn webhook_intake_dedups_on_return_id() {
    let (engine, _, _) = engine_with(SchemaCapabilities::CURRENT).await;
    let payload = ClaimSource::Webhook(WebhookClaim {
        return_id: "ret-77".to_string(),
        order_id: None,
        order_number: Some("3003".to_string()),
        customer: CustomerInfo {
            email: Some("w@example.com".to_string()),
            ..CustomerInfo::default()
        },
        line_items: vec![ReturnLineItem {
            serial_number: Some("w-1".to_string()),
            ..ReturnLineItem::default()
        }],
        reason: None,
        details: None,
    });
    let first = engine.intake(payload.clone()).await.unwrap();
    let second = engine.intake(payload).await.unwrap();
    assert_eq!(first.case.external_reference, "return:ret-77");
    assert!(second.deduped);
    assert_eq!(first.case.id, second.case.id);
}

// ── Transitions ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn testing_requires_arrival_then_succeeds() {
    let (engine, store, clock) = engine_with(SchemaCapabilities::CURRENT).await;
    let case = engine.create_case(abc123_claim()).await.unwrap().case;

    let err = engine
        .transition(&case.id, Stage::Testing, None)
        .await
        .unwrap_err();
    let EngineError::Transition(rejection) = err else {
        panic!("expected a transition rejection, got {err:?}");
    };
    assert_eq!(rejection.rule(), "missing_evidence");
    assert_eq!(rejection.missing_fields(), &["received_at"]);

    engine
        .record_arrival(&case.id, Default::default())
        .await
        .unwrap();
    clock.advance(Duration::hours(1));
    let update = engine
        .transition(&case.id, Stage::Testing, None)
        .await
        .unwrap();
    assert_eq!(update.previous_stage, Stage::Received);
    assert_eq!(update.case.stage, Stage::Testing);
    assert_eq!(update.case.inspected_at, Some(NOW + Duration::hours(1)));

    let events = events_for(&store, &case.id).await;
    let last = events.last().unwrap();
    assert_eq!(last.event_type, ServiceEventType::Testing);
    assert_eq!(last.metadata["previous_stage"], "received");
    assert_eq!(last.metadata["next_stage"], "testing");
}

#[tokio::test]
async fn testing_entry_stamps_inspected_at() {
    let (engine, store, _) = engine_with(SchemaCapabilities::CURRENT).await;
    let case = engine.create_case(abc123_claim()).await.unwrap().case;
    store
        .update_case(
            &case.id,
            case.version,
            &CasePatch {
                received_at: Some(NOW),
                ..CasePatch::default()
            },
            NOW,
        )
        .await
        .unwrap();
    assert_eq!(engine.get_case(&case.id).await.unwrap().inspected_at, None);

    let update = engine
        .transition(&case.id, Stage::Testing, None)
        .await
        .unwrap();
    assert_eq!(update.case.inspected_at, Some(NOW));
    assert_eq!(update.case.received_at, Some(NOW));
}

#[tokio::test]
async fn back_to_customer_stamps_once() {
    let (engine, _, clock) = engine_with(SchemaCapabilities::CURRENT).await;
    let case = case_in_repaired(&engine).await;

    let err = engine
        .transition(&case.id, Stage::BackToCustomer, None)
        .await
        .unwrap_err();
    let EngineError::Transition(rejection) = err else {
        panic!("expected a transition rejection, got {err:?}");
    };
    assert_eq!(
        rejection.missing_fields(),
        &["outbound_carrier", "outbound_tracking_number"]
    );

    engine
        .update_logistics(
            &case.id,
            LogisticsUpdate {
                outbound_carrier: Some("UPS".to_string()),
                outbound_tracking_number: Some("1Z-OUT".to_string()),
                ..LogisticsUpdate::default()
            },
        )
        .await
        .unwrap();
    clock.advance(Duration::hours(2));
    let closed = engine
        .transition(&case.id, Stage::BackToCustomer, None)
        .await
        .unwrap()
        .case;
    let stamped = NOW + Duration::hours(2);
    assert_eq!(closed.closed_at, Some(stamped));
    assert_eq!(closed.shipped_back_at, Some(stamped));

    // One step back and forward again keeps the first stamps.
    clock.advance(Duration::hours(2));
    engine
        .transition(&case.id, Stage::RepairedReplaced, None)
        .await
        .unwrap();
    let reclosed = engine
        .transition(&case.id, Stage::BackToCustomer, None)
        .await
        .unwrap()
        .case;
    assert_eq!(reclosed.closed_at, Some(stamped));
    assert_eq!(reclosed.shipped_back_at, Some(stamped));
}

#[tokio::test]
async fn reopen_is_blocked_while_newer_case_is_open() {
    let (engine, store, _) = engine_with(SchemaCapabilities::CURRENT).await;
    let case = case_in_repaired(&engine).await;
    engine
        .update_logistics(
            &case.id,
            LogisticsUpdate {
                outbound_carrier: Some("UPS".to_string()),
                outbound_tracking_number: Some("1Z-OUT".to_string()),
                ..LogisticsUpdate::default()
            },
        )
        .await
        .unwrap();
    let closed = engine
        .transition(&case.id, Stage::BackToCustomer, None)
        .await
        .unwrap()
        .case;

    let newer = engine.create_case(abc123_claim()).await.unwrap();
    assert!(!newer.deduped);
    assert_ne!(newer.case.id, case.id);

    let err = engine
        .transition(&case.id, Stage::RepairedReplaced, None)
        .await
        .unwrap_err();
    let EngineError::Transition(rejection) = err else {
        panic!("expected a transition rejection, got {err:?}");
    };
    assert_eq!(rejection.rule(), "reference_in_use");

    assert_eq!(store.get_case(&case.id).await.unwrap(), closed);
    let open = engine
        .list_cases(&CaseFilter {
            open_only: true,
            ..CaseFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(
        open.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(),
        vec![newer.case.id.as_str()]
    );
}

#[tokio::test]
async fn ordering_rules_apply_through_engine() {
    let (engine, _, _) = engine_with(SchemaCapabilities::CURRENT).await;
    let case = case_in_repaired(&engine).await;

    let err = engine
        .transition(&case.id, Stage::Received, None)
        .await
        .unwrap_err();
    let EngineError::Transition(rejection) = err else {
        panic!("expected a transition rejection, got {err:?}");
    };
    assert_eq!(rejection.rule(), "ordering");

    let back = engine
        .transition(&case.id, Stage::SentToManufacturer, None)
        .await
        .unwrap();
    assert_eq!(back.case.stage, Stage::SentToManufacturer);
}

#[tokio::test]
async fn received_cannot_jump_to_repaired() {
    let (engine, _, _) = engine_with(SchemaCapabilities::CURRENT).await;
    let case = engine.create_case(abc123_claim()).await.unwrap().case;
    engine
        .record_arrival(&case.id, Default::default())
        .await
        .unwrap();
    let err = engine
        .transition(&case.id, Stage::RepairedReplaced, None)
        .await
        .unwrap_err();
    let EngineError::Transition(rejection) = err else {
        panic!("expected a transition rejection, got {err:?}");
    };
    assert_eq!(rejection.rule(), "skipped_testing");
}

#[tokio::test]
async fn legacy_store_transitions_with_reduced_columns() {
    let (engine, _, _) = engine_with(SchemaCapabilities::LEGACY).await;
    let case = engine.create_case(abc123_claim()).await.unwrap().case;

    let testing = engine
        .transition(&case.id, Stage::Testing, None)
        .await
        .unwrap()
        .case;
    assert_eq!(testing.stage, Stage::Testing);
    assert_eq!(testing.inspected_at, None);

    engine
        .transition(&case.id, Stage::RepairedReplaced, None)
        .await
        .unwrap();
    engine
        .update_logistics(
            &case.id,
            LogisticsUpdate {
                outbound_carrier: Some("DHL".to_string()),
                outbound_tracking_number: Some("JD01".to_string()),
                ..LogisticsUpdate::default()
            },
        )
        .await
        .unwrap();
    let closed = engine
        .transition(&case.id, Stage::BackToCustomer, None)
        .await
        .unwrap()
        .case;
    assert_eq!(closed.closed_at, Some(NOW));
    assert_eq!(closed.shipped_back_at, None);
}

#[tokio::test]
async fn ledger_failure_does_not_fail_transition() {
    let (engine, store, _) = engine_with(SchemaCapabilities::CURRENT).await;
    let case = engine.create_case(abc123_claim()).await.unwrap().case;
    engine
        .record_arrival(&case.id, Default::default())
        .await
        .unwrap();

    store.set_fail_service_events(true);
    let update = engine
        .transition(&case.id, Stage::Testing, None)
        .await
        .unwrap();
    assert_eq!(update.case.stage, Stage::Testing);
    assert!(update.side_effects.registry.success);
    assert!(update.side_effects.ledger.attempted);
    assert!(!update.side_effects.ledger.success);
    assert!(update.side_effects.ledger.error.is_some());
    assert!(!update.side_effects.all_ok());
}

// ── Ticket mirror ────────────────────────────────────────────────────────────

fn stage_map() -> BTreeMap<Stage, String> {
    [
        (Stage::Received, "New".to_string()),
        (Stage::Testing, "Diagnosing".to_string()),
    ]
    .into_iter()
    .collect()
}

#[tokio::test]
async fn ticket_is_created_and_id_stored() {
    let (engine, _, _) = engine_with(SchemaCapabilities::CURRENT).await;
    let mirror = Arc::new(RecordingTicketMirror::new());
    let engine = engine.with_ticket_mirror(mirror.clone(), stage_map());

    let outcome = engine.create_case(abc123_claim()).await.unwrap();
    assert!(outcome.side_effects.ticket.success);
    assert_eq!(outcome.case.external_ticket_id.as_deref(), Some("T-1"));

    engine
        .record_arrival(&outcome.case.id, Default::default())
        .await
        .unwrap();
    let update = engine
        .transition(&outcome.case.id, Stage::Testing, None)
        .await
        .unwrap();
    assert!(update.side_effects.ticket.success);

    // Unmapped stage: nothing is sent.
    engine
        .transition(&outcome.case.id, Stage::SentToManufacturer, None)
        .await
        .unwrap();

    assert_eq!(
        mirror.calls(),
        vec![
            MirrorCall::Create {
                case_id: outcome.case.id.clone(),
                external_stage: "New".to_string()
            },
            MirrorCall::Update {
                ticket_id: "T-1".to_string(),
                external_stage: "Diagnosing".to_string()
            },
        ]
    );
}

#[tokio::test]
async fn ticket_failure_is_reported_not_raised() {
    let (engine, _, _) = engine_with(SchemaCapabilities::CURRENT).await;
    let engine = engine.with_ticket_mirror(
        Arc::new(RecordingTicketMirror::failing("connection refused")),
        stage_map(),
    );
    let outcome = engine.create_case(abc123_claim()).await.unwrap();
    assert!(outcome.side_effects.ticket.attempted);
    assert!(!outcome.side_effects.ticket.success);
    assert_eq!(outcome.case.external_ticket_id, None);
}

#[tokio::test]
async fn ticket_sync_not_attempted_without_config() {
    let (engine, _, _) = engine_with(SchemaCapabilities::CURRENT).await;
    let outcome = engine.create_case(abc123_claim()).await.unwrap();
    assert!(!outcome.side_effects.ticket.attempted);
}

// ── Concurrency ──────────────────────────────────────────────────────────────

/// Store whose first `conflicts` case updates lose an OCC race.
struct RacingStore {
    inner: MemoryStore,
    conflicts: AtomicU32,
}

#[async_trait]
impl ReturnStore for RacingStore {
    async fn capabilities(&self) -> Result<SchemaCapabilities, StorageError> {
        self.inner.capabilities().await
    }
    async fn insert_case(&self, record: CaseRecord) -> Result<CaseRecord, StorageError> {
        self.inner.insert_case(record).await
    }
    async fn get_case(&self, case_id: &str) -> Result<CaseRecord, StorageError> {
        self.inner.get_case(case_id).await
    }
    async fn find_open_case_by_reference(
        &self,
        external_reference: &str,
    ) -> Result<Option<CaseRecord>, StorageError> {
        self.inner.find_open_case_by_reference(external_reference).await
    }
    async fn update_case(
        &self,
        case_id: &str,
        expected_version: i64,
        patch: &CasePatch,
        updated_at: OffsetDateTime,
    ) -> Result<CaseRecord, StorageError> {
        let remaining = self.conflicts.load(Ordering::SeqCst);
        if remaining > 0 {
            self.conflicts.store(remaining - 1, Ordering::SeqCst);
            return Err(StorageError::ConcurrentConflict {
                case_id: case_id.to_string(),
                expected_version,
            });
        }
        self.inner
            .update_case(case_id, expected_version, patch, updated_at)
            .await
    }
    async fn list_cases(&self, filter: &CaseFilter) -> Result<Vec<CaseRecord>, StorageError> {
        self.inner.list_cases(filter).await
    }
    async fn upsert_serial(&self, upsert: SerialUpsert) -> Result<SerialRecord, StorageError> {
        self.inner.upsert_serial(upsert).await
    }
    async fn increment_serial_case_count(
        &self,
        serial_id: &str,
        case_id: &str,
    ) -> Result<SerialRecord, StorageError> {
        self.inner.increment_serial_case_count(serial_id, case_id).await
    }
    async fn get_serial(&self, serial_number: &str) -> Result<Option<SerialRecord>, StorageError> {
        self.inner.get_serial(serial_number).await
    }
    async fn append_service_event(&self, event: ServiceEventRecord) -> Result<(), StorageError> {
        self.inner.append_service_event(event).await
    }
    async fn list_service_events(
        &self,
        filter: &EventFilter,
    ) -> Result<Vec<ServiceEventRecord>, StorageError> {
        self.inner.list_service_events(filter).await
    }
    async fn append_communication(&self, record: CommunicationRecord) -> Result<(), StorageError> {
        self.inner.append_communication(record).await
    }
    async fn list_communications(
        &self,
        case_id: &str,
    ) -> Result<Vec<CommunicationRecord>, StorageError> {
        self.inner.list_communications(case_id).await
    }
}

async fn racing_engine() -> (Engine<RacingStore>, Arc<RacingStore>, String) {
    let store = Arc::new(RacingStore {
        inner: MemoryStore::new(),
        conflicts: AtomicU32::new(0),
    });
    let engine = Engine::connect(store.clone(), EngineConfig::default())
        .await
        .unwrap()
        .with_clock(Arc::new(FixedClock::new(NOW)));
    let case = engine.create_case(abc123_claim()).await.unwrap().case;
    engine
        .record_arrival(&case.id, Default::default())
        .await
        .unwrap();
    (engine, store, case.id)
}

#[tokio::test]
async fn version_conflict_is_retried() {
    let (engine, store, case_id) = racing_engine().await;
    store.conflicts.store(2, Ordering::SeqCst);
    let update = engine
        .transition(&case_id, Stage::Testing, None)
        .await
        .unwrap();
    assert_eq!(update.case.stage, Stage::Testing);
}

#[tokio::test]
async fn persistent_conflict_gives_up() {
    let (engine, store, case_id) = racing_engine().await;
    store.conflicts.store(3, Ordering::SeqCst);
    let err = engine
        .transition(&case_id, Stage::Testing, None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict { attempts: 3, .. }));
    assert_eq!(engine.get_case(&case_id).await.unwrap().stage, Stage::Received);
}

#[test]
fn engine_is_shareable_across_tasks() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Engine<MemoryStore>>();
    assert_send_sync::<Engine<dyn ReturnStore>>();
}

// ── Communications & config ──────────────────────────────────────────────────

#[tokio::test]
async fn communications_are_validated_and_recorded() {
    let (engine, _, _) = engine_with(SchemaCapabilities::CURRENT).await;
    let case = engine.create_case(abc123_claim()).await.unwrap().case;

    let err = engine
        .append_communication(
            &case.id,
            NewCommunication {
                channel: CommunicationChannel::Email,
                template: None,
                recipient: " ".to_string(),
                body: String::new(),
            },
        )
        .await
        .unwrap_err();
    let EngineError::Validation(errors) = err else {
        panic!("expected validation error, got {err:?}");
    };
    assert_eq!(errors.fields(), vec!["recipient", "body"]);

    let err = engine
        .append_communication(
            "missing",
            NewCommunication {
                channel: CommunicationChannel::Sms,
                template: None,
                recipient: "+15550100".to_string(),
                body: "Your unit shipped".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "not_found");

    let record = engine
        .append_communication(
            &case.id,
            NewCommunication {
                channel: CommunicationChannel::Email,
                template: Some("rma_received".to_string()),
                recipient: "buyer@example.com".to_string(),
                body: "We received your unit.".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(record.created_at, NOW);
    assert_eq!(engine.communications(&case.id).await.unwrap(), vec![record]);
}

#[tokio::test]
async fn warranty_years_come_from_config() {
    let store = Arc::new(MemoryStore::new());
    let config = EngineConfig {
        warranty: WarrantyPolicy { years: 2 },
        ..EngineConfig::default()
    };
    let engine = Engine::connect(store, config)
        .await
        .unwrap()
        .with_clock(Arc::new(FixedClock::new(NOW)));
    let case = engine.create_case(abc123_claim()).await.unwrap().case;
    assert_eq!(case.warranty_status, WarrantyStatus::InWarranty);
}
