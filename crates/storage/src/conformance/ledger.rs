use std::future::Future;

use time::macros::datetime;

use super::{make_case, make_event, make_serial_upsert, TestResult};
use crate::record::{CommunicationChannel, CommunicationRecord, EventFilter, ServiceEventType};
use crate::{ReturnStore, StorageError};

pub(super) async fn run_ledger_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: ReturnStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "ledger",
            "events_listed_oldest_first",
            events_listed_oldest_first(factory).await,
        ),
        TestResult::from_result(
            "ledger",
            "events_filtered_by_case_and_serial",
            events_filtered_by_case_and_serial(factory).await,
        ),
        TestResult::from_result(
            "ledger",
            "event_for_unknown_serial_rejected",
            event_for_unknown_serial_rejected(factory).await,
        ),
        TestResult::from_result(
            "ledger",
            "communications_append_and_list",
            communications_append_and_list(factory).await,
        ),
    ]
}

async fn events_listed_oldest_first<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ReturnStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let serial = store
        .upsert_serial(make_serial_upsert("serial-1", "ABC123"))
        .await
        .map_err(|e| format!("upsert: {e}"))?;
    // Appended out of timestamp order on purpose.
    let later = make_event(
        "e2",
        &serial.id,
        Some("case-1"),
        ServiceEventType::Testing,
        datetime!(2025-01-03 00:00 UTC),
    );
    let earlier = make_event(
        "e1",
        &serial.id,
        Some("case-1"),
        ServiceEventType::Received,
        datetime!(2025-01-02 00:00 UTC),
    );
    for event in [later, earlier] {
        store
            .append_service_event(event)
            .await
            .map_err(|e| format!("append: {e}"))?;
    }
    let events = store
        .list_service_events(&EventFilter::for_serial(&serial.id))
        .await
        .map_err(|e| format!("list: {e}"))?;
    let ids: Vec<&str> = events.iter().map(|e| e.id.as_str()).collect();
    if ids != ["e1", "e2"] {
        return Err(format!("expected [e1, e2], got {ids:?}"));
    }
    Ok(())
}

async fn events_filtered_by_case_and_serial<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ReturnStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let a = store
        .upsert_serial(make_serial_upsert("serial-a", "AAA"))
        .await
        .map_err(|e| format!("upsert a: {e}"))?;
    let b = store
        .upsert_serial(make_serial_upsert("serial-b", "BBB"))
        .await
        .map_err(|e| format!("upsert b: {e}"))?;
    let at = datetime!(2025-01-02 00:00 UTC);
    let events = [
        make_event("e1", &a.id, Some("case-1"), ServiceEventType::Received, at),
        make_event("e2", &a.id, None, ServiceEventType::ServiceNote, at),
        make_event("e3", &b.id, Some("case-2"), ServiceEventType::Received, at),
    ];
    for event in events {
        store
            .append_service_event(event)
            .await
            .map_err(|e| format!("append: {e}"))?;
    }

    let for_case = store
        .list_service_events(&EventFilter::for_case("case-1"))
        .await
        .map_err(|e| format!("list case: {e}"))?;
    if for_case.len() != 1 || for_case[0].id != "e1" {
        return Err(format!("case filter returned {for_case:?}"));
    }
    let for_serial = store
        .list_service_events(&EventFilter::for_serial(&a.id))
        .await
        .map_err(|e| format!("list serial: {e}"))?;
    if for_serial.len() != 2 {
        return Err(format!("serial filter returned {} events", for_serial.len()));
    }
    Ok(())
}

async fn event_for_unknown_serial_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ReturnStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let event = make_event(
        "e1",
        "ghost",
        None,
        ServiceEventType::ServiceNote,
        datetime!(2025-01-02 00:00 UTC),
    );
    match store.append_service_event(event).await {
        Err(StorageError::SerialNotFound { .. }) => Ok(()),
        other => Err(format!("expected SerialNotFound, got {other:?}")),
    }
}

async fn communications_append_and_list<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ReturnStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    store
        .insert_case(make_case("case-1", "ref-1"))
        .await
        .map_err(|e| format!("insert: {e}"))?;
    let record = CommunicationRecord {
        id: "comm-1".to_string(),
        case_id: "case-1".to_string(),
        channel: CommunicationChannel::Email,
        template: Some("rma_received".to_string()),
        recipient: "customer@example.com".to_string(),
        body: "We received your unit.".to_string(),
        created_at: datetime!(2025-01-02 00:00 UTC),
    };
    store
        .append_communication(record.clone())
        .await
        .map_err(|e| format!("append: {e}"))?;
    let listed = store
        .list_communications("case-1")
        .await
        .map_err(|e| format!("list: {e}"))?;
    if listed != vec![record] {
        return Err(format!("unexpected communications: {listed:?}"));
    }

    let orphan = CommunicationRecord {
        id: "comm-2".to_string(),
        case_id: "ghost".to_string(),
        channel: CommunicationChannel::Sms,
        template: None,
        recipient: "+100000".to_string(),
        body: "hi".to_string(),
        created_at: datetime!(2025-01-02 00:00 UTC),
    };
    match store.append_communication(orphan).await {
        Err(StorageError::CaseNotFound { .. }) => Ok(()),
        other => Err(format!("expected CaseNotFound, got {other:?}")),
    }
}
