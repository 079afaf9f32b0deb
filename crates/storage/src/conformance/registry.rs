use std::future::Future;

use time::macros::datetime;

use super::{make_serial_upsert, TestResult};
use crate::{ReturnStore, StorageError};

pub(super) async fn run_registry_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: ReturnStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "registry",
            "upsert_creates_entry_with_zero_count",
            upsert_creates_entry_with_zero_count(factory).await,
        ),
        TestResult::from_result(
            "registry",
            "upsert_existing_keeps_id_and_count",
            upsert_existing_keeps_id_and_count(factory).await,
        ),
        TestResult::from_result(
            "registry",
            "null_hints_do_not_overwrite",
            null_hints_do_not_overwrite(factory).await,
        ),
        TestResult::from_result(
            "registry",
            "increment_counts_and_records_last_case",
            increment_counts_and_records_last_case(factory).await,
        ),
        TestResult::from_result(
            "registry",
            "increment_unknown_serial_returns_not_found",
            increment_unknown_serial_returns_not_found(factory).await,
        ),
    ]
}

async fn upsert_creates_entry_with_zero_count<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ReturnStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let mut upsert = make_serial_upsert("serial-1", "ABC123");
    upsert.brand = Some("Acme".to_string());
    let entry = store
        .upsert_serial(upsert)
        .await
        .map_err(|e| format!("upsert: {e}"))?;
    if entry.id != "serial-1" || entry.case_count != 0 || entry.brand.as_deref() != Some("Acme")
    {
        return Err(format!("unexpected new entry: {entry:?}"));
    }
    match store.get_serial("ABC123").await {
        Ok(Some(read)) if read == entry => Ok(()),
        other => Err(format!("get_serial mismatch: {other:?}")),
    }
}

async fn upsert_existing_keeps_id_and_count<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ReturnStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let first = store
        .upsert_serial(make_serial_upsert("serial-1", "ABC123"))
        .await
        .map_err(|e| format!("first upsert: {e}"))?;
    store
        .increment_serial_case_count(&first.id, "case-1")
        .await
        .map_err(|e| format!("increment: {e}"))?;

    let mut again = make_serial_upsert("serial-2", "ABC123");
    again.touched_at = datetime!(2025-02-01 00:00 UTC);
    let second = store
        .upsert_serial(again)
        .await
        .map_err(|e| format!("second upsert: {e}"))?;
    if second.id != "serial-1" {
        return Err(format!("upsert replaced entry id with {}", second.id));
    }
    if second.case_count != 1 {
        return Err(format!("upsert changed count to {}", second.case_count));
    }
    if second.last_touched_at != datetime!(2025-02-01 00:00 UTC)
        || second.first_seen_at != first.first_seen_at
    {
        return Err(format!("touch timestamps wrong: {second:?}"));
    }
    Ok(())
}

async fn null_hints_do_not_overwrite<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ReturnStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let mut first = make_serial_upsert("serial-1", "ABC123");
    first.brand = Some("Acme".to_string());
    first.model = Some("X1".to_string());
    store
        .upsert_serial(first)
        .await
        .map_err(|e| format!("first upsert: {e}"))?;

    let mut refine = make_serial_upsert("serial-1", "ABC123");
    refine.model = Some("X1 Pro".to_string());
    let entry = store
        .upsert_serial(refine)
        .await
        .map_err(|e| format!("refine: {e}"))?;
    if entry.brand.as_deref() != Some("Acme") {
        return Err(format!("null brand hint overwrote: {:?}", entry.brand));
    }
    if entry.model.as_deref() != Some("X1 Pro") {
        return Err(format!("model hint not refined: {:?}", entry.model));
    }
    Ok(())
}

async fn increment_counts_and_records_last_case<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ReturnStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let entry = store
        .upsert_serial(make_serial_upsert("serial-1", "ABC123"))
        .await
        .map_err(|e| format!("upsert: {e}"))?;
    store
        .increment_serial_case_count(&entry.id, "case-1")
        .await
        .map_err(|e| format!("increment 1: {e}"))?;
    let entry = store
        .increment_serial_case_count(&entry.id, "case-2")
        .await
        .map_err(|e| format!("increment 2: {e}"))?;
    if entry.case_count != 2 || entry.last_case_id.as_deref() != Some("case-2") {
        return Err(format!("unexpected counted entry: {entry:?}"));
    }
    Ok(())
}

async fn increment_unknown_serial_returns_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ReturnStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    match store.increment_serial_case_count("ghost", "case-1").await {
        Err(StorageError::SerialNotFound { serial_id }) if serial_id == "ghost" => Ok(()),
        other => Err(format!("expected SerialNotFound, got {other:?}")),
    }
}
