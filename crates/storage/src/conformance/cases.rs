use std::future::Future;

use time::macros::datetime;

use super::{make_case, TestResult};
use crate::record::{CaseFilter, CasePatch, Stage};
use crate::{ReturnStore, StorageError};

pub(super) async fn run_case_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: ReturnStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "cases",
            "insert_then_get_returns_same_case",
            insert_then_get_returns_same_case(factory).await,
        ),
        TestResult::from_result(
            "cases",
            "get_missing_case_returns_not_found",
            get_missing_case_returns_not_found(factory).await,
        ),
        TestResult::from_result(
            "cases",
            "duplicate_open_reference_rejected",
            duplicate_open_reference_rejected(factory).await,
        ),
        TestResult::from_result(
            "cases",
            "closed_case_releases_reference",
            closed_case_releases_reference(factory).await,
        ),
        TestResult::from_result(
            "cases",
            "reopen_with_conflicting_open_reference_rejected",
            reopen_with_conflicting_open_reference_rejected(factory).await,
        ),
        TestResult::from_result(
            "cases",
            "find_open_case_by_reference",
            find_open_case_by_reference(factory).await,
        ),
        TestResult::from_result(
            "cases",
            "list_cases_applies_filters",
            list_cases_applies_filters(factory).await,
        ),
    ]
}

async fn insert_then_get_returns_same_case<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ReturnStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let case = make_case("case-1", "ref-1");
    store
        .insert_case(case.clone())
        .await
        .map_err(|e| format!("insert: {e}"))?;
    let read = store
        .get_case("case-1")
        .await
        .map_err(|e| format!("get: {e}"))?;
    if read != case {
        return Err(format!("read back differs: {read:?}"));
    }
    if read.version != 0 {
        return Err(format!("expected version 0, got {}", read.version));
    }
    Ok(())
}

async fn get_missing_case_returns_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ReturnStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    match store.get_case("nope").await {
        Err(StorageError::CaseNotFound { case_id }) if case_id == "nope" => Ok(()),
        other => Err(format!("expected CaseNotFound, got {other:?}")),
    }
}

async fn duplicate_open_reference_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ReturnStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    store
        .insert_case(make_case("case-1", "ref-1"))
        .await
        .map_err(|e| format!("insert first: {e}"))?;
    match store.insert_case(make_case("case-2", "ref-1")).await {
        Err(StorageError::DuplicateReference {
            external_reference,
            existing_case_id,
        }) => {
            if external_reference != "ref-1" || existing_case_id != "case-1" {
                return Err(format!(
                    "wrong conflict detail: {external_reference} / {existing_case_id}"
                ));
            }
        }
        other => return Err(format!("expected DuplicateReference, got {other:?}")),
    }
    match store.get_case("case-2").await {
        Err(StorageError::CaseNotFound { .. }) => Ok(()),
        other => Err(format!("rejected case must not exist, got {other:?}")),
    }
}

async fn closed_case_releases_reference<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ReturnStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    store
        .insert_case(make_case("case-1", "ref-1"))
        .await
        .map_err(|e| format!("insert first: {e}"))?;
    let close = CasePatch {
        stage: Some(Stage::BackToCustomer),
        closed_at: Some(datetime!(2025-01-10 00:00 UTC)),
        ..CasePatch::default()
    };
    store
        .update_case("case-1", 0, &close, datetime!(2025-01-10 00:00 UTC))
        .await
        .map_err(|e| format!("close: {e}"))?;
    store
        .insert_case(make_case("case-2", "ref-1"))
        .await
        .map_err(|e| format!("reference of a closed case must be reusable: {e}"))?;
    Ok(())
}

async fn reopen_with_conflicting_open_reference_rejected<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: ReturnStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let at = datetime!(2025-01-10 00:00 UTC);
    let close = CasePatch {
        stage: Some(Stage::BackToCustomer),
        ..CasePatch::default()
    };
    let reopen = CasePatch {
        stage: Some(Stage::RepairedReplaced),
        ..CasePatch::default()
    };
    store
        .insert_case(make_case("case-1", "ref-1"))
        .await
        .map_err(|e| format!("insert first: {e}"))?;
    store
        .update_case("case-1", 0, &close, at)
        .await
        .map_err(|e| format!("close first: {e}"))?;
    store
        .insert_case(make_case("case-2", "ref-1"))
        .await
        .map_err(|e| format!("insert second: {e}"))?;

    match store.update_case("case-1", 1, &reopen, at).await {
        Err(StorageError::DuplicateReference {
            existing_case_id, ..
        }) if existing_case_id == "case-2" => {}
        other => return Err(format!("expected DuplicateReference, got {other:?}")),
    }
    let first = store
        .get_case("case-1")
        .await
        .map_err(|e| format!("get first: {e}"))?;
    if first.stage != Stage::BackToCustomer || first.version != 1 {
        return Err(format!("rejected reopen must not write: {first:?}"));
    }

    store
        .update_case("case-2", 0, &close, at)
        .await
        .map_err(|e| format!("close second: {e}"))?;
    store
        .update_case("case-1", 1, &reopen, at)
        .await
        .map_err(|e| format!("reopen without a competing case must succeed: {e}"))?;
    Ok(())
}

async fn find_open_case_by_reference<S, F, Fut>(factory: &F) -> Result<(), String>
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
    let found = store
        .find_open_case_by_reference("ref-1")
        .await
        .map_err(|e| format!("find: {e}"))?;
    match found {
        Some(c) if c.id == "case-1" => {}
        other => return Err(format!("expected case-1, got {other:?}")),
    }
    let missing = store
        .find_open_case_by_reference("ref-2")
        .await
        .map_err(|e| format!("find missing: {e}"))?;
    if missing.is_some() {
        return Err("unknown reference must not match".to_string());
    }
    Ok(())
}

async fn list_cases_applies_filters<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ReturnStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let mut a = make_case("case-a", "ref-a");
    a.serial_number = Some("SN-A".to_string());
    let mut b = make_case("case-b", "ref-b");
    b.serial_number = Some("SN-B".to_string());
    b.stage = Stage::Testing;
    for case in [a, b] {
        store
            .insert_case(case)
            .await
            .map_err(|e| format!("insert: {e}"))?;
    }

    let by_stage = store
        .list_cases(&CaseFilter {
            stage: Some(Stage::Testing),
            ..CaseFilter::default()
        })
        .await
        .map_err(|e| format!("list by stage: {e}"))?;
    if by_stage.len() != 1 || by_stage[0].id != "case-b" {
        return Err(format!("stage filter returned {by_stage:?}"));
    }

    let by_serial = store
        .list_cases(&CaseFilter {
            serial_number: Some("SN-A".to_string()),
            ..CaseFilter::default()
        })
        .await
        .map_err(|e| format!("list by serial: {e}"))?;
    if by_serial.len() != 1 || by_serial[0].id != "case-a" {
        return Err(format!("serial filter returned {by_serial:?}"));
    }

    let all = store
        .list_cases(&CaseFilter::default())
        .await
        .map_err(|e| format!("list all: {e}"))?;
    if all.len() != 2 {
        return Err(format!("expected 2 cases, got {}", all.len()));
    }
    Ok(())
}
