use std::future::Future;

use time::macros::datetime;

use super::{make_case, TestResult};
use crate::record::{CasePatch, Stage};
use crate::{ReturnStore, StorageError};

pub(super) async fn run_version_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: ReturnStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "version",
            "update_with_correct_version_increments",
            update_with_correct_version_increments(factory).await,
        ),
        TestResult::from_result(
            "version",
            "stale_version_returns_conflict",
            stale_version_returns_conflict(factory).await,
        ),
        TestResult::from_result(
            "version",
            "conflict_does_not_change_case",
            conflict_does_not_change_case(factory).await,
        ),
        TestResult::from_result(
            "version",
            "update_missing_case_returns_not_found",
            update_missing_case_returns_not_found(factory).await,
        ),
        TestResult::from_result(
            "version",
            "patch_leaves_other_columns_untouched",
            patch_leaves_other_columns_untouched(factory).await,
        ),
    ]
}

fn stage_patch(stage: Stage) -> CasePatch {
    CasePatch {
        stage: Some(stage),
        ..CasePatch::default()
    }
}

async fn update_with_correct_version_increments<S, F, Fut>(factory: &F) -> Result<(), String>
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
    let at = datetime!(2025-01-02 00:00 UTC);
    let updated = store
        .update_case("case-1", 0, &stage_patch(Stage::Testing), at)
        .await
        .map_err(|e| format!("update v0: {e}"))?;
    if updated.version != 1 || updated.stage != Stage::Testing || updated.updated_at != at {
        return Err(format!("unexpected update result: {updated:?}"));
    }
    let updated = store
        .update_case("case-1", 1, &stage_patch(Stage::SentToManufacturer), at)
        .await
        .map_err(|e| format!("update v1: {e}"))?;
    if updated.version != 2 {
        return Err(format!("expected version 2, got {}", updated.version));
    }
    Ok(())
}

async fn stale_version_returns_conflict<S, F, Fut>(factory: &F) -> Result<(), String>
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
    let at = datetime!(2025-01-02 00:00 UTC);
    store
        .update_case("case-1", 0, &stage_patch(Stage::Testing), at)
        .await
        .map_err(|e| format!("first update: {e}"))?;
    match store
        .update_case("case-1", 0, &stage_patch(Stage::Received), at)
        .await
    {
        Err(StorageError::ConcurrentConflict {
            case_id,
            expected_version,
        }) if case_id == "case-1" && expected_version == 0 => Ok(()),
        other => Err(format!("expected ConcurrentConflict, got {other:?}")),
    }
}

async fn conflict_does_not_change_case<S, F, Fut>(factory: &F) -> Result<(), String>
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
    let at = datetime!(2025-01-02 00:00 UTC);
    let _ = store
        .update_case("case-1", 5, &stage_patch(Stage::Testing), at)
        .await;
    let read = store
        .get_case("case-1")
        .await
        .map_err(|e| format!("get: {e}"))?;
    if read.stage != Stage::Received || read.version != 0 {
        return Err(format!("conflict mutated case: {read:?}"));
    }
    Ok(())
}

async fn update_missing_case_returns_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ReturnStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    match store
        .update_case(
            "ghost",
            0,
            &stage_patch(Stage::Testing),
            datetime!(2025-01-02 00:00 UTC),
        )
        .await
    {
        Err(StorageError::CaseNotFound { .. }) => Ok(()),
        other => Err(format!("expected CaseNotFound, got {other:?}")),
    }
}

async fn patch_leaves_other_columns_untouched<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ReturnStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let original = make_case("case-1", "ref-1");
    store
        .insert_case(original.clone())
        .await
        .map_err(|e| format!("insert: {e}"))?;
    let patch = CasePatch {
        outbound_carrier: Some("DHL".to_string()),
        outbound_tracking_number: Some("TRK-9".to_string()),
        ..CasePatch::default()
    };
    let updated = store
        .update_case("case-1", 0, &patch, datetime!(2025-01-02 00:00 UTC))
        .await
        .map_err(|e| format!("update: {e}"))?;
    if updated.outbound_carrier.as_deref() != Some("DHL")
        || updated.outbound_tracking_number.as_deref() != Some("TRK-9")
    {
        return Err(format!("patch not applied: {updated:?}"));
    }
    if updated.stage != original.stage
        || updated.serial_number != original.serial_number
        || updated.customer_email != original.customer_email
    {
        return Err(format!("untouched columns changed: {updated:?}"));
    }
    Ok(())
}
