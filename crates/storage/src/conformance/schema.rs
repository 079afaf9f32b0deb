use std::future::Future;

use time::macros::datetime;

use super::{make_case, make_full_case, TestResult};
use crate::record::{CasePatch, Stage};
use crate::{ReturnStore, StorageError};

pub(super) async fn run_schema_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: ReturnStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "schema",
            "full_insert_honours_capabilities",
            full_insert_honours_capabilities(factory).await,
        ),
        TestResult::from_result(
            "schema",
            "reduced_insert_always_accepted",
            reduced_insert_always_accepted(factory).await,
        ),
        TestResult::from_result(
            "schema",
            "timestamp_patch_honours_capabilities",
            timestamp_patch_honours_capabilities(factory).await,
        ),
    ]
}

async fn full_insert_honours_capabilities<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ReturnStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let caps = store
        .capabilities()
        .await
        .map_err(|e| format!("capabilities: {e}"))?;
    let full = make_full_case("case-1", "ref-1");
    let result = store.insert_case(full.clone()).await;
    match (caps.optional_case_columns && caps.stage_timestamps, result) {
        (true, Ok(stored)) if stored == full => Ok(()),
        (false, Err(StorageError::UnsupportedColumns { columns, .. })) if !columns.is_empty() => {
            Ok(())
        }
        (supported, other) => Err(format!(
            "full insert with all columns supported={supported} returned {other:?}"
        )),
    }
}

async fn reduced_insert_always_accepted<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ReturnStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let caps = store
        .capabilities()
        .await
        .map_err(|e| format!("capabilities: {e}"))?;
    let reduced = make_full_case("case-1", "ref-1").reduce_to(caps);
    store
        .insert_case(reduced)
        .await
        .map_err(|e| format!("reduced insert: {e}"))?;
    Ok(())
}

async fn timestamp_patch_honours_capabilities<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ReturnStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let caps = store
        .capabilities()
        .await
        .map_err(|e| format!("capabilities: {e}"))?;
    store
        .insert_case(make_case("case-1", "ref-1"))
        .await
        .map_err(|e| format!("insert: {e}"))?;
    let at = datetime!(2025-01-02 00:00 UTC);
    let patch = CasePatch {
        stage: Some(Stage::Testing),
        inspected_at: Some(at),
        ..CasePatch::default()
    };
    let result = store.update_case("case-1", 0, &patch, at).await;
    match (caps.stage_timestamps, result) {
        (true, Ok(updated)) if updated.inspected_at == Some(at) => Ok(()),
        (false, Err(StorageError::UnsupportedColumns { columns, .. }))
            if columns == vec!["inspected_at"] =>
        {
            // The minimal write must still succeed.
            let minimal = CasePatch {
                stage: Some(Stage::Testing),
                ..CasePatch::default()
            };
            store
                .update_case("case-1", 0, &minimal, at)
                .await
                .map_err(|e| format!("minimal update: {e}"))?;
            Ok(())
        }
        (supported, other) => Err(format!(
            "timestamp patch with stage_timestamps={supported} returned {other:?}"
        )),
    }
}
