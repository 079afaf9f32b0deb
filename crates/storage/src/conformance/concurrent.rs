use std::future::Future;
use std::sync::Arc;

use time::macros::datetime;

use super::{make_case, make_serial_upsert, TestResult};
use crate::record::{CasePatch, Stage};
use crate::{ReturnStore, StorageError};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 50;

pub(super) async fn run_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: ReturnStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "concurrent",
            "concurrent_upserts_create_one_entry",
            concurrent_upserts_create_one_entry(factory).await,
        ),
        TestResult::from_result(
            "concurrent",
            "concurrent_inserts_same_reference_exactly_one_wins",
            concurrent_inserts_same_reference_exactly_one_wins(factory).await,
        ),
        TestResult::from_result(
            "concurrent",
            "concurrent_updates_exactly_one_wins",
            concurrent_updates_exactly_one_wins(factory).await,
        ),
        TestResult::from_result(
            "concurrent",
            "concurrent_increments_all_counted",
            concurrent_increments_all_counted(factory).await,
        ),
    ]
}

// ── Concurrent upsert: one registry entry ───────────────────────────────────

/// N tasks upsert the same serial, each offering a different candidate id.
/// Every task must observe the same entry id and exactly one entry exists.
async fn concurrent_upserts_create_one_entry<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ReturnStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = Arc::new(factory().await);

    let mut handles = Vec::new();
    for i in 0..N {
        let s = store.clone();
        handles.push(tokio::spawn(async move {
            s.upsert_serial(make_serial_upsert(&format!("serial-{i}"), "RACE-1"))
                .await
        }));
    }

    let mut ids = std::collections::BTreeSet::new();
    for handle in handles {
        let entry = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
        ids.insert(entry.id);
    }
    if ids.len() != 1 {
        return Err(format!("expected one entry id, saw {}: {ids:?}", ids.len()));
    }

    let entry = store
        .get_serial("RACE-1")
        .await
        .map_err(|e| format!("get: {e}"))?
        .ok_or_else(|| "entry missing after upserts".to_string())?;
    if !ids.contains(&entry.id) {
        return Err(format!("stored id {} not returned to any caller", entry.id));
    }
    if entry.case_count != 0 {
        return Err(format!("upserts changed count to {}", entry.case_count));
    }
    Ok(())
}

// ── Concurrent insert: exactly one case per open reference ──────────────────

async fn concurrent_inserts_same_reference_exactly_one_wins<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: ReturnStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = Arc::new(factory().await);

    let mut handles = Vec::new();
    for i in 0..N {
        let s = store.clone();
        handles.push(tokio::spawn(async move {
            match s
                .insert_case(make_case(&format!("case-{i}"), "ref-race"))
                .await
            {
                Ok(_) => Ok(true),
                Err(StorageError::DuplicateReference { .. }) => Ok(false),
                Err(e) => Err(e),
            }
        }));
    }

    let mut winners = 0usize;
    for handle in handles {
        let won = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
        if won {
            winners += 1;
        }
    }
    if winners != 1 {
        return Err(format!("expected exactly 1 winner, got {winners}"));
    }
    Ok(())
}

// ── Concurrent update: exactly one wins ─────────────────────────────────────

/// N tasks each try to move the same case from version 0. Exactly one
/// update succeeds; the rest must get ConcurrentConflict.
async fn concurrent_updates_exactly_one_wins<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ReturnStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = Arc::new(factory().await);
    store
        .insert_case(make_case("case-1", "ref-1"))
        .await
        .map_err(|e| format!("insert: {e}"))?;

    let mut handles = Vec::new();
    for _ in 0..N {
        let s = store.clone();
        handles.push(tokio::spawn(async move {
            let patch = CasePatch {
                stage: Some(Stage::Testing),
                ..CasePatch::default()
            };
            match s
                .update_case("case-1", 0, &patch, datetime!(2025-01-02 00:00 UTC))
                .await
            {
                Ok(_) => Ok(true),
                Err(StorageError::ConcurrentConflict { .. }) => Ok(false),
                Err(e) => Err(e),
            }
        }));
    }

    let mut winners = 0usize;
    let mut losers = 0usize;
    for handle in handles {
        let won = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
        if won {
            winners += 1;
        } else {
            losers += 1;
        }
    }

    if winners != 1 {
        return Err(format!("expected exactly 1 winner, got {winners}"));
    }
    if losers != N - 1 {
        return Err(format!("expected {} losers, got {losers}", N - 1));
    }

    let case = store
        .get_case("case-1")
        .await
        .map_err(|e| format!("get: {e}"))?;
    if case.version != 1 {
        return Err(format!("expected version 1, got {}", case.version));
    }
    Ok(())
}

// ── Concurrent increments: no lost updates ──────────────────────────────────

async fn concurrent_increments_all_counted<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ReturnStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = Arc::new(factory().await);
    let entry = store
        .upsert_serial(make_serial_upsert("serial-1", "COUNT-1"))
        .await
        .map_err(|e| format!("upsert: {e}"))?;

    let mut handles = Vec::new();
    for i in 0..N {
        let s = store.clone();
        let serial_id = entry.id.clone();
        handles.push(tokio::spawn(async move {
            s.increment_serial_case_count(&serial_id, &format!("case-{i}"))
                .await
        }));
    }
    for handle in handles {
        handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
    }

    let entry = store
        .get_serial("COUNT-1")
        .await
        .map_err(|e| format!("get: {e}"))?
        .ok_or_else(|| "entry missing".to_string())?;
    if entry.case_count != N as i64 {
        return Err(format!("expected count {N}, got {}", entry.case_count));
    }
    Ok(())
}
