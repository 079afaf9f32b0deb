//! Case stage machine.
//!
//! Pure validation and planning: given the current case and a requested
//! stage, decide whether the move is legal and which columns to write.
//! Persistence, retries and side effects live in [`crate::engine`].

use time::OffsetDateTime;

use rma_storage::{CasePatch, CaseRecord, SchemaCapabilities, Stage};

use crate::error::TransitionError;

/// Ordering and guard rules.
///
/// A move is allowed when the target is at most one step behind the current
/// stage. `received -> repaired_replaced` is the one forward move that is
/// blocked.
pub fn check_transition(from: Stage, to: Stage) -> Result<(), TransitionError> {
    if to.index() + 1 < from.index() {
        return Err(TransitionError::Ordering { from, to });
    }
    if from == Stage::Received && to == Stage::RepairedReplaced {
        return Err(TransitionError::SkippedTesting { from, to });
    }
    Ok(())
}

/// Evidence fields required to enter `to` that are not set on `case`.
///
/// Stage timestamp requirements are only enforced when the store has the
/// stage-timestamp columns; without them they can never be recorded.
pub fn missing_evidence(
    case: &CaseRecord,
    to: Stage,
    caps: SchemaCapabilities,
) -> Vec<&'static str> {
    let mut missing = Vec::new();
    match to {
        Stage::Received => {}
        Stage::Testing => {
            if caps.stage_timestamps && case.received_at.is_none() {
                missing.push("received_at");
            }
        }
        Stage::SentToManufacturer | Stage::RepairedReplaced => {
            if caps.stage_timestamps && case.inspected_at.is_none() {
                missing.push("inspected_at");
            }
        }
        Stage::BackToCustomer => {
            if is_blank(case.outbound_carrier.as_deref()) {
                missing.push("outbound_carrier");
            }
            if is_blank(case.outbound_tracking_number.as_deref()) {
                missing.push("outbound_tracking_number");
            }
        }
    }
    missing
}

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

/// Validate a move and build the patch that applies it.
///
/// Stage-entry timestamps are stamped on first entry only. The patch never
/// contains columns the store lacks under `caps`.
pub fn plan_transition(
    case: &CaseRecord,
    to: Stage,
    now: OffsetDateTime,
    caps: SchemaCapabilities,
) -> Result<CasePatch, TransitionError> {
    check_transition(case.stage, to)?;

    let missing = missing_evidence(case, to, caps);
    if !missing.is_empty() {
        return Err(TransitionError::MissingEvidence { to, missing });
    }

    let mut patch = CasePatch {
        stage: Some(to),
        ..CasePatch::default()
    };

    match to {
        Stage::Received if case.received_at.is_none() => patch.received_at = Some(now),
        Stage::Testing if case.inspected_at.is_none() => patch.inspected_at = Some(now),
        Stage::BackToCustomer => {
            if case.closed_at.is_none() {
                patch.closed_at = Some(now);
            }
            if case.shipped_back_at.is_none() {
                patch.shipped_back_at = Some(now);
            }
        }
        _ => {}
    }

    if !caps.stage_timestamps {
        patch.received_at = None;
        patch.inspected_at = None;
        patch.shipped_back_at = None;
    }

    Ok(patch)
}
