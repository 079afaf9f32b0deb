//! SLA and logistics-exception projections.
//!
//! Read-only: nothing here writes to the store.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use rma_storage::{CaseRecord, ServiceEventRecord, Stage};

use crate::registry::map_stage_to_event_type;

/// How long a case has been in its current stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageAge {
    pub case_id: String,
    pub stage: Stage,
    #[serde(with = "time::serde::rfc3339")]
    pub entered_at: OffsetDateTime,
    pub hours_in_stage: f64,
    pub is_sla_overdue: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogisticsException {
    NeedsInboundTracking,
    NeedsOutboundTracking,
    OutboundInTransit,
    SlaOverdue,
}

impl LogisticsException {
    pub fn as_str(self) -> &'static str {
        match self {
            LogisticsException::NeedsInboundTracking => "needs_inbound_tracking",
            LogisticsException::NeedsOutboundTracking => "needs_outbound_tracking",
            LogisticsException::OutboundInTransit => "outbound_in_transit",
            LogisticsException::SlaOverdue => "sla_overdue",
        }
    }
}

/// A case with at least one logistics exception.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseExceptions {
    pub case: CaseRecord,
    pub exception_types: Vec<LogisticsException>,
}

/// Open, non-terminal case whose SLA deadline has passed.
pub fn is_sla_overdue(case: &CaseRecord, now: OffsetDateTime) -> bool {
    case.stage != Stage::BackToCustomer && case.sla_due_at.is_some_and(|due| due < now)
}

/// Stage-entry time and age for `case`.
///
/// The entry time is the newest ledger event of this case whose type maps
/// from the current stage, falling back to `created_at`. Ages are clamped
/// at zero when the entry time lies in the future.
pub fn time_in_stage(
    case: &CaseRecord,
    events: &[ServiceEventRecord],
    now: OffsetDateTime,
) -> StageAge {
    let wanted = map_stage_to_event_type(case.stage);
    let entered_at = events
        .iter()
        .filter(|e| e.event_type == wanted && e.case_id.as_deref() == Some(case.id.as_str()))
        .map(|e| e.created_at)
        .max()
        .unwrap_or(case.created_at);

    let seconds = (now - entered_at).as_seconds_f64().max(0.0);

    StageAge {
        case_id: case.id.clone(),
        stage: case.stage,
        entered_at,
        hours_in_stage: seconds / 3600.0,
        is_sla_overdue: is_sla_overdue(case, now),
    }
}

/// Every logistics exception that applies to `case`, in a fixed order.
pub fn classify_logistics_exceptions(
    case: &CaseRecord,
    now: OffsetDateTime,
) -> Vec<LogisticsException> {
    let mut found = Vec::new();
    match case.stage {
        Stage::Received if is_blank(case.inbound_tracking_number.as_deref()) => {
            found.push(LogisticsException::NeedsInboundTracking);
        }
        Stage::RepairedReplaced if is_blank(case.outbound_tracking_number.as_deref()) => {
            found.push(LogisticsException::NeedsOutboundTracking);
        }
        Stage::BackToCustomer
            if !is_blank(case.outbound_tracking_number.as_deref())
                && case.delivered_back_at.is_none() =>
        {
            found.push(LogisticsException::OutboundInTransit);
        }
        _ => {}
    }
    if is_sla_overdue(case, now) {
        found.push(LogisticsException::SlaOverdue);
    }
    found
}

/// Count exceptions by type across `reports`.
pub fn summarize_exceptions(reports: &[CaseExceptions]) -> BTreeMap<LogisticsException, usize> {
    let mut counts = BTreeMap::new();
    for report in reports {
        for kind in &report.exception_types {
            *counts.entry(*kind).or_insert(0) += 1;
        }
    }
    counts
}

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}
