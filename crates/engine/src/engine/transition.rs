use serde::{Deserialize, Serialize};
use serde_json::json;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use rma_storage::{CasePatch, CaseRecord, Priority, ReturnStore, ServiceEventType, Stage, StorageError};

use super::dispatch::{Notification, SideEffectReport};
use super::{Engine, MAX_UPDATE_ATTEMPTS};
use crate::error::{EngineError, TransitionError, ValidationErrors};
use crate::machine::plan_transition;
use crate::registry::{map_stage_to_event_type, SerialHints};

/// Result of a successful case mutation.
#[derive(Debug, Clone, Serialize)]
pub struct CaseUpdate {
    pub case: CaseRecord,
    pub previous_stage: Stage,
    pub side_effects: SideEffectReport,
}

/// Physical arrival of the unit at the service desk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrivalReport {
    #[serde(default)]
    pub inbound_tracking_number: Option<String>,
    #[serde(default)]
    pub condition_report: Option<String>,
    #[serde(default)]
    pub condition_images: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogisticsUpdate {
    #[serde(default)]
    pub inbound_tracking_number: Option<String>,
    #[serde(default)]
    pub outbound_carrier: Option<String>,
    #[serde(default)]
    pub outbound_tracking_number: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub delivered_back_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowUpdate {
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub assigned_to: Option<String>,
    /// Explicit deadline. When absent and `priority` changes, the deadline
    /// is recomputed from the case creation time.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub sla_due_at: Option<OffsetDateTime>,
}

impl<S: ReturnStore + ?Sized> Engine<S> {
    /// Move a case to `requested`.
    ///
    /// Validation always runs against a fresh read and the write is
    /// conditional on that read's version; on a version conflict the case
    /// is re-read and re-validated.
    pub async fn transition(
        &self,
        case_id: &str,
        requested: Stage,
        note: Option<&str>,
    ) -> Result<CaseUpdate, EngineError> {
        let caps = self.caps;
        let (before, after) = self
            .update_with_retry(case_id, |case, now| {
                plan_transition(case, requested, now, caps).map_err(|e| {
                    debug!(case_id = %case.id, from = %case.stage, to = %requested, rule = e.rule(), "transition rejected");
                    EngineError::from(e)
                })
            })
            .await
            .map_err(|e| match e {
                EngineError::Storage(StorageError::DuplicateReference {
                    existing_case_id, ..
                }) => {
                    debug!(case_id = %case_id, existing_case_id = %existing_case_id, "reopen blocked by open case");
                    EngineError::Transition(TransitionError::ReferenceInUse {
                        case_id: case_id.to_string(),
                        existing_case_id,
                    })
                }
                other => other,
            })?;

        info!(case_id = %after.id, from = %before.stage, to = %after.stage, "case transitioned");

        let notes = note.map(str::trim).filter(|n| !n.is_empty()).map(str::to_string);
        let notifications = vec![
            Notification::TouchRegistry {
                hints: SerialHints::default(),
                count_case: false,
            },
            Notification::AppendEvent {
                event_type: map_stage_to_event_type(after.stage),
                summary: format!("stage changed from {} to {}", before.stage, after.stage),
                notes,
                metadata: json!({
                    "previous_stage": before.stage,
                    "next_stage": after.stage,
                }),
            },
            Notification::SyncTicket,
        ];
        let (case, side_effects) = self.dispatch(after, notifications).await;

        Ok(CaseUpdate {
            case,
            previous_stage: before.stage,
            side_effects,
        })
    }

    /// Mark the unit as physically received. The stage is unchanged.
    pub async fn record_arrival(
        &self,
        case_id: &str,
        report: ArrivalReport,
    ) -> Result<CaseUpdate, EngineError> {
        let mut errors = ValidationErrors::new();
        if report.condition_images.iter().any(|url| url.trim().is_empty()) {
            errors.push("condition_images", "must not contain blank entries");
        }
        reject_blank(&mut errors, "inbound_tracking_number", &report.inbound_tracking_number);
        errors.into_result()?;

        let caps = self.caps;
        let (before, after) = self
            .update_with_retry(case_id, |case, now| {
                let mut patch = CasePatch::default();
                if caps.stage_timestamps && case.received_at.is_none() {
                    patch.received_at = Some(now);
                }
                if caps.optional_case_columns {
                    patch.inbound_tracking_number = report.inbound_tracking_number.clone();
                    patch.arrival_condition_report = report.condition_report.clone();
                    if !report.condition_images.is_empty() {
                        patch.arrival_condition_images = Some(report.condition_images.clone());
                    }
                }
                Ok(patch)
            })
            .await?;

        info!(case_id = %after.id, "unit arrival recorded");

        let notifications = vec![
            Notification::TouchRegistry {
                hints: SerialHints::default(),
                count_case: false,
            },
            Notification::AppendEvent {
                event_type: ServiceEventType::Received,
                summary: "unit received".to_string(),
                notes: report.notes.clone(),
                metadata: json!({
                    "inbound_tracking_number": report.inbound_tracking_number,
                    "condition_report": report.condition_report,
                    "image_count": report.condition_images.len(),
                }),
            },
        ];
        let (case, side_effects) = self.dispatch(after, notifications).await;

        Ok(CaseUpdate {
            case,
            previous_stage: before.stage,
            side_effects,
        })
    }

    /// Record tracking details. `delivered_back_at` is kept once set.
    pub async fn update_logistics(
        &self,
        case_id: &str,
        update: LogisticsUpdate,
    ) -> Result<CaseUpdate, EngineError> {
        let mut errors = ValidationErrors::new();
        reject_blank(&mut errors, "inbound_tracking_number", &update.inbound_tracking_number);
        reject_blank(&mut errors, "outbound_carrier", &update.outbound_carrier);
        reject_blank(&mut errors, "outbound_tracking_number", &update.outbound_tracking_number);
        if update == LogisticsUpdate::default() {
            errors.push("logistics", "no fields to update");
        }
        if update.inbound_tracking_number.is_some() && !self.caps.optional_case_columns {
            errors.push("inbound_tracking_number", "is not stored by this backend");
        }
        errors.into_result()?;

        let (before, after) = self
            .update_with_retry(case_id, |case, _now| {
                Ok(CasePatch {
                    inbound_tracking_number: update.inbound_tracking_number.clone(),
                    outbound_carrier: update.outbound_carrier.clone(),
                    outbound_tracking_number: update.outbound_tracking_number.clone(),
                    delivered_back_at: update.delivered_back_at.filter(|_| case.delivered_back_at.is_none()),
                    ..CasePatch::default()
                })
            })
            .await?;

        info!(case_id = %after.id, "logistics updated");
        Ok(CaseUpdate {
            case: after,
            previous_stage: before.stage,
            side_effects: SideEffectReport::default(),
        })
    }

    /// Change priority, assignee or SLA deadline.
    pub async fn update_workflow(
        &self,
        case_id: &str,
        update: WorkflowUpdate,
    ) -> Result<CaseUpdate, EngineError> {
        let mut errors = ValidationErrors::new();
        reject_blank(&mut errors, "assigned_to", &update.assigned_to);
        if update == WorkflowUpdate::default() {
            errors.push("workflow", "no fields to update");
        } else if !self.caps.optional_case_columns {
            errors.push("workflow", "priority, assignee and SLA are not stored by this backend");
        }
        errors.into_result()?;

        let sla = self.config.sla;
        let (before, after) = self
            .update_with_retry(case_id, |case, _now| {
                let sla_due_at = update.sla_due_at.or_else(|| {
                    update
                        .priority
                        .filter(|p| *p != case.priority)
                        .and_then(|p| sla.due_at(p, case.created_at))
                });
                Ok(CasePatch {
                    priority: update.priority,
                    assigned_to: update.assigned_to.as_deref().map(|a| a.trim().to_string()),
                    sla_due_at,
                    ..CasePatch::default()
                })
            })
            .await?;

        info!(case_id = %after.id, priority = %after.priority.as_str(), "workflow updated");
        Ok(CaseUpdate {
            case: after,
            previous_stage: before.stage,
            side_effects: SideEffectReport::default(),
        })
    }

    /// Read, plan and conditionally write a case, retrying on version
    /// conflicts. Returns the case as read and as written.
    ///
    /// An empty patch writes nothing and returns the read case twice.
    pub(crate) async fn update_with_retry<F>(
        &self,
        case_id: &str,
        mut plan: F,
    ) -> Result<(CaseRecord, CaseRecord), EngineError>
    where
        F: FnMut(&CaseRecord, OffsetDateTime) -> Result<CasePatch, EngineError>,
    {
        for attempt in 1..=MAX_UPDATE_ATTEMPTS {
            let current = self.store.get_case(case_id).await?;
            let now = self.clock.now();
            let patch = plan(&current, now)?;
            if patch.is_empty() {
                return Ok((current.clone(), current));
            }

            match self
                .store
                .update_case(case_id, current.version, &patch, now)
                .await
            {
                Ok(updated) => return Ok((current, updated)),
                Err(StorageError::ConcurrentConflict { .. }) => {
                    debug!(case_id = %case_id, attempt, "version conflict, re-reading case");
                }
                Err(e) => return Err(e.into()),
            }
        }

        warn!(case_id = %case_id, attempts = MAX_UPDATE_ATTEMPTS, "giving up after repeated version conflicts");
        Err(EngineError::Conflict {
            case_id: case_id.to_string(),
            attempts: MAX_UPDATE_ATTEMPTS,
        })
    }
}

fn reject_blank(errors: &mut ValidationErrors, field: &'static str, value: &Option<String>) {
    if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
        errors.push(field, "must not be blank");
    }
}
