use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use rma_storage::{
    CasePatch, ReturnStore, ServiceEventRecord, ServiceEventType, WarrantyBasis, WarrantyStatus,
};

use super::dispatch::Notification;
use super::transition::CaseUpdate;
use super::Engine;
use crate::error::{EngineError, ValidationErrors};
use crate::registry::{new_service_event, upsert_registry, SerialHints};

/// Operator override of the automatic warranty snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarrantyDecision {
    pub status: WarrantyStatus,
    pub basis: WarrantyBasis,
    #[serde(default)]
    pub notes: Option<String>,
}

impl<S: ReturnStore + ?Sized> Engine<S> {
    /// Overwrite the warranty snapshot and log the decision to the ledger.
    pub async fn record_warranty_decision(
        &self,
        case_id: &str,
        decision: WarrantyDecision,
    ) -> Result<CaseUpdate, EngineError> {
        if !self.caps.optional_case_columns {
            let mut errors = ValidationErrors::new();
            errors.push("warranty_status", "is not stored by this backend");
            return Err(errors.into());
        }

        let notes = decision
            .notes
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);

        let (before, after) = self
            .update_with_retry(case_id, |_case, now| {
                Ok(CasePatch {
                    warranty_status: Some(decision.status),
                    warranty_basis: Some(decision.basis),
                    warranty_notes: notes.clone(),
                    warranty_checked_at: Some(now),
                    ..CasePatch::default()
                })
            })
            .await?;

        info!(
            case_id = %after.id,
            from = %before.warranty_status,
            to = %after.warranty_status,
            "warranty decision recorded"
        );

        let notifications = vec![
            Notification::TouchRegistry {
                hints: SerialHints::default(),
                count_case: false,
            },
            Notification::AppendEvent {
                event_type: ServiceEventType::WarrantyDecision,
                summary: format!(
                    "warranty {} -> {}",
                    before.warranty_status, after.warranty_status
                ),
                notes,
                metadata: json!({
                    "previous_status": before.warranty_status,
                    "status": after.warranty_status,
                    "basis": after.warranty_basis,
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

    /// Append a free-form note to the ledger of the case's serial.
    ///
    /// Unlike the post-commit ledger writes, the note is the primary result
    /// here, so failures are returned.
    pub async fn add_service_note(
        &self,
        case_id: &str,
        summary: &str,
        notes: Option<&str>,
    ) -> Result<ServiceEventRecord, EngineError> {
        let mut errors = ValidationErrors::new();
        if summary.trim().is_empty() {
            errors.push("summary", "must not be blank");
        }
        errors.into_result()?;

        let case = self.store.get_case(case_id).await?;
        let Some(serial) = case.serial_number.as_deref() else {
            let mut errors = ValidationErrors::new();
            errors.push("serial_number", "case has no serial number");
            return Err(errors.into());
        };

        let now = self.clock.now();
        let entry = upsert_registry(self.store.as_ref(), serial, &SerialHints::default(), now)
            .await?
            .ok_or_else(|| EngineError::NotFound {
                kind: "serial",
                id: serial.to_string(),
            })?;

        let event = new_service_event(
            &entry.id,
            Some(&case.id),
            ServiceEventType::ServiceNote,
            summary.trim(),
            notes.map(str::to_string),
            json!({ "stage": case.stage }),
            now,
        );
        self.store.append_service_event(event.clone()).await?;
        info!(case_id = %case.id, serial = %entry.serial_number, "service note added");
        Ok(event)
    }
}
