use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use rma_storage::{
    CaseRecord, ReturnStore, SchemaCapabilities, ServiceEventType, Stage, StorageError,
};

use super::dispatch::{Notification, SideEffectReport};
use super::Engine;
use crate::claim::Claim;
use crate::error::{EngineError, ValidationErrors};
use crate::intake::{normalize_claim, ClaimSource};
use crate::serial::normalize_serial;
use crate::warranty::compute_warranty;

/// Result of [`Engine::create_case`].
#[derive(Debug, Clone, Serialize)]
pub struct CreateOutcome {
    pub case: CaseRecord,
    /// The claim matched an existing open case; nothing was written.
    pub deduped: bool,
    pub side_effects: SideEffectReport,
}

impl<S: ReturnStore + ?Sized> Engine<S> {
    /// Normalize a channel payload and create (or dedup) its case.
    pub async fn intake(&self, source: ClaimSource) -> Result<CreateOutcome, EngineError> {
        let claim = normalize_claim(source, self.lookup.as_ref()).await?;
        self.create_case(claim).await
    }

    /// Create a case for `claim`, or return the open case that already
    /// represents it.
    pub async fn create_case(&self, claim: Claim) -> Result<CreateOutcome, EngineError> {
        claim.validate()?;
        let reference = claim.dedup_key().ok_or_else(|| {
            let mut errors = ValidationErrors::new();
            errors.push("order_number", "claim has no dedup key");
            EngineError::Validation(errors)
        })?;

        if let Some(existing) = self
            .store
            .find_open_case_by_reference(&reference)
            .await
            .map_err(EngineError::CaseCreation)?
        {
            info!(case_id = %existing.id, reference = %reference, "claim deduped onto open case");
            return Ok(CreateOutcome {
                case: existing,
                deduped: true,
                side_effects: SideEffectReport::default(),
            });
        }

        let record = self.build_case(&claim, reference.clone());
        let case = match self.store.insert_case(record).await {
            Ok(case) => case,
            Err(StorageError::DuplicateReference {
                existing_case_id, ..
            }) => {
                // Lost a race with a concurrent create of the same claim.
                let winner = self
                    .store
                    .get_case(&existing_case_id)
                    .await
                    .map_err(EngineError::CaseCreation)?;
                info!(case_id = %winner.id, reference = %reference, "concurrent create deduped");
                return Ok(CreateOutcome {
                    case: winner,
                    deduped: true,
                    side_effects: SideEffectReport::default(),
                });
            }
            Err(e) => return Err(EngineError::CaseCreation(e)),
        };

        info!(
            case_id = %case.id,
            stage = %case.stage,
            serial = case.serial_number.as_deref().unwrap_or("-"),
            warranty = %case.warranty_status,
            "case created"
        );

        let notifications = vec![
            Notification::TouchRegistry {
                hints: claim.serial_hints.clone(),
                count_case: true,
            },
            Notification::AppendEvent {
                event_type: ServiceEventType::ServiceNote,
                summary: "case opened".to_string(),
                notes: claim.issue_summary.clone(),
                metadata: json!({
                    "origin": claim.origin,
                    "external_reference": case.external_reference,
                    "stage": case.stage,
                    "warranty_status": case.warranty_status,
                }),
            },
            Notification::SyncTicket,
        ];
        let (case, side_effects) = self.dispatch(case, notifications).await;

        Ok(CreateOutcome {
            case,
            deduped: false,
            side_effects,
        })
    }

    /// The row to insert, reduced to the columns the store has.
    fn build_case(&self, claim: &Claim, reference: String) -> CaseRecord {
        let now = self.clock.now();
        let warranty = compute_warranty(
            claim.order_processed_at.as_deref(),
            &self.config.warranty,
            now,
        );
        let stage = claim.initial_stage();
        let priority = claim.priority();
        let on_bench = stage > Stage::Received;

        let record = CaseRecord {
            id: Uuid::new_v4().to_string(),
            version: 0,
            order_id: trimmed(claim.order_id.as_deref()),
            order_number: trimmed(claim.order_number.as_deref()),
            external_reference: reference,
            claim_origin: claim.origin,
            inventory_item_id: trimmed(claim.inventory_item_id.as_deref()),
            serial_number: claim.serial_number.as_deref().and_then(normalize_serial),
            customer_name: trimmed(claim.customer_name.as_deref()),
            customer_email: trimmed(claim.customer_email.as_deref()),
            customer_phone: trimmed(claim.customer_phone.as_deref()),
            warranty_status: warranty.status,
            warranty_basis: warranty.basis,
            warranty_expires_at: warranty.expires_at,
            warranty_checked_at: Some(warranty.checked_at),
            warranty_notes: None,
            stage,
            priority,
            assigned_to: trimmed(claim.assigned_to.as_deref()),
            sla_due_at: self.config.sla.due_at(priority, now),
            received_at: (claim.unit_received || on_bench).then_some(now),
            inspected_at: on_bench.then_some(now),
            shipped_back_at: None,
            closed_at: None,
            inbound_tracking_number: trimmed(claim.inbound_tracking_number.as_deref()),
            outbound_carrier: None,
            outbound_tracking_number: None,
            delivered_back_at: None,
            issue_summary: trimmed(claim.issue_summary.as_deref()),
            issue_details: claim.issue_details.clone(),
            arrival_condition_report: None,
            arrival_condition_images: Vec::new(),
            external_ticket_id: None,
            created_at: now,
            updated_at: now,
        };

        if self.caps != SchemaCapabilities::CURRENT {
            debug!(caps = ?self.caps, "writing reduced case row");
        }
        record.reduce_to(self.caps)
    }
}

fn trimmed(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
