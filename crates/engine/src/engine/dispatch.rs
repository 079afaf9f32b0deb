//! Post-commit side effects.
//!
//! Mutating operations emit a list of [`Notification`]s after the primary
//! write succeeds. The dispatcher runs them in order, catching and recording
//! each failure independently; nothing here can fail or roll back the
//! primary mutation.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use rma_storage::{CasePatch, CaseRecord, ReturnStore, SerialRecord, ServiceEventType};

use super::Engine;
use crate::mirror::TicketSyncStatus;
use crate::registry::{new_service_event, upsert_registry, SerialHints};

/// One best-effort follow-up to a committed case write.
#[derive(Debug, Clone)]
pub(crate) enum Notification {
    /// Upsert the registry entry for the case serial. `count_case` also
    /// increments the entry's case count.
    TouchRegistry { hints: SerialHints, count_case: bool },
    /// Append a ledger event for the case serial.
    AppendEvent {
        event_type: ServiceEventType,
        summary: String,
        notes: Option<String>,
        metadata: Value,
    },
    /// Mirror the case stage to the ticketing system.
    SyncTicket,
}

/// Outcome of one auxiliary step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuxStatus {
    pub attempted: bool,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuxStatus {
    fn succeeded(&mut self) {
        self.attempted = true;
        if self.error.is_none() {
            self.success = true;
        }
    }

    fn failed(&mut self, error: String) {
        self.attempted = true;
        self.success = false;
        self.error = Some(error);
    }
}

/// Auxiliary status reported alongside a successful primary result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SideEffectReport {
    pub registry: AuxStatus,
    pub ledger: AuxStatus,
    pub ticket: TicketSyncStatus,
}

impl SideEffectReport {
    /// True when every attempted step succeeded.
    pub fn all_ok(&self) -> bool {
        [&self.registry, &self.ledger]
            .iter()
            .all(|s| !s.attempted || s.success)
            && (!self.ticket.attempted || self.ticket.success)
    }
}

impl<S: ReturnStore + ?Sized> Engine<S> {
    /// Run `notifications` for the committed `case`.
    ///
    /// Returns the case as it stands afterwards (a created ticket id is
    /// written back) and the per-step report.
    pub(crate) async fn dispatch(
        &self,
        mut case: CaseRecord,
        notifications: Vec<Notification>,
    ) -> (CaseRecord, SideEffectReport) {
        let mut report = SideEffectReport::default();
        let mut entry: Option<SerialRecord> = None;

        for notification in notifications {
            match notification {
                Notification::TouchRegistry { hints, count_case } => {
                    let Some(serial) = case.serial_number.clone() else {
                        continue;
                    };
                    let now = self.clock.now();
                    match upsert_registry(self.store.as_ref(), &serial, &hints, now).await {
                        Ok(Some(record)) if count_case => {
                            match self
                                .store
                                .increment_serial_case_count(&record.id, &case.id)
                                .await
                            {
                                Ok(counted) => {
                                    entry = Some(counted);
                                    report.registry.succeeded();
                                }
                                Err(e) => {
                                    warn!(case_id = %case.id, serial = %serial, error = %e, "registry case count failed");
                                    entry = Some(record);
                                    report.registry.failed(e.to_string());
                                }
                            }
                        }
                        Ok(Some(record)) => {
                            entry = Some(record);
                            report.registry.succeeded();
                        }
                        Ok(None) => {}
                        Err(e) => {
                            warn!(case_id = %case.id, serial = %serial, error = %e, "registry upsert failed");
                            report.registry.failed(e.to_string());
                        }
                    }
                }

                Notification::AppendEvent {
                    event_type,
                    summary,
                    notes,
                    metadata,
                } => {
                    let Some(serial) = &entry else {
                        debug!(case_id = %case.id, event = %event_type, "no registry entry, ledger skipped");
                        continue;
                    };
                    let event = new_service_event(
                        &serial.id,
                        Some(&case.id),
                        event_type,
                        summary,
                        notes,
                        metadata,
                        self.clock.now(),
                    );
                    match self.store.append_service_event(event).await {
                        Ok(()) => report.ledger.succeeded(),
                        Err(e) => {
                            warn!(case_id = %case.id, event = %event_type, error = %e, "ledger append failed");
                            report.ledger.failed(e.to_string());
                        }
                    }
                }

                Notification::SyncTicket => {
                    let Some(tickets) = &self.tickets else {
                        continue;
                    };
                    let mut status = tickets.sync(&case).await;
                    if status.created {
                        if let Some(ticket_id) = status.ticket_id.clone() {
                            match self.store_ticket_id(&case, ticket_id).await {
                                Ok(updated) => case = updated,
                                Err(message) => {
                                    warn!(case_id = %case.id, error = %message, "ticket id not stored");
                                    status.error = Some(message);
                                }
                            }
                        }
                    }
                    report.ticket = status;
                }
            }
        }

        (case, report)
    }

    /// Persist a freshly created ticket id on the case.
    async fn store_ticket_id(
        &self,
        case: &CaseRecord,
        ticket_id: String,
    ) -> Result<CaseRecord, String> {
        if !self.caps.optional_case_columns {
            return Err("store has no external_ticket_id column".to_string());
        }
        let patch = CasePatch {
            external_ticket_id: Some(ticket_id),
            ..CasePatch::default()
        };
        self.store
            .update_case(&case.id, case.version, &patch, self.clock.now())
            .await
            .map_err(|e| format!("ticket created but id not stored: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_with_nothing_attempted_is_ok() {
        assert!(SideEffectReport::default().all_ok());
    }

    #[test]
    fn failed_step_is_not_ok() {
        let mut report = SideEffectReport::default();
        report.registry.succeeded();
        report.ledger.failed("disk full".to_string());
        assert!(!report.all_ok());
        assert_eq!(report.ledger.error.as_deref(), Some("disk full"));
    }

    #[test]
    fn later_success_does_not_hide_failure() {
        let mut status = AuxStatus::default();
        status.failed("boom".to_string());
        status.succeeded();
        assert!(status.attempted);
        assert!(!status.success);
    }

    #[test]
    fn report_serializes_compactly() {
        let json = serde_json::to_value(SideEffectReport::default()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "registry": { "attempted": false, "success": false },
                "ledger": { "attempted": false, "success": false },
                "ticket": { "attempted": false, "success": false }
            })
        );
    }
}
