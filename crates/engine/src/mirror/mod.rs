//! One-way, best-effort mirror of case stage into an external ticketing
//! system.
//!
//! - [`TicketMirror`] is the protocol seam (one call per remote operation).
//! - [`TicketSync`] owns the stage mapping and turns every outcome, including
//!   "not configured", into a [`TicketSyncStatus`] instead of an error.

pub mod http;
pub mod recording;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use rma_storage::{CaseRecord, Stage};

pub use http::HttpTicketMirror;
pub use recording::{MirrorCall, RecordingTicketMirror};

// ──────────────────────────────────────────────
// TicketMirrorError
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TicketMirrorError {
    /// Missing base URL, credentials, etc.
    NotConfigured { message: String },
    /// The remote call failed or returned an error status.
    RequestFailed { message: String },
    /// The remote answered but the body was not understood.
    InvalidResponse { message: String },
}

impl fmt::Display for TicketMirrorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TicketMirrorError::NotConfigured { message } => {
                write!(f, "ticket mirror not configured: {}", message)
            }
            TicketMirrorError::RequestFailed { message } => {
                write!(f, "ticket request failed: {}", message)
            }
            TicketMirrorError::InvalidResponse { message } => {
                write!(f, "invalid ticket response: {}", message)
            }
        }
    }
}

impl std::error::Error for TicketMirrorError {}

// ──────────────────────────────────────────────
// TicketMirror
// ──────────────────────────────────────────────

/// Remote ticketing operations.
#[async_trait]
pub trait TicketMirror: Send + Sync {
    /// Open a ticket for `case` in `external_stage`; returns the ticket id.
    async fn create_ticket(
        &self,
        case: &CaseRecord,
        external_stage: &str,
    ) -> Result<String, TicketMirrorError>;

    /// Move an existing ticket to `external_stage`.
    async fn update_stage(
        &self,
        ticket_id: &str,
        external_stage: &str,
    ) -> Result<(), TicketMirrorError>;
}

// ──────────────────────────────────────────────
// TicketSyncStatus
// ──────────────────────────────────────────────

/// Outcome of one sync attempt, reported alongside the primary result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TicketSyncStatus {
    pub attempted: bool,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket_id: Option<String>,
    /// True when this attempt opened the ticket.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub created: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TicketSyncStatus {
    pub fn not_attempted() -> Self {
        Self::default()
    }
}

// ──────────────────────────────────────────────
// TicketSync
// ──────────────────────────────────────────────

/// A mirror together with its stage → external stage mapping.
#[derive(Clone)]
pub struct TicketSync {
    mirror: Arc<dyn TicketMirror>,
    stages: BTreeMap<Stage, String>,
}

impl TicketSync {
    pub fn new(mirror: Arc<dyn TicketMirror>, stages: BTreeMap<Stage, String>) -> Self {
        TicketSync { mirror, stages }
    }

    pub fn external_stage(&self, stage: Stage) -> Option<&str> {
        self.stages.get(&stage).map(String::as_str)
    }

    /// Mirror `case.stage`. Creates the ticket when the case has none yet.
    ///
    /// Never fails: an unmapped stage is "not attempted", a remote failure
    /// is "attempted, not successful".
    pub async fn sync(&self, case: &CaseRecord) -> TicketSyncStatus {
        let Some(external) = self.external_stage(case.stage) else {
            debug!(case_id = %case.id, stage = %case.stage, "stage not mapped, ticket sync skipped");
            return TicketSyncStatus::not_attempted();
        };

        match &case.external_ticket_id {
            Some(ticket_id) => match self.mirror.update_stage(ticket_id, external).await {
                Ok(()) => TicketSyncStatus {
                    attempted: true,
                    success: true,
                    ticket_id: Some(ticket_id.clone()),
                    created: false,
                    error: None,
                },
                Err(e) => {
                    warn!(case_id = %case.id, ticket_id = %ticket_id, error = %e, "ticket stage update failed");
                    TicketSyncStatus {
                        attempted: true,
                        success: false,
                        ticket_id: Some(ticket_id.clone()),
                        created: false,
                        error: Some(e.to_string()),
                    }
                }
            },
            None => match self.mirror.create_ticket(case, external).await {
                Ok(ticket_id) => TicketSyncStatus {
                    attempted: true,
                    success: true,
                    ticket_id: Some(ticket_id),
                    created: true,
                    error: None,
                },
                Err(e) => {
                    warn!(case_id = %case.id, error = %e, "ticket creation failed");
                    TicketSyncStatus {
                        attempted: true,
                        success: false,
                        ticket_id: None,
                        created: false,
                        error: Some(e.to_string()),
                    }
                }
            },
        }
    }
}

impl fmt::Debug for TicketSync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TicketSync")
            .field("stages", &self.stages)
            .finish_non_exhaustive()
    }
}
