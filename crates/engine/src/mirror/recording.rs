//! In-process mirror that records every call.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use rma_storage::CaseRecord;

use super::{TicketMirror, TicketMirrorError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorCall {
    Create {
        case_id: String,
        external_stage: String,
    },
    Update {
        ticket_id: String,
        external_stage: String,
    },
}

/// Mirror that keeps calls in memory and hands out `T-<n>` ticket ids.
///
/// With [`failing`](Self::failing), every call is recorded and then fails.
#[derive(Debug, Default)]
pub struct RecordingTicketMirror {
    calls: Mutex<Vec<MirrorCall>>,
    next_id: AtomicU64,
    failure: Option<String>,
}

impl RecordingTicketMirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(message: &str) -> Self {
        RecordingTicketMirror {
            failure: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<MirrorCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn record(&self, call: MirrorCall) -> Result<(), TicketMirrorError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);
        match &self.failure {
            Some(message) => Err(TicketMirrorError::RequestFailed {
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl TicketMirror for RecordingTicketMirror {
    async fn create_ticket(
        &self,
        case: &CaseRecord,
        external_stage: &str,
    ) -> Result<String, TicketMirrorError> {
        self.record(MirrorCall::Create {
            case_id: case.id.clone(),
            external_stage: external_stage.to_string(),
        })?;
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("T-{n}"))
    }

    async fn update_stage(
        &self,
        ticket_id: &str,
        external_stage: &str,
    ) -> Result<(), TicketMirrorError> {
        self.record(MirrorCall::Update {
            ticket_id: ticket_id.to_string(),
            external_stage: external_stage.to_string(),
        })
    }
}
