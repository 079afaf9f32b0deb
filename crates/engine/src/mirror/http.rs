//! HTTP ticket mirror.
//!
//! Uses `ureq` (sync) wrapped in `tokio::task::spawn_blocking` so the async
//! runtime is never blocked. Every call carries a global timeout; a timeout
//! surfaces as an ordinary [`TicketMirrorError::RequestFailed`].

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use rma_storage::CaseRecord;

use super::{TicketMirror, TicketMirrorError};
use crate::config::TicketMirrorConfig;

/// Environment variable consulted when the config carries no API token.
pub const TOKEN_ENV: &str = "RMA_TICKET_API_TOKEN";

/// Mirror speaking JSON to `{base_url}/tickets`.
///
/// - `POST {base_url}/tickets` opens a ticket; the response carries `id`
/// - `PATCH {base_url}/tickets/{id}` moves it to a new stage
pub struct HttpTicketMirror {
    base_url: String,
    api_token: Option<String>,
    timeout: Duration,
}

impl HttpTicketMirror {
    pub fn new(base_url: &str, api_token: Option<String>, timeout: Duration) -> Self {
        HttpTicketMirror {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
            timeout,
        }
    }

    /// Build from config. The token falls back to `RMA_TICKET_API_TOKEN`.
    pub fn from_config(config: &TicketMirrorConfig) -> Result<Self, TicketMirrorError> {
        let base_url = config
            .base_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| TicketMirrorError::NotConfigured {
                message: "missing base_url".to_string(),
            })?;
        let api_token = config
            .api_token
            .clone()
            .or_else(|| std::env::var(TOKEN_ENV).ok())
            .filter(|t| !t.trim().is_empty());
        Ok(Self::new(
            base_url,
            api_token,
            Duration::from_secs(config.timeout_secs),
        ))
    }

    pub fn tickets_url(&self) -> String {
        format!("{}/tickets", self.base_url)
    }

    pub fn ticket_url(&self, ticket_id: &str) -> String {
        format!("{}/tickets/{}", self.base_url, ticket_id)
    }

    fn agent(timeout: Duration) -> ureq::Agent {
        ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into()
    }
}

/// Request body for ticket creation.
pub fn ticket_payload(case: &CaseRecord, external_stage: &str) -> serde_json::Value {
    let subject = case
        .issue_summary
        .clone()
        .unwrap_or_else(|| format!("Return case {}", case.id));
    json!({
        "case_id": case.id,
        "external_reference": case.external_reference,
        "stage": external_stage,
        "subject": subject,
        "customer_email": case.customer_email,
        "serial_number": case.serial_number,
        "priority": case.priority.as_str(),
    })
}

/// Ticket id from a creation response; accepts string or numeric ids.
pub fn ticket_id_from_response(body: &serde_json::Value) -> Option<String> {
    match body.get("id")? {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl TicketMirror for HttpTicketMirror {
    async fn create_ticket(
        &self,
        case: &CaseRecord,
        external_stage: &str,
    ) -> Result<String, TicketMirrorError> {
        let url = self.tickets_url();
        let payload = ticket_payload(case, external_stage);
        let auth_token = self.api_token.clone();
        let timeout = self.timeout;

        tokio::task::spawn_blocking(move || {
            let agent = Self::agent(timeout);
            let mut request = agent.post(&url);
            if let Some(ref token) = auth_token {
                request = request.header("Authorization", &format!("Bearer {}", token));
            }

            let response =
                request
                    .send_json(&payload)
                    .map_err(|e| TicketMirrorError::RequestFailed {
                        message: e.to_string(),
                    })?;

            let body: serde_json::Value =
                response
                    .into_body()
                    .read_json()
                    .map_err(|e| TicketMirrorError::InvalidResponse {
                        message: format!("failed to parse response as JSON: {}", e),
                    })?;

            ticket_id_from_response(&body).ok_or_else(|| TicketMirrorError::InvalidResponse {
                message: "response has no ticket id".to_string(),
            })
        })
        .await
        .map_err(|e| TicketMirrorError::RequestFailed {
            message: format!("task join error: {}", e),
        })?
    }

    async fn update_stage(
        &self,
        ticket_id: &str,
        external_stage: &str,
    ) -> Result<(), TicketMirrorError> {
        let url = self.ticket_url(ticket_id);
        let payload = json!({ "stage": external_stage });
        let auth_token = self.api_token.clone();
        let timeout = self.timeout;

        tokio::task::spawn_blocking(move || {
            let agent = Self::agent(timeout);
            let mut request = agent.patch(&url);
            if let Some(ref token) = auth_token {
                request = request.header("Authorization", &format!("Bearer {}", token));
            }
            request
                .send_json(&payload)
                .map(|_| ())
                .map_err(|e| TicketMirrorError::RequestFailed {
                    message: e.to_string(),
                })
        })
        .await
        .map_err(|e| TicketMirrorError::RequestFailed {
            message: format!("task join error: {}", e),
        })?
    }
}
