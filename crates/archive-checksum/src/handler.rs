//! Invocation adapter: JSON event in, HTTP-style response out.
//!
//! Accepts either `{"body": "<json string>"}` or the request object itself.
//! Only the status code reports the outcome; failures carry an opaque body.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info};

use crate::error::{ChecksumError, Result};
use crate::orchestrator::{ReconciliationOrchestrator, RunSummary};

pub const SUCCESS_MESSAGE: &str = "Checksum validation complete";
pub const FAILURE_BODY: &str = "Server Error";
const REDACTED: &str = "<redacted>";

/// Request payload of a validation invocation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ValidationRequest {
    pub archive_id: String,
}

/// Response returned to the invoker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResponse {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl InvocationResponse {
    fn new(status_code: u16, body: String) -> Self {
        let headers = BTreeMap::from([
            ("Cache-Control".to_string(), "no-cache, no-store".to_string()),
            ("Content-Type".to_string(), "application/json".to_string()),
        ]);
        Self {
            status_code,
            headers,
            body,
        }
    }

    pub fn ok() -> Self {
        Self::new(200, json!({ "status": SUCCESS_MESSAGE }).to_string())
    }

    pub fn server_error() -> Self {
        Self::new(500, FAILURE_BODY.to_string())
    }

    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }
}

/// Copy of `value` with every `authorization` key, at any depth, redacted.
pub fn mask_sensitive_data(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, v)| {
                    let masked = if key.eq_ignore_ascii_case("authorization") {
                        Value::String(REDACTED.to_string())
                    } else {
                        mask_sensitive_data(v)
                    };
                    (key.clone(), masked)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(mask_sensitive_data).collect()),
        other => other.clone(),
    }
}

/// Extract the request from an invocation event.
pub fn parse_request(event: &Value) -> Result<ValidationRequest> {
    let payload = match event.get("body") {
        Some(Value::String(body)) => serde_json::from_str(body)?,
        Some(body @ Value::Object(_)) => body.clone(),
        _ => event.clone(),
    };

    let request: ValidationRequest = serde_json::from_value(payload)?;
    if request.archive_id.is_empty() {
        return Err(ChecksumError::InvalidRecord("archive_id is empty".into()));
    }
    Ok(request)
}

/// Run the validation requested by `event`.
pub async fn run_event(
    orchestrator: &ReconciliationOrchestrator,
    event: &Value,
) -> Result<RunSummary> {
    let request = parse_request(event)?;
    orchestrator.run(&request.archive_id).await
}

/// Handle one invocation end to end; never fails.
pub async fn handle_invocation(
    orchestrator: &ReconciliationOrchestrator,
    event: &Value,
) -> InvocationResponse {
    info!("Received event: {}", mask_sensitive_data(event));

    match run_event(orchestrator, event).await {
        Ok(summary) => {
            info!(
                "Archive {} validated: {}/{} tables matched",
                summary.archive_id,
                summary.matched(),
                summary.tables.len()
            );
            InvocationResponse::ok()
        }
        Err(e) => {
            error!("Checksum validation failed: {}", e);
            InvocationResponse::server_error()
        }
    }
}
