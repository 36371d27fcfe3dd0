use serde::{Deserialize, Serialize};
use thiserror::Error;

use jobrelay_core::JobId;

/// Terminal state reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

/// Inbound signal that a job reached a terminal state.
///
/// Ephemeral: never persisted by the engine, and possibly delivered more than
/// once for the same job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionNotification {
    pub job_id: JobId,
    pub outcome: Outcome,
    /// Provider operation that produced the job (e.g. `StartLabelDetection`).
    pub source_name: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotificationParseError {
    #[error("malformed provider message: {0}")]
    Malformed(String),

    #[error("job {job_id} reported non-terminal status {status}")]
    NonTerminalStatus { job_id: String, status: String },
}

/// Provider-native message shape (`{"JobId", "Status", "API", "Message"}`).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ProviderMessage {
    job_id: String,
    status: String,
    #[serde(rename = "API", default)]
    api: String,
    #[serde(default)]
    message: Option<String>,
}

impl CompletionNotification {
    pub fn new(job_id: JobId, outcome: Outcome, source_name: impl Into<String>) -> Self {
        Self {
            job_id,
            outcome,
            source_name: source_name.into(),
        }
    }

    pub fn success(job_id: JobId, source_name: impl Into<String>) -> Self {
        Self::new(job_id, Outcome::Success, source_name)
    }

    pub fn failure(
        job_id: JobId,
        source_name: impl Into<String>,
        message: Option<String>,
    ) -> Self {
        Self::new(job_id, Outcome::Failure { message }, source_name)
    }

    /// Parse a provider completion message as relayed by the signalling channel.
    ///
    /// `SUCCEEDED` maps to success, `FAILED`/`ERROR` to failure. Anything else is
    /// not a completion and is rejected.
    pub fn from_provider_message(raw: &str) -> Result<Self, NotificationParseError> {
        let msg: ProviderMessage = serde_json::from_str(raw)
            .map_err(|e| NotificationParseError::Malformed(e.to_string()))?;

        let job_id = JobId::new(msg.job_id.clone())
            .map_err(|e| NotificationParseError::Malformed(e.to_string()))?;

        let outcome = match msg.status.to_ascii_uppercase().as_str() {
            "SUCCEEDED" => Outcome::Success,
            "FAILED" | "ERROR" => Outcome::Failure {
                message: msg.message,
            },
            _ => {
                return Err(NotificationParseError::NonTerminalStatus {
                    job_id: msg.job_id,
                    status: msg.status,
                });
            }
        };

        Ok(Self::new(job_id, outcome, msg.api))
    }
}
