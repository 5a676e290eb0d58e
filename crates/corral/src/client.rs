//! HTTP client for talking to a running coordinator.
//!
//! Uses blocking `ureq`; the join client and admin commands never need an
//! async runtime.

use std::io::Read;
use std::path::Path;
use std::time::Duration;

use corral_common::error::ErrorCode;
use corral_common::persist::write_atomic;
use corral_enroll::protocol::{ApproveResponse, RequestSummary, SubmitResponse};

/// TCP connection timeout for API requests.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Read timeout for API requests.
const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Read timeout for tool downloads.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

// ── Error types ───────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Coordinator not reachable: {0}")]
    Unreachable(String),

    #[error("{error}: {message}")]
    Api { error: String, message: String },

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Invalid response: {0}")]
    Decode(String),
}

impl ClientError {
    /// Wire error code, when the coordinator sent one.
    pub fn api_code(&self) -> Option<ErrorCode> {
        match self {
            Self::Api { error, .. } => {
                serde_json::from_value(serde_json::Value::String(error.clone())).ok()
            }
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// Outcome of polling for a signed certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertFetch {
    Issued(String),
    NotApproved,
    Unknown,
}

// ── Client ────────────────────────────────────────────────────────

pub struct EnrollClient {
    endpoint: String,
    agent: ureq::Agent,
}

impl EnrollClient {
    pub fn new(endpoint: &str) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout_read(READ_TIMEOUT)
            .build();
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            agent,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn ca_cert(&self) -> Result<String> {
        let url = format!("{}/cacert", self.endpoint);
        let resp = self.agent.get(&url).call().map_err(map_error)?;
        resp.into_string()
            .map_err(|e| ClientError::Decode(e.to_string()))
    }

    pub fn submit(&self, token: &str, role: &str, csr_pem: &str) -> Result<SubmitResponse> {
        let url = format!("{}/sign/{token}/{role}", self.endpoint);
        let resp = self
            .agent
            .put(&url)
            .set("Content-Type", "application/x-pem-file")
            .send_string(csr_pem)
            .map_err(map_error)?;
        resp.into_json()
            .map_err(|e| ClientError::Decode(e.to_string()))
    }

    /// Ask for the certificate issued to `fingerprint`.
    ///
    /// `not_approved` and `not_found` are answers, not failures.
    pub fn certificate(&self, token: &str, fingerprint: &str) -> Result<CertFetch> {
        let url = format!("{}/cert/{token}/{fingerprint}", self.endpoint);
        match self.agent.get(&url).call().map_err(map_error) {
            Ok(resp) => resp
                .into_string()
                .map(CertFetch::Issued)
                .map_err(|e| ClientError::Decode(e.to_string())),
            Err(e) => match e.api_code() {
                Some(ErrorCode::NotApproved) => Ok(CertFetch::NotApproved),
                Some(ErrorCode::NotFound) => Ok(CertFetch::Unknown),
                _ => Err(e),
            },
        }
    }

    /// Download a tool binary to `dest` as an executable.
    pub fn download(&self, tool: &str, dest: &Path) -> Result<u64> {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout_read(DOWNLOAD_TIMEOUT)
            .build();
        let url = format!("{}/download/{tool}", self.endpoint);
        let resp = agent.get(&url).call().map_err(map_error)?;

        let mut bytes = Vec::new();
        resp.into_reader()
            .read_to_end(&mut bytes)
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        write_atomic(dest, &bytes, 0o755)
            .map_err(|e| ClientError::Transport(format!("{}: {e}", dest.display())))?;
        Ok(bytes.len() as u64)
    }

    pub fn requests(&self, token: &str) -> Result<Vec<RequestSummary>> {
        let url = format!("{}/requests/{token}", self.endpoint);
        let resp = self.agent.get(&url).call().map_err(map_error)?;
        resp.into_json()
            .map_err(|e| ClientError::Decode(e.to_string()))
    }

    pub fn approve(&self, token: &str, fingerprint: &str) -> Result<ApproveResponse> {
        let url = format!("{}/approve/{token}/{fingerprint}", self.endpoint);
        let resp = self.agent.post(&url).send_bytes(&[]).map_err(map_error)?;
        resp.into_json()
            .map_err(|e| ClientError::Decode(e.to_string()))
    }
}

fn map_error(e: ureq::Error) -> ClientError {
    match e {
        ureq::Error::Status(_status, resp) => {
            let body = resp.into_string().unwrap_or_default();
            if let Ok(json) = serde_json::from_str::<serde_json::Value>(&body) {
                let error = json
                    .get("error")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown")
                    .to_string();
                let message = json
                    .get("message")
                    .and_then(|v| v.as_str())
                    .unwrap_or(&body)
                    .to_string();
                ClientError::Api { error, message }
            } else {
                ClientError::Api {
                    error: "http_error".into(),
                    message: body,
                }
            }
        }
        ureq::Error::Transport(t) => ClientError::Unreachable(t.to_string()),
    }
}
