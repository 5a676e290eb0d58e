//! Corral enrollment: the coordinator side of cluster certificate
//! bootstrap.
//!
//! A coordinator owns a trust anchor, accepts CSRs from joining nodes,
//! tracks them in an in-memory registry until they are approved, and then
//! issues role-bearing certificates signed by the anchor. It also serves
//! the CA certificate and a fixed set of node tools.

pub mod bootstrap;
pub mod ca;
pub mod cluster_config;
pub mod csr;
pub mod error;
pub mod http;
pub mod protocol;
pub mod registry;
pub mod role;
pub mod service;
pub mod tools;

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;

use corral_crypto::fingerprint::secrets_match;

pub use error::EnrollError;
pub use role::Role;

use csr::CertificateRequest;
use protocol::{RequestSummary, SubmitResponse};
use registry::{SigningRegistry, SigningRequest};
use tools::ToolCatalog;

/// Token used when none is configured.
pub const DEFAULT_TOKEN: &str = "ciao";

/// Static settings the coordinator is started with.
#[derive(Debug, Clone)]
pub struct EnrollConfig {
    /// Shared secret every enrollment URL must carry.
    pub token: String,
    /// Approve new requests as they arrive.
    pub auto_approve: bool,
    /// Anchor file: certificate block then private key block.
    pub anchor_path: PathBuf,
    /// Directory downloadable tools are served from.
    pub tools_dir: PathBuf,
}

// ── Internal shared state ───────────────────────────────────────────

/// Shared state behind `EnrollCore` and the HTTP handlers.
pub(crate) struct EnrollState {
    /// Every read-modify-write of the registry holds this lock throughout.
    pub(crate) registry: tokio::sync::Mutex<SigningRegistry>,
    pub(crate) token: String,
    pub(crate) auto_approve: bool,
    pub(crate) anchor_path: PathBuf,
    pub(crate) tools: ToolCatalog,
}

impl EnrollState {
    fn new(config: EnrollConfig) -> Self {
        Self {
            registry: tokio::sync::Mutex::new(SigningRegistry::new()),
            token: config.token,
            auto_approve: config.auto_approve,
            anchor_path: config.anchor_path,
            tools: ToolCatalog::new(config.tools_dir),
        }
    }

    pub(crate) fn authorize(&self, token: &str) -> Result<(), EnrollError> {
        if secrets_match(token, &self.token) {
            Ok(())
        } else {
            tracing::warn!("Rejected request with invalid enrollment token");
            Err(EnrollError::Forbidden)
        }
    }

    pub(crate) async fn submit(
        &self,
        token: &str,
        role_token: &str,
        body: &[u8],
    ) -> Result<SubmitResponse, EnrollError> {
        self.authorize(token)?;
        let role = Role::from_enrollment_token(role_token).map_err(|e| {
            tracing::warn!(role = role_token, "Rejected signing request with unknown role");
            EnrollError::from(e)
        })?;
        let csr = CertificateRequest::parse(body).map_err(|e| {
            tracing::warn!(error = %e, "Rejected unparseable signing request");
            e
        })?;

        let approved = {
            let mut registry = self.registry.lock().await;
            registry
                .submit(
                    csr.fingerprint(),
                    SigningRequest::new(role, &csr, self.auto_approve),
                )
                .approved()
        };

        tracing::info!(
            fingerprint = csr.fingerprint(),
            role = %role,
            approved,
            "Recorded signing request"
        );
        Ok(SubmitResponse {
            fingerprint: csr.fingerprint().to_string(),
            approved,
        })
    }

    pub(crate) async fn issue(&self, token: &str, fingerprint: &str) -> Result<String, EnrollError> {
        self.authorize(token)?;
        let request = self
            .registry
            .lock()
            .await
            .get(fingerprint)
            .cloned()
            .ok_or_else(|| {
                tracing::debug!(fingerprint, "Certificate fetch for unknown fingerprint");
                EnrollError::UnknownFingerprint(fingerprint.to_string())
            })?;
        if !request.approved() {
            tracing::debug!(fingerprint, "Certificate fetch before approval");
            return Err(EnrollError::NotApproved(fingerprint.to_string()));
        }

        // Read per issuance; a replaced anchor applies without a restart.
        let anchor_pem = self.read_anchor().await?;
        let anchor = ca::Anchor::from_pem(&anchor_pem)?;
        let cert = anchor.sign_csr(request.role(), request.csr_pem())?;
        tracing::info!(fingerprint, role = %request.role(), "Issued certificate");
        Ok(cert)
    }

    pub(crate) async fn approve(&self, fingerprint: &str) -> Result<(), EnrollError> {
        let known = self.registry.lock().await.approve(fingerprint);
        if !known {
            return Err(EnrollError::UnknownFingerprint(fingerprint.to_string()));
        }
        tracing::info!(fingerprint, "Approved signing request");
        Ok(())
    }

    pub(crate) async fn requests(&self) -> Vec<RequestSummary> {
        self.registry
            .lock()
            .await
            .list()
            .into_iter()
            .map(|(fingerprint, request)| RequestSummary {
                fingerprint: fingerprint.to_string(),
                role: request.role().to_string(),
                approved: request.approved(),
                submitted_at: request.submitted_at(),
            })
            .collect()
    }

    pub(crate) async fn ca_cert(&self) -> Result<String, EnrollError> {
        let anchor_pem = self.read_anchor().await?;
        ca::first_certificate_pem(anchor_pem.as_bytes())
    }

    async fn read_anchor(&self) -> Result<String, EnrollError> {
        tokio::fs::read_to_string(&self.anchor_path)
            .await
            .map_err(|e| {
                tracing::error!(path = %self.anchor_path.display(), error = %e, "Cannot read anchor");
                EnrollError::Anchor(format!("{}: {e}", self.anchor_path.display()))
            })
    }
}

// ── EnrollCore: domain facade ─ ──────────────────────────────────────

/// The enrollment domain facade.
///
/// Wraps the shared coordinator state and exposes the enrollment
/// operations and HTTP routes to the binary crate.
#[derive(Clone)]
pub struct EnrollCore {
    state: Arc<EnrollState>,
}

impl EnrollCore {
    pub fn new(config: EnrollConfig) -> Self {
        Self {
            state: Arc::new(EnrollState::new(config)),
        }
    }

    /// Build the HTTP router for this domain.
    pub fn routes(&self) -> Router {
        http::routes(Arc::clone(&self.state))
    }

    /// Record a CSR submitted under `token` for the role named `role_token`.
    pub async fn submit(
        &self,
        token: &str,
        role_token: &str,
        body: &[u8],
    ) -> Result<SubmitResponse, EnrollError> {
        self.state.submit(token, role_token, body).await
    }

    /// Signed certificate for an approved request.
    pub async fn issue(&self, token: &str, fingerprint: &str) -> Result<String, EnrollError> {
        self.state.issue(token, fingerprint).await
    }

    /// Operator approval. Approving an approved request is a no-op.
    pub async fn approve(&self, fingerprint: &str) -> Result<(), EnrollError> {
        self.state.approve(fingerprint).await
    }

    pub async fn requests(&self) -> Vec<RequestSummary> {
        self.state.requests().await
    }

    /// The anchor's certificate block, without the key.
    pub async fn ca_cert(&self) -> Result<String, EnrollError> {
        self.state.ca_cert().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corral_common::test::temp_dir;

    use crate::ca::{create_anchor, generate_csr, inspect_certificate, CertTemplate};

    fn test_core(auto_approve: bool) -> (EnrollCore, PathBuf) {
        let dir = temp_dir("corral-enroll-core");
        let anchor = create_anchor(&CertTemplate::for_host("sched", None).with_role(Role::SCHEDULER))
            .unwrap();
        let anchor_path = dir.join("cert-scheduler-sched.pem");
        std::fs::write(&anchor_path, anchor.anchor_pem).unwrap();
        let core = EnrollCore::new(EnrollConfig {
            token: DEFAULT_TOKEN.to_string(),
            auto_approve,
            anchor_path,
            tools_dir: dir.clone(),
        });
        (core, dir)
    }

    fn node_csr() -> String {
        generate_csr(&CertTemplate::for_host("node", None)).unwrap().csr_pem
    }

    #[tokio::test]
    async fn auto_approved_request_is_issued() {
        let (core, dir) = test_core(true);
        let csr = node_csr();
        let submitted = core.submit("ciao", "controller", csr.as_bytes()).await.unwrap();
        assert!(submitted.approved);

        let cert = core.issue("ciao", &submitted.fingerprint).await.unwrap();
        let info = inspect_certificate(&cert).unwrap();
        assert_eq!(info.role, Role::CONTROLLER);
        assert_eq!(info.fingerprint, submitted.fingerprint);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn manual_approval_gates_issuance() {
        let (core, dir) = test_core(false);
        let submitted = core.submit("ciao", "agent", node_csr().as_bytes()).await.unwrap();
        assert!(!submitted.approved);

        let err = core.issue("ciao", &submitted.fingerprint).await.unwrap_err();
        assert!(matches!(err, EnrollError::NotApproved(_)));

        core.approve(&submitted.fingerprint).await.unwrap();
        core.approve(&submitted.fingerprint).await.unwrap();
        assert!(core.issue("ciao", &submitted.fingerprint).await.is_ok());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn resubmitting_an_approved_key_stays_approved() {
        let (core, dir) = test_core(false);
        let csr = node_csr();
        let first = core.submit("ciao", "agent", csr.as_bytes()).await.unwrap();
        core.approve(&first.fingerprint).await.unwrap();

        let second = core.submit("ciao", "netagent", csr.as_bytes()).await.unwrap();
        assert_eq!(second.fingerprint, first.fingerprint);
        assert!(second.approved);

        let cert = core.issue("ciao", &second.fingerprint).await.unwrap();
        assert_eq!(inspect_certificate(&cert).unwrap().role, Role::NETAGENT);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn wrong_token_is_rejected_before_anything_else() {
        let (core, dir) = test_core(true);
        let err = core.submit("nope", "bogus", b"junk").await.unwrap_err();
        assert!(matches!(err, EnrollError::Forbidden));
        assert!(core.requests().await.is_empty());

        let err = core.issue("nope", "whatever").await.unwrap_err();
        assert!(matches!(err, EnrollError::Forbidden));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn rejected_submissions_leave_registry_untouched() {
        let (core, dir) = test_core(true);
        assert!(matches!(
            core.submit("ciao", "scheduler", node_csr().as_bytes()).await,
            Err(EnrollError::InvalidRole(_))
        ));
        assert!(matches!(
            core.submit("ciao", "agent", b"not a csr").await,
            Err(EnrollError::InvalidCsr(_))
        ));
        assert!(core.requests().await.is_empty());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn approving_unknown_fingerprint_fails() {
        let (core, dir) = test_core(false);
        assert!(matches!(
            core.approve("00ff").await,
            Err(EnrollError::UnknownFingerprint(_))
        ));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn missing_anchor_fails_issuance_and_cacert() {
        let (core, dir) = test_core(true);
        let submitted = core.submit("ciao", "agent", node_csr().as_bytes()).await.unwrap();
        std::fs::remove_file(dir.join("cert-scheduler-sched.pem")).unwrap();

        assert!(matches!(
            core.issue("ciao", &submitted.fingerprint).await,
            Err(EnrollError::Anchor(_))
        ));
        assert!(matches!(core.ca_cert().await, Err(EnrollError::Anchor(_))));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
