//! `corral join`: enroll this node with a coordinator.
//!
//! 1. Install the cluster CA certificate.
//! 2. Generate (or reuse) a pending key and CSR for the requested role.
//! 3. Submit the CSR and poll until the certificate is issued.
//! 4. Verify the certificate and install it together with its key.
//! 5. Optionally download and start the role's component.
//!
//! Every step is skipped when its output already exists, unless `--force`.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};

use corral_common::paths;
use corral_common::persist::{path_exists, write_atomic};
use corral_enroll::bootstrap::CA_CERT_FILENAME;
use corral_enroll::ca::{generate_csr, inspect_certificate, CertTemplate};
use corral_enroll::service::{ServiceManager, ServiceSpec, SystemdManager};
use corral_enroll::Role;

use crate::cli::{local_hostname, JoinArgs};
use crate::client::{CertFetch, EnrollClient};

use super::effective_wait;

const POLL_INTERVAL: Duration = Duration::from_secs(2);

const CA_CERT_MODE: u32 = 0o644;
const PRIVATE_MODE: u32 = 0o600;

#[derive(Debug, Clone)]
pub struct JoinOptions {
    pub server: String,
    pub role: Role,
    /// Role as spelled on the wire (`agent`, `dual`, ...).
    pub role_token: String,
    pub token: String,
    pub pki_dir: PathBuf,
    pub work_dir: PathBuf,
    pub hostname: String,
    pub force: bool,
    pub install: bool,
    pub wait: Option<Duration>,
    pub poll_interval: Duration,
}

impl JoinOptions {
    pub fn from_args(args: &JoinArgs) -> anyhow::Result<Self> {
        let role_token = args.role.trim().to_ascii_lowercase();
        let role = Role::from_enrollment_token(&role_token)?;
        Ok(Self {
            server: args.server.clone(),
            role,
            role_token,
            token: args.token.clone(),
            pki_dir: args.pki_dir.clone().unwrap_or_else(paths::system_pki_dir),
            work_dir: args.work_dir.clone().unwrap_or_else(paths::client_work_dir),
            hostname: args.hostname.clone().unwrap_or_else(local_hostname),
            force: args.force,
            install: args.install,
            wait: effective_wait(args.wait),
            poll_interval: POLL_INTERVAL,
        })
    }

    pub fn ca_cert_path(&self) -> PathBuf {
        self.pki_dir.join(CA_CERT_FILENAME)
    }

    pub fn cert_path(&self) -> PathBuf {
        self.pki_dir.join(self.role.cert_file_name(&self.hostname))
    }

    fn pending_paths(&self) -> (PathBuf, PathBuf) {
        let label = self.role.file_label();
        (
            self.work_dir.join(format!("csr-{label}-{}.pem", self.hostname)),
            self.work_dir.join(format!("priv-{label}-{}.pem", self.hostname)),
        )
    }
}

/// What a join run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    pub ca_cert: PathBuf,
    pub cert: PathBuf,
    /// `None` when an existing certificate was kept.
    pub fingerprint: Option<String>,
}

pub fn run(args: &JoinArgs) -> anyhow::Result<()> {
    let opts = JoinOptions::from_args(args)?;
    let outcome = enroll(&opts)?;

    if opts.install {
        let manager = SystemdManager::default();
        install_component(&opts, &EnrollClient::new(&opts.server), &outcome, &manager)?;
    }

    println!("CA certificate: {}", outcome.ca_cert.display());
    println!("Certificate:    {}", outcome.cert.display());
    if let Some(fp) = &outcome.fingerprint {
        println!("Fingerprint:    {fp}");
    }
    Ok(())
}

/// Steps 1 through 4.
pub fn enroll(opts: &JoinOptions) -> anyhow::Result<JoinOutcome> {
    let client = EnrollClient::new(&opts.server);
    let ca_cert = install_ca_cert(&client, opts)?;

    let cert = opts.cert_path();
    if !opts.force && path_exists(&cert)? {
        tracing::info!(cert = %cert.display(), "Certificate already installed, skipping");
        return Ok(JoinOutcome {
            ca_cert,
            cert,
            fingerprint: None,
        });
    }

    let pending = pending_request(opts)?;
    let (fingerprint, cert_pem) = wait_for_certificate(&client, opts, &pending.csr_pem)?;

    let info = inspect_certificate(&cert_pem).context("coordinator returned a bad certificate")?;
    if info.role != opts.role {
        bail!(
            "certificate carries role {} but {} was requested",
            info.role,
            opts.role
        );
    }
    if info.fingerprint != fingerprint {
        bail!("certificate was issued for a different key");
    }

    let mut installed = cert_pem;
    if !installed.ends_with('\n') {
        installed.push('\n');
    }
    installed.push_str(&pending.key_pem);
    write_atomic(&cert, installed.as_bytes(), PRIVATE_MODE)
        .with_context(|| format!("cannot write {}", cert.display()))?;
    tracing::info!(cert = %cert.display(), role = %opts.role, "Installed certificate");

    let (csr_path, key_path) = opts.pending_paths();
    for path in [csr_path, key_path] {
        if let Err(e) = std::fs::remove_file(&path) {
            tracing::warn!(path = %path.display(), error = %e, "Could not remove pending file");
        }
    }

    Ok(JoinOutcome {
        ca_cert,
        cert,
        fingerprint: Some(fingerprint),
    })
}

fn install_ca_cert(client: &EnrollClient, opts: &JoinOptions) -> anyhow::Result<PathBuf> {
    let path = opts.ca_cert_path();
    if !opts.force && path_exists(&path)? {
        tracing::debug!(path = %path.display(), "CA certificate already installed");
        return Ok(path);
    }

    let pem = client
        .ca_cert()
        .with_context(|| format!("cannot fetch CA certificate from {}", client.endpoint()))?;
    let info = inspect_certificate(&pem).context("coordinator returned a bad CA certificate")?;
    if !info.is_ca {
        bail!("coordinator CA certificate is not a CA");
    }
    write_atomic(&path, pem.as_bytes(), CA_CERT_MODE)
        .with_context(|| format!("cannot write {}", path.display()))?;
    tracing::info!(path = %path.display(), "Installed CA certificate");
    Ok(path)
}

struct PendingRequest {
    csr_pem: String,
    key_pem: String,
}

/// Reuse the pending key pair from an interrupted run, or make a new one.
fn pending_request(opts: &JoinOptions) -> anyhow::Result<PendingRequest> {
    let (csr_path, key_path) = opts.pending_paths();

    if !opts.force && path_exists(&csr_path)? && path_exists(&key_path)? {
        tracing::info!(csr = %csr_path.display(), "Reusing pending signing request");
        return Ok(PendingRequest {
            csr_pem: std::fs::read_to_string(&csr_path)?,
            key_pem: std::fs::read_to_string(&key_path)?,
        });
    }

    let generated = generate_csr(&CertTemplate::for_host(&opts.hostname, None).with_role(opts.role))?;
    write_atomic(&key_path, generated.key_pem.as_bytes(), PRIVATE_MODE)
        .with_context(|| format!("cannot write {}", key_path.display()))?;
    write_atomic(&csr_path, generated.csr_pem.as_bytes(), PRIVATE_MODE)
        .with_context(|| format!("cannot write {}", csr_path.display()))?;
    Ok(PendingRequest {
        csr_pem: generated.csr_pem,
        key_pem: generated.key_pem,
    })
}

/// Submit the CSR and poll until a certificate comes back.
///
/// A coordinator that forgot the request (it restarted) gets it again.
fn wait_for_certificate(
    client: &EnrollClient,
    opts: &JoinOptions,
    csr_pem: &str,
) -> anyhow::Result<(String, String)> {
    let started = Instant::now();
    let mut submitted = client.submit(&opts.token, &opts.role_token, csr_pem)?;
    tracing::info!(
        fingerprint = %submitted.fingerprint,
        approved = submitted.approved,
        "Submitted signing request"
    );
    let mut announced = submitted.approved;

    loop {
        match client.certificate(&opts.token, &submitted.fingerprint)? {
            CertFetch::Issued(pem) => return Ok((submitted.fingerprint, pem)),
            CertFetch::NotApproved => {
                if !announced {
                    tracing::info!(
                        fingerprint = %submitted.fingerprint,
                        "Waiting for approval: corral approve {}",
                        submitted.fingerprint
                    );
                    announced = true;
                }
            }
            CertFetch::Unknown => {
                tracing::warn!("Coordinator lost the signing request, resubmitting");
                submitted = client.submit(&opts.token, &opts.role_token, csr_pem)?;
            }
        }

        if let Some(wait) = opts.wait {
            if started.elapsed() >= wait {
                bail!(
                    "request {} was not approved within {}s",
                    submitted.fingerprint,
                    wait.as_secs()
                );
            }
        }
        std::thread::sleep(opts.poll_interval);
    }
}

/// Component a role runs, if any.
pub fn component_for(role: Role) -> Option<&'static str> {
    if role == Role::CONTROLLER {
        Some("ciao-controller")
    } else if role.contains(Role::AGENT) || role.contains(Role::NETAGENT) {
        Some("ciao-launcher")
    } else {
        None
    }
}

/// Step 5: download the role's component and run it as a service.
pub fn install_component(
    opts: &JoinOptions,
    client: &EnrollClient,
    outcome: &JoinOutcome,
    manager: &dyn ServiceManager,
) -> anyhow::Result<()> {
    let Some(tool) = component_for(opts.role) else {
        tracing::info!(role = %opts.role, "No component to install for role");
        return Ok(());
    };

    let download = opts.work_dir.join(tool);
    let size = client
        .download(tool, &download)
        .with_context(|| format!("cannot download {tool}"))?;
    tracing::info!(tool, bytes = size, "Downloaded component");

    manager.install(&ServiceSpec {
        name: tool.to_string(),
        source: download,
        ca_cert: outcome.ca_cert.clone(),
        cert: outcome.cert.clone(),
    })?;
    Ok(())
}
