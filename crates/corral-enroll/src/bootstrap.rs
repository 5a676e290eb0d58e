//! Coordinator bootstrap: CA material and the managed scheduler.
//!
//! Runs before the enrollment listener opens. The anchor file
//! (`cert-scheduler-<host>.pem`, certificate then key) is both the CA and
//! the scheduler's own identity. `CAcert.pem` is its certificate alone.
//! Callers decide what a failure means; nothing here exits the process.

use std::net::IpAddr;
use std::path::{Path, PathBuf};

use corral_common::persist::{path_exists, write_atomic};

use crate::ca::{self, Anchor, CertTemplate};
use crate::cluster_config::{ClusterConfig, ClusterConfigParams, CONFIG_FILENAME};
use crate::error::EnrollError;
use crate::role::Role;
use crate::service::{ServiceManager, ServiceSpec};

pub const CA_CERT_FILENAME: &str = "CAcert.pem";
pub const SCHEDULER_SERVICE: &str = "ciao-scheduler";

const ANCHOR_MODE: u32 = 0o600;
const CA_CERT_MODE: u32 = 0o644;
const CONFIG_MODE: u32 = 0o644;

#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    pub pki_dir: PathBuf,
    pub hostname: String,
    pub mgmt_ip: Option<IpAddr>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaPaths {
    pub anchor: PathBuf,
    pub ca_cert: PathBuf,
}

impl CaPaths {
    pub fn for_host(pki_dir: &Path, hostname: &str) -> Self {
        Self {
            anchor: pki_dir.join(Role::SCHEDULER.cert_file_name(hostname)),
            ca_cert: pki_dir.join(CA_CERT_FILENAME),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapOutcome {
    pub paths: CaPaths,
    /// `false` when existing material was found and left untouched.
    pub created: bool,
}

/// Make sure CA material exists, minting it on first run.
///
/// When both files are already present the anchor is validated and left
/// as it is; a CA copy that does not match the anchor's certificate is
/// rewritten from it. Otherwise a fresh anchor is generated and both files
/// are (re)written.
pub fn ensure_ca(config: &BootstrapConfig) -> Result<BootstrapOutcome, EnrollError> {
    let paths = CaPaths::for_host(&config.pki_dir, &config.hostname);

    if path_exists(&paths.anchor)? && path_exists(&paths.ca_cert)? {
        let anchor = Anchor::load(&paths.anchor)?;
        sync_ca_copy(&paths, &anchor)?;
        tracing::info!(
            anchor = %paths.anchor.display(),
            "CA material already installed, skipping generation"
        );
        return Ok(BootstrapOutcome {
            paths,
            created: false,
        });
    }

    let template =
        CertTemplate::for_host(&config.hostname, config.mgmt_ip).with_role(Role::SCHEDULER);
    let pair = ca::create_anchor(&template)?;

    write_atomic(&paths.anchor, pair.anchor_pem.as_bytes(), ANCHOR_MODE)?;
    if let Err(e) = write_atomic(&paths.ca_cert, pair.ca_cert_pem.as_bytes(), CA_CERT_MODE) {
        // Never leave an anchor behind without its CA copy.
        if let Err(cleanup) = std::fs::remove_file(&paths.anchor) {
            tracing::warn!(
                path = %paths.anchor.display(),
                error = %cleanup,
                "Could not remove anchor after failed CA write"
            );
        }
        return Err(e.into());
    }

    tracing::info!(
        anchor = %paths.anchor.display(),
        ca_cert = %paths.ca_cert.display(),
        "Created CA material"
    );
    Ok(BootstrapOutcome {
        paths,
        created: true,
    })
}

/// Rewrite `CAcert.pem` unless it already holds the anchor's certificate.
fn sync_ca_copy(paths: &CaPaths, anchor: &Anchor) -> Result<(), EnrollError> {
    let existing = std::fs::read(&paths.ca_cert)?;
    match ca::first_certificate_pem(&existing) {
        Ok(pem) if pem == anchor.cert_pem() => return Ok(()),
        Ok(_) => tracing::warn!(
            ca_cert = %paths.ca_cert.display(),
            "CA certificate does not match the anchor, rewriting"
        ),
        Err(e) => tracing::warn!(
            ca_cert = %paths.ca_cert.display(),
            error = %e,
            "CA certificate is unreadable, rewriting"
        ),
    }
    write_atomic(&paths.ca_cert, anchor.cert_pem().as_bytes(), CA_CERT_MODE)?;
    Ok(())
}

/// Where the scheduler install takes its inputs from.
#[derive(Debug, Clone)]
pub struct SchedulerInstall {
    pub config_dir: PathBuf,
    pub tools_dir: PathBuf,
    pub params: ClusterConfigParams,
}

/// Write the cluster document and (re)start the scheduler service.
///
/// Returns the path of the written document.
pub fn install_scheduler(
    paths: &CaPaths,
    install: &SchedulerInstall,
    manager: &dyn ServiceManager,
) -> Result<PathBuf, EnrollError> {
    let config_path = install.config_dir.join(CONFIG_FILENAME);
    let document = ClusterConfig::new(&install.params, &config_path).to_yaml()?;
    write_atomic(&config_path, document.as_bytes(), CONFIG_MODE)?;
    tracing::info!(path = %config_path.display(), "Wrote cluster configuration");

    manager.install(&ServiceSpec {
        name: SCHEDULER_SERVICE.to_string(),
        source: install.tools_dir.join(SCHEDULER_SERVICE),
        ca_cert: paths.ca_cert.clone(),
        cert: paths.anchor.clone(),
    })?;
    Ok(config_path)
}
