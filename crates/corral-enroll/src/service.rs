//! Managed service installation.
//!
//! Cluster components (the scheduler on the coordinator, the launcher or
//! controller on joining nodes) run as systemd units started with the
//! node's CA certificate and identity certificate.

use std::path::{Path, PathBuf};
use std::process::Command;

use corral_common::paths;
use corral_common::persist::write_atomic;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("{command} failed: {stderr}")]
    Failed { command: String, stderr: String },

    #[error("cannot install {path}: {source}")]
    Install {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// What to install and which certificates it runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSpec {
    /// Unit and binary name, e.g. `ciao-scheduler`.
    pub name: String,
    /// Binary to install.
    pub source: PathBuf,
    pub ca_cert: PathBuf,
    pub cert: PathBuf,
}

pub trait ServiceManager: Send + Sync {
    fn install(&self, spec: &ServiceSpec) -> Result<(), ServiceError>;
}

/// Installs units under systemd via `systemctl`.
#[derive(Debug, Clone)]
pub struct SystemdManager {
    bin_dir: PathBuf,
    unit_dir: PathBuf,
}

impl Default for SystemdManager {
    fn default() -> Self {
        Self::new(paths::tools_dir(), paths::systemd_unit_dir())
    }
}

impl SystemdManager {
    pub fn new(bin_dir: impl Into<PathBuf>, unit_dir: impl Into<PathBuf>) -> Self {
        Self {
            bin_dir: bin_dir.into(),
            unit_dir: unit_dir.into(),
        }
    }

    pub fn unit_path(&self, name: &str) -> PathBuf {
        self.unit_dir.join(format!("{name}.service"))
    }

    pub fn bin_path(&self, name: &str) -> PathBuf {
        self.bin_dir.join(name)
    }

    fn copy_binary(&self, spec: &ServiceSpec) -> Result<PathBuf, ServiceError> {
        let dest = self.bin_path(&spec.name);
        let install_err = |source| ServiceError::Install {
            path: dest.clone(),
            source,
        };

        // Copying a file onto itself would truncate it.
        if !same_file(&spec.source, &dest) {
            let bytes = std::fs::read(&spec.source).map_err(|source| ServiceError::Install {
                path: spec.source.clone(),
                source,
            })?;
            write_atomic(&dest, &bytes, 0o755).map_err(install_err)?;
        }
        Ok(dest)
    }
}

impl ServiceManager for SystemdManager {
    fn install(&self, spec: &ServiceSpec) -> Result<(), ServiceError> {
        tracing::info!(service = %spec.name, "Installing managed service");

        // Stopping a unit that does not exist yet is expected to fail.
        if let Err(e) = systemctl(&["stop", &spec.name]) {
            tracing::debug!(service = %spec.name, error = %e, "Stop before install failed");
        }

        let bin_path = self.copy_binary(spec)?;
        let unit_path = self.unit_path(&spec.name);
        let unit = generate_unit_file(&spec.name, &bin_path, &spec.ca_cert, &spec.cert);
        write_atomic(&unit_path, unit.as_bytes(), 0o644).map_err(|source| {
            ServiceError::Install {
                path: unit_path.clone(),
                source,
            }
        })?;

        systemctl(&["daemon-reload"])?;
        systemctl(&["start", &spec.name])?;
        tracing::info!(service = %spec.name, unit = %unit_path.display(), "Service started");
        Ok(())
    }
}

pub fn generate_unit_file(name: &str, bin_path: &Path, ca_cert: &Path, cert: &Path) -> String {
    format!(
        "\
[Unit]
Description={name} service
After=network.target

[Service]
Type=simple
ExecStart={} --cacert={} --cert={} --v 3
Restart=no
KillMode=process

[Install]
WantedBy=multi-user.target
",
        bin_path.display(),
        ca_cert.display(),
        cert.display()
    )
}

fn systemctl(args: &[&str]) -> Result<(), ServiceError> {
    let command = format!("systemctl {}", args.join(" "));
    let output = Command::new("systemctl")
        .args(args)
        .output()
        .map_err(|source| ServiceError::Spawn {
            command: command.clone(),
            source,
        })?;
    if output.status.success() {
        Ok(())
    } else {
        Err(ServiceError::Failed {
            command,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use std::sync::Mutex;

    use super::*;

    /// Records install requests instead of touching systemd.
    #[derive(Default)]
    pub struct RecordingManager {
        pub installed: Mutex<Vec<ServiceSpec>>,
        pub fail: bool,
    }

    impl ServiceManager for RecordingManager {
        fn install(&self, spec: &ServiceSpec) -> Result<(), ServiceError> {
            if self.fail {
                return Err(ServiceError::Failed {
                    command: "systemctl start".into(),
                    stderr: "unit failed".into(),
                });
            }
            self.installed.lock().unwrap().push(spec.clone());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corral_common::test::temp_dir;

    #[test]
    fn unit_file_passes_certificates_to_the_binary() {
        let unit = generate_unit_file(
            "ciao-scheduler",
            Path::new("/usr/local/bin/ciao-scheduler"),
            Path::new("/etc/pki/ciao/CAcert.pem"),
            Path::new("/etc/pki/ciao/cert-scheduler-node1.pem"),
        );
        assert!(unit.contains("Description=ciao-scheduler service"));
        assert!(unit.contains(
            "ExecStart=/usr/local/bin/ciao-scheduler --cacert=/etc/pki/ciao/CAcert.pem \
             --cert=/etc/pki/ciao/cert-scheduler-node1.pem --v 3"
        ));
        assert!(unit.contains("WantedBy=multi-user.target"));
    }

    #[test]
    fn paths_follow_service_name() {
        let manager = SystemdManager::new("/opt/bin", "/run/units");
        assert_eq!(
            manager.unit_path("ciao-launcher"),
            PathBuf::from("/run/units/ciao-launcher.service")
        );
        assert_eq!(
            manager.bin_path("ciao-launcher"),
            PathBuf::from("/opt/bin/ciao-launcher")
        );
    }

    #[cfg(unix)]
    #[test]
    fn copy_binary_installs_executable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = temp_dir("corral-service");
        let source = dir.join("build").join("ciao-launcher");
        std::fs::create_dir_all(source.parent().unwrap()).unwrap();
        std::fs::write(&source, b"binary").unwrap();

        let manager = SystemdManager::new(dir.join("bin"), dir.join("units"));
        let spec = ServiceSpec {
            name: "ciao-launcher".into(),
            source,
            ca_cert: dir.join("CAcert.pem"),
            cert: dir.join("cert.pem"),
        };
        let dest = manager.copy_binary(&spec).unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"binary");
        let mode = std::fs::metadata(&dest).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn copy_binary_onto_itself_keeps_contents() {
        let dir = temp_dir("corral-service");
        let source = dir.join("ciao-scheduler");
        std::fs::write(&source, b"scheduler").unwrap();

        let manager = SystemdManager::new(&dir, dir.join("units"));
        let spec = ServiceSpec {
            name: "ciao-scheduler".into(),
            source: source.clone(),
            ca_cert: dir.join("CAcert.pem"),
            cert: dir.join("cert.pem"),
        };
        manager.copy_binary(&spec).unwrap();
        assert_eq!(std::fs::read(&source).unwrap(), b"scheduler");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn copy_binary_reports_missing_source() {
        let dir = temp_dir("corral-service");
        let manager = SystemdManager::new(dir.join("bin"), dir.join("units"));
        let spec = ServiceSpec {
            name: "ciao-controller".into(),
            source: dir.join("absent"),
            ca_cert: dir.join("CAcert.pem"),
            cert: dir.join("cert.pem"),
        };
        let err = manager.copy_binary(&spec).unwrap_err();
        assert!(matches!(err, ServiceError::Install { .. }));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
