use std::path::PathBuf;

/// System location for cluster certificates.
pub fn system_pki_dir() -> PathBuf {
    PathBuf::from("/etc/pki/ciao")
}

/// System location for the generated cluster configuration document.
pub fn cluster_config_dir() -> PathBuf {
    PathBuf::from("/etc/ciao")
}

/// Where component binaries are installed and served from.
pub fn tools_dir() -> PathBuf {
    PathBuf::from("/usr/local/bin")
}

/// Directory for systemd unit files.
pub fn systemd_unit_dir() -> PathBuf {
    PathBuf::from("/etc/systemd/system")
}

/// Per-user working directory of the join client (pending CSR and key).
///
/// - `~/.corral/` when `HOME` is set
/// - `./.corral/` otherwise
pub fn client_work_dir() -> PathBuf {
    if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home).join(".corral");
    }
    PathBuf::from(".corral")
}
