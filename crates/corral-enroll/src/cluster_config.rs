//! Cluster configuration document written for the scheduler.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::EnrollError;

pub const CONFIG_FILENAME: &str = "configuration.yaml";

pub const DEFAULT_CEPH_ID: &str = "ciao";
const DEFAULT_COMPUTE_PORT: u16 = 8774;

/// Operator-supplied values for the cluster document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterConfigParams {
    pub ceph_id: String,
    pub https_ca_cert: String,
    pub https_cert: String,
    pub identity_user: String,
    pub identity_password: String,
    pub identity_url: String,
    pub admin_ssh_key: String,
    pub admin_password: String,
    pub compute_net: String,
    pub mgmt_net: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClusterConfig {
    pub configure: ConfigurePayload,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigurePayload {
    pub scheduler: SchedulerSection,
    pub storage: StorageSection,
    pub controller: ControllerSection,
    pub launcher: LauncherSection,
    pub image_service: ServiceSection,
    pub identity_service: ServiceSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchedulerSection {
    pub storage_type: String,
    pub storage_uri: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageSection {
    pub ceph_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ControllerSection {
    pub compute_port: u16,
    pub compute_ca: String,
    pub compute_cert: String,
    pub identity_user: String,
    pub identity_password: String,
    #[serde(default)]
    pub admin_ssh_key: String,
    #[serde(default)]
    pub admin_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LauncherSection {
    pub compute_net: Vec<String>,
    pub mgmt_net: Vec<String>,
    pub disk_limit: bool,
    pub mem_limit: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceSection {
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
}

impl ClusterConfig {
    /// Build the document the scheduler reads from `storage_uri`.
    pub fn new(params: &ClusterConfigParams, storage_uri: &Path) -> Self {
        let ceph_id = if params.ceph_id.is_empty() {
            DEFAULT_CEPH_ID.to_string()
        } else {
            params.ceph_id.clone()
        };
        Self {
            configure: ConfigurePayload {
                scheduler: SchedulerSection {
                    storage_type: "file".into(),
                    storage_uri: storage_uri.display().to_string(),
                },
                storage: StorageSection { ceph_id },
                controller: ControllerSection {
                    compute_port: DEFAULT_COMPUTE_PORT,
                    compute_ca: params.https_ca_cert.clone(),
                    compute_cert: params.https_cert.clone(),
                    identity_user: params.identity_user.clone(),
                    identity_password: params.identity_password.clone(),
                    admin_ssh_key: params.admin_ssh_key.clone(),
                    admin_password: params.admin_password.clone(),
                },
                launcher: LauncherSection {
                    compute_net: non_empty(&params.compute_net),
                    mgmt_net: non_empty(&params.mgmt_net),
                    disk_limit: false,
                    mem_limit: false,
                },
                image_service: ServiceSection {
                    kind: "glance".into(),
                    url: String::new(),
                },
                identity_service: ServiceSection {
                    kind: "keystone".into(),
                    url: params.identity_url.clone(),
                },
            },
        }
    }

    pub fn to_yaml(&self) -> Result<String, EnrollError> {
        serde_yaml::to_string(self).map_err(|e| EnrollError::Config(e.to_string()))
    }

    pub fn from_yaml(text: &str) -> Result<Self, EnrollError> {
        serde_yaml::from_str(text).map_err(|e| EnrollError::Config(e.to_string()))
    }
}

fn non_empty(net: &str) -> Vec<String> {
    if net.is_empty() {
        Vec::new()
    } else {
        vec![net.to_string()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ClusterConfigParams {
        ClusterConfigParams {
            https_ca_cert: "/etc/pki/ciao/ca.pem".into(),
            https_cert: "/etc/pki/ciao/https.pem".into(),
            identity_user: "csr".into(),
            identity_password: "hunter2".into(),
            identity_url: "https://keystone:35357".into(),
            compute_net: "192.168.0.0/24".into(),
            ..Default::default()
        }
    }

    #[test]
    fn defaults_fill_unset_values() {
        let config = ClusterConfig::new(&params(), Path::new("/etc/ciao/configuration.yaml"));
        let c = &config.configure;
        assert_eq!(c.scheduler.storage_type, "file");
        assert_eq!(c.scheduler.storage_uri, "/etc/ciao/configuration.yaml");
        assert_eq!(c.storage.ceph_id, "ciao");
        assert_eq!(c.controller.compute_port, 8774);
        assert_eq!(c.image_service.kind, "glance");
        assert_eq!(c.identity_service.kind, "keystone");
        assert_eq!(c.identity_service.url, "https://keystone:35357");
        assert!(!c.launcher.disk_limit);
        assert!(!c.launcher.mem_limit);
        assert_eq!(c.launcher.compute_net, vec!["192.168.0.0/24".to_string()]);
        assert!(c.launcher.mgmt_net.is_empty());
    }

    #[test]
    fn yaml_uses_nested_snake_case_keys() {
        let yaml = ClusterConfig::new(&params(), Path::new("/etc/ciao/configuration.yaml"))
            .to_yaml()
            .unwrap();
        let doc: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();
        let configure = &doc["configure"];
        assert_eq!(configure["controller"]["compute_ca"], "/etc/pki/ciao/ca.pem");
        assert_eq!(configure["identity_service"]["type"], "keystone");
        assert_eq!(configure["scheduler"]["storage_type"], "file");
        assert_eq!(configure["storage"]["ceph_id"], "ciao");
    }

    #[test]
    fn yaml_round_trips() {
        let config = ClusterConfig::new(&params(), Path::new("/tmp/configuration.yaml"));
        let parsed = ClusterConfig::from_yaml(&config.to_yaml().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn explicit_ceph_id_wins() {
        let p = ClusterConfigParams {
            ceph_id: "admin".into(),
            ..params()
        };
        let config = ClusterConfig::new(&p, Path::new("/etc/ciao/configuration.yaml"));
        assert_eq!(config.configure.storage.ceph_id, "admin");
    }
}
