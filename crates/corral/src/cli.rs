use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

use corral_common::paths;
use corral_enroll::bootstrap::{BootstrapConfig, CaPaths, SchedulerInstall};
use corral_enroll::cluster_config::{ClusterConfigParams, DEFAULT_CEPH_ID};
use corral_enroll::{EnrollConfig, DEFAULT_TOKEN};

/// Default enrollment listener.
pub const DEFAULT_LISTEN: &str = "0.0.0.0:9000";

#[derive(Parser, Debug)]
#[command(name = "corral", version, about = "Cluster certificate enrollment")]
pub struct Cli {
    /// Log level (error, warn, info, debug, trace)
    #[arg(long, env = "CORRAL_LOG", default_value = "info", global = true)]
    pub log_level: String,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Write logs to file (in addition to stderr)
    #[arg(long, env = "CORRAL_LOG_FILE", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,

    /// Output JSON instead of human-readable text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the enrollment coordinator
    Serve(ServeArgs),
    /// Enroll this node with a coordinator
    Join(JoinArgs),
    /// List signing requests known to a coordinator
    Pending(RemoteArgs),
    /// Approve a pending signing request
    Approve {
        /// Public-key fingerprint shown by `corral pending`
        fingerprint: String,
        #[command(flatten)]
        remote: RemoteArgs,
    },
    /// Show version information
    Version,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address the enrollment listener binds to
    #[arg(long, env = "CORRAL_LISTEN", default_value = DEFAULT_LISTEN)]
    pub listen: SocketAddr,

    /// Shared secret joining nodes must present
    #[arg(long, env = "CORRAL_TOKEN", default_value = DEFAULT_TOKEN)]
    pub token: String,

    /// Approve signing requests as they arrive
    #[arg(long, env = "CORRAL_AUTO_APPROVE", default_value_t = true, action = ArgAction::Set)]
    pub auto_approve: bool,

    /// Install and start the scheduler service after bootstrap
    #[arg(long, env = "CORRAL_SCHEDULER", default_value_t = true, action = ArgAction::Set)]
    pub scheduler: bool,

    /// Serve enrollment requests (false = bootstrap only)
    #[arg(long, env = "CORRAL_SERVE_REQUESTS", default_value_t = true, action = ArgAction::Set)]
    pub serve_requests: bool,

    /// Directory holding the anchor and CA certificate
    #[arg(long, env = "CORRAL_PKI_DIR", value_name = "DIR")]
    pub pki_dir: Option<PathBuf>,

    /// Directory the cluster configuration document is written to
    #[arg(long, env = "CORRAL_CONFIG_DIR", value_name = "DIR")]
    pub config_dir: Option<PathBuf>,

    /// Directory component binaries are installed and served from
    #[arg(long, env = "CORRAL_TOOLS_DIR", value_name = "DIR")]
    pub tools_dir: Option<PathBuf>,

    /// Management IP placed in the anchor certificate
    #[arg(long, env = "CORRAL_SERVER_IP")]
    pub server_ip: Option<IpAddr>,

    /// Hostname for the anchor certificate (default: this machine)
    #[arg(long, env = "CORRAL_HOSTNAME")]
    pub hostname: Option<String>,

    #[command(flatten)]
    pub cluster: ClusterArgs,
}

/// Values embedded in the generated cluster configuration document.
#[derive(Args, Debug, Default)]
pub struct ClusterArgs {
    /// Ceph identity used by the storage backend
    #[arg(long, env = "CORRAL_CEPH_ID", default_value = DEFAULT_CEPH_ID)]
    pub ceph_id: String,

    /// CA certificate for the compute API endpoint
    #[arg(long, env = "CORRAL_HTTPS_CA_CERT")]
    pub https_ca_cert: Option<String>,

    /// Certificate for the compute API endpoint
    #[arg(long, env = "CORRAL_HTTPS_CERT")]
    pub https_cert: Option<String>,

    /// Identity service user
    #[arg(long, env = "CORRAL_IDENTITY_USER")]
    pub identity_user: Option<String>,

    /// Identity service password
    #[arg(long, env = "CORRAL_IDENTITY_PASSWORD", hide_env_values = true)]
    pub identity_password: Option<String>,

    /// Identity service URL
    #[arg(long, env = "CORRAL_IDENTITY_URL")]
    pub identity_url: Option<String>,

    /// SSH key installed for the cluster admin
    #[arg(long, env = "CORRAL_ADMIN_SSH_KEY")]
    pub admin_ssh_key: Option<String>,

    /// Password for the cluster admin
    #[arg(long, env = "CORRAL_ADMIN_PASSWORD", hide_env_values = true)]
    pub admin_password: Option<String>,

    /// Compute network range
    #[arg(long, env = "CORRAL_COMPUTE_NET")]
    pub compute_net: Option<String>,

    /// Management network range
    #[arg(long, env = "CORRAL_MGMT_NET")]
    pub mgmt_net: Option<String>,
}

#[derive(Args, Debug)]
pub struct JoinArgs {
    /// Coordinator URL, e.g. http://sched1:9000
    #[arg(long, env = "CORRAL_SERVER")]
    pub server: String,

    /// Role to enroll as: agent, netagent, dual, controller
    #[arg(long, env = "CORRAL_ROLE")]
    pub role: String,

    /// Shared secret the coordinator expects
    #[arg(long, env = "CORRAL_TOKEN", default_value = DEFAULT_TOKEN)]
    pub token: String,

    /// Where the CA certificate and node certificate are installed
    #[arg(long, env = "CORRAL_PKI_DIR", value_name = "DIR")]
    pub pki_dir: Option<PathBuf>,

    /// Where the pending CSR and key are kept
    #[arg(long, env = "CORRAL_WORK_DIR", value_name = "DIR")]
    pub work_dir: Option<PathBuf>,

    /// Hostname used in file names and the CSR (default: this machine)
    #[arg(long, env = "CORRAL_HOSTNAME")]
    pub hostname: Option<String>,

    /// Re-download certificates and regenerate keys even if present
    #[arg(long)]
    pub force: bool,

    /// Download and start the role's component after enrolling
    #[arg(long)]
    pub install: bool,

    /// Seconds to wait for approval (0 = wait forever)
    #[arg(long, value_name = "SECONDS", default_value_t = 300)]
    pub wait: u64,
}

#[derive(Args, Debug)]
pub struct RemoteArgs {
    /// Coordinator URL, e.g. http://sched1:9000
    #[arg(long, env = "CORRAL_SERVER")]
    pub server: String,

    /// Shared secret the coordinator expects
    #[arg(long, env = "CORRAL_TOKEN", default_value = DEFAULT_TOKEN)]
    pub token: String,
}

/// Resolved coordinator settings.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: SocketAddr,
    pub token: String,
    pub auto_approve: bool,
    pub scheduler: bool,
    pub serve_requests: bool,
    pub bootstrap: BootstrapConfig,
    pub config_dir: PathBuf,
    pub tools_dir: PathBuf,
    pub cluster: ClusterConfigParams,
}

impl Config {
    pub fn from_cli(args: &ServeArgs) -> Self {
        Self {
            listen: args.listen,
            token: args.token.clone(),
            auto_approve: args.auto_approve,
            scheduler: args.scheduler,
            serve_requests: args.serve_requests,
            bootstrap: BootstrapConfig {
                pki_dir: args.pki_dir.clone().unwrap_or_else(paths::system_pki_dir),
                hostname: args.hostname.clone().unwrap_or_else(local_hostname),
                mgmt_ip: args.server_ip,
            },
            config_dir: args
                .config_dir
                .clone()
                .unwrap_or_else(paths::cluster_config_dir),
            tools_dir: args.tools_dir.clone().unwrap_or_else(paths::tools_dir),
            cluster: args.cluster.params(),
        }
    }

    pub fn enroll_config(&self, paths: &CaPaths) -> EnrollConfig {
        EnrollConfig {
            token: self.token.clone(),
            auto_approve: self.auto_approve,
            anchor_path: paths.anchor.clone(),
            tools_dir: self.tools_dir.clone(),
        }
    }

    pub fn scheduler_install(&self) -> SchedulerInstall {
        SchedulerInstall {
            config_dir: self.config_dir.clone(),
            tools_dir: self.tools_dir.clone(),
            params: self.cluster.clone(),
        }
    }
}

impl ClusterArgs {
    fn params(&self) -> ClusterConfigParams {
        let text = |v: &Option<String>| v.clone().unwrap_or_default();
        ClusterConfigParams {
            ceph_id: self.ceph_id.clone(),
            https_ca_cert: text(&self.https_ca_cert),
            https_cert: text(&self.https_cert),
            identity_user: text(&self.identity_user),
            identity_password: text(&self.identity_password),
            identity_url: text(&self.identity_url),
            admin_ssh_key: text(&self.admin_ssh_key),
            admin_password: text(&self.admin_password),
            compute_net: text(&self.compute_net),
            mgmt_net: text(&self.mgmt_net),
        }
    }
}

/// This machine's hostname, or `localhost` when it cannot be read.
pub fn local_hostname() -> String {
    hostname::get()
        .ok()
        .map(|h| h.to_string_lossy().into_owned())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}
