use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use converge::ServiceManager;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "hostprov")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Idempotent host provisioning for storage cluster nodes", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Apply a task file to one or more root filesystems
    Run(RunArgs),

    /// Show what a task file would change, without changing anything
    Check(CheckArgs),

    /// Manage cluster inventories
    #[command(subcommand)]
    Cluster(ClusterCommand),

    /// Run a built-in playbook for a cluster node
    #[command(subcommand)]
    Provision(ProvisionCommand),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Run / Check
// ============================================================================

#[derive(Args)]
pub struct RunArgs {
    /// Task file (TOML, or JSON with a .json extension)
    pub taskfile: PathBuf,

    /// Root filesystem to apply to; repeat to apply to several in parallel
    #[arg(short, long = "root", default_value = "/")]
    pub roots: Vec<PathBuf>,

    /// Keep going after a failed task
    #[arg(long)]
    pub continue_on_failure: bool,

    /// Number of roots applied in parallel
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Only run tasks matching a filter: kind, kind.name, or a name fragment
    #[arg(long)]
    pub only: Option<String>,

    /// Service manager on the target
    #[arg(long, value_enum)]
    pub service_manager: Option<ServiceManagerArg>,
}

#[derive(Args)]
pub struct CheckArgs {
    /// Task file (TOML, or JSON with a .json extension)
    pub taskfile: PathBuf,

    /// Root filesystem to check against
    #[arg(short, long, default_value = "/")]
    pub root: PathBuf,

    /// Show a diff for file-shaped tasks
    #[arg(short, long)]
    pub diff: bool,

    /// Only check tasks matching a filter: kind, kind.name, or a name fragment
    #[arg(long)]
    pub only: Option<String>,

    /// Print the plan as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ServiceManagerArg {
    Systemd,
    Sysv,
}

impl From<ServiceManagerArg> for ServiceManager {
    fn from(arg: ServiceManagerArg) -> Self {
        match arg {
            ServiceManagerArg::Systemd => ServiceManager::Systemd,
            ServiceManagerArg::Sysv => ServiceManager::Sysv,
        }
    }
}

// ============================================================================
// Cluster Commands
// ============================================================================

#[derive(Args)]
pub struct NodeArgs {
    /// Cluster name
    pub cluster: String,

    /// Address the node is reached on
    #[arg(long)]
    pub public_ip: String,

    /// Address on the storage network
    #[arg(long)]
    pub private_ip: String,

    /// Provider identifier (defaults to the public address)
    #[arg(long)]
    pub id: Option<String>,
}

#[derive(Subcommand)]
pub enum ClusterCommand {
    /// Create an empty cluster
    Create {
        /// Cluster name
        name: String,

        /// Datacenter the nodes live in
        #[arg(long)]
        dc: Option<String>,
    },

    /// Register the admin node (also the monitor)
    AddAdmin(NodeArgs),

    /// Register a storage server
    AddServer(NodeArgs),

    /// Register a client
    AddClient(NodeArgs),

    /// Show a cluster's nodes
    Show {
        /// Cluster name
        name: String,

        /// Print the raw JSON record
        #[arg(long)]
        json: bool,
    },
}

// ============================================================================
// Provision Commands
// ============================================================================

#[derive(Args, Clone)]
pub struct ProvisionArgs {
    /// Cluster name
    #[arg(short, long)]
    pub cluster: String,

    /// Root filesystem of the node being provisioned
    #[arg(short, long, default_value = "/")]
    pub root: PathBuf,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Keep going after a failed task
    #[arg(long)]
    pub continue_on_failure: bool,
}

#[derive(Subcommand)]
pub enum ProvisionCommand {
    /// Admin and monitor node: hostname, hosts, SSH, keys, ceph-deploy, initial cluster
    AdminNode(ProvisionArgs),

    /// Storage server: hostname, SSH, keys, admin access
    Server {
        #[command(flatten)]
        args: ProvisionArgs,

        /// Server number, from 1
        #[arg(short, long)]
        index: usize,
    },

    /// Write the cluster's storage host entries
    Hosts(ProvisionArgs),

    /// Authorize the admin key (or a server's key with --index)
    Authorize {
        #[command(flatten)]
        args: ProvisionArgs,

        /// Authorize this server's key instead of the admin's
        #[arg(short, long)]
        index: Option<usize>,
    },

    /// Generate the initial cluster configuration on the admin node
    CreateCluster(ProvisionArgs),

    /// Set a node's hostname
    Hostname {
        #[command(flatten)]
        args: ProvisionArgs,

        /// New hostname
        name: String,
    },
}
