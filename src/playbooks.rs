//! Built-in playbooks for storage cluster nodes
//!
//! Each playbook is a plain function from its variables to an ordered task
//! list; nothing here touches a machine until the tasks are executed.

use converge::{
    Action, BlockContent, BlockTask, FetchTask, FileContent, HostEntry, HostnameTask, IniTask,
    PackageTask, RepoTask, ServiceDesired, ServiceTask, ShellTask, Task,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const SSH_DIR: &str = "/root/.ssh";
const PRIVATE_KEY: &str = "/root/.ssh/id_rsa";
const PUBLIC_KEY: &str = "/root/.ssh/id_rsa.pub";
const AUTHORIZED_KEYS: &str = "/root/.ssh/authorized_keys";
const KNOWN_HOSTS: &str = "/root/.ssh/known_hosts";
const HOSTS_FILE: &str = "/etc/hosts";
const CEPH_KEY_URL: &str = "https://download.ceph.com/keys/release.asc";
const CEPH_KEY_FILE: &str = "/etc/apt/trusted.gpg.d/ceph.asc";
const CEPH_LIST: &str = "/etc/apt/sources.list.d/ceph.list";

/// Key-only root login, no passwords
const SSHD_CONFIG: &str = "\
Port 22
Protocol 2
HostKey /etc/ssh/ssh_host_rsa_key
HostKey /etc/ssh/ssh_host_ecdsa_key
HostKey /etc/ssh/ssh_host_ed25519_key
UsePrivilegeSeparation yes
SyslogFacility AUTH
LogLevel INFO
LoginGraceTime 120
PermitRootLogin without-password
StrictModes yes
PubkeyAuthentication yes
IgnoreRhosts yes
HostbasedAuthentication no
PermitEmptyPasswords no
ChallengeResponseAuthentication no
PasswordAuthentication no
X11Forwarding no
PrintMotd no
PrintLastLog yes
TCPKeepAlive yes
AcceptEnv LANG LC_*
Subsystem sftp /usr/lib/openssh/sftp-server
UsePAM yes
";

fn default_release() -> String {
    "luminous".to_string()
}

fn default_codename() -> String {
    "xenial".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminNodeVars {
    /// Where the node's public key lands on this machine
    pub local_pubkey_file: PathBuf,
    #[serde(default = "default_release")]
    pub ceph_release: String,
    #[serde(default = "default_codename")]
    pub distro_codename: String,
}

impl AdminNodeVars {
    pub fn new(local_pubkey_file: impl Into<PathBuf>) -> Self {
        Self {
            local_pubkey_file: local_pubkey_file.into(),
            ceph_release: default_release(),
            distro_codename: default_codename(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageServerVars {
    pub local_pubkey_file: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostsVars {
    pub host_entries: Vec<HostEntry>,
    pub cluster: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizedKeysVars {
    pub keys: Vec<String>,
    pub cluster: String,
    /// Node the keys belong to; each owner gets its own block
    pub owner: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorVars {
    pub fqdn: String,
    #[serde(default)]
    pub pubkey: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateClusterVars {
    pub cluster_name: String,
    pub mon: MonitorVars,
    /// Defaults to `/root/<cluster_name>`
    #[serde(default)]
    pub cluster_dir: Option<PathBuf>,
}

impl CreateClusterVars {
    pub fn cluster_dir(&self) -> PathBuf {
        self.cluster_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("/root").join(&self.cluster_name))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostnameVars {
    pub new_hostname: String,
}

fn shell(argv: &[&str], creates: Option<&str>) -> Action {
    Action::ShellCommand(ShellTask {
        argv: argv.iter().map(|s| (*s).to_string()).collect(),
        cwd: None,
        creates: creates.map(PathBuf::from),
    })
}

fn sh(script: &str, creates: Option<&str>) -> Action {
    shell(&["sh", "-c", script], creates)
}

fn package(name: &str, update_cache: bool) -> Action {
    Action::PackageInstalled(PackageTask {
        package: name.to_string(),
        version: None,
        update_cache,
    })
}

fn service(name: &str, state: ServiceDesired) -> Action {
    Action::ServiceState(ServiceTask {
        service: name.to_string(),
        state,
    })
}

/// Steps shared by every storage node: locked-down SSH, time sync, and a
/// root key pair whose public half is fetched back
fn base_node(local_pubkey_file: &Path) -> Vec<Task> {
    // The private key is the guard path and must appear last.
    let keygen = format!(
        "umask 077 && rm -f {PRIVATE_KEY}.tmp {PRIVATE_KEY}.tmp.pub \
         && ssh-keygen -q -t rsa -b 4096 -N '' -f {PRIVATE_KEY}.tmp \
         && mv {PRIVATE_KEY}.tmp.pub {PUBLIC_KEY} && mv {PRIVATE_KEY}.tmp {PRIVATE_KEY}"
    );

    vec![
        Task::new(
            "sshd config",
            Action::FileContent(
                FileContent::inline("/etc/ssh/sshd_config", SSHD_CONFIG)
                    .with_mode(0o644)
                    .with_owner("root", "root"),
            ),
        ),
        Task::new("restart ssh", service("ssh", ServiceDesired::Restarted)),
        Task::new("ntp installed", package("ntp", true)),
        Task::new("ntp running", service("ntp", ServiceDesired::Started)),
        Task::new(
            "ssh directory",
            shell(&["mkdir", "-p", "-m", "700", SSH_DIR], Some(SSH_DIR)),
        ),
        Task::new("root key pair", sh(&keygen, Some(PRIVATE_KEY))),
        Task::new(
            "fetch public key",
            Action::FetchFile(FetchTask {
                src: PathBuf::from(PUBLIC_KEY),
                dest: local_pubkey_file.to_path_buf(),
            }),
        ),
    ]
}

/// Admin node: a base node that also deploys Ceph with `ceph-deploy`
pub fn admin_node(vars: &AdminNodeVars) -> Vec<Task> {
    let mut tasks = base_node(&vars.local_pubkey_file);
    tasks.extend([
        Task::new(
            "ceph release key",
            shell(
                &["wget", "-q", "-O", CEPH_KEY_FILE, CEPH_KEY_URL],
                Some(CEPH_KEY_FILE),
            ),
        ),
        Task::new(
            "ceph repository",
            Action::RepoRegistered(RepoTask {
                repo: format!(
                    "deb https://download.ceph.com/debian-{}/ {} main",
                    vars.ceph_release, vars.distro_codename
                ),
                file: PathBuf::from(CEPH_LIST),
                update_cache: true,
            }),
        ),
        Task::new("ceph-deploy installed", package("ceph-deploy", false)),
    ]);
    tasks
}

/// Storage server: OSD and RGW software is installed later by `ceph-deploy`
/// from the admin node
pub fn storage_server(vars: &StorageServerVars) -> Vec<Task> {
    base_node(&vars.local_pubkey_file)
}

/// Storage network names in `/etc/hosts`, one block per cluster
pub fn modify_hosts_file(vars: &HostsVars) -> Vec<Task> {
    vec![Task::new(
        format!("{} host entries", vars.cluster),
        Action::BlockInFile(BlockTask {
            path: PathBuf::from(HOSTS_FILE),
            marker: format!("{} storage nodes", vars.cluster),
            content: BlockContent::Entries(vars.host_entries.clone()),
        }),
    )]
}

pub fn add_authorized_keys(vars: &AuthorizedKeysVars) -> Vec<Task> {
    let lines = vars
        .keys
        .iter()
        .flat_map(|k| k.lines())
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();

    vec![
        Task::new(
            "ssh directory",
            shell(&["mkdir", "-p", "-m", "700", SSH_DIR], Some(SSH_DIR)),
        ),
        Task::new(
            format!("authorize {}", vars.owner),
            Action::BlockInFile(BlockTask {
                path: PathBuf::from(AUTHORIZED_KEYS),
                marker: format!("{} {}", vars.cluster, vars.owner),
                content: BlockContent::Lines(lines),
            }),
        ),
    ]
}

/// Initial cluster configuration, written on the admin node
pub fn create_cluster(vars: &CreateClusterVars) -> Vec<Task> {
    let dir = vars.cluster_dir();
    let dir_str = dir.display().to_string();
    let conf = dir.join(format!("{}.conf", vars.cluster_name));
    let fqdn = &vars.mon.fqdn;

    let known_hosts = format!(
        "ssh-keygen -F {fqdn} -f {KNOWN_HOSTS} >/dev/null \
         || ssh-keyscan -H {fqdn} >> {KNOWN_HOSTS}"
    );

    vec![
        Task::new(
            "cluster directory",
            shell(&["mkdir", "-p", &dir_str], Some(&dir_str)),
        ),
        Task::new(format!("{fqdn} known host"), sh(&known_hosts, None)).always(),
        Task::new(
            "new cluster",
            Action::ShellCommand(ShellTask {
                argv: ["ceph-deploy", "--cluster", &vars.cluster_name, "new", fqdn]
                    .iter()
                    .map(|s| (*s).to_string())
                    .collect(),
                cwd: Some(dir.clone()),
                creates: Some(conf.clone()),
            }),
        ),
        Task::new(
            "pool replica count",
            Action::IniValue(IniTask {
                path: conf,
                section: "global".to_string(),
                option: "osd pool default size".to_string(),
                value: "2".to_string(),
            }),
        ),
    ]
}

/// Set the machine's hostname and make it resolve locally
pub fn change_hostname(vars: &HostnameVars) -> Vec<Task> {
    vec![
        Task::new(
            "hostname",
            Action::Hostname(HostnameTask {
                hostname: vars.new_hostname.clone(),
            }),
        ),
        Task::new(
            "local hostname entry",
            Action::BlockInFile(BlockTask {
                path: PathBuf::from(HOSTS_FILE),
                marker: "local hostname".to_string(),
                content: BlockContent::Lines(vec![format!("127.0.1.1\t{}", vars.new_hostname)]),
            }),
        ),
    ]
}
