//! Cluster inventory
//!
//! One JSON record per cluster at `<data_dir>/<name>/<name>.json`, with the
//! nodes' fetched public keys beside it under `pubkeys/<fqdn>.pub`.

use chrono::{DateTime, Utc};
use converge::HostEntry;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;

/// Cluster names become directory names and DNS suffixes
static CLUSTER_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9-]{0,62}$").expect("valid regex"));

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("cluster '{0}' already exists")]
    AlreadyExists(String),

    #[error("cluster '{0}' not found")]
    NotFound(String),

    #[error("invalid cluster name '{0}': use lowercase letters, digits and '-'")]
    InvalidName(String),

    #[error("cluster '{0}' already has an admin node")]
    AdminExists(String),

    #[error("cluster '{0}' has no admin node yet")]
    NoAdmin(String),

    #[error("no server #{index} in cluster '{cluster}'")]
    NoServer { cluster: String, index: usize },

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, ClusterError>;

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> ClusterError + '_ {
    move |source| ClusterError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// A provisioned machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub public_ip: String,
    pub private_ip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fqdn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shortname: Option<String>,
    /// Hostname set on the machine itself
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pubkey: Option<String>,
}

impl Node {
    pub fn new(id: &str, public_ip: &str, private_ip: &str) -> Self {
        Self {
            id: id.to_string(),
            public_ip: public_ip.to_string(),
            private_ip: private_ip.to_string(),
            fqdn: None,
            shortname: None,
            hostname: None,
            pubkey: None,
        }
    }

    fn named(mut self, shortname: &str, cluster: &str) -> Self {
        self.fqdn = Some(format!("{shortname}.{cluster}"));
        self.shortname = Some(shortname.to_string());
        self
    }

    /// `/etc/hosts` entry on the private network, if the node is named
    pub fn host_entry(&self) -> Option<HostEntry> {
        Some(HostEntry::new(
            &self.private_ip,
            self.shortname.as_deref()?,
            self.fqdn.as_deref()?,
        ))
    }

    pub fn label(&self) -> &str {
        self.fqdn.as_deref().unwrap_or(&self.public_ip)
    }
}

/// A storage cluster: one admin node doubling as the monitor, storage
/// servers, and clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dc: Option<String>,
    #[serde(default)]
    pub admin: Option<Node>,
    #[serde(default)]
    pub monitors: Vec<Node>,
    #[serde(default)]
    pub servers: Vec<Node>,
    #[serde(default)]
    pub clients: Vec<Node>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Cluster {
    pub fn new(name: &str, dc: Option<&str>) -> Result<Self> {
        validate_name(name)?;
        Ok(Self {
            name: name.to_string(),
            dc: dc.map(str::to_string),
            admin: None,
            monitors: Vec::new(),
            servers: Vec::new(),
            clients: Vec::new(),
            updated_at: None,
        })
    }

    pub fn dir(data_dir: &Path, name: &str) -> PathBuf {
        data_dir.join(name)
    }

    pub fn file(data_dir: &Path, name: &str) -> PathBuf {
        Self::dir(data_dir, name).join(format!("{name}.json"))
    }

    pub fn pubkey_dir(&self, data_dir: &Path) -> PathBuf {
        Self::dir(data_dir, &self.name).join("pubkeys")
    }

    /// Where a node's fetched public key is stored
    pub fn pubkey_path(&self, data_dir: &Path, node: &Node) -> PathBuf {
        self.pubkey_dir(data_dir)
            .join(format!("{}.pub", node.label()))
    }

    /// Create and save a new, empty cluster
    pub fn create(data_dir: &Path, name: &str, dc: Option<&str>) -> Result<Self> {
        let mut cluster = Self::new(name, dc)?;
        if Self::file(data_dir, name).exists() {
            return Err(ClusterError::AlreadyExists(name.to_string()));
        }
        cluster.save(data_dir)?;
        log::info!("Created cluster {name}");
        Ok(cluster)
    }

    pub fn load(data_dir: &Path, name: &str) -> Result<Self> {
        validate_name(name)?;
        let path = Self::file(data_dir, name);
        if !path.exists() {
            return Err(ClusterError::NotFound(name.to_string()));
        }
        let content = fs::read_to_string(&path).map_err(io_err(&path))?;
        let cluster = serde_json::from_str(&content).map_err(|source| ClusterError::Json {
            path: path.clone(),
            source,
        })?;
        log::debug!("Loaded cluster from {}", path.display());
        Ok(cluster)
    }

    pub fn save(&mut self, data_dir: &Path) -> Result<()> {
        let dir = Self::dir(data_dir, &self.name);
        fs::create_dir_all(&dir).map_err(io_err(&dir))?;

        self.updated_at = Some(Utc::now());
        let path = Self::file(data_dir, &self.name);
        let content = serde_json::to_string_pretty(self).map_err(|source| ClusterError::Json {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, content + "\n").map_err(io_err(&path))?;
        log::debug!("Saved cluster to {}", path.display());
        Ok(())
    }

    /// Register the admin node, which is also the cluster's only monitor
    pub fn add_admin(&mut self, node: Node) -> Result<&Node> {
        if self.admin.is_some() {
            return Err(ClusterError::AdminExists(self.name.clone()));
        }
        let admin = node.named("cephadmin", &self.name);
        let monitor = admin.clone().named("cephmon1", &self.name);
        self.monitors = vec![monitor];
        Ok(self.admin.insert(admin))
    }

    /// Register the next storage server, numbered from 1
    pub fn add_server(&mut self, node: Node) -> &Node {
        let index = self.servers.len() + 1;
        let server = node.named(&format!("cephosdrgw{index}"), &self.name);
        self.servers.push(server);
        &self.servers[index - 1]
    }

    pub fn add_client(&mut self, node: Node) -> &Node {
        let index = self.clients.len() + 1;
        let client = node.named(&format!("cephclient{index}"), &self.name);
        self.clients.push(client);
        &self.clients[index - 1]
    }

    pub fn admin(&self) -> Result<&Node> {
        self.admin
            .as_ref()
            .ok_or_else(|| ClusterError::NoAdmin(self.name.clone()))
    }

    /// Server by its 1-based index
    pub fn server(&self, index: usize) -> Result<&Node> {
        index
            .checked_sub(1)
            .and_then(|i| self.servers.get(i))
            .ok_or_else(|| ClusterError::NoServer {
                cluster: self.name.clone(),
                index,
            })
    }

    pub fn server_mut(&mut self, index: usize) -> Result<&mut Node> {
        let name = self.name.clone();
        index
            .checked_sub(1)
            .and_then(|i| self.servers.get_mut(i))
            .ok_or(ClusterError::NoServer {
                cluster: name,
                index,
            })
    }

    /// `/etc/hosts` entries for the storage network: admin, then monitors,
    /// then servers. Clients reach the cluster through public addresses and
    /// are left out.
    pub fn storage_host_entries(&self) -> Vec<HostEntry> {
        self.admin
            .iter()
            .chain(&self.monitors)
            .chain(&self.servers)
            .filter_map(Node::host_entry)
            .collect()
    }

    /// Record the admin key on the admin and monitor, and store a copy
    /// under the monitor's name
    pub fn set_admin_pubkey(&mut self, data_dir: &Path, pubkey: &str) -> Result<()> {
        let admin = self
            .admin
            .as_mut()
            .ok_or_else(|| ClusterError::NoAdmin(self.name.clone()))?;
        admin.pubkey = Some(pubkey.to_string());

        if let Some(mon) = self.monitors.first_mut() {
            mon.pubkey = Some(pubkey.to_string());
        }
        if let Some(mon) = self.monitors.first() {
            let path = self.pubkey_path(data_dir, mon);
            let dir = self.pubkey_dir(data_dir);
            fs::create_dir_all(&dir).map_err(io_err(&dir))?;
            fs::write(&path, pubkey).map_err(io_err(&path))?;
        }
        Ok(())
    }
}

/// Read a fetched public key, trimmed of trailing newlines. `None` if the
/// file was never fetched.
pub fn read_pubkey(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => {
            let key = content.trim_end_matches('\n').to_string();
            Ok((!key.is_empty()).then_some(key))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_err(path)(e)),
    }
}

pub fn validate_name(name: &str) -> Result<()> {
    if CLUSTER_NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(ClusterError::InvalidName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn populated() -> Cluster {
        let mut cluster = Cluster::new("prod", Some("frankfurt")).unwrap();
        cluster
            .add_admin(Node::new("1001", "203.0.113.10", "192.168.1.10"))
            .unwrap();
        cluster.add_server(Node::new("1002", "203.0.113.11", "192.168.1.11"));
        cluster.add_server(Node::new("1003", "203.0.113.12", "192.168.1.12"));
        cluster.add_client(Node::new("1004", "203.0.113.13", "192.168.1.13"));
        cluster
    }

    #[test]
    fn test_name_validation() {
        assert!(validate_name("prod").is_ok());
        assert!(validate_name("ceph-perf-2").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("Prod").is_err());
        assert!(validate_name("../etc").is_err());
        assert!(validate_name("-x").is_err());
    }

    #[test]
    fn test_admin_doubles_as_monitor() {
        let cluster = populated();
        let admin = cluster.admin().unwrap();
        assert_eq!(admin.fqdn.as_deref(), Some("cephadmin.prod"));
        assert_eq!(admin.shortname.as_deref(), Some("cephadmin"));

        assert_eq!(cluster.monitors.len(), 1);
        assert_eq!(cluster.monitors[0].fqdn.as_deref(), Some("cephmon1.prod"));
        assert_eq!(cluster.monitors[0].private_ip, admin.private_ip);
    }

    #[test]
    fn test_second_admin_rejected() {
        let mut cluster = populated();
        let err = cluster
            .add_admin(Node::new("9", "203.0.113.99", "192.168.1.99"))
            .unwrap_err();
        assert!(matches!(err, ClusterError::AdminExists(_)));
    }

    #[test]
    fn test_servers_numbered_from_one() {
        let cluster = populated();
        assert_eq!(
            cluster.server(1).unwrap().fqdn.as_deref(),
            Some("cephosdrgw1.prod")
        );
        assert_eq!(cluster.server(2).unwrap().shortname.as_deref(), Some("cephosdrgw2"));
        assert!(cluster.server(0).is_err());
        assert!(cluster.server(3).is_err());
    }

    #[test]
    fn test_storage_host_entries_order() {
        let cluster = populated();
        let fqdns: Vec<_> = cluster
            .storage_host_entries()
            .into_iter()
            .map(|e| e.fqdn)
            .collect();
        assert_eq!(
            fqdns,
            vec![
                "cephadmin.prod",
                "cephmon1.prod",
                "cephosdrgw1.prod",
                "cephosdrgw2.prod",
            ]
        );
        assert_eq!(cluster.storage_host_entries()[2].ip, "192.168.1.11");
    }

    #[test]
    fn test_empty_cluster_has_no_entries() {
        let cluster = Cluster::new("empty", None).unwrap();
        assert!(cluster.storage_host_entries().is_empty());
        assert!(cluster.admin().is_err());
    }

    #[test]
    fn test_create_load_save() {
        let dir = TempDir::new().unwrap();
        Cluster::create(dir.path(), "prod", Some("frankfurt")).unwrap();
        assert!(dir.path().join("prod/prod.json").exists());

        let err = Cluster::create(dir.path(), "prod", None).unwrap_err();
        assert!(matches!(err, ClusterError::AlreadyExists(_)));

        let mut cluster = Cluster::load(dir.path(), "prod").unwrap();
        assert_eq!(cluster.dc.as_deref(), Some("frankfurt"));
        cluster.add_server(Node::new("1002", "203.0.113.11", "192.168.1.11"));
        cluster.save(dir.path()).unwrap();

        let reloaded = Cluster::load(dir.path(), "prod").unwrap();
        assert_eq!(reloaded.servers, cluster.servers);
        assert!(reloaded.updated_at.is_some());
    }

    #[test]
    fn test_load_missing() {
        let dir = TempDir::new().unwrap();
        let err = Cluster::load(dir.path(), "ghost").unwrap_err();
        assert!(matches!(err, ClusterError::NotFound(_)));
    }

    #[test]
    fn test_admin_pubkey_copied_to_monitor() {
        let dir = TempDir::new().unwrap();
        let mut cluster = populated();
        cluster
            .set_admin_pubkey(dir.path(), "ssh-rsa AAAA root@cephadminmon")
            .unwrap();

        assert_eq!(
            cluster.monitors[0].pubkey.as_deref(),
            Some("ssh-rsa AAAA root@cephadminmon")
        );
        let mon_key = dir.path().join("prod/pubkeys/cephmon1.prod.pub");
        assert_eq!(
            read_pubkey(&mon_key).unwrap().as_deref(),
            Some("ssh-rsa AAAA root@cephadminmon")
        );
    }

    #[test]
    fn test_read_pubkey() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("key.pub");
        assert_eq!(read_pubkey(&path).unwrap(), None);

        fs::write(&path, "ssh-rsa BBBB root@host\n\n").unwrap();
        assert_eq!(read_pubkey(&path).unwrap().as_deref(), Some("ssh-rsa BBBB root@host"));

        fs::write(&path, "\n").unwrap();
        assert_eq!(read_pubkey(&path).unwrap(), None);
    }

    #[test]
    fn test_pubkey_path() {
        let cluster = populated();
        let admin = cluster.admin().unwrap();
        assert_eq!(
            cluster.pubkey_path(Path::new("/data"), admin),
            PathBuf::from("/data/prod/pubkeys/cephadmin.prod.pub")
        );
    }
}
