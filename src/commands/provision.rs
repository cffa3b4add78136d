//! `hostprov provision` - run built-in playbooks for cluster nodes
//!
//! Multi-stage flows run each playbook to completion before the next one,
//! since later stages use what earlier ones fetched (the node's public key).

use anyhow::{Context as AnyhowContext, Result, bail};
use colored::Colorize;
use converge::{ApplyContext, SystemRunner, Task, execute};
use std::fs;
use std::path::{Path, PathBuf};

use crate::Context;
use crate::cli::{ProvisionArgs, ProvisionCommand};
use crate::cluster::{Cluster, Node, read_pubkey};
use crate::paths;
use crate::playbooks::{
    self, AdminNodeVars, AuthorizedKeysVars, CreateClusterVars, HostnameVars, HostsVars,
    MonitorVars, StorageServerVars,
};
use crate::progress::TerminalProgress;
use crate::ui;

use super::run::{execute_options, finish};

/// Hostname given to the combined admin and monitor node
const ADMIN_HOSTNAME: &str = "cephadminmon";

pub fn run(ctx: &Context, cmd: ProvisionCommand) -> Result<bool> {
    let data_dir = paths::data_dir()?;

    match cmd {
        ProvisionCommand::AdminNode(args) => admin_node(ctx, &args, &data_dir),
        ProvisionCommand::Server { args, index } => server(ctx, &args, &data_dir, index),
        ProvisionCommand::Hosts(args) => {
            let cluster = Cluster::load(&data_dir, &args.cluster)?;
            confirm(&args, &["storage host entries"])?;
            stage(ctx, &args, "Host entries", &hosts_tasks(&cluster))
        }
        ProvisionCommand::Authorize { args, index } => {
            let cluster = Cluster::load(&data_dir, &args.cluster)?;
            let (owner, key) = match index {
                Some(index) => {
                    let server = cluster.server(index)?;
                    let key = server.pubkey.clone().with_context(|| {
                        format!("No public key recorded for {}", server.label())
                    })?;
                    (server, key)
                }
                None => (cluster.admin()?, admin_key(&cluster)?),
            };
            confirm(&args, &["authorized keys"])?;
            let tasks = authorize_tasks(&cluster, owner, key);
            stage(ctx, &args, "Authorized keys", &tasks)
        }
        ProvisionCommand::CreateCluster(args) => {
            let cluster = Cluster::load(&data_dir, &args.cluster)?;
            let tasks = create_cluster_tasks(&cluster)?;
            confirm(&args, &["initial cluster configuration"])?;
            stage(ctx, &args, "Create cluster", &tasks)
        }
        ProvisionCommand::Hostname { args, name } => {
            confirm(&args, &["hostname"])?;
            let tasks = playbooks::change_hostname(&HostnameVars { new_hostname: name });
            stage(ctx, &args, "Hostname", &tasks)
        }
    }
}

/// Admin node: hostname, storage host entries, base setup with ceph-deploy,
/// key readback, self-authorization, then the initial cluster configuration
fn admin_node(ctx: &Context, args: &ProvisionArgs, data_dir: &Path) -> Result<bool> {
    let mut cluster = Cluster::load(data_dir, &args.cluster)?;
    let admin = cluster.admin()?.clone();
    confirm(
        args,
        &[
            "hostname",
            "storage host entries",
            "SSH, ntp and root key",
            "ceph-deploy",
            "authorized keys",
            "initial cluster configuration",
        ],
    )?;

    let hostname = playbooks::change_hostname(&HostnameVars {
        new_hostname: ADMIN_HOSTNAME.to_string(),
    });
    if !stage(ctx, args, "Hostname", &hostname)? {
        return Ok(false);
    }
    if let Some(node) = cluster.admin.as_mut() {
        node.hostname = Some(ADMIN_HOSTNAME.to_string());
    }
    cluster.save(data_dir)?;

    if !stage(ctx, args, "Host entries", &hosts_tasks(&cluster))? {
        return Ok(false);
    }

    let pubkey_file = prepare_pubkey_file(&cluster, data_dir, &admin)?;
    let setup = playbooks::admin_node(&AdminNodeVars::new(&pubkey_file));
    if !stage(ctx, args, "Admin node", &setup)? {
        return Ok(false);
    }

    match read_pubkey(&pubkey_file)? {
        Some(key) => {
            cluster.set_admin_pubkey(data_dir, &key)?;
            cluster.save(data_dir)?;
            log::info!("Recorded public key for {}", admin.label());
        }
        None => {
            ui::warn(&format!("Public key {} not found", pubkey_file.display()));
        }
    }

    // The admin reaches itself over SSH as the monitor.
    let key = admin_key(&cluster)?;
    let tasks = authorize_tasks(&cluster, cluster.admin()?, key);
    if !stage(ctx, args, "Authorized keys", &tasks)? {
        return Ok(false);
    }

    stage(ctx, args, "Create cluster", &create_cluster_tasks(&cluster)?)
}

/// Storage server: hostname, base setup, key readback, then admin access
fn server(ctx: &Context, args: &ProvisionArgs, data_dir: &Path, index: usize) -> Result<bool> {
    let mut cluster = Cluster::load(data_dir, &args.cluster)?;
    let node = cluster.server(index)?.clone();
    let admin_pubkey = admin_key(&cluster)?;
    let shortname = node
        .shortname
        .clone()
        .with_context(|| format!("Server #{index} has no name"))?;
    confirm(args, &["hostname", "SSH, ntp and root key", "authorized keys"])?;

    let new_hostname = format!("{shortname}local");
    let hostname = playbooks::change_hostname(&HostnameVars {
        new_hostname: new_hostname.clone(),
    });
    if !stage(ctx, args, "Hostname", &hostname)? {
        return Ok(false);
    }
    cluster.server_mut(index)?.hostname = Some(new_hostname);
    cluster.save(data_dir)?;

    let pubkey_file = prepare_pubkey_file(&cluster, data_dir, &node)?;
    let setup = playbooks::storage_server(&StorageServerVars {
        local_pubkey_file: pubkey_file.clone(),
    });
    if !stage(ctx, args, "Storage server", &setup)? {
        return Ok(false);
    }

    match read_pubkey(&pubkey_file)? {
        Some(key) => {
            cluster.server_mut(index)?.pubkey = Some(key);
            cluster.save(data_dir)?;
            log::info!("Recorded public key for {}", node.label());
        }
        None => {
            ui::warn(&format!("Public key {} not found", pubkey_file.display()));
        }
    }

    // ceph-deploy on the admin node logs in to every server.
    let tasks = authorize_tasks(&cluster, cluster.admin()?, admin_pubkey);
    stage(ctx, args, "Authorized keys", &tasks)
}

fn admin_key(cluster: &Cluster) -> Result<String> {
    match &cluster.admin()?.pubkey {
        Some(key) => Ok(key.clone()),
        None => bail!(
            "No admin public key recorded for cluster '{}'; provision the admin node first",
            cluster.name
        ),
    }
}

fn prepare_pubkey_file(cluster: &Cluster, data_dir: &Path, node: &Node) -> Result<PathBuf> {
    let dir = cluster.pubkey_dir(data_dir);
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    Ok(cluster.pubkey_path(data_dir, node))
}

fn hosts_tasks(cluster: &Cluster) -> Vec<Task> {
    playbooks::modify_hosts_file(&HostsVars {
        host_entries: cluster.storage_host_entries(),
        cluster: cluster.name.clone(),
    })
}

fn authorize_tasks(cluster: &Cluster, owner: &Node, key: String) -> Vec<Task> {
    playbooks::add_authorized_keys(&AuthorizedKeysVars {
        keys: vec![key],
        cluster: cluster.name.clone(),
        owner: owner.label().to_string(),
    })
}

fn create_cluster_tasks(cluster: &Cluster) -> Result<Vec<Task>> {
    let mon = cluster
        .monitors
        .first()
        .with_context(|| format!("Cluster '{}' has no monitor", cluster.name))?;
    let fqdn = mon
        .fqdn
        .clone()
        .with_context(|| format!("Monitor of '{}' has no name", cluster.name))?;

    Ok(playbooks::create_cluster(&CreateClusterVars {
        cluster_name: cluster.name.clone(),
        mon: MonitorVars {
            fqdn,
            pubkey: mon.pubkey.clone(),
        },
        cluster_dir: None,
    }))
}

/// List the stages about to run and ask before touching anything
fn confirm(args: &ProvisionArgs, stages: &[&str]) -> Result<()> {
    ui::header(&format!("Provisioning {} on {}", args.cluster, args.root.display()));
    for (i, name) in stages.iter().enumerate() {
        ui::step(i + 1, stages.len(), name);
    }
    println!();
    if !args.yes && !super::confirm_proceed()? {
        bail!("Aborted");
    }
    Ok(())
}

/// Run one playbook against the node's root; true when no task failed
fn stage(ctx: &Context, args: &ProvisionArgs, title: &str, tasks: &[Task]) -> Result<bool> {
    for task in tasks {
        task.validate()?;
    }

    let runner = SystemRunner;
    let apply_ctx = ApplyContext::new(&runner)
        .with_root(&args.root)
        .with_service_manager(ctx.settings.service_manager);
    let opts = execute_options(ctx, args.continue_on_failure, None);

    if !ctx.quiet {
        ui::section(title);
    }
    let mut progress = TerminalProgress::new(ctx.quiet, ctx.verbose > 0);
    let report = execute(tasks, &apply_ctx, &opts, &mut progress);
    drop(progress);

    let ok = finish(ctx, &[(title.to_string(), report)]);
    if !ok {
        ui::error(&format!("{} failed", title.bold()));
    }
    Ok(ok)
}
