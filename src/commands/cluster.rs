//! `hostprov cluster` - manage cluster inventories

use anyhow::Result;
use colored::Colorize;

use crate::Context;
use crate::cli::{ClusterCommand, NodeArgs};
use crate::cluster::{Cluster, Node};
use crate::paths;
use crate::ui;

pub fn run(ctx: &Context, cmd: ClusterCommand) -> Result<bool> {
    let data_dir = paths::data_dir()?;

    match cmd {
        ClusterCommand::Create { name, dc } => {
            Cluster::create(&data_dir, &name, dc.as_deref())?;
            ui::success(&format!("Created cluster {}", name.bold()));
            if !ctx.quiet {
                ui::dim(&Cluster::file(&data_dir, &name).display().to_string());
            }
        }
        ClusterCommand::AddAdmin(args) => {
            let mut cluster = Cluster::load(&data_dir, &args.cluster)?;
            let fqdn = cluster.add_admin(node(&args))?.label().to_string();
            cluster.save(&data_dir)?;
            ui::success(&format!("Added admin {fqdn} (also monitor cephmon1.{})", cluster.name));
        }
        ClusterCommand::AddServer(args) => {
            let mut cluster = Cluster::load(&data_dir, &args.cluster)?;
            let fqdn = cluster.add_server(node(&args)).label().to_string();
            cluster.save(&data_dir)?;
            ui::success(&format!("Added server {fqdn} (#{})", cluster.servers.len()));
        }
        ClusterCommand::AddClient(args) => {
            let mut cluster = Cluster::load(&data_dir, &args.cluster)?;
            let fqdn = cluster.add_client(node(&args)).label().to_string();
            cluster.save(&data_dir)?;
            ui::success(&format!("Added client {fqdn}"));
        }
        ClusterCommand::Show { name, json } => {
            let cluster = Cluster::load(&data_dir, &name)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&cluster)?);
            } else {
                show(&cluster);
            }
        }
    }

    Ok(true)
}

fn node(args: &NodeArgs) -> Node {
    let id = args.id.as_deref().unwrap_or(&args.public_ip);
    Node::new(id, &args.public_ip, &args.private_ip)
}

fn show(cluster: &Cluster) {
    ui::header(&format!("Cluster {}", cluster.name));
    if let Some(dc) = &cluster.dc {
        ui::kv("datacenter", dc);
    }
    if let Some(updated) = cluster.updated_at {
        ui::kv("updated", &updated.format("%Y-%m-%d %H:%M UTC").to_string());
    }

    ui::section("Admin");
    match &cluster.admin {
        Some(admin) => show_node(admin),
        None => ui::dim("(none)"),
    }

    for (title, nodes) in [
        ("Monitors", &cluster.monitors),
        ("Servers", &cluster.servers),
        ("Clients", &cluster.clients),
    ] {
        ui::section(title);
        if nodes.is_empty() {
            ui::dim("(none)");
        }
        for node in nodes {
            show_node(node);
        }
    }
}

fn show_node(node: &Node) {
    let key = if node.pubkey.is_some() {
        "key".green()
    } else {
        "no key".dimmed()
    };
    println!(
        "  {} {} {} [{}]",
        node.label().bold(),
        node.public_ip,
        format!("({})", node.private_ip).dimmed(),
        key
    );
}
