//! Driver actions
//!
//! One function per command-line action. Each returns what the binary
//! prints: a JSON response or the sections of the `get-vdc-info` table.

use super::delta::{self, History, HISTORY_KEY};
use super::node::{Node, NodeState};
use super::response::Response;
use crate::config::Config;
use crate::manager::VcdManager;
use crate::resource::LocatorMap;
use crate::vcd::error::VcdError;
use crate::vcd::task::TaskStatus;
use crate::vcd::xml::MetadataValue;
use anyhow::{bail, Context, Result};
use chrono::Utc;

/// Timestamp format of the `created` metadata entry
pub const CREATED_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Log in and warm the catalog with the configured vApp
pub async fn setup(config: &Config) -> Result<VcdManager> {
    let mut manager = VcdManager::new(&config.api_host, Some(&config.org), Some(&config.vdc))?
        .with_timeout(config.timeout);

    manager
        .setup_session(&config.user, &config.pass)
        .await
        .with_context(|| format!("Failed to log in to {}", config.api_host))?;
    manager
        .get_vapp_config(&config.vapp)
        .await
        .with_context(|| format!("Failed to load vApp '{}'", config.vapp))?;
    manager.enable_customization(config.customize);

    Ok(manager)
}

/// Current nodes of the vApp, optionally only the one named `filter`
async fn collect_nodes(
    manager: &mut VcdManager,
    config: &Config,
    filter: Option<&str>,
) -> Result<Vec<Node>> {
    let networks = config.require_networks()?;
    let status = manager.get_vm_status(&config.vapp, filter).await?;

    let mut nodes = Vec::with_capacity(status.len());
    for (name, vm) in &status {
        let created = manager.get_vm_creation_time(&config.vapp, name).await?;
        nodes.push(Node::from_vm(vm, networks, &config.sizeid).with_created(created));
    }
    Ok(nodes)
}

/// Read the stored history, run one delta step and write the history back
async fn apply_delta(
    manager: &mut VcdManager,
    vapp: &str,
    since: i64,
    nodes: Vec<Node>,
) -> Result<Vec<Node>> {
    let stored = match manager.get_vapp_metadata_value(vapp, HISTORY_KEY).await? {
        Some(json) => match History::from_json(&json) {
            Ok(history) => Some(history),
            Err(err) => {
                tracing::warn!("Discarding unreadable node history of {}: {:#}", vapp, err);
                None
            }
        },
        None => None,
    };

    let (delta, history) = delta::advance(stored, since, Utc::now().timestamp(), nodes);

    let entry = (HISTORY_KEY.to_string(), MetadataValue::String(history.to_json()?));
    let status = manager.set_vapp_metadata(vapp, &[entry]).await?;
    if !status.is_success() {
        tracing::warn!("Saving node history finished with status {}", status);
    }
    Ok(delta)
}

/// `status`: every node, or only the changes since `deltasince`
pub async fn status(manager: &mut VcdManager, config: &Config) -> Result<Response> {
    let mut nodes = collect_nodes(manager, config, config.name.as_deref()).await?;
    if let Some(since) = config.deltasince {
        nodes = apply_delta(manager, &config.vapp, since, nodes).await?;
    }
    Ok(Response::status(nodes))
}

/// `createnode`: add a VM from a template, stamp it and power it on
pub async fn create_node(manager: &mut VcdManager, config: &Config) -> Result<Response> {
    let (Some(name), Some(template)) = (config.name.as_deref(), config.imageid.as_deref()) else {
        bail!("You must provide --name, and --imageid to create a node");
    };
    let networks = config.require_networks()?;

    manager.get_vapp_template_config(template).await?;
    manager.list_vapp_networks(&config.vapp).await?;

    tracing::info!("Creating node {} from {}", name, template);
    let created = Utc::now().format(CREATED_FORMAT).to_string();
    let status = manager
        .create_vm(&config.vapp, template, networks.configured(), &config.ip_mode, name)
        .await?;

    match status {
        TaskStatus::Success => {}
        TaskStatus::Running => {
            tracing::warn!("Recompose of {} still running after {:?}", name, config.timeout);
            return Ok(Response::created(pending_node(name, config, created)));
        }
        other => bail!("Recompose of vApp '{}' ended with status {}", config.vapp, other),
    }

    manager
        .set_vm_creation_time(&config.vapp, name, &created)
        .await?;
    let power = manager.power_on(name).await?;
    tracing::debug!("Power on {} finished with status {}", name, power);

    let status = manager.get_vm_status(&config.vapp, Some(name)).await?;
    let vm = status
        .get(name)
        .ok_or_else(|| VcdError::NotFound(name.to_string()))?;
    let node = Node::from_vm(vm, networks, &config.sizeid).with_created(created);
    Ok(Response::created(node))
}

/// Placeholder for a VM whose recompose task is still running
fn pending_node(name: &str, config: &Config, created: String) -> Node {
    Node {
        uniq_id: String::new(),
        name: name.to_string(),
        sizeid: config.sizeid.clone(),
        public_ip: String::new(),
        private_ip: String::new(),
        status: NodeState::Pending,
        complete: 33,
        created,
    }
}

/// `destroynode`: remove the node matching `--name` or `--id`
pub async fn destroy_node(manager: &mut VcdManager, config: &Config) -> Result<Response> {
    if config.name.is_none() && config.id.is_none() {
        bail!("please provide --name or --id to delete node");
    }

    let nodes = collect_nodes(manager, config, None).await?;
    let target = nodes.into_iter().find(|node| {
        config.name.as_deref() == Some(node.name.as_str())
            || config.id.as_deref() == Some(node.uniq_id.as_str())
    });

    let Some(node) = target else {
        tracing::warn!("No node matches name {:?} or id {:?}", config.name, config.id);
        return Ok(Response::destroyed(config.id.clone()));
    };

    tracing::info!("Destroying node {} ({})", node.name, node.uniq_id);
    let status = manager.destroy_vm(&config.vapp, &node.name).await?;
    if !status.is_success() {
        tracing::warn!("Removing {} finished with status {}", node.name, status);
    }
    Ok(Response::destroyed(Some(node.uniq_id)))
}

/// `get-vdc-info`: every resource the configured org and vdc can see
pub async fn vdc_info(
    manager: &mut VcdManager,
    config: &Config,
) -> Result<Vec<(String, LocatorMap)>> {
    Ok(vec![
        ("Organizations".to_string(), manager.list_orgs()?),
        ("Virtual DCs".to_string(), manager.list_vdcs(None).await?),
        ("Virtual DC Networks".to_string(), manager.list_networks(None, None).await?),
        ("Virtual Apps".to_string(), manager.list_vapps(None, None).await?),
        (
            format!("Virtual App Networks: {}", config.vapp),
            manager.list_vapp_networks(&config.vapp).await?,
        ),
        ("Virtual AppTemplates".to_string(), manager.list_vapp_templates(None, None).await?),
    ])
}
