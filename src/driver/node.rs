//! Autoscaling nodes
//!
//! A node is the controller's view of a VM, derived on every call from the
//! VM's live status and the configured network selection.

use crate::manager::VmStatus;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// VCD status code of a powered-on VM
pub const POWERED_ON: i32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    Pending,
    Active,
    Destroyed,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Destroyed => "destroyed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub uniq_id: String,
    pub name: String,
    pub sizeid: String,
    pub public_ip: String,
    pub private_ip: String,
    pub status: NodeState,
    pub complete: u8,
    #[serde(default)]
    pub created: String,
}

impl Node {
    /// Derive a node from a VM's live status. `created` is left empty.
    pub fn from_vm(vm: &VmStatus, networks: &NetworkSelection, sizeid: &str) -> Self {
        let (public_ip, private_ip) = networks.addresses(&vm.nets);
        let assigned = !public_ip.is_empty() && !private_ip.is_empty();
        let (status, complete) = lifecycle(vm.status, vm.deployed, assigned);

        Self {
            uniq_id: vm.id.clone(),
            name: vm.name.clone(),
            sizeid: sizeid.to_string(),
            public_ip,
            private_ip,
            status,
            complete,
            created: String::new(),
        }
    }

    pub fn with_created(mut self, created: impl Into<String>) -> Self {
        self.created = created.into();
        self
    }

    /// Mark the node gone, as reported for VMs missing from the live set
    pub fn destroyed(mut self) -> Self {
        self.status = NodeState::Destroyed;
        self.complete = 100;
        self
    }
}

/// Map a VCD status code to a node state and completion percentage
pub fn lifecycle(status: i32, deployed: bool, ips_assigned: bool) -> (NodeState, u8) {
    match status {
        s if s < POWERED_ON => (NodeState::Pending, 33),
        POWERED_ON if !ips_assigned => (NodeState::Pending, 66),
        POWERED_ON if deployed => (NodeState::Active, 100),
        POWERED_ON => (NodeState::Pending, 66),
        _ if deployed => (NodeState::Pending, 66),
        _ => (NodeState::Destroyed, 100),
    }
}

/// Which VM networks carry the public and private addresses
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkSelection {
    pub pub_net: Option<String>,
    pub priv_net: Option<String>,
    configured: Vec<String>,
}

impl NetworkSelection {
    /// `networks` is the comma separated extra network list
    pub fn new(pub_net: Option<&str>, priv_net: Option<&str>, networks: Option<&str>) -> Self {
        let pub_net = pub_net.map(|n| n.trim().to_string());
        let priv_net = priv_net.map(|n| n.trim().to_string());

        let mut configured: Vec<String> = pub_net.iter().chain(priv_net.iter()).cloned().collect();
        if let Some(networks) = networks {
            configured.extend(networks.split(',').map(|n| n.trim().to_string()));
        }

        Self {
            pub_net,
            priv_net,
            configured,
        }
    }

    /// Public network, private network, then the extra networks, in order
    pub fn configured(&self) -> &[String] {
        &self.configured
    }

    pub fn is_empty(&self) -> bool {
        self.configured.is_empty()
    }

    /// Pick `(public_ip, private_ip)` out of a VM's network → IP map
    pub fn addresses(&self, nets: &BTreeMap<String, String>) -> (String, String) {
        let ip_of = |network: Option<&String>| -> String {
            network
                .and_then(|n| nets.get(n))
                .cloned()
                .unwrap_or_default()
        };

        if self.configured.len() == 1 {
            let ip = ip_of(self.configured.first());
            return (ip.clone(), ip);
        }

        let explicit = |network: &Option<String>| -> Option<String> {
            network.as_ref().and_then(|n| nets.get(n)).cloned()
        };

        let public = explicit(&self.pub_net).unwrap_or_else(|| ip_of(self.configured.first()));
        let private = explicit(&self.priv_net).unwrap_or_else(|| ip_of(self.configured.get(1)));
        (public, private)
    }
}
