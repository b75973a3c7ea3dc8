//! Recompose builder
//!
//! Builds `RecomposeVAppParams` documents that add a VM from a template or
//! remove a VM from a vApp. Validation happens against the catalog; no I/O.

use super::catalog::{Catalog, ResourceClass};
use super::discovery::template_vm_href;
use crate::vcd::error::{VcdError, VcdResult};
use crate::vcd::xml::{XmlElement, OVF_NS};
use std::fmt;
use std::str::FromStr;

pub const RECOMPOSE_CONTENT_TYPE: &str = "application/vnd.vmware.vcloud.recomposeVAppParams+xml";

const DEFAULT_DESCRIPTION: &str = "Recompose VApp";
const NETWORK_SECTION_INFO: &str = "Specifies the available VM network connections";

/// How VCD assigns addresses to a new VM's NICs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpAllocationMode {
    Pool,
    Dhcp,
}

impl IpAllocationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pool => "POOL",
            Self::Dhcp => "DHCP",
        }
    }
}

impl FromStr for IpAllocationMode {
    type Err = VcdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "POOL" => Ok(Self::Pool),
            "DHCP" => Ok(Self::Dhcp),
            other => Err(VcdError::InvalidIpMode(other.to_string())),
        }
    }
}

impl fmt::Display for IpAllocationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builder for a vApp recompose document
#[derive(Debug, Clone)]
pub struct RecomposeBuilder {
    root: XmlElement,
    customize: bool,
}

impl RecomposeBuilder {
    /// `customize` requests guest customization on added VMs
    pub fn new(customize: bool) -> Self {
        Self::with_description(customize, DEFAULT_DESCRIPTION)
    }

    pub fn with_description(customize: bool, description: &str) -> Self {
        let root = XmlElement::vcloud_root("RecomposeVAppParams")
            .with_attr("xmlns:ovf", OVF_NS)
            .with_child(XmlElement::new("Description").with_text(description));
        Self { root, customize }
    }

    /// Add a VM named `vm_name` from `template`, connected to `networks` in
    /// order. The template (with its document) and every network must
    /// already be in the catalog.
    pub fn add_vm(
        &mut self,
        catalog: &Catalog,
        template: &str,
        networks: &[String],
        ip_mode: &str,
        vm_name: &str,
    ) -> VcdResult<&mut Self> {
        let source_href = catalog
            .contains(ResourceClass::Template, template)
            .then(|| catalog.config(ResourceClass::Template, template))
            .flatten()
            .and_then(template_vm_href)
            .ok_or_else(|| VcdError::UnknownTemplate(template.to_string()))?
            .to_string();

        if let Some(missing) = networks
            .iter()
            .find(|n| !catalog.contains(ResourceClass::VappNetwork, n))
        {
            return Err(VcdError::UnknownNetwork(missing.clone()));
        }

        let ip_mode: IpAllocationMode = ip_mode.parse()?;

        let mut section = XmlElement::new("NetworkConnectionSection")
            .with_child(XmlElement::new("ovf:Info").with_text(NETWORK_SECTION_INFO));
        for (index, network) in networks.iter().enumerate() {
            section.push(network_connection(index, network, ip_mode));
        }

        let mut item = XmlElement::new("SourcedItem").with_child(
            XmlElement::new("Source")
                .with_attr("href", source_href)
                .with_attr("name", vm_name),
        );
        if self.customize {
            item.push(
                XmlElement::new("VmGeneralParams")
                    .with_child(XmlElement::new("NeedsCustomization").with_text("true")),
            );
        }
        item.push(XmlElement::new("InstantiationParams").with_child(section));

        self.root.push(item);
        Ok(self)
    }

    /// Remove the VM at `vm_href`
    pub fn delete_vm(&mut self, vm_href: &str) -> &mut Self {
        self.root
            .push(XmlElement::new("DeleteItem").with_attr("href", vm_href));
        self
    }

    pub fn document(&self) -> &XmlElement {
        &self.root
    }

    pub fn to_xml(&self) -> VcdResult<String> {
        self.root.to_xml()
    }
}

fn network_connection(index: usize, network: &str, ip_mode: IpAllocationMode) -> XmlElement {
    XmlElement::new("NetworkConnection")
        .with_attr("network", network)
        .with_attr("needsCustomization", "true")
        .with_child(XmlElement::new("NetworkConnectionIndex").with_text(index.to_string()))
        .with_child(XmlElement::new("IpAddress"))
        .with_child(XmlElement::new("IsConnected").with_text("true"))
        .with_child(XmlElement::new("MACAddress"))
        .with_child(XmlElement::new("IpAddressAllocationMode").with_text(ip_mode.as_str()))
}
