//! Resource discovery
//!
//! Pure functions turning a parent document into the locator map of its
//! children. Each call returns a fresh map.

use super::catalog::LocatorMap;
use crate::vcd::xml::XmlElement;

pub const ORG_TYPE: &str = "application/vnd.vmware.vcloud.org+xml";
pub const VDC_TYPE: &str = "application/vnd.vmware.vcloud.vdc+xml";
pub const VAPP_TYPE: &str = "application/vnd.vmware.vcloud.vApp+xml";
pub const TEMPLATE_TYPE: &str = "application/vnd.vmware.vcloud.vAppTemplate+xml";
pub const NETWORK_TYPE: &str = "application/vnd.vmware.vcloud.network+xml";

/// Suffix on the vApp network's action link
const NETWORK_RESET_SUFFIX: &str = "/action/reset";

/// Collect `name → href` for every `element` with the given media type
fn typed_links(doc: &XmlElement, element: &str, media_type: Option<&str>) -> LocatorMap {
    doc.find_all(element)
        .into_iter()
        .filter(|e| media_type.map_or(true, |t| e.attr("type") == Some(t)))
        .filter_map(|e| Some((e.attr("name")?.to_string(), e.attr("href")?.to_string())))
        .collect()
}

/// Organizations linked from the session document
pub fn orgs(session: &XmlElement) -> LocatorMap {
    typed_links(session, "Link", Some(ORG_TYPE))
}

/// Virtual datacenters linked from an org
pub fn vdcs(org: &XmlElement) -> LocatorMap {
    typed_links(org, "Link", Some(VDC_TYPE))
}

/// vApps in a vdc
pub fn vapps(vdc: &XmlElement) -> LocatorMap {
    typed_links(vdc, "ResourceEntity", Some(VAPP_TYPE))
}

/// vApp templates in a vdc
pub fn templates(vdc: &XmlElement) -> LocatorMap {
    typed_links(vdc, "ResourceEntity", Some(TEMPLATE_TYPE))
}

/// Networks available to a vdc
pub fn dc_networks(vdc: &XmlElement) -> LocatorMap {
    typed_links(vdc, "Network", Some(NETWORK_TYPE))
}

/// Networks configured inside a vApp
pub fn vapp_networks(vapp: &XmlElement) -> LocatorMap {
    vapp.find_all("NetworkConfig")
        .into_iter()
        .filter_map(|config| {
            let name = config.attr("networkName")?;
            let link = config.child("Link")?.attr("href")?;
            let href = link.strip_suffix(NETWORK_RESET_SUFFIX).unwrap_or(link);
            Some((name.to_string(), href.to_string()))
        })
        .collect()
}

/// Virtual machines in a vApp
pub fn vms(vapp: &XmlElement) -> LocatorMap {
    typed_links(vapp, "Vm", None)
}

/// Href of the VM inside a vApp template
pub fn template_vm_href(template: &XmlElement) -> Option<&str> {
    template.find("Vm").and_then(|vm| vm.attr("href"))
}
