//! Resource Catalog
//!
//! Per-class name → locator maps plus the cache of fetched documents. The
//! catalog never refreshes itself: discovery produces fresh maps which are
//! swapped in wholesale, and documents are overwritten only when fetched
//! again.

use crate::vcd::client::VcdClient;
use crate::vcd::error::{VcdError, VcdResult};
use crate::vcd::xml::XmlElement;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Name → href for one resource class
pub type LocatorMap = BTreeMap<String, String>;

/// Kinds of resources the driver discovers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceClass {
    Org,
    Vdc,
    DcNetwork,
    VappNetwork,
    Vapp,
    Template,
    Vm,
}

impl ResourceClass {
    pub const ALL: [ResourceClass; 7] = [
        Self::Org,
        Self::Vdc,
        Self::DcNetwork,
        Self::VappNetwork,
        Self::Vapp,
        Self::Template,
        Self::Vm,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Org => "organization",
            Self::Vdc => "virtual datacenter",
            Self::DcNetwork => "datacenter network",
            Self::VappNetwork => "vApp network",
            Self::Vapp => "vApp",
            Self::Template => "vApp template",
            Self::Vm => "virtual machine",
        }
    }
}

impl fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Discovered locators and cached documents for one session
#[derive(Debug, Default)]
pub struct Catalog {
    session: Option<XmlElement>,
    locators: HashMap<ResourceClass, LocatorMap>,
    configs: HashMap<ResourceClass, HashMap<String, XmlElement>>,
    metadata: HashMap<(ResourceClass, String), XmlElement>,
}

impl Catalog {
    /// Start a catalog from the session document returned at login
    pub fn new(session: XmlElement) -> Self {
        Self {
            session: Some(session),
            ..Self::default()
        }
    }

    pub fn session(&self) -> Option<&XmlElement> {
        self.session.as_ref()
    }

    /// Snapshot of the current locators for `class`
    pub fn locators(&self, class: ResourceClass) -> LocatorMap {
        self.locators.get(&class).cloned().unwrap_or_default()
    }

    /// Replace the locators for `class`; returns a snapshot of the new map
    pub fn replace(&mut self, class: ResourceClass, map: LocatorMap) -> LocatorMap {
        tracing::trace!("Discovered {} {}(s)", map.len(), class);
        self.locators.insert(class, map.clone());
        map
    }

    pub fn contains(&self, class: ResourceClass, name: &str) -> bool {
        self.locators
            .get(&class)
            .map(|m| m.contains_key(name))
            .unwrap_or(false)
    }

    /// Locator of `name`, or `NotDiscovered` if its scope was never listed
    pub fn locate(&self, class: ResourceClass, name: &str) -> VcdResult<&str> {
        self.locators
            .get(&class)
            .and_then(|m| m.get(name))
            .map(String::as_str)
            .ok_or_else(|| VcdError::NotDiscovered {
                class: class.display_name(),
                name: name.to_string(),
            })
    }

    pub fn config(&self, class: ResourceClass, name: &str) -> Option<&XmlElement> {
        self.configs.get(&class).and_then(|m| m.get(name))
    }

    pub fn has_config(&self, class: ResourceClass, name: &str) -> bool {
        self.config(class, name).is_some()
    }

    pub fn store_config(&mut self, class: ResourceClass, name: &str, doc: XmlElement) {
        self.configs
            .entry(class)
            .or_default()
            .insert(name.to_string(), doc);
    }

    pub fn metadata(&self, class: ResourceClass, name: &str) -> Option<&XmlElement> {
        self.metadata.get(&(class, name.to_string()))
    }

    /// Fetch the document behind `name` and cache it
    pub async fn fetch(
        &mut self,
        client: &VcdClient,
        class: ResourceClass,
        name: &str,
    ) -> VcdResult<XmlElement> {
        let href = self.locate(class, name)?.to_string();
        tracing::debug!("HTTP GET for: {}, Calling: {}", name, href);
        let doc = client.get(&href).await?;
        self.store_config(class, name, doc.clone());
        Ok(doc)
    }

    /// Fetch the metadata of `name` and cache it
    pub async fn fetch_metadata(
        &mut self,
        client: &VcdClient,
        class: ResourceClass,
        name: &str,
    ) -> VcdResult<XmlElement> {
        let href = format!("{}/metadata", self.locate(class, name)?);
        tracing::debug!("HTTP GET for: {} metadata, Calling: {}", name, href);
        let doc = client.get(&href).await?;
        self.metadata.insert((class, name.to_string()), doc.clone());
        Ok(doc)
    }

    /// Drop everything, including the session document
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
