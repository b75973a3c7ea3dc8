//! VCD Manager
//!
//! The façade the driver actions talk to. Every call resolves the names it
//! needs through the catalog, fetching parent documents on demand, so a
//! caller can ask for a VM's status without listing anything first.

use crate::resource::discovery;
use crate::resource::{Catalog, LocatorMap, RecomposeBuilder, ResourceClass, RECOMPOSE_CONTENT_TYPE};
use crate::vcd::client::VcdClient;
use crate::vcd::error::{VcdError, VcdResult};
use crate::vcd::task::{classify_shutdown, ShutdownOutcome, TaskPoller, TaskStatus};
use crate::vcd::xml::{build_metadata, build_undeploy, metadata_value, MetadataValue, XmlElement};
use std::collections::BTreeMap;
use std::time::Duration;

pub const METADATA_CONTENT_TYPE: &str = "application/vnd.vmware.vcloud.metadata+xml";
pub const UNDEPLOY_CONTENT_TYPE: &str = "application/vnd.vmware.vcloud.undeployVAppParams+xml";

/// Metadata key holding a VM's creation time
pub const CREATED_KEY: &str = "created";

/// Creation time reported for VMs that never had one recorded
pub const EPOCH_STAMP: &str = "1970-01-01T00:00:00Z";

/// Live state of one VM as reported by VCD
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmStatus {
    pub id: String,
    pub name: String,
    /// Raw VCD status code (4 = powered on)
    pub status: i32,
    pub deployed: bool,
    pub needs_customization: bool,
    /// Network name → IP address, empty while unassigned
    pub nets: BTreeMap<String, String>,
}

impl VmStatus {
    pub fn from_document(vm: &XmlElement) -> VcdResult<Self> {
        let name = vm.attr("name").unwrap_or_default().to_string();
        let status = vm
            .attr("status")
            .and_then(|s| s.trim().parse().ok())
            .ok_or_else(|| VcdError::Xml(format!("VM '{}' has no valid status", name)))?;

        let nets = vm
            .find_all("NetworkConnection")
            .into_iter()
            .filter_map(|conn| {
                let network = conn.attr("network")?;
                let ip = conn.find("IpAddress").map(|ip| ip.text.clone()).unwrap_or_default();
                Some((network.to_string(), ip))
            })
            .collect();

        Ok(Self {
            id: vm.attr("id").unwrap_or_default().to_string(),
            name,
            status,
            deployed: vm.attr("deployed") == Some("true"),
            needs_customization: vm.attr("needsCustomization") == Some("true"),
            nets,
        })
    }
}

fn no_session() -> VcdError {
    VcdError::ConfigurationMissing("you must call setup_session() first".to_string())
}

/// Façade over discovery, mutation and task polling for one org/vdc
pub struct VcdManager {
    client: VcdClient,
    catalog: Option<Catalog>,
    org: Option<String>,
    vdc: Option<String>,
    poller: TaskPoller,
    customize: bool,
    terminate_on_shutdown: bool,
}

impl VcdManager {
    /// `org` and `vdc` are the defaults used when a call does not name one
    pub fn new(api: &str, org: Option<&str>, vdc: Option<&str>) -> VcdResult<Self> {
        Ok(Self {
            client: VcdClient::new(api)?,
            catalog: None,
            org: org.map(str::to_string),
            vdc: vdc.map(str::to_string),
            poller: TaskPoller::default(),
            customize: false,
            terminate_on_shutdown: true,
        })
    }

    pub fn with_poller(mut self, poller: TaskPoller) -> Self {
        self.poller = poller;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.poller.timeout = timeout;
        self
    }

    /// Request guest customization on VMs added from now on
    pub fn enable_customization(&mut self, customize: bool) {
        self.customize = customize;
    }

    /// `true` powers VMs off hard on shutdown, `false` asks the guest
    pub fn set_terminate_on_shutdown(&mut self, terminate: bool) {
        self.terminate_on_shutdown = terminate;
    }

    pub async fn setup_session(&mut self, user: &str, password: &str) -> VcdResult<()> {
        let session = self.client.login(user, password).await?;
        self.catalog = Some(Catalog::new(session));
        Ok(())
    }

    pub fn close_session(&mut self) {
        self.client.close();
        self.catalog = None;
    }

    pub fn catalog(&self) -> Option<&Catalog> {
        self.catalog.as_ref()
    }

    fn catalog_ref(&self) -> VcdResult<&Catalog> {
        self.catalog.as_ref().ok_or_else(no_session)
    }

    fn catalog_mut(&mut self) -> VcdResult<&mut Catalog> {
        self.catalog.as_mut().ok_or_else(no_session)
    }

    fn resolve_org(&self, org: Option<&str>) -> VcdResult<String> {
        self.catalog_ref()?;
        org.or(self.org.as_deref()).map(str::to_string).ok_or_else(|| {
            VcdError::ConfigurationMissing(
                "no default org was given, so one must be passed explicitly".to_string(),
            )
        })
    }

    fn resolve_vdc(&self, vdc: Option<&str>) -> VcdResult<String> {
        self.catalog_ref()?;
        vdc.or(self.vdc.as_deref()).map(str::to_string).ok_or_else(|| {
            VcdError::ConfigurationMissing(
                "no default vdc was given, so one must be passed explicitly".to_string(),
            )
        })
    }

    /// Cached document of an already fetched resource
    fn cached(&self, class: ResourceClass, name: &str) -> VcdResult<&XmlElement> {
        self.catalog_ref()?
            .config(class, name)
            .ok_or_else(|| VcdError::NotDiscovered {
                class: class.display_name(),
                name: name.to_string(),
            })
    }

    fn has_config(&self, class: ResourceClass, name: &str) -> bool {
        self.catalog
            .as_ref()
            .map(|c| c.has_config(class, name))
            .unwrap_or(false)
    }

    fn is_listed(&self, class: ResourceClass, name: &str) -> bool {
        self.catalog
            .as_ref()
            .map(|c| c.contains(class, name))
            .unwrap_or(false)
    }

    fn locate(&self, class: ResourceClass, name: &str) -> VcdResult<String> {
        Ok(self.catalog_ref()?.locate(class, name)?.to_string())
    }

    async fn fetch(&mut self, class: ResourceClass, name: &str) -> VcdResult<XmlElement> {
        let catalog = self.catalog.as_mut().ok_or_else(no_session)?;
        catalog.fetch(&self.client, class, name).await
    }

    async fn fetch_metadata(&mut self, class: ResourceClass, name: &str) -> VcdResult<XmlElement> {
        let catalog = self.catalog.as_mut().ok_or_else(no_session)?;
        catalog.fetch_metadata(&self.client, class, name).await
    }

    async fn submit(
        &self,
        name: &str,
        uri: &str,
        content_type: Option<&str>,
        body: Option<String>,
    ) -> VcdResult<TaskStatus> {
        self.poller
            .submit(&self.client, name, uri, content_type, body)
            .await
    }

    // =========================================================================
    // Organizations and virtual datacenters
    // =========================================================================

    pub fn list_orgs(&mut self) -> VcdResult<LocatorMap> {
        let catalog = self.catalog_mut()?;
        let orgs = discovery::orgs(catalog.session().ok_or_else(no_session)?);
        Ok(catalog.replace(ResourceClass::Org, orgs))
    }

    pub async fn get_org_config(&mut self, org: Option<&str>) -> VcdResult<XmlElement> {
        let org = self.resolve_org(org)?;
        self.list_orgs()?;
        self.fetch(ResourceClass::Org, &org).await
    }

    pub async fn list_vdcs(&mut self, org: Option<&str>) -> VcdResult<LocatorMap> {
        let org = self.resolve_org(org)?;
        if !self.has_config(ResourceClass::Org, &org) {
            self.get_org_config(Some(&org)).await?;
        }
        let vdcs = discovery::vdcs(self.cached(ResourceClass::Org, &org)?);
        Ok(self.catalog_mut()?.replace(ResourceClass::Vdc, vdcs))
    }

    pub async fn get_vdc_config(
        &mut self,
        org: Option<&str>,
        vdc: Option<&str>,
    ) -> VcdResult<XmlElement> {
        let vdc = self.resolve_vdc(vdc)?;
        self.list_vdcs(org).await?;
        self.fetch(ResourceClass::Vdc, &vdc).await
    }

    /// Make sure the vdc document is cached; returns its name
    async fn ensure_vdc(&mut self, org: Option<&str>, vdc: Option<&str>) -> VcdResult<String> {
        let vdc = self.resolve_vdc(vdc)?;
        if !self.has_config(ResourceClass::Vdc, &vdc) {
            self.get_vdc_config(org, Some(&vdc)).await?;
        }
        Ok(vdc)
    }

    // =========================================================================
    // vApps and templates
    // =========================================================================

    /// List vApps; also refreshes the template listing of the same vdc
    pub async fn list_vapps(
        &mut self,
        org: Option<&str>,
        vdc: Option<&str>,
    ) -> VcdResult<LocatorMap> {
        let vdc = self.ensure_vdc(org, vdc).await?;
        let doc = self.cached(ResourceClass::Vdc, &vdc)?;
        let (vapps, templates) = (discovery::vapps(doc), discovery::templates(doc));

        let catalog = self.catalog_mut()?;
        catalog.replace(ResourceClass::Template, templates);
        Ok(catalog.replace(ResourceClass::Vapp, vapps))
    }

    pub async fn list_vapp_templates(
        &mut self,
        org: Option<&str>,
        vdc: Option<&str>,
    ) -> VcdResult<LocatorMap> {
        self.list_vapps(org, vdc).await?;
        Ok(self.catalog_ref()?.locators(ResourceClass::Template))
    }

    pub async fn get_vapp_config(&mut self, vapp: &str) -> VcdResult<XmlElement> {
        self.list_vapps(None, None).await?;
        self.fetch(ResourceClass::Vapp, vapp).await
    }

    pub async fn get_vapp_template_config(&mut self, template: &str) -> VcdResult<XmlElement> {
        self.list_vapps(None, None).await?;
        self.fetch(ResourceClass::Template, template).await
    }

    async fn ensure_vapp(&mut self, vapp: &str) -> VcdResult<()> {
        if !self.has_config(ResourceClass::Vapp, vapp) {
            self.get_vapp_config(vapp).await?;
        }
        Ok(())
    }

    // =========================================================================
    // Virtual machines
    // =========================================================================

    pub async fn list_vapp_vms(&mut self, vapp: &str) -> VcdResult<LocatorMap> {
        self.ensure_vapp(vapp).await?;
        let vms = discovery::vms(self.cached(ResourceClass::Vapp, vapp)?);
        Ok(self.catalog_mut()?.replace(ResourceClass::Vm, vms))
    }

    pub async fn get_vm_config(&mut self, vapp: &str, vm: &str) -> VcdResult<XmlElement> {
        self.list_vapp_vms(vapp).await?;
        self.fetch(ResourceClass::Vm, vm).await
    }

    /// Status of one VM, or of every VM in the vApp
    pub async fn get_vm_status(
        &mut self,
        vapp: &str,
        vm: Option<&str>,
    ) -> VcdResult<BTreeMap<String, VmStatus>> {
        let names: Vec<String> = match vm {
            Some(vm) => vec![vm.to_string()],
            None => self.list_vapp_vms(vapp).await?.into_keys().collect(),
        };

        let mut status = BTreeMap::new();
        for name in names {
            let config = self.get_vm_config(vapp, &name).await?;
            status.insert(name, VmStatus::from_document(&config)?);
        }
        Ok(status)
    }

    // =========================================================================
    // Networks
    // =========================================================================

    pub async fn list_networks(
        &mut self,
        org: Option<&str>,
        vdc: Option<&str>,
    ) -> VcdResult<LocatorMap> {
        let vdc = self.ensure_vdc(org, vdc).await?;
        let networks = discovery::dc_networks(self.cached(ResourceClass::Vdc, &vdc)?);
        Ok(self.catalog_mut()?.replace(ResourceClass::DcNetwork, networks))
    }

    pub async fn get_network_config(&mut self, network: &str) -> VcdResult<XmlElement> {
        self.list_networks(None, None).await?;
        self.fetch(ResourceClass::DcNetwork, network).await
    }

    pub async fn list_vapp_networks(&mut self, vapp: &str) -> VcdResult<LocatorMap> {
        self.ensure_vapp(vapp).await?;
        let networks = discovery::vapp_networks(self.cached(ResourceClass::Vapp, vapp)?);
        Ok(self.catalog_mut()?.replace(ResourceClass::VappNetwork, networks))
    }

    pub async fn get_vapp_network_config(
        &mut self,
        vapp: &str,
        network: &str,
    ) -> VcdResult<XmlElement> {
        self.list_vapp_networks(vapp).await?;
        self.fetch(ResourceClass::VappNetwork, network).await
    }

    // =========================================================================
    // Metadata
    // =========================================================================

    pub async fn get_vapp_metadata(&mut self, vapp: &str) -> VcdResult<XmlElement> {
        self.list_vapps(None, None).await?;
        self.fetch_metadata(ResourceClass::Vapp, vapp).await
    }

    pub async fn get_vapp_metadata_value(
        &mut self,
        vapp: &str,
        key: &str,
    ) -> VcdResult<Option<String>> {
        let metadata = self.get_vapp_metadata(vapp).await?;
        Ok(metadata_value(&metadata, key))
    }

    pub async fn set_vapp_metadata(
        &mut self,
        vapp: &str,
        entries: &[(String, MetadataValue)],
    ) -> VcdResult<TaskStatus> {
        self.list_vapps(None, None).await?;
        let uri = format!("{}/metadata", self.locate(ResourceClass::Vapp, vapp)?);
        self.submit_metadata(&uri, entries).await
    }

    pub async fn get_vm_metadata(&mut self, vapp: &str, vm: &str) -> VcdResult<XmlElement> {
        self.list_vapp_vms(vapp).await?;
        self.fetch_metadata(ResourceClass::Vm, vm).await
    }

    pub async fn get_vm_metadata_value(
        &mut self,
        vapp: &str,
        vm: &str,
        key: &str,
    ) -> VcdResult<Option<String>> {
        let metadata = self.get_vm_metadata(vapp, vm).await?;
        Ok(metadata_value(&metadata, key))
    }

    pub async fn set_vm_metadata(
        &mut self,
        vapp: &str,
        vm: &str,
        entries: &[(String, MetadataValue)],
    ) -> VcdResult<TaskStatus> {
        self.list_vapp_vms(vapp).await?;
        let uri = format!("{}/metadata", self.locate(ResourceClass::Vm, vm)?);
        self.submit_metadata(&uri, entries).await
    }

    async fn submit_metadata(
        &self,
        uri: &str,
        entries: &[(String, MetadataValue)],
    ) -> VcdResult<TaskStatus> {
        let body = build_metadata(entries).to_xml()?;
        self.submit("Set Metadata", uri, Some(METADATA_CONTENT_TYPE), Some(body))
            .await
    }

    /// Record `stamp` as the VM's creation time
    pub async fn set_vm_creation_time(
        &mut self,
        vapp: &str,
        vm: &str,
        stamp: &str,
    ) -> VcdResult<TaskStatus> {
        let entry = (CREATED_KEY.to_string(), MetadataValue::DateTime(stamp.to_string()));
        self.set_vm_metadata(vapp, vm, &[entry]).await
    }

    /// The VM's recorded creation time, or the epoch if none was recorded
    pub async fn get_vm_creation_time(&mut self, vapp: &str, vm: &str) -> VcdResult<String> {
        Ok(self
            .get_vm_metadata_value(vapp, vm, CREATED_KEY)
            .await?
            .unwrap_or_else(|| EPOCH_STAMP.to_string()))
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Add a VM named `vm` to `vapp` from `template`.
    ///
    /// The template's document and the vApp networks must have been fetched
    /// beforehand. On success the vApp and its VM listing are refreshed; any
    /// other status is returned with the catalog untouched.
    pub async fn create_vm(
        &mut self,
        vapp: &str,
        template: &str,
        networks: &[String],
        ip_mode: &str,
        vm: &str,
    ) -> VcdResult<TaskStatus> {
        if !self.is_listed(ResourceClass::Vapp, vapp) {
            self.list_vapps(None, None).await?;
        }
        let uri = format!("{}/action/recomposeVApp", self.locate(ResourceClass::Vapp, vapp)?);

        let mut builder = RecomposeBuilder::new(self.customize);
        builder.add_vm(self.catalog_ref()?, template, networks, ip_mode, vm)?;
        let body = builder.to_xml()?;

        tracing::info!("Adding VM {} to vApp {} from template {}", vm, vapp, template);
        let status = self
            .submit("Recompose VAPP", &uri, Some(RECOMPOSE_CONTENT_TYPE), Some(body))
            .await?;

        if status.is_success() {
            self.get_vapp_config(vapp).await?;
            self.list_vapp_vms(vapp).await?;
        }
        Ok(status)
    }

    /// Power `vm` off and remove it from `vapp`.
    /// The VM stays in the local catalog until the vApp is listed again.
    pub async fn destroy_vm(&mut self, vapp: &str, vm: &str) -> VcdResult<TaskStatus> {
        if !self.is_listed(ResourceClass::Vm, vm) {
            self.get_vm_config(vapp, vm).await?;
        }
        if !self.is_listed(ResourceClass::Vapp, vapp) {
            self.list_vapps(None, None).await?;
        }
        let vm_href = self.locate(ResourceClass::Vm, vm)?;
        let uri = format!("{}/action/recomposeVApp", self.locate(ResourceClass::Vapp, vapp)?);

        self.shutdown(vm).await?;

        let mut builder = RecomposeBuilder::new(self.customize);
        builder.delete_vm(&vm_href);
        let body = builder.to_xml()?;

        tracing::info!("Removing VM {} from vApp {}", vm, vapp);
        self.submit("Recompose VAPP", &uri, Some(RECOMPOSE_CONTENT_TYPE), Some(body))
            .await
    }

    pub async fn power_on(&self, vm: &str) -> VcdResult<TaskStatus> {
        let uri = format!("{}/power/action/powerOn", self.locate(ResourceClass::Vm, vm)?);
        self.submit("Power On", &uri, None, None).await
    }

    /// Undeploy `vm`. A VM that is already off is not an error.
    pub async fn shutdown(&self, vm: &str) -> VcdResult<ShutdownOutcome> {
        let uri = format!("{}/action/undeploy", self.locate(ResourceClass::Vm, vm)?);
        let action = if self.terminate_on_shutdown {
            "powerOff"
        } else {
            "shutdown"
        };
        let body = build_undeploy(action).to_xml()?;

        let result = self
            .submit("Power Off", &uri, Some(UNDEPLOY_CONTENT_TYPE), Some(body))
            .await;
        classify_shutdown(result)
    }
}
