//! Integration tests for the VCD façade and task poller using wiremock
//!
//! A mocked VCD serves a small hierarchy (one org, one vdc, one vApp with a
//! single VM, one template) and the tests drive discovery, mutations and
//! the driver actions against it.

use std::time::Duration;
use vcd_autoscale::config::{Config, Options};
use vcd_autoscale::driver::{actions, NodeState, Response};
use vcd_autoscale::manager::VcdManager;
use vcd_autoscale::vcd::client::VcdClient;
use vcd_autoscale::vcd::task::{ShutdownOutcome, TaskPoller, TaskStatus};
use vcd_autoscale::vcd::VcdError;
use wiremock::matchers::{basic_auth, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const NS: &str = "http://www.vmware.com/vcloud/v1.5";
const TOKEN: &str = "tok-123";

/// Mocked VCD hierarchy
mod fixtures {
    use super::*;

    pub struct FakeVcd {
        pub server: MockServer,
    }

    impl FakeVcd {
        pub async fn start() -> Self {
            let server = MockServer::start().await;
            let fake = Self { server };
            fake.mount_hierarchy().await;
            fake
        }

        pub fn api(&self) -> String {
            format!("{}/api", self.server.uri())
        }

        pub fn href(&self, p: &str) -> String {
            format!("{}/api/{}", self.server.uri(), p)
        }

        pub async fn requests(&self, verb: &str, p: &str) -> Vec<Request> {
            self.server
                .received_requests()
                .await
                .unwrap_or_default()
                .into_iter()
                .filter(|r| r.method.as_str() == verb && r.url.path() == p)
                .collect()
        }

        pub async fn posts(&self) -> Vec<Request> {
            self.server
                .received_requests()
                .await
                .unwrap_or_default()
                .into_iter()
                .filter(|r| r.method.as_str() == "POST" && r.url.path() != "/api/sessions")
                .collect()
        }

        async fn get_xml(&self, p: &str, body: String) {
            Mock::given(method("GET"))
                .and(path(p))
                .and(header("x-vcloud-authorization", TOKEN))
                .respond_with(ResponseTemplate::new(200).set_body_string(body))
                .mount(&self.server)
                .await;
        }

        /// Serve `body` for `p` ahead of the default hierarchy
        pub async fn override_xml(&self, p: &str, body: String) {
            Mock::given(method("GET"))
                .and(path(p))
                .respond_with(ResponseTemplate::new(200).set_body_string(body))
                .with_priority(1)
                .mount(&self.server)
                .await;
        }

        /// Accept a POST to `p` with a task that has already succeeded
        pub async fn accept_task(&self, p: &str) {
            Mock::given(method("POST"))
                .and(path(p))
                .and(header("x-vcloud-authorization", TOKEN))
                .respond_with(ResponseTemplate::new(202).set_body_string(task(
                    &self.href("task/done"),
                    "success",
                )))
                .mount(&self.server)
                .await;
        }

        pub async fn get_task_success(&self, p: &str) {
            let href = format!("{}{}", self.server.uri(), p);
            self.get_xml(p, task(&href, "success")).await;
        }

        async fn mount_hierarchy(&self) {
            Mock::given(method("POST"))
                .and(path("/api/sessions"))
                .and(basic_auth("admin@acme", "secret"))
                .and(header("accept", "application/*+xml;version=5.1"))
                .respond_with(
                    ResponseTemplate::new(200)
                        .insert_header("x-vcloud-authorization", TOKEN)
                        .set_body_string(format!(
                            r#"<Session xmlns="{NS}" user="admin">
  <Link rel="down" type="application/vnd.vmware.vcloud.orgList+xml" href="{}"/>
  <Link rel="down" type="application/vnd.vmware.vcloud.org+xml" name="acme" href="{}"/>
</Session>"#,
                            self.href("org/"),
                            self.href("org/1")
                        )),
                )
                .mount(&self.server)
                .await;

            self.get_xml(
                "/api/org/1",
                format!(
                    r#"<Org xmlns="{NS}" name="acme">
  <Link rel="down" type="application/vnd.vmware.vcloud.vdc+xml" name="vdc1" href="{}"/>
  <Link rel="down" type="application/vnd.vmware.vcloud.catalog+xml" name="public" href="{}"/>
</Org>"#,
                    self.href("vdc/1"),
                    self.href("catalog/1")
                ),
            )
            .await;

            self.get_xml(
                "/api/vdc/1",
                format!(
                    r#"<Vdc xmlns="{NS}" name="vdc1">
  <ResourceEntities>
    <ResourceEntity type="application/vnd.vmware.vcloud.vApp+xml" name="web" href="{}"/>
    <ResourceEntity type="application/vnd.vmware.vcloud.vAppTemplate+xml" name="centos7" href="{}"/>
  </ResourceEntities>
  <AvailableNetworks>
    <Network type="application/vnd.vmware.vcloud.network+xml" name="ext-net" href="{}"/>
  </AvailableNetworks>
</Vdc>"#,
                    self.href("vApp/vapp-1"),
                    self.href("vAppTemplate/t1"),
                    self.href("network/n1")
                ),
            )
            .await;

            self.get_xml("/api/vApp/vapp-1", vapp(self, &["web-1"])).await;

            self.get_xml(
                "/api/vAppTemplate/t1",
                format!(
                    r#"<VAppTemplate xmlns="{NS}" name="centos7">
  <Children><Vm name="centos" href="{}"/></Children>
</VAppTemplate>"#,
                    self.href("vAppTemplate/vm-t1")
                ),
            )
            .await;

            self.get_xml("/api/vApp/vm-1", vm(self, "web-1", 1, 4, true, "10.0.0.5"))
                .await;
            self.get_xml(
                "/api/vApp/vm-1/metadata",
                metadata(&[("created", "MetadataDateTimeValue", "2024-01-01T00:00:00Z")]),
            )
            .await;
            self.get_xml("/api/vApp/vapp-1/metadata", metadata(&[])).await;
        }
    }

    pub fn vapp(fake: &FakeVcd, vms: &[&str]) -> String {
        let children: String = vms
            .iter()
            .enumerate()
            .map(|(i, name)| {
                format!(
                    r#"<Vm name="{}" href="{}"/>"#,
                    name,
                    fake.href(&format!("vApp/vm-{}", i + 1))
                )
            })
            .collect();
        format!(
            r#"<VApp xmlns="{NS}" name="web" href="{}">
  <NetworkConfigSection>
    <NetworkConfig networkName="front">
      <Link rel="repair" href="{}"/>
    </NetworkConfig>
  </NetworkConfigSection>
  <Children>{}</Children>
</VApp>"#,
            fake.href("vApp/vapp-1"),
            fake.href("admin/network/front/action/reset"),
            children
        )
    }

    pub fn vm(fake: &FakeVcd, name: &str, n: u32, status: i32, deployed: bool, ip: &str) -> String {
        format!(
            r#"<Vm xmlns="{NS}" status="{status}" deployed="{deployed}" needsCustomization="false" id="urn:vcloud:vm:{name}" name="{name}" href="{}">
  <NetworkConnectionSection>
    <NetworkConnection network="front" needsCustomization="false">
      <NetworkConnectionIndex>0</NetworkConnectionIndex>
      <IpAddress>{ip}</IpAddress>
      <IsConnected>true</IsConnected>
    </NetworkConnection>
  </NetworkConnectionSection>
</Vm>"#,
            fake.href(&format!("vApp/vm-{n}"))
        )
    }

    pub fn metadata(entries: &[(&str, &str, &str)]) -> String {
        let body: String = entries
            .iter()
            .map(|(key, kind, value)| {
                format!(
                    r#"<MetadataEntry><Key>{key}</Key><TypedValue xsi:type="{kind}"><Value>{value}</Value></TypedValue></MetadataEntry>"#
                )
            })
            .collect();
        format!(
            r#"<Metadata xmlns="{NS}" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">{body}</Metadata>"#
        )
    }

    pub fn task(href: &str, status: &str) -> String {
        format!(r#"<Task xmlns="{NS}" status="{status}" operation="Test" href="{href}"/>"#)
    }

    pub fn options(fake: &FakeVcd, extra: &[(&str, &str)]) -> Options {
        let mut opts: Options = [
            ("apiHost", fake.api()),
            ("user", "admin@acme".to_string()),
            ("pass", "secret".to_string()),
            ("org", "acme".to_string()),
            ("vdc", "vdc1".to_string()),
            ("vapp", "web".to_string()),
            ("sizeid", "small".to_string()),
            ("networks", "front".to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        opts.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        opts
    }
}

use fixtures::FakeVcd;

fn fast_poller() -> TaskPoller {
    TaskPoller::new(Duration::from_secs(5)).with_poll_interval(Duration::from_millis(10))
}

async fn manager(fake: &FakeVcd) -> VcdManager {
    let mut manager = VcdManager::new(&fake.api(), Some("acme"), Some("vdc1"))
        .expect("valid api url")
        .with_poller(fast_poller());
    manager
        .setup_session("admin@acme", "secret")
        .await
        .expect("login should succeed");
    manager
}

fn body_of(request: &Request) -> String {
    String::from_utf8_lossy(&request.body).to_string()
}

/// Session handling and lazy discovery
mod discovery_tests {
    use super::*;

    #[tokio::test]
    async fn test_login_failure_is_authentication_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/sessions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("<Error message=\"bad\"/>"))
            .mount(&server)
            .await;

        let mut manager =
            VcdManager::new(&format!("{}/api", server.uri()), Some("acme"), None).unwrap();
        let err = manager.setup_session("admin@acme", "wrong").await.unwrap_err();
        assert!(matches!(err, VcdError::Authentication { status: 401 }));
    }

    #[tokio::test]
    async fn test_missing_default_scope_is_configuration_error() {
        let fake = FakeVcd::start().await;
        let mut manager = VcdManager::new(&fake.api(), None, None)
            .unwrap()
            .with_poller(fast_poller());
        manager.setup_session("admin@acme", "secret").await.unwrap();

        let err = manager.list_vdcs(None).await.unwrap_err();
        assert!(matches!(err, VcdError::ConfigurationMissing(_)));
        assert!(fake.requests("GET", "/api/org/1").await.is_empty());

        let vdcs = manager.list_vdcs(Some("acme")).await.unwrap();
        assert!(vdcs.contains_key("vdc1"));
        let err = manager.list_vapps(Some("acme"), None).await.unwrap_err();
        assert!(matches!(err, VcdError::ConfigurationMissing(_)));
    }

    #[tokio::test]
    async fn test_vm_status_resolves_whole_chain() {
        let fake = FakeVcd::start().await;
        let mut manager = manager(&fake).await;

        let status = manager.get_vm_status("web", None).await.unwrap();
        assert_eq!(status.len(), 1);

        let vm = &status["web-1"];
        assert_eq!(vm.id, "urn:vcloud:vm:web-1");
        assert_eq!(vm.status, 4);
        assert!(vm.deployed);
        assert_eq!(vm.nets["front"], "10.0.0.5");

        assert_eq!(fake.requests("GET", "/api/org/1").await.len(), 1);
        assert_eq!(fake.requests("GET", "/api/vdc/1").await.len(), 1);
    }

    #[tokio::test]
    async fn test_listings_split_vdc_contents() {
        let fake = FakeVcd::start().await;
        let mut manager = manager(&fake).await;

        let orgs = manager.list_orgs().unwrap();
        assert_eq!(orgs.keys().collect::<Vec<_>>(), vec!["acme"]);

        let templates = manager.list_vapp_templates(None, None).await.unwrap();
        assert_eq!(templates["centos7"], fake.href("vAppTemplate/t1"));

        let networks = manager.list_networks(None, None).await.unwrap();
        assert_eq!(networks["ext-net"], fake.href("network/n1"));

        let vapp_networks = manager.list_vapp_networks("web").await.unwrap();
        assert_eq!(vapp_networks["front"], fake.href("admin/network/front"));
    }

    #[tokio::test]
    async fn test_unknown_names_are_not_discovered() {
        let fake = FakeVcd::start().await;
        let mut manager = manager(&fake).await;

        let err = manager.get_vapp_config("mail").await.unwrap_err();
        assert!(matches!(err, VcdError::NotDiscovered { .. }));

        let err = manager.get_vdc_config(None, Some("vdc9")).await.unwrap_err();
        assert!(matches!(err, VcdError::NotDiscovered { .. }));
    }

    #[tokio::test]
    async fn test_transport_error_carries_status_and_body() {
        let fake = FakeVcd::start().await;
        fake.server
            .register(
                Mock::given(method("GET"))
                    .and(path("/api/vApp/vm-1"))
                    .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
                    .with_priority(1),
            )
            .await;
        let mut manager = manager(&fake).await;

        match manager.get_vm_config("web", "web-1").await {
            Err(VcdError::Transport { status, body }) => {
                assert_eq!(status, 503);
                assert_eq!(body, "maintenance");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}

/// Task submission and polling
mod poller_tests {
    use super::*;

    async fn client(fake: &FakeVcd) -> VcdClient {
        let mut client = VcdClient::new(&fake.api()).unwrap();
        client.login("admin@acme", "secret").await.unwrap();
        client
    }

    #[tokio::test]
    async fn test_running_task_times_out_as_running() {
        let fake = FakeVcd::start().await;
        let task_href = fake.href("task/slow");
        Mock::given(method("POST"))
            .and(path("/api/vApp/vm-1/power/action/powerOn"))
            .respond_with(
                ResponseTemplate::new(202)
                    .set_body_string(fixtures::task(&task_href, "running")),
            )
            .mount(&fake.server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/task/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(fixtures::task(&task_href, "running")),
            )
            .mount(&fake.server)
            .await;

        let client = client(&fake).await;
        let poller = TaskPoller::new(Duration::from_millis(50))
            .with_poll_interval(Duration::from_millis(20));
        let status = poller
            .submit(&client, "Power On", &fake.href("vApp/vm-1/power/action/powerOn"), None, None)
            .await
            .unwrap();

        assert_eq!(status, TaskStatus::Running);
        let polls = fake.requests("GET", "/api/task/slow").await.len();
        assert!((1..=3).contains(&polls), "polled {polls} times");
    }

    #[tokio::test]
    async fn test_task_polled_until_terminal() {
        let fake = FakeVcd::start().await;
        let task_href = fake.href("task/7");
        Mock::given(method("POST"))
            .and(path("/api/vApp/vm-1/power/action/powerOn"))
            .respond_with(
                ResponseTemplate::new(202)
                    .set_body_string(fixtures::task(&task_href, "queued")),
            )
            .mount(&fake.server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/task/7"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(fixtures::task(&task_href, "running")),
            )
            .up_to_n_times(2)
            .mount(&fake.server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/task/7"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(fixtures::task(&task_href, "error")),
            )
            .mount(&fake.server)
            .await;

        let client = client(&fake).await;
        let status = fast_poller()
            .submit(&client, "Power On", &fake.href("vApp/vm-1/power/action/powerOn"), None, None)
            .await
            .unwrap();

        assert_eq!(status, TaskStatus::Error);
        assert_eq!(fake.requests("GET", "/api/task/7").await.len(), 3);
    }

    #[tokio::test]
    async fn test_rejected_submission_is_never_polled() {
        let fake = FakeVcd::start().await;
        Mock::given(method("POST"))
            .and(path("/api/vApp/vm-1/power/action/powerOn"))
            .respond_with(ResponseTemplate::new(500).set_body_string("<Error message=\"boom\"/>"))
            .mount(&fake.server)
            .await;
        let client = client(&fake).await;
        let requests_before = fake.server.received_requests().await.unwrap_or_default().len();
        let err = fast_poller()
            .submit(&client, "Power On", &fake.href("vApp/vm-1/power/action/powerOn"), None, None)
            .await
            .unwrap_err();

        match err {
            VcdError::SubmissionFailed { status, body } => {
                assert_eq!(status, 500);
                assert!(body.contains("boom"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let after: Vec<Request> = fake
            .server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .skip(requests_before)
            .collect();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].method.as_str(), "POST");
        assert!(after.iter().all(|r| r.method.as_str() != "GET"));
    }
}

/// Mutations through the façade
mod mutation_tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_of_stopped_vm_succeeds() {
        let fake = FakeVcd::start().await;
        Mock::given(method("POST"))
            .and(path("/api/vApp/vm-1/action/undeploy"))
            .respond_with(ResponseTemplate::new(400).set_body_string(format!(
                r#"<Error xmlns="{NS}" majorErrorCode="400" message="The requested operation could not be executed since VM &quot;web-1&quot; is not running."/>"#
            )))
            .mount(&fake.server)
            .await;

        let mut manager = manager(&fake).await;
        manager.list_vapp_vms("web").await.unwrap();

        let outcome = manager.shutdown("web-1").await.unwrap();
        assert_eq!(outcome, ShutdownOutcome::AlreadyStopped);
        assert_eq!(outcome.status(), TaskStatus::Success);
    }

    #[tokio::test]
    async fn test_shutdown_other_failures_propagate() {
        let fake = FakeVcd::start().await;
        Mock::given(method("POST"))
            .and(path("/api/vApp/vm-1/action/undeploy"))
            .respond_with(ResponseTemplate::new(403).set_body_string("<Error message=\"denied\"/>"))
            .mount(&fake.server)
            .await;

        let mut manager = manager(&fake).await;
        manager.list_vapp_vms("web").await.unwrap();

        let err = manager.shutdown("web-1").await.unwrap_err();
        assert!(matches!(err, VcdError::SubmissionFailed { status: 403, .. }));
    }

    #[tokio::test]
    async fn test_shutdown_uses_graceful_action_when_not_terminating() {
        let fake = FakeVcd::start().await;
        fake.accept_task("/api/vApp/vm-1/action/undeploy").await;

        let mut manager = manager(&fake).await;
        manager.set_terminate_on_shutdown(false);
        manager.list_vapp_vms("web").await.unwrap();

        let outcome = manager.shutdown("web-1").await.unwrap();
        assert_eq!(outcome, ShutdownOutcome::Completed(TaskStatus::Success));

        let posts = fake.requests("POST", "/api/vApp/vm-1/action/undeploy").await;
        assert!(body_of(&posts[0]).contains("<UndeployPowerAction>shutdown</UndeployPowerAction>"));
    }

    #[tokio::test]
    async fn test_create_vm_recomposes_and_refreshes() {
        let fake = FakeVcd::start().await;
        Mock::given(method("POST"))
            .and(path("/api/vApp/vapp-1/action/recomposeVApp"))
            .and(header(
                "content-type",
                "application/vnd.vmware.vcloud.recomposeVAppParams+xml",
            ))
            .and(body_string_contains("web-2"))
            .respond_with(
                ResponseTemplate::new(202)
                    .set_body_string(fixtures::task(&fake.href("task/1"), "running")),
            )
            .mount(&fake.server)
            .await;
        fake.get_task_success("/api/task/1").await;

        let mut manager = manager(&fake).await;
        manager.get_vapp_template_config("centos7").await.unwrap();
        manager.list_vapp_networks("web").await.unwrap();

        let status = manager
            .create_vm("web", "centos7", &["front".to_string()], "POOL", "web-2")
            .await
            .unwrap();
        assert_eq!(status, TaskStatus::Success);

        let posts = fake.requests("POST", "/api/vApp/vapp-1/action/recomposeVApp").await;
        assert_eq!(posts.len(), 1);
        let body = body_of(&posts[0]);
        assert!(body.contains(&format!(r#"href="{}""#, fake.href("vAppTemplate/vm-t1"))));
        assert!(body.contains("<IpAddressAllocationMode>POOL</IpAddressAllocationMode>"));
        assert!(body.contains(r#"network="front""#));

        // listed once for the networks, once more after the recompose
        assert_eq!(fake.requests("GET", "/api/vApp/vapp-1").await.len(), 2);
    }

    #[tokio::test]
    async fn test_create_vm_rejects_undiscovered_network_without_io() {
        let fake = FakeVcd::start().await;
        let mut manager = manager(&fake).await;
        manager.get_vapp_template_config("centos7").await.unwrap();
        manager.list_vapp_networks("web").await.unwrap();

        let err = manager
            .create_vm("web", "centos7", &["dmz".to_string()], "POOL", "web-2")
            .await
            .unwrap_err();
        assert!(matches!(err, VcdError::UnknownNetwork(n) if n == "dmz"));
        assert!(fake.posts().await.is_empty());
    }

    #[tokio::test]
    async fn test_destroy_vm_shuts_down_then_removes() {
        let fake = FakeVcd::start().await;
        fake.accept_task("/api/vApp/vm-1/action/undeploy").await;
        fake.accept_task("/api/vApp/vapp-1/action/recomposeVApp").await;

        let mut manager = manager(&fake).await;
        let status = manager.destroy_vm("web", "web-1").await.unwrap();
        assert_eq!(status, TaskStatus::Success);

        let posts = fake.posts().await;
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].url.path(), "/api/vApp/vm-1/action/undeploy");
        assert!(body_of(&posts[0]).contains("powerOff"));
        assert_eq!(posts[1].url.path(), "/api/vApp/vapp-1/action/recomposeVApp");
        assert!(body_of(&posts[1]).contains(&format!(
            r#"<DeleteItem href="{}"/>"#,
            fake.href("vApp/vm-1")
        )));

        // still cached locally until the vApp is listed again
        assert!(manager
            .catalog()
            .unwrap()
            .contains(vcd_autoscale::resource::ResourceClass::Vm, "web-1"));
    }

    #[tokio::test]
    async fn test_vm_creation_time_metadata() {
        let fake = FakeVcd::start().await;
        Mock::given(method("POST"))
            .and(path("/api/vApp/vm-1/metadata"))
            .and(header("content-type", "application/vnd.vmware.vcloud.metadata+xml"))
            .respond_with(
                ResponseTemplate::new(202)
                    .set_body_string(fixtures::task(&fake.href("task/done"), "success")),
            )
            .mount(&fake.server)
            .await;

        let mut manager = manager(&fake).await;
        assert_eq!(
            manager.get_vm_creation_time("web", "web-1").await.unwrap(),
            "2024-01-01T00:00:00Z"
        );

        let status = manager
            .set_vm_creation_time("web", "web-1", "2024-05-01T10:00:00Z")
            .await
            .unwrap();
        assert_eq!(status, TaskStatus::Success);

        let posts = fake.requests("POST", "/api/vApp/vm-1/metadata").await;
        let body = body_of(&posts[0]);
        assert!(body.contains("<Key>created</Key>"));
        assert!(body.contains(r#"xsi:type="MetadataDateTimeValue""#));
        assert!(body.contains("<Value>2024-05-01T10:00:00Z</Value>"));
    }

    #[tokio::test]
    async fn test_missing_creation_time_reads_as_epoch() {
        let fake = FakeVcd::start().await;
        fake.override_xml("/api/vApp/vm-1/metadata", fixtures::metadata(&[])).await;

        let mut manager = manager(&fake).await;
        assert_eq!(
            manager.get_vm_creation_time("web", "web-1").await.unwrap(),
            "1970-01-01T00:00:00Z"
        );
    }
}

/// Driver actions end to end
mod action_tests {
    use super::*;
    use serde_json::{json, Value};

    fn node_json(name: &str, ip: &str) -> Value {
        json!({
            "uniq_id": format!("urn:vcloud:vm:{name}"),
            "name": name,
            "sizeid": "small",
            "public_ip": ip,
            "private_ip": ip,
            "status": "active",
            "complete": 100,
            "created": "2024-01-01T00:00:00Z"
        })
    }

    #[tokio::test]
    async fn test_status_reports_every_node() {
        let fake = FakeVcd::start().await;
        let config = Config::from_options(fixtures::options(&fake, &[]), None).unwrap();

        let mut manager = actions::setup(&config).await.unwrap();
        let response = actions::status(&mut manager, &config).await.unwrap();

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["NodeStatusResponse"]["code"], 200);
        assert_eq!(value["NodeStatusResponse"]["nodes"], json!([node_json("web-1", "10.0.0.5")]));
    }

    #[tokio::test]
    async fn test_status_delta_reports_vanished_nodes_and_saves_history() {
        let fake = FakeVcd::start().await;
        let history = json!({
            "100": [node_json("web-1", "10.0.0.5"), node_json("web-9", "10.0.0.9")]
        });
        fake.override_xml(
            "/api/vApp/vapp-1/metadata",
            fixtures::metadata(&[("vtm_history", "MetadataStringValue", &history.to_string())]),
        )
        .await;
        fake.accept_task("/api/vApp/vapp-1/metadata").await;

        let config =
            Config::from_options(fixtures::options(&fake, &[("deltasince", "95")]), None).unwrap();
        let mut manager = actions::setup(&config).await.unwrap();

        let response = actions::status(&mut manager, &config).await.unwrap();
        let Response::NodeStatusResponse(envelope) = response else {
            panic!("expected a status response");
        };
        assert_eq!(envelope.nodes.len(), 1);
        assert_eq!(envelope.nodes[0].name, "web-9");
        assert_eq!(envelope.nodes[0].status, NodeState::Destroyed);
        assert_eq!(envelope.nodes[0].complete, 100);

        let posts = fake.requests("POST", "/api/vApp/vapp-1/metadata").await;
        assert_eq!(posts.len(), 1);
        let body = body_of(&posts[0]);
        assert!(body.contains("<Key>vtm_history</Key>"));
        assert!(body.contains(r#"xsi:type="MetadataStringValue""#));
    }

    #[tokio::test]
    async fn test_status_delta_replaces_unreadable_history() {
        let fake = FakeVcd::start().await;
        let stale = json!({
            "100": [{ "uniq_id": "urn:vcloud:vm:web-9", "name": "web-9", "satus": "pending" }]
        });
        fake.override_xml(
            "/api/vApp/vapp-1/metadata",
            fixtures::metadata(&[("vtm_history", "MetadataStringValue", &stale.to_string())]),
        )
        .await;
        fake.accept_task("/api/vApp/vapp-1/metadata").await;

        let config =
            Config::from_options(fixtures::options(&fake, &[("deltasince", "95")]), None).unwrap();
        let mut manager = actions::setup(&config).await.unwrap();

        let response = actions::status(&mut manager, &config).await.unwrap();
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["NodeStatusResponse"]["nodes"], json!([node_json("web-1", "10.0.0.5")]));

        let posts = fake.requests("POST", "/api/vApp/vapp-1/metadata").await;
        assert_eq!(posts.len(), 1);
        let body = body_of(&posts[0]);
        assert!(body.contains("<Key>vtm_history</Key>"));
        assert!(body.contains("web-1"));
        assert!(!body.contains("satus"));
    }

    #[tokio::test]
    async fn test_create_node_stamps_and_powers_on() {
        let fake = FakeVcd::start().await;
        fake.override_xml("/api/vApp/vapp-1", fixtures::vapp(&fake, &["web-1", "web-2"]))
            .await;
        fake.override_xml("/api/vApp/vm-2", fixtures::vm(&fake, "web-2", 2, 4, true, "10.0.0.6"))
            .await;
        fake.accept_task("/api/vApp/vapp-1/action/recomposeVApp").await;
        fake.accept_task("/api/vApp/vm-2/metadata").await;
        fake.accept_task("/api/vApp/vm-2/power/action/powerOn").await;

        let config = Config::from_options(
            fixtures::options(&fake, &[("name", "web-2"), ("imageid", "centos7")]),
            None,
        )
        .unwrap();
        let mut manager = actions::setup(&config).await.unwrap();
        let response = actions::create_node(&mut manager, &config).await.unwrap();

        let value = serde_json::to_value(&response).unwrap();
        let node = &value["CreateNodeResponse"]["nodes"][0];
        assert_eq!(value["CreateNodeResponse"]["code"], 202);
        assert_eq!(node["name"], "web-2");
        assert_eq!(node["status"], "active");
        assert_eq!(node["public_ip"], "10.0.0.6");

        let paths: Vec<String> =
            fake.posts().await.iter().map(|r| r.url.path().to_string()).collect();
        assert_eq!(
            paths,
            vec![
                "/api/vApp/vapp-1/action/recomposeVApp",
                "/api/vApp/vm-2/metadata",
                "/api/vApp/vm-2/power/action/powerOn",
            ]
        );
        let stamp = body_of(&fake.requests("POST", "/api/vApp/vm-2/metadata").await[0]);
        assert!(stamp.contains(&format!("<Value>{}</Value>", node["created"].as_str().unwrap())));
    }

    #[tokio::test]
    async fn test_create_node_requires_name_and_image() {
        let fake = FakeVcd::start().await;
        let config =
            Config::from_options(fixtures::options(&fake, &[("name", "web-2")]), None).unwrap();
        let mut manager = actions::setup(&config).await.unwrap();

        let err = actions::create_node(&mut manager, &config).await.unwrap_err();
        assert!(err.to_string().contains("--imageid"));
    }

    #[tokio::test]
    async fn test_destroy_node_by_id() {
        let fake = FakeVcd::start().await;
        fake.accept_task("/api/vApp/vm-1/action/undeploy").await;
        fake.accept_task("/api/vApp/vapp-1/action/recomposeVApp").await;

        let config =
            Config::from_options(fixtures::options(&fake, &[("id", "urn:vcloud:vm:web-1")]), None)
                .unwrap();
        let mut manager = actions::setup(&config).await.unwrap();
        let response = actions::destroy_node(&mut manager, &config).await.unwrap();

        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"DestroyNodeResponse": {"version": 1, "code": 202, "nodes": [
                {"created": 0, "uniq_id": "urn:vcloud:vm:web-1", "status": "destroyed", "complete": "80"}
            ]}})
        );
        assert_eq!(fake.posts().await.len(), 2);
    }

    #[tokio::test]
    async fn test_destroy_unknown_node_changes_nothing() {
        let fake = FakeVcd::start().await;
        let config =
            Config::from_options(fixtures::options(&fake, &[("id", "urn:vcloud:vm:gone")]), None)
                .unwrap();
        let mut manager = actions::setup(&config).await.unwrap();
        let response = actions::destroy_node(&mut manager, &config).await.unwrap();

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["DestroyNodeResponse"]["nodes"][0]["uniq_id"], "urn:vcloud:vm:gone");
        assert!(fake.posts().await.is_empty());
    }

    #[tokio::test]
    async fn test_vdc_info_sections() {
        let fake = FakeVcd::start().await;
        let config = Config::from_options(fixtures::options(&fake, &[]), None).unwrap();
        let mut manager = actions::setup(&config).await.unwrap();

        let sections = actions::vdc_info(&mut manager, &config).await.unwrap();
        let titles: Vec<&str> = sections.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(
            titles,
            vec![
                "Organizations",
                "Virtual DCs",
                "Virtual DC Networks",
                "Virtual Apps",
                "Virtual App Networks: web",
                "Virtual AppTemplates",
            ]
        );
        assert!(sections[5].1.contains_key("centos7"));
    }
}
