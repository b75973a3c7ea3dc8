//! VCD Client
//!
//! Main client for interacting with the VCD REST API, combining the
//! session and HTTP functionality.

use super::auth::Session;
use super::error::{VcdError, VcdResult};
use super::http::{RawResponse, VcdHttpClient};
use super::xml::XmlElement;
use url::Url;

/// Main VCD client
#[derive(Clone)]
pub struct VcdClient {
    pub http: VcdHttpClient,
    api: Url,
    session: Option<Session>,
}

impl VcdClient {
    /// Create a client for the API root, e.g. `https://vcd.example.com/api`
    pub fn new(api: &str) -> VcdResult<Self> {
        let normalized = if api.ends_with('/') {
            api.to_string()
        } else {
            format!("{}/", api)
        };
        let api = Url::parse(&normalized).map_err(|e| {
            VcdError::ConfigurationMissing(format!("invalid apiHost '{}': {}", normalized, e))
        })?;

        Ok(Self {
            http: VcdHttpClient::new()?,
            api,
            session: None,
        })
    }

    /// API root, always ending in `/`
    pub fn api_url(&self) -> &str {
        self.api.as_str()
    }

    /// Build the session login URL
    pub fn sessions_url(&self) -> String {
        format!("{}sessions", self.api)
    }

    /// Log in; returns the session document
    pub async fn login(&mut self, user: &str, password: &str) -> VcdResult<XmlElement> {
        let (session, document) =
            Session::establish(&self.http, &self.sessions_url(), user, password).await?;
        self.session = Some(session);
        Ok(document)
    }

    /// Forget the session token
    pub fn close(&mut self) {
        self.session = None;
    }

    pub fn session(&self) -> VcdResult<&Session> {
        self.session.as_ref().ok_or_else(|| {
            VcdError::ConfigurationMissing("no session, log in first".to_string())
        })
    }

    /// Make a GET request to the VCD API
    pub async fn get(&self, url: &str) -> VcdResult<XmlElement> {
        self.http.get(url, self.session()?).await
    }

    /// Make a POST request to the VCD API
    pub async fn post(
        &self,
        url: &str,
        content_type: Option<&str>,
        body: Option<String>,
    ) -> VcdResult<RawResponse> {
        self.http.post(url, self.session()?, content_type, body).await
    }
}
