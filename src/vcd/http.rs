//! HTTP utilities for VCD REST API calls

use super::auth::{Session, AUTH_HEADER};
use super::error::{VcdError, VcdResult};
use super::xml::XmlElement;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Sanitize response body for logging
/// Truncates long responses and strips control characters
pub(crate) fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut end = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..end], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// Raw response of a mutating call, handed to the task poller
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

/// HTTP client wrapper for VCD API calls
#[derive(Clone)]
pub struct VcdHttpClient {
    client: Client,
}

impl VcdHttpClient {
    /// Create a new HTTP client
    pub fn new() -> VcdResult<Self> {
        let client = Client::builder()
            .user_agent(concat!("vcd-autoscale/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }

    /// Open a session with HTTP basic auth.
    /// Returns the authorization token and the session document.
    pub async fn login(
        &self,
        url: &str,
        accept: &str,
        user: &str,
        password: &str,
    ) -> VcdResult<(String, XmlElement)> {
        tracing::debug!("POST {} (login as {})", url, user);

        let response = self
            .client
            .post(url)
            .header(ACCEPT, accept)
            .basic_auth(user, Some(password))
            .send()
            .await?;

        let status = response.status();
        let token = response
            .headers()
            .get(AUTH_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await?;

        if status.as_u16() != 200 {
            tracing::error!("Authentication failed: {} - {}", status, sanitize_for_log(&body));
            return Err(VcdError::Authentication {
                status: status.as_u16(),
            });
        }

        let token = token.ok_or_else(|| {
            VcdError::Xml(format!("login response carried no {} header", AUTH_HEADER))
        })?;

        Ok((token, XmlElement::parse(&body)?))
    }

    /// GET a VCD document
    pub async fn get(&self, url: &str, session: &Session) -> VcdResult<XmlElement> {
        tracing::debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .header(ACCEPT, session.accept.as_str())
            .header(AUTH_HEADER, session.token.as_str())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&body));
            return Err(VcdError::Transport {
                status: status.as_u16(),
                body,
            });
        }

        XmlElement::parse(&body)
    }

    /// POST to a VCD action link. The status is left for the caller to judge.
    pub async fn post(
        &self,
        url: &str,
        session: &Session,
        content_type: Option<&str>,
        body: Option<String>,
    ) -> VcdResult<RawResponse> {
        tracing::debug!("POST {}", url);

        let mut request = self
            .client
            .post(url)
            .header(ACCEPT, session.accept.as_str())
            .header(AUTH_HEADER, session.token.as_str());

        if let Some(content_type) = content_type {
            request = request.header(CONTENT_TYPE, content_type);
        }
        if let Some(body) = body {
            tracing::trace!("DATA: {}", body);
            request = request.body(body);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        Ok(RawResponse { status, body })
    }
}

/// Format a VCD error for display on the console
pub fn format_vcd_error(error: &VcdError) -> String {
    match error.status() {
        Some(401) => format!(
            "Authentication failed. Check the user and pass settings. {}",
            error
        ),
        Some(403) => format!(
            "Permission denied. Check the VCD user's organization rights. {}",
            error
        ),
        Some(404) => format!("Resource not found. {}", error),
        _ => error.to_string(),
    }
}
