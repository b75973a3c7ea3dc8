//! VCD Authentication
//!
//! A single session token obtained with HTTP basic auth against
//! `<api>/sessions`. There is no renewal: a stale token makes the next
//! request fail with an authentication error.

use super::error::VcdResult;
use super::http::VcdHttpClient;
use super::xml::XmlElement;

/// Versioned media type sent as `Accept` on every request
pub const API_ACCEPT: &str = "application/*+xml;version=5.1";

/// Header carrying the session token
pub const AUTH_HEADER: &str = "x-vcloud-authorization";

/// An established VCD session
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub accept: String,
}

impl Session {
    /// Log in and return the session plus the session document
    /// (which links to the organizations visible to the user).
    pub async fn establish(
        http: &VcdHttpClient,
        sessions_url: &str,
        user: &str,
        password: &str,
    ) -> VcdResult<(Self, XmlElement)> {
        let (token, document) = http.login(sessions_url, API_ACCEPT, user, password).await?;
        tracing::debug!("Session established for user {}", user);

        Ok((
            Self {
                token,
                accept: API_ACCEPT.to_string(),
            },
            document,
        ))
    }
}
