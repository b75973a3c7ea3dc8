//! VCD API interaction module
//!
//! This module provides the core functionality for talking to the vCloud
//! Director REST API: session handling, the HTTP+XML transport, the typed
//! XML schema and the asynchronous task poller.
//!
//! # Module Structure
//!
//! - [`auth`] - Session establishment with HTTP basic auth
//! - [`client`] - Main VCD client bound to one API root and session
//! - [`error`] - Error taxonomy shared by every layer
//! - [`http`] - HTTP utilities for REST+XML calls
//! - [`task`] - Task submission and polling
//! - [`xml`] - Element tree, namespaces and typed documents
//!
//! # Example
//!
//! ```ignore
//! use crate::vcd::client::VcdClient;
//!
//! async fn example() -> crate::vcd::error::VcdResult<()> {
//!     let mut client = VcdClient::new("https://vcd.example.com/api")?;
//!     let session = client.login("admin@acme", "secret").await?;
//!     println!("{} links", session.find_all("Link").len());
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod error;
pub mod http;
pub mod task;
pub mod xml;

pub use error::{VcdError, VcdResult};
