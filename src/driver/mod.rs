//! Autoscaling driver
//!
//! The command-line protocol spoken to the load balancer's autoscaler:
//! nodes derived from VMs, change tracking between polls, the JSON
//! responses and the actions that produce them.
//!
//! - [`actions`] - `status`, `createnode`, `destroynode`, `get-vdc-info`
//! - [`delta`] - Snapshot history and change computation
//! - [`node`] - VM to node conversion
//! - [`response`] - JSON response envelopes
//! - [`table`] - Text output for `get-vdc-info`

pub mod actions;
pub mod delta;
pub mod node;
pub mod response;
pub mod table;

pub use node::{NetworkSelection, Node, NodeState};
pub use response::Response;
