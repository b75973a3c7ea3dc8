//! Resource abstraction layer
//!
//! Name resolution for the VCD object hierarchy. Resources are discovered
//! lazily by following links in parent documents:
//!
//! ```text
//! Session ─► Org ─► Vdc ─┬─► VApp ─┬─► Vm
//!                        │         └─► vApp networks
//!                        ├─► VAppTemplate
//!                        └─► datacenter networks
//! ```
//!
//! # Architecture
//!
//! - [`catalog`] - Per-class locator maps and the document cache
//! - [`discovery`] - Parsers producing locator maps from parent documents
//! - [`recompose`] - Builder for add/remove VM recompose documents

pub mod catalog;
pub mod discovery;
pub mod recompose;

pub use catalog::{Catalog, LocatorMap, ResourceClass};
pub use recompose::{IpAllocationMode, RecomposeBuilder, RECOMPOSE_CONTENT_TYPE};
