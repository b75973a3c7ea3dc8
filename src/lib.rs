//! vCloud Director autoscaling driver
//!
//! Lets a load balancer's autoscaler add, remove and watch VMs inside one
//! vApp of a vCloud Director organization.

pub mod config;
pub mod driver;
pub mod manager;
pub mod resource;
pub mod vcd;

/// Version injected at compile time via VCD_AUTOSCALE_VERSION (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("VCD_AUTOSCALE_VERSION") {
    Some(v) => v,
    None => "dev",
};
