//! Resolved provisioning configuration.
//!
//! A [`ProvisionConfig`] is built once, by the resolver, before any resource
//! is created. It is never mutated afterwards; the saga reads from it only.

use std::path::PathBuf;

use crate::models::Channel;
use crate::{Error, Result};

pub const DEFAULT_MANAGER_SIZE: &str = "Standard_A1";
pub const DEFAULT_WORKER_SIZE: &str = "Standard_A1";
pub const DEFAULT_SWARM_NAME: &str = "dockerswarm";
pub const DEFAULT_MANAGER_COUNT: u32 = 1;
pub const DEFAULT_WORKER_COUNT: u32 = 1;

/// Manager counts supported by the swarm template (raft quorum sizes)
pub const MANAGER_COUNTS: &[u32] = &[1, 3, 5];
/// Largest worker pool the swarm template accepts
pub const MAX_WORKER_COUNT: u32 = 15;

/// Everything the saga needs, fully populated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionConfig {
    pub subscription_id: String,
    pub resource_group: String,
    pub service_principal_name: String,
    pub region: String,
    pub ssh_public_key: String,
    pub channel: Channel,
    pub enable_ext_logs: bool,
    pub enable_system_prune: bool,
    pub manager_count: u32,
    pub worker_count: u32,
    pub manager_size: String,
    pub worker_size: String,
    pub swarm_name: String,
    /// Directory the deployment parameter file is written to
    pub work_dir: PathBuf,
}

impl ProvisionConfig {
    /// Check the invariants the saga relies on.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("subscription", &self.subscription_id),
            ("resource group", &self.resource_group),
            ("service principal name", &self.service_principal_name),
            ("region", &self.region),
            ("SSH public key", &self.ssh_public_key),
            ("manager size", &self.manager_size),
            ("worker size", &self.worker_size),
            ("swarm name", &self.swarm_name),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(Error::validation(format!("{} must not be empty", field)));
            }
        }

        if !MANAGER_COUNTS.contains(&self.manager_count) {
            return Err(Error::validation(format!(
                "manager count must be 1, 3 or 5, got {}",
                self.manager_count
            )));
        }

        if !(1..=MAX_WORKER_COUNT).contains(&self.worker_count) {
            return Err(Error::validation(format!(
                "worker count must be between 1 and {}, got {}",
                MAX_WORKER_COUNT, self.worker_count
            )));
        }

        Ok(())
    }

    /// ARM scope of the resource group, used to bound the service principal.
    pub fn resource_group_scope(&self) -> String {
        format!(
            "/subscriptions/{}/resourceGroups/{}",
            self.subscription_id, self.resource_group
        )
    }
}

/// Parse a `y`/`n` flag value.
pub fn parse_yes_no(s: &str) -> std::result::Result<bool, String> {
    match s {
        "y" => Ok(true),
        "n" => Ok(false),
        other => Err(format!("invalid entry '{}', expected 'y' or 'n'", other)),
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> ProvisionConfig {
    ProvisionConfig {
        subscription_id: "sub-123".to_string(),
        resource_group: "swarm-rg".to_string(),
        service_principal_name: "swarm-sp".to_string(),
        region: "westeurope".to_string(),
        ssh_public_key: "ssh-rsa AAAAB3Nza operator@laptop".to_string(),
        channel: Channel::Stable,
        enable_ext_logs: true,
        enable_system_prune: false,
        manager_count: 1,
        worker_count: 1,
        manager_size: DEFAULT_MANAGER_SIZE.to_string(),
        worker_size: DEFAULT_WORKER_SIZE.to_string(),
        swarm_name: DEFAULT_SWARM_NAME.to_string(),
        work_dir: PathBuf::from("."),
    }
}
