//! Swarm provisioning
//!
//! [`steps`] wraps each `az` call the provisioning flow makes; [`saga`]
//! sequences the forward steps and compensates committed ones on failure.

use std::fmt;

pub mod saga;
pub mod steps;

pub use saga::{CompensationFailure, ProvisionOutcome, Provisioner};

/// Named `az` operations, used to attribute failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Login,
    ListSubscriptions,
    SetSubscription,
    CreateResourceGroup,
    CreateServicePrincipal,
    DeploySwarm,
    OpenManagerPort,
    DeleteServicePrincipal,
    DeleteResourceGroup,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Login => "login",
            Step::ListSubscriptions => "list subscriptions",
            Step::SetSubscription => "set subscription context",
            Step::CreateResourceGroup => "create resource group",
            Step::CreateServicePrincipal => "create service principal",
            Step::DeploySwarm => "deploy swarm",
            Step::OpenManagerPort => "open manager port 2376",
            Step::DeleteServicePrincipal => "delete service principal",
            Step::DeleteResourceGroup => "delete resource group",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
