//! Records exchanged with the Azure CLI

use std::fmt;

use serde::Deserialize;

/// An Azure subscription as reported by `az account list`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub name: String,
}

/// A service principal created for the swarm.
///
/// `password` is generated locally and handed to `az`; the identity provider
/// never returns it again, so this value is the only copy.
#[derive(Clone, PartialEq, Eq)]
pub struct ServicePrincipal {
    pub app_id: String,
    pub password: String,
}

impl fmt::Debug for ServicePrincipal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServicePrincipal")
            .field("app_id", &self.app_id)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Release track of the Docker for Azure template.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Channel {
    #[default]
    Stable,
    Edge,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Stable => "stable",
            Channel::Edge => "edge",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
