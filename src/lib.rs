//! azswarm - Provision a Docker swarm on Azure
//!
//! Drives the Azure CLI through a fixed sequence of steps (resource group,
//! service principal, swarm template deployment, manager port) and deletes
//! whatever was created if any step fails.
//!
//! # Modules
//!
//! - [`az`] - Azure CLI invocation and output decoding
//! - [`models`] - Subscription, service principal and channel records
//! - [`config`] - The resolved, immutable provisioning configuration
//! - [`resolve`] - Fills the configuration from flags and prompts
//! - [`provision`] - Provisioning steps and the rollback saga
//! - [`commands`] - CLI subcommands
//! - [`error`] - Error types

pub mod az;
pub mod commands;
pub mod config;
pub mod error;
pub mod models;
pub mod provision;
pub mod resolve;

pub use error::{Error, Result};

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::az::AzureCli;
use crate::resolve::StdinPrompter;

const LONG_ABOUT: &str = "\
Provision a Docker for Azure swarm through the Azure CLI.

`azswarm deploy` logs into the Azure CLI if needed, sets the chosen
subscription context, creates a resource group and a Service Principal scoped
to it, deploys the swarm template and opens port 2376 on the manager load
balancer. If any of these fails, the resource group and Service Principal
created so far are deleted again.

Any required parameter not passed on the command line is prompted for.";

/// azswarm - Docker swarm provisioning on Azure
#[derive(Parser, Debug)]
#[command(name = "azswarm")]
#[command(version, about, long_about = LONG_ABOUT)]
pub struct Cli {
    /// Path to the az executable (searched for on PATH if not set)
    #[arg(long, global = true, env = "AZSWARM_AZ_PATH")]
    pub az_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Provision a Docker swarm, rolling back on failure
    Deploy(commands::deploy::DeployArgs),
    /// List the subscriptions available to the logged-in account
    Subscriptions,
}

impl Cli {
    /// Run the CLI command
    pub async fn run(self) -> Result<()> {
        let az = AzureCli::locate(self.az_path.as_deref())?;
        match self.command {
            Commands::Deploy(args) => {
                let prompter = StdinPrompter::new();
                commands::deploy::run(&az, &prompter, args).await
            }
            Commands::Subscriptions => commands::subscriptions::run(&az).await,
        }
    }
}
