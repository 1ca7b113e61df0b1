//! Deploy command - Provision a Docker swarm on Azure
//!
//! This command:
//! 1. Logs into the Azure CLI if not already logged in
//! 2. Resolves every parameter, prompting for the ones not passed as flags
//! 3. Sets the chosen subscription context
//! 4. Creates a new resource group
//! 5. Creates a new Service Principal scoped to the new resource group
//! 6. Deploys a Docker for Azure swarm
//! 7. Opens port 2376 on the manager load balancer
//!
//! If any of steps 4-7 fails, whatever was created is deleted again.

use std::path::PathBuf;

use clap::Args;
use tracing::info;

use crate::az::AzInvoker;
use crate::config::{
    parse_yes_no, DEFAULT_MANAGER_COUNT, DEFAULT_MANAGER_SIZE, DEFAULT_SWARM_NAME,
    DEFAULT_WORKER_COUNT, DEFAULT_WORKER_SIZE,
};
use crate::models::{Channel, ServicePrincipal};
use crate::provision::{steps, Provisioner};
use crate::resolve::{Prompter, Resolver};
use crate::Result;

/// Provision a Docker swarm
#[derive(Args, Debug, Clone)]
pub struct DeployArgs {
    /// Subscription ID to use. Not needed if you only have one subscription
    #[arg(long, env = "AZSWARM_SUBSCRIPTION")]
    pub subscription: Option<String>,

    /// Name of the new resource group to be created
    #[arg(long, env = "AZSWARM_RESOURCE_GROUP")]
    pub resource_group: Option<String>,

    /// Name of the new Service Principal to be created
    #[arg(long, env = "AZSWARM_SERVICE_PRINCIPAL_NAME")]
    pub service_principal_name: Option<String>,

    /// Region to deploy into
    #[arg(long, env = "AZSWARM_REGION")]
    pub region: Option<String>,

    /// SSH public key used to authenticate with the created swarm
    #[arg(long, env = "AZSWARM_SSH_PUBLIC_KEY")]
    pub ssh_public_key: Option<String>,

    /// Docker release channel
    #[arg(long, value_enum, env = "AZSWARM_CHANNEL")]
    pub channel: Option<Channel>,

    /// Store container logs in an Azure storage container (y | n)
    #[arg(
        long,
        env = "AZSWARM_ENABLE_EXT_LOGS",
        default_value = "y",
        value_parser = parse_yes_no,
        action = clap::ArgAction::Set
    )]
    pub enable_ext_logs: bool,

    /// Clean up unused images, containers, networks and volumes (y | n)
    #[arg(
        long,
        env = "AZSWARM_ENABLE_SYSTEM_PRUNE",
        default_value = "n",
        value_parser = parse_yes_no,
        action = clap::ArgAction::Set
    )]
    pub enable_system_prune: bool,

    /// Number of manager nodes (1 | 3 | 5)
    #[arg(long, env = "AZSWARM_MANAGER_COUNT", default_value_t = DEFAULT_MANAGER_COUNT)]
    pub manager_count: u32,

    /// Number of worker nodes (1-15)
    #[arg(long, env = "AZSWARM_WORKER_COUNT", default_value_t = DEFAULT_WORKER_COUNT)]
    pub worker_count: u32,

    /// VM size of the manager nodes. See https://download.docker.com/azure/stable/Docker.tmpl
    #[arg(long, env = "AZSWARM_MANAGER_SIZE", default_value = DEFAULT_MANAGER_SIZE)]
    pub manager_size: String,

    /// VM size of the worker nodes. See https://download.docker.com/azure/stable/Docker.tmpl
    #[arg(long, env = "AZSWARM_WORKER_SIZE", default_value = DEFAULT_WORKER_SIZE)]
    pub worker_size: String,

    /// Prefix for the swarm's Azure resources
    #[arg(long, env = "AZSWARM_SWARM_NAME", default_value = DEFAULT_SWARM_NAME)]
    pub swarm_name: String,

    /// Directory for the transient deployment parameter file
    #[arg(long, env = "AZSWARM_WORK_DIR", default_value = ".")]
    pub work_dir: PathBuf,
}

/// Run the whole deploy flow and return the created service principal.
pub async fn provision(
    az: &dyn AzInvoker,
    prompter: &dyn Prompter,
    args: &DeployArgs,
) -> Result<ServicePrincipal> {
    if !steps::is_logged_in(az).await? {
        steps::login(az).await?;
    }

    let config = Resolver::new(az, prompter).resolve(args).await?;
    steps::set_subscription_context(az, &config.subscription_id).await?;

    info!(
        resource_group = %config.resource_group,
        region = %config.region,
        managers = config.manager_count,
        workers = config.worker_count,
        "Provisioning swarm"
    );
    Provisioner::new(az, &config)?.run().await.into_result()
}

/// Parse `azswarm deploy <extra>` with every `AZSWARM_*` fallback removed, so
/// the caller's environment cannot change the result.
#[cfg(test)]
pub(crate) fn parse_args(extra: &[&str]) -> std::result::Result<DeployArgs, clap::Error> {
    use clap::{CommandFactory, FromArgMatches};

    let command = crate::Cli::command()
        .mut_args(|arg| arg.env(None::<&'static str>))
        .mut_subcommand("deploy", |deploy| {
            deploy.mut_args(|arg| arg.env(None::<&'static str>))
        });
    let mut argv = vec!["azswarm", "deploy"];
    argv.extend_from_slice(extra);
    let matches = command.try_get_matches_from(argv)?;
    match crate::Cli::from_arg_matches(&matches)?.command {
        crate::Commands::Deploy(args) => Ok(args),
        other => panic!("unexpected command {:?}", other),
    }
}

/// Entry point for `azswarm deploy`.
pub async fn run(az: &dyn AzInvoker, prompter: &dyn Prompter, args: DeployArgs) -> Result<()> {
    let sp = provision(az, prompter, &args).await?;
    // The identity provider never hands the secret back, so this is the only chance to see it.
    println!(
        "All done. Your Service Principal password is: {}",
        sp.password
    );
    Ok(())
}
