//! Provisioning saga
//!
//! Runs the forward steps in a fixed order:
//! 1. Create the resource group
//! 2. Create a service principal scoped to it
//! 3. Deploy the swarm template
//! 4. Open the manager port on the load balancer
//!
//! The first failure stops the run. Every step that had committed by then is
//! compensated, newest first, and nothing else is touched: a failure while
//! deploying deletes the service principal and the resource group, never a NAT
//! rule that was not created. Nothing is retried.

use tracing::{error, info, warn};

use crate::az::AzInvoker;
use crate::config::ProvisionConfig;
use crate::models::ServicePrincipal;
use crate::{Error, Result};

use super::{steps, Step};

/// What has been created so far. The only record of what to undo.
#[derive(Debug, Default)]
struct ProvisioningState {
    resource_group_committed: bool,
    service_principal: Option<ServicePrincipal>,
}

/// A compensation that did not go through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompensationFailure {
    pub step: Step,
    /// Human-readable name of the resource that may have been left behind
    pub resource: String,
    pub reason: String,
}

/// Terminal state of a provisioning run.
#[derive(Debug)]
pub enum ProvisionOutcome {
    /// Every step committed
    Completed { service_principal: ServicePrincipal },
    /// A step failed and all committed steps were compensated
    RolledBack { failed_step: Step, reason: String },
    /// A step failed and some compensations failed too
    PartialRollback {
        failed_step: Step,
        reason: String,
        compensation_failures: Vec<CompensationFailure>,
    },
}

impl ProvisionOutcome {
    /// Collapse into the created service principal, or the matching error.
    pub fn into_result(self) -> Result<ServicePrincipal> {
        match self {
            ProvisionOutcome::Completed { service_principal } => Ok(service_principal),
            ProvisionOutcome::RolledBack {
                failed_step,
                reason,
            } => Err(Error::ProvisioningFailed {
                step: failed_step,
                reason,
            }),
            ProvisionOutcome::PartialRollback {
                failed_step,
                reason,
                compensation_failures,
            } => Err(Error::PartialRollback {
                step: failed_step,
                reason,
                orphaned: compensation_failures
                    .into_iter()
                    .map(|f| f.resource)
                    .collect(),
            }),
        }
    }
}

/// Drives one provisioning run against a resolved configuration.
pub struct Provisioner<'a> {
    az: &'a dyn AzInvoker,
    config: &'a ProvisionConfig,
}

impl<'a> Provisioner<'a> {
    /// Rejects configurations with missing or out-of-range fields up front,
    /// before anything is created.
    pub fn new(az: &'a dyn AzInvoker, config: &'a ProvisionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { az, config })
    }

    /// Run the saga to a terminal outcome.
    pub async fn run(&self) -> ProvisionOutcome {
        let mut state = ProvisioningState::default();

        let (failed_step, err) = match self.forward(&mut state).await {
            Ok(service_principal) => {
                info!(
                    resource_group = %self.config.resource_group,
                    app_id = %service_principal.app_id,
                    "Swarm provisioned"
                );
                return ProvisionOutcome::Completed { service_principal };
            }
            Err(failure) => failure,
        };

        let reason = err.to_string();
        error!(step = %failed_step, error = %reason, "Provisioning failed, rolling back");

        let compensation_failures = self.compensate(state).await;
        if compensation_failures.is_empty() {
            info!("Rollback complete");
            ProvisionOutcome::RolledBack {
                failed_step,
                reason,
            }
        } else {
            ProvisionOutcome::PartialRollback {
                failed_step,
                reason,
                compensation_failures,
            }
        }
    }

    async fn forward(
        &self,
        state: &mut ProvisioningState,
    ) -> std::result::Result<ServicePrincipal, (Step, Error)> {
        info!("[Step 1] Creating resource group...");
        steps::create_resource_group(self.az, self.config)
            .await
            .map_err(|e| (Step::CreateResourceGroup, e))?;
        state.resource_group_committed = true;

        info!("[Step 2] Creating service principal...");
        let sp = steps::create_service_principal(self.az, self.config)
            .await
            .map_err(|e| (Step::CreateServicePrincipal, e))?;
        state.service_principal = Some(sp.clone());

        info!("[Step 3] Deploying swarm template...");
        steps::deploy_swarm(self.az, self.config, &sp)
            .await
            .map_err(|e| (Step::DeploySwarm, e))?;

        info!("[Step 4] Opening manager port...");
        steps::open_manager_port(self.az, self.config)
            .await
            .map_err(|e| (Step::OpenManagerPort, e))?;

        Ok(sp)
    }

    /// Undo committed steps, newest first. Every compensation is attempted
    /// even if an earlier one fails.
    async fn compensate(&self, state: ProvisioningState) -> Vec<CompensationFailure> {
        let mut failures = Vec::new();

        if let Some(sp) = &state.service_principal {
            if let Err(e) = steps::delete_service_principal(self.az, sp).await {
                warn!(app_id = %sp.app_id, error = %e, "Failed to delete service principal");
                failures.push(CompensationFailure {
                    step: Step::DeleteServicePrincipal,
                    resource: format!("service principal {}", sp.app_id),
                    reason: e.to_string(),
                });
            }
        }

        if state.resource_group_committed {
            let rg = &self.config.resource_group;
            if let Err(e) = steps::delete_resource_group(self.az, rg).await {
                warn!(resource_group = %rg, error = %e, "Failed to delete resource group");
                failures.push(CompensationFailure {
                    step: Step::DeleteResourceGroup,
                    resource: format!("resource group {}", rg),
                    reason: e.to_string(),
                });
            }
        }

        failures
    }
}
