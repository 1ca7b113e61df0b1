//! One function per `az` operation
//!
//! Every step builds its argument list, runs it through the [`AzInvoker`],
//! and turns a non-zero exit into [`Error::StepFailed`] naming the step.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

use crate::az::{json, AzInvoker, ToolOutput};
use crate::config::ProvisionConfig;
use crate::models::{ServicePrincipal, Subscription};
use crate::{Error, Result};

use super::Step;

/// File name of the deployment parameter file
pub const PARAMETER_FILE_NAME: &str = "sshParam.json";

const PARAMETER_SCHEMA: &str =
    "https://schema.management.azure.com/schemas/2015-01-01/deploymentParameters.json#";

/// Port the manager load balancer exposes for remote Docker API access
pub const MANAGER_PORT: u16 = 2376;
const MANAGER_PORT_RANGE_END: u16 = 2377;
const MANAGER_LOAD_BALANCER: &str = "externalSSHLoadBalancer";
const MANAGER_NAT_POOL: &str = "docker-cloud";

const DEPLOYMENT_NAME: &str = "docker.template";
const SERVICE_PRINCIPAL_YEARS: u32 = 20;

fn args<const N: usize>(parts: [&str; N]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

/// Run `args` and fail with `step` unless `az` exits 0.
async fn run_step(az: &dyn AzInvoker, step: Step, args: Vec<String>) -> Result<ToolOutput> {
    let output = az.run(args).await?;
    if !output.success() {
        return Err(Error::step_failed(
            step,
            format!("az exited with status {}", output.exit_code),
        ));
    }
    Ok(output)
}

/// Template URI for a release channel.
pub fn template_uri(config: &ProvisionConfig) -> String {
    format!("https://download.docker.com/azure/{}/Docker.tmpl", config.channel)
}

/// Fresh random secret for a new service principal.
pub fn generate_secret() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

// =============================================================================
// Account
// =============================================================================

/// Whether `az` has an active login with at least one subscription.
///
/// A non-zero exit here means "not logged in", not a failure.
pub async fn is_logged_in(az: &dyn AzInvoker) -> Result<bool> {
    info!("Checking to see if you are logged in");
    let output = az.run(args(["account", "list", "--output", "json"])).await?;
    if !output.success() {
        return Ok(false);
    }
    let subscriptions: Vec<Subscription> = json::parse_array(&output.stdout)?;
    Ok(!subscriptions.is_empty())
}

pub async fn login(az: &dyn AzInvoker) -> Result<()> {
    info!("Logging in");
    run_step(az, Step::Login, args(["login"])).await?;
    Ok(())
}

pub async fn list_subscriptions(az: &dyn AzInvoker) -> Result<Vec<Subscription>> {
    info!("Getting list of enabled subscriptions");
    let output = run_step(
        az,
        Step::ListSubscriptions,
        args(["account", "list", "--output", "json"]),
    )
    .await?;
    json::parse_array(&output.stdout)
}

/// Point `az` at the chosen subscription.
///
/// Skipped when only one subscription is visible, since it is already active.
pub async fn set_subscription_context(az: &dyn AzInvoker, subscription_id: &str) -> Result<()> {
    if list_subscriptions(az).await?.len() <= 1 {
        return Ok(());
    }
    info!(subscription = %subscription_id, "Setting subscription context");
    run_step(
        az,
        Step::SetSubscription,
        args(["account", "set", "--subscription", subscription_id]),
    )
    .await?;
    Ok(())
}

// =============================================================================
// Forward steps
// =============================================================================

/// The part of the `create-for-rbac` reply we keep. Everything else, including
/// the echoed password, is ignored.
#[derive(Deserialize)]
struct CreatedPrincipal {
    #[serde(rename = "appId")]
    app_id: String,
}

pub async fn create_resource_group(az: &dyn AzInvoker, config: &ProvisionConfig) -> Result<()> {
    info!(resource_group = %config.resource_group, region = %config.region, "Creating resource group");
    run_step(
        az,
        Step::CreateResourceGroup,
        args([
            "group",
            "create",
            "--location",
            config.region.as_str(),
            "--name",
            config.resource_group.as_str(),
        ]),
    )
    .await?;
    Ok(())
}

/// Create a service principal scoped to the resource group.
///
/// The password is generated here and returned alongside the app id that
/// `az` reports.
pub async fn create_service_principal(
    az: &dyn AzInvoker,
    config: &ProvisionConfig,
) -> Result<ServicePrincipal> {
    let password = generate_secret();
    let scope = config.resource_group_scope();
    let years = SERVICE_PRINCIPAL_YEARS.to_string();

    info!(name = %config.service_principal_name, "Creating Service Principal");
    let output = run_step(
        az,
        Step::CreateServicePrincipal,
        args([
            "ad",
            "sp",
            "create-for-rbac",
            "--name",
            config.service_principal_name.as_str(),
            "--password",
            password.as_str(),
            "--scopes",
            scope.as_str(),
            "--years",
            years.as_str(),
        ]),
    )
    .await?;

    let created: CreatedPrincipal = json::parse_object(&output.stdout)?;
    if created.app_id.is_empty() {
        return Err(Error::internal("az returned a service principal without an appId"));
    }

    Ok(ServicePrincipal {
        app_id: created.app_id,
        password,
    })
}

/// Deploy the Docker for Azure template into the resource group.
///
/// The SSH key is passed through a parameter file that only exists for the
/// duration of the `az` call.
pub async fn deploy_swarm(
    az: &dyn AzInvoker,
    config: &ProvisionConfig,
    sp: &ServicePrincipal,
) -> Result<()> {
    let param_file = ParameterFile::write(&config.work_dir, &config.ssh_public_key)?;

    let parameters = [
        format!("@{}", param_file.path().display()),
        format!("adServicePrincipalAppID={}", sp.app_id),
        format!("adServicePrincipalAppSecret={}", sp.password),
        format!("enableExtLogs={}", yes_no(config.enable_ext_logs)),
        format!("enableSystemPrune={}", yes_no(config.enable_system_prune)),
        format!("managerCount={}", config.manager_count),
        format!("swarmName={}", config.swarm_name),
        format!("workerCount={}", config.worker_count),
        format!("managerVMSize={}", config.manager_size),
        format!("workerVMSize={}", config.worker_size),
    ];

    let mut deploy_args = args([
        "group",
        "deployment",
        "create",
        "--resource-group",
        config.resource_group.as_str(),
        "--name",
        DEPLOYMENT_NAME,
        "--template-uri",
        template_uri(config).as_str(),
    ]);
    for parameter in parameters {
        deploy_args.push("--parameters".to_string());
        deploy_args.push(parameter);
    }
    deploy_args.push("--verbose".to_string());

    info!(channel = %config.channel, "Deploying Swarm. This could take several minutes");
    run_step(az, Step::DeploySwarm, deploy_args).await?;
    Ok(())
}

pub async fn open_manager_port(az: &dyn AzInvoker, config: &ProvisionConfig) -> Result<()> {
    let port = MANAGER_PORT.to_string();
    let range_end = MANAGER_PORT_RANGE_END.to_string();

    info!(port = MANAGER_PORT, "Opening manager port for Docker Cloud use");
    run_step(
        az,
        Step::OpenManagerPort,
        args([
            "network",
            "lb",
            "inbound-nat-pool",
            "create",
            "--backend-port",
            port.as_str(),
            "--frontend-port-range-start",
            port.as_str(),
            "--frontend-port-range-end",
            range_end.as_str(),
            "--lb-name",
            MANAGER_LOAD_BALANCER,
            "--name",
            MANAGER_NAT_POOL,
            "--protocol",
            "Tcp",
            "--resource-group",
            config.resource_group.as_str(),
        ]),
    )
    .await?;
    Ok(())
}

// =============================================================================
// Compensations
// =============================================================================

/// Delete the resource group and everything in it, without waiting.
pub async fn delete_resource_group(az: &dyn AzInvoker, resource_group: &str) -> Result<()> {
    info!(resource_group = %resource_group, "Deleting the created resource group");
    run_step(
        az,
        Step::DeleteResourceGroup,
        args(["group", "delete", "--name", resource_group, "-y", "--no-wait"]),
    )
    .await?;
    Ok(())
}

pub async fn delete_service_principal(az: &dyn AzInvoker, sp: &ServicePrincipal) -> Result<()> {
    info!(app_id = %sp.app_id, "Deleting Service Principal");
    run_step(
        az,
        Step::DeleteServicePrincipal,
        args(["ad", "sp", "delete", "--id", sp.app_id.as_str()]),
    )
    .await?;
    Ok(())
}

// =============================================================================
// Parameter file
// =============================================================================

/// Deployment parameter file holding the SSH public key.
///
/// The file is removed when the guard drops, so it never outlives the deploy
/// step, whether that step returns, fails, or unwinds.
#[derive(Debug)]
pub struct ParameterFile {
    path: PathBuf,
}

impl ParameterFile {
    /// Fails if `sshParam.json` already exists in `dir`; a file this guard did
    /// not create is never overwritten or removed.
    pub fn write(dir: &Path, ssh_public_key: &str) -> Result<Self> {
        let path = dir.join(PARAMETER_FILE_NAME);
        let document = serde_json::json!({
            "$schema": PARAMETER_SCHEMA,
            "contentVersion": "1.0.0.0",
            "parameters": {
                "sshPublicKey": { "value": ssh_public_key }
            }
        });
        let contents = serde_json::to_vec(&document)?;

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => Error::validation(format!(
                    "{} already exists, remove it or choose another --work-dir",
                    path.display()
                )),
                _ => Error::Io(e),
            })?;
        // From here on a failed write is cleaned up by the guard. The handle is
        // closed first so the removal also succeeds on Windows.
        let guard = Self { path };
        let written = file.write_all(&contents);
        drop(file);
        written?;
        Ok(guard)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ParameterFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove parameter file"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::az::MockAzInvoker;
    use crate::config::test_config;

    fn ok(stdout: &str) -> Result<ToolOutput> {
        Ok(ToolOutput {
            exit_code: 0,
            stdout: stdout.to_string(),
        })
    }

    fn exit(code: i32) -> Result<ToolOutput> {
        Ok(ToolOutput {
            exit_code: code,
            stdout: String::new(),
        })
    }

    #[tokio::test]
    async fn create_resource_group_passes_region_and_name() {
        let mut az = MockAzInvoker::new();
        az.expect_run()
            .withf(|a| a == &["group", "create", "--location", "westeurope", "--name", "swarm-rg"])
            .times(1)
            .returning(|_| ok(""));

        create_resource_group(&az, &test_config()).await.unwrap();
    }

    #[tokio::test]
    async fn non_zero_exit_names_the_step() {
        let mut az = MockAzInvoker::new();
        az.expect_run().returning(|_| exit(1));

        let err = create_resource_group(&az, &test_config()).await.unwrap_err();
        match err {
            Error::StepFailed { step, message } => {
                assert_eq!(step, Step::CreateResourceGroup);
                assert!(message.contains("status 1"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn service_principal_uses_generated_password() {
        let mut az = MockAzInvoker::new();
        az.expect_run()
            .withf(|a| {
                a[..3] == ["ad", "sp", "create-for-rbac"]
                    && a.windows(2).any(|w| {
                        w[0] == "--scopes" && w[1] == "/subscriptions/sub-123/resourceGroups/swarm-rg"
                    })
                    && a.windows(2).any(|w| w[0] == "--years" && w[1] == "20")
            })
            .returning(|a| {
                let pos = a.iter().position(|x| x == "--password").unwrap();
                // az echoes the password back; we keep our own copy anyway.
                ok(&format!(
                    "Changing \"swarm-sp\" to a valid URI\n{{\"appId\": \"app-1\", \"password\": \"{}\"}}",
                    a[pos + 1]
                ))
            });

        let sp = create_service_principal(&az, &test_config()).await.unwrap();
        assert_eq!(sp.app_id, "app-1");
        assert_eq!(sp.password.len(), 36);
    }

    #[tokio::test]
    async fn service_principal_without_app_id_is_rejected() {
        let mut az = MockAzInvoker::new();
        az.expect_run().returning(|_| ok("{\"appId\": \"\"}"));

        let err = create_service_principal(&az, &test_config()).await.unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }

    #[tokio::test]
    async fn service_principal_with_null_password_is_accepted() {
        let mut az = MockAzInvoker::new();
        az.expect_run()
            .returning(|_| ok("{\"appId\": \"app-1\", \"password\": null, \"tenant\": \"t\"}"));

        let sp = create_service_principal(&az, &test_config()).await.unwrap();
        assert_eq!(sp.app_id, "app-1");
        assert_eq!(sp.password.len(), 36);
    }

    #[tokio::test]
    async fn service_principal_without_payload_is_rejected() {
        let mut az = MockAzInvoker::new();
        az.expect_run().returning(|_| ok("created"));

        let err = create_service_principal(&az, &test_config()).await.unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }

    #[tokio::test]
    async fn deploy_passes_all_template_parameters() {
        let dir = tempfile::tempdir().unwrap();
        let config = ProvisionConfig {
            work_dir: dir.path().to_path_buf(),
            enable_system_prune: true,
            manager_count: 3,
            worker_count: 5,
            ..test_config()
        };
        let sp = ServicePrincipal {
            app_id: "app-1".to_string(),
            password: "secret-1".to_string(),
        };

        let mut az = MockAzInvoker::new();
        az.expect_run()
            .withf(|a| {
                let params: Vec<&str> = a
                    .windows(2)
                    .filter(|w| w[0] == "--parameters")
                    .map(|w| w[1].as_str())
                    .collect();
                a[..3] == ["group", "deployment", "create"]
                    && a.contains(&"https://download.docker.com/azure/stable/Docker.tmpl".to_string())
                    && params.contains(&"adServicePrincipalAppID=app-1")
                    && params.contains(&"adServicePrincipalAppSecret=secret-1")
                    && params.contains(&"enableExtLogs=yes")
                    && params.contains(&"enableSystemPrune=yes")
                    && params.contains(&"managerCount=3")
                    && params.contains(&"workerCount=5")
                    && params.contains(&"swarmName=dockerswarm")
                    && params.contains(&"managerVMSize=Standard_A1")
                    && params.contains(&"workerVMSize=Standard_A1")
                    && params.iter().any(|p| p.starts_with('@') && p.ends_with(PARAMETER_FILE_NAME))
                    && a.last().map(String::as_str) == Some("--verbose")
            })
            .times(1)
            .returning(|_| ok(""));

        deploy_swarm(&az, &config, &sp).await.unwrap();
        assert!(!dir.path().join(PARAMETER_FILE_NAME).exists());
    }

    #[tokio::test]
    async fn deploy_removes_parameter_file_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let config = ProvisionConfig {
            work_dir: dir.path().to_path_buf(),
            ..test_config()
        };
        let sp = ServicePrincipal {
            app_id: "app-1".to_string(),
            password: "secret-1".to_string(),
        };
        let param_path = dir.path().join(PARAMETER_FILE_NAME);
        let seen = param_path.clone();

        let mut az = MockAzInvoker::new();
        az.expect_run().returning(move |_| {
            assert!(seen.exists(), "parameter file missing during deploy");
            exit(1)
        });

        let err = deploy_swarm(&az, &config, &sp).await.unwrap_err();
        assert!(matches!(err, Error::StepFailed { step: Step::DeploySwarm, .. }));
        assert!(!param_path.exists());
    }

    #[test]
    fn parameter_file_embeds_escaped_key() {
        let dir = tempfile::tempdir().unwrap();
        let key = "ssh-rsa AAAA \"quoted\" user@host";
        let file = ParameterFile::write(dir.path(), key).unwrap();

        let raw = std::fs::read_to_string(file.path()).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(doc["contentVersion"], "1.0.0.0");
        assert_eq!(doc["$schema"], PARAMETER_SCHEMA);
        assert_eq!(doc["parameters"]["sshPublicKey"]["value"], key);

        let path = file.path().to_path_buf();
        drop(file);
        assert!(!path.exists());
    }

    #[test]
    fn parameter_file_leaves_existing_file_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(PARAMETER_FILE_NAME);
        std::fs::write(&path, "keep me").unwrap();

        let err = ParameterFile::write(dir.path(), "ssh-rsa AAAA").unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "keep me");
    }

    #[test]
    fn parameter_file_removed_on_panic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(PARAMETER_FILE_NAME);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _file = ParameterFile::write(dir.path(), "ssh-rsa AAAA").unwrap();
            panic!("deploy blew up");
        }));

        assert!(result.is_err());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn open_manager_port_targets_manager_load_balancer() {
        let mut az = MockAzInvoker::new();
        az.expect_run()
            .withf(|a| {
                a[..4] == ["network", "lb", "inbound-nat-pool", "create"]
                    && a.windows(2).any(|w| w[0] == "--backend-port" && w[1] == "2376")
                    && a.windows(2).any(|w| w[0] == "--frontend-port-range-end" && w[1] == "2377")
                    && a.windows(2).any(|w| w[0] == "--lb-name" && w[1] == "externalSSHLoadBalancer")
                    && a.windows(2).any(|w| w[0] == "--protocol" && w[1] == "Tcp")
            })
            .times(1)
            .returning(|_| ok(""));

        open_manager_port(&az, &test_config()).await.unwrap();
    }

    #[tokio::test]
    async fn login_check_treats_failure_as_logged_out() {
        let mut az = MockAzInvoker::new();
        az.expect_run().returning(|_| exit(1));
        assert!(!is_logged_in(&az).await.unwrap());
    }

    #[tokio::test]
    async fn login_check_requires_a_subscription() {
        let mut az = MockAzInvoker::new();
        az.expect_run()
            .returning(|_| ok("WARNING: Please run 'az login'\n[]"));
        assert!(!is_logged_in(&az).await.unwrap());

        let mut az = MockAzInvoker::new();
        az.expect_run()
            .returning(|_| ok("[{\"id\": \"a\", \"name\": \"one\"}]"));
        assert!(is_logged_in(&az).await.unwrap());
    }

    #[tokio::test]
    async fn single_subscription_skips_account_set() {
        let mut az = MockAzInvoker::new();
        az.expect_run()
            .withf(|a| a[..2] == ["account", "list"])
            .times(1)
            .returning(|_| ok("[{\"id\": \"a\", \"name\": \"one\"}]"));

        set_subscription_context(&az, "a").await.unwrap();
    }

    #[tokio::test]
    async fn multiple_subscriptions_set_context() {
        let mut az = MockAzInvoker::new();
        az.expect_run()
            .withf(|a| a[..2] == ["account", "list"])
            .times(1)
            .returning(|_| ok("[{\"id\": \"a\", \"name\": \"one\"}, {\"id\": \"b\", \"name\": \"two\"}]"));
        az.expect_run()
            .withf(|a| a == &["account", "set", "--subscription", "b"])
            .times(1)
            .returning(|_| ok(""));

        set_subscription_context(&az, "b").await.unwrap();
    }

    #[tokio::test]
    async fn compensations_use_expected_commands() {
        let mut az = MockAzInvoker::new();
        az.expect_run()
            .withf(|a| a == &["group", "delete", "--name", "swarm-rg", "-y", "--no-wait"])
            .times(1)
            .returning(|_| ok(""));
        az.expect_run()
            .withf(|a| a == &["ad", "sp", "delete", "--id", "app-1"])
            .times(1)
            .returning(|_| exit(2));

        delete_resource_group(&az, "swarm-rg").await.unwrap();
        let sp = ServicePrincipal {
            app_id: "app-1".to_string(),
            password: "x".to_string(),
        };
        let err = delete_service_principal(&az, &sp).await.unwrap_err();
        assert!(matches!(err, Error::StepFailed { step: Step::DeleteServicePrincipal, .. }));
    }

    #[test]
    fn template_uri_follows_channel() {
        let config = ProvisionConfig {
            channel: crate::models::Channel::Edge,
            ..test_config()
        };
        assert_eq!(
            template_uri(&config),
            "https://download.docker.com/azure/edge/Docker.tmpl"
        );
    }

    #[test]
    fn secrets_are_unique() {
        assert_ne!(generate_secret(), generate_secret());
    }
}
