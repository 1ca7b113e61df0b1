//! Configuration resolution
//!
//! Turns command-line flags into a complete [`ProvisionConfig`], asking the
//! operator for anything that was left out. Runs once, before the saga.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;

use crate::az::AzInvoker;
use crate::commands::deploy::DeployArgs;
use crate::config::ProvisionConfig;
use crate::models::{Channel, Subscription};
use crate::provision::steps;
use crate::{Error, Result};

/// Asks the operator a question and returns the answer, trimmed.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Prompter: Send + Sync {
    async fn ask(&self, question: &str) -> Result<String>;
}

/// [`Prompter`] reading answers from the terminal.
///
/// Questions go to stderr so stdout carries nothing but the final result.
pub struct StdinPrompter {
    lines: Mutex<Lines<BufReader<Stdin>>>,
}

impl StdinPrompter {
    pub fn new() -> Self {
        Self {
            lines: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
        }
    }
}

impl Default for StdinPrompter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Prompter for StdinPrompter {
    async fn ask(&self, question: &str) -> Result<String> {
        let mut stderr = tokio::io::stderr();
        stderr.write_all(question.as_bytes()).await?;
        stderr.write_all(b"\n").await?;
        stderr.flush().await?;

        let mut lines = self.lines.lock().await;
        match lines.next_line().await? {
            Some(line) => Ok(line.trim().to_string()),
            None => Err(Error::validation("no answer given, input closed")),
        }
    }
}

/// Fills a [`ProvisionConfig`] from flags and prompts.
pub struct Resolver<'a> {
    az: &'a dyn AzInvoker,
    prompter: &'a dyn Prompter,
}

impl<'a> Resolver<'a> {
    pub fn new(az: &'a dyn AzInvoker, prompter: &'a dyn Prompter) -> Self {
        Self { az, prompter }
    }

    pub async fn resolve(&self, args: &DeployArgs) -> Result<ProvisionConfig> {
        let subscription_id = match given(&args.subscription) {
            Some(id) => id,
            None => self.choose_subscription().await?.id,
        };

        let resource_group = self
            .text(
                &args.resource_group,
                "Enter the resource group you would like to create:",
            )
            .await?;
        let service_principal_name = self
            .text(
                &args.service_principal_name,
                "Enter the name for the new Service Principal:",
            )
            .await?;
        let region = self
            .text(&args.region, "Enter the region you would like to use:")
            .await?;
        let ssh_public_key = self
            .text(&args.ssh_public_key, "Enter your SSH public key:")
            .await?;

        let channel = match args.channel {
            Some(channel) => channel,
            None => self.choose_channel().await?,
        };

        let config = ProvisionConfig {
            subscription_id,
            resource_group,
            service_principal_name,
            region,
            ssh_public_key,
            channel,
            enable_ext_logs: args.enable_ext_logs,
            enable_system_prune: args.enable_system_prune,
            manager_count: args.manager_count,
            worker_count: args.worker_count,
            manager_size: args.manager_size.clone(),
            worker_size: args.worker_size.clone(),
            swarm_name: args.swarm_name.clone(),
            work_dir: args.work_dir.clone(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Use the flag value if set, otherwise prompt for free text.
    async fn text(&self, flag: &Option<String>, question: &str) -> Result<String> {
        if let Some(value) = given(flag) {
            return Ok(value);
        }
        let answer = self.prompter.ask(question).await?;
        if answer.is_empty() {
            return Err(Error::validation(format!("no answer given to '{}'", question)));
        }
        Ok(answer)
    }

    async fn choose_subscription(&self) -> Result<Subscription> {
        let mut subscriptions = steps::list_subscriptions(self.az).await?;
        match subscriptions.len() {
            0 => Err(Error::validation(
                "You don't have any subscriptions to use. Please create one first",
            )),
            1 => Ok(subscriptions.remove(0)),
            _ => {
                let mut menu = String::from(
                    "Please select the number corresponding to which subscription you would like to use:",
                );
                for (i, sub) in subscriptions.iter().enumerate() {
                    menu.push_str(&format!("\n    ({}) {} - {}", i, sub.name, sub.id));
                }

                let answer = self.prompter.ask(&menu).await?;
                let index: usize = answer
                    .parse()
                    .map_err(|_| Error::validation(format!("invalid subscription choice '{}'", answer)))?;
                if index >= subscriptions.len() {
                    return Err(Error::validation(format!(
                        "subscription choice {} out of range",
                        index
                    )));
                }
                Ok(subscriptions.swap_remove(index))
            }
        }
    }

    async fn choose_channel(&self) -> Result<Channel> {
        let answer = self
            .prompter
            .ask(
                "Choose the number corresponding to which channel you would like to use (default 1):\n    (1) stable\n    (2) edge",
            )
            .await?;
        match answer.as_str() {
            "" | "1" => Ok(Channel::Stable),
            "2" => Ok(Channel::Edge),
            other => Err(Error::validation(format!(
                "Invalid choice for chosen channel: '{}'",
                other
            ))),
        }
    }
}

/// Flag value, treating blank as unset.
fn given(flag: &Option<String>) -> Option<String> {
    flag.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
