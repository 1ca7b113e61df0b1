//! Azure CLI invocation
//!
//! Everything azswarm does against Azure goes through the `az` executable.
//! [`AzInvoker`] is the narrow seam over it: run a command line, wait for it
//! to exit, hand back the exit code and captured stdout. [`AzureCli`] is the
//! subprocess-backed implementation; tests substitute their own.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::process::Command;
use tracing::debug;

use crate::{Error, Result};

pub mod json;

/// Executable names probed on the search path, in order
const AZ_EXECUTABLES: &[&str] = &["az", "az.cmd"];

const INSTALL_HINT: &str =
    "install it from https://learn.microsoft.com/cli/azure/install-azure-cli or pass --az-path";

/// Result of one `az` invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Process exit code, `-1` if the process was terminated by a signal
    pub exit_code: i32,
    /// Everything the process wrote to stdout
    pub stdout: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs `az` with the given arguments and waits for it to exit.
///
/// Invocations never overlap: callers await each one before issuing the next.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AzInvoker: Send + Sync {
    async fn run(&self, args: Vec<String>) -> Result<ToolOutput>;
}

/// [`AzInvoker`] backed by the real `az` executable.
#[derive(Debug, Clone)]
pub struct AzureCli {
    path: PathBuf,
}

impl AzureCli {
    /// Locate `az`, preferring an explicit path over the `PATH` search.
    pub fn locate(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            if !path.is_file() {
                return Err(Error::ToolPathInvalid {
                    path: path.to_path_buf(),
                });
            }
            return Ok(Self {
                path: path.to_path_buf(),
            });
        }

        let search_path = std::env::var_os("PATH").unwrap_or_default();
        Self::locate_in(&search_path)
    }

    /// Locate `az` in a `PATH`-style list of directories.
    pub fn locate_in(search_path: &OsStr) -> Result<Self> {
        let dirs: Vec<PathBuf> = std::env::split_paths(search_path).collect();
        for exe in AZ_EXECUTABLES {
            if let Some(path) = dirs.iter().map(|d| d.join(exe)).find(|p| p.is_file()) {
                debug!(path = %path.display(), "Found Azure CLI");
                return Ok(Self { path });
            }
        }
        Err(Error::ToolNotFound {
            hint: INSTALL_HINT.to_string(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AzInvoker for AzureCli {
    async fn run(&self, args: Vec<String>) -> Result<ToolOutput> {
        // Only the subcommand is logged; later arguments may carry secrets.
        let subcommand: Vec<&str> = args
            .iter()
            .take_while(|a| !a.starts_with('-'))
            .map(String::as_str)
            .collect();
        debug!(command = %subcommand.join(" "), "Running az");

        let output = Command::new(&self.path)
            .args(&args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?
            .wait_with_output()
            .await?;

        Ok(ToolOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        })
    }
}
