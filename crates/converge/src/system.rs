//! Service manager and package database adapters
//!
//! Both are external collaborators reached only through a [`CommandRunner`];
//! this module knows which commands to run and how to read their output.

use crate::error::Result;
use crate::runner::{CommandOutput, CommandRunner, argv};
use crate::task::ServiceDesired;
use serde::{Deserialize, Serialize};

/// Service manager flavour on the target
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceManager {
    #[default]
    Systemd,
    /// `service <name> <verb>` (SysV init and Upstart)
    Sysv,
}

impl ServiceManager {
    pub fn status_argv(&self, service: &str) -> Vec<String> {
        match self {
            ServiceManager::Systemd => argv(&["systemctl", "is-active", "--quiet", service]),
            ServiceManager::Sysv => argv(&["service", service, "status"]),
        }
    }

    pub fn action_argv(&self, service: &str, desired: ServiceDesired) -> Vec<String> {
        match self {
            ServiceManager::Systemd => argv(&["systemctl", desired.verb(), service]),
            ServiceManager::Sysv => argv(&["service", service, desired.verb()]),
        }
    }

    /// Whether the service is currently running (status exit code zero)
    pub fn is_running(&self, runner: &dyn CommandRunner, service: &str) -> Result<bool> {
        runner.run_status(&self.status_argv(service))
    }

    /// Drive the service towards `desired`
    pub fn apply(
        &self,
        runner: &dyn CommandRunner,
        service: &str,
        desired: ServiceDesired,
    ) -> Result<CommandOutput> {
        runner.run_checked(&self.action_argv(service, desired), None)
    }
}

/// Debian package database via dpkg/apt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    #[default]
    Apt,
}

impl PackageManager {
    pub fn query_argv(&self, package: &str) -> Vec<String> {
        argv(&["dpkg-query", "-W", "-f=${Status} ${Version}", package])
    }

    pub fn install_argv(&self, package: &str, version: Option<&str>) -> Vec<String> {
        let target = match version {
            Some(v) => format!("{package}={v}"),
            None => package.to_string(),
        };
        argv(&[
            "env",
            "DEBIAN_FRONTEND=noninteractive",
            "apt-get",
            "install",
            "-y",
            &target,
        ])
    }

    pub fn update_argv(&self) -> Vec<String> {
        argv(&["apt-get", "update"])
    }

    /// Installed version of `package`, `None` when not installed
    pub fn installed_version(
        &self,
        runner: &dyn CommandRunner,
        package: &str,
    ) -> Result<Option<String>> {
        let output = runner.run(&self.query_argv(package), None)?;
        if !output.success() {
            // dpkg-query exits 1 for packages it has never heard of
            return Ok(None);
        }
        Ok(parse_dpkg_status(&output.stdout))
    }

    pub fn install(
        &self,
        runner: &dyn CommandRunner,
        package: &str,
        version: Option<&str>,
    ) -> Result<CommandOutput> {
        runner.run_checked(&self.install_argv(package, version), None)
    }

    pub fn update(&self, runner: &dyn CommandRunner) -> Result<CommandOutput> {
        runner.run_checked(&self.update_argv(), None)
    }
}

/// Parse `${Status} ${Version}` output, e.g. `install ok installed 2.3-4`
fn parse_dpkg_status(stdout: &str) -> Option<String> {
    let mut fields = stdout.split_whitespace();
    let want = fields.next()?;
    let _flag = fields.next()?;
    let status = fields.next()?;
    if want != "install" || status != "installed" {
        return None;
    }
    fields.next().map(str::to_string)
}
