//! Install method that delegates to a system or language package manager.

use super::{CommandRunner, InstallContext, InstallError};
use crate::catalog::PackageManagerKind;

#[derive(Debug, Clone, Default)]
pub struct PackageManagerInstaller {
    runner: CommandRunner,
}

impl PackageManagerInstaller {
    pub fn new(runner: CommandRunner) -> Self {
        Self { runner }
    }

    /// Run the manager's install command for `package`.
    pub async fn install_package(
        &self,
        manager: PackageManagerKind,
        package: &str,
        ctx: &InstallContext,
    ) -> Result<String, InstallError> {
        let argv = manager.install_command(package);
        tracing::debug!(manager = manager.name(), package, "delegating install");
        let output = self.runner.run_checked(&argv, None, ctx).await?;
        Ok(output.diagnostic())
    }
}
