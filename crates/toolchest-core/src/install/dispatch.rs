//! Production [`Installer`]: dispatch on the catalog entry's install method.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{
    finish_install, CommandRunner, InstallContext, InstallError, InstallOutcome, Installer,
    PackageManagerInstaller, PrebuiltInstaller, SourceBuildInstaller,
};
use crate::catalog::{InstallRef, ToolConfig};
use crate::health::probe::{BinaryProbe, SystemProbe};
use crate::options::InstallationOptions;

/// Picks the install implementation named by [`ToolConfig::install`].
pub struct MethodInstaller {
    source: SourceBuildInstaller,
    prebuilt: PrebuiltInstaller,
    package: PackageManagerInstaller,
    probe: Arc<dyn BinaryProbe>,
}

impl MethodInstaller {
    /// Probes look in `install_dir` first, then `PATH`.
    pub fn new(install_dir: impl Into<PathBuf>) -> Self {
        Self::with_probe(Arc::new(SystemProbe::new(install_dir)))
    }

    pub fn with_probe(probe: Arc<dyn BinaryProbe>) -> Self {
        let runner = CommandRunner::new();
        Self {
            source: SourceBuildInstaller::new(runner.clone()),
            prebuilt: PrebuiltInstaller::new(),
            package: PackageManagerInstaller::new(runner),
            probe,
        }
    }
}

#[async_trait]
impl Installer for MethodInstaller {
    async fn install(
        &self,
        tool: &ToolConfig,
        _options: &InstallationOptions,
        ctx: &InstallContext,
    ) -> Result<InstallOutcome, InstallError> {
        debug!(tool_id = %tool.id, method = %tool.method(), "installing");
        let diagnostic = match &tool.install {
            InstallRef::SourceBuild { steps, workdir } => {
                self.source
                    .build(tool, steps, workdir.as_deref(), ctx)
                    .await?
            }
            InstallRef::PrebuiltBinary { url, sha256 } => {
                let (path, checksum) = self
                    .prebuilt
                    .fetch(tool, url, sha256.as_deref(), ctx)
                    .await?;
                let outcome = finish_install(tool, self.probe.as_ref(), tool.method(), String::new()).await;
                return Ok(outcome
                    .with_checksum(checksum)
                    .with_diagnostic(format!("installed {}", path.display())));
            }
            InstallRef::PackageManager { manager, package } => {
                self.package.install_package(*manager, package, ctx).await?
            }
        };
        Ok(finish_install(tool, self.probe.as_ref(), tool.method(), diagnostic).await)
    }
}
