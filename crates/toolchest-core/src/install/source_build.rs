//! Build-from-source install method.

use std::path::{Path, PathBuf};

use tracing::debug;

use super::{CommandRunner, InstallContext, InstallError};
use crate::catalog::ToolConfig;

/// Runs a tool's build steps in order inside its work directory.
#[derive(Debug, Clone, Default)]
pub struct SourceBuildInstaller {
    runner: CommandRunner,
}

impl SourceBuildInstaller {
    pub fn new(runner: CommandRunner) -> Self {
        Self { runner }
    }

    /// Run every step; stop at the first one that fails. Returns the
    /// diagnostic tail of the last step.
    pub async fn build(
        &self,
        tool: &ToolConfig,
        steps: &[Vec<String>],
        workdir: Option<&Path>,
        ctx: &InstallContext,
    ) -> Result<String, InstallError> {
        if steps.is_empty() {
            return Err(InstallError::EmptyCommand);
        }

        let dir = resolve_workdir(tool, workdir, ctx);
        tokio::fs::create_dir_all(&dir).await?;

        let runner = self
            .runner
            .clone()
            .with_env("TOOLCHEST_TOOL_ID", tool.id.as_str())
            .with_env("TOOLCHEST_VERSION", tool.version.as_str());

        let mut last = String::new();
        for (n, step) in steps.iter().enumerate() {
            debug!(tool_id = %tool.id, step = n + 1, total = steps.len(), command = %step.join(" "), "build step");
            let output = runner.run_checked(step, Some(&dir), ctx).await?;
            last = output.diagnostic();
        }
        Ok(last)
    }
}

/// Relative workdirs live under the tool's scratch directory.
fn resolve_workdir(tool: &ToolConfig, workdir: Option<&Path>, ctx: &InstallContext) -> PathBuf {
    match workdir {
        Some(dir) if dir.is_absolute() => dir.to_path_buf(),
        Some(dir) => ctx.tool_work_dir(tool).join(dir),
        None => ctx.tool_work_dir(tool),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InstallRef;

    fn steps(raw: &[&[&str]]) -> Vec<Vec<String>> {
        raw.iter()
            .map(|s| s.iter().map(|p| p.to_string()).collect())
            .collect()
    }

    #[tokio::test]
    async fn runs_steps_in_order_inside_work_dir() {
        let root = tempfile::tempdir().unwrap();
        let ctx = InstallContext::new(root.path().join("bin"), root.path().join("build"));
        let tool = ToolConfig::new("demo", InstallRef::command(["true"]));

        let out = SourceBuildInstaller::default()
            .build(
                &tool,
                &steps(&[&["sh", "-c", "echo one > log"], &["sh", "-c", "echo two >> log; cat log"]]),
                None,
                &ctx,
            )
            .await
            .unwrap();
        assert!(out.contains("one"));
        assert!(out.contains("two"));
        assert!(root.path().join("build/demo/log").exists());
    }

    #[tokio::test]
    async fn stops_at_first_failing_step() {
        let root = tempfile::tempdir().unwrap();
        let ctx = InstallContext::new(root.path().join("bin"), root.path().join("build"));
        let tool = ToolConfig::new("demo", InstallRef::command(["true"]));

        let err = SourceBuildInstaller::default()
            .build(
                &tool,
                &steps(&[&["false"], &["sh", "-c", "touch reached"]]),
                None,
                &ctx,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, InstallError::CommandFailed { .. }));
        assert!(!root.path().join("build/demo/reached").exists());
    }

    #[test]
    fn relative_workdir_is_nested_under_tool_dir() {
        let ctx = InstallContext::new("/opt/bin", "/var/build");
        let tool = ToolConfig::new("demo", InstallRef::command(["true"]));
        assert_eq!(
            resolve_workdir(&tool, Some(Path::new("src")), &ctx),
            PathBuf::from("/var/build/demo/src")
        );
        assert_eq!(
            resolve_workdir(&tool, Some(Path::new("/abs")), &ctx),
            PathBuf::from("/abs")
        );
    }
}
