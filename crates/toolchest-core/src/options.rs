//! Per-run configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ToolchestError, ToolchestResult};

/// Immutable configuration for one orchestration run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallationOptions {
    /// Maximum number of tools installing at the same time.
    pub parallelism: usize,
    /// Reinstall tools that already have an `Installed` record.
    pub force: bool,
    /// Take the request literally; the caller vouches for dependencies.
    pub skip_deps: bool,
    /// Resolve and return the plan without running anything.
    pub dry_run: bool,
    /// After the first failure, stop promoting nodes to `Ready`.
    pub stop_on_failure: bool,
    /// Retry tools whose last record is `Failed`. When `false` they are
    /// skipped unless `force` is set.
    pub retry_failed: bool,
    /// Upper bound on a single install attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_timeout: Option<Duration>,
}

impl Default for InstallationOptions {
    fn default() -> Self {
        Self {
            parallelism: default_parallelism(),
            force: false,
            skip_deps: false,
            dry_run: false,
            stop_on_failure: false,
            retry_failed: true,
            install_timeout: None,
        }
    }
}

/// Number of available CPUs, or 1 when that cannot be determined.
pub fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl InstallationOptions {
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_skip_deps(mut self, skip_deps: bool) -> Self {
        self.skip_deps = skip_deps;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_stop_on_failure(mut self, stop: bool) -> Self {
        self.stop_on_failure = stop;
        self
    }

    pub fn with_retry_failed(mut self, retry: bool) -> Self {
        self.retry_failed = retry;
        self
    }

    pub fn with_install_timeout(mut self, timeout: Duration) -> Self {
        self.install_timeout = Some(timeout);
        self
    }

    pub fn validate(&self) -> ToolchestResult<()> {
        if self.parallelism == 0 {
            return Err(ToolchestError::InvalidOptions(
                "parallelism must be at least 1".to_string(),
            ));
        }
        if self.install_timeout == Some(Duration::ZERO) {
            return Err(ToolchestError::InvalidOptions(
                "install timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
