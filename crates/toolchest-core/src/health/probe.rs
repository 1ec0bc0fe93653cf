//! Live probes of installed binaries.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;

use crate::catalog::ToolConfig;

/// What a probe found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// No executable by that name in the install dir or on `PATH`.
    Missing,
    /// The binary ran; `version` is `None` when its output had no version.
    Found {
        path: PathBuf,
        version: Option<String>,
    },
    /// The binary exists but could not be run successfully.
    Broken { path: PathBuf, detail: String },
}

/// Looks up a tool's binary and asks it for its version.
#[async_trait]
pub trait BinaryProbe: Send + Sync {
    async fn probe(&self, tool: &ToolConfig) -> ProbeOutcome;
}

/// Probe against the real filesystem: install dir first, then `PATH`.
#[derive(Debug, Clone)]
pub struct SystemProbe {
    search_path: Vec<PathBuf>,
    timeout: Duration,
}

impl SystemProbe {
    pub fn new(install_dir: impl Into<PathBuf>) -> Self {
        let mut search_path = vec![install_dir.into()];
        if let Some(path) = std::env::var_os("PATH") {
            search_path.extend(std::env::split_paths(&path));
        }
        Self {
            search_path,
            timeout: Duration::from_secs(10),
        }
    }

    /// Probe only the given directories.
    pub fn with_search_path(search_path: Vec<PathBuf>) -> Self {
        Self {
            search_path,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// First executable named `binary` on the search path.
    pub fn locate(&self, binary: &str) -> Option<PathBuf> {
        self.search_path
            .iter()
            .map(|dir| dir.join(binary))
            .find(|candidate| is_executable(candidate))
    }
}

#[async_trait]
impl BinaryProbe for SystemProbe {
    async fn probe(&self, tool: &ToolConfig) -> ProbeOutcome {
        let Some(path) = self.locate(tool.binary_name()) else {
            return ProbeOutcome::Missing;
        };

        let run = Command::new(&path)
            .args(&tool.version_args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(self.timeout, run).await {
            Err(_) => ProbeOutcome::Broken {
                path,
                detail: format!("version probe timed out after {}s", self.timeout.as_secs()),
            },
            Ok(Err(e)) => ProbeOutcome::Broken {
                path,
                detail: format!("failed to run: {e}"),
            },
            Ok(Ok(output)) if !output.status.success() => ProbeOutcome::Broken {
                path,
                detail: format!(
                    "`{} {}` exited with {}",
                    tool.binary_name(),
                    tool.version_args.join(" "),
                    output.status
                ),
            },
            Ok(Ok(output)) => {
                // Some tools print their version on stderr.
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);
                let version = extract_version(&stdout).or_else(|| extract_version(&stderr));
                ProbeOutcome::Found { path, version }
            }
        }
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

fn version_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+(?:\.\d+)+(?:[-+][0-9A-Za-z.\-]+)?").ok())
        .as_ref()
}

/// First dotted version number in `text`, e.g. `"ripgrep 14.1.0 (rev abc)"`
/// → `"14.1.0"`.
pub fn extract_version(text: &str) -> Option<String> {
    version_regex()?.find(text).map(|m| m.as_str().to_string())
}

/// Does `actual` satisfy the catalog's `expected` version?
///
/// `latest` (or empty) accepts anything. Otherwise a leading `v` is ignored
/// and `expected` may be a prefix on a component boundary: `"14"` and
/// `"14.1"` both accept `"14.1.0"`, `"1.4"` does not accept `"1.40"`.
pub fn versions_match(expected: &str, actual: &str) -> bool {
    let expected = expected.trim();
    if expected.is_empty() || expected.eq_ignore_ascii_case("latest") {
        return true;
    }
    let expected = expected.trim_start_matches('v');
    let actual = actual.trim().trim_start_matches('v');
    actual == expected
        || actual
            .strip_prefix(expected)
            .is_some_and(|rest| rest.starts_with(['.', '-', '+']))
}
