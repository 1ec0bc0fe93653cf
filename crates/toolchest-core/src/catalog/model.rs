//! Catalog entry types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use toolchest_state::InstallMethod;

fn default_version() -> String {
    "latest".to_string()
}

fn default_version_args() -> Vec<String> {
    vec!["--version".to_string()]
}

/// One installable tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Unique, stable key.
    pub id: String,
    /// Human-readable display name.
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Tool ids that must be installed first.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Which install implementation applies, with its parameters.
    pub install: InstallRef,
    /// Target version; `"latest"` accepts whatever the install produces.
    #[serde(default = "default_version")]
    pub version: String,
    /// Executable name used by health probes. Defaults to `id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary: Option<String>,
    /// Arguments that make the binary print its version.
    #[serde(default = "default_version_args")]
    pub version_args: Vec<String>,
    /// Upper bound on one install attempt, overriding the run-wide timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl ToolConfig {
    /// Minimal tool entry; mostly useful in tests and programmatic catalogs.
    pub fn new(id: impl Into<String>, install: InstallRef) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            category: String::new(),
            description: None,
            dependencies: Vec::new(),
            install,
            version: default_version(),
            binary: None,
            version_args: default_version_args(),
            timeout_secs: None,
        }
    }

    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Executable name probed on disk.
    pub fn binary_name(&self) -> &str {
        self.binary.as_deref().unwrap_or(&self.id)
    }

    pub fn method(&self) -> InstallMethod {
        self.install.method()
    }

    /// `true` when any installed version satisfies the catalog.
    pub fn tracks_latest(&self) -> bool {
        self.version.is_empty() || self.version.eq_ignore_ascii_case("latest")
    }
}

/// Named, ordered group of tool ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub tools: Vec<String>,
}

impl BundleConfig {
    pub fn new<I, S>(id: impl Into<String>, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            description: None,
            tools: tools.into_iter().map(Into::into).collect(),
        }
    }
}

/// Package managers the delegated install method knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageManagerKind {
    Apt,
    Brew,
    Cargo,
    Pip,
    Npm,
    Go,
}

impl PackageManagerKind {
    /// Full argv that installs `package`.
    pub fn install_command(&self, package: &str) -> Vec<String> {
        let argv: &[&str] = match self {
            PackageManagerKind::Apt => &["apt-get", "install", "-y"],
            PackageManagerKind::Brew => &["brew", "install"],
            PackageManagerKind::Cargo => &["cargo", "install", "--locked"],
            PackageManagerKind::Pip => &["pip", "install", "--user"],
            PackageManagerKind::Npm => &["npm", "install", "-g"],
            PackageManagerKind::Go => &["go", "install"],
        };
        let mut cmd: Vec<String> = argv.iter().map(|s| s.to_string()).collect();
        cmd.push(package.to_string());
        cmd
    }

    pub fn name(&self) -> &'static str {
        match self {
            PackageManagerKind::Apt => "apt",
            PackageManagerKind::Brew => "brew",
            PackageManagerKind::Cargo => "cargo",
            PackageManagerKind::Pip => "pip",
            PackageManagerKind::Npm => "npm",
            PackageManagerKind::Go => "go",
        }
    }
}

/// Opaque handle to the external install operation for a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum InstallRef {
    /// Run build steps (each an argv) in order.
    SourceBuild {
        steps: Vec<Vec<String>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        workdir: Option<PathBuf>,
    },
    /// Download a ready binary, optionally verifying its SHA-256.
    PrebuiltBinary {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sha256: Option<String>,
    },
    /// Delegate to a package manager.
    PackageManager {
        manager: PackageManagerKind,
        package: String,
    },
}

impl InstallRef {
    pub fn method(&self) -> InstallMethod {
        match self {
            InstallRef::SourceBuild { .. } => InstallMethod::SourceBuild,
            InstallRef::PrebuiltBinary { .. } => InstallMethod::PrebuiltBinary,
            InstallRef::PackageManager { .. } => InstallMethod::PackageManager,
        }
    }

    /// A build that runs a single command.
    pub fn command<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        InstallRef::SourceBuild {
            steps: vec![argv.into_iter().map(Into::into).collect()],
            workdir: None,
        }
    }
}
