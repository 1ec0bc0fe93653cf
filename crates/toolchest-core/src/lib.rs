//! Toolchest Core
//!
//! Dependency-aware installation of developer tools:
//!
//! - [`catalog`]: tool and bundle definitions, validated at load
//! - [`resolver`]: request → layered, cycle-free [`ExecutionPlan`]
//! - [`orchestrator`]: bounded-concurrency execution with skip propagation
//! - [`install`]: source-build, prebuilt-binary, and package-manager methods
//! - [`health`]: manifest vs. live-binary checks
//! - [`progress`]: broadcast of node state transitions
//!
//! The durable manifest lives in `toolchest-state`.

pub mod cancel;
pub mod catalog;
pub mod config;
pub mod error;
pub mod graph;
pub mod health;
pub mod install;
pub mod metrics;
pub mod obs;
pub mod options;
pub mod orchestrator;
pub mod plan;
pub mod progress;
pub mod resolver;
pub mod telemetry;
mod toolchest;

pub use cancel::{CancelHandle, CancelToken};
pub use catalog::{
    BundleConfig, CatalogError, CatalogResult, InstallRef, PackageManagerKind, ToolCatalog,
    ToolConfig,
};
pub use config::ToolchestConfig;
pub use error::{ToolchestError, ToolchestResult};
pub use graph::ToolGraph;
pub use health::probe::{BinaryProbe, ProbeOutcome, SystemProbe};
pub use health::{DoctorReport, HealthChecker, HealthReport, HealthStatus};
pub use install::{
    InstallContext, InstallError, InstallOutcome, Installer, MethodInstaller,
};
pub use options::InstallationOptions;
pub use orchestrator::{InstallSummary, Orchestrator, RunOutcome, ToolOutcome};
pub use plan::{ExecutionPlan, NodeState, PlanNode, SkipReason};
pub use progress::{ProgressBus, ProgressEvent};
pub use resolver::DependencyResolver;
pub use toolchest::{StatusEntry, Toolchest};

pub use toolchest_state::{
    FileManifestStore, InstallMethod, InstallationRecord, ManifestError, ManifestStore,
    RecordStatus,
};
