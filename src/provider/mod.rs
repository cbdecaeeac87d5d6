//! Cloud Provider Abstraction
//!
//! Trait-based contract between the orchestrator and a cloud backend:
//! discover scan targets from a declarative scope, provision ephemeral
//! scanner workloads against them, and act on the resulting handles.
//! One backend (AWS) is implemented; further clouds slot in as additional
//! implementations without changing callers.

pub mod aws;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SkyscanError;
use crate::scope::ScanScopeDocument;

/// Lifecycle state of a cloud instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstanceStatus {
    Pending,
    Running,
    ShuttingDown,
    Terminated,
    Stopping,
    Stopped,
}

impl InstanceStatus {
    /// Map a provider state name onto the status enum. Unknown names report
    /// `pending`, the provider's own initial state.
    pub fn from_state_name(name: &str) -> Self {
        match name {
            "running" => Self::Running,
            "shutting-down" => Self::ShuttingDown,
            "terminated" => Self::Terminated,
            "stopping" => Self::Stopping,
            "stopped" => Self::Stopped,
            _ => Self::Pending,
        }
    }
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstanceStatus::Pending => write!(f, "pending"),
            InstanceStatus::Running => write!(f, "running"),
            InstanceStatus::ShuttingDown => write!(f, "shutting-down"),
            InstanceStatus::Terminated => write!(f, "terminated"),
            InstanceStatus::Stopping => write!(f, "stopping"),
            InstanceStatus::Stopped => write!(f, "stopped"),
        }
    }
}

/// Job settings for one scanner workload launch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanningJobConfig {
    /// Scanner container image reference.
    pub scanner_image: String,
    /// Opaque scanner CLI configuration, shipped in the bootstrap payload.
    pub scanner_cli_config: String,
    /// Callback server address scan results are reported to.
    pub server_address: String,
    /// Correlation id for the scan result this workload produces.
    pub scan_result_id: String,
    /// SSH key pair to attach to the scanner instance. Empty means none;
    /// no default key pair is ever substituted.
    pub key_pair_name: String,
}

/// Non-owning reference to a cloud instance plus the capability to act on
/// it. Identity is `(region, id)`; the cloud provider owns the lifetime.
#[async_trait]
pub trait InstanceHandle: Send + Sync {
    fn id(&self) -> &str;

    fn region(&self) -> &str;

    /// Availability zone, known only for instances this system launched.
    fn availability_zone(&self) -> Option<&str> {
        None
    }

    /// Current lifecycle state, queried from the provider.
    async fn status(&self) -> Result<InstanceStatus, SkyscanError>;

    /// Terminate the instance in its own region.
    async fn terminate(&self) -> Result<(), SkyscanError>;
}

/// A cloud backend able to discover scan targets and provision scanner
/// workloads.
///
/// Both operations are single atomic units of work: cancellation is
/// caller-driven (dropping the future aborts the in-flight provider call)
/// and no partial result escapes either way.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Backend identifier for logging.
    fn name(&self) -> &'static str;

    /// Discover all instances matching the scope. All-or-nothing: the first
    /// failed provider query aborts the whole discovery and any partial
    /// results are discarded.
    async fn discover(
        &self,
        scope: &ScanScopeDocument,
    ) -> Result<Vec<Box<dyn InstanceHandle>>, SkyscanError>;

    /// Launch one ephemeral scanner workload against `target_id` in
    /// `region`. Returns a handle carrying the new instance's id, region,
    /// and availability zone.
    async fn provision(
        &self,
        region: &str,
        target_id: &str,
        config: &ScanningJobConfig,
    ) -> Result<Box<dyn InstanceHandle>, SkyscanError>;
}
