//! Skyscan Runtime-Scan Agent
//!
//! Discovers compute targets in a cloud account from a declarative scan
//! scope and provisions short-lived scanner instances against them. The
//! discovery engine compiles the scope into provider-native filters, fans
//! out over regions and VPCs with full pagination, and applies tag-based
//! exclusion after fetch; provisioning generates the first-boot payload and
//! launches a tagged, network-isolated scanner instance.

pub mod cloudinit;
pub mod config;
pub mod error;
pub mod filters;
pub mod provider;
pub mod scope;

pub use config::{AwsProviderConfig, TagPolicy};
pub use error::SkyscanError;
pub use provider::aws::AwsProvider;
pub use provider::{InstanceHandle, InstanceStatus, Provider, ScanningJobConfig};
pub use scope::{ScanScope, ScanScopeDocument, Tag};
