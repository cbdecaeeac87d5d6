//! Raw EC2 Operation Seam
//!
//! The narrow set of EC2 calls the AWS backend needs, expressed over the
//! crate's own value types. Kept as a trait so discovery and provisioning
//! logic can be exercised against an in-memory implementation; the real one
//! lives in [`super::sdk`]. Retry/backoff belongs to the client beneath
//! this trait, never above it.

use anyhow::Result;
use async_trait::async_trait;

use crate::filters::Filter;
use crate::scope::Tag;

/// One discovered instance as reported by the provider.
#[derive(Debug, Clone)]
pub struct InstanceRecord {
    pub id: String,
    /// Provider state name, e.g. `running`.
    pub state: String,
    pub tags: Vec<Tag>,
}

impl InstanceRecord {
    pub fn new(id: impl Into<String>, state: impl Into<String>, tags: Vec<Tag>) -> Self {
        Self {
            id: id.into(),
            state: state.into(),
            tags,
        }
    }
}

/// One page of an instance enumeration. A present `next_token` means the
/// enumeration must continue with that token.
#[derive(Debug, Clone, Default)]
pub struct InstancePage {
    pub instances: Vec<InstanceRecord>,
    pub next_token: Option<String>,
}

/// Fully assembled launch request for one scanner instance.
#[derive(Debug, Clone)]
pub struct LaunchPlan {
    pub image_id: String,
    pub instance_type: String,
    /// Bootstrap payload, already transport-encoded.
    pub user_data_base64: String,
    /// Scanner subnet for the instance's single network interface.
    pub subnet_id: String,
    /// Scanner security group on that interface.
    pub security_group_id: String,
    /// `None` omits any key-pair reference from the request.
    pub key_pair_name: Option<String>,
    pub instance_tags: Vec<Tag>,
    pub volume_tags: Vec<Tag>,
}

/// A freshly launched instance.
#[derive(Debug, Clone)]
pub struct LaunchedInstance {
    pub id: String,
    pub availability_zone: String,
}

/// Raw EC2 operations, each scoped to an explicit region.
#[async_trait]
pub trait Ec2Api: Send + Sync {
    /// Full region catalog, disabled regions included. Disabled regions
    /// harmlessly yield zero instances downstream.
    async fn list_regions(&self) -> Result<Vec<String>>;

    /// One page of filtered instance enumeration. `page_size` is a hint
    /// only; callers must follow `next_token` to exhaustion.
    async fn describe_instances_page(
        &self,
        region: &str,
        filters: &[Filter],
        page_size: i32,
        page_token: Option<String>,
    ) -> Result<InstancePage>;

    /// Launch exactly one instance per the plan.
    async fn run_instance(&self, region: &str, plan: &LaunchPlan) -> Result<LaunchedInstance>;

    /// Provider state name for one instance, or `None` when the provider
    /// does not report it.
    async fn instance_state(&self, region: &str, instance_id: &str) -> Result<Option<String>>;

    async fn terminate_instance(&self, region: &str, instance_id: &str) -> Result<()>;
}
