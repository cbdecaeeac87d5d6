//! Provider Configuration
//!
//! Launch-time settings for the AWS backend and the tagging policy applied
//! to every resource this system creates. Both are injected at provider
//! construction; there is no mutable global state.

use serde::{Deserialize, Serialize};

use crate::scope::Tag;

fn default_instance_type() -> String {
    "t2.large".to_string()
}

fn default_page_size() -> i32 {
    50
}

/// Settings for launching scanner instances in the owner's account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsProviderConfig {
    /// AMI the scanner instance boots from.
    pub ami_id: String,
    /// Dedicated scanner subnet for the instance's single network interface.
    pub subnet_id: String,
    /// Security group attached to the scanner network interface.
    pub security_group_id: String,
    /// EC2 instance size class for scanner workloads.
    #[serde(default = "default_instance_type")]
    pub instance_type: String,
    /// Page-size hint for instance enumeration. Advisory only; pagination
    /// always follows the continuation token to exhaustion.
    #[serde(default = "default_page_size")]
    pub page_size: i32,
}

impl Default for AwsProviderConfig {
    fn default() -> Self {
        Self {
            ami_id: String::new(),
            subnet_id: String::new(),
            security_group_id: String::new(),
            instance_type: default_instance_type(),
            page_size: default_page_size(),
        }
    }
}

/// Tagging policy for resources created by provisioning.
///
/// The ownership tag is the sole marker used to find resources owned by
/// this system for later cleanup and is attached to every created resource.
#[derive(Debug, Clone)]
pub struct TagPolicy {
    owner_tag: Tag,
    name_key: String,
    name_prefix: String,
}

impl TagPolicy {
    pub fn new(owner_value: impl Into<String>) -> Self {
        let owner_value = owner_value.into();
        Self {
            name_prefix: format!("{}-scanner", owner_value.to_lowercase()),
            owner_tag: Tag::new("Owner", owner_value),
            name_key: "Name".to_string(),
        }
    }

    pub fn owner_tag(&self) -> &Tag {
        &self.owner_tag
    }

    /// Tags for a scanner instance: ownership plus a `Name` tag naming the
    /// scanned target.
    pub fn instance_tags(&self, target_id: &str) -> Vec<Tag> {
        vec![
            self.owner_tag.clone(),
            Tag::new(
                self.name_key.clone(),
                format!("{}-{}", self.name_prefix, target_id),
            ),
        ]
    }

    /// Tags for auxiliary resources (volumes): ownership only.
    pub fn resource_tags(&self) -> Vec<Tag> {
        vec![self.owner_tag.clone()]
    }
}

impl Default for TagPolicy {
    fn default() -> Self {
        Self::new("skyscan")
    }
}
