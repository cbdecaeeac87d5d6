//! Scan Scope Types
//!
//! The external scope document (a tagged union, one variant per cloud
//! provider) and the normalized internal scope the discovery engine works
//! from. Resolution is pure, no I/O.

use serde::{Deserialize, Serialize};

use crate::error::SkyscanError;

/// A key/value resource tag. Equality is exact and case-sensitive on both
/// fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

// ============================================================
// External scope document (wire model)
// ============================================================

/// Declarative scan-scope description as submitted by the orchestrator.
///
/// Currently the only variant is the AWS scope; further providers add
/// variants without changing callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "objectType")]
pub enum ScanScopeDocument {
    AwsScanScope(AwsScanScope),
}

impl ScanScopeDocument {
    /// Parse a scope document from JSON. An unknown `objectType` or a
    /// structurally invalid document fails with [`SkyscanError::Scope`].
    pub fn from_json(raw: &str) -> Result<Self, SkyscanError> {
        serde_json::from_str(raw).map_err(|e| SkyscanError::Scope(e.to_string()))
    }

    /// Normalize into the internal [`ScanScope`]. Absent optional fields
    /// default to false/empty.
    pub fn resolve(&self) -> Result<ScanScope, SkyscanError> {
        let ScanScopeDocument::AwsScanScope(aws) = self;
        Ok(ScanScope {
            all_regions: aws.all_regions.unwrap_or(false),
            regions: aws
                .regions
                .as_deref()
                .unwrap_or_default()
                .iter()
                .map(Region::from_wire)
                .collect(),
            scan_stopped: aws.should_scan_stopped_instances.unwrap_or(false),
            tag_selector: aws.instance_tag_selector.clone().unwrap_or_default(),
            exclude_tags: aws.instance_tag_exclusion.clone().unwrap_or_default(),
        })
    }
}

/// AWS scope variant, all fields optional on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AwsScanScope {
    pub all_regions: Option<bool>,
    pub regions: Option<Vec<AwsRegion>>,
    pub should_scan_stopped_instances: Option<bool>,
    pub instance_tag_selector: Option<Vec<Tag>>,
    pub instance_tag_exclusion: Option<Vec<Tag>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwsRegion {
    pub name: String,
    pub vpcs: Option<Vec<AwsVpc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwsVpc {
    pub id: String,
    pub security_groups: Option<Vec<AwsSecurityGroup>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsSecurityGroup {
    pub id: String,
}

// ============================================================
// Normalized internal scope
// ============================================================

/// Normalized scan scope consumed by the discovery engine.
#[derive(Debug, Clone, Default)]
pub struct ScanScope {
    /// When true the region catalog is resolved dynamically and any
    /// explicit `regions` entry is ignored.
    pub all_regions: bool,
    pub regions: Vec<Region>,
    /// Extend discovery to stopped instances in addition to running ones.
    pub scan_stopped: bool,
    /// Tags an instance must carry, all of them, to be included.
    pub tag_selector: Vec<Tag>,
    /// Tags that, if all present on an instance, disqualify it.
    pub exclude_tags: Vec<Tag>,
}

/// A region to scan. No VPCs means the whole region, unrestricted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub name: String,
    pub vpcs: Vec<Vpc>,
}

impl Region {
    /// Whole-region entry with no VPC restriction.
    pub fn unrestricted(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vpcs: Vec::new(),
        }
    }

    fn from_wire(region: &AwsRegion) -> Self {
        Self {
            name: region.name.clone(),
            vpcs: region
                .vpcs
                .as_deref()
                .unwrap_or_default()
                .iter()
                .map(|vpc| Vpc {
                    id: vpc.id.clone(),
                    security_groups: vpc
                        .security_groups
                        .as_deref()
                        .unwrap_or_default()
                        .iter()
                        .map(|sg| SecurityGroup { id: sg.id.clone() })
                        .collect(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vpc {
    pub id: String,
    pub security_groups: Vec<SecurityGroup>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityGroup {
    pub id: String,
}
