//! Filter Compilation
//!
//! Builds the provider-native filter set for one discovery query and
//! implements the post-fetch tag-exclusion predicate. Filters composed for
//! one query are ANDed together; values within one filter are ORed.

use std::collections::HashMap;

use crate::scope::{Tag, Vpc};

pub const INSTANCE_STATE_FILTER: &str = "instance-state-name";
pub const VPC_ID_FILTER: &str = "vpc-id";
pub const SECURITY_GROUP_FILTER: &str = "instance.group-id";

/// A provider-native query predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub name: String,
    pub values: Vec<String>,
}

impl Filter {
    pub fn new(name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

/// One `tag:<key>` filter per selector tag. Since filters AND together, an
/// instance must carry every selected tag with its exact value to match.
pub fn inclusion_tag_filters(tag_selector: &[Tag]) -> Vec<Filter> {
    tag_selector
        .iter()
        .map(|tag| Filter::new(format!("tag:{}", tag.key), vec![tag.value.clone()]))
        .collect()
}

/// Instance-state filter: `running`, extended with `stopped` when stopped
/// instances are in scope. No other state is ever scannable.
pub fn instance_state_filter(scan_stopped: bool) -> Filter {
    let mut states = vec!["running".to_string()];
    if scan_stopped {
        states.push("stopped".to_string());
    }
    Filter::new(INSTANCE_STATE_FILTER, states)
}

/// Filters restricting a query to one VPC: its id, plus a security-group
/// filter only when the VPC declares any groups.
pub fn vpc_filters(vpc: &Vpc) -> Vec<Filter> {
    let mut filters = vec![Filter::new(VPC_ID_FILTER, vec![vpc.id.clone()])];

    if !vpc.security_groups.is_empty() {
        filters.push(Filter::new(
            SECURITY_GROUP_FILTER,
            vpc.security_groups.iter().map(|sg| sg.id.clone()).collect(),
        ));
    }

    filters
}

/// Exclusion predicate, applied per instance after fetch.
///
/// An instance is excluded only if EVERY pair in `exclude_tags` is present
/// among its own tags with a matching value. An empty exclusion set or an
/// untagged instance never excludes.
pub fn matches_exclude_tags(exclude_tags: &[Tag], instance_tags: &[Tag]) -> bool {
    if exclude_tags.is_empty() || instance_tags.is_empty() {
        return false;
    }

    let by_key: HashMap<&str, &str> = instance_tags
        .iter()
        .map(|tag| (tag.key.as_str(), tag.value.as_str()))
        .collect();

    exclude_tags
        .iter()
        .all(|tag| by_key.get(tag.key.as_str()).copied() == Some(tag.value.as_str()))
}
