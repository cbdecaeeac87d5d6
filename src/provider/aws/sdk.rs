//! AWS SDK Backend
//!
//! [`Ec2Api`] implemented over `aws-sdk-ec2`. Credentials and the default
//! region come from the ambient AWS environment (env vars, profile, IMDS);
//! every operation builds a client pinned to the explicit region it is
//! scoped to.

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_ec2::config::Region;
use aws_sdk_ec2::types::{
    InstanceNetworkInterfaceSpecification, InstanceType, ResourceType, TagSpecification,
};
use tracing::debug;

use super::ec2_api::{Ec2Api, InstancePage, InstanceRecord, LaunchPlan, LaunchedInstance};
use crate::filters::Filter;
use crate::scope::Tag;

/// EC2 access through the official SDK.
#[derive(Debug)]
pub struct SdkEc2 {
    shared_config: aws_config::SdkConfig,
}

impl SdkEc2 {
    /// Load the ambient AWS configuration.
    pub async fn new() -> Self {
        let shared_config = aws_config::load_from_env().await;
        Self { shared_config }
    }

    fn client_for(&self, region: &str) -> aws_sdk_ec2::Client {
        let config = aws_sdk_ec2::config::Builder::from(&self.shared_config)
            .region(Region::new(region.to_string()))
            .build();
        aws_sdk_ec2::Client::from_conf(config)
    }

    fn default_client(&self) -> aws_sdk_ec2::Client {
        aws_sdk_ec2::Client::new(&self.shared_config)
    }
}

fn to_sdk_filter(filter: &Filter) -> aws_sdk_ec2::types::Filter {
    aws_sdk_ec2::types::Filter::builder()
        .name(&filter.name)
        .set_values(Some(filter.values.clone()))
        .build()
}

fn to_sdk_tags(tags: &[Tag]) -> Vec<aws_sdk_ec2::types::Tag> {
    tags.iter()
        .map(|tag| {
            aws_sdk_ec2::types::Tag::builder()
                .key(&tag.key)
                .value(&tag.value)
                .build()
        })
        .collect()
}

#[async_trait]
impl Ec2Api for SdkEc2 {
    async fn list_regions(&self) -> Result<Vec<String>> {
        let out = self
            .default_client()
            .describe_regions()
            .all_regions(true)
            .send()
            .await
            .context("DescribeRegions")?;

        Ok(out
            .regions()
            .iter()
            .filter_map(|region| region.region_name().map(str::to_string))
            .collect())
    }

    async fn describe_instances_page(
        &self,
        region: &str,
        filters: &[Filter],
        page_size: i32,
        page_token: Option<String>,
    ) -> Result<InstancePage> {
        debug!(region, filters = ?filters, "describing instances");

        let mut request = self
            .client_for(region)
            .describe_instances()
            .set_filters(Some(filters.iter().map(to_sdk_filter).collect()))
            .max_results(page_size);
        if let Some(token) = page_token {
            request = request.next_token(token);
        }

        let out = request.send().await.context("DescribeInstances")?;

        let mut instances = Vec::new();
        for reservation in out.reservations() {
            for instance in reservation.instances() {
                let Some(id) = instance.instance_id() else {
                    continue;
                };
                instances.push(InstanceRecord {
                    id: id.to_string(),
                    state: instance
                        .state()
                        .and_then(|state| state.name())
                        .map(|name| name.as_str().to_string())
                        .unwrap_or_default(),
                    tags: instance
                        .tags()
                        .iter()
                        .filter_map(|tag| {
                            Some(Tag::new(tag.key()?.to_string(), tag.value()?.to_string()))
                        })
                        .collect(),
                });
            }
        }

        Ok(InstancePage {
            instances,
            next_token: out.next_token().map(str::to_string),
        })
    }

    async fn run_instance(&self, region: &str, plan: &LaunchPlan) -> Result<LaunchedInstance> {
        // Single network interface on the scanner subnet: no public address,
        // deleted with the instance so no orphaned interfaces survive.
        let network_interface = InstanceNetworkInterfaceSpecification::builder()
            .device_index(0)
            .subnet_id(&plan.subnet_id)
            .groups(&plan.security_group_id)
            .associate_public_ip_address(false)
            .delete_on_termination(true)
            .build();

        let mut request = self
            .client_for(region)
            .run_instances()
            .min_count(1)
            .max_count(1)
            .image_id(&plan.image_id)
            .instance_type(InstanceType::from(plan.instance_type.as_str()))
            .user_data(&plan.user_data_base64)
            .tag_specifications(
                TagSpecification::builder()
                    .resource_type(ResourceType::Instance)
                    .set_tags(Some(to_sdk_tags(&plan.instance_tags)))
                    .build(),
            )
            .tag_specifications(
                TagSpecification::builder()
                    .resource_type(ResourceType::Volume)
                    .set_tags(Some(to_sdk_tags(&plan.volume_tags)))
                    .build(),
            )
            .network_interfaces(network_interface);

        if let Some(key_pair) = &plan.key_pair_name {
            request = request.key_name(key_pair);
        }

        let out = request.send().await.context("RunInstances")?;
        let instance = out
            .instances()
            .first()
            .context("RunInstances returned no instance")?;

        Ok(LaunchedInstance {
            id: instance
                .instance_id()
                .context("launched instance has no id")?
                .to_string(),
            availability_zone: instance
                .placement()
                .and_then(|placement| placement.availability_zone())
                .context("launched instance has no availability zone")?
                .to_string(),
        })
    }

    async fn instance_state(&self, region: &str, instance_id: &str) -> Result<Option<String>> {
        let out = self
            .client_for(region)
            .describe_instances()
            .instance_ids(instance_id)
            .send()
            .await
            .context("DescribeInstances")?;

        for reservation in out.reservations() {
            for instance in reservation.instances() {
                if instance.instance_id() == Some(instance_id) {
                    return Ok(instance
                        .state()
                        .and_then(|state| state.name())
                        .map(|name| name.as_str().to_string()));
                }
            }
        }

        Ok(None)
    }

    async fn terminate_instance(&self, region: &str, instance_id: &str) -> Result<()> {
        self.client_for(region)
            .terminate_instances()
            .instance_ids(instance_id)
            .send()
            .await
            .context("TerminateInstances")?;
        Ok(())
    }
}
