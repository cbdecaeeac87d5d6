//! AWS Provider
//!
//! Discovery walks the resolved regions sequentially, one fully paginated
//! query per region (or per VPC within it), and aggregates surviving
//! instances in query order. Provisioning renders the bootstrap payload,
//! assembles the launch plan with the tagging and isolation policy, and
//! submits it to the target's region.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::ec2_api::{Ec2Api, LaunchPlan};
use super::sdk::SdkEc2;
use crate::cloudinit::{self, BootstrapData};
use crate::config::{AwsProviderConfig, TagPolicy};
use crate::error::SkyscanError;
use crate::filters::{self, Filter};
use crate::provider::{InstanceHandle, InstanceStatus, Provider, ScanningJobConfig};
use crate::scope::{Region, ScanScope, ScanScopeDocument, Tag};

/// AWS backend for target discovery and scanner provisioning.
pub struct AwsProvider {
    api: Arc<dyn Ec2Api>,
    config: AwsProviderConfig,
    tags: TagPolicy,
}

impl AwsProvider {
    /// Build against the real SDK using ambient AWS credentials.
    pub async fn new(config: AwsProviderConfig, tags: TagPolicy) -> Self {
        Self {
            api: Arc::new(SdkEc2::new().await),
            config,
            tags,
        }
    }

    /// Build against any [`Ec2Api`] implementation.
    pub fn with_api(api: Arc<dyn Ec2Api>, config: AwsProviderConfig, tags: TagPolicy) -> Self {
        Self { api, config, tags }
    }

    /// Resolve the regions to scan. `all_regions` queries the full region
    /// catalog (disabled regions included, they harmlessly yield nothing)
    /// with no VPC restriction; otherwise the scope's explicit list passes
    /// through unchanged.
    async fn regions_to_scan(&self, scope: &ScanScope) -> Result<Vec<Region>, SkyscanError> {
        if !scope.all_regions {
            return Ok(scope.regions.clone());
        }

        let names = self
            .api
            .list_regions()
            .await
            .map_err(|e| SkyscanError::discovery("list regions", e))?;

        Ok(names.into_iter().map(Region::unrestricted).collect())
    }

    /// All matching instances in one region, fully paginated, with the
    /// exclusion rule applied per instance after fetch.
    async fn instances_in_region(
        &self,
        region: &str,
        filters: &[Filter],
        exclude_tags: &[Tag],
    ) -> Result<Vec<Box<dyn InstanceHandle>>, SkyscanError> {
        let mut found: Vec<Box<dyn InstanceHandle>> = Vec::new();
        let mut page_token = None;

        loop {
            let page = self
                .api
                .describe_instances_page(region, filters, self.config.page_size, page_token)
                .await
                .map_err(|e| {
                    SkyscanError::discovery(format!("describe instances in {region}"), e)
                })?;

            for instance in page.instances {
                if filters::matches_exclude_tags(exclude_tags, &instance.tags) {
                    debug!(region, id = %instance.id, "instance excluded by tags");
                    continue;
                }
                found.push(Box::new(AwsInstanceHandle {
                    api: self.api.clone(),
                    id: instance.id,
                    region: region.to_string(),
                    availability_zone: None,
                }));
            }

            match page.next_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(found)
    }
}

#[async_trait]
impl Provider for AwsProvider {
    fn name(&self) -> &'static str {
        "aws"
    }

    async fn discover(
        &self,
        scope: &ScanScopeDocument,
    ) -> Result<Vec<Box<dyn InstanceHandle>>, SkyscanError> {
        let scope = scope.resolve()?;

        let regions = self.regions_to_scan(&scope).await?;
        if regions.is_empty() {
            return Err(SkyscanError::NoRegionsToScan);
        }

        // Base filters are region-independent and immutable once built.
        let mut base_filters = filters::inclusion_tag_filters(&scope.tag_selector);
        base_filters.push(filters::instance_state_filter(scope.scan_stopped));

        let mut targets: Vec<Box<dyn InstanceHandle>> = Vec::new();
        for region in &regions {
            // No VPCs means no VPC restriction for the whole region.
            if region.vpcs.is_empty() {
                let instances = self
                    .instances_in_region(&region.name, &base_filters, &scope.exclude_tags)
                    .await?;
                targets.extend(instances);
                continue;
            }

            for vpc in &region.vpcs {
                // Each VPC extends a fresh copy of the base filters so one
                // VPC's filters never leak into another VPC's query.
                let mut vpc_filters = base_filters.clone();
                vpc_filters.extend(filters::vpc_filters(vpc));

                let instances = self
                    .instances_in_region(&region.name, &vpc_filters, &scope.exclude_tags)
                    .await?;
                targets.extend(instances);
            }
        }

        info!(targets = targets.len(), regions = regions.len(), "discovery finished");
        Ok(targets)
    }

    async fn provision(
        &self,
        region: &str,
        target_id: &str,
        config: &ScanningJobConfig,
    ) -> Result<Box<dyn InstanceHandle>, SkyscanError> {
        let user_data = cloudinit::render(&BootstrapData {
            scanner_cli_config: config.scanner_cli_config.clone(),
            scanner_image: config.scanner_image.clone(),
            server_address: config.server_address.clone(),
            scan_result_id: config.scan_result_id.clone(),
        })?;

        let plan = LaunchPlan {
            image_id: self.config.ami_id.clone(),
            instance_type: self.config.instance_type.clone(),
            user_data_base64: cloudinit::encode_user_data(&user_data),
            subnet_id: self.config.subnet_id.clone(),
            security_group_id: self.config.security_group_id.clone(),
            key_pair_name: if config.key_pair_name.is_empty() {
                None
            } else {
                Some(config.key_pair_name.clone())
            },
            instance_tags: self.tags.instance_tags(target_id),
            volume_tags: self.tags.resource_tags(),
        };

        let launched = self
            .api
            .run_instance(region, &plan)
            .await
            .map_err(|e| {
                SkyscanError::provisioning(format!("run scanner instance in {region}"), e)
            })?;

        info!(id = %launched.id, region, target_id, "scanner instance launched");

        Ok(Box::new(AwsInstanceHandle {
            api: self.api.clone(),
            id: launched.id,
            region: region.to_string(),
            availability_zone: Some(launched.availability_zone),
        }))
    }
}

/// Handle to one EC2 instance, routing lifecycle calls to its own region.
pub struct AwsInstanceHandle {
    api: Arc<dyn Ec2Api>,
    id: String,
    region: String,
    availability_zone: Option<String>,
}

#[async_trait]
impl InstanceHandle for AwsInstanceHandle {
    fn id(&self) -> &str {
        &self.id
    }

    fn region(&self) -> &str {
        &self.region
    }

    fn availability_zone(&self) -> Option<&str> {
        self.availability_zone.as_deref()
    }

    async fn status(&self) -> Result<InstanceStatus, SkyscanError> {
        let state = self
            .api
            .instance_state(&self.region, &self.id)
            .await
            .map_err(|e| {
                SkyscanError::discovery(
                    format!("describe instance {} in {}", self.id, self.region),
                    e,
                )
            })?;

        Ok(InstanceStatus::from_state_name(state.as_deref().unwrap_or_default()))
    }

    async fn terminate(&self) -> Result<(), SkyscanError> {
        self.api
            .terminate_instance(&self.region, &self.id)
            .await
            .map_err(|e| {
                SkyscanError::provisioning(
                    format!("terminate instance {} in {}", self.id, self.region),
                    e,
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use anyhow::{bail, Result};

    use super::*;
    use crate::provider::aws::ec2_api::{InstancePage, InstanceRecord, LaunchedInstance};

    /// Every instance query the fake served, for filter/pagination
    /// regression assertions.
    #[derive(Debug, Clone)]
    struct RecordedQuery {
        region: String,
        filters: Vec<Filter>,
        page_token: Option<String>,
    }

    #[derive(Default)]
    struct FakeEc2 {
        regions: Vec<String>,
        /// Pages served per region, in order, across successive queries.
        pages: Mutex<HashMap<String, Vec<InstancePage>>>,
        fail_regions: Vec<String>,
        queries: Mutex<Vec<RecordedQuery>>,
        launches: Mutex<Vec<(String, LaunchPlan)>>,
    }

    impl FakeEc2 {
        fn with_pages(pages: HashMap<String, Vec<InstancePage>>) -> Self {
            Self {
                pages: Mutex::new(pages),
                ..Default::default()
            }
        }

        fn queries(&self) -> Vec<RecordedQuery> {
            self.queries.lock().unwrap().clone()
        }

        fn launches(&self) -> Vec<(String, LaunchPlan)> {
            self.launches.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Ec2Api for FakeEc2 {
        async fn list_regions(&self) -> Result<Vec<String>> {
            Ok(self.regions.clone())
        }

        async fn describe_instances_page(
            &self,
            region: &str,
            filters: &[Filter],
            _page_size: i32,
            page_token: Option<String>,
        ) -> Result<InstancePage> {
            self.queries.lock().unwrap().push(RecordedQuery {
                region: region.to_string(),
                filters: filters.to_vec(),
                page_token: page_token.clone(),
            });

            if self.fail_regions.iter().any(|r| r == region) {
                bail!("api is down in {region}");
            }

            let mut pages = self.pages.lock().unwrap();
            let remaining = pages.entry(region.to_string()).or_default();
            if remaining.is_empty() {
                return Ok(InstancePage::default());
            }
            Ok(remaining.remove(0))
        }

        async fn run_instance(&self, region: &str, plan: &LaunchPlan) -> Result<LaunchedInstance> {
            self.launches
                .lock()
                .unwrap()
                .push((region.to_string(), plan.clone()));
            Ok(LaunchedInstance {
                id: "i-scanner".to_string(),
                availability_zone: format!("{region}a"),
            })
        }

        async fn instance_state(&self, _region: &str, _instance_id: &str) -> Result<Option<String>> {
            Ok(Some("running".to_string()))
        }

        async fn terminate_instance(&self, _region: &str, _instance_id: &str) -> Result<()> {
            Ok(())
        }
    }

    fn provider(api: FakeEc2) -> (AwsProvider, Arc<FakeEc2>) {
        let api = Arc::new(api);
        let provider = AwsProvider::with_api(
            api.clone(),
            AwsProviderConfig {
                ami_id: "ami-scanner".to_string(),
                subnet_id: "subnet-scanner".to_string(),
                security_group_id: "sg-scanner".to_string(),
                ..Default::default()
            },
            TagPolicy::default(),
        );
        (provider, api)
    }

    fn scope_doc(raw: &str) -> ScanScopeDocument {
        ScanScopeDocument::from_json(raw).unwrap()
    }

    fn page(instances: Vec<InstanceRecord>, next_token: Option<&str>) -> InstancePage {
        InstancePage {
            instances,
            next_token: next_token.map(str::to_string),
        }
    }

    fn running(id: &str, tags: Vec<Tag>) -> InstanceRecord {
        InstanceRecord::new(id, "running", tags)
    }

    fn ids(targets: &[Box<dyn InstanceHandle>]) -> Vec<String> {
        targets.iter().map(|t| t.id().to_string()).collect()
    }

    #[tokio::test]
    async fn test_all_regions_resolves_full_catalog() {
        let api = FakeEc2 {
            regions: vec![
                "us-east-1".to_string(),
                "eu-west-1".to_string(),
                "ap-southeast-9".to_string(), // disabled region stays in
            ],
            ..Default::default()
        };
        let (provider, api) = provider(api);

        let targets = provider
            .discover(&scope_doc(r#"{"objectType": "AwsScanScope", "allRegions": true}"#))
            .await
            .unwrap();

        assert!(targets.is_empty());
        let queries = api.queries();
        assert_eq!(queries.len(), 3);
        let regions: Vec<_> = queries.iter().map(|q| q.region.as_str()).collect();
        assert_eq!(regions, vec!["us-east-1", "eu-west-1", "ap-southeast-9"]);
        // No VPC restriction attached when resolving the full catalog.
        for query in &queries {
            assert!(query.filters.iter().all(|f| f.name != filters::VPC_ID_FILTER));
        }
    }

    #[tokio::test]
    async fn test_empty_scope_is_no_regions_to_scan() {
        let (provider, api) = provider(FakeEc2::default());

        let err = provider
            .discover(&scope_doc(r#"{"objectType": "AwsScanScope"}"#))
            .await
            .unwrap_err();

        assert!(matches!(err, SkyscanError::NoRegionsToScan));
        assert!(api.queries().is_empty());
    }

    #[tokio::test]
    async fn test_base_filters_include_selector_and_state() {
        let api = FakeEc2::with_pages(HashMap::from([(
            "us-east-1".to_string(),
            vec![page(vec![running("i-1", vec![])], None)],
        )]));
        let (provider, api) = provider(api);

        let raw = r#"{
            "objectType": "AwsScanScope",
            "regions": [{"name": "us-east-1"}],
            "shouldScanStoppedInstances": true,
            "instanceTagSelector": [
                {"key": "env", "value": "prod"},
                {"key": "team", "value": "sec"}
            ]
        }"#;
        let targets = provider.discover(&scope_doc(raw)).await.unwrap();

        assert_eq!(ids(&targets), vec!["i-1"]);
        let queries = api.queries();
        assert_eq!(queries.len(), 1);
        assert_eq!(
            queries[0].filters,
            vec![
                Filter::new("tag:env", vec!["prod".to_string()]),
                Filter::new("tag:team", vec!["sec".to_string()]),
                Filter::new(
                    filters::INSTANCE_STATE_FILTER,
                    vec!["running".to_string(), "stopped".to_string()]
                ),
            ]
        );
    }

    #[tokio::test]
    async fn test_vpc_queries_are_isolated() {
        // vpc-1 has no security groups, vpc-2 has one. The vpc-1 query must
        // carry no group filter and the vpc-2 query must not carry anything
        // built for vpc-1.
        let api = FakeEc2::with_pages(HashMap::from([(
            "us-east-1".to_string(),
            vec![
                page(vec![running("i-a", vec![])], None),
                page(vec![running("i-b", vec![])], None),
            ],
        )]));
        let (provider, api) = provider(api);

        let raw = r#"{
            "objectType": "AwsScanScope",
            "regions": [{
                "name": "us-east-1",
                "vpcs": [
                    {"id": "vpc-1"},
                    {"id": "vpc-2", "securityGroups": [{"id": "sg-1"}]}
                ]
            }]
        }"#;
        let targets = provider.discover(&scope_doc(raw)).await.unwrap();

        assert_eq!(ids(&targets), vec!["i-a", "i-b"]);
        let queries = api.queries();
        assert_eq!(queries.len(), 2);

        let state = filters::instance_state_filter(false);
        assert_eq!(
            queries[0].filters,
            vec![
                state.clone(),
                Filter::new(filters::VPC_ID_FILTER, vec!["vpc-1".to_string()]),
            ]
        );
        assert_eq!(
            queries[1].filters,
            vec![
                state,
                Filter::new(filters::VPC_ID_FILTER, vec!["vpc-2".to_string()]),
                Filter::new(filters::SECURITY_GROUP_FILTER, vec!["sg-1".to_string()]),
            ]
        );
    }

    #[tokio::test]
    async fn test_pagination_follows_tokens_to_exhaustion() {
        let api = FakeEc2::with_pages(HashMap::from([(
            "us-east-1".to_string(),
            vec![
                page(vec![running("i-1", vec![])], Some("page-2")),
                page(vec![running("i-2", vec![])], Some("page-3")),
                page(vec![running("i-3", vec![])], None),
            ],
        )]));
        let (provider, api) = provider(api);

        let raw = r#"{"objectType": "AwsScanScope", "regions": [{"name": "us-east-1"}]}"#;
        let targets = provider.discover(&scope_doc(raw)).await.unwrap();

        assert_eq!(ids(&targets), vec!["i-1", "i-2", "i-3"]);
        let tokens: Vec<_> = api.queries().iter().map(|q| q.page_token.clone()).collect();
        assert_eq!(
            tokens,
            vec![None, Some("page-2".to_string()), Some("page-3".to_string())]
        );
    }

    #[tokio::test]
    async fn test_exclusion_applied_after_fetch() {
        let api = FakeEc2::with_pages(HashMap::from([(
            "us-east-1".to_string(),
            vec![page(
                vec![
                    running("i-excluded", vec![Tag::new("env", "prod"), Tag::new("x", "y")]),
                    running("i-kept", vec![Tag::new("env", "dev")]),
                    running("i-untagged", vec![]),
                ],
                None,
            )],
        )]));
        let (provider, _api) = provider(api);

        let raw = r#"{
            "objectType": "AwsScanScope",
            "regions": [{"name": "us-east-1"}],
            "instanceTagExclusion": [{"key": "env", "value": "prod"}]
        }"#;
        let targets = provider.discover(&scope_doc(raw)).await.unwrap();

        assert_eq!(ids(&targets), vec!["i-kept", "i-untagged"]);
    }

    #[tokio::test]
    async fn test_discovery_is_all_or_nothing() {
        let api = FakeEc2 {
            pages: Mutex::new(HashMap::from([(
                "us-east-1".to_string(),
                vec![page(vec![running("i-1", vec![])], None)],
            )])),
            fail_regions: vec!["eu-west-1".to_string()],
            ..Default::default()
        };
        let (provider, _api) = provider(api);

        let raw = r#"{
            "objectType": "AwsScanScope",
            "regions": [{"name": "us-east-1"}, {"name": "eu-west-1"}]
        }"#;
        let err = provider.discover(&scope_doc(raw)).await.unwrap_err();

        match err {
            SkyscanError::Discovery { context, .. } => assert!(context.contains("eu-west-1")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_provision_without_key_pair() {
        let (provider, api) = provider(FakeEc2::default());

        let workload = provider
            .provision(
                "eu-west-1",
                "i-target",
                &ScanningJobConfig {
                    scanner_image: "ghcr.io/skyscan/scanner:1.2".to_string(),
                    scanner_cli_config: "sboms: []".to_string(),
                    server_address: "https://skyscan.internal".to_string(),
                    scan_result_id: "sr-1".to_string(),
                    key_pair_name: String::new(),
                },
            )
            .await
            .unwrap();

        assert_eq!(workload.id(), "i-scanner");
        assert_eq!(workload.region(), "eu-west-1");
        assert_eq!(workload.availability_zone(), Some("eu-west-1a"));

        let launches = api.launches();
        assert_eq!(launches.len(), 1);
        let (region, plan) = &launches[0];
        assert_eq!(region, "eu-west-1");
        assert_eq!(plan.key_pair_name, None);
        assert_eq!(plan.image_id, "ami-scanner");
        assert_eq!(plan.subnet_id, "subnet-scanner");
        assert_eq!(plan.security_group_id, "sg-scanner");
        assert_eq!(
            plan.instance_tags,
            vec![
                Tag::new("Owner", "skyscan"),
                Tag::new("Name", "skyscan-scanner-i-target"),
            ]
        );
        assert_eq!(plan.volume_tags, vec![Tag::new("Owner", "skyscan")]);
        assert!(!plan.user_data_base64.is_empty());
    }

    #[tokio::test]
    async fn test_provision_with_key_pair() {
        let (provider, api) = provider(FakeEc2::default());

        provider
            .provision(
                "us-east-1",
                "i-target",
                &ScanningJobConfig {
                    scanner_image: "ghcr.io/skyscan/scanner:1.2".to_string(),
                    scanner_cli_config: String::new(),
                    server_address: "https://skyscan.internal".to_string(),
                    scan_result_id: "sr-2".to_string(),
                    key_pair_name: "k1".to_string(),
                },
            )
            .await
            .unwrap();

        let launches = api.launches();
        assert_eq!(launches[0].1.key_pair_name, Some("k1".to_string()));
        // Ownership tag still present on instance and volume.
        assert!(launches[0].1.instance_tags.contains(&Tag::new("Owner", "skyscan")));
        assert_eq!(launches[0].1.volume_tags, vec![Tag::new("Owner", "skyscan")]);
    }

    #[tokio::test]
    async fn test_provision_fails_on_bad_payload_without_launching() {
        let (provider, api) = provider(FakeEc2::default());

        let err = provider
            .provision("us-east-1", "i-target", &ScanningJobConfig::default())
            .await
            .unwrap_err();

        assert!(matches!(err, SkyscanError::Provisioning { .. }));
        assert!(api.launches().is_empty());
    }

    #[tokio::test]
    async fn test_discovery_matches_manual_filtering() {
        // Discovery over a synthetic fixture equals applying the exclusion
        // rule to the same fixture by hand.
        let fixture = vec![
            running("i-1", vec![Tag::new("env", "prod"), Tag::new("team", "sec")]),
            running("i-2", vec![Tag::new("env", "prod")]),
            running("i-3", vec![]),
        ];
        let exclude = vec![Tag::new("env", "prod"), Tag::new("team", "sec")];

        let expected: Vec<String> = fixture
            .iter()
            .filter(|record| !filters::matches_exclude_tags(&exclude, &record.tags))
            .map(|record| record.id.clone())
            .collect();

        let api = FakeEc2::with_pages(HashMap::from([(
            "us-east-1".to_string(),
            vec![page(fixture, None)],
        )]));
        let (provider, _api) = provider(api);

        let raw = r#"{
            "objectType": "AwsScanScope",
            "regions": [{"name": "us-east-1"}],
            "instanceTagExclusion": [
                {"key": "env", "value": "prod"},
                {"key": "team", "value": "sec"}
            ]
        }"#;
        let targets = provider.discover(&scope_doc(raw)).await.unwrap();

        assert_eq!(ids(&targets), expected);
        assert_eq!(ids(&targets), vec!["i-2", "i-3"]);
    }

    #[tokio::test]
    async fn test_handle_reports_status() {
        let (provider, _api) = provider(FakeEc2::with_pages(HashMap::from([(
            "us-east-1".to_string(),
            vec![page(vec![running("i-1", vec![])], None)],
        )])));

        let raw = r#"{"objectType": "AwsScanScope", "regions": [{"name": "us-east-1"}]}"#;
        let targets = provider.discover(&scope_doc(raw)).await.unwrap();

        assert_eq!(targets[0].status().await.unwrap(), InstanceStatus::Running);
        targets[0].terminate().await.unwrap();
    }
}
