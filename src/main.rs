//! Skyscan Agent CLI
//!
//! Discovers scan targets and provisions scanner instances against an AWS
//! account using ambient credentials.
//!
//! # Usage
//! ```bash
//! # Discover targets matching a scope document
//! skyscan discover --scope scope.json
//!
//! # Launch a scanner workload against one target
//! skyscan provision --region eu-west-1 --target-id i-0abc \
//!     --scanner-image ghcr.io/skyscan/scanner:1.2 \
//!     --server-address https://skyscan.internal:8888 \
//!     --scan-result-id sr-42
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use skyscan::{
    AwsProvider, AwsProviderConfig, Provider, ScanScopeDocument, ScanningJobConfig, TagPolicy,
};

// ============================================================
// CLI Definition
// ============================================================

#[derive(Parser)]
#[command(name = "skyscan")]
#[command(about = "Skyscan runtime-scan agent", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover scan targets matching a scope document
    Discover {
        /// Path to the scan-scope JSON document
        #[arg(long)]
        scope: PathBuf,

        /// Page-size hint for instance enumeration
        #[arg(long, default_value_t = 50)]
        page_size: i32,
    },

    /// Provision a scanner instance against one target
    Provision {
        /// Region the target instance lives in
        #[arg(long)]
        region: String,

        /// Target instance id
        #[arg(long)]
        target_id: String,

        /// Scanner container image reference
        #[arg(long, env = "SKYSCAN_SCANNER_IMAGE")]
        scanner_image: String,

        /// Path to the scanner CLI configuration shipped to the instance
        #[arg(long)]
        scanner_config: Option<PathBuf>,

        /// Callback server address for scan results
        #[arg(long, env = "SKYSCAN_SERVER_ADDRESS")]
        server_address: String,

        /// Scan-result correlation id
        #[arg(long)]
        scan_result_id: String,

        /// SSH key pair to attach; omitted entirely when not set
        #[arg(long, default_value = "")]
        key_pair: String,

        /// AMI the scanner instance boots from
        #[arg(long, env = "SKYSCAN_AMI_ID")]
        ami_id: String,

        /// Dedicated scanner subnet
        #[arg(long, env = "SKYSCAN_SUBNET_ID")]
        subnet_id: String,

        /// Scanner security group
        #[arg(long, env = "SKYSCAN_SECURITY_GROUP_ID")]
        security_group_id: String,

        /// Scanner instance size class
        #[arg(long, env = "SKYSCAN_INSTANCE_TYPE", default_value = "t2.large")]
        instance_type: String,
    },
}

// ============================================================
// Main
// ============================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    match cli.command {
        Commands::Discover { scope, page_size } => {
            let raw = std::fs::read_to_string(&scope)
                .with_context(|| format!("Failed to read scope file {}", scope.display()))?;
            let document = ScanScopeDocument::from_json(&raw)?;

            let provider = AwsProvider::new(
                AwsProviderConfig {
                    page_size,
                    ..Default::default()
                },
                TagPolicy::default(),
            )
            .await;

            info!("Starting discovery");
            let targets = provider.discover(&document).await?;

            let listing: Vec<_> = targets
                .iter()
                .map(|target| json!({"region": target.region(), "id": target.id()}))
                .collect();
            println!("{}", serde_json::to_string_pretty(&listing)?);
        }

        Commands::Provision {
            region,
            target_id,
            scanner_image,
            scanner_config,
            server_address,
            scan_result_id,
            key_pair,
            ami_id,
            subnet_id,
            security_group_id,
            instance_type,
        } => {
            let scanner_cli_config = match scanner_config {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read scanner config {}", path.display()))?,
                None => String::new(),
            };

            let provider = AwsProvider::new(
                AwsProviderConfig {
                    ami_id,
                    subnet_id,
                    security_group_id,
                    instance_type,
                    ..Default::default()
                },
                TagPolicy::default(),
            )
            .await;

            info!(%region, %target_id, "Provisioning scanner workload");
            let workload = provider
                .provision(
                    &region,
                    &target_id,
                    &ScanningJobConfig {
                        scanner_image,
                        scanner_cli_config,
                        server_address,
                        scan_result_id,
                        key_pair_name: key_pair,
                    },
                )
                .await?;

            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "id": workload.id(),
                    "region": workload.region(),
                    "availability_zone": workload.availability_zone(),
                }))?
            );
        }
    }

    Ok(())
}
