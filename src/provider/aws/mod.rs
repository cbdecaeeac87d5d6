//! AWS Backend
//!
//! EC2-based implementation of the provider contract.

mod client;
pub mod ec2_api;
mod sdk;

pub use client::{AwsInstanceHandle, AwsProvider};
pub use sdk::SdkEc2;
