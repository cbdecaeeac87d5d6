//! Error Types
//!
//! Typed failures surfaced to the orchestrator. Nothing in this layer is
//! fatal to the process and nothing is retried internally; the caller
//! decides whether to abort the scan cycle or retry later.

use thiserror::Error;

/// Failures produced by scope resolution, discovery, and provisioning.
#[derive(Debug, Error)]
pub enum SkyscanError {
    /// The external scope document could not be interpreted as a scope for
    /// the requested provider. Not retryable.
    #[error("invalid scan scope: {0}")]
    Scope(String),

    /// A provider API call failed while listing regions or instances.
    /// Discovery is all-or-nothing: partial results are discarded.
    #[error("discovery failed: {context}: {cause}")]
    Discovery {
        context: String,
        cause: anyhow::Error,
    },

    /// Scope resolution produced zero regions before any query was issued.
    /// A configuration problem, not a transient fault.
    #[error("no regions to scan")]
    NoRegionsToScan,

    /// Bootstrap payload generation or the launch call failed.
    #[error("provisioning failed: {context}: {cause}")]
    Provisioning {
        context: String,
        cause: anyhow::Error,
    },
}

impl SkyscanError {
    pub fn discovery(context: impl Into<String>, cause: impl Into<anyhow::Error>) -> Self {
        Self::Discovery {
            context: context.into(),
            cause: cause.into(),
        }
    }

    pub fn provisioning(context: impl Into<String>, cause: impl Into<anyhow::Error>) -> Self {
        Self::Provisioning {
            context: context.into(),
            cause: cause.into(),
        }
    }
}
