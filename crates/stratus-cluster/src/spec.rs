//! Immutable cluster requests.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::provider::Provider;

/// Default cluster name when the caller does not pick one.
pub const DEFAULT_CLUSTER_NAME: &str = "stratus-cluster";

/// Default number of workers.
pub const DEFAULT_WORKER_COUNT: u32 = 4;

/// Provider selection plus the provider-side coordinates of the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSpec {
    /// Cloud provider.
    pub provider: Provider,
    /// Credentials file handed to the provisioning tool.
    #[serde(default)]
    pub credentials_file: Option<PathBuf>,
    /// Region, if not the template default.
    #[serde(default)]
    pub region: Option<String>,
    /// Availability zone, if not the template default.
    #[serde(default)]
    pub zone: Option<String>,
}

impl ProviderSpec {
    /// Create a provider spec with template defaults for everything else.
    #[must_use]
    pub const fn new(provider: Provider) -> Self {
        Self {
            provider,
            credentials_file: None,
            region: None,
            zone: None,
        }
    }

    /// Set the credentials file.
    #[must_use]
    pub fn with_credentials_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.credentials_file = Some(path.into());
        self
    }

    /// Set the region.
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Set the availability zone.
    #[must_use]
    pub fn with_zone(mut self, zone: impl Into<String>) -> Self {
        self.zone = Some(zone.into());
        self
    }
}

/// Everything needed to describe a cluster. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSpec {
    /// Provider and its coordinates.
    pub provider: ProviderSpec,
    /// Project the cluster belongs to.
    #[serde(default)]
    pub project_name: Option<String>,
    /// Cluster name.
    pub cluster_name: String,
    /// Exact number of workers; autoscaling is pinned to this value.
    pub worker_count: u32,
    /// Head node instance type; template default when `None`.
    #[serde(default)]
    pub head_node_type: Option<String>,
    /// Worker node instance type; template default when `None`.
    #[serde(default)]
    pub worker_node_type: Option<String>,
}

impl ClusterSpec {
    /// Create a spec with the default name and worker count.
    #[must_use]
    pub fn new(provider: ProviderSpec) -> Self {
        Self {
            provider,
            project_name: None,
            cluster_name: DEFAULT_CLUSTER_NAME.to_owned(),
            worker_count: DEFAULT_WORKER_COUNT,
            head_node_type: None,
            worker_node_type: None,
        }
    }

    /// Set the project name.
    #[must_use]
    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project_name = Some(project.into());
        self
    }

    /// Set the cluster name.
    #[must_use]
    pub fn with_cluster_name(mut self, name: impl Into<String>) -> Self {
        self.cluster_name = name.into();
        self
    }

    /// Set the worker count.
    #[must_use]
    pub const fn with_worker_count(mut self, count: u32) -> Self {
        self.worker_count = count;
        self
    }

    /// Set the head node instance type.
    #[must_use]
    pub fn with_head_node_type(mut self, node_type: impl Into<String>) -> Self {
        self.head_node_type = Some(node_type.into());
        self
    }

    /// Set the worker node instance type.
    #[must_use]
    pub fn with_worker_node_type(mut self, node_type: impl Into<String>) -> Self {
        self.worker_node_type = Some(node_type.into());
        self
    }
}
