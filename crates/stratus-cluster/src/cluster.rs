//! Public cluster facade and factory.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use tracing::info;

use crate::config::{ClusterConfig, ConfigBuilder, ConfigStore};
use crate::controller::{ClusterState, ConnectionDetails, LifecycleController};
use crate::error::{ClusterError, ClusterResult};
use crate::gateway::{MockGateway, ProvisioningGateway, RayGateway, ToolEnv};
use crate::provider;
use crate::settings::StratusSettings;
use crate::spec::ClusterSpec;

/// Default spawner selector.
pub const DEFAULT_SPAWNER: &str = "rayscale";

/// Spawner implementations a cluster can be created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnerKind {
    /// Drive the `ray` cluster launcher.
    Rayscale,
    /// In-memory gateway; nothing is provisioned.
    Mock,
}

impl SpawnerKind {
    /// Get the selector string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Rayscale => "rayscale",
            Self::Mock => "mock",
        }
    }

    /// Create the gateway for this spawner.
    #[must_use]
    pub fn gateway(&self, settings: &StratusSettings) -> Arc<dyn ProvisioningGateway> {
        match self {
            Self::Rayscale => match &settings.ray.binary {
                Some(binary) => Arc::new(RayGateway::with_binary(binary)),
                None => Arc::new(RayGateway::new()),
            },
            Self::Mock => Arc::new(MockGateway::new()),
        }
    }
}

impl fmt::Display for SpawnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SpawnerKind {
    type Err = ClusterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rayscale" => Ok(Self::Rayscale),
            "mock" => Ok(Self::Mock),
            other => Err(ClusterError::UnknownSpawner(other.to_owned())),
        }
    }
}

/// Create a cluster object for `spec` using the named spawner.
///
/// Nothing is provisioned until [`Cluster::spawn`] is called. The config
/// file is written immediately. An unknown spawner fails before anything
/// is built.
pub fn cluster(
    spec: ClusterSpec,
    spawner: &str,
    settings: &StratusSettings,
) -> ClusterResult<Cluster> {
    let kind: SpawnerKind = spawner.parse()?;
    Cluster::new(spec, kind.gateway(settings), settings)
}

/// A remote compute cluster.
#[derive(Debug)]
pub struct Cluster {
    spec: ClusterSpec,
    controller: LifecycleController,
}

impl Cluster {
    /// Build and persist the config for `spec` and wrap it in a controller.
    pub fn new(
        spec: ClusterSpec,
        gateway: Arc<dyn ProvisioningGateway>,
        settings: &StratusSettings,
    ) -> ClusterResult<Self> {
        let env = tool_env(&spec)?;
        let config = ConfigBuilder::new(settings.base_template()?)
            .with_socks_proxy(settings.socks_proxy.clone())
            .build(&spec)?;
        let config_path = ConfigStore::new(settings.resolved_config_dir()).persist(&config)?;

        info!(
            cluster = %spec.cluster_name,
            provider = %spec.provider.provider,
            config = %config_path.display(),
            "cluster config prepared"
        );

        Ok(Self {
            spec,
            controller: LifecycleController::new(gateway, config, config_path, env),
        })
    }

    /// The spec this cluster was created from.
    #[must_use]
    pub const fn spec(&self) -> &ClusterSpec {
        &self.spec
    }

    /// Spawn the cluster. See [`LifecycleController::spawn`].
    pub async fn spawn(&self, wait: bool) -> ClusterResult<()> {
        self.controller.spawn(wait).await
    }

    /// Destroy the cluster. See [`LifecycleController::destroy`].
    pub async fn destroy(&self, wait: bool) -> ClusterResult<()> {
        self.controller.destroy(wait).await
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ClusterState {
        self.controller.state()
    }

    /// Check whether the cluster is ready for connections.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.controller.is_ready()
    }

    /// Current config document.
    #[must_use]
    pub fn config(&self) -> Option<ClusterConfig> {
        self.controller.config()
    }

    /// Path of the persisted config file.
    #[must_use]
    pub fn config_path(&self) -> &Path {
        self.controller.config_path()
    }

    /// Connection coordinates of the head node.
    ///
    /// # Panics
    ///
    /// Panics if the cluster is not ready.
    pub async fn connection_details(&self) -> ClusterResult<ConnectionDetails> {
        self.controller.connection_details().await
    }

    /// Interpreter remote work is launched with.
    #[must_use]
    pub const fn main_interpreter_path(&self) -> &'static str {
        self.controller.main_interpreter_path()
    }
}

/// Environment for the provisioning tool: the credentials file, if any,
/// under the provider's variable.
fn tool_env(spec: &ClusterSpec) -> ClusterResult<ToolEnv> {
    let mut env = ToolEnv::new();
    if let Some(credentials) = &spec.provider.credentials_file {
        let profile = provider::profile(spec.provider.provider)?;
        env.set(profile.credentials_env(), credentials.as_os_str());
    }
    Ok(env)
}
