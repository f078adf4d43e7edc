//! Cluster lifecycle controller.
//!
//! The controller owns the state of a single cluster and runs spawn and
//! destroy as [`BackgroundTask`]s against a [`ProvisioningGateway`].
//!
//! ```text
//! NotSpawned ──spawn──▶ Spawning ──ok──▶ Ready ──destroy──▶ Destroying ──ok──▶ NotSpawned
//!                          │                                    │
//!                          └──err──▶ NotSpawned                 └──err──▶ (previous state)
//! ```
//!
//! Each operation has exactly one task for the lifetime of the controller:
//! the first call starts it, later calls only join it. A spawn is rejected
//! while a destroy is running and vice versa.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, instrument};

use crate::config::{ClusterConfig, SSH_USER};
use crate::error::{ClusterError, ClusterResult, Operation, ProvisionError, ProvisionResult};
use crate::gateway::{ProvisioningGateway, ToolEnv};
use crate::task::BackgroundTask;

/// SSH port used when connecting to the head node.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Interpreter of the runtime environment installed on every node.
pub const MAIN_INTERPRETER: &str = "~/miniconda/envs/stratus/bin/python";

/// Where a cluster is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterState {
    /// No nodes exist (never spawned, spawn failed, or destroyed).
    NotSpawned,
    /// Spawn in progress.
    Spawning,
    /// Nodes are up and the config reflects the provisioned cluster.
    Ready,
    /// Destroy in progress.
    Destroying,
}

impl ClusterState {
    /// Get the state name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotSpawned => "not_spawned",
            Self::Spawning => "spawning",
            Self::Ready => "ready",
            Self::Destroying => "destroying",
        }
    }
}

impl fmt::Display for ClusterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How to reach the head node of a ready cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDetails {
    /// SSH user.
    pub user_name: String,
    /// Private key file, when the provisioning tool generated one.
    pub key_file: Option<PathBuf>,
    /// Head node address.
    pub address: String,
    /// SSH port.
    pub port: u16,
}

struct Shared {
    gateway: Arc<dyn ProvisioningGateway>,
    config_path: PathBuf,
    env: ToolEnv,
    state: Mutex<ClusterState>,
    config: RwLock<Option<ClusterConfig>>,
}

/// Serialises spawn and destroy against one cluster.
pub struct LifecycleController {
    shared: Arc<Shared>,
    spawner: Arc<BackgroundTask>,
    destroyer: Arc<BackgroundTask>,
}

impl fmt::Debug for LifecycleController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleController")
            .field("config_path", &self.shared.config_path)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl LifecycleController {
    /// Create a controller for the cluster described by `config`, already
    /// persisted at `config_path`.
    #[must_use]
    pub fn new(
        gateway: Arc<dyn ProvisioningGateway>,
        config: ClusterConfig,
        config_path: impl Into<PathBuf>,
        env: ToolEnv,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                gateway,
                config_path: config_path.into(),
                env,
                state: Mutex::new(ClusterState::NotSpawned),
                config: RwLock::new(Some(config)),
            }),
            spawner: Arc::new(BackgroundTask::new(Operation::Spawn)),
            destroyer: Arc::new(BackgroundTask::new(Operation::Destroy)),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ClusterState {
        *self.shared.state.lock()
    }

    /// Check whether the cluster is ready for connections.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state() == ClusterState::Ready
    }

    /// Current config document. `None` after a successful destroy.
    #[must_use]
    pub fn config(&self) -> Option<ClusterConfig> {
        self.shared.config.read().clone()
    }

    /// Path of the persisted config file.
    #[must_use]
    pub fn config_path(&self) -> &Path {
        &self.shared.config_path
    }

    /// Spawn the cluster.
    ///
    /// With `wait`, blocks until the spawn attempt (new or already running)
    /// finishes and returns its error, which is then cleared. Without
    /// `wait`, returns at once and failures are only logged.
    pub async fn spawn(&self, wait: bool) -> ClusterResult<()> {
        self.run(Operation::Spawn, wait).await
    }

    /// Destroy the cluster. Same waiting semantics as [`spawn`](Self::spawn).
    pub async fn destroy(&self, wait: bool) -> ClusterResult<()> {
        self.run(Operation::Destroy, wait).await
    }

    async fn run(&self, operation: Operation, wait: bool) -> ClusterResult<()> {
        let task = self.launch(operation, wait)?;
        if wait {
            task.join().await
        } else {
            Ok(())
        }
    }

    fn task(&self, operation: Operation) -> &Arc<BackgroundTask> {
        match operation {
            Operation::Spawn => &self.spawner,
            Operation::Destroy => &self.destroyer,
        }
    }

    fn launch(&self, operation: Operation, wait: bool) -> ClusterResult<&Arc<BackgroundTask>> {
        let task = self.task(operation);
        let other = match operation {
            Operation::Spawn => Operation::Destroy,
            Operation::Destroy => Operation::Spawn,
        };

        // Held until the in-progress state is written, so a fast task body
        // cannot record its outcome before it.
        let mut state = self.shared.state.lock();
        if self.task(other).is_running() {
            return Err(ClusterError::OperationInProgress {
                requested: operation,
                running: other,
            });
        }

        if wait {
            task.silence();
        }

        let previous = *state;
        let shared = Arc::clone(&self.shared);
        let rollback_to = Arc::clone(&self.shared);
        let started = match operation {
            Operation::Spawn => task.start(spawn_cluster(shared), move || {
                *rollback_to.state.lock() = ClusterState::NotSpawned;
            }),
            Operation::Destroy => task.start(destroy_cluster(shared), move || {
                *rollback_to.state.lock() = previous;
            }),
        };

        if started {
            *state = match operation {
                Operation::Spawn => ClusterState::Spawning,
                Operation::Destroy => ClusterState::Destroying,
            };
            info!(operation = %operation, wait, from = %previous, "cluster operation started");
        } else {
            debug!(operation = %operation, wait, "cluster operation already launched");
        }

        Ok(task)
    }

    /// Connection coordinates of the head node.
    ///
    /// # Panics
    ///
    /// Panics if the cluster is not [`ClusterState::Ready`]; asking for
    /// connection details before the cluster is up is a caller bug.
    pub async fn connection_details(&self) -> ClusterResult<ConnectionDetails> {
        assert!(
            self.is_ready(),
            "cluster is not ready, cannot get connection details"
        );

        let config = self
            .config()
            .ok_or_else(|| ClusterError::internal("ready cluster has no config"))?;
        let address = self
            .shared
            .gateway
            .head_node_address(&self.shared.config_path, &self.shared.env)
            .await
            .map_err(|source| ClusterError::CannotConnect { source })?;

        Ok(ConnectionDetails {
            user_name: config.ssh_user().unwrap_or(SSH_USER).to_owned(),
            key_file: config.ssh_private_key().map(PathBuf::from),
            address,
            port: DEFAULT_SSH_PORT,
        })
    }

    /// Interpreter of the environment remote work is launched with.
    #[must_use]
    pub const fn main_interpreter_path(&self) -> &'static str {
        MAIN_INTERPRETER
    }
}

#[instrument(skip_all, fields(config = %shared.config_path.display()))]
async fn spawn_cluster(shared: Arc<Shared>) -> ProvisionResult<()> {
    shared
        .gateway
        .create_or_update(&shared.config_path, &shared.env)
        .await?;

    // The tool may have rewritten the file; the in-memory copy follows it.
    let config = ClusterConfig::load(&shared.config_path).map_err(|e| ProvisionError::Reload {
        path: shared.config_path.clone(),
        message: e.to_string(),
    })?;

    *shared.config.write() = Some(config);
    *shared.state.lock() = ClusterState::Ready;
    info!("cluster ready");

    Ok(())
}

#[instrument(skip_all, fields(config = %shared.config_path.display()))]
async fn destroy_cluster(shared: Arc<Shared>) -> ProvisionResult<()> {
    shared
        .gateway
        .teardown(&shared.config_path, &shared.env)
        .await?;

    *shared.config.write() = None;
    *shared.state.lock() = ClusterState::NotSpawned;
    info!("cluster destroyed");

    Ok(())
}
