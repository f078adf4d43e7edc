//! Stratus cluster lifecycle
//!
//! This crate spawns, destroys and connects to the remote compute cluster
//! a distributed execution backend runs on.
//!
//! # Architecture
//!
//! - **Config building**: a [`ClusterSpec`] is turned into a provider
//!   normalised [`ClusterConfig`] and persisted to a content-addressed file
//! - **Provisioning**: the external cluster tool is reached through the
//!   [`ProvisioningGateway`] trait
//! - **Lifecycle control**: [`LifecycleController`] runs spawn and destroy
//!   as run-once background tasks and exposes connection details once the
//!   cluster is ready
//! - **Facade**: [`Cluster`], created with [`cluster()`], ties the above
//!   together
//!
//! # Example
//!
//! ```ignore
//! use stratus_cluster::{cluster, ClusterSpec, Provider, ProviderSpec, StratusSettings};
//!
//! let settings = StratusSettings::load()?;
//! let spec = ClusterSpec::new(ProviderSpec::new(Provider::Aws)).with_worker_count(4);
//! let cluster = cluster(spec, "rayscale", &settings)?;
//!
//! cluster.spawn(true).await?;
//! let details = cluster.connection_details().await?;
//! println!("ssh {}@{}", details.user_name, details.address);
//! ```

#![forbid(unsafe_code)]

pub mod cluster;
pub mod config;
pub mod controller;
pub mod error;
pub mod gateway;
pub mod provider;
pub mod settings;
pub mod spec;
pub mod task;

// Re-export commonly used types at the crate root
pub use cluster::{cluster, Cluster, SpawnerKind, DEFAULT_SPAWNER};
pub use config::{ClusterConfig, ConfigBuilder, ConfigStore};
pub use controller::{ClusterState, ConnectionDetails, LifecycleController, DEFAULT_SSH_PORT};
pub use error::{ClusterError, ClusterResult, Operation, ProvisionError, ProvisionResult};
pub use gateway::{MockBehaviour, MockGateway, ProvisioningGateway, RayGateway, ToolEnv};
pub use provider::{Provider, ProviderProfile};
pub use settings::StratusSettings;
pub use spec::{ClusterSpec, ProviderSpec};
