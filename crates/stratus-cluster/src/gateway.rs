//! Provisioning gateway: the call surface to the external cluster tool.
//!
//! The lifecycle controller only ever talks to a [`ProvisioningGateway`].
//! [`RayGateway`] drives the `ray` command line; [`MockGateway`] stands in
//! for it in tests and local runs.

use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::ClusterConfig;
use crate::error::{ClusterError, ProvisionError, ProvisionResult};

/// Name of the provisioning tool binary looked up on `PATH`.
pub const RAY_BINARY: &str = "ray";

/// Environment handed to the provisioning tool for a single call.
///
/// Credentials are passed this way instead of through the process
/// environment, so clusters on different providers do not interfere.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolEnv(BTreeMap<String, OsString>);

impl ToolEnv {
    /// Create an empty environment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<OsString>) {
        self.0.insert(key.into(), value.into());
    }

    /// Get a variable.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&OsStr> {
        self.0.get(key).map(OsString::as_os_str)
    }

    /// Iterate over all variables.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &OsStr)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_os_str()))
    }

    /// Check whether no variables are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Operations the external provisioning tool offers.
///
/// Every call is non-interactive. Implementations report failures as
/// [`ProvisionError`]; callers wrap them.
#[async_trait]
pub trait ProvisioningGateway: Send + Sync + fmt::Debug {
    /// Create the cluster described by the config file, or reconcile an
    /// existing one to match it. Running nodes are not restarted.
    ///
    /// The tool may rewrite the config file; callers must reload it.
    async fn create_or_update(&self, config_path: &Path, env: &ToolEnv) -> ProvisionResult<()>;

    /// Destroy every node of the cluster, workers included.
    async fn teardown(&self, config_path: &Path, env: &ToolEnv) -> ProvisionResult<()>;

    /// Externally reachable address of the head node.
    ///
    /// Only meaningful after a successful [`create_or_update`](Self::create_or_update).
    async fn head_node_address(&self, config_path: &Path, env: &ToolEnv)
        -> ProvisionResult<String>;
}

/// Gateway backed by the `ray` command line.
#[derive(Debug, Clone, Default)]
pub struct RayGateway {
    binary: Option<PathBuf>,
}

impl RayGateway {
    /// Create a gateway that finds `ray` on `PATH` at call time.
    #[must_use]
    pub const fn new() -> Self {
        Self { binary: None }
    }

    /// Create a gateway using a specific binary.
    #[must_use]
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: Some(binary.into()),
        }
    }

    fn binary(&self) -> ProvisionResult<PathBuf> {
        if let Some(binary) = &self.binary {
            return Ok(binary.clone());
        }
        which::which(RAY_BINARY)
            .map_err(|e| ProvisionError::ToolNotFound(format!("{RAY_BINARY}: {e}")))
    }

    /// Run the tool and return its standard output.
    async fn run(&self, args: &[&OsStr], env: &ToolEnv) -> ProvisionResult<String> {
        let binary = self.binary()?;
        let command_line = render_command(&binary, args);
        debug!(command = %command_line, "running provisioning tool");

        let output = Command::new(&binary)
            .args(args)
            .envs(env.iter())
            .stdin(Stdio::null())
            .output()
            .await?;

        if !output.status.success() {
            return Err(ProvisionError::CommandFailed {
                command: command_line,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn render_command(binary: &Path, args: &[&OsStr]) -> String {
    let mut line = binary.display().to_string();
    for arg in args {
        line.push(' ');
        line.push_str(&arg.to_string_lossy());
    }
    line
}

#[async_trait]
impl ProvisioningGateway for RayGateway {
    async fn create_or_update(&self, config_path: &Path, env: &ToolEnv) -> ProvisionResult<()> {
        info!(config = %config_path.display(), "creating or updating cluster");
        self.run(
            &[
                OsStr::new("up"),
                config_path.as_os_str(),
                OsStr::new("--yes"),
                OsStr::new("--no-restart"),
            ],
            env,
        )
        .await?;
        Ok(())
    }

    async fn teardown(&self, config_path: &Path, env: &ToolEnv) -> ProvisionResult<()> {
        info!(config = %config_path.display(), "tearing down cluster");
        self.run(
            &[OsStr::new("down"), config_path.as_os_str(), OsStr::new("--yes")],
            env,
        )
        .await?;
        Ok(())
    }

    async fn head_node_address(
        &self,
        config_path: &Path,
        env: &ToolEnv,
    ) -> ProvisionResult<String> {
        let stdout = self
            .run(&[OsStr::new("get-head-ip"), config_path.as_os_str()], env)
            .await?;
        parse_head_address(&stdout)
    }
}

/// The tool may log before printing the address; the address is the last line.
fn parse_head_address(stdout: &str) -> ProvisionResult<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
        .map(str::to_owned)
        .ok_or_else(|| ProvisionError::invalid_output("no head node address printed"))
}

/// How a [`MockGateway`] operation behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MockBehaviour {
    /// Complete successfully.
    #[default]
    Succeed,
    /// Return a command failure.
    Fail,
    /// Panic inside the call, as an interrupted tool would.
    Panic,
}

/// In-memory gateway for tests and dry runs.
///
/// A successful `create_or_update` rewrites the config file with a generated
/// `auth.ssh_private_key`, mimicking the real tool.
#[derive(Debug)]
pub struct MockGateway {
    create: Mutex<MockBehaviour>,
    teardown: Mutex<MockBehaviour>,
    delay: Mutex<Duration>,
    head_address: String,
    create_calls: AtomicUsize,
    teardown_calls: AtomicUsize,
    last_env: Mutex<Option<ToolEnv>>,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGateway {
    /// Create a mock where every call succeeds immediately.
    #[must_use]
    pub fn new() -> Self {
        Self {
            create: Mutex::new(MockBehaviour::Succeed),
            teardown: Mutex::new(MockBehaviour::Succeed),
            delay: Mutex::new(Duration::ZERO),
            head_address: "127.0.0.1".to_owned(),
            create_calls: AtomicUsize::new(0),
            teardown_calls: AtomicUsize::new(0),
            last_env: Mutex::new(None),
        }
    }

    /// Set how `create_or_update` behaves.
    pub fn set_create(&self, behaviour: MockBehaviour) {
        *self.create.lock() = behaviour;
    }

    /// Set how `teardown` behaves.
    pub fn set_teardown(&self, behaviour: MockBehaviour) {
        *self.teardown.lock() = behaviour;
    }

    /// Make create and teardown take this long.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    /// Number of `create_or_update` calls so far.
    #[must_use]
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Number of `teardown` calls so far.
    #[must_use]
    pub fn teardown_calls(&self) -> usize {
        self.teardown_calls.load(Ordering::SeqCst)
    }

    /// Environment passed to the most recent call.
    #[must_use]
    pub fn last_env(&self) -> Option<ToolEnv> {
        self.last_env.lock().clone()
    }

    async fn act(
        &self,
        command: &str,
        behaviour: MockBehaviour,
        env: &ToolEnv,
    ) -> ProvisionResult<()> {
        *self.last_env.lock() = Some(env.clone());

        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match behaviour {
            MockBehaviour::Succeed => Ok(()),
            MockBehaviour::Fail => Err(ProvisionError::CommandFailed {
                command: format!("mock {command}"),
                status: "exit status: 1".to_owned(),
                stderr: format!("mock {command} failure"),
            }),
            MockBehaviour::Panic => panic!("mock {command} interrupted"),
        }
    }
}

#[async_trait]
impl ProvisioningGateway for MockGateway {
    async fn create_or_update(&self, config_path: &Path, env: &ToolEnv) -> ProvisionResult<()> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let behaviour = *self.create.lock();
        self.act("up", behaviour, env).await?;

        let reload_error = |e: ClusterError| ProvisionError::Reload {
            path: config_path.to_owned(),
            message: e.to_string(),
        };
        let mut config = ClusterConfig::load(config_path).map_err(reload_error)?;
        let cluster = config
            .get_str(&["cluster_name"])
            .unwrap_or("cluster")
            .to_owned();
        config.set(
            &["auth", "ssh_private_key"],
            format!("~/.ssh/stratus-{cluster}.pem"),
        );
        let yaml = config.to_yaml().map_err(reload_error)?;
        tokio::fs::write(config_path, yaml).await?;

        Ok(())
    }

    async fn teardown(&self, _config_path: &Path, env: &ToolEnv) -> ProvisionResult<()> {
        self.teardown_calls.fetch_add(1, Ordering::SeqCst);
        let behaviour = *self.teardown.lock();
        self.act("down", behaviour, env).await
    }

    async fn head_node_address(
        &self,
        _config_path: &Path,
        _env: &ToolEnv,
    ) -> ProvisionResult<String> {
        Ok(self.head_address.clone())
    }
}
