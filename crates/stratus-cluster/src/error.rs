//! Error types for stratus-cluster.

use std::fmt;
use std::path::PathBuf;

/// Result type alias using [`ClusterError`].
pub type ClusterResult<T> = Result<T, ClusterError>;

/// Result type alias using [`ProvisionError`].
pub type ProvisionResult<T> = Result<T, ProvisionError>;

/// Errors surfaced by the cluster facade and lifecycle controller.
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    /// The provider has no profile (instance-type key or credentials variable).
    #[error("unsupported provider: {provider}")]
    UnsupportedProvider {
        /// Provider name as given by the caller.
        provider: String,
    },

    /// The provisioning tool failed to create or reconcile the cluster.
    #[error("cannot spawn cluster")]
    CannotSpawn {
        /// Underlying provisioning failure.
        #[source]
        source: ProvisionError,
    },

    /// The provisioning tool failed to tear the cluster down.
    #[error("cannot destroy cluster")]
    CannotDestroy {
        /// Underlying provisioning failure.
        #[source]
        source: ProvisionError,
    },

    /// The head node address could not be queried.
    #[error("cannot get cluster connection details")]
    CannotConnect {
        /// Underlying provisioning failure.
        #[source]
        source: ProvisionError,
    },

    /// A spawn was requested while a destroy was running, or vice versa.
    #[error("cannot {requested} cluster while {running} is in progress")]
    OperationInProgress {
        /// Operation the caller asked for.
        requested: Operation,
        /// Operation currently in flight.
        running: Operation,
    },

    /// The spawner selector did not name a known implementation.
    #[error("unknown spawner: {0}")]
    UnknownSpawner(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem error while reading or writing cluster configs.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Cluster config could not be (de)serialised.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ClusterError {
    /// Create an unsupported provider error.
    #[must_use]
    pub fn unsupported_provider(provider: impl fmt::Display) -> Self {
        Self::UnsupportedProvider {
            provider: provider.to_string(),
        }
    }

    /// Create a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// The provisioning failure behind a spawn or destroy error, if any.
    #[must_use]
    pub const fn provision_cause(&self) -> Option<&ProvisionError> {
        match self {
            Self::CannotSpawn { source }
            | Self::CannotDestroy { source }
            | Self::CannotConnect { source } => Some(source),
            _ => None,
        }
    }
}

/// Failures reported by a [`ProvisioningGateway`](crate::gateway::ProvisioningGateway).
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    /// The provisioning tool binary could not be located.
    #[error("provisioning tool not found: {0}")]
    ToolNotFound(String),

    /// The tool ran but exited unsuccessfully.
    #[error("`{command}` exited with {status}: {stderr}")]
    CommandFailed {
        /// Command line that was run.
        command: String,
        /// Exit status description.
        status: String,
        /// Captured standard error.
        stderr: String,
    },

    /// The tool produced output that could not be interpreted.
    #[error("unexpected tool output: {0}")]
    InvalidOutput(String),

    /// The operation was interrupted before it finished.
    #[error("interrupted: {0}")]
    Interrupted(String),

    /// The cluster config file could not be read back.
    #[error("cannot reload cluster config {path}: {message}")]
    Reload {
        /// Config file path.
        path: PathBuf,
        /// What went wrong.
        message: String,
    },

    /// I/O error talking to the tool.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProvisionError {
    /// Create an invalid output error.
    #[must_use]
    pub fn invalid_output(msg: impl Into<String>) -> Self {
        Self::InvalidOutput(msg.into())
    }
}

/// Lifecycle operation kinds, used for task naming and error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Create or reconcile the cluster.
    Spawn,
    /// Tear the cluster down.
    Destroy,
}

impl Operation {
    /// Get the operation name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Spawn => "spawn",
            Self::Destroy => "destroy",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_error_keeps_cause() {
        let err = ClusterError::CannotSpawn {
            source: ProvisionError::Interrupted("runtime shut down".to_owned()),
        };

        assert_eq!(err.to_string(), "cannot spawn cluster");
        let cause = std::error::Error::source(&err).unwrap();
        assert_eq!(cause.to_string(), "interrupted: runtime shut down");
        assert!(matches!(
            err.provision_cause(),
            Some(ProvisionError::Interrupted(_))
        ));
    }

    #[test]
    fn operation_in_progress_message() {
        let err = ClusterError::OperationInProgress {
            requested: Operation::Destroy,
            running: Operation::Spawn,
        };
        assert_eq!(
            err.to_string(),
            "cannot destroy cluster while spawn is in progress"
        );
    }
}
