//! Cluster config documents: building them from a spec and persisting them.
//!
//! A [`ClusterConfig`] is the provider-normalised document handed to the
//! provisioning tool. [`ConfigBuilder`] derives one from a [`ClusterSpec`]
//! and a base template; [`ConfigStore`] writes it to a content-addressed
//! file under the cluster-config directory.

use std::fs;
use std::io;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{ClusterError, ClusterResult};
use crate::provider;
use crate::spec::ClusterSpec;

/// Base template shipped with the crate.
pub const BASE_TEMPLATE: &str = include_str!("../templates/autoscaler.yml");

/// SSH user every cluster node is reached as.
pub const SSH_USER: &str = "stratus";

/// Shortest hash prefix used in a config file name.
const MIN_HASH_PREFIX: usize = 4;

/// Mode for the cluster-config directory.
const CONFIG_DIR_MODE: u32 = 0o700;

/// A provider-normalised cluster config document.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterConfig(Mapping);

impl ClusterConfig {
    /// Parse a config from YAML. The document root must be a mapping.
    pub fn from_yaml(yaml: &str) -> ClusterResult<Self> {
        match serde_yaml::from_str(yaml)? {
            Value::Mapping(mapping) => Ok(Self(mapping)),
            Value::Null => Ok(Self(Mapping::new())),
            _ => Err(ClusterError::config("cluster config root must be a mapping")),
        }
    }

    /// The template embedded in the crate.
    pub fn base_template() -> ClusterResult<Self> {
        Self::from_yaml(BASE_TEMPLATE)
    }

    /// Load a config file from disk.
    pub fn load(path: &Path) -> ClusterResult<Self> {
        let yaml = fs::read_to_string(path)?;
        Self::from_yaml(&yaml)
    }

    /// Serialise to YAML. Equal documents always serialise identically.
    pub fn to_yaml(&self) -> ClusterResult<String> {
        Ok(serde_yaml::to_string(&self.0)?)
    }

    /// Look up a nested value by key path.
    #[must_use]
    pub fn get(&self, path: &[&str]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        rest.iter().try_fold(self.0.get(*first)?, |node, key| node.get(*key))
    }

    /// Look up a nested string value.
    #[must_use]
    pub fn get_str(&self, path: &[&str]) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }

    /// Look up a nested unsigned integer value.
    #[must_use]
    pub fn get_u64(&self, path: &[&str]) -> Option<u64> {
        self.get(path).and_then(Value::as_u64)
    }

    /// Set a nested value, creating (or replacing non-mapping) parents on the way.
    pub fn set(&mut self, path: &[&str], value: impl Into<Value>) {
        let Some((last, parents)) = path.split_last() else {
            return;
        };

        let mut node = &mut self.0;
        for key in parents {
            let entry = node
                .entry(Value::from(*key))
                .or_insert_with(|| Value::Mapping(Mapping::new()));
            if !entry.is_mapping() {
                *entry = Value::Mapping(Mapping::new());
            }
            let Value::Mapping(next) = entry else {
                unreachable!("entry was just made a mapping");
            };
            node = next;
        }
        node.insert(Value::from(*last), value.into());
    }

    /// `auth.ssh_user`.
    #[must_use]
    pub fn ssh_user(&self) -> Option<&str> {
        self.get_str(&["auth", "ssh_user"])
    }

    /// `auth.ssh_private_key`, filled in by the provisioning tool.
    #[must_use]
    pub fn ssh_private_key(&self) -> Option<&str> {
        self.get_str(&["auth", "ssh_private_key"])
    }
}

/// Turns a [`ClusterSpec`] into a [`ClusterConfig`].
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    template: ClusterConfig,
    socks_proxy: Option<String>,
}

impl ConfigBuilder {
    /// Create a builder over the given base template.
    #[must_use]
    pub const fn new(template: ClusterConfig) -> Self {
        Self {
            template,
            socks_proxy: None,
        }
    }

    /// Route SSH through a SOCKS proxy at this address.
    #[must_use]
    pub fn with_socks_proxy(mut self, proxy: Option<String>) -> Self {
        self.socks_proxy = proxy.filter(|p| !p.is_empty());
        self
    }

    /// Build the config for `spec`.
    ///
    /// Worker bounds are all pinned to `spec.worker_count`, so the cluster
    /// never autoscales.
    pub fn build(&self, spec: &ClusterSpec) -> ClusterResult<ClusterConfig> {
        let profile = provider::profile(spec.provider.provider)?;
        let mut config = self.template.clone();

        config.set(&["cluster_name"], spec.cluster_name.as_str());
        config.set(&["min_workers"], spec.worker_count);
        config.set(&["max_workers"], spec.worker_count);
        config.set(&["initial_workers"], spec.worker_count);

        config.set(&["provider", "type"], spec.provider.provider.as_str());
        for (key, value) in profile.region_zone_fields(
            spec.provider.region.as_deref(),
            spec.provider.zone.as_deref(),
        ) {
            config.set(&["provider", key], value);
        }

        config.set(&["auth", "ssh_user"], SSH_USER);
        if let Some(proxy) = &self.socks_proxy {
            config.set(&["auth", "ssh_proxy_command"], proxy_command(proxy));
        }

        let instance_key = profile.instance_type_key();
        if let Some(head) = &spec.head_node_type {
            config.set(&["head_node", instance_key], head.as_str());
        }
        if let Some(worker) = &spec.worker_node_type {
            config.set(&["worker_nodes", instance_key], worker.as_str());
        }

        debug!(
            cluster = %spec.cluster_name,
            provider = %spec.provider.provider,
            workers = spec.worker_count,
            "built cluster config"
        );

        Ok(config)
    }
}

/// SSH proxy command tunnelling through a SOCKS proxy.
fn proxy_command(proxy: &str) -> String {
    format!("nc -x {} %h %p", shell_quote(proxy))
}

/// Quote a string for a POSIX shell.
///
/// Only ASCII letters, digits and `@%+=:,./-_` pass unquoted; anything else,
/// non-ASCII letters included, is single-quoted.
fn shell_quote(s: &str) -> String {
    if s.is_empty() {
        return "''".to_owned();
    }

    let safe = s
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "@%+=:,./-_".contains(c));
    if safe {
        return s.to_owned();
    }

    format!("'{}'", s.replace('\'', r#"'"'"'"#))
}

/// Content-addressed storage for cluster configs.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    dir: PathBuf,
}

impl ConfigStore {
    /// Create a store rooted at `dir`. Nothing is created until the first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory configs are written to.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `config` and return its path.
    ///
    /// The file is named after the shortest free prefix (at least four hex
    /// characters) of the SHA-256 of the serialised document. Next to it a
    /// `.sha256` file records the full hash. A prefix whose record matches is
    /// reused as is, so a file the provisioning tool has since rewritten is
    /// found again. The full hash is used when every shorter prefix is taken.
    pub fn persist(&self, config: &ClusterConfig) -> ClusterResult<PathBuf> {
        fs::DirBuilder::new()
            .recursive(true)
            .mode(CONFIG_DIR_MODE)
            .create(&self.dir)?;

        let yaml = config.to_yaml()?;
        let hash = hex::encode(Sha256::digest(yaml.as_bytes()));

        for stop in MIN_HASH_PREFIX..hash.len() {
            let prefix = &hash[..stop];
            let candidate = self.entry_path(prefix);
            match fs::metadata(&candidate) {
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    return self.write_entry(prefix, &yaml, &hash);
                }
                Err(e) => return Err(e.into()),
                Ok(_) if self.recorded_hash(prefix)?.as_deref() == Some(hash.as_str()) => {
                    debug!(path = %candidate.display(), "reusing cluster config");
                    return Ok(candidate);
                }
                Ok(_) => {}
            }
        }

        self.write_entry(&hash, &yaml, &hash)
    }

    fn write_entry(&self, name: &str, yaml: &str, hash: &str) -> ClusterResult<PathBuf> {
        let path = self.entry_path(name);
        fs::write(&path, yaml)?;
        fs::write(self.hash_path(name), hash)?;
        debug!(path = %path.display(), "persisted cluster config");
        Ok(path)
    }

    fn recorded_hash(&self, name: &str) -> ClusterResult<Option<String>> {
        match fs::read_to_string(self.hash_path(name)) {
            Ok(recorded) => Ok(Some(recorded.trim().to_owned())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn entry_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("config-{name}.yml"))
    }

    fn hash_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("config-{name}.sha256"))
    }
}
