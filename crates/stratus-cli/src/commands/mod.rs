//! Subcommand implementations.

pub mod connect;
pub mod destroy;
pub mod spawn;

use std::path::PathBuf;

use clap::Args;
use stratus_cluster::spec::{DEFAULT_CLUSTER_NAME, DEFAULT_WORKER_COUNT};
use stratus_cluster::{
    cluster, Cluster, ClusterResult, ClusterSpec, Provider, ProviderSpec, StratusSettings,
    DEFAULT_SPAWNER,
};

/// Arguments describing the cluster a command acts on.
///
/// Identical arguments resolve to the same config file, so `destroy` and
/// `connect` find the cluster a previous `spawn` created.
#[derive(Args, Debug, Clone)]
pub struct ClusterArgs {
    /// Cloud provider (aws, gcp, azure)
    #[arg(long, default_value = "aws")]
    pub provider: String,

    /// Project the cluster belongs to
    #[arg(long)]
    pub project: Option<String>,

    /// Cluster name
    #[arg(long, default_value = DEFAULT_CLUSTER_NAME)]
    pub cluster_name: String,

    /// Number of worker nodes
    #[arg(short, long, default_value_t = DEFAULT_WORKER_COUNT)]
    pub workers: u32,

    /// Head node instance type
    #[arg(long)]
    pub head_node_type: Option<String>,

    /// Worker node instance type
    #[arg(long)]
    pub worker_node_type: Option<String>,

    /// Provider credentials file
    #[arg(long)]
    pub credentials_file: Option<PathBuf>,

    /// Provider region
    #[arg(long)]
    pub region: Option<String>,

    /// Provider availability zone
    #[arg(long)]
    pub zone: Option<String>,

    /// Spawner implementation (rayscale, mock)
    #[arg(long, default_value = DEFAULT_SPAWNER)]
    pub spawner: String,
}

impl ClusterArgs {
    /// Build the cluster spec from the arguments.
    pub fn spec(&self) -> ClusterResult<ClusterSpec> {
        let mut provider = ProviderSpec::new(self.provider.parse::<Provider>()?);
        provider.credentials_file.clone_from(&self.credentials_file);
        provider.region.clone_from(&self.region);
        provider.zone.clone_from(&self.zone);

        let mut spec = ClusterSpec::new(provider)
            .with_cluster_name(&self.cluster_name)
            .with_worker_count(self.workers);
        spec.project_name.clone_from(&self.project);
        spec.head_node_type.clone_from(&self.head_node_type);
        spec.worker_node_type.clone_from(&self.worker_node_type);

        Ok(spec)
    }

    /// Load settings and create the cluster object.
    pub fn open(&self) -> ClusterResult<Cluster> {
        let settings = StratusSettings::load()?;
        cluster(self.spec()?, &self.spawner, &settings)
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        cluster: ClusterArgs,
    }

    #[test]
    fn defaults_match_library() {
        let args = Harness::parse_from(["stratus"]).cluster;
        let spec = args.spec().unwrap();

        assert_eq!(spec.provider.provider, Provider::Aws);
        assert_eq!(spec.cluster_name, DEFAULT_CLUSTER_NAME);
        assert_eq!(spec.worker_count, DEFAULT_WORKER_COUNT);
        assert_eq!(args.spawner, "rayscale");
    }

    #[test]
    fn arguments_flow_into_spec() {
        let args = Harness::parse_from([
            "stratus",
            "--provider",
            "AWS",
            "--cluster-name",
            "etl",
            "-w",
            "12",
            "--region",
            "us-east-2",
            "--worker-node-type",
            "r5.4xlarge",
            "--credentials-file",
            "/etc/stratus/aws.cfg",
        ])
        .cluster;
        let spec = args.spec().unwrap();

        assert_eq!(spec.cluster_name, "etl");
        assert_eq!(spec.worker_count, 12);
        assert_eq!(spec.provider.region.as_deref(), Some("us-east-2"));
        assert_eq!(spec.worker_node_type.as_deref(), Some("r5.4xlarge"));
        assert_eq!(
            spec.provider.credentials_file,
            Some(PathBuf::from("/etc/stratus/aws.cfg"))
        );
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let args = Harness::parse_from(["stratus", "--provider", "digitalocean"]).cluster;
        assert!(args.spec().is_err());
    }
}
