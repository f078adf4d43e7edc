//! Implementation of the `stratus destroy` command.

use stratus_cluster::ClusterResult;
use tracing::info;

use super::ClusterArgs;

pub async fn run(args: &ClusterArgs) -> ClusterResult<()> {
    let cluster = args.open()?;
    info!(config = %cluster.config_path().display(), "destroying cluster");

    cluster.destroy(true).await?;

    println!("Cluster '{}' destroyed", cluster.spec().cluster_name);
    Ok(())
}
