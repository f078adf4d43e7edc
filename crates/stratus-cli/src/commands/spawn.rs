//! Implementation of the `stratus spawn` command.

use stratus_cluster::ClusterResult;
use tracing::info;

use super::ClusterArgs;

pub async fn run(args: &ClusterArgs) -> ClusterResult<()> {
    let cluster = args.open()?;
    info!(config = %cluster.config_path().display(), "spawning cluster");

    cluster.spawn(true).await?;

    println!(
        "Cluster '{}' is ready ({} workers)",
        cluster.spec().cluster_name,
        cluster.spec().worker_count
    );
    println!("Config: {}", cluster.config_path().display());
    Ok(())
}
