//! Implementation of the `stratus connect` command.

use stratus_cluster::{ClusterResult, ConnectionDetails, DEFAULT_SSH_PORT};

use super::ClusterArgs;

pub async fn run(args: &ClusterArgs) -> ClusterResult<()> {
    let cluster = args.open()?;

    // Reconciling a running cluster leaves its nodes alone.
    cluster.spawn(true).await?;
    let details = cluster.connection_details().await?;

    println!("{}", ssh_command(&details));
    println!("Python: {}", cluster.main_interpreter_path());
    Ok(())
}

fn ssh_command(details: &ConnectionDetails) -> String {
    let mut command = String::from("ssh");
    if let Some(key) = &details.key_file {
        command.push_str(&format!(" -i {}", key.display()));
    }
    if details.port != DEFAULT_SSH_PORT {
        command.push_str(&format!(" -p {}", details.port));
    }
    command.push_str(&format!(" {}@{}", details.user_name, details.address));
    command
}
