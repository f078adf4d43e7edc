//! End-to-end lifecycle scenarios through the cluster facade.

use std::sync::Arc;
use std::time::{Duration, Instant};

use stratus_cluster::{
    Cluster, ClusterError, ClusterSpec, ClusterState, MockBehaviour, MockGateway, Provider,
    ProviderSpec, ProvisioningGateway, StratusSettings,
};
use tempfile::TempDir;

struct TestCluster {
    _dir: TempDir,
    gateway: Arc<MockGateway>,
    cluster: Cluster,
}

impl TestCluster {
    fn new(spec: ClusterSpec) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let settings = StratusSettings {
            config_dir: dir.path().to_path_buf(),
            ..StratusSettings::default()
        };
        let gateway = Arc::new(MockGateway::new());
        let cluster = Cluster::new(
            spec,
            Arc::clone(&gateway) as Arc<dyn ProvisioningGateway>,
            &settings,
        )
        .unwrap();

        Self {
            _dir: dir,
            gateway,
            cluster,
        }
    }

    fn aws() -> Self {
        Self::new(
            ClusterSpec::new(
                ProviderSpec::new(Provider::Aws).with_credentials_file("/secrets/aws.cfg"),
            )
            .with_cluster_name("integration")
            .with_worker_count(3),
        )
    }
}

#[tokio::test]
async fn spawn_connect_destroy() {
    let t = TestCluster::aws();

    t.cluster.spawn(true).await.unwrap();
    assert_eq!(t.cluster.state(), ClusterState::Ready);

    let details = t.cluster.connection_details().await.unwrap();
    assert_eq!(details.user_name, "stratus");
    assert_eq!(details.port, 22);

    t.cluster.destroy(true).await.unwrap();
    assert_eq!(t.cluster.state(), ClusterState::NotSpawned);
    assert_eq!(t.gateway.create_calls(), 1);
    assert_eq!(t.gateway.teardown_calls(), 1);
}

#[tokio::test]
async fn credentials_reach_the_tool_without_touching_process_env() {
    let t = TestCluster::aws();
    t.cluster.spawn(true).await.unwrap();

    let env = t.gateway.last_env().unwrap();
    assert_eq!(
        env.get("AWS_CONFIG_FILE").and_then(|v| v.to_str()),
        Some("/secrets/aws.cfg")
    );
    assert!(std::env::var_os("AWS_CONFIG_FILE").map_or(true, |v| v != "/secrets/aws.cfg"));
}

#[tokio::test]
#[should_panic(expected = "cluster is not ready")]
async fn failed_spawn_leaves_cluster_unready() {
    let t = TestCluster::aws();
    t.gateway.set_create(MockBehaviour::Fail);

    let err = t.cluster.spawn(true).await.unwrap_err();
    assert!(matches!(err, ClusterError::CannotSpawn { .. }));

    let _ = t.cluster.connection_details().await;
}

#[tokio::test]
async fn repeated_spawn_is_a_no_op() {
    let t = TestCluster::aws();

    t.cluster.spawn(true).await.unwrap();
    t.cluster.spawn(true).await.unwrap();
    t.cluster.spawn(false).await.unwrap();

    assert_eq!(t.gateway.create_calls(), 1);
    assert!(t.cluster.is_ready());
}

#[tokio::test]
async fn failed_destroy_keeps_cluster_ready() {
    let t = TestCluster::aws();
    t.cluster.spawn(true).await.unwrap();
    t.gateway.set_teardown(MockBehaviour::Fail);

    let err = t.cluster.destroy(true).await.unwrap_err();
    assert!(matches!(err, ClusterError::CannotDestroy { .. }));
    assert!(t.cluster.is_ready());
    assert!(t.cluster.connection_details().await.is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn background_destroy_failure_is_not_raised() {
    let t = TestCluster::aws();
    t.cluster.spawn(true).await.unwrap();
    t.gateway.set_teardown(MockBehaviour::Fail);
    t.gateway.set_delay(Duration::from_millis(250));

    let started = Instant::now();
    t.cluster.destroy(false).await.unwrap();
    assert!(started.elapsed() < Duration::from_millis(250));

    tokio::time::timeout(Duration::from_secs(5), async {
        while t.cluster.state() == ClusterState::Destroying {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    assert!(t.cluster.is_ready());
    assert_eq!(t.gateway.teardown_calls(), 1);
}

#[tokio::test]
async fn spawn_rejected_while_destroying() {
    let t = TestCluster::aws();
    t.gateway.set_delay(Duration::from_millis(100));

    t.cluster.destroy(false).await.unwrap();
    let err = t.cluster.spawn(true).await.unwrap_err();
    assert!(matches!(err, ClusterError::OperationInProgress { .. }));

    t.cluster.destroy(true).await.unwrap();
    assert_eq!(t.cluster.state(), ClusterState::NotSpawned);
    assert_eq!(t.gateway.create_calls(), 0);
}

#[test]
fn same_spec_maps_to_same_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let settings = StratusSettings {
        config_dir: dir.path().to_path_buf(),
        ..StratusSettings::default()
    };
    let spec = ClusterSpec::new(ProviderSpec::new(Provider::Aws)).with_worker_count(2);

    let a = stratus_cluster::cluster(spec.clone(), "mock", &settings).unwrap();
    let b = stratus_cluster::cluster(spec, "mock", &settings).unwrap();
    assert_eq!(a.config_path(), b.config_path());

    let bigger = ClusterSpec::new(ProviderSpec::new(Provider::Aws)).with_worker_count(5);
    let c = stratus_cluster::cluster(bigger, "mock", &settings).unwrap();
    assert_ne!(a.config_path(), c.config_path());
}

#[tokio::test]
async fn spawned_cluster_is_found_again() {
    let dir = tempfile::tempdir().unwrap();
    let settings = StratusSettings {
        config_dir: dir.path().to_path_buf(),
        ..StratusSettings::default()
    };
    let spec = ClusterSpec::new(ProviderSpec::new(Provider::Aws)).with_cluster_name("again");

    let mut paths = Vec::new();
    for _ in 0..3 {
        let cluster = stratus_cluster::cluster(spec.clone(), "mock", &settings).unwrap();
        cluster.spawn(true).await.unwrap();
        paths.push(cluster.config_path().to_path_buf());
    }

    assert_eq!(paths[0], paths[1]);
    assert_eq!(paths[1], paths[2]);

    let configs = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("yml"))
        .count();
    assert_eq!(configs, 1);
}

#[test]
fn unsupported_provider_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let settings = StratusSettings {
        config_dir: dir.path().join("cloud"),
        ..StratusSettings::default()
    };
    let spec = ClusterSpec::new(ProviderSpec::new(Provider::Gcp));

    let err = stratus_cluster::cluster(spec, "mock", &settings).unwrap_err();
    assert!(matches!(err, ClusterError::UnsupportedProvider { .. }));
    assert!(!dir.path().join("cloud").exists());
}
