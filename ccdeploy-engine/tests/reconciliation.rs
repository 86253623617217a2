use std::fs;
use std::path::Path;

use ccdeploy_core::config;
use ccdeploy_core::types::{ChannelStatus, DeploymentOutcome};
use ccdeploy_core::DeployConfig;
use ccdeploy_engine::memory::{peer_url, Call, Op};
use ccdeploy_engine::{
    DeployError, DeploymentOrchestrator, DirectoryPackager, InMemoryNetwork, RecordingSleeper,
};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

fn init_logs() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A config whose channel artifact and chaincode sources live under `dir`.
fn workspace(dir: &Path) -> DeployConfig {
    let artifact = dir.join("artifacts/channel/mychannel.tx");
    fs::create_dir_all(artifact.parent().expect("parent")).expect("mkdir artifacts");
    fs::write(&artifact, b"channel-tx").expect("write artifact");

    let mut config = config::scaffold();
    config.channel.artifact = artifact;
    config.chaincode.build_root = dir.join("gopath");
    let sources = config.chaincode.source_dir();
    fs::create_dir_all(&sources).expect("mkdir sources");
    fs::write(sources.join("chaincode.go"), "package main\n").expect("write source");
    config
}

fn orchestrator(
    network: &InMemoryNetwork,
    config: DeployConfig,
) -> DeploymentOrchestrator<ccdeploy_engine::memory::InMemorySession> {
    DeploymentOrchestrator::initialize(config, network, Box::new(RecordingSleeper::new()))
        .expect("initialize")
}

#[test]
fn fresh_network_runs_full_pipeline() {
    init_logs();
    let dir = TempDir::new().expect("tempdir");
    let config = workspace(dir.path());
    let spec = config.chaincode.clone();
    let network = InMemoryNetwork::new().with_org("org1", "Org1MSP", 2);

    let mut orch = orchestrator(&network, config);
    let report = orch.deploy(&spec, &DirectoryPackager).expect("deploy");

    assert!(matches!(report.channel, ChannelStatus::Created { .. }));
    match &report.outcome {
        DeploymentOutcome::Instantiated { tx_id } => assert!(!tx_id.is_empty()),
        other => panic!("expected Instantiated, got {other:?}"),
    }

    let writes: Vec<Op> = network.writes().iter().map(Call::op).collect();
    assert_eq!(
        writes,
        vec![Op::CreateChannel, Op::JoinChannel, Op::Install, Op::Instantiate]
    );
    for i in 0..2 {
        assert!(network.is_installed_on(&peer_url("org1", i), "example_cc", "0.1"));
    }
}

#[test]
fn second_run_is_a_pure_no_op() {
    init_logs();
    let dir = TempDir::new().expect("tempdir");
    let config = workspace(dir.path());
    let spec = config.chaincode.clone();
    let network = InMemoryNetwork::new().with_org("org1", "Org1MSP", 2);

    orchestrator(&network, config.clone())
        .deploy(&spec, &DirectoryPackager)
        .expect("first run");
    network.clear_calls();

    let mut second = orchestrator(&network, config);
    let report = second.deploy(&spec, &DirectoryPackager).expect("second run");

    assert_eq!(report.channel, ChannelStatus::AlreadyJoined);
    assert_eq!(report.outcome, DeploymentOutcome::AlreadyInstantiated);
    assert!(network.writes().is_empty(), "writes: {:?}", network.writes());
    assert_eq!(network.count(Op::Install), 0);
    assert_eq!(network.count(Op::Instantiate), 0);
}

#[test]
fn rerun_after_failed_instantiate_completes() {
    init_logs();
    let dir = TempDir::new().expect("tempdir");
    let config = workspace(dir.path());
    let spec = config.chaincode.clone();
    let network = InMemoryNetwork::new()
        .with_org("org1", "Org1MSP", 2)
        .fail_transiently(Op::Instantiate, 1);

    let err = orchestrator(&network, config.clone())
        .deploy(&spec, &DirectoryPackager)
        .unwrap_err();
    assert!(
        matches!(err, DeployError::NetworkTransient { attempts: 1, .. }),
        "got: {err}"
    );
    assert!(network.instantiated("mychannel").is_empty());

    network.clear_calls();
    let report = orchestrator(&network, config)
        .deploy(&spec, &DirectoryPackager)
        .expect("rerun");
    assert!(
        matches!(report.outcome, DeploymentOutcome::Instantiated { .. }),
        "got: {:?}",
        report.outcome
    );
    // Nothing runs under the name yet, so there is nothing to upgrade.
    assert_eq!(network.count(Op::Upgrade), 0);
    assert_eq!(network.count(Op::Install), 0);
    assert_eq!(network.count(Op::CreateChannel), 0);
    assert_eq!(
        network.instantiated("mychannel"),
        vec![ccdeploy_core::ChaincodeInfo::new("example_cc", "0.1")]
    );
}

#[test]
fn version_bump_installs_then_upgrades_on_next_run() {
    init_logs();
    let dir = TempDir::new().expect("tempdir");
    let config = workspace(dir.path());
    let network = InMemoryNetwork::new().with_org("org1", "Org1MSP", 2);

    orchestrator(&network, config.clone())
        .deploy(&config.chaincode, &DirectoryPackager)
        .expect("deploy 0.1");

    let mut next = config.chaincode.clone();
    next.version = "0.2".into();

    // 0.2 is not installed anywhere: install it, then instantiate is refused
    // because 0.1 is still running under the same name.
    let err = orchestrator(&network, config.clone())
        .deploy(&next, &DirectoryPackager)
        .unwrap_err();
    assert!(
        matches!(err, DeployError::Rejected { step: "instantiate chaincode", .. }),
        "got: {err}"
    );
    assert!(network.is_installed_on(&peer_url("org1", 1), "example_cc", "0.2"));

    // Now installed everywhere and not instantiated: upgrade.
    network.clear_calls();
    let report = orchestrator(&network, config)
        .deploy(&next, &DirectoryPackager)
        .expect("upgrade 0.2");
    assert!(matches!(report.outcome, DeploymentOutcome::Upgraded { .. }));
    assert_eq!(network.count(Op::Install), 0);
    assert_eq!(
        network.instantiated("mychannel"),
        vec![ccdeploy_core::ChaincodeInfo::new("example_cc", "0.2")]
    );
}

#[test]
fn missing_sources_fail_before_install() {
    init_logs();
    let dir = TempDir::new().expect("tempdir");
    let mut config = workspace(dir.path());
    config.chaincode.path = "github.com/example/missing".into();
    let spec = config.chaincode.clone();
    let network = InMemoryNetwork::new().with_org("org1", "Org1MSP", 2);

    let err = orchestrator(&network, config)
        .deploy(&spec, &DirectoryPackager)
        .unwrap_err();
    assert!(matches!(err, DeployError::Package(_)), "got: {err}");
    assert_eq!(network.count(Op::Install), 0);
}

#[test]
fn quorum_shortfall_aborts_initialize() {
    init_logs();
    let dir = TempDir::new().expect("tempdir");
    let config = workspace(dir.path());
    let network = InMemoryNetwork::new().with_org("org1", "Org1MSP", 1);

    let err = DeploymentOrchestrator::initialize(config, &network, Box::new(RecordingSleeper::new()))
        .err()
        .expect("must fail");
    assert!(matches!(err, DeployError::QuorumNotReached { .. }), "got: {err}");
    assert!(network.writes().is_empty());
}
