//! Top-level sequencer: session → channel → chaincode.

use chrono::Utc;

use ccdeploy_core::types::{ChaincodeInfo, ChaincodeSpec, ChannelStatus, DeploymentReport};
use ccdeploy_core::DeployConfig;

use crate::channel::ChannelProvisioner;
use crate::deployer::ChaincodeDeployer;
use crate::error::DeployError;
use crate::network::{LedgerConnector, LedgerSession};
use crate::packager::Packager;
use crate::retry::Sleeper;
use crate::session::NetworkSession;

/// Owns the one network session for its whole lifetime.
///
/// [`initialize`](Self::initialize) is the only way to obtain an
/// orchestrator, so an instance is always initialized exactly once.
pub struct DeploymentOrchestrator<S> {
    config: DeployConfig,
    session: NetworkSession<S>,
    channel_status: ChannelStatus,
}

impl<S: LedgerSession> DeploymentOrchestrator<S> {
    /// Build the network session and provision the configured channel.
    pub fn initialize<C>(
        config: DeployConfig,
        connector: &C,
        sleeper: Box<dyn Sleeper>,
    ) -> Result<Self, DeployError>
    where
        C: LedgerConnector<Session = S>,
    {
        let session = NetworkSession::open(connector, &config, sleeper)?;
        let channel_status = ChannelProvisioner::new(&session, config.min_peers)
            .ensure_channel(&config.channel, &config.org)?;
        tracing::info!(channel = %config.channel.id, "orchestrator initialized");
        Ok(Self {
            config,
            session,
            channel_status,
        })
    }

    /// Reconcile `spec` on the configured channel, then open the
    /// channel-scoped client handles on the session.
    pub fn deploy(
        &mut self,
        spec: &ChaincodeSpec,
        packager: &dyn Packager,
    ) -> Result<DeploymentReport, DeployError> {
        let started_at = Utc::now();
        let channel_id = self.config.channel.id.as_str();

        let outcome = ChaincodeDeployer::new(
            &self.session,
            channel_id,
            self.config.min_peers,
            self.config.upgrade_mode,
        )
        .deploy(spec, packager)?;
        tracing::info!(chaincode = %spec.label(), %outcome, "deployment finished");

        self.session.open_channel_clients(channel_id)?;

        Ok(DeploymentReport {
            channel_id: channel_id.to_string(),
            channel: self.channel_status.clone(),
            chaincode: ChaincodeInfo::new(&spec.name, &spec.version),
            outcome,
            started_at,
            finished_at: Utc::now(),
        })
    }

    pub fn config(&self) -> &DeployConfig {
        &self.config
    }

    pub fn session(&self) -> &NetworkSession<S> {
        &self.session
    }

    /// What channel provisioning did during initialization.
    pub fn channel_status(&self) -> &ChannelStatus {
        &self.channel_status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PackageError;
    use crate::memory::{InMemoryNetwork, InMemorySession, Op};
    use crate::packager::ChaincodeBundle;
    use crate::retry::RecordingSleeper;
    use ccdeploy_core::config;
    use ccdeploy_core::types::DeploymentOutcome;
    use tempfile::TempDir;

    struct StubPackager;

    impl Packager for StubPackager {
        fn package(&self, spec: &ChaincodeSpec) -> Result<ChaincodeBundle, PackageError> {
            Ok(ChaincodeBundle {
                source_path: spec.path.clone(),
                files: vec![],
                digest: "stub".into(),
            })
        }
    }

    fn config_with_artifact(dir: &TempDir) -> DeployConfig {
        let artifact = dir.path().join("mychannel.tx");
        std::fs::write(&artifact, b"channel-tx").expect("write artifact");
        let mut config = config::scaffold();
        config.channel.artifact = artifact;
        config
    }

    fn initialize(
        network: &InMemoryNetwork,
        config: DeployConfig,
    ) -> Result<DeploymentOrchestrator<InMemorySession>, DeployError> {
        DeploymentOrchestrator::initialize(config, network, Box::new(RecordingSleeper::new()))
    }

    #[test]
    fn initialize_provisions_channel() {
        let dir = TempDir::new().expect("tempdir");
        let network = InMemoryNetwork::new().with_org("org1", "Org1MSP", 2);
        let orchestrator = initialize(&network, config_with_artifact(&dir)).expect("initialize");

        assert!(matches!(
            orchestrator.channel_status(),
            ChannelStatus::Created { .. }
        ));
        assert_eq!(network.count(Op::CreateChannel), 1);
        assert_eq!(network.count(Op::JoinChannel), 1);
    }

    #[test]
    fn invalid_config_fails_before_connecting() {
        let mut config = config::scaffold();
        config.channel.id = String::new();
        let network = InMemoryNetwork::new().with_org("org1", "Org1MSP", 2);

        let err = initialize(&network, config).err().expect("must fail");
        assert!(matches!(err, DeployError::Config(_)), "got: {err}");
        assert!(network.calls().is_empty());
    }

    #[test]
    fn deploy_opens_channel_clients_after_instantiate() {
        let dir = TempDir::new().expect("tempdir");
        let config = config_with_artifact(&dir);
        let spec = config.chaincode.clone();
        let network = InMemoryNetwork::new().with_org("org1", "Org1MSP", 2);
        let mut orchestrator = initialize(&network, config).expect("initialize");

        let report = orchestrator.deploy(&spec, &StubPackager).expect("deploy");

        assert!(matches!(report.outcome, DeploymentOutcome::Instantiated { .. }));
        assert_eq!(report.channel_id, "mychannel");
        assert!(report.finished_at >= report.started_at);
        assert!(orchestrator.session().channel_client().is_some());
        assert!(orchestrator.session().event_client().is_some());
        assert!(orchestrator.session().ledger_client().is_some());

        let ops: Vec<Op> = network.calls().iter().map(|c| c.op()).collect();
        let instantiate = ops.iter().position(|op| *op == Op::Instantiate);
        let client = ops.iter().position(|op| *op == Op::OpenChannelClient);
        assert!(instantiate < client, "ops: {ops:?}");
    }

    #[test]
    fn failed_deploy_leaves_clients_closed() {
        let dir = TempDir::new().expect("tempdir");
        let config = config_with_artifact(&dir);
        let spec = config.chaincode.clone();
        let network = InMemoryNetwork::new()
            .with_org("org1", "Org1MSP", 2)
            .with_empty_tx_ids(Op::Instantiate);
        let mut orchestrator = initialize(&network, config).expect("initialize");

        let err = orchestrator.deploy(&spec, &StubPackager).unwrap_err();
        assert!(matches!(err, DeployError::DeploymentConflict { .. }), "got: {err}");
        assert!(orchestrator.session().channel_client().is_none());
    }
}
