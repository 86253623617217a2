//! Install / upgrade / instantiate state machine.
//!
//! ```text
//! Unknown ──installed on every peer?──┬─ no ──▶ NotInstalled ──install──▶ InstalledNotInstantiated
//!                                     └─ yes ─▶ InstalledNotInstantiated ──upgrade?──┘
//! InstalledNotInstantiated ──instantiated on channel?──┬─ no ──instantiate──▶ Instantiated
//!                                                      └─ yes ─────────────▶ Instantiated
//! ```
//!
//! An upgrade replaces a running instance, so the ledger refuses it when
//! nothing runs under the chaincode name. In `UnlessInstantiated` mode the
//! upgrade is only sent when an older version is running; with nothing
//! running the chaincode is instantiated instead.
//!
//! Nothing is cached between runs; each run re-queries the network before
//! acting, which is what makes re-running after a partial failure safe.
//! Nothing is rolled back either: a run that fails after install leaves the
//! chaincode installed but not instantiated.

use ccdeploy_core::retry::RetryPolicy;
use ccdeploy_core::types::{
    ChaincodeSpec, ChaincodeState, DeploymentOutcome, EndorsementPolicy, TxId, UpgradeMode,
};

use crate::error::DeployError;
use crate::inspector::{ChaincodeInspector, InstallReport};
use crate::network::LedgerSession;
use crate::packager::Packager;
use crate::session::NetworkSession;

/// What the install/upgrade step did.
enum FirstStep {
    Installed,
    Upgraded(TxId),
    /// Installed everywhere, nothing running under the name yet.
    NotRunning,
}

pub struct ChaincodeDeployer<'a, S> {
    session: &'a NetworkSession<S>,
    channel_id: &'a str,
    min_peers: usize,
    upgrade_mode: UpgradeMode,
}

impl<'a, S: LedgerSession> ChaincodeDeployer<'a, S> {
    pub fn new(
        session: &'a NetworkSession<S>,
        channel_id: &'a str,
        min_peers: usize,
        upgrade_mode: UpgradeMode,
    ) -> Self {
        Self {
            session,
            channel_id,
            min_peers,
            upgrade_mode,
        }
    }

    pub fn deploy(
        &self,
        spec: &ChaincodeSpec,
        packager: &dyn Packager,
    ) -> Result<DeploymentOutcome, DeployError> {
        let org = self.session.org();
        let inspector = ChaincodeInspector::new(self.session, self.min_peers);
        let mut state = ChaincodeState::Unknown;

        let report = inspector.installation(&org.name, spec)?;
        if report.installed_everywhere() {
            advance(&mut state, ChaincodeState::InstalledNotInstantiated, spec);
        } else {
            advance(&mut state, ChaincodeState::NotInstalled, spec);
        }

        let first = if state == ChaincodeState::NotInstalled {
            self.install(spec, packager, &report)?;
            advance(&mut state, ChaincodeState::InstalledNotInstantiated, spec);
            FirstStep::Installed
        } else {
            match self.upgrade_mode {
                UpgradeMode::Always => {
                    // Fires on "installed", not on "version changed". See UpgradeMode.
                    tracing::warn!(
                        chaincode = %spec.label(),
                        mode = %self.upgrade_mode,
                        "chaincode already installed on every peer; upgrading with the same name and version"
                    );
                    FirstStep::Upgraded(self.upgrade(spec)?)
                }
                UpgradeMode::UnlessInstantiated => {
                    match inspector.running_instance(self.channel_id, spec)? {
                        Some(running) if spec.matches(&running) => {
                            advance(&mut state, ChaincodeState::Instantiated, spec);
                            return Ok(DeploymentOutcome::AlreadyInstantiated);
                        }
                        Some(running) => {
                            tracing::info!(
                                chaincode = %spec.label(),
                                running = %running.version,
                                "upgrading running chaincode"
                            );
                            FirstStep::Upgraded(self.upgrade(spec)?)
                        }
                        None => {
                            tracing::info!(
                                chaincode = %spec.label(),
                                channel = self.channel_id,
                                "nothing running under this name; skipping upgrade"
                            );
                            FirstStep::NotRunning
                        }
                    }
                }
            }
        };

        if inspector.is_instantiated(self.channel_id, spec)? {
            advance(&mut state, ChaincodeState::Instantiated, spec);
            return Ok(match first {
                FirstStep::Installed => DeploymentOutcome::Installed,
                FirstStep::Upgraded(tx_id) => DeploymentOutcome::Upgraded { tx_id },
                FirstStep::NotRunning => DeploymentOutcome::AlreadyInstantiated,
            });
        }

        let tx_id = self.instantiate(spec)?;
        advance(&mut state, ChaincodeState::Instantiated, spec);
        Ok(DeploymentOutcome::Instantiated { tx_id })
    }

    fn install(
        &self,
        spec: &ChaincodeSpec,
        packager: &dyn Packager,
        report: &InstallReport,
    ) -> Result<(), DeployError> {
        let bundle = packager.package(spec)?;
        let targets = report.peer_handles();
        let network = self.session.retry_settings().network;
        self.session.call("install chaincode", &network, |ledger, ctx| {
            ledger.install_chaincode(ctx, spec, &bundle, &targets)
        })?;
        tracing::info!(chaincode = %spec.label(), peers = targets.len(), "chaincode installed");
        Ok(())
    }

    fn upgrade(&self, spec: &ChaincodeSpec) -> Result<TxId, DeployError> {
        let policy = EndorsementPolicy::SignedByMspMember(self.session.org().msp_id.clone());
        let network = self.session.retry_settings().network;
        let tx_id = self.session.call("upgrade chaincode", &network, |ledger, ctx| {
            ledger.upgrade_chaincode(ctx, self.channel_id, spec, &policy)
        })?;
        if tx_id.is_empty() {
            return Err(DeployError::DeploymentConflict {
                step: "upgrade chaincode",
                subject: spec.label(),
            });
        }
        tracing::info!(chaincode = %spec.label(), tx = %tx_id, "chaincode upgraded");
        Ok(tx_id)
    }

    fn instantiate(&self, spec: &ChaincodeSpec) -> Result<TxId, DeployError> {
        let policy =
            EndorsementPolicy::SignedByAnyMember(spec.endorsers(&self.session.org().msp_id));
        let args: Vec<Vec<u8>> = spec.init_args.iter().map(|a| a.as_bytes().to_vec()).collect();
        let tx_id = self
            .session
            .call("instantiate chaincode", &RetryPolicy::once(), |ledger, ctx| {
                ledger.instantiate_chaincode(ctx, self.channel_id, spec, &args, &policy)
            })?;
        if tx_id.is_empty() {
            return Err(DeployError::DeploymentConflict {
                step: "instantiate chaincode",
                subject: spec.label(),
            });
        }
        tracing::info!(chaincode = %spec.label(), channel = self.channel_id, %policy, tx = %tx_id, "chaincode instantiated");
        Ok(tx_id)
    }
}

fn advance(state: &mut ChaincodeState, next: ChaincodeState, spec: &ChaincodeSpec) {
    tracing::info!(chaincode = %spec.label(), from = %state, to = %next, "chaincode state");
    *state = next;
}
