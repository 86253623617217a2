//! Chaincode install / instantiate checks against live network state.

use ccdeploy_core::types::{ChaincodeInfo, ChaincodeSpec, PeerHandle};
use serde::Serialize;

use crate::discovery::PeerDiscovery;
use crate::error::DeployError;
use crate::network::LedgerSession;
use crate::session::NetworkSession;

/// What one peer said about a chaincode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "reason")]
pub enum PeerInstall {
    Installed,
    Missing,
    /// The query failed; counts as not installed.
    QueryFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerInstallation {
    pub peer: PeerHandle,
    pub status: PeerInstall,
}

/// Per-peer installation view over every discovered peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    pub peers: Vec<PeerInstallation>,
}

impl InstallReport {
    /// `true` only if every peer positively reported the chaincode.
    pub fn installed_everywhere(&self) -> bool {
        !self.peers.is_empty()
            && self
                .peers
                .iter()
                .all(|p| p.status == PeerInstall::Installed)
    }

    pub fn peer_handles(&self) -> Vec<PeerHandle> {
        self.peers.iter().map(|p| p.peer.clone()).collect()
    }
}

pub struct ChaincodeInspector<'a, S> {
    session: &'a NetworkSession<S>,
    min_peers: usize,
}

impl<'a, S: LedgerSession> ChaincodeInspector<'a, S> {
    pub fn new(session: &'a NetworkSession<S>, min_peers: usize) -> Self {
        Self { session, min_peers }
    }

    /// Query every discovered peer of `org` for `spec`.
    ///
    /// Per-peer query failures are recorded, not raised. A discovery failure
    /// is raised: without the peer set there is nothing to conclude from.
    pub fn installation(
        &self,
        org: &str,
        spec: &ChaincodeSpec,
    ) -> Result<InstallReport, DeployError> {
        let peers = PeerDiscovery::new(self.session).discover_peers(org, self.min_peers)?;
        let network = self.session.retry_settings().network;

        let mut report = InstallReport {
            peers: Vec::with_capacity(peers.len()),
        };
        for peer in peers {
            tracing::debug!(peer = %peer, chaincode = %spec.label(), "querying installed chaincodes");
            let status = match self
                .session
                .call("query installed chaincodes", &network, |ledger, ctx| {
                    ledger.query_installed_chaincodes(ctx, &peer)
                }) {
                Ok(installed) if installed.iter().any(|cc| spec.matches(cc)) => {
                    PeerInstall::Installed
                }
                Ok(_) => {
                    tracing::info!(peer = %peer, chaincode = %spec.label(), "chaincode not installed on peer");
                    PeerInstall::Missing
                }
                Err(err) => {
                    tracing::warn!(peer = %peer, error = %err, "installed-chaincode query failed; treating as not installed");
                    PeerInstall::QueryFailed(err.to_string())
                }
            };
            report.peers.push(PeerInstallation { peer, status });
        }
        Ok(report)
    }

    /// `true` iff every discovered peer reports this exact name and version.
    pub fn is_installed(&self, org: &str, spec: &ChaincodeSpec) -> Result<bool, DeployError> {
        Ok(self.installation(org, spec)?.installed_everywhere())
    }

    /// Whether `spec` is instantiated on the channel. A failed query is an
    /// error, never `false`.
    pub fn is_instantiated(
        &self,
        channel_id: &str,
        spec: &ChaincodeSpec,
    ) -> Result<bool, DeployError> {
        let found = self
            .running_instance(channel_id, spec)?
            .is_some_and(|cc| spec.matches(&cc));
        tracing::debug!(channel = channel_id, chaincode = %spec.label(), found, "checked instantiation");
        Ok(found)
    }

    /// The instance running under `spec.name` on the channel, at any version.
    pub fn running_instance(
        &self,
        channel_id: &str,
        spec: &ChaincodeSpec,
    ) -> Result<Option<ChaincodeInfo>, DeployError> {
        let network = self.session.retry_settings().network;
        let instantiated = self
            .session
            .call("query instantiated chaincodes", &network, |ledger, ctx| {
                ledger.query_instantiated_chaincodes(ctx, channel_id)
            })?;
        Ok(instantiated.into_iter().find(|cc| cc.name == spec.name))
    }
}
