//! Channel provisioning.
//!
//! Membership is checked on the first discovered peer only. Channel membership
//! propagates cluster-wide, so one peer listing the channel is taken as
//! "already provisioned". Chaincode installation (see [`crate::inspector`])
//! is per-peer state and requires every peer to agree instead.

use ccdeploy_core::retry::RetryPolicy;
use ccdeploy_core::types::{ChannelSpec, ChannelStatus, OrgIdentity, PeerHandle};
use serde::Serialize;

use crate::discovery::PeerDiscovery;
use crate::error::DeployError;
use crate::network::LedgerSession;
use crate::session::NetworkSession;

/// Channel membership as reported by one peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerMembership {
    pub peer: PeerHandle,
    /// `None` when the peer could not be queried.
    pub joined: Option<bool>,
}

pub struct ChannelProvisioner<'a, S> {
    session: &'a NetworkSession<S>,
    min_peers: usize,
}

impl<'a, S: LedgerSession> ChannelProvisioner<'a, S> {
    pub fn new(session: &'a NetworkSession<S>, min_peers: usize) -> Self {
        Self { session, min_peers }
    }

    /// Whether the first discovered peer of `org` lists `channel_id`.
    ///
    /// At least one peer must be visible even when `min_peers` is zero; an
    /// empty view is [`DeployError::QuorumNotReached`], not "not joined".
    pub fn is_joined(&self, channel_id: &str, org: &OrgIdentity) -> Result<bool, DeployError> {
        let peers = PeerDiscovery::new(self.session)
            .discover_peers(&org.name, self.min_peers.max(1))?;
        let Some(peer) = peers.first() else {
            return Err(DeployError::QuorumNotReached {
                org: org.name.clone(),
                expected: 1,
                observed: 0,
                attempts: 1,
            });
        };
        let network = self.session.retry_settings().network;
        let channels = self.session.call("query channels", &network, |ledger, ctx| {
            ledger.query_channels(ctx, peer)
        })?;
        let joined = channels.iter().any(|id| id == channel_id);
        tracing::debug!(channel = channel_id, peer = %peer, joined, "checked channel membership");
        Ok(joined)
    }

    /// Ask every discovered peer whether it lists `channel_id`. Read-only;
    /// used for reporting, never for the create/join decision.
    pub fn membership(
        &self,
        channel_id: &str,
        org: &OrgIdentity,
    ) -> Result<Vec<PeerMembership>, DeployError> {
        let peers = PeerDiscovery::new(self.session).discover_peers(&org.name, self.min_peers)?;
        let network = self.session.retry_settings().network;
        Ok(peers
            .into_iter()
            .map(|peer| {
                let joined = match self.session.call("query channels", &network, |ledger, ctx| {
                    ledger.query_channels(ctx, &peer)
                }) {
                    Ok(channels) => Some(channels.iter().any(|id| id == channel_id)),
                    Err(err) => {
                        tracing::warn!(peer = %peer, error = %err, "channel query failed");
                        None
                    }
                };
                PeerMembership { peer, joined }
            })
            .collect())
    }

    /// Create and join `spec` unless the queried peer already has it.
    ///
    /// Creation is attempted once; join is retried under the network policy.
    /// A failure after creation leaves the channel created but not joined;
    /// the next run sees it absent on the peer and will fail at creation.
    pub fn ensure_channel(
        &self,
        spec: &ChannelSpec,
        org: &OrgIdentity,
    ) -> Result<ChannelStatus, DeployError> {
        if self.is_joined(&spec.id, org)? {
            tracing::info!(channel = %spec.id, "channel already joined");
            return Ok(ChannelStatus::AlreadyJoined);
        }

        spec.ensure_artifact()?;
        let signer = self.session.signer();
        let tx_id = self.session.call("create channel", &RetryPolicy::once(), |ledger, ctx| {
            ledger.create_channel(ctx, spec, signer, &org.orderer)
        })?;
        if tx_id.is_empty() {
            return Err(DeployError::DeploymentConflict {
                step: "create channel",
                subject: format!("channel '{}'", spec.id),
            });
        }
        tracing::info!(channel = %spec.id, orderer = %org.orderer, tx = %tx_id, "channel created");

        let network = self.session.retry_settings().network;
        self.session.call("join channel", &network, |ledger, ctx| {
            ledger.join_channel(ctx, &spec.id, &org.orderer)
        })?;
        tracing::info!(channel = %spec.id, "channel joined");

        Ok(ChannelStatus::Created { tx_id })
    }
}
