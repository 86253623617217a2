//! Ledger network capability.
//!
//! The engine never talks to a ledger SDK directly. Everything it needs is on
//! [`LedgerSession`], obtained once from a [`LedgerConnector`]. Implementations
//! classify their failures into [`NetworkError`] so the retry executor can tell
//! transient unavailability from permanent rejection.

use std::path::Path;

use ccdeploy_core::types::{
    ChaincodeInfo, ChaincodeSpec, ChannelSpec, EndorsementPolicy, PeerHandle, TxId,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::packager::ChaincodeBundle;

/// Failure reported by a network call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    /// Peer or orderer unavailable, timeout, connection reset. Safe to retry.
    #[error("transient network failure: {0}")]
    Transient(String),

    /// The network understood the request and refused it.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The signing identity or admin context could not be loaded.
    #[error("identity unavailable: {0}")]
    Identity(String),

    /// The network configuration is missing or unusable.
    #[error("network configuration error: {0}")]
    Config(String),
}

impl NetworkError {
    pub fn is_transient(&self) -> bool {
        matches!(self, NetworkError::Transient(_))
    }
}

/// Administrative context scoped to one organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminContext {
    pub org: String,
    pub principal: String,
}

/// Credential used to sign channel-creation requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningIdentity {
    pub msp_id: String,
    pub principal: String,
}

/// Channel-scoped client handle for callers that query and invoke chaincode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelClient {
    pub channel_id: String,
    pub user: String,
}

/// Event-subscription handle on a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventClient {
    pub channel_id: String,
    pub user: String,
}

/// Read-only ledger query handle on a channel (blocks, transactions, config).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerClient {
    pub channel_id: String,
    pub user: String,
}

/// Opens sessions against a ledger network.
pub trait LedgerConnector {
    type Session: LedgerSession;

    fn connect(&self, network_config: &Path) -> Result<Self::Session, NetworkError>;
}

/// Administrative operations on a connected network. All calls block.
pub trait LedgerSession {
    fn admin_context(&self, org: &str, admin: &str) -> Result<AdminContext, NetworkError>;

    fn signing_identity(&self, org: &str, admin: &str) -> Result<SigningIdentity, NetworkError>;

    fn create_channel(
        &self,
        ctx: &AdminContext,
        channel: &ChannelSpec,
        signer: &SigningIdentity,
        orderer: &str,
    ) -> Result<TxId, NetworkError>;

    fn join_channel(
        &self,
        ctx: &AdminContext,
        channel_id: &str,
        orderer: &str,
    ) -> Result<(), NetworkError>;

    fn list_local_peers(&self, ctx: &AdminContext) -> Result<Vec<PeerHandle>, NetworkError>;

    fn query_channels(
        &self,
        ctx: &AdminContext,
        peer: &PeerHandle,
    ) -> Result<Vec<String>, NetworkError>;

    fn query_installed_chaincodes(
        &self,
        ctx: &AdminContext,
        peer: &PeerHandle,
    ) -> Result<Vec<ChaincodeInfo>, NetworkError>;

    fn install_chaincode(
        &self,
        ctx: &AdminContext,
        spec: &ChaincodeSpec,
        bundle: &ChaincodeBundle,
        targets: &[PeerHandle],
    ) -> Result<(), NetworkError>;

    fn upgrade_chaincode(
        &self,
        ctx: &AdminContext,
        channel_id: &str,
        spec: &ChaincodeSpec,
        policy: &EndorsementPolicy,
    ) -> Result<TxId, NetworkError>;

    fn instantiate_chaincode(
        &self,
        ctx: &AdminContext,
        channel_id: &str,
        spec: &ChaincodeSpec,
        init_args: &[Vec<u8>],
        policy: &EndorsementPolicy,
    ) -> Result<TxId, NetworkError>;

    fn query_instantiated_chaincodes(
        &self,
        ctx: &AdminContext,
        channel_id: &str,
    ) -> Result<Vec<ChaincodeInfo>, NetworkError>;

    fn open_channel_client(
        &self,
        channel_id: &str,
        user: &str,
    ) -> Result<ChannelClient, NetworkError>;

    fn open_event_client(&self, channel_id: &str, user: &str) -> Result<EventClient, NetworkError>;

    fn open_ledger_client(
        &self,
        channel_id: &str,
        user: &str,
    ) -> Result<LedgerClient, NetworkError>;
}
