//! Deterministic in-memory ledger network.
//!
//! Models just enough of a permissioned network to exercise the deployment
//! state machine: organizations with peers, channels and per-peer channel
//! membership, per-peer installed chaincodes, and per-channel instantiated
//! chaincodes. Every call is recorded, and faults can be injected per
//! operation. Clones share state, so a test can keep one handle while the
//! session it connected is owned elsewhere.
//!
//! Used by the test suite and by `ccdeploy --simulate`.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use ccdeploy_core::types::{
    ChaincodeInfo, ChaincodeSpec, ChannelSpec, EndorsementPolicy, PeerHandle, TxId,
};
use ccdeploy_core::DeployConfig;

use crate::network::{
    AdminContext, ChannelClient, EventClient, LedgerClient, LedgerConnector, LedgerSession,
    NetworkError, SigningIdentity,
};
use crate::packager::ChaincodeBundle;

/// Operation kinds, for counting calls and targeting faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Op {
    Connect,
    AdminContext,
    SigningIdentity,
    CreateChannel,
    JoinChannel,
    ListLocalPeers,
    QueryChannels,
    QueryInstalled,
    Install,
    Upgrade,
    Instantiate,
    QueryInstantiated,
    OpenChannelClient,
    OpenEventClient,
    OpenLedgerClient,
}

impl Op {
    /// Operations that change network state.
    pub fn is_write(self) -> bool {
        matches!(
            self,
            Op::CreateChannel | Op::JoinChannel | Op::Install | Op::Upgrade | Op::Instantiate
        )
    }
}

/// One recorded call with the arguments that matter for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Connect,
    AdminContext { org: String },
    SigningIdentity { org: String },
    CreateChannel { channel_id: String, orderer: String },
    JoinChannel { channel_id: String, orderer: String },
    ListLocalPeers { org: String },
    QueryChannels { peer: String },
    QueryInstalled { peer: String },
    Install {
        chaincode: ChaincodeInfo,
        targets: Vec<String>,
        digest: String,
    },
    Upgrade {
        channel_id: String,
        chaincode: ChaincodeInfo,
        policy: EndorsementPolicy,
    },
    Instantiate {
        channel_id: String,
        chaincode: ChaincodeInfo,
        init_args: Vec<String>,
        policy: EndorsementPolicy,
    },
    QueryInstantiated { channel_id: String },
    OpenChannelClient { channel_id: String, user: String },
    OpenEventClient { channel_id: String, user: String },
    OpenLedgerClient { channel_id: String, user: String },
}

impl Call {
    pub fn op(&self) -> Op {
        match self {
            Call::Connect => Op::Connect,
            Call::AdminContext { .. } => Op::AdminContext,
            Call::SigningIdentity { .. } => Op::SigningIdentity,
            Call::CreateChannel { .. } => Op::CreateChannel,
            Call::JoinChannel { .. } => Op::JoinChannel,
            Call::ListLocalPeers { .. } => Op::ListLocalPeers,
            Call::QueryChannels { .. } => Op::QueryChannels,
            Call::QueryInstalled { .. } => Op::QueryInstalled,
            Call::Install { .. } => Op::Install,
            Call::Upgrade { .. } => Op::Upgrade,
            Call::Instantiate { .. } => Op::Instantiate,
            Call::QueryInstantiated { .. } => Op::QueryInstantiated,
            Call::OpenChannelClient { .. } => Op::OpenChannelClient,
            Call::OpenEventClient { .. } => Op::OpenEventClient,
            Call::OpenLedgerClient { .. } => Op::OpenLedgerClient,
        }
    }
}

#[derive(Debug, Default)]
struct Org {
    msp_id: String,
    peers: Vec<PeerHandle>,
}

#[derive(Debug, Default)]
struct NetworkState {
    orgs: BTreeMap<String, Org>,
    channels: BTreeSet<String>,
    joined: BTreeMap<String, BTreeSet<String>>,
    installed: BTreeMap<String, Vec<ChaincodeInfo>>,
    instantiated: BTreeMap<String, Vec<ChaincodeInfo>>,
    unreachable_peers: BTreeSet<String>,
    transient: BTreeMap<Op, u32>,
    permanent: BTreeMap<Op, String>,
    empty_tx: BTreeSet<Op>,
    discovery_lag: u32,
    tx_seq: u64,
    calls: Vec<Call>,
}

impl NetworkState {
    /// Record `call`, then apply any injected fault for its operation.
    fn enter(&mut self, call: Call) -> Result<(), NetworkError> {
        let op = call.op();
        self.calls.push(call);
        if let Some(message) = self.permanent.get(&op) {
            return Err(match op {
                Op::Connect => NetworkError::Config(message.clone()),
                Op::AdminContext | Op::SigningIdentity => NetworkError::Identity(message.clone()),
                _ => NetworkError::Rejected(message.clone()),
            });
        }
        if let Some(remaining) = self.transient.get_mut(&op).filter(|n| **n > 0) {
            *remaining -= 1;
            return Err(NetworkError::Transient(format!("{op:?} temporarily unavailable")));
        }
        Ok(())
    }

    fn next_tx(&mut self, op: Op) -> TxId {
        self.tx_seq += 1;
        if self.empty_tx.contains(&op) {
            TxId::from("")
        } else {
            TxId(format!("tx{:04}", self.tx_seq))
        }
    }

    fn org(&self, name: &str) -> Result<&Org, NetworkError> {
        self.orgs
            .get(name)
            .ok_or_else(|| NetworkError::Identity(format!("unknown organization '{name}'")))
    }

    fn all_peers(&self) -> impl Iterator<Item = &PeerHandle> {
        self.orgs.values().flat_map(|org| org.peers.iter())
    }

    fn check_peer(&self, peer: &PeerHandle) -> Result<(), NetworkError> {
        if self.unreachable_peers.contains(&peer.url) {
            return Err(NetworkError::Transient(format!("peer {} unreachable", peer.url)));
        }
        if !self.all_peers().any(|p| p.url == peer.url) {
            return Err(NetworkError::Rejected(format!("unknown peer {}", peer.url)));
        }
        Ok(())
    }

    fn check_channel(&self, channel_id: &str) -> Result<(), NetworkError> {
        if !self.channels.contains(channel_id) {
            return Err(NetworkError::Rejected(format!(
                "channel '{channel_id}' does not exist"
            )));
        }
        Ok(())
    }
}

/// Endpoint used for the `index`-th peer of `org`.
pub fn peer_url(org: &str, index: usize) -> String {
    format!("peer{index}.{org}.example.com:7051")
}

/// Connector half. Clone it to keep an inspection handle.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNetwork {
    state: Arc<Mutex<NetworkState>>,
}

/// Session half, sharing state with the network it came from.
#[derive(Debug, Clone)]
pub struct InMemorySession {
    state: Arc<Mutex<NetworkState>>,
}

fn lock(state: &Arc<Mutex<NetworkState>>) -> MutexGuard<'_, NetworkState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl InMemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty network holding just the deploying org with `min_peers` peers.
    pub fn rehearsal(config: &DeployConfig) -> Self {
        Self::new().with_org(&config.org.name, &config.org.msp_id, config.min_peers)
    }

    fn state(&self) -> MutexGuard<'_, NetworkState> {
        lock(&self.state)
    }

    // -- builders -----------------------------------------------------------

    pub fn with_org(self, name: &str, msp_id: &str, peer_count: usize) -> Self {
        {
            let mut state = self.state();
            let peers = (0..peer_count)
                .map(|i| PeerHandle {
                    url: peer_url(name, i),
                    msp_id: msp_id.to_string(),
                })
                .collect();
            state.orgs.insert(
                name.to_string(),
                Org {
                    msp_id: msp_id.to_string(),
                    peers,
                },
            );
        }
        self
    }

    /// The channel exists and every current peer has joined it.
    pub fn with_channel(self, channel_id: &str) -> Self {
        {
            let mut state = self.state();
            state.channels.insert(channel_id.to_string());
            let urls: Vec<String> = state.all_peers().map(|p| p.url.clone()).collect();
            for url in urls {
                state
                    .joined
                    .entry(url)
                    .or_default()
                    .insert(channel_id.to_string());
            }
        }
        self
    }

    pub fn with_installed_on(self, peer: &str, name: &str, version: &str) -> Self {
        self.state()
            .installed
            .entry(peer.to_string())
            .or_default()
            .push(ChaincodeInfo::new(name, version));
        self
    }

    /// Installed on every current peer.
    pub fn with_installed(self, name: &str, version: &str) -> Self {
        let urls: Vec<String> = self.state().all_peers().map(|p| p.url.clone()).collect();
        urls.iter()
            .fold(self, |net, url| net.with_installed_on(url, name, version))
    }

    pub fn with_instantiated(self, channel_id: &str, name: &str, version: &str) -> Self {
        self.state()
            .instantiated
            .entry(channel_id.to_string())
            .or_default()
            .push(ChaincodeInfo::new(name, version));
        self
    }

    /// The next `times` calls of `op` fail transiently.
    pub fn fail_transiently(self, op: Op, times: u32) -> Self {
        self.state().transient.insert(op, times);
        self
    }

    /// Every call of `op` fails with a non-retryable error.
    pub fn fail_permanently(self, op: Op, message: &str) -> Self {
        self.state().permanent.insert(op, message.to_string());
        self
    }

    /// Queries against this peer fail transiently, forever.
    pub fn with_unreachable_peer(self, peer: &str) -> Self {
        self.state().unreachable_peers.insert(peer.to_string());
        self
    }

    /// Writes of this kind succeed but return an empty transaction id.
    pub fn with_empty_tx_ids(self, op: Op) -> Self {
        self.state().empty_tx.insert(op);
        self
    }

    /// The first `calls` discovery queries miss the org's last peer.
    pub fn with_discovery_lag(self, calls: u32) -> Self {
        self.state().discovery_lag = calls;
        self
    }

    // -- inspection ---------------------------------------------------------

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn count(&self, op: Op) -> usize {
        self.state().calls.iter().filter(|c| c.op() == op).count()
    }

    /// Recorded calls that change network state.
    pub fn writes(&self) -> Vec<Call> {
        self.state()
            .calls
            .iter()
            .filter(|c| c.op().is_write())
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub fn peers(&self, org: &str) -> Vec<PeerHandle> {
        self.state()
            .orgs
            .get(org)
            .map(|o| o.peers.clone())
            .unwrap_or_default()
    }

    pub fn is_installed_on(&self, peer: &str, name: &str, version: &str) -> bool {
        self.state()
            .installed
            .get(peer)
            .is_some_and(|list| list.contains(&ChaincodeInfo::new(name, version)))
    }

    pub fn instantiated(&self, channel_id: &str) -> Vec<ChaincodeInfo> {
        self.state()
            .instantiated
            .get(channel_id)
            .cloned()
            .unwrap_or_default()
    }
}

impl LedgerConnector for InMemoryNetwork {
    type Session = InMemorySession;

    fn connect(&self, _network_config: &Path) -> Result<InMemorySession, NetworkError> {
        self.state().enter(Call::Connect)?;
        Ok(InMemorySession {
            state: Arc::clone(&self.state),
        })
    }
}

impl InMemorySession {
    fn state(&self) -> MutexGuard<'_, NetworkState> {
        lock(&self.state)
    }
}

impl LedgerSession for InMemorySession {
    fn admin_context(&self, org: &str, admin: &str) -> Result<AdminContext, NetworkError> {
        let mut state = self.state();
        state.enter(Call::AdminContext {
            org: org.to_string(),
        })?;
        state.org(org)?;
        Ok(AdminContext {
            org: org.to_string(),
            principal: admin.to_string(),
        })
    }

    fn signing_identity(&self, org: &str, admin: &str) -> Result<SigningIdentity, NetworkError> {
        let mut state = self.state();
        state.enter(Call::SigningIdentity {
            org: org.to_string(),
        })?;
        let msp_id = state.org(org)?.msp_id.clone();
        Ok(SigningIdentity {
            msp_id,
            principal: admin.to_string(),
        })
    }

    fn create_channel(
        &self,
        _ctx: &AdminContext,
        channel: &ChannelSpec,
        _signer: &SigningIdentity,
        orderer: &str,
    ) -> Result<TxId, NetworkError> {
        let mut state = self.state();
        state.enter(Call::CreateChannel {
            channel_id: channel.id.clone(),
            orderer: orderer.to_string(),
        })?;
        if !state.channels.insert(channel.id.clone()) {
            return Err(NetworkError::Rejected(format!(
                "channel '{}' already exists",
                channel.id
            )));
        }
        Ok(state.next_tx(Op::CreateChannel))
    }

    fn join_channel(
        &self,
        ctx: &AdminContext,
        channel_id: &str,
        orderer: &str,
    ) -> Result<(), NetworkError> {
        let mut state = self.state();
        state.enter(Call::JoinChannel {
            channel_id: channel_id.to_string(),
            orderer: orderer.to_string(),
        })?;
        state.check_channel(channel_id)?;
        let urls: Vec<String> = state.org(&ctx.org)?.peers.iter().map(|p| p.url.clone()).collect();
        for url in urls {
            state
                .joined
                .entry(url)
                .or_default()
                .insert(channel_id.to_string());
        }
        Ok(())
    }

    fn list_local_peers(&self, ctx: &AdminContext) -> Result<Vec<PeerHandle>, NetworkError> {
        let mut state = self.state();
        state.enter(Call::ListLocalPeers {
            org: ctx.org.clone(),
        })?;
        let mut peers = state.org(&ctx.org)?.peers.clone();
        if state.discovery_lag > 0 {
            state.discovery_lag -= 1;
            peers.pop();
        }
        Ok(peers)
    }

    fn query_channels(
        &self,
        _ctx: &AdminContext,
        peer: &PeerHandle,
    ) -> Result<Vec<String>, NetworkError> {
        let mut state = self.state();
        state.enter(Call::QueryChannels {
            peer: peer.url.clone(),
        })?;
        state.check_peer(peer)?;
        Ok(state
            .joined
            .get(&peer.url)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn query_installed_chaincodes(
        &self,
        _ctx: &AdminContext,
        peer: &PeerHandle,
    ) -> Result<Vec<ChaincodeInfo>, NetworkError> {
        let mut state = self.state();
        state.enter(Call::QueryInstalled {
            peer: peer.url.clone(),
        })?;
        state.check_peer(peer)?;
        Ok(state.installed.get(&peer.url).cloned().unwrap_or_default())
    }

    fn install_chaincode(
        &self,
        _ctx: &AdminContext,
        spec: &ChaincodeSpec,
        bundle: &ChaincodeBundle,
        targets: &[PeerHandle],
    ) -> Result<(), NetworkError> {
        let mut state = self.state();
        let info = ChaincodeInfo::new(&spec.name, &spec.version);
        state.enter(Call::Install {
            chaincode: info.clone(),
            targets: targets.iter().map(|p| p.url.clone()).collect(),
            digest: bundle.digest.clone(),
        })?;
        if targets.is_empty() {
            return Err(NetworkError::Rejected("install needs at least one target peer".into()));
        }
        for peer in targets {
            state.check_peer(peer)?;
        }
        for peer in targets {
            let list = state.installed.entry(peer.url.clone()).or_default();
            if !list.contains(&info) {
                list.push(info.clone());
            }
        }
        Ok(())
    }

    fn upgrade_chaincode(
        &self,
        _ctx: &AdminContext,
        channel_id: &str,
        spec: &ChaincodeSpec,
        policy: &EndorsementPolicy,
    ) -> Result<TxId, NetworkError> {
        let mut state = self.state();
        let info = ChaincodeInfo::new(&spec.name, &spec.version);
        state.enter(Call::Upgrade {
            channel_id: channel_id.to_string(),
            chaincode: info.clone(),
            policy: policy.clone(),
        })?;
        state.check_channel(channel_id)?;
        if !state.installed.values().any(|list| list.contains(&info)) {
            return Err(NetworkError::Rejected(format!(
                "chaincode {}:{} is not installed on any peer",
                info.name, info.version
            )));
        }
        let Some(running) = state
            .instantiated
            .get_mut(channel_id)
            .and_then(|list| list.iter_mut().find(|cc| cc.name == info.name))
        else {
            return Err(NetworkError::Rejected(format!(
                "chaincode {} is not instantiated on '{channel_id}'; nothing to upgrade",
                info.name
            )));
        };
        *running = info;
        Ok(state.next_tx(Op::Upgrade))
    }

    fn instantiate_chaincode(
        &self,
        _ctx: &AdminContext,
        channel_id: &str,
        spec: &ChaincodeSpec,
        init_args: &[Vec<u8>],
        policy: &EndorsementPolicy,
    ) -> Result<TxId, NetworkError> {
        let mut state = self.state();
        let info = ChaincodeInfo::new(&spec.name, &spec.version);
        state.enter(Call::Instantiate {
            channel_id: channel_id.to_string(),
            chaincode: info.clone(),
            init_args: init_args
                .iter()
                .map(|arg| String::from_utf8_lossy(arg).into_owned())
                .collect(),
            policy: policy.clone(),
        })?;
        state.check_channel(channel_id)?;
        if !state.installed.values().any(|list| list.contains(&info)) {
            return Err(NetworkError::Rejected(format!(
                "chaincode {}:{} is not installed on any peer",
                info.name, info.version
            )));
        }
        let list = state.instantiated.entry(channel_id.to_string()).or_default();
        if list.iter().any(|cc| cc.name == info.name) {
            return Err(NetworkError::Rejected(format!(
                "chaincode {} already instantiated on '{channel_id}'",
                info.name
            )));
        }
        list.push(info);
        Ok(state.next_tx(Op::Instantiate))
    }

    fn query_instantiated_chaincodes(
        &self,
        _ctx: &AdminContext,
        channel_id: &str,
    ) -> Result<Vec<ChaincodeInfo>, NetworkError> {
        let mut state = self.state();
        state.enter(Call::QueryInstantiated {
            channel_id: channel_id.to_string(),
        })?;
        state.check_channel(channel_id)?;
        Ok(state
            .instantiated
            .get(channel_id)
            .cloned()
            .unwrap_or_default())
    }

    fn open_channel_client(
        &self,
        channel_id: &str,
        user: &str,
    ) -> Result<ChannelClient, NetworkError> {
        let mut state = self.state();
        state.enter(Call::OpenChannelClient {
            channel_id: channel_id.to_string(),
            user: user.to_string(),
        })?;
        state.check_channel(channel_id)?;
        Ok(ChannelClient {
            channel_id: channel_id.to_string(),
            user: user.to_string(),
        })
    }

    fn open_event_client(&self, channel_id: &str, user: &str) -> Result<EventClient, NetworkError> {
        let mut state = self.state();
        state.enter(Call::OpenEventClient {
            channel_id: channel_id.to_string(),
            user: user.to_string(),
        })?;
        state.check_channel(channel_id)?;
        Ok(EventClient {
            channel_id: channel_id.to_string(),
            user: user.to_string(),
        })
    }

    fn open_ledger_client(
        &self,
        channel_id: &str,
        user: &str,
    ) -> Result<LedgerClient, NetworkError> {
        let mut state = self.state();
        state.enter(Call::OpenLedgerClient {
            channel_id: channel_id.to_string(),
            user: user.to_string(),
        })?;
        state.check_channel(channel_id)?;
        Ok(LedgerClient {
            channel_id: channel_id.to_string(),
            user: user.to_string(),
        })
    }
}
