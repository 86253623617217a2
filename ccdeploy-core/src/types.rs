//! Domain types for chaincode deployment.
//!
//! Filesystem locations use `PathBuf`; identifiers that the network hands back
//! (transaction ids) are newtypes so they cannot be mixed up with names.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Transaction identifier returned by the network for a write.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxId(pub String);

impl TxId {
    /// A successful response carrying an empty id is treated as a rejection.
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for TxId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TxId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Identities and specs
// ---------------------------------------------------------------------------

/// The organization the deployment acts for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgIdentity {
    /// Organization name as known to the network config (e.g. `org1`).
    pub name: String,
    /// MSP identifier used to derive signature policies (e.g. `Org1MSP`).
    pub msp_id: String,
    /// Administrative principal that signs channel and lifecycle requests.
    pub admin: String,
    /// Principal used for the channel-scoped client.
    pub user: String,
    /// Orderer endpoint channel requests are directed at.
    pub orderer: String,
}

/// A channel and the artifact that defines it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSpec {
    pub id: String,
    /// Channel-definition transaction file.
    pub artifact: PathBuf,
}

/// A deployable chaincode.
///
/// `name` + `version` identify the artifact. The version is opaque: nothing
/// here orders versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChaincodeSpec {
    pub name: String,
    pub version: String,
    /// Source location relative to `<build_root>/src`.
    pub path: String,
    #[serde(default = "crate::config::default_build_root")]
    pub build_root: PathBuf,
    #[serde(default = "default_init_args")]
    pub init_args: Vec<String>,
    /// Organizations whose members may endorse; empty means the deploying org.
    #[serde(default)]
    pub endorsing_orgs: Vec<String>,
}

impl ChaincodeSpec {
    /// Directory the packager reads sources from.
    pub fn source_dir(&self) -> PathBuf {
        self.build_root.join("src").join(&self.path)
    }

    /// `true` when `info` is exactly this name and version.
    pub fn matches(&self, info: &ChaincodeInfo) -> bool {
        info.name == self.name && info.version == self.version
    }

    pub fn label(&self) -> String {
        format!("{}:{}", self.name, self.version)
    }

    /// Organizations named in the instantiate policy, defaulting to the deploying one.
    pub fn endorsers(&self, deploying_msp: &str) -> Vec<String> {
        if self.endorsing_orgs.is_empty() {
            vec![deploying_msp.to_string()]
        } else {
            self.endorsing_orgs.clone()
        }
    }
}

fn default_init_args() -> Vec<String> {
    vec!["init".to_string()]
}

/// One peer as returned by discovery.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerHandle {
    pub url: String,
    pub msp_id: String,
}

impl fmt::Display for PeerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.url.fmt(f)
    }
}

/// A chaincode entry as reported by a peer or a channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChaincodeInfo {
    pub name: String,
    pub version: String,
}

impl ChaincodeInfo {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Policies
// ---------------------------------------------------------------------------

/// Signature policy attached to upgrade and instantiate requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "orgs")]
pub enum EndorsementPolicy {
    /// Any member of any listed organization may sign.
    SignedByAnyMember(Vec<String>),
    /// Any member of the given MSP may sign.
    SignedByMspMember(String),
}

impl fmt::Display for EndorsementPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndorsementPolicy::SignedByAnyMember(orgs) => {
                write!(f, "any member of [{}]", orgs.join(", "))
            }
            EndorsementPolicy::SignedByMspMember(msp) => write!(f, "member of {msp}"),
        }
    }
}

/// What to do with a chaincode that is already installed on every peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UpgradeMode {
    /// Upgrade whenever the chaincode is installed, even at an unchanged version.
    Always,
    /// Upgrade only when an older version is running; a run with this exact
    /// name+version already instantiated makes no writes, and with nothing
    /// running the chaincode is instantiated instead.
    #[default]
    UnlessInstantiated,
}

impl fmt::Display for UpgradeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpgradeMode::Always => write!(f, "always"),
            UpgradeMode::UnlessInstantiated => write!(f, "unless_instantiated"),
        }
    }
}

// ---------------------------------------------------------------------------
// Deployment state and results
// ---------------------------------------------------------------------------

/// Lifecycle position of a chaincode as last observed on the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChaincodeState {
    #[default]
    Unknown,
    NotInstalled,
    InstalledNotInstantiated,
    Instantiated,
}

impl fmt::Display for ChaincodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChaincodeState::Unknown => write!(f, "unknown"),
            ChaincodeState::NotInstalled => write!(f, "not installed"),
            ChaincodeState::InstalledNotInstantiated => write!(f, "installed, not instantiated"),
            ChaincodeState::Instantiated => write!(f, "instantiated"),
        }
    }
}

/// Result of provisioning a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum ChannelStatus {
    /// The queried peer already lists the channel.
    AlreadyJoined,
    /// The channel was created and joined in this run.
    Created { tx_id: TxId },
}

/// Result of one deployment attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum DeploymentOutcome {
    /// Installed on the discovered peers; the channel already ran this version.
    Installed,
    /// Upgraded on the channel.
    Upgraded { tx_id: TxId },
    /// Nothing to do.
    AlreadyInstantiated,
    /// Instantiated on the channel.
    Instantiated { tx_id: TxId },
}

impl DeploymentOutcome {
    pub fn tx_id(&self) -> Option<&TxId> {
        match self {
            DeploymentOutcome::Upgraded { tx_id } | DeploymentOutcome::Instantiated { tx_id } => {
                Some(tx_id)
            }
            DeploymentOutcome::Installed | DeploymentOutcome::AlreadyInstantiated => None,
        }
    }
}

impl fmt::Display for DeploymentOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeploymentOutcome::Installed => write!(f, "installed"),
            DeploymentOutcome::Upgraded { tx_id } => write!(f, "upgraded (tx {tx_id})"),
            DeploymentOutcome::AlreadyInstantiated => write!(f, "already instantiated"),
            DeploymentOutcome::Instantiated { tx_id } => write!(f, "instantiated (tx {tx_id})"),
        }
    }
}

/// Everything a `deploy` run produced, for printing or JSON output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentReport {
    pub channel_id: String,
    pub channel: ChannelStatus,
    pub chaincode: ChaincodeInfo,
    pub outcome: DeploymentOutcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
