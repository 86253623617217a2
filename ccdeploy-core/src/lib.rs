//! ccdeploy core library — domain types, deployment configuration, errors.
//!
//! - [`types`] — specs, identities, outcomes
//! - [`retry`] — retry policy values
//! - [`config`] — load / validate / scaffold the YAML configuration
//! - [`error`] — [`ConfigError`]

pub mod config;
pub mod error;
pub mod retry;
pub mod types;

pub use config::DeployConfig;
pub use error::ConfigError;
pub use retry::{Backoff, RetryPolicy, RetrySettings};
pub use types::{
    ChaincodeInfo, ChaincodeSpec, ChaincodeState, ChannelSpec, ChannelStatus, DeploymentOutcome,
    DeploymentReport, EndorsementPolicy, OrgIdentity, PeerHandle, TxId, UpgradeMode,
};
