//! # ccdeploy-engine
//!
//! Idempotent channel provisioning and chaincode deployment.
//!
//! Build a [`DeploymentOrchestrator`] with [`DeploymentOrchestrator::initialize`]
//! (connects and provisions the channel), then call
//! [`DeploymentOrchestrator::deploy`] for a chaincode. Every decision is made
//! from a fresh network query, so a failed run can simply be repeated.
//!
//! The network is reached through [`LedgerConnector`] / [`LedgerSession`];
//! [`InMemoryNetwork`] implements both for tests and rehearsals.

pub mod channel;
pub mod deployer;
pub mod discovery;
pub mod error;
pub mod inspector;
pub mod memory;
pub mod network;
pub mod orchestrator;
pub mod packager;
pub mod retry;
pub mod session;

pub use channel::{ChannelProvisioner, PeerMembership};
pub use deployer::ChaincodeDeployer;
pub use discovery::PeerDiscovery;
pub use error::{DeployError, PackageError};
pub use inspector::{ChaincodeInspector, InstallReport, PeerInstall, PeerInstallation};
pub use memory::InMemoryNetwork;
pub use network::{LedgerConnector, LedgerSession, NetworkError};
pub use orchestrator::DeploymentOrchestrator;
pub use packager::{ChaincodeBundle, DirectoryPackager, Packager};
pub use retry::{RecordingSleeper, Sleeper, ThreadSleeper};
pub use session::NetworkSession;
