//! Error types for ccdeploy-engine.

use std::path::PathBuf;

use thiserror::Error;

use ccdeploy_core::ConfigError;

use crate::network::NetworkError;
use crate::retry::RetryExhausted;

/// All errors that can abort a provisioning or deployment run.
///
/// Every network-derived variant names the step that failed.
#[derive(Debug, Error)]
pub enum DeployError {
    /// Bad or missing deployment configuration.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The connector refused the network configuration.
    #[error("{step}: {source}")]
    NetworkConfig {
        step: &'static str,
        #[source]
        source: NetworkError,
    },

    /// Admin context or signing identity unavailable.
    #[error("{step}: {source}")]
    Identity {
        step: &'static str,
        #[source]
        source: NetworkError,
    },

    /// Discovery never saw enough peers within its retry budget.
    #[error(
        "quorum not reached for org '{org}': expected {expected} peers, saw {observed} after {attempts} attempt(s)"
    )]
    QuorumNotReached {
        org: String,
        expected: usize,
        observed: usize,
        attempts: u32,
    },

    /// Discovery was asked about an org other than the one the session
    /// holds an admin context for.
    #[error("cannot discover peers of org '{requested}' through a session for org '{session}'")]
    ForeignOrg { requested: String, session: String },

    /// A call kept failing transiently until its retry budget ran out.
    #[error("{step}: still failing after {attempts} attempt(s): {source}")]
    NetworkTransient {
        step: &'static str,
        attempts: u32,
        #[source]
        source: NetworkError,
    },

    /// The network refused a request outright.
    #[error("{step}: {source}")]
    Rejected {
        step: &'static str,
        #[source]
        source: NetworkError,
    },

    /// A write reported success without a transaction id. Never retried.
    #[error("{step}: network returned an empty transaction id for {subject}")]
    DeploymentConflict { step: &'static str, subject: String },

    /// The chaincode bundle could not be built.
    #[error("failed to package chaincode: {0}")]
    Package(#[from] PackageError),
}

impl DeployError {
    /// Classify the final error of a retried network call.
    pub(crate) fn from_network(step: &'static str, failure: RetryExhausted<NetworkError>) -> Self {
        let RetryExhausted { attempts, last } = failure;
        match last {
            NetworkError::Transient(_) => DeployError::NetworkTransient {
                step,
                attempts,
                source: last,
            },
            NetworkError::Identity(_) => DeployError::Identity { step, source: last },
            NetworkError::Config(_) => DeployError::NetworkConfig { step, source: last },
            NetworkError::Rejected(_) => DeployError::Rejected { step, source: last },
        }
    }
}

/// Errors from building a chaincode bundle.
#[derive(Debug, Error)]
pub enum PackageError {
    #[error("chaincode source directory not found: {path}")]
    SourceNotFound { path: PathBuf },

    #[error("chaincode source directory has no files: {path}")]
    Empty { path: PathBuf },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience constructor for [`PackageError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> PackageError {
    PackageError::Io {
        path: path.into(),
        source,
    }
}
