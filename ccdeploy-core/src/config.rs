//! Deployment configuration file.
//!
//! # Layout
//!
//! ```text
//! ccdeploy.yaml
//!   network_config   path handed to the ledger connector
//!   org              OrgIdentity
//!   channel          ChannelSpec
//!   chaincode        ChaincodeSpec
//!   min_peers        discovery quorum (default 2)
//!   upgrade_mode     always | unless_instantiated
//!   retry            RetrySettings
//! ```
//!
//! Relative paths are resolved against the directory containing the file, so
//! a config can be checked in next to its artifacts.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{invalid, io_err, ConfigError};
use crate::retry::{RetryPolicy, RetrySettings};
use crate::types::{ChaincodeSpec, ChannelSpec, OrgIdentity, UpgradeMode};

/// File name `ccdeploy init` writes when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "ccdeploy.yaml";

/// Immutable deployment configuration. The live network session is built from
/// this value and never writes back into it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Connection profile for the ledger network.
    pub network_config: PathBuf,
    pub org: OrgIdentity,
    pub channel: ChannelSpec,
    pub chaincode: ChaincodeSpec,
    #[serde(default = "default_min_peers")]
    pub min_peers: usize,
    #[serde(default)]
    pub upgrade_mode: UpgradeMode,
    #[serde(default)]
    pub retry: RetrySettings,
}

fn default_min_peers() -> usize {
    2
}

/// `$GOPATH` when set, otherwise `~/go`, otherwise the current directory.
pub fn default_build_root() -> PathBuf {
    if let Some(gopath) = std::env::var_os("GOPATH").filter(|v| !v.is_empty()) {
        return PathBuf::from(gopath);
    }
    dirs::home_dir()
        .map(|home| home.join("go"))
        .unwrap_or_else(|| PathBuf::from("."))
}

// ---------------------------------------------------------------------------
// 1. Load
// ---------------------------------------------------------------------------

/// Load and validate a configuration file.
///
/// Returns `ConfigError::NotFound` if absent, `ConfigError::Parse` (with path
/// and line context) if malformed, `ConfigError::Invalid` if a field fails
/// validation.
pub fn load(path: &Path) -> Result<DeployConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    let mut config: DeployConfig =
        serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
    if let Some(base) = path.parent() {
        config.resolve_relative_to(base);
    }
    config.validate()?;
    Ok(config)
}

impl DeployConfig {
    /// Check every invariant that does not require touching the network.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require("org.name", &self.org.name)?;
        require("org.msp_id", &self.org.msp_id)?;
        require("org.admin", &self.org.admin)?;
        require("org.user", &self.org.user)?;
        require("org.orderer", &self.org.orderer)?;
        require("channel.id", &self.channel.id)?;
        require("chaincode.name", &self.chaincode.name)?;
        require("chaincode.version", &self.chaincode.version)?;
        require("chaincode.path", &self.chaincode.path)?;

        if self.channel.artifact.as_os_str().is_empty() {
            return Err(invalid("channel.artifact", "must not be empty"));
        }
        if self.min_peers == 0 {
            return Err(invalid("min_peers", "must be at least 1"));
        }
        check_policy("retry.discovery.max_attempts", &self.retry.discovery)?;
        check_policy("retry.network.max_attempts", &self.retry.network)?;
        Ok(())
    }

    /// Endorsing organizations for instantiation, defaulting to the deploying org.
    pub fn endorsing_orgs(&self) -> Vec<String> {
        self.chaincode.endorsers(&self.org.msp_id)
    }

    fn resolve_relative_to(&mut self, base: &Path) {
        resolve(&mut self.network_config, base);
        resolve(&mut self.channel.artifact, base);
        resolve(&mut self.chaincode.build_root, base);
    }
}

impl ChannelSpec {
    /// The artifact must exist before a channel-creation request is built.
    pub fn ensure_artifact(&self) -> Result<&Path, ConfigError> {
        if self.artifact.is_file() {
            Ok(&self.artifact)
        } else {
            Err(ConfigError::ArtifactMissing {
                path: self.artifact.clone(),
            })
        }
    }
}

fn require(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(invalid(field, "must not be empty"));
    }
    Ok(())
}

fn check_policy(field: &'static str, policy: &RetryPolicy) -> Result<(), ConfigError> {
    if policy.max_attempts == 0 {
        return Err(invalid(field, "must be at least 1"));
    }
    Ok(())
}

fn resolve(path: &mut PathBuf, base: &Path) {
    if path.is_relative() && !path.as_os_str().is_empty() {
        *path = base.join(&*path);
    }
}

// ---------------------------------------------------------------------------
// 2. Scaffold + save (atomic)
// ---------------------------------------------------------------------------

/// Example configuration for the `org1` / `mychannel` / `example_cc` network.
pub fn scaffold() -> DeployConfig {
    DeployConfig {
        network_config: PathBuf::from("config.yaml"),
        org: OrgIdentity {
            name: "org1".to_string(),
            msp_id: "Org1MSP".to_string(),
            admin: "Admin".to_string(),
            user: "User1".to_string(),
            orderer: "orderer.example.com".to_string(),
        },
        channel: ChannelSpec {
            id: "mychannel".to_string(),
            artifact: PathBuf::from("artifacts/channel/mychannel.tx"),
        },
        chaincode: ChaincodeSpec {
            name: "example_cc".to_string(),
            version: "0.1".to_string(),
            path: "github.com/example/chaincode".to_string(),
            build_root: default_build_root(),
            init_args: vec!["init".to_string()],
            endorsing_orgs: vec![],
        },
        min_peers: default_min_peers(),
        upgrade_mode: UpgradeMode::default(),
        retry: RetrySettings::default(),
    }
}

/// Atomically write `config` to `path`.
///
/// Write flow: serialize → `.yaml.tmp` sibling → `rename`.
pub fn save(path: &Path, config: &DeployConfig) -> Result<(), ConfigError> {
    let yaml = serde_yaml::to_string(config)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let tmp_path = PathBuf::from(format!("{}.tmp", path.display()));
    std::fs::write(&tmp_path, yaml).map_err(|e| io_err(&tmp_path, e))?;
    if let Err(e) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(io_err(path, e));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
