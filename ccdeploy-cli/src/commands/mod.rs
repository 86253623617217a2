pub mod deploy;
pub mod init;
pub mod inspect;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use ccdeploy_core::{config, DeployConfig};
use ccdeploy_engine::memory::Call;
use ccdeploy_engine::InMemoryNetwork;

use crate::gateway::GatewayConnector;

/// Which network to act on, shared by `deploy` and `inspect`.
#[derive(Args, Debug)]
pub struct TargetArgs {
    /// Deployment configuration file.
    #[arg(long, short = 'c', default_value = config::DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Base URL of the ledger admin gateway (e.g. http://localhost:7080).
    #[arg(long, value_name = "URL", required_unless_present = "simulate")]
    pub gateway: Option<String>,

    /// Rehearse against an in-memory network seeded with `min_peers` peers.
    #[arg(long, conflicts_with = "gateway")]
    pub simulate: bool,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

pub enum Backend {
    Gateway(GatewayConnector),
    Simulated(InMemoryNetwork),
}

impl TargetArgs {
    pub fn load_config(&self) -> Result<DeployConfig> {
        config::load(&self.config).with_context(|| {
            format!(
                "failed to load '{}' — run `ccdeploy init` first",
                self.config.display()
            )
        })
    }

    pub fn backend(&self, config: &DeployConfig) -> Backend {
        match &self.gateway {
            Some(url) if !self.simulate => Backend::Gateway(GatewayConnector::new(url)),
            _ => Backend::Simulated(InMemoryNetwork::rehearsal(config)),
        }
    }
}

/// One-line description of a recorded write, for rehearsal output.
pub fn describe_write(call: &Call) -> String {
    match call {
        Call::CreateChannel { channel_id, orderer } => {
            format!("create channel '{channel_id}' via {orderer}")
        }
        Call::JoinChannel { channel_id, orderer } => {
            format!("join channel '{channel_id}' via {orderer}")
        }
        Call::Install {
            chaincode, targets, ..
        } => format!(
            "install {}:{} on {}",
            chaincode.name,
            chaincode.version,
            targets.join(", ")
        ),
        Call::Upgrade {
            channel_id,
            chaincode,
            policy,
        } => format!(
            "upgrade {}:{} on '{channel_id}' ({policy})",
            chaincode.name, chaincode.version
        ),
        Call::Instantiate {
            channel_id,
            chaincode,
            init_args,
            policy,
        } => format!(
            "instantiate {}:{} on '{channel_id}' with args [{}] ({policy})",
            chaincode.name,
            chaincode.version,
            init_args.join(", ")
        ),
        other => format!("{other:?}"),
    }
}
