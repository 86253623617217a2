//! `ccdeploy inspect` — read-only view of channel and chaincode state.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use ccdeploy_core::DeployConfig;
use ccdeploy_engine::{
    ChaincodeInspector, ChannelProvisioner, LedgerConnector, NetworkSession, PeerInstall,
    ThreadSleeper,
};

use super::{Backend, TargetArgs};

/// Arguments for `ccdeploy inspect`.
#[derive(Args, Debug)]
pub struct InspectArgs {
    #[command(flatten)]
    pub target: TargetArgs,
}

#[derive(Debug, Serialize)]
struct PeerRow {
    peer: String,
    joined: Option<bool>,
    installed: PeerInstall,
}

#[derive(Debug, Serialize)]
struct Inspection {
    org: String,
    channel: String,
    chaincode: String,
    endorsing_orgs: Vec<String>,
    peers: Vec<PeerRow>,
    /// `None` when no peer has joined the channel yet.
    instantiated: Option<bool>,
}

#[derive(Tabled)]
struct PeerTableRow {
    #[tabled(rename = "peer")]
    peer: String,
    #[tabled(rename = "channel")]
    channel: String,
    #[tabled(rename = "chaincode")]
    chaincode: String,
}

impl InspectArgs {
    pub fn run(self) -> Result<()> {
        let config = self.target.load_config()?;
        let inspection = match self.target.backend(&config) {
            Backend::Gateway(connector) => inspect_with(&connector, &config)?,
            Backend::Simulated(network) => inspect_with(&network, &config)?,
        };

        if self.target.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&inspection)
                    .context("failed to serialize inspection")?
            );
            return Ok(());
        }
        print_table(&inspection);
        Ok(())
    }
}

fn inspect_with<C: LedgerConnector>(connector: &C, config: &DeployConfig) -> Result<Inspection> {
    let session = NetworkSession::open(connector, config, Box::new(ThreadSleeper))
        .context("failed to open network session")?;
    let spec = &config.chaincode;

    let membership = ChannelProvisioner::new(&session, config.min_peers)
        .membership(&config.channel.id, &config.org)
        .context("failed to query channel membership")?;
    let inspector = ChaincodeInspector::new(&session, config.min_peers);
    let install = inspector
        .installation(&config.org.name, spec)
        .context("failed to query installed chaincodes")?;

    let instantiated = if membership.iter().any(|m| m.joined == Some(true)) {
        Some(
            inspector
                .is_instantiated(&config.channel.id, spec)
                .context("failed to query instantiated chaincodes")?,
        )
    } else {
        None
    };

    let peers = membership
        .into_iter()
        .map(|m| {
            let installed = install
                .peers
                .iter()
                .find(|p| p.peer == m.peer)
                .map(|p| p.status.clone())
                .unwrap_or(PeerInstall::Missing);
            PeerRow {
                peer: m.peer.url,
                joined: m.joined,
                installed,
            }
        })
        .collect();

    Ok(Inspection {
        org: format!("{} ({})", config.org.name, config.org.msp_id),
        channel: config.channel.id.clone(),
        chaincode: spec.label(),
        endorsing_orgs: config.endorsing_orgs(),
        peers,
        instantiated,
    })
}

fn print_table(inspection: &Inspection) {
    println!(
        "{} | channel {} | chaincode {}",
        inspection.org.bold(),
        inspection.channel,
        inspection.chaincode
    );

    let rows: Vec<PeerTableRow> = inspection
        .peers
        .iter()
        .map(|row| PeerTableRow {
            peer: row.peer.clone(),
            channel: match row.joined {
                Some(true) => "joined".green().to_string(),
                Some(false) => "not joined".yellow().to_string(),
                None => "unreachable".red().to_string(),
            },
            chaincode: match &row.installed {
                PeerInstall::Installed => "installed".green().to_string(),
                PeerInstall::Missing => "missing".yellow().to_string(),
                PeerInstall::QueryFailed(reason) => format!("{} ({reason})", "unknown".red()),
            },
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    let instantiated = match inspection.instantiated {
        Some(true) => "instantiated".green().to_string(),
        Some(false) => "not instantiated".yellow().to_string(),
        None => "channel not joined".bright_black().to_string(),
    };
    println!(
        "{} on {}: {}",
        inspection.chaincode, inspection.channel, instantiated
    );
    println!("endorsement: any member of [{}]", inspection.endorsing_orgs.join(", "));
}
