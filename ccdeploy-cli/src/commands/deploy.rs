//! `ccdeploy deploy` — provision the channel and reconcile the chaincode.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use serde::Serialize;

use ccdeploy_core::types::{ChannelStatus, DeploymentOutcome, DeploymentReport};
use ccdeploy_core::DeployConfig;
use ccdeploy_engine::{
    DeploymentOrchestrator, DirectoryPackager, LedgerConnector, ThreadSleeper,
};

use super::{describe_write, Backend, TargetArgs};

/// Arguments for `ccdeploy deploy`.
#[derive(Args, Debug)]
pub struct DeployArgs {
    #[command(flatten)]
    pub target: TargetArgs,
}

#[derive(Serialize)]
struct DeployJson {
    #[serde(flatten)]
    report: DeploymentReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    rehearsal: Option<Vec<String>>,
}

impl DeployArgs {
    pub fn run(self) -> Result<()> {
        let config = self.target.load_config()?;

        let (report, rehearsal) = match self.target.backend(&config) {
            Backend::Gateway(connector) => (deploy_with(&connector, config)?, None),
            Backend::Simulated(network) => {
                let report = deploy_with(&network, config)?;
                let writes = network.writes().iter().map(describe_write).collect();
                (report, Some(writes))
            }
        };

        if self.target.json {
            let payload = DeployJson { report, rehearsal };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to serialize report")?
            );
            return Ok(());
        }

        print_report(&report, rehearsal.as_deref());
        Ok(())
    }
}

fn deploy_with<C: LedgerConnector>(connector: &C, config: DeployConfig) -> Result<DeploymentReport> {
    let spec = config.chaincode.clone();
    let channel = config.channel.id.clone();

    let mut orchestrator =
        DeploymentOrchestrator::initialize(config, connector, Box::new(ThreadSleeper))
            .with_context(|| format!("failed to provision channel '{channel}'"))?;
    orchestrator
        .deploy(&spec, &DirectoryPackager)
        .with_context(|| format!("failed to deploy {}", spec.label()))
}

fn print_report(report: &DeploymentReport, rehearsal: Option<&[String]>) {
    if rehearsal.is_some() {
        println!("{}", "Rehearsal against an in-memory network".yellow().bold());
    }

    let channel = match &report.channel {
        ChannelStatus::AlreadyJoined => "already joined".to_string(),
        ChannelStatus::Created { tx_id } => format!("created and joined (tx {tx_id})"),
    };
    println!("channel   {} {}", report.channel_id.bold(), channel);

    let outcome = match &report.outcome {
        DeploymentOutcome::AlreadyInstantiated => report.outcome.to_string().bright_black(),
        DeploymentOutcome::Installed => report.outcome.to_string().cyan(),
        DeploymentOutcome::Upgraded { .. } | DeploymentOutcome::Instantiated { .. } => {
            report.outcome.to_string().green()
        }
    };
    println!(
        "chaincode {}:{} {}",
        report.chaincode.name.bold(),
        report.chaincode.version,
        outcome
    );

    println!(
        "started   {} ({})",
        report.started_at.to_rfc3339(),
        format_elapsed(report.started_at, report.finished_at)
    );

    if let Some(writes) = rehearsal {
        println!();
        if writes.is_empty() {
            println!("No writes would be made.");
        } else {
            println!("Writes a live run would make:");
            for (i, write) in writes.iter().enumerate() {
                println!("  {}. {write}", i + 1);
            }
        }
    }
}

/// Wall-clock time between two report timestamps, e.g. `850 ms` or `2.4 s`.
fn format_elapsed(started: DateTime<Utc>, finished: DateTime<Utc>) -> String {
    let ms = finished.signed_duration_since(started).num_milliseconds().max(0);
    if ms < 1_000 {
        format!("{ms} ms")
    } else {
        format!("{:.1} s", ms as f64 / 1_000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn elapsed_switches_to_seconds() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        assert_eq!(format_elapsed(start, start + Duration::milliseconds(850)), "850 ms");
        assert_eq!(format_elapsed(start, start + Duration::milliseconds(2_400)), "2.4 s");
    }

    #[test]
    fn elapsed_never_negative() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        assert_eq!(format_elapsed(start, start - Duration::seconds(1)), "0 ms");
    }
}
