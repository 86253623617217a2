//! `ccdeploy init [PATH] [--force]`

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;

use ccdeploy_core::config;

/// Write an example deployment configuration.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Where to write the configuration.
    #[arg(default_value = config::DEFAULT_CONFIG_FILE)]
    pub path: PathBuf,

    /// Overwrite an existing file.
    #[arg(long, short = 'f')]
    pub force: bool,
}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        if self.path.exists() && !self.force {
            bail!(
                "'{}' already exists; pass --force to overwrite",
                self.path.display()
            );
        }

        let scaffold = config::scaffold();
        config::save(&self.path, &scaffold)
            .with_context(|| format!("failed to write '{}'", self.path.display()))?;

        println!("✓ Wrote {}", self.path.display());
        println!(
            "  org {} ({}) | channel {} | chaincode {}",
            scaffold.org.name,
            scaffold.org.msp_id,
            scaffold.channel.id,
            scaffold.chaincode.label()
        );
        println!("  Edit it, then run `ccdeploy deploy --simulate` to rehearse.");
        Ok(())
    }
}
