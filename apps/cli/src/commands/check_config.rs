//! Drive settings file validation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use jaguar_client::DriveSettings;

#[derive(Args, Debug)]
pub struct CheckConfigCommand {
    /// Drive settings TOML file
    pub path: PathBuf,
}

pub fn load(text: &str) -> Result<DriveSettings> {
    let settings: DriveSettings = toml::from_str(text).context("malformed drive settings")?;
    settings
        .validate()
        .map_err(|reason| anyhow::anyhow!("invalid drive settings: {reason}"))?;
    Ok(settings)
}

pub fn run(args: &CheckConfigCommand) -> Result<()> {
    let text = std::fs::read_to_string(&args.path)
        .with_context(|| format!("cannot read {}", args.path.display()))?;
    let settings = load(&text)?;
    println!(
        "ok: wheels {} and {}, wheel circumference {:.4} m, status every {} ms",
        settings.left_id,
        settings.right_id,
        settings.wheel_circumference(),
        settings.status_period_ms,
    );
    Ok(())
}
