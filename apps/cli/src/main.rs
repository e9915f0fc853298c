//! # Jaguar CLI
//!
//! Sequential tools built on the bridge contract:
//!
//! ```bash
//! # Decode a raw identifier under both byte orders
//! jaguar-cli decode-id 0x02051042
//!
//! # Reflash a bricked controller through the bootloader
//! jaguar-cli flash --port /dev/ttyUSB0 firmware.bin --start-addr 0x800
//!
//! # Dump live bus traffic until Ctrl-C
//! jaguar-cli watch --port /dev/ttyUSB0
//!
//! # Validate a drive configuration file
//! jaguar-cli check-config drive.toml
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::check_config::CheckConfigCommand;
use commands::decode_id::DecodeIdCommand;
use commands::flash::FlashCommand;
use commands::watch::WatchCommand;

/// Command-line tools for Jaguar motor controllers.
#[derive(Parser, Debug)]
#[command(name = "jaguar-cli")]
#[command(about = "Command-line tools for Jaguar motor controllers", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Decode a raw hex identifier under both byte orders
    DecodeId(DecodeIdCommand),

    /// Flash firmware through the bootloader handshake
    Flash(FlashCommand),

    /// Subscribe to bus traffic and hex-dump it until Ctrl-C
    Watch(WatchCommand),

    /// Validate a drive settings TOML file
    CheckConfig(CheckConfigCommand),
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("jaguar_cli=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::DecodeId(args) => commands::decode_id::run(&args),
        Commands::Flash(args) => commands::flash::run(&args),
        Commands::Watch(args) => commands::watch::run(&args),
        Commands::CheckConfig(args) => commands::check_config::run(&args),
    }
}
