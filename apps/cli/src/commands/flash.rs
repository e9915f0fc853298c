//! Firmware flashing through the bootloader.
//!
//! The handshake: ping on a short timed-block loop until the bootloader
//! answers, negotiate the base address and image size, then stream the
//! image in 8-byte chunks, each acknowledged before the next is sent.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Args;
use jaguar_driver::{DriverError, JaguarBridge};
use jaguar_protocol::CanMessage;
use jaguar_protocol::ids::{DeviceType, Manufacturer, firmware_update, pack_id};
use tracing::info;

use super::open_bridge;
use crate::commands::decode_id::parse_hex_u32;

const PING_TIMEOUT: Duration = Duration::from_millis(50);
const PING_ATTEMPTS: usize = 100;
const ACK_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Args, Debug)]
pub struct FlashCommand {
    /// Serial port of the bridge
    #[arg(short, long)]
    pub port: String,

    /// Raw firmware image
    pub firmware: PathBuf,

    /// Flash base address, hex
    #[arg(long, value_parser = parse_hex_u32)]
    pub start_addr: u32,
}

fn update_id(api: u16) -> u32 {
    pack_id(
        0,
        Manufacturer::TexasInstruments,
        DeviceType::FirmwareUpdate,
        api,
    )
}

fn send_acked(bridge: &JaguarBridge, api: u16, payload: &[u8]) -> Result<()> {
    let ack = bridge.recv(update_id(firmware_update::ACK), 0)?;
    bridge.send(&CanMessage::new(update_id(api), payload))?;
    ack.block_for(ACK_TIMEOUT)
        .context("bootloader did not acknowledge")?;
    Ok(())
}

pub fn run(args: &FlashCommand) -> Result<()> {
    let firmware = std::fs::read(&args.firmware)
        .with_context(|| format!("cannot read firmware image {}", args.firmware.display()))?;
    if firmware.is_empty() {
        bail!("firmware image is empty");
    }

    let bridge = open_bridge(&args.port)?;
    info!(
        bytes = firmware.len(),
        start_addr = args.start_addr,
        "starting firmware download"
    );

    // The bootloader only listens for a short window after reset, so
    // ping until it answers.
    let pong = bridge.recv(update_id(firmware_update::PING), 0)?;
    let mut answered = false;
    for _ in 0..PING_ATTEMPTS {
        bridge.send(&CanMessage::new(update_id(firmware_update::PING), &[]))?;
        print!("p");
        std::io::stdout().flush()?;
        match pong.block_for(PING_TIMEOUT) {
            Ok(_) => {
                answered = true;
                break;
            }
            Err(DriverError::Timeout) => continue,
            Err(e) => return Err(e.into()),
        }
    }
    if !answered {
        bail!("bootloader did not answer {PING_ATTEMPTS} pings; power-cycle the controller and retry");
    }
    println!();

    // Base address and size, little-endian dwords.
    let mut prepare = [0u8; 8];
    prepare[..4].copy_from_slice(&args.start_addr.to_le_bytes());
    prepare[4..].copy_from_slice(&(firmware.len() as u32).to_le_bytes());
    send_acked(&bridge, firmware_update::DOWNLOAD, &prepare)?;

    let total = firmware.chunks(8).len();
    for (i, chunk) in firmware.chunks(8).enumerate() {
        send_acked(&bridge, firmware_update::SEND_DATA, chunk)
            .with_context(|| format!("while sending chunk {} of {total}", i + 1))?;
        if (i + 1) % 64 == 0 || i + 1 == total {
            print!("\r{}/{total} chunks", i + 1);
            std::io::stdout().flush()?;
        }
    }
    println!("\nprogramming complete");
    Ok(())
}
