//! Live bus dump.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use jaguar_protocol::CanMessage;
use jaguar_protocol::ids::CanId;

use super::open_bridge;
use crate::commands::decode_id::parse_hex_u32;

#[derive(Args, Debug)]
pub struct WatchCommand {
    /// Serial port of the bridge
    #[arg(short, long)]
    pub port: String,

    /// Only show this identifier (hex); all traffic when omitted
    #[arg(long, value_parser = parse_hex_u32)]
    pub id: Option<u32>,
}

pub fn format_message(msg: &CanMessage) -> String {
    format!(
        "{:#010x} [{}] {}",
        msg.id,
        CanId::from_raw(msg.id),
        hex::encode(msg.payload()),
    )
}

pub fn run(args: &WatchCommand) -> Result<()> {
    let bridge = open_bridge(&args.port)?;

    let running = Arc::new(AtomicBool::new(true));
    let running_handler = Arc::clone(&running);
    ctrlc::set_handler(move || running_handler.store(false, Ordering::Relaxed))?;

    let print = |msg: &CanMessage| println!("{}", format_message(msg));
    match args.id {
        Some(id) => bridge.subscribe(id, print),
        None => bridge.subscribe_all(print),
    }

    while running.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(50));
    }
    Ok(())
}
