//! Identifier decode tool.
//!
//! Bus dumps disagree about byte order depending on which firmware
//! produced them, so the raw value is decoded under both interpretations
//! and the operator picks the one that makes sense.

use anyhow::{Context, Result};
use clap::Args;
use jaguar_protocol::ids::CanId;

#[derive(Args, Debug)]
pub struct DecodeIdCommand {
    /// Raw identifier in hex (with or without 0x prefix)
    pub raw: String,
}

pub fn parse_hex_u32(text: &str) -> Result<u32> {
    let trimmed = text.trim().trim_start_matches("0x").trim_start_matches("0X");
    u32::from_str_radix(trimmed, 16).with_context(|| format!("invalid hex identifier `{text}`"))
}

pub fn render(raw: u32) -> String {
    let host = CanId::from_raw(raw);
    let swapped = CanId::from_raw(raw.swap_bytes());
    format!(
        "as written:   {:#010x}\n  {}\nbyte-swapped: {:#010x}\n  {}",
        host.raw(),
        host,
        swapped.raw(),
        swapped,
    )
}

pub fn run(args: &DecodeIdCommand) -> Result<()> {
    let raw = parse_hex_u32(&args.raw)?;
    println!("{}", render(raw));
    Ok(())
}
