pub mod check_config;
pub mod decode_id;
pub mod flash;
pub mod watch;

use anyhow::Result;
use jaguar_driver::JaguarBridge;

/// Open the serial bridge on `port`.
#[cfg(target_os = "linux")]
pub fn open_bridge(port: &str) -> Result<JaguarBridge> {
    use jaguar_can::tty::TtySerialAdapter;

    let adapter = TtySerialAdapter::open(port)?;
    Ok(JaguarBridge::new(adapter)?)
}

#[cfg(not(target_os = "linux"))]
pub fn open_bridge(_port: &str) -> Result<JaguarBridge> {
    anyhow::bail!("the serial bridge backend is only available on Linux")
}
