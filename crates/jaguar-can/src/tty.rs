//! Raw termios serial backend (Linux).
//!
//! Opens the bridge's tty in raw mode and maps the `VMIN = 0` / `VTIME`
//! polling discipline onto the adapter's read-timeout contract: a read
//! that returns no bytes within the window is a
//! [`CanError::ReceiveTimeout`], which the receive loop treats as a tick.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

use nix::sys::termios::{self, BaudRate, SetArg, SpecialCharacterIndices};

use crate::{CanError, RxAdapter, SerialAdapter, SplittableAdapter, TxAdapter};

/// Serial port adapter over a raw tty.
pub struct TtySerialAdapter {
    file: File,
}

impl TtySerialAdapter {
    /// Open and configure the port at 115200 8N1, raw.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CanError> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;

        let mut tio = termios::tcgetattr(&file).map_err(std::io::Error::from)?;
        termios::cfmakeraw(&mut tio);
        termios::cfsetspeed(&mut tio, BaudRate::B115200).map_err(std::io::Error::from)?;
        // Polling read: return whatever arrived within VTIME deciseconds.
        tio.control_chars[SpecialCharacterIndices::VMIN as usize] = 0;
        tio.control_chars[SpecialCharacterIndices::VTIME as usize] = 1;
        termios::tcsetattr(&file, SetArg::TCSANOW, &tio).map_err(std::io::Error::from)?;

        Ok(Self { file })
    }

    fn apply_read_timeout(file: &File, timeout: Duration) {
        // VTIME is in tenths of a second, 1..=255.
        let deciseconds = (timeout.as_millis() / 100).clamp(1, 255) as u8;
        if let Ok(mut tio) = termios::tcgetattr(file) {
            tio.control_chars[SpecialCharacterIndices::VTIME as usize] = deciseconds;
            let _ = termios::tcsetattr(file, SetArg::TCSANOW, &tio);
        }
    }
}

fn read_with_timeout(file: &mut File, buf: &mut [u8]) -> Result<usize, CanError> {
    match file.read(buf) {
        Ok(0) => Err(CanError::ReceiveTimeout),
        Ok(n) => Ok(n),
        Err(e) => Err(CanError::Io(e)),
    }
}

impl SerialAdapter for TtySerialAdapter {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, CanError> {
        read_with_timeout(&mut self.file, buf)
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), CanError> {
        self.file.write_all(bytes)?;
        Ok(())
    }

    fn set_read_timeout(&mut self, timeout: Duration) {
        Self::apply_read_timeout(&self.file, timeout);
    }
}

/// Receive half: a duplicated descriptor of the same tty.
pub struct TtyRx {
    file: File,
}

/// Transmit half.
pub struct TtyTx {
    file: File,
}

impl RxAdapter for TtyRx {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, CanError> {
        read_with_timeout(&mut self.file, buf)
    }

    fn set_read_timeout(&mut self, timeout: Duration) {
        TtySerialAdapter::apply_read_timeout(&self.file, timeout);
    }
}

impl TxAdapter for TtyTx {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), CanError> {
        self.file.write_all(bytes)?;
        Ok(())
    }
}

impl SplittableAdapter for TtySerialAdapter {
    type Rx = TtyRx;
    type Tx = TtyTx;

    fn split(self) -> Result<(Self::Rx, Self::Tx), CanError> {
        let tx = TtyTx {
            file: self.file.try_clone()?,
        };
        Ok((TtyRx { file: self.file }, tx))
    }
}
