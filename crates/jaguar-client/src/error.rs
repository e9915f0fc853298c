//! Client layer error types.

use jaguar_driver::DriverError;
use thiserror::Error;

/// Errors surfaced by the device API and drive controller.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Propagated bridge/transport failure.
    #[error("driver error: {0}")]
    Driver(#[from] DriverError),

    /// A command/ack round-trip failed. The step name identifies which
    /// command failed first (during bring-up, the failing init step).
    #[error("command step `{step}` was not acknowledged: {source}")]
    Ack {
        step: &'static str,
        #[source]
        source: DriverError,
    },

    /// Rejected settings or device addressing.
    #[error("invalid configuration: {0}")]
    Config(String),
}
