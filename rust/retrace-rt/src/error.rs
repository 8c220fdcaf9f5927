//! Error taxonomy for emulation and trace reconstruction.
//!
//! Expected VM outcomes (non-zero exit codes, aborted phases) are data on the
//! transaction and never appear here. These types cover faults that stop a
//! request: remote failures, malformed emulator output, cancellation.

use retrace_core::{CellError, StdAddress};
use thiserror::Error;

/// Failures talking to the remote ledger or trace index.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("remote returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("request cancelled")]
    Cancelled,

    #[error(transparent)]
    Cell(#[from] CellError),
}

/// Failures crossing the compute module boundary.
#[derive(Debug, Error)]
pub enum VmError {
    #[error("compute module call failed: {0}")]
    Module(String),

    #[error("malformed emulator response: {0}")]
    MalformedResponse(String),

    #[error("emulator reported failure: {0}")]
    Failed(String),

    #[error(transparent)]
    Cell(#[from] CellError),
}

#[derive(Debug, Error)]
pub enum EmulationError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Vm(#[from] VmError),

    #[error(transparent)]
    Cell(#[from] CellError),

    #[error("message to {address} rejected: {error}")]
    Rejected {
        address: StdAddress,
        error: String,
        exit_code: Option<i32>,
        vm_log: String,
    },

    #[error("account {0} is not active")]
    NotActive(StdAddress),

    #[error("get-method {method} exited with {exit_code}")]
    GetMethod { method: String, exit_code: i32 },

    #[error("library resolution did not converge after {0} restarts")]
    RestartLimit(usize),

    #[error("emulation cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("No trace data found for {0}")]
    NoTrace(String),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Emulation(#[from] EmulationError),

    #[error("trace reconstruction cancelled")]
    Cancelled,
}

impl EmulationError {
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            EmulationError::Cancelled | EmulationError::Client(ClientError::Cancelled)
        )
    }
}
