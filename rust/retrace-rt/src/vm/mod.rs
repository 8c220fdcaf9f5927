//! Request/response boundary around the opaque compute module.
//!
//! The module speaks strings only: cells travel as base64 BOCs, integers as
//! decimal strings and parameters as JSON. Results come back as JSON in which
//! `success: false` is an ordinary outcome while a module-level `fail` or an
//! unparseable payload is fatal.

mod pool;

pub use pool::{ArgPool, PooledString};

use std::sync::Arc;

use base64::Engine;
use parking_lot::Mutex;
use retrace_core::stack::{parse_stack, serialize_stack};
use retrace_core::{Boc, Cell, HashBytes, StackEntry, StdAddress};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::VmError;

// ---------------------------------------------------------------------------
// Verbosity
// ---------------------------------------------------------------------------

/// VM log verbosity, ordered from terse to the level that dumps full stacks.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Verbosity {
    Short = 0,
    #[default]
    Full = 1,
    FullLocation = 2,
    FullLocationGas = 3,
    FullLocationStack = 4,
    FullLocationStackVerbose = 5,
}

impl Verbosity {
    pub fn level(self) -> i32 {
        self as i32
    }
}

// ---------------------------------------------------------------------------
// Compute module contract
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EmulatorHandle(pub u64);

/// The external VM engine. Every result is a JSON string.
pub trait ComputeModule: Send + Sync {
    fn create_emulator(&self, config: &str, verbosity: i32) -> Result<EmulatorHandle, VmError>;

    fn destroy_emulator(&self, handle: EmulatorHandle);

    /// Runs one transaction. `message` is `None` for tick-tock runs.
    fn emulate(
        &self,
        handle: EmulatorHandle,
        libs: Option<&str>,
        shard_account: &str,
        message: Option<&str>,
        params: &str,
    ) -> Result<String, VmError>;

    fn run_get_method(&self, params: &str, stack: &str, config: &str) -> Result<String, VmError>;
}

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

/// Inputs shared by message and tick-tock emulation.
#[derive(Debug, Clone)]
pub struct EmulationArgs<'a> {
    /// Base64 BOC of the config params.
    pub config: &'a str,
    pub libs: Option<&'a Cell>,
    pub verbosity: Verbosity,
    /// Base64 BOC of the `ShardAccount`.
    pub shard_account: &'a str,
    pub now: u32,
    pub lt: u64,
    pub rand_seed: Option<HashBytes>,
    pub ignore_chksig: bool,
    pub debug_enabled: bool,
}

#[derive(Debug, Clone)]
pub struct GetMethodArgs<'a> {
    pub config: &'a str,
    pub libs: Option<&'a Cell>,
    pub verbosity: Verbosity,
    pub code: &'a Cell,
    pub data: &'a Cell,
    pub address: StdAddress,
    pub method_id: u32,
    pub stack: &'a [StackEntry],
    pub unixtime: u32,
    pub balance: u128,
    pub rand_seed: HashBytes,
    pub gas_limit: u64,
    pub debug_enabled: bool,
}

#[derive(Serialize)]
struct EmulationParams {
    utime: u32,
    lt: String,
    rand_seed: String,
    ignore_chksig: bool,
    debug_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_tick_tock: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_tock: Option<bool>,
}

#[derive(Serialize)]
struct GetMethodParams<'a> {
    code: &'a str,
    data: &'a str,
    verbosity: i32,
    libs: &'a str,
    address: String,
    unixtime: u32,
    balance: String,
    rand_seed: String,
    gas_limit: String,
    method_id: u32,
    debug_enabled: bool,
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct EmulationSuccess {
    pub transaction: Cell,
    /// Base64 BOC of the account after the transaction.
    pub shard_account: String,
    pub vm_log: String,
    pub actions: Option<String>,
    pub logs: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmulationFailure {
    pub error: String,
    pub external_not_accepted: bool,
    pub vm_log: Option<String>,
    pub vm_exit_code: Option<i32>,
    pub logs: String,
}

#[derive(Debug, Clone)]
pub enum EmulationOutcome {
    Success(EmulationSuccess),
    Failure(EmulationFailure),
}

#[derive(Debug, Clone)]
pub enum GetMethodOutcome {
    Success {
        stack: Vec<StackEntry>,
        exit_code: i32,
        gas_used: u64,
        vm_log: String,
        missing_library: Option<HashBytes>,
        logs: String,
    },
    Failure {
        error: String,
        logs: String,
    },
}

#[derive(Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    fail: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    logs: String,
    output: Option<T>,
}

#[derive(Deserialize)]
struct EmulationOutput {
    success: bool,
    #[serde(default)]
    transaction: Option<String>,
    #[serde(default)]
    shard_account: Option<String>,
    #[serde(default)]
    vm_log: Option<String>,
    #[serde(default)]
    actions: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    external_not_accepted: bool,
    #[serde(default)]
    vm_exit_code: Option<i32>,
}

#[derive(Deserialize)]
struct GetMethodOutput {
    success: bool,
    #[serde(default)]
    stack: Option<String>,
    #[serde(default)]
    gas_used: Option<String>,
    #[serde(default)]
    vm_exit_code: Option<i32>,
    #[serde(default)]
    vm_log: Option<String>,
    #[serde(default)]
    missing_library: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

fn open_envelope<T: for<'de> Deserialize<'de>>(raw: &str) -> Result<(T, String), VmError> {
    let envelope: Envelope<T> =
        serde_json::from_str(raw).map_err(|e| VmError::MalformedResponse(e.to_string()))?;
    if envelope.fail {
        return Err(VmError::Failed(
            envelope.message.unwrap_or_else(|| "unknown emulation error".to_string()),
        ));
    }
    let output = envelope
        .output
        .ok_or_else(|| VmError::MalformedResponse("missing output".into()))?;
    Ok((output, envelope.logs))
}

fn parse_emulation(raw: &str) -> Result<EmulationOutcome, VmError> {
    let (out, logs) = open_envelope::<EmulationOutput>(raw)?;
    if !out.success {
        return Ok(EmulationOutcome::Failure(EmulationFailure {
            error: out.error.unwrap_or_default(),
            external_not_accepted: out.external_not_accepted,
            vm_log: out.vm_log,
            vm_exit_code: out.vm_exit_code,
            logs,
        }));
    }
    let tx_b64 = out
        .transaction
        .ok_or_else(|| VmError::MalformedResponse("success without transaction".into()))?;
    let shard_account = out
        .shard_account
        .ok_or_else(|| VmError::MalformedResponse("success without shard_account".into()))?;
    let transaction = Boc::decode_base64(&tx_b64)?;
    Ok(EmulationOutcome::Success(EmulationSuccess {
        transaction,
        shard_account,
        vm_log: out.vm_log.unwrap_or_default(),
        actions: out.actions,
        logs,
    }))
}

fn parse_get_method(raw: &str) -> Result<GetMethodOutcome, VmError> {
    let (out, logs) = open_envelope::<GetMethodOutput>(raw)?;
    if !out.success {
        return Ok(GetMethodOutcome::Failure {
            error: out.error.unwrap_or_default(),
            logs,
        });
    }
    let stack_b64 = out
        .stack
        .ok_or_else(|| VmError::MalformedResponse("success without stack".into()))?;
    let stack = parse_stack(&Boc::decode_base64(&stack_b64)?)?;
    let gas_used = match out.gas_used {
        Some(text) => text
            .parse()
            .map_err(|_| VmError::MalformedResponse(format!("gas_used '{text}'")))?,
        None => 0,
    };
    let missing_library = match out.missing_library.filter(|s| !s.is_empty()) {
        Some(hex) => Some(hex.parse()?),
        None => None,
    };
    Ok(GetMethodOutcome::Success {
        stack,
        exit_code: out.vm_exit_code.unwrap_or(0),
        gas_used,
        vm_log: out.vm_log.unwrap_or_default(),
        missing_library,
        logs,
    })
}

// ---------------------------------------------------------------------------
// VmBoundary
// ---------------------------------------------------------------------------

struct EmulatorSlot {
    handle: EmulatorHandle,
    config: String,
    verbosity: Verbosity,
}

/// Owns one emulator handle at a time, recreated whenever the config or
/// verbosity changes, and serializes access to it.
pub struct VmBoundary {
    module: Arc<dyn ComputeModule>,
    slot: Mutex<Option<EmulatorSlot>>,
    pool: ArgPool,
}

impl VmBoundary {
    pub fn new(module: Arc<dyn ComputeModule>) -> Self {
        Self {
            module,
            slot: Mutex::new(None),
            pool: ArgPool::new(),
        }
    }

    pub fn pool(&self) -> &ArgPool {
        &self.pool
    }

    fn encode_cell(&self, cell: &Cell) -> PooledString<'_> {
        let bytes = Boc::encode(cell);
        let mut buf = self.pool.take(bytes.len().div_ceil(3) * 4);
        base64::engine::general_purpose::STANDARD.encode_string(&bytes, &mut buf);
        buf
    }

    pub fn run_transaction(&self, args: &EmulationArgs<'_>, message: &Cell) -> Result<EmulationOutcome, VmError> {
        self.emulate(args, Some(message), None)
    }

    pub fn run_tick_tock(&self, args: &EmulationArgs<'_>, is_tock: bool) -> Result<EmulationOutcome, VmError> {
        self.emulate(args, None, Some(is_tock))
    }

    fn emulate(
        &self,
        args: &EmulationArgs<'_>,
        message: Option<&Cell>,
        tick_tock: Option<bool>,
    ) -> Result<EmulationOutcome, VmError> {
        let params = EmulationParams {
            utime: args.now,
            lt: args.lt.to_string(),
            rand_seed: args.rand_seed.map(|s| s.to_hex()).unwrap_or_default(),
            ignore_chksig: args.ignore_chksig,
            debug_enabled: args.debug_enabled,
            is_tick_tock: tick_tock.map(|_| true),
            is_tock: tick_tock,
        };
        let params = serde_json::to_string(&params).map_err(|e| VmError::Module(format!("cannot encode params: {e}")))?;

        let libs = args.libs.map(|l| self.encode_cell(l));
        let message = message.map(|m| self.encode_cell(m));

        let mut slot = self.slot.lock();
        let handle = self.ensure_emulator(&mut slot, args.config, args.verbosity)?;
        trace!(lt = args.lt, tick_tock = ?tick_tock, "emulate");
        let raw = self.module.emulate(
            handle,
            libs.as_deref().map(String::as_str),
            args.shard_account,
            message.as_deref().map(String::as_str),
            &params,
        )?;
        drop(slot);
        parse_emulation(&raw)
    }

    pub fn run_get_method(&self, args: &GetMethodArgs<'_>) -> Result<GetMethodOutcome, VmError> {
        let code = self.encode_cell(args.code);
        let data = self.encode_cell(args.data);
        let libs = args.libs.map(|l| self.encode_cell(l));
        let params = GetMethodParams {
            code: &code,
            data: &data,
            verbosity: args.verbosity.level(),
            libs: libs.as_deref().map(String::as_str).unwrap_or(""),
            address: args.address.to_raw(),
            unixtime: args.unixtime,
            balance: args.balance.to_string(),
            rand_seed: args.rand_seed.to_hex(),
            gas_limit: args.gas_limit.to_string(),
            method_id: args.method_id,
            debug_enabled: args.debug_enabled,
        };
        let params = serde_json::to_string(&params).map_err(|e| VmError::Module(format!("cannot encode params: {e}")))?;
        let stack = self.encode_cell(&serialize_stack(args.stack)?);
        debug!(address = %args.address, method_id = args.method_id, "run get-method");
        let raw = self.module.run_get_method(&params, &stack, args.config)?;
        parse_get_method(&raw)
    }

    fn ensure_emulator(
        &self,
        slot: &mut Option<EmulatorSlot>,
        config: &str,
        verbosity: Verbosity,
    ) -> Result<EmulatorHandle, VmError> {
        if let Some(current) = slot.as_ref() {
            if current.verbosity == verbosity && current.config == config {
                return Ok(current.handle);
            }
        }
        if let Some(old) = slot.take() {
            debug!(handle = old.handle.0, "destroying emulator");
            self.module.destroy_emulator(old.handle);
        }
        let handle = self.module.create_emulator(config, verbosity.level())?;
        debug!(handle = handle.0, %verbosity, "created emulator");
        *slot = Some(EmulatorSlot {
            handle,
            config: config.to_string(),
            verbosity,
        });
        Ok(handle)
    }
}

impl Drop for VmBoundary {
    fn drop(&mut self) {
        if let Some(old) = self.slot.get_mut().take() {
            self.module.destroy_emulator(old.handle);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
