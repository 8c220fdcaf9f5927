//! Best-effort decoding of inbound message bodies.
//!
//! Full ABI decoding is pluggable through [`MessageDecoder`]; the built-in
//! [`OpcodeDecoder`] only understands the jetton operations the session
//! enriches with wallet data.

use retrace_core::{Cell, CellResult, CellSlice, MsgAddress};
use serde::Serialize;
use serde_json::{json, Value};

/// A decoded message body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedInternal {
    /// Schema name, e.g. `jetton_transfer`.
    pub internal: String,
    pub opcode: u32,
    pub data: Value,
}

impl ParsedInternal {
    pub fn jetton_op(&self) -> Option<JettonOp> {
        self.internal.parse().ok()
    }
}

pub trait MessageDecoder: Send + Sync {
    /// `None` when the body is not recognised. Must not panic on garbage.
    fn decode(&self, body: &Cell) -> Option<ParsedInternal>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum JettonOp {
    JettonTransfer,
    JettonInternalTransfer,
    JettonBurn,
    JettonMint,
}

impl JettonOp {
    pub fn opcode(self) -> u32 {
        match self {
            JettonOp::JettonTransfer => 0x0f8a_7ea5,
            JettonOp::JettonInternalTransfer => 0x178d_4519,
            JettonOp::JettonBurn => 0x595f_07bc,
            JettonOp::JettonMint => 0x642b_7d07,
        }
    }

    pub fn from_opcode(opcode: u32) -> Option<Self> {
        [
            JettonOp::JettonTransfer,
            JettonOp::JettonInternalTransfer,
            JettonOp::JettonBurn,
            JettonOp::JettonMint,
        ]
        .into_iter()
        .find(|op| op.opcode() == opcode)
    }
}

/// Recognises jetton operations by their 32-bit opcode.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpcodeDecoder;

fn address_json(address: &MsgAddress) -> Value {
    match address {
        MsgAddress::None => Value::Null,
        MsgAddress::Std(std) => Value::String(std.to_raw()),
        MsgAddress::External { bits, .. } => json!({ "external_bits": bits }),
    }
}

fn decode_fields(op: JettonOp, s: &mut CellSlice<'_>) -> CellResult<Value> {
    let query_id = s.load_u64()?;
    Ok(match op {
        JettonOp::JettonTransfer => {
            let amount = s.load_coins()?;
            let destination = MsgAddress::load(s)?;
            let response_destination = MsgAddress::load(s)?;
            json!({
                "query_id": query_id.to_string(),
                "amount": amount.to_string(),
                "destination": address_json(&destination),
                "response_destination": address_json(&response_destination),
            })
        }
        JettonOp::JettonInternalTransfer => {
            let amount = s.load_coins()?;
            let from = MsgAddress::load(s)?;
            let response_address = MsgAddress::load(s)?;
            json!({
                "query_id": query_id.to_string(),
                "amount": amount.to_string(),
                "from": address_json(&from),
                "response_address": address_json(&response_address),
            })
        }
        JettonOp::JettonBurn => {
            let amount = s.load_coins()?;
            let response_destination = MsgAddress::load(s)?;
            json!({
                "query_id": query_id.to_string(),
                "amount": amount.to_string(),
                "response_destination": address_json(&response_destination),
            })
        }
        JettonOp::JettonMint => {
            let to_address = MsgAddress::load(s)?;
            json!({
                "query_id": query_id.to_string(),
                "to_address": address_json(&to_address),
            })
        }
    })
}

impl MessageDecoder for OpcodeDecoder {
    fn decode(&self, body: &Cell) -> Option<ParsedInternal> {
        let mut s = body.parse();
        let opcode = s.load_u32().ok()?;
        let op = JettonOp::from_opcode(opcode)?;
        // A recognised opcode with a truncated payload still identifies the
        // operation.
        let data = decode_fields(op, &mut s).unwrap_or(Value::Null);
        Some(ParsedInternal {
            internal: op.to_string(),
            opcode,
            data,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
