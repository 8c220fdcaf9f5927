//! Remote collaborators: the ledger client, the historical block source and
//! the trace index. Implementations live outside this crate; tests use
//! in-memory fakes.

use std::collections::HashMap;

use async_trait::async_trait;
use retrace_core::{Cell, HashBytes, StdAddress};
use serde::{Deserialize, Deserializer, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::ClientError;

// ---------------------------------------------------------------------------
// Ledger types
// ---------------------------------------------------------------------------

/// Identifies a block the remote ledger can answer queries against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockRef {
    pub workchain: i32,
    pub shard: u64,
    pub seqno: u32,
    pub root_hash: HashBytes,
    pub file_hash: HashBytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastTransaction {
    pub lt: u64,
    pub hash: HashBytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteContract {
    Uninit,
    Frozen(HashBytes),
    /// Code or data may be absent even for an account reported active.
    Active {
        code: Option<Cell>,
        data: Option<Cell>,
    },
}

/// Account as reported by the remote ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAccount {
    pub balance: u128,
    pub extra_currencies: Option<Cell>,
    pub last_transaction: Option<LastTransaction>,
    pub contract: RemoteContract,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryEntry {
    pub hash: HashBytes,
    pub root: Cell,
}

/// One shard of a workchain, identified by its prefix-encoded shard id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardDescr {
    pub workchain: i32,
    pub shard: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardLayout {
    pub shards: Vec<ShardDescr>,
}

#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn reference_block(&self) -> Result<BlockRef, ClientError>;

    /// `None` when the ledger has no record of the account.
    async fn account_state(&self, address: &StdAddress, block: &BlockRef)
        -> Result<Option<RemoteAccount>, ClientError>;

    /// Returns the libraries it knows; unknown hashes are simply absent.
    async fn libraries(&self, hashes: &[HashBytes]) -> Result<Vec<LibraryEntry>, ClientError>;

    async fn send_message(&self, message: &Cell) -> Result<(), ClientError>;

    async fn shard_layout(&self, block: &BlockRef) -> Result<ShardLayout, ClientError>;

    /// Config params root at `block`.
    async fn config(&self, block: &BlockRef) -> Result<Cell, ClientError>;
}

// ---------------------------------------------------------------------------
// Historical source
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct HistoricalTx {
    pub cell: Cell,
    pub block: BlockRef,
}

/// Masterchain context a shard block was committed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockContext {
    pub mc_seqno: u32,
    pub rand_seed: HashBytes,
}

/// Archive queries needed to replay an already executed transaction.
#[async_trait]
pub trait HistoryClient: Send + Sync {
    async fn transaction(&self, address: &StdAddress, lt: u64, hash: &HashBytes)
        -> Result<HistoricalTx, ClientError>;

    async fn block_context(&self, block: &BlockRef) -> Result<BlockContext, ClientError>;

    async fn config_at(&self, mc_seqno: u32) -> Result<Cell, ClientError>;

    async fn account_at(&self, address: &StdAddress, mc_seqno: u32) -> Result<Option<RemoteAccount>, ClientError>;

    /// Transactions of `address` committed under `mc_seqno`, oldest first,
    /// ending with the transaction at `lt`.
    async fn block_transactions(&self, address: &StdAddress, lt: u64, hash: &HashBytes, mc_seqno: u32)
        -> Result<Vec<Cell>, ClientError>;
}

// ---------------------------------------------------------------------------
// Trace index
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TraceResponse {
    #[serde(default)]
    pub traces: Vec<TraceRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TraceRecord {
    #[serde(default)]
    pub trace_id: Option<String>,
    pub trace: TraceNode,
    #[serde(default)]
    pub transactions: HashMap<String, IndexedTransaction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TraceNode {
    pub tx_hash: String,
    #[serde(default)]
    pub in_msg_hash: Option<String>,
    #[serde(default)]
    pub children: Vec<TraceNode>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexedTransaction {
    /// Raw `wc:HEX` address.
    pub account: String,
    /// Base64 transaction hash.
    pub hash: String,
    #[serde(deserialize_with = "u64_from_string_or_number")]
    pub lt: u64,
    #[serde(default)]
    pub now: u32,
    #[serde(default)]
    pub mc_block_seqno: Option<u32>,
    #[serde(default)]
    pub in_msg: Option<IndexedMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexedMessage {
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub opcode: Option<String>,
    #[serde(default)]
    pub message_content: Option<MessageContent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageContent {
    /// Base64 BOC of the body.
    #[serde(default)]
    pub body: Option<String>,
}

#[async_trait]
pub trait TraceIndex: Send + Sync {
    async fn traces(&self, tx_hash: &str, cancel: &CancellationToken) -> Result<TraceResponse, ClientError>;
}

fn u64_from_string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(u64),
    }
    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
