//! Transactions as presented to callers: decoded, annotated and linked into a
//! tree by index.

use retrace_core::tlb::{Message, Transaction};
use retrace_core::{Cell, CellResult, HashBytes, StdAddress};

use crate::decode::ParsedInternal;
use crate::jetton::JettonWalletData;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputeSummary {
    /// `None` when the compute phase was skipped.
    pub exit_code: Option<i32>,
    pub vm_log: String,
}

#[derive(Debug, Clone)]
pub struct EmulatedTransaction {
    pub hash: HashBytes,
    pub address: StdAddress,
    pub lt: u64,
    pub now: u32,
    pub in_message: Option<Message>,
    pub out_messages: Vec<Message>,
    pub compute: ComputeSummary,
    pub transaction: Transaction,
    pub cell: Cell,
    /// Index of the parent in the owning list.
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    pub shard: Option<u64>,
    pub delay: u32,
    pub total_delay: u32,
    pub parsed: Option<ParsedInternal>,
    pub jetton: Option<JettonWalletData>,
    pub blockchain_logs: String,
    /// Serialized action list, when the emulator reports one.
    pub actions: Option<String>,
}

impl EmulatedTransaction {
    /// Decodes `cell` and wraps it with no tree links or annotations.
    pub fn decode(cell: Cell, address: StdAddress, vm_log: String, blockchain_logs: String) -> CellResult<Self> {
        let transaction = Transaction::load(&cell)?;
        let in_message = transaction.in_message()?;
        let out_messages = transaction
            .out_msgs
            .iter()
            .map(Message::load)
            .collect::<CellResult<Vec<_>>>()?;
        Ok(Self {
            hash: cell.hash(),
            address,
            lt: transaction.lt,
            now: transaction.now,
            in_message,
            out_messages,
            compute: ComputeSummary {
                exit_code: transaction.exit_code(),
                vm_log,
            },
            transaction,
            cell,
            parent: None,
            children: Vec::new(),
            shard: None,
            delay: 0,
            total_delay: 0,
            parsed: None,
            jetton: None,
            blockchain_logs,
            actions: None,
        })
    }

    pub fn in_message_hash(&self) -> Option<HashBytes> {
        self.transaction.in_msg.as_ref().map(Cell::hash)
    }

    pub fn is_success(&self) -> bool {
        self.transaction.is_success()
    }
}

/// Appends `tx` to `list`, linking it under `parent` when given. Returns the
/// new index.
pub(crate) fn attach(list: &mut Vec<EmulatedTransaction>, mut tx: EmulatedTransaction, parent: Option<usize>) -> usize {
    let index = list.len();
    tx.parent = parent;
    if let Some(p) = parent {
        list[p].children.push(index);
    }
    list.push(tx);
    index
}
