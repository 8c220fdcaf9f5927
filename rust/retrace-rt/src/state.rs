//! Lazy per-address cache of remote account state.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use retrace_core::tlb::{Account, AccountState, CurrencyCollection, ShardAccount, StateInit, StorageInfo};
use retrace_core::{Cell, HashBytes, StdAddress};
use tracing::debug;

use crate::client::{LastTransaction, LedgerClient, RemoteAccount, RemoteContract};
use crate::error::ClientError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractState {
    Uninit,
    Frozen(HashBytes),
    Active { code: Cell, data: Cell },
}

/// Account state as first seen by the engine. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRecord {
    pub address: StdAddress,
    pub balance: u128,
    pub extra_currencies: Option<Cell>,
    pub last_transaction: Option<LastTransaction>,
    pub contract: ContractState,
}

impl AccountRecord {
    pub fn empty(address: StdAddress) -> Self {
        Self {
            address,
            balance: 0,
            extra_currencies: None,
            last_transaction: None,
            contract: ContractState::Uninit,
        }
    }

    /// Missing accounts become empty records; active accounts without both
    /// code and data are treated as uninitialised but keep their balance.
    pub fn from_remote(address: StdAddress, remote: Option<RemoteAccount>) -> Self {
        let Some(remote) = remote else {
            return Self::empty(address);
        };
        let contract = match remote.contract {
            RemoteContract::Active {
                code: Some(code),
                data: Some(data),
            } => ContractState::Active { code, data },
            RemoteContract::Active { .. } | RemoteContract::Uninit => ContractState::Uninit,
            RemoteContract::Frozen(hash) => ContractState::Frozen(hash),
        };
        Self {
            address,
            balance: remote.balance,
            extra_currencies: remote.extra_currencies,
            last_transaction: remote.last_transaction,
            contract,
        }
    }

    pub fn code(&self) -> Option<&Cell> {
        match &self.contract {
            ContractState::Active { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Shard account handed to the emulator. Last-transaction fields are
    /// zeroed: the emulator starts a fresh local history.
    pub fn to_shard_account(&self) -> ShardAccount {
        let state = match &self.contract {
            ContractState::Uninit => AccountState::Uninit,
            ContractState::Frozen(hash) => AccountState::Frozen(*hash),
            ContractState::Active { code, data } => AccountState::Active(StateInit::new(code.clone(), data.clone())),
        };
        ShardAccount {
            account: Some(Account {
                address: self.address,
                storage_stat: StorageInfo::default(),
                last_trans_lt: 0,
                balance: CurrencyCollection {
                    grams: self.balance,
                    other: self.extra_currencies.clone(),
                },
                state,
            }),
            last_trans_hash: HashBytes::ZERO,
            last_trans_lt: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// StateProvider
// ---------------------------------------------------------------------------

pub struct StateProvider {
    client: Arc<dyn LedgerClient>,
    cache: RwLock<HashMap<String, AccountRecord>>,
}

impl StateProvider {
    pub fn new(client: Arc<dyn LedgerClient>) -> Self {
        Self {
            client,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn client(&self) -> &Arc<dyn LedgerClient> {
        &self.client
    }

    /// Returns the cached record, fetching it at the current reference block
    /// on first access. Remote failures propagate; nothing is retried.
    pub async fn get_contract(&self, address: &StdAddress) -> Result<AccountRecord, ClientError> {
        let key = address.to_raw();
        let cached = self.cache.read().get(&key).cloned();
        if let Some(hit) = cached {
            return Ok(hit);
        }

        let block = self.client.reference_block().await?;
        let remote = self.client.account_state(address, &block).await?;
        let record = AccountRecord::from_remote(*address, remote);
        debug!(address = %key, seqno = block.seqno, contract = ?contract_kind(&record), "loaded account");

        // A concurrent miss may have filled the slot first; keep the earlier
        // record so every reader sees the same state.
        Ok(self.cache.write().entry(key).or_insert(record).clone())
    }

    pub fn known_contracts(&self) -> Vec<AccountRecord> {
        self.cache.read().values().cloned().collect()
    }

    pub fn clear(&self) {
        self.cache.write().clear();
    }
}

fn contract_kind(record: &AccountRecord) -> &'static str {
    match record.contract {
        ContractState::Uninit => "uninit",
        ContractState::Frozen(_) => "frozen",
        ContractState::Active { .. } => "active",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> StdAddress {
        StdAddress::new(0, HashBytes([8; 32]))
    }

    #[test]
    fn missing_account_is_empty_uninit() {
        let record = AccountRecord::from_remote(address(), None);
        assert_eq!(record.balance, 0);
        assert_eq!(record.contract, ContractState::Uninit);
        let shard = record.to_shard_account();
        assert_eq!(shard.balance(), 0);
    }

    #[test]
    fn active_without_data_is_uninit_with_balance() {
        let remote = RemoteAccount {
            balance: 42,
            extra_currencies: None,
            last_transaction: None,
            contract: RemoteContract::Active {
                code: Some(Cell::empty()),
                data: None,
            },
        };
        let record = AccountRecord::from_remote(address(), Some(remote));
        assert_eq!(record.contract, ContractState::Uninit);
        assert_eq!(record.balance, 42);
        assert!(record.code().is_none());
    }

    #[test]
    fn active_account_encodes_code_and_data() {
        let remote = RemoteAccount {
            balance: 7,
            extra_currencies: None,
            last_transaction: None,
            contract: RemoteContract::Active {
                code: Some(Cell::library(&HashBytes([1; 32]))),
                data: Some(Cell::empty()),
            },
        };
        let record = AccountRecord::from_remote(address(), Some(remote));
        let shard = ShardAccount::load(&record.to_shard_account().to_cell().unwrap()).unwrap();
        let account = shard.account.unwrap();
        assert_eq!(account.code(), Some(&Cell::library(&HashBytes([1; 32]))));
        assert_eq!(account.balance.grams, 7);
    }
}
