//! TL-B codecs for the structures exchanged with the emulator: messages,
//! accounts and transactions.

mod account;
mod currency;
mod message;
mod transaction;

pub use account::{Account, AccountState, AccountStatus, ShardAccount, StorageInfo, StorageUsed};
pub use currency::CurrencyCollection;
pub use message::{CommonMsgInfo, Message, StateInit};
pub use transaction::{
    AccStatusChange, ActionPhase, BouncePhase, ComputePhase, ComputeSkipReason, CreditPhase, HashUpdate,
    OrdinaryDescr, StoragePhase, StorageUsedShort, TickTockDescr, Transaction, TxDescription, VmComputePhase,
};
