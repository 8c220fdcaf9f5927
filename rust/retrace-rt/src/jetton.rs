//! Jetton wallet enrichment.

use num_bigint::BigInt;
use retrace_core::{MsgAddress, StackEntry, StdAddress};
use serde::Serialize;

use crate::blockchain::Blockchain;
use crate::error::{EmulationError, VmError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JettonWalletData {
    pub balance: BigInt,
    pub owner: Option<StdAddress>,
    pub jetton_master: Option<StdAddress>,
}

fn std_address(entry: Option<&StackEntry>) -> Result<Option<StdAddress>, EmulationError> {
    match entry {
        None | Some(StackEntry::Null) => Ok(None),
        Some(entry) => Ok(match entry.as_address()? {
            MsgAddress::Std(address) => Some(address),
            _ => None,
        }),
    }
}

/// Calls `get_wallet_data` on the local state of `wallet`.
pub async fn wallet_data(chain: &mut Blockchain, wallet: &StdAddress) -> Result<JettonWalletData, EmulationError> {
    let stack = chain.run_get_method(wallet, "get_wallet_data", &[]).await?;
    let balance = stack
        .first()
        .and_then(StackEntry::as_int)
        .cloned()
        .ok_or_else(|| VmError::MalformedResponse("get_wallet_data did not return an integer balance".into()))?;
    Ok(JettonWalletData {
        balance,
        owner: std_address(stack.get(1))?,
        jetton_master: std_address(stack.get(2))?,
    })
}
