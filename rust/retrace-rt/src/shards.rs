//! Shard routing and the cross-shard delivery delay heuristic.

use retrace_core::StdAddress;

use crate::client::{ShardDescr, ShardLayout};

/// Shard id covering the whole workchain.
pub const ROOT_SHARD: u64 = 0x8000_0000_0000_0000;

/// True when the account id of `address` falls into `shard`.
///
/// A shard id is a prefix terminated by its lowest set bit; everything above
/// that bit must match the first 64 bits of the account id.
pub fn is_same_shard(address: &StdAddress, shard: u64) -> bool {
    if shard == 0 {
        return false;
    }
    let shifts = shard.trailing_zeros() + 1;
    let account = address.hash.prefix_u64();
    account.checked_shr(shifts).unwrap_or(0) == shard.checked_shr(shifts).unwrap_or(0)
}

impl ShardLayout {
    /// Shard holding `address`. Masterchain accounts always map to the root
    /// shard.
    pub fn shard_for(&self, address: &StdAddress) -> Option<u64> {
        if address.is_masterchain() {
            return Some(ROOT_SHARD);
        }
        self.shards
            .iter()
            .find(|s| s.workchain == address.workchain as i32 && is_same_shard(address, s.shard))
            .map(|s| s.shard)
    }

    pub fn single(workchain: i32) -> Self {
        Self {
            shards: vec![ShardDescr {
                workchain,
                shard: ROOT_SHARD,
            }],
        }
    }
}

/// Delivery delay of a transaction relative to its parent: none for roots
/// and same-shard children, `unit` when the child lives in another shard.
pub fn delivery_delay(address: &StdAddress, parent_shard: Option<u64>, unit: u32) -> u32 {
    match parent_shard {
        None => 0,
        Some(shard) if is_same_shard(address, shard) => 0,
        Some(_) => unit,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
