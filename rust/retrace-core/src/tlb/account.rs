use crate::address::StdAddress;
use crate::builder::CellBuilder;
use crate::cell::{Cell, HashBytes};
use crate::error::{CellError, CellResult};
use crate::slice::CellSlice;

use super::{CurrencyCollection, StateInit};

/// `AccountStatus` as recorded in transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum AccountStatus {
    Uninit,
    Frozen,
    Active,
    NonExist,
}

impl AccountStatus {
    pub fn load(slice: &mut CellSlice<'_>) -> CellResult<Self> {
        Ok(match slice.load_uint(2)? {
            0b00 => AccountStatus::Uninit,
            0b01 => AccountStatus::Frozen,
            0b10 => AccountStatus::Active,
            _ => AccountStatus::NonExist,
        })
    }

    pub fn store(self, builder: &mut CellBuilder) -> CellResult<()> {
        let tag = match self {
            AccountStatus::Uninit => 0b00,
            AccountStatus::Frozen => 0b01,
            AccountStatus::Active => 0b10,
            AccountStatus::NonExist => 0b11,
        };
        builder.store_uint(tag, 2)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StorageUsed {
    pub cells: u64,
    pub bits: u64,
    pub public_cells: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StorageInfo {
    pub used: StorageUsed,
    pub last_paid: u32,
    pub due_payment: Option<u128>,
}

impl StorageInfo {
    fn load(slice: &mut CellSlice<'_>) -> CellResult<Self> {
        let used = StorageUsed {
            cells: slice.load_var_uint(3)? as u64,
            bits: slice.load_var_uint(3)? as u64,
            public_cells: slice.load_var_uint(3)? as u64,
        };
        let last_paid = slice.load_u32()?;
        let due_payment = if slice.load_bit()? {
            Some(slice.load_coins()?)
        } else {
            None
        };
        Ok(Self {
            used,
            last_paid,
            due_payment,
        })
    }

    fn store(&self, builder: &mut CellBuilder) -> CellResult<()> {
        builder.store_var_uint(self.used.cells as u128, 3)?;
        builder.store_var_uint(self.used.bits as u128, 3)?;
        builder.store_var_uint(self.used.public_cells as u128, 3)?;
        builder.store_u32(self.last_paid)?;
        match self.due_payment {
            Some(due) => {
                builder.store_bit(true)?;
                builder.store_coins(due)?;
            }
            None => {
                builder.store_bit(false)?;
            }
        }
        Ok(())
    }
}

/// Contract state stored inside an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountState {
    Uninit,
    Active(StateInit),
    Frozen(HashBytes),
}

impl AccountState {
    fn load(slice: &mut CellSlice<'_>) -> CellResult<Self> {
        if slice.load_bit()? {
            return StateInit::load(slice).map(AccountState::Active);
        }
        if slice.load_bit()? {
            Ok(AccountState::Frozen(slice.load_hash()?))
        } else {
            Ok(AccountState::Uninit)
        }
    }

    fn store(&self, builder: &mut CellBuilder) -> CellResult<()> {
        match self {
            AccountState::Uninit => {
                builder.store_uint(0b00, 2)?;
            }
            AccountState::Frozen(hash) => {
                builder.store_uint(0b01, 2)?;
                builder.store_hash(hash)?;
            }
            AccountState::Active(init) => {
                builder.store_bit(true)?;
                init.store(builder)?;
            }
        }
        Ok(())
    }
}

/// `account$1 addr:MsgAddressInt storage_stat:StorageInfo storage:AccountStorage`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub address: StdAddress,
    pub storage_stat: StorageInfo,
    pub last_trans_lt: u64,
    pub balance: CurrencyCollection,
    pub state: AccountState,
}

impl Account {
    pub fn status(&self) -> AccountStatus {
        match self.state {
            AccountState::Uninit => AccountStatus::Uninit,
            AccountState::Active(_) => AccountStatus::Active,
            AccountState::Frozen(_) => AccountStatus::Frozen,
        }
    }

    pub fn code(&self) -> Option<&Cell> {
        match &self.state {
            AccountState::Active(init) => init.code.as_ref(),
            _ => None,
        }
    }

    pub fn data(&self) -> Option<&Cell> {
        match &self.state {
            AccountState::Active(init) => init.data.as_ref(),
            _ => None,
        }
    }

    /// `None` for `account_none$0`.
    pub fn load(cell: &Cell) -> CellResult<Option<Self>> {
        let mut s = cell.parse();
        if !s.load_bit()? {
            return Ok(None);
        }
        let address = StdAddress::load(&mut s)?;
        let storage_stat = StorageInfo::load(&mut s)?;
        let last_trans_lt = s.load_u64()?;
        let balance = CurrencyCollection::load(&mut s)?;
        let state = AccountState::load(&mut s)?;
        Ok(Some(Self {
            address,
            storage_stat,
            last_trans_lt,
            balance,
            state,
        }))
    }

    pub fn to_cell(account: Option<&Self>) -> CellResult<Cell> {
        let mut b = CellBuilder::new();
        match account {
            None => {
                b.store_bit(false)?;
            }
            Some(acc) => {
                b.store_bit(true)?;
                acc.address.store(&mut b)?;
                acc.storage_stat.store(&mut b)?;
                b.store_u64(acc.last_trans_lt)?;
                acc.balance.store(&mut b)?;
                acc.state.store(&mut b)?;
            }
        }
        b.build()
    }
}

/// `account_descr$_ account:^Account last_trans_hash:bits256 last_trans_lt:uint64`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardAccount {
    pub account: Option<Account>,
    pub last_trans_hash: HashBytes,
    pub last_trans_lt: u64,
}

impl ShardAccount {
    /// A fresh uninitialised account holding `balance`.
    pub fn uninit(address: StdAddress, balance: CurrencyCollection) -> Self {
        Self {
            account: Some(Account {
                address,
                storage_stat: StorageInfo::default(),
                last_trans_lt: 0,
                balance,
                state: AccountState::Uninit,
            }),
            last_trans_hash: HashBytes::ZERO,
            last_trans_lt: 0,
        }
    }

    pub fn load(cell: &Cell) -> CellResult<Self> {
        let mut s = cell.parse();
        let account_cell = s.load_reference()?;
        let account = Account::load(account_cell)?;
        let last_trans_hash = s.load_hash()?;
        let last_trans_lt = s.load_u64()?;
        if !s.is_empty() {
            return Err(CellError::Overflow("trailing data after ShardAccount".into()));
        }
        Ok(Self {
            account,
            last_trans_hash,
            last_trans_lt,
        })
    }

    pub fn to_cell(&self) -> CellResult<Cell> {
        let mut b = CellBuilder::new();
        b.store_reference(Account::to_cell(self.account.as_ref())?)?;
        b.store_hash(&self.last_trans_hash)?;
        b.store_u64(self.last_trans_lt)?;
        b.build()
    }

    pub fn balance(&self) -> u128 {
        self.account.as_ref().map(|a| a.balance.grams).unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
