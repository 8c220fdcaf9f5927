//! `Transaction` and its description phases.
//!
//! Ordinary, tick-tock and storage descriptions are decoded in full. Split,
//! merge and other rare kinds are kept as their 4-bit tag only.

use crate::builder::CellBuilder;
use crate::cell::{Cell, HashBytes};
use crate::dict;
use crate::error::{CellError, CellResult};
use crate::slice::CellSlice;

use super::{AccountStatus, CurrencyCollection, Message};

// ---------------------------------------------------------------------------
// Phases
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccStatusChange {
    Unchanged,
    Frozen,
    Deleted,
}

impl AccStatusChange {
    fn load(s: &mut CellSlice<'_>) -> CellResult<Self> {
        if !s.load_bit()? {
            return Ok(AccStatusChange::Unchanged);
        }
        Ok(if s.load_bit()? {
            AccStatusChange::Deleted
        } else {
            AccStatusChange::Frozen
        })
    }

    fn store(self, b: &mut CellBuilder) -> CellResult<()> {
        match self {
            AccStatusChange::Unchanged => b.store_bit(false)?,
            AccStatusChange::Frozen => b.store_uint(0b10, 2)?,
            AccStatusChange::Deleted => b.store_uint(0b11, 2)?,
        };
        Ok(())
    }
}

fn load_maybe_coins(s: &mut CellSlice<'_>) -> CellResult<Option<u128>> {
    if s.load_bit()? {
        Ok(Some(s.load_coins()?))
    } else {
        Ok(None)
    }
}

fn store_maybe_coins(b: &mut CellBuilder, value: Option<u128>) -> CellResult<()> {
    match value {
        Some(v) => {
            b.store_bit(true)?;
            b.store_coins(v)?;
        }
        None => {
            b.store_bit(false)?;
        }
    }
    Ok(())
}

fn load_maybe_i32(s: &mut CellSlice<'_>) -> CellResult<Option<i32>> {
    if s.load_bit()? {
        Ok(Some(s.load_int(32)? as i32))
    } else {
        Ok(None)
    }
}

fn store_maybe_i32(b: &mut CellBuilder, value: Option<i32>) -> CellResult<()> {
    match value {
        Some(v) => {
            b.store_bit(true)?;
            b.store_int(v as i64, 32)?;
        }
        None => {
            b.store_bit(false)?;
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoragePhase {
    pub fees_collected: u128,
    pub fees_due: Option<u128>,
    pub status_change: AccStatusChange,
}

impl StoragePhase {
    fn load(s: &mut CellSlice<'_>) -> CellResult<Self> {
        Ok(Self {
            fees_collected: s.load_coins()?,
            fees_due: load_maybe_coins(s)?,
            status_change: AccStatusChange::load(s)?,
        })
    }

    fn store(&self, b: &mut CellBuilder) -> CellResult<()> {
        b.store_coins(self.fees_collected)?;
        store_maybe_coins(b, self.fees_due)?;
        self.status_change.store(b)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditPhase {
    pub due_fees_collected: Option<u128>,
    pub credit: CurrencyCollection,
}

impl CreditPhase {
    fn load(s: &mut CellSlice<'_>) -> CellResult<Self> {
        Ok(Self {
            due_fees_collected: load_maybe_coins(s)?,
            credit: CurrencyCollection::load(s)?,
        })
    }

    fn store(&self, b: &mut CellBuilder) -> CellResult<()> {
        store_maybe_coins(b, self.due_fees_collected)?;
        self.credit.store(b)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ComputeSkipReason {
    NoState,
    BadState,
    NoGas,
    Suspended,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmComputePhase {
    pub success: bool,
    pub msg_state_used: bool,
    pub account_activated: bool,
    pub gas_fees: u128,
    pub gas_used: u64,
    pub gas_limit: u64,
    pub gas_credit: Option<u32>,
    pub mode: i8,
    pub exit_code: i32,
    pub exit_arg: Option<i32>,
    pub vm_steps: u32,
    pub vm_init_state_hash: HashBytes,
    pub vm_final_state_hash: HashBytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComputePhase {
    Skipped(ComputeSkipReason),
    Vm(VmComputePhase),
}

impl ComputePhase {
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ComputePhase::Vm(vm) => Some(vm.exit_code),
            ComputePhase::Skipped(_) => None,
        }
    }

    fn load(s: &mut CellSlice<'_>) -> CellResult<Self> {
        if !s.load_bit()? {
            let reason = match s.load_uint(2)? {
                0b00 => ComputeSkipReason::NoState,
                0b01 => ComputeSkipReason::BadState,
                0b10 => ComputeSkipReason::NoGas,
                _ => {
                    if s.load_bit()? {
                        return Err(CellError::InvalidTag {
                            what: "ComputeSkipReason",
                            tag: 0b111,
                        });
                    }
                    ComputeSkipReason::Suspended
                }
            };
            return Ok(ComputePhase::Skipped(reason));
        }
        let success = s.load_bit()?;
        let msg_state_used = s.load_bit()?;
        let account_activated = s.load_bit()?;
        let gas_fees = s.load_coins()?;
        let details = s.load_reference()?;
        let mut d = details.parse();
        let gas_used = d.load_var_uint(3)? as u64;
        let gas_limit = d.load_var_uint(3)? as u64;
        let gas_credit = if d.load_bit()? {
            Some(d.load_var_uint(2)? as u32)
        } else {
            None
        };
        let mode = d.load_int(8)? as i8;
        let exit_code = d.load_int(32)? as i32;
        let exit_arg = load_maybe_i32(&mut d)?;
        let vm_steps = d.load_u32()?;
        let vm_init_state_hash = d.load_hash()?;
        let vm_final_state_hash = d.load_hash()?;
        Ok(ComputePhase::Vm(VmComputePhase {
            success,
            msg_state_used,
            account_activated,
            gas_fees,
            gas_used,
            gas_limit,
            gas_credit,
            mode,
            exit_code,
            exit_arg,
            vm_steps,
            vm_init_state_hash,
            vm_final_state_hash,
        }))
    }

    fn store(&self, b: &mut CellBuilder) -> CellResult<()> {
        match self {
            ComputePhase::Skipped(reason) => {
                b.store_bit(false)?;
                match reason {
                    ComputeSkipReason::NoState => b.store_uint(0b00, 2)?,
                    ComputeSkipReason::BadState => b.store_uint(0b01, 2)?,
                    ComputeSkipReason::NoGas => b.store_uint(0b10, 2)?,
                    ComputeSkipReason::Suspended => b.store_uint(0b110, 3)?,
                };
            }
            ComputePhase::Vm(vm) => {
                b.store_bit(true)?;
                b.store_bit(vm.success)?;
                b.store_bit(vm.msg_state_used)?;
                b.store_bit(vm.account_activated)?;
                b.store_coins(vm.gas_fees)?;
                let mut d = CellBuilder::new();
                d.store_var_uint(vm.gas_used as u128, 3)?;
                d.store_var_uint(vm.gas_limit as u128, 3)?;
                match vm.gas_credit {
                    Some(credit) => {
                        d.store_bit(true)?;
                        d.store_var_uint(credit as u128, 2)?;
                    }
                    None => {
                        d.store_bit(false)?;
                    }
                }
                d.store_int(vm.mode as i64, 8)?;
                d.store_int(vm.exit_code as i64, 32)?;
                store_maybe_i32(&mut d, vm.exit_arg)?;
                d.store_u32(vm.vm_steps)?;
                d.store_hash(&vm.vm_init_state_hash)?;
                d.store_hash(&vm.vm_final_state_hash)?;
                b.store_reference(d.build()?)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StorageUsedShort {
    pub cells: u64,
    pub bits: u64,
}

impl StorageUsedShort {
    fn load(s: &mut CellSlice<'_>) -> CellResult<Self> {
        Ok(Self {
            cells: s.load_var_uint(3)? as u64,
            bits: s.load_var_uint(3)? as u64,
        })
    }

    fn store(&self, b: &mut CellBuilder) -> CellResult<()> {
        b.store_var_uint(self.cells as u128, 3)?;
        b.store_var_uint(self.bits as u128, 3)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionPhase {
    pub success: bool,
    pub valid: bool,
    pub no_funds: bool,
    pub status_change: AccStatusChange,
    pub total_fwd_fees: Option<u128>,
    pub total_action_fees: Option<u128>,
    pub result_code: i32,
    pub result_arg: Option<i32>,
    pub tot_actions: u16,
    pub spec_actions: u16,
    pub skipped_actions: u16,
    pub msgs_created: u16,
    pub action_list_hash: HashBytes,
    pub tot_msg_size: StorageUsedShort,
}

impl ActionPhase {
    fn load(s: &mut CellSlice<'_>) -> CellResult<Self> {
        Ok(Self {
            success: s.load_bit()?,
            valid: s.load_bit()?,
            no_funds: s.load_bit()?,
            status_change: AccStatusChange::load(s)?,
            total_fwd_fees: load_maybe_coins(s)?,
            total_action_fees: load_maybe_coins(s)?,
            result_code: s.load_int(32)? as i32,
            result_arg: load_maybe_i32(s)?,
            tot_actions: s.load_u16()?,
            spec_actions: s.load_u16()?,
            skipped_actions: s.load_u16()?,
            msgs_created: s.load_u16()?,
            action_list_hash: s.load_hash()?,
            tot_msg_size: StorageUsedShort::load(s)?,
        })
    }

    fn store(&self, b: &mut CellBuilder) -> CellResult<()> {
        b.store_bit(self.success)?;
        b.store_bit(self.valid)?;
        b.store_bit(self.no_funds)?;
        self.status_change.store(b)?;
        store_maybe_coins(b, self.total_fwd_fees)?;
        store_maybe_coins(b, self.total_action_fees)?;
        b.store_int(self.result_code as i64, 32)?;
        store_maybe_i32(b, self.result_arg)?;
        b.store_u16(self.tot_actions)?;
        b.store_u16(self.spec_actions)?;
        b.store_u16(self.skipped_actions)?;
        b.store_u16(self.msgs_created)?;
        b.store_hash(&self.action_list_hash)?;
        self.tot_msg_size.store(b)
    }

    fn load_maybe_ref(s: &mut CellSlice<'_>) -> CellResult<Option<Self>> {
        match s.load_maybe_ref()? {
            Some(cell) => Ok(Some(Self::load(&mut cell.parse())?)),
            None => Ok(None),
        }
    }

    fn store_maybe_ref(phase: Option<&Self>, b: &mut CellBuilder) -> CellResult<()> {
        match phase {
            Some(phase) => {
                let mut inner = CellBuilder::new();
                phase.store(&mut inner)?;
                b.store_maybe_ref(Some(&inner.build()?))?;
            }
            None => {
                b.store_bit(false)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BouncePhase {
    NegativeFunds,
    NoFunds {
        msg_size: StorageUsedShort,
        req_fwd_fees: u128,
    },
    Ok {
        msg_size: StorageUsedShort,
        msg_fees: u128,
        fwd_fees: u128,
    },
}

impl BouncePhase {
    fn load(s: &mut CellSlice<'_>) -> CellResult<Self> {
        if s.load_bit()? {
            return Ok(BouncePhase::Ok {
                msg_size: StorageUsedShort::load(s)?,
                msg_fees: s.load_coins()?,
                fwd_fees: s.load_coins()?,
            });
        }
        if s.load_bit()? {
            Ok(BouncePhase::NoFunds {
                msg_size: StorageUsedShort::load(s)?,
                req_fwd_fees: s.load_coins()?,
            })
        } else {
            Ok(BouncePhase::NegativeFunds)
        }
    }

    fn store(&self, b: &mut CellBuilder) -> CellResult<()> {
        match self {
            BouncePhase::NegativeFunds => {
                b.store_uint(0b00, 2)?;
            }
            BouncePhase::NoFunds {
                msg_size,
                req_fwd_fees,
            } => {
                b.store_uint(0b01, 2)?;
                msg_size.store(b)?;
                b.store_coins(*req_fwd_fees)?;
            }
            BouncePhase::Ok {
                msg_size,
                msg_fees,
                fwd_fees,
            } => {
                b.store_bit(true)?;
                msg_size.store(b)?;
                b.store_coins(*msg_fees)?;
                b.store_coins(*fwd_fees)?;
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Descriptions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrdinaryDescr {
    pub credit_first: bool,
    pub storage_ph: Option<StoragePhase>,
    pub credit_ph: Option<CreditPhase>,
    pub compute_ph: ComputePhase,
    pub action: Option<ActionPhase>,
    pub aborted: bool,
    pub bounce: Option<BouncePhase>,
    pub destroyed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickTockDescr {
    pub is_tock: bool,
    pub storage_ph: StoragePhase,
    pub compute_ph: ComputePhase,
    pub action: Option<ActionPhase>,
    pub aborted: bool,
    pub destroyed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxDescription {
    Ordinary(OrdinaryDescr),
    TickTock(TickTockDescr),
    Storage(StoragePhase),
    /// Split / merge descriptions, kept as their tag.
    Other(u8),
}

impl TxDescription {
    pub fn compute_phase(&self) -> Option<&ComputePhase> {
        match self {
            TxDescription::Ordinary(d) => Some(&d.compute_ph),
            TxDescription::TickTock(d) => Some(&d.compute_ph),
            _ => None,
        }
    }

    pub fn action_phase(&self) -> Option<&ActionPhase> {
        match self {
            TxDescription::Ordinary(d) => d.action.as_ref(),
            TxDescription::TickTock(d) => d.action.as_ref(),
            _ => None,
        }
    }

    pub fn aborted(&self) -> bool {
        match self {
            TxDescription::Ordinary(d) => d.aborted,
            TxDescription::TickTock(d) => d.aborted,
            _ => false,
        }
    }

    fn load(cell: &Cell) -> CellResult<Self> {
        let mut s = cell.parse();
        let tag = s.load_uint(4)? as u8;
        match tag {
            0b0000 => {
                let credit_first = s.load_bit()?;
                let storage_ph = if s.load_bit()? {
                    Some(StoragePhase::load(&mut s)?)
                } else {
                    None
                };
                let credit_ph = if s.load_bit()? {
                    Some(CreditPhase::load(&mut s)?)
                } else {
                    None
                };
                let compute_ph = ComputePhase::load(&mut s)?;
                let action = ActionPhase::load_maybe_ref(&mut s)?;
                let aborted = s.load_bit()?;
                let bounce = if s.load_bit()? {
                    Some(BouncePhase::load(&mut s)?)
                } else {
                    None
                };
                let destroyed = s.load_bit()?;
                Ok(TxDescription::Ordinary(OrdinaryDescr {
                    credit_first,
                    storage_ph,
                    credit_ph,
                    compute_ph,
                    action,
                    aborted,
                    bounce,
                    destroyed,
                }))
            }
            0b0001 => Ok(TxDescription::Storage(StoragePhase::load(&mut s)?)),
            0b0010 | 0b0011 => {
                let is_tock = tag & 1 == 1;
                let storage_ph = StoragePhase::load(&mut s)?;
                let compute_ph = ComputePhase::load(&mut s)?;
                let action = ActionPhase::load_maybe_ref(&mut s)?;
                let aborted = s.load_bit()?;
                let destroyed = s.load_bit()?;
                Ok(TxDescription::TickTock(TickTockDescr {
                    is_tock,
                    storage_ph,
                    compute_ph,
                    action,
                    aborted,
                    destroyed,
                }))
            }
            other => Ok(TxDescription::Other(other)),
        }
    }

    fn to_cell(&self) -> CellResult<Cell> {
        let mut b = CellBuilder::new();
        match self {
            TxDescription::Ordinary(d) => {
                b.store_uint(0b0000, 4)?;
                b.store_bit(d.credit_first)?;
                match &d.storage_ph {
                    Some(p) => {
                        b.store_bit(true)?;
                        p.store(&mut b)?;
                    }
                    None => {
                        b.store_bit(false)?;
                    }
                }
                match &d.credit_ph {
                    Some(p) => {
                        b.store_bit(true)?;
                        p.store(&mut b)?;
                    }
                    None => {
                        b.store_bit(false)?;
                    }
                }
                d.compute_ph.store(&mut b)?;
                ActionPhase::store_maybe_ref(d.action.as_ref(), &mut b)?;
                b.store_bit(d.aborted)?;
                match &d.bounce {
                    Some(p) => {
                        b.store_bit(true)?;
                        p.store(&mut b)?;
                    }
                    None => {
                        b.store_bit(false)?;
                    }
                }
                b.store_bit(d.destroyed)?;
            }
            TxDescription::Storage(p) => {
                b.store_uint(0b0001, 4)?;
                p.store(&mut b)?;
            }
            TxDescription::TickTock(d) => {
                b.store_uint(0b001, 3)?;
                b.store_bit(d.is_tock)?;
                d.storage_ph.store(&mut b)?;
                d.compute_ph.store(&mut b)?;
                ActionPhase::store_maybe_ref(d.action.as_ref(), &mut b)?;
                b.store_bit(d.aborted)?;
                b.store_bit(d.destroyed)?;
            }
            TxDescription::Other(tag) => {
                return Err(CellError::Unsupported(format!("serializing description tag {tag:#06b}")));
            }
        }
        b.build()
    }
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// `update_hashes#72 old_hash:bits256 new_hash:bits256`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HashUpdate {
    pub old_hash: HashBytes,
    pub new_hash: HashBytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub account: HashBytes,
    pub lt: u64,
    pub prev_trans_hash: HashBytes,
    pub prev_trans_lt: u64,
    pub now: u32,
    pub orig_status: AccountStatus,
    pub end_status: AccountStatus,
    /// Raw inbound message cell.
    pub in_msg: Option<Cell>,
    /// Raw outbound message cells, in index order.
    pub out_msgs: Vec<Cell>,
    pub total_fees: CurrencyCollection,
    pub state_update: HashUpdate,
    pub description: TxDescription,
}

impl Transaction {
    pub fn load(cell: &Cell) -> CellResult<Self> {
        let mut s = cell.parse();
        let tag = s.load_uint(4)?;
        if tag != 0b0111 {
            return Err(CellError::InvalidTag {
                what: "Transaction",
                tag,
            });
        }
        let account = s.load_hash()?;
        let lt = s.load_u64()?;
        let prev_trans_hash = s.load_hash()?;
        let prev_trans_lt = s.load_u64()?;
        let now = s.load_u32()?;
        let outmsg_cnt = s.load_uint(15)? as usize;
        let orig_status = AccountStatus::load(&mut s)?;
        let end_status = AccountStatus::load(&mut s)?;

        let msgs = s.load_reference()?;
        let mut m = msgs.parse();
        let in_msg = m.load_maybe_ref()?;
        let out_msgs = match dict::load_dict(&mut m)? {
            Some(root) => dict::entries(root, 15)?
                .into_iter()
                .map(|(_, mut value)| value.load_reference().cloned())
                .collect::<CellResult<Vec<_>>>()?,
            None => Vec::new(),
        };
        if out_msgs.len() != outmsg_cnt {
            return Err(CellError::InvalidBoc(format!(
                "outmsg_cnt {outmsg_cnt} but {} messages",
                out_msgs.len()
            )));
        }

        let total_fees = CurrencyCollection::load(&mut s)?;
        let update = s.load_reference()?;
        let mut u = update.parse();
        let update_tag = u.load_u8()?;
        if update_tag != 0x72 {
            return Err(CellError::InvalidTag {
                what: "HASH_UPDATE",
                tag: update_tag as u64,
            });
        }
        let state_update = HashUpdate {
            old_hash: u.load_hash()?,
            new_hash: u.load_hash()?,
        };
        let description = TxDescription::load(s.load_reference()?)?;

        Ok(Self {
            account,
            lt,
            prev_trans_hash,
            prev_trans_lt,
            now,
            orig_status,
            end_status,
            in_msg,
            out_msgs,
            total_fees,
            state_update,
            description,
        })
    }

    pub fn to_cell(&self) -> CellResult<Cell> {
        let mut b = CellBuilder::new();
        b.store_uint(0b0111, 4)?;
        b.store_hash(&self.account)?;
        b.store_u64(self.lt)?;
        b.store_hash(&self.prev_trans_hash)?;
        b.store_u64(self.prev_trans_lt)?;
        b.store_u32(self.now)?;
        b.store_uint(self.out_msgs.len() as u64, 15)?;
        self.orig_status.store(&mut b)?;
        self.end_status.store(&mut b)?;

        let mut m = CellBuilder::new();
        m.store_maybe_ref(self.in_msg.as_ref())?;
        let entries = self
            .out_msgs
            .iter()
            .enumerate()
            .map(|(i, msg)| {
                let mut v = CellBuilder::new();
                v.store_reference(msg.clone())?;
                Ok((dict::key_from_u64(i as u64, 15), v))
            })
            .collect::<CellResult<Vec<_>>>()?;
        dict::store_dict(&mut m, dict::build(15, entries)?.as_ref())?;
        b.store_reference(m.build()?)?;

        self.total_fees.store(&mut b)?;
        let mut u = CellBuilder::new();
        u.store_u8(0x72)?;
        u.store_hash(&self.state_update.old_hash)?;
        u.store_hash(&self.state_update.new_hash)?;
        b.store_reference(u.build()?)?;
        b.store_reference(self.description.to_cell()?)?;
        b.build()
    }

    /// Decodes the inbound message, if any.
    pub fn in_message(&self) -> CellResult<Option<Message>> {
        self.in_msg.as_ref().map(Message::load).transpose()
    }

    pub fn compute_phase(&self) -> Option<&ComputePhase> {
        self.description.compute_phase()
    }

    /// VM exit code, when the compute phase ran.
    pub fn exit_code(&self) -> Option<i32> {
        self.compute_phase().and_then(ComputePhase::exit_code)
    }

    pub fn is_success(&self) -> bool {
        let compute_ok = match self.compute_phase() {
            Some(ComputePhase::Vm(vm)) => vm.success,
            Some(ComputePhase::Skipped(_)) => false,
            None => true,
        };
        let action_ok = self.description.action_phase().map(|a| a.success).unwrap_or(true);
        compute_ok && action_ok && !self.description.aborted()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::StdAddress;
    use crate::tlb::CommonMsgInfo;

    fn vm_phase(exit_code: i32) -> ComputePhase {
        ComputePhase::Vm(VmComputePhase {
            success: exit_code == 0,
            msg_state_used: false,
            account_activated: false,
            gas_fees: 1000,
            gas_used: 2994,
            gas_limit: 1_000_000,
            gas_credit: None,
            mode: 0,
            exit_code,
            exit_arg: None,
            vm_steps: 68,
            vm_init_state_hash: HashBytes::ZERO,
            vm_final_state_hash: HashBytes::ZERO,
        })
    }

    fn message(dest: u8) -> Cell {
        Message {
            info: CommonMsgInfo::Internal {
                ihr_disabled: true,
                bounce: true,
                bounced: false,
                src: StdAddress::new(0, HashBytes([1; 32])).into(),
                dest: StdAddress::new(0, HashBytes([dest; 32])),
                value: CurrencyCollection::from_grams(100),
                ihr_fee: 0,
                fwd_fee: 0,
                created_lt: 1,
                created_at: 1,
            },
            init: None,
            body: Cell::empty(),
        }
        .to_cell()
        .unwrap()
    }

    fn transaction(exit_code: i32, outs: usize) -> Transaction {
        Transaction {
            account: HashBytes([1; 32]),
            lt: 1_000_001,
            prev_trans_hash: HashBytes::ZERO,
            prev_trans_lt: 0,
            now: 1_700_000_000,
            orig_status: AccountStatus::Active,
            end_status: AccountStatus::Active,
            in_msg: Some(message(1)),
            out_msgs: (0..outs).map(|i| message(10 + i as u8)).collect(),
            total_fees: CurrencyCollection::from_grams(5),
            state_update: HashUpdate {
                old_hash: HashBytes([2; 32]),
                new_hash: HashBytes([3; 32]),
            },
            description: TxDescription::Ordinary(OrdinaryDescr {
                credit_first: false,
                storage_ph: Some(StoragePhase {
                    fees_collected: 1,
                    fees_due: None,
                    status_change: AccStatusChange::Unchanged,
                }),
                credit_ph: Some(CreditPhase {
                    due_fees_collected: None,
                    credit: CurrencyCollection::from_grams(100),
                }),
                compute_ph: vm_phase(exit_code),
                action: None,
                aborted: exit_code != 0,
                bounce: None,
                destroyed: false,
            }),
        }
    }

    #[test]
    fn ordinary_transaction_round_trip() {
        let tx = transaction(0, 3);
        let cell = tx.to_cell().unwrap();
        let back = Transaction::load(&cell).unwrap();
        assert_eq!(back, tx);
        assert_eq!(back.exit_code(), Some(0));
        assert!(back.is_success());
        let dests: Vec<_> = back
            .out_msgs
            .iter()
            .map(|m| Message::load(m).unwrap().destination().unwrap().hash.0[0])
            .collect();
        assert_eq!(dests, vec![10, 11, 12]);
    }

    #[test]
    fn failed_compute_phase_exposes_exit_code() {
        let tx = Transaction::load(&transaction(9, 0).to_cell().unwrap()).unwrap();
        assert_eq!(tx.exit_code(), Some(9));
        assert!(!tx.is_success());
        assert!(tx.out_msgs.is_empty());
    }

    #[test]
    fn tick_tock_description() {
        let mut tx = transaction(0, 0);
        tx.in_msg = None;
        tx.description = TxDescription::TickTock(TickTockDescr {
            is_tock: true,
            storage_ph: StoragePhase {
                fees_collected: 0,
                fees_due: None,
                status_change: AccStatusChange::Unchanged,
            },
            compute_ph: ComputePhase::Skipped(ComputeSkipReason::NoGas),
            action: None,
            aborted: true,
            destroyed: false,
        });
        let back = Transaction::load(&tx.to_cell().unwrap()).unwrap();
        assert_eq!(back.description, tx.description);
        assert_eq!(back.exit_code(), None);
        assert!(back.in_message().unwrap().is_none());
    }

    #[test]
    fn wrong_tag_is_rejected() {
        let err = Transaction::load(&Cell::empty()).unwrap_err();
        assert!(matches!(err, CellError::Underflow(_)));
        let mut b = CellBuilder::new();
        b.store_uint(0b0110, 4).unwrap();
        let err = Transaction::load(&b.build().unwrap()).unwrap_err();
        assert!(matches!(err, CellError::InvalidTag { what: "Transaction", .. }));
    }
}
