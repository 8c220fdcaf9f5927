//! Local ledger driven by the emulation session.
//!
//! Accounts are pulled from the [`StateProvider`] on first touch and then
//! evolve locally. Messages are processed strictly FIFO; each call to
//! [`Blockchain::next`] runs exactly one transaction and enqueues the internal
//! messages it produced.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use retrace_core::stack::method_id;
use retrace_core::tlb::{Message, ShardAccount, Transaction};
use retrace_core::{Boc, Cell, CellError, HashBytes, StackEntry, StdAddress};
use tracing::{debug, trace, warn};

use crate::error::{EmulationError, VmError};
use crate::state::{AccountRecord, StateProvider};
use crate::vm::{EmulationArgs, EmulationOutcome, GetMethodArgs, GetMethodOutcome, Verbosity, VmBoundary};

/// Logical time advanced per processed message.
pub const LT_ALIGN: u64 = 1_000_000;

#[derive(Debug, Clone)]
struct ContractEntry {
    /// State as first loaded from the provider.
    origin: AccountRecord,
    /// Base64 `ShardAccount` BOC as last returned by the emulator.
    current: String,
}

impl ContractEntry {
    fn from_origin(origin: AccountRecord) -> Result<Self, EmulationError> {
        let current = Boc::encode_base64(&origin.to_shard_account().to_cell()?);
        Ok(Self { origin, current })
    }

    fn rewind(&mut self) -> Result<(), EmulationError> {
        self.current = Boc::encode_base64(&self.origin.to_shard_account().to_cell()?);
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct QueuedMessage {
    cell: Cell,
    destination: StdAddress,
    ignore_chksig: bool,
}

/// Restorable capture of a [`Blockchain`].
#[derive(Debug, Clone)]
pub struct BlockchainSnapshot {
    contracts: HashMap<StdAddress, ContractEntry>,
    pub lt: u64,
    pub now: Option<u32>,
    pub libs: Option<Cell>,
}

impl BlockchainSnapshot {
    pub fn addresses(&self) -> impl Iterator<Item = &StdAddress> {
        self.contracts.keys()
    }

    /// Current shard account of `address`, if it was visited.
    pub fn shard_account(&self, address: &StdAddress) -> Option<&str> {
        self.contracts.get(address).map(|c| c.current.as_str())
    }
}

/// One transaction run by the chain together with the emulator's logs.
#[derive(Debug, Clone)]
pub struct ProducedTransaction {
    pub address: StdAddress,
    pub cell: Cell,
    pub transaction: Transaction,
    pub vm_log: String,
    pub logs: String,
    pub actions: Option<String>,
}

pub struct Blockchain {
    provider: Arc<StateProvider>,
    vm: Arc<VmBoundary>,
    config: Arc<str>,
    libs: Option<Cell>,
    verbosity: Verbosity,
    contracts: HashMap<StdAddress, ContractEntry>,
    queue: VecDeque<QueuedMessage>,
    lt: u64,
    now: Option<u32>,
    gas_limit: u64,
    debug_enabled: bool,
}

impl Blockchain {
    /// `config` is the base64 BOC of the config params.
    pub fn new(
        provider: Arc<StateProvider>,
        vm: Arc<VmBoundary>,
        config: Arc<str>,
        libs: Option<Cell>,
        verbosity: Verbosity,
    ) -> Self {
        Self {
            provider,
            vm,
            config,
            libs,
            verbosity,
            contracts: HashMap::new(),
            queue: VecDeque::new(),
            lt: 0,
            now: None,
            gas_limit: 10_000_000,
            debug_enabled: true,
        }
    }

    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = gas_limit;
        self
    }

    /// Pins the wall clock used for `now`; unset means the current time.
    pub fn set_now(&mut self, now: Option<u32>) {
        self.now = now;
    }

    pub fn set_verbosity(&mut self, verbosity: Verbosity) {
        self.verbosity = verbosity;
    }

    pub fn lt(&self) -> u64 {
        self.lt
    }

    pub fn libs(&self) -> Option<&Cell> {
        self.libs.as_ref()
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    fn current_time(&self) -> u32 {
        self.now
            .unwrap_or_else(|| u32::try_from(chrono::Utc::now().timestamp()).unwrap_or(u32::MAX))
    }

    /// Queues an inbound message. Only internal and external-in messages can
    /// be delivered.
    pub fn send_message(&mut self, message: &Cell, ignore_chksig: bool) -> Result<(), EmulationError> {
        let decoded = Message::load(message)?;
        let destination = decoded
            .destination()
            .ok_or_else(|| CellError::InvalidAddress("message has no destination".into()))?;
        self.queue.push_back(QueuedMessage {
            cell: message.clone(),
            destination,
            ignore_chksig,
        });
        Ok(())
    }

    async fn contract(&mut self, address: &StdAddress) -> Result<&mut ContractEntry, EmulationError> {
        match self.contracts.entry(*address) {
            Entry::Occupied(slot) => Ok(slot.into_mut()),
            Entry::Vacant(slot) => {
                let record = self.provider.get_contract(address).await?;
                Ok(slot.insert(ContractEntry::from_origin(record)?))
            }
        }
    }

    /// Runs the oldest queued message. `None` once the queue is drained.
    pub async fn next(&mut self) -> Result<Option<ProducedTransaction>, EmulationError> {
        let Some(message) = self.queue.pop_front() else {
            return Ok(None);
        };
        let address = message.destination;
        let shard_account = self.contract(&address).await?.current.clone();

        self.lt += LT_ALIGN;
        let args = EmulationArgs {
            config: &self.config,
            libs: self.libs.as_ref(),
            verbosity: self.verbosity,
            shard_account: &shard_account,
            now: self.current_time(),
            lt: self.lt,
            rand_seed: None,
            ignore_chksig: message.ignore_chksig,
            debug_enabled: self.debug_enabled,
        };
        let outcome = self.vm.run_transaction(&args, &message.cell)?;

        let success = match outcome {
            EmulationOutcome::Success(success) => success,
            EmulationOutcome::Failure(failure) => {
                debug!(%address, error = %failure.error, "message rejected");
                return Err(EmulationError::Rejected {
                    address,
                    error: failure.error,
                    exit_code: failure.vm_exit_code,
                    vm_log: failure.vm_log.unwrap_or_default(),
                });
            }
        };

        let transaction = Transaction::load(&success.transaction)?;
        if let Err(err) = Boc::decode_base64(&success.shard_account).and_then(|c| ShardAccount::load(&c)) {
            warn!(%address, %err, "emulator returned an unreadable shard account, keeping it as is");
        }
        if let Some(entry) = self.contracts.get_mut(&address) {
            entry.current = success.shard_account;
        }

        for out in &transaction.out_msgs {
            let decoded = Message::load(out)?;
            if !decoded.is_internal() {
                continue;
            }
            if let Some(destination) = decoded.destination() {
                self.queue.push_back(QueuedMessage {
                    cell: out.clone(),
                    destination,
                    ignore_chksig: false,
                });
            }
        }
        trace!(%address, lt = transaction.lt, queued = self.queue.len(), "transaction produced");

        Ok(Some(ProducedTransaction {
            address,
            cell: success.transaction,
            transaction,
            vm_log: success.vm_log,
            logs: success.logs,
            actions: success.actions,
        }))
    }

    pub fn snapshot(&self) -> BlockchainSnapshot {
        BlockchainSnapshot {
            contracts: self.contracts.clone(),
            lt: self.lt,
            now: self.now,
            libs: self.libs.clone(),
        }
    }

    /// Replaces every account, the clocks and the libraries with `snapshot`.
    /// Pending messages are dropped.
    pub fn restore(&mut self, snapshot: BlockchainSnapshot) {
        self.contracts = snapshot.contracts;
        self.lt = snapshot.lt;
        self.now = snapshot.now;
        self.libs = snapshot.libs;
        self.queue.clear();
    }

    /// Puts every visited account back into the state it was first loaded
    /// with and resets logical time.
    pub fn rewind_to_origin(&mut self) -> Result<(), EmulationError> {
        for entry in self.contracts.values_mut() {
            entry.rewind()?;
        }
        self.lt = 0;
        self.queue.clear();
        Ok(())
    }

    /// Runs `method` against the current local state of `address`.
    pub async fn run_get_method(
        &mut self,
        address: &StdAddress,
        method: &str,
        stack: &[StackEntry],
    ) -> Result<Vec<StackEntry>, EmulationError> {
        let current = self.contract(address).await?.current.clone();
        let shard = ShardAccount::load(&Boc::decode_base64(&current)?)?;
        let balance = shard.balance();
        let account = shard.account.ok_or(EmulationError::NotActive(*address))?;
        let (Some(code), Some(data)) = (account.code(), account.data()) else {
            return Err(EmulationError::NotActive(*address));
        };

        let args = GetMethodArgs {
            config: &self.config,
            libs: self.libs.as_ref(),
            verbosity: self.verbosity,
            code,
            data,
            address: *address,
            method_id: method_id(method),
            stack,
            unixtime: self.current_time(),
            balance,
            rand_seed: HashBytes::ZERO,
            gas_limit: self.gas_limit,
            debug_enabled: self.debug_enabled,
        };
        match self.vm.run_get_method(&args)? {
            GetMethodOutcome::Success { stack, exit_code, .. } if exit_code == 0 || exit_code == 1 => Ok(stack),
            GetMethodOutcome::Success { exit_code, .. } => Err(EmulationError::GetMethod {
                method: method.to_string(),
                exit_code,
            }),
            GetMethodOutcome::Failure { error, .. } => Err(VmError::Failed(error).into()),
        }
    }
}
