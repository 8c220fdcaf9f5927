//! In-memory fakes shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use retrace_core::stack::serialize_stack;
use retrace_core::tlb::{
    AccStatusChange, AccountStatus, CommonMsgInfo, ComputePhase, CurrencyCollection, HashUpdate, Message,
    OrdinaryDescr, ShardAccount, StateInit, StoragePhase, TickTockDescr, Transaction, TxDescription, VmComputePhase,
};
use retrace_core::{dict, Boc, Cell, CellBuilder, HashBytes, MsgAddress, StackEntry, StdAddress};
use retrace_rt::client::{
    BlockContext, BlockRef, HistoricalTx, HistoryClient, LastTransaction, LedgerClient, LibraryEntry, RemoteAccount,
    RemoteContract, ShardLayout, TraceIndex, TraceResponse,
};
use retrace_rt::error::{ClientError, VmError};
use retrace_rt::vm::{ComputeModule, EmulatorHandle};
use retrace_rt::Execution;
use serde_json::{json, Value};
use tokio::sync::{oneshot, Notify};
use tokio_util::sync::CancellationToken;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ---------------------------------------------------------------------------
// Cells
// ---------------------------------------------------------------------------

pub fn addr(first: u8) -> StdAddress {
    let mut hash = [0x11u8; 32];
    hash[0] = first;
    StdAddress::new(0, HashBytes(hash))
}

pub fn tagged(tag: u32) -> Cell {
    let mut b = CellBuilder::new();
    b.store_u32(tag).unwrap();
    b.build().unwrap()
}

pub fn op_body(op: u32) -> Cell {
    let mut b = CellBuilder::new();
    b.store_u32(op).unwrap();
    b.store_u64(0).unwrap();
    b.build().unwrap()
}

pub fn internal_message(src: StdAddress, dest: StdAddress, body: Cell, created_lt: u64) -> Cell {
    Message {
        info: CommonMsgInfo::Internal {
            ihr_disabled: true,
            bounce: true,
            bounced: false,
            src: MsgAddress::Std(src),
            dest,
            value: CurrencyCollection::from_grams(1_000_000),
            ihr_fee: 0,
            fwd_fee: 0,
            created_lt,
            created_at: 0,
        },
        init: None,
        body,
    }
    .to_cell()
    .unwrap()
}

pub fn external_message(dest: StdAddress, body: Cell) -> Cell {
    Message {
        info: CommonMsgInfo::ExternalIn {
            src: MsgAddress::None,
            dest,
            import_fee: 0,
        },
        init: None,
        body,
    }
    .to_cell()
    .unwrap()
}

fn vm_phase(exit_code: i32) -> ComputePhase {
    ComputePhase::Vm(VmComputePhase {
        success: exit_code == 0,
        msg_state_used: false,
        account_activated: false,
        gas_fees: 1000,
        gas_used: 500,
        gas_limit: 1_000_000,
        gas_credit: None,
        mode: 0,
        exit_code,
        exit_arg: None,
        vm_steps: 10,
        vm_init_state_hash: HashBytes::ZERO,
        vm_final_state_hash: HashBytes::ZERO,
    })
}

fn committed(account: StdAddress, lt: u64, now: u32, in_msg: Option<Cell>, out_msgs: Vec<Cell>, description: TxDescription) -> Cell {
    Transaction {
        account: account.hash,
        lt,
        prev_trans_hash: HashBytes::ZERO,
        prev_trans_lt: 0,
        now,
        orig_status: AccountStatus::Active,
        end_status: AccountStatus::Active,
        in_msg,
        out_msgs,
        total_fees: CurrencyCollection::from_grams(1000),
        state_update: HashUpdate {
            old_hash: HashBytes([1; 32]),
            new_hash: HashBytes([2; 32]),
        },
        description,
    }
    .to_cell()
    .unwrap()
}

pub fn transaction(account: StdAddress, lt: u64, now: u32, in_msg: Cell, out_msgs: Vec<Cell>, exit_code: i32) -> Cell {
    let description = TxDescription::Ordinary(OrdinaryDescr {
        credit_first: false,
        storage_ph: None,
        credit_ph: None,
        compute_ph: vm_phase(exit_code),
        action: None,
        aborted: exit_code != 0,
        bounce: None,
        destroyed: false,
    });
    committed(account, lt, now, Some(in_msg), out_msgs, description)
}

pub fn tick_tock_transaction(account: StdAddress, lt: u64, now: u32, is_tock: bool) -> Cell {
    let description = TxDescription::TickTock(TickTockDescr {
        is_tock,
        storage_ph: StoragePhase {
            fees_collected: 0,
            fees_due: None,
            status_change: AccStatusChange::Unchanged,
        },
        compute_ph: vm_phase(0),
        action: None,
        aborted: false,
        destroyed: false,
    });
    committed(account, lt, now, None, Vec::new(), description)
}

/// Copy of a committed transaction recording a different new state hash.
pub fn diverged(cell: &Cell) -> Cell {
    let mut tx = Transaction::load(cell).unwrap();
    tx.state_update.new_hash = HashBytes([0xdd; 32]);
    tx.to_cell().unwrap()
}

/// Ordinary cell whose single reference is the library cell for `hash`.
pub fn code_using(hash: &HashBytes) -> Cell {
    let mut b = CellBuilder::new();
    b.store_u32(0xc0de).unwrap();
    b.store_reference(Cell::library(hash)).unwrap();
    b.build().unwrap()
}

pub fn deploy_message(src: StdAddress, dest: StdAddress, code: Cell, created_lt: u64) -> Cell {
    let mut message = Message::load(&internal_message(src, dest, Cell::empty(), created_lt)).unwrap();
    message.init = Some(StateInit::new(code, Cell::empty()));
    message.to_cell().unwrap()
}

fn block() -> BlockRef {
    BlockRef {
        workchain: -1,
        shard: 0x8000_0000_0000_0000,
        seqno: 100,
        root_hash: HashBytes([3; 32]),
        file_hash: HashBytes([4; 32]),
    }
}

fn active_account(code: Cell) -> RemoteAccount {
    RemoteAccount {
        balance: 5_000_000_000,
        extra_currencies: None,
        last_transaction: Some(LastTransaction {
            lt: 42,
            hash: HashBytes([9; 32]),
        }),
        contract: RemoteContract::Active {
            code: Some(code),
            data: Some(Cell::empty()),
        },
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeLedger {
    libraries: Mutex<HashMap<HashBytes, Cell>>,
    layout: Mutex<ShardLayout>,
    pub library_requests: AtomicUsize,
    pub account_requests: AtomicUsize,
}

impl FakeLedger {
    /// Publishes `root` as a library and returns its hash.
    pub fn add_library(&self, root: Cell) -> HashBytes {
        let hash = root.hash();
        self.libraries.lock().insert(hash, root);
        hash
    }

    pub fn set_layout(&self, layout: ShardLayout) {
        *self.layout.lock() = layout;
    }
}

#[async_trait]
impl LedgerClient for FakeLedger {
    async fn reference_block(&self) -> Result<BlockRef, ClientError> {
        Ok(block())
    }

    async fn account_state(
        &self,
        address: &StdAddress,
        _block: &BlockRef,
    ) -> Result<Option<RemoteAccount>, ClientError> {
        self.account_requests.fetch_add(1, Ordering::SeqCst);
        Ok(Some(active_account(tagged(u32::from(address.hash.0[0])))))
    }

    async fn libraries(&self, hashes: &[HashBytes]) -> Result<Vec<LibraryEntry>, ClientError> {
        self.library_requests.fetch_add(1, Ordering::SeqCst);
        let known = self.libraries.lock();
        Ok(hashes
            .iter()
            .filter_map(|h| known.get(h).map(|root| LibraryEntry { hash: *h, root: root.clone() }))
            .collect())
    }

    async fn send_message(&self, _message: &Cell) -> Result<(), ClientError> {
        Ok(())
    }

    async fn shard_layout(&self, _block: &BlockRef) -> Result<ShardLayout, ClientError> {
        let layout = self.layout.lock().clone();
        if layout.shards.is_empty() {
            Ok(ShardLayout::single(0))
        } else {
            Ok(layout)
        }
    }

    async fn config(&self, _block: &BlockRef) -> Result<Cell, ClientError> {
        Ok(tagged(0xc0f1))
    }
}

// ---------------------------------------------------------------------------
// Compute module
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum WalletScript {
    Data {
        balance: i64,
        owner: StdAddress,
        master: StdAddress,
    },
    Fails(i32),
    /// Succeeds with a stack that does not start with the balance.
    Unreadable,
}

/// How the scripted VM reacts to a message landing on one account.
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub sends: Vec<(StdAddress, Cell)>,
    pub needs_library: Option<HashBytes>,
    pub wallet: Option<WalletScript>,
}

#[derive(Default)]
pub struct ScriptedVm {
    scripts: Mutex<HashMap<StdAddress, Script>>,
    handles: Mutex<HashMap<u64, i32>>,
    next_handle: AtomicU64,
    /// `(account, verbosity)` of every emulate call, in order.
    pub emulations: Mutex<Vec<(StdAddress, i32)>>,
    /// Logical time of every emulate call, in order.
    pub lts: Mutex<Vec<u64>>,
    rejected_lts: Mutex<HashSet<u64>>,
    cancel_on: Mutex<Option<(StdAddress, Execution)>>,
}

impl ScriptedVm {
    pub fn script(&self, address: StdAddress, script: Script) {
        self.scripts.lock().insert(address, script);
    }

    /// Cancels `execution` as soon as a message reaches `address`.
    pub fn cancel_when(&self, address: StdAddress, execution: Execution) {
        *self.cancel_on.lock() = Some((address, execution));
    }

    /// Makes the emulator refuse the transaction at `lt`.
    pub fn reject_at(&self, lt: u64) {
        self.rejected_lts.lock().insert(lt);
    }

    pub fn emulated_accounts(&self) -> Vec<StdAddress> {
        self.emulations.lock().iter().map(|(a, _)| *a).collect()
    }
}

fn known_libraries(libs: Option<&str>) -> HashSet<HashBytes> {
    let Some(libs) = libs else {
        return HashSet::new();
    };
    let root = Boc::decode_base64(libs).unwrap();
    dict::entries(&root, 256)
        .unwrap()
        .into_iter()
        .map(|(key, _)| dict::key_to_hash(&key).unwrap())
        .collect()
}

fn slice_of(address: &StdAddress) -> StackEntry {
    let mut b = CellBuilder::new();
    address.store(&mut b).unwrap();
    StackEntry::Slice(b.build().unwrap())
}

impl ComputeModule for ScriptedVm {
    fn create_emulator(&self, _config: &str, verbosity: i32) -> Result<EmulatorHandle, VmError> {
        let id = self.next_handle.fetch_add(1, Ordering::SeqCst) + 1;
        self.handles.lock().insert(id, verbosity);
        Ok(EmulatorHandle(id))
    }

    fn destroy_emulator(&self, handle: EmulatorHandle) {
        self.handles.lock().remove(&handle.0);
    }

    fn emulate(
        &self,
        handle: EmulatorHandle,
        libs: Option<&str>,
        shard_account: &str,
        message: Option<&str>,
        params: &str,
    ) -> Result<String, VmError> {
        let verbosity = *self
            .handles
            .lock()
            .get(&handle.0)
            .ok_or_else(|| VmError::Module("unknown emulator handle".into()))?;
        let params: Value = serde_json::from_str(params).unwrap();
        let lt: u64 = params["lt"].as_str().unwrap().parse().unwrap();
        let now = params["utime"].as_u64().unwrap() as u32;

        let (dest, in_msg) = match message {
            Some(message) => {
                let in_msg = Boc::decode_base64(message).unwrap();
                (Message::load(&in_msg).unwrap().destination().unwrap(), Some(in_msg))
            }
            None => {
                let state = ShardAccount::load(&Boc::decode_base64(shard_account).unwrap()).unwrap();
                (state.account.unwrap().address, None)
            }
        };
        self.emulations.lock().push((dest, verbosity));
        self.lts.lock().push(lt);
        if let Some((target, execution)) = self.cancel_on.lock().as_ref() {
            if *target == dest {
                execution.cancel();
            }
        }
        if self.rejected_lts.lock().contains(&lt) {
            return Ok(json!({
                "output": {
                    "success": false,
                    "error": "cannot run transaction",
                    "external_not_accepted": false,
                    "vm_exit_code": 13,
                    "vm_log": "out of gas",
                },
                "logs": "rejected",
            })
            .to_string());
        }

        let script = self.scripts.lock().get(&dest).cloned().unwrap_or_default();
        let missing = script.needs_library.filter(|h| !known_libraries(libs).contains(h));
        let (exit_code, vm_log) = match missing {
            Some(hash) => {
                let mut log = String::from("execute XLOAD\nfailed to load library cell\n");
                if verbosity >= 5 {
                    log.push_str(&format!("stack: [ C{{{}}} ]\n", Boc::encode_hex(&Cell::library(&hash))));
                }
                (9, log)
            }
            None => (0, String::from("execute RET\n")),
        };
        let out_msgs = if exit_code == 0 {
            script
                .sends
                .iter()
                .enumerate()
                .map(|(i, (to, body))| internal_message(dest, *to, body.clone(), lt + 1 + i as u64))
                .collect()
        } else {
            Vec::new()
        };
        let tx = match in_msg {
            Some(in_msg) => transaction(dest, lt, now, in_msg, out_msgs, exit_code),
            None => tick_tock_transaction(dest, lt, now, params["is_tock"].as_bool().unwrap_or(false)),
        };
        Ok(json!({
            "output": {
                "success": true,
                "transaction": Boc::encode_base64(&tx),
                "shard_account": shard_account,
                "vm_log": vm_log,
                "actions": null,
            },
            "logs": "blockchain log",
        })
        .to_string())
    }

    fn run_get_method(&self, params: &str, _stack: &str, _config: &str) -> Result<String, VmError> {
        let params: Value = serde_json::from_str(params).unwrap();
        let address: StdAddress = params["address"].as_str().unwrap().parse().unwrap();
        let wallet = self.scripts.lock().get(&address).and_then(|s| s.wallet.clone());
        let (stack, exit_code) = match wallet {
            Some(WalletScript::Data { balance, owner, master }) => (
                vec![
                    StackEntry::int(balance),
                    slice_of(&owner),
                    slice_of(&master),
                    StackEntry::Cell(Cell::empty()),
                ],
                0,
            ),
            Some(WalletScript::Fails(code)) => (Vec::new(), code),
            Some(WalletScript::Unreadable) => (vec![StackEntry::Null, StackEntry::Null], 0),
            None => (Vec::new(), 11),
        };
        Ok(json!({
            "output": {
                "success": true,
                "stack": Boc::encode_base64(&serialize_stack(&stack).unwrap()),
                "gas_used": "1200",
                "vm_exit_code": exit_code,
                "vm_log": "",
                "missing_library": null,
            },
            "logs": "",
        })
        .to_string())
    }
}

// ---------------------------------------------------------------------------
// History and trace index
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeHistory {
    transactions: Mutex<HashMap<HashBytes, Cell>>,
    /// Earlier transactions of the same account and block, keyed by target.
    earlier: Mutex<HashMap<HashBytes, Vec<Cell>>>,
    codes: Mutex<HashMap<StdAddress, Cell>>,
}

impl FakeHistory {
    /// Records a committed transaction of `account` and returns its cell.
    pub fn commit(&self, account: StdAddress, lt: u64, in_msg: Cell) -> Cell {
        self.commit_cell(transaction(account, lt, 1_700_000_000, in_msg, Vec::new(), 0))
    }

    pub fn commit_cell(&self, cell: Cell) -> Cell {
        self.transactions.lock().insert(cell.hash(), cell.clone());
        cell
    }

    /// Declares `earlier` as committed before `target` in its block.
    pub fn same_block(&self, target: &Cell, earlier: Vec<Cell>) {
        for cell in &earlier {
            self.commit_cell(cell.clone());
        }
        self.earlier.lock().insert(target.hash(), earlier);
    }

    pub fn set_code(&self, account: StdAddress, code: Cell) {
        self.codes.lock().insert(account, code);
    }
}

#[async_trait]
impl HistoryClient for FakeHistory {
    async fn transaction(&self, _address: &StdAddress, _lt: u64, hash: &HashBytes) -> Result<HistoricalTx, ClientError> {
        let cell = self
            .transactions
            .lock()
            .get(hash)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(hash.to_string()))?;
        Ok(HistoricalTx { cell, block: block() })
    }

    async fn block_context(&self, _block: &BlockRef) -> Result<BlockContext, ClientError> {
        Ok(BlockContext {
            mc_seqno: 100,
            rand_seed: HashBytes([7; 32]),
        })
    }

    async fn config_at(&self, _mc_seqno: u32) -> Result<Cell, ClientError> {
        Ok(tagged(0xc0f1))
    }

    async fn account_at(&self, address: &StdAddress, _mc_seqno: u32) -> Result<Option<RemoteAccount>, ClientError> {
        let code = self
            .codes
            .lock()
            .get(address)
            .cloned()
            .unwrap_or_else(|| tagged(u32::from(address.hash.0[0])));
        Ok(Some(active_account(code)))
    }

    async fn block_transactions(
        &self,
        address: &StdAddress,
        lt: u64,
        hash: &HashBytes,
        _mc_seqno: u32,
    ) -> Result<Vec<Cell>, ClientError> {
        let mut out = self.earlier.lock().get(hash).cloned().unwrap_or_default();
        out.push(self.transaction(address, lt, hash).await?.cell);
        Ok(out)
    }
}

#[derive(Default)]
pub struct FakeIndex {
    response: Mutex<Value>,
    pub calls: AtomicUsize,
    /// Notified whenever a request reaches the index.
    pub entered: Notify,
    gate: Mutex<Option<oneshot::Receiver<()>>>,
}

impl FakeIndex {
    pub fn respond(&self, response: Value) {
        *self.response.lock() = response;
    }

    /// Holds the next request until `release` fires.
    pub fn hold_until(&self, release: oneshot::Receiver<()>) {
        *self.gate.lock() = Some(release);
    }
}

#[async_trait]
impl TraceIndex for FakeIndex {
    async fn traces(&self, _tx_hash: &str, cancel: &CancellationToken) -> Result<TraceResponse, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if cancel.is_cancelled() {
            return Err(ClientError::Cancelled);
        }
        self.entered.notify_one();
        let gate = self.gate.lock().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        let body = self.response.lock().clone();
        serde_json::from_value(body).map_err(|e| ClientError::Decode(e.to_string()))
    }
}
