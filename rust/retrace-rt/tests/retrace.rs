//! Historical replay of committed transactions against an archive fake.

mod common;

use std::sync::Arc;

use common::*;
use retrace_core::tlb::TxDescription;
use retrace_core::{Cell, StdAddress};
use retrace_rt::{EmulationError, EmulationSection, Execution, HistoricalRetracer, LibraryTable, VmBoundary};

const NOW: u32 = 1_700_000_000;

struct Harness {
    history: Arc<FakeHistory>,
    ledger: Arc<FakeLedger>,
    libraries: Arc<LibraryTable>,
    vm: Arc<ScriptedVm>,
    retracer: HistoricalRetracer,
}

fn harness() -> Harness {
    init_tracing();
    let history = Arc::new(FakeHistory::default());
    let ledger = Arc::new(FakeLedger::default());
    let libraries = LibraryTable::new();
    let vm = Arc::new(ScriptedVm::default());
    let retracer = HistoricalRetracer::new(
        history.clone(),
        ledger.clone(),
        libraries.clone(),
        Arc::new(VmBoundary::new(vm.clone())),
        EmulationSection::default(),
    );
    Harness {
        history,
        ledger,
        libraries,
        vm,
        retracer,
    }
}

fn incoming(account: StdAddress, lt: u64) -> Cell {
    transaction(
        account,
        lt,
        NOW,
        internal_message(addr(0xee), account, Cell::empty(), lt - 1),
        Vec::new(),
        0,
    )
}

#[tokio::test]
async fn earlier_transactions_are_replayed_first() {
    let h = harness();
    let account = addr(0x10);
    let target = h.history.commit_cell(incoming(account, 3_000));
    h.history
        .same_block(&target, vec![incoming(account, 1_000), incoming(account, 2_000)]);

    let out = h
        .retracer
        .retrace(&account, 3_000, &target.hash(), &Execution::detached())
        .await
        .unwrap();

    assert_eq!(*h.vm.lts.lock(), vec![1_000, 2_000, 3_000]);
    assert_eq!(out.replayed, 3);
    assert_eq!(out.mc_seqno, 100);
    assert_eq!(out.emulated.lt, 3_000);
    assert_eq!(out.emulated.hash, target.hash());
    assert!(out.state_matches);
}

#[tokio::test]
async fn tick_tock_transactions_replay_without_a_message() {
    let h = harness();
    let account = StdAddress::new(-1, addr(0x33).hash);
    let target = h
        .history
        .commit_cell(tick_tock_transaction(account, 5_000, NOW, true));

    let out = h
        .retracer
        .retrace(&account, 5_000, &target.hash(), &Execution::detached())
        .await
        .unwrap();

    assert_eq!(h.vm.emulated_accounts(), vec![account]);
    assert!(out.emulated.in_message.is_none());
    assert!(matches!(
        out.emulated.transaction.description,
        TxDescription::TickTock(ref d) if d.is_tock
    ));
    assert!(out.state_matches);
}

#[tokio::test]
async fn diverging_state_is_reported() {
    let h = harness();
    let account = addr(0x10);
    let target = h.history.commit_cell(diverged(&incoming(account, 3_000)));

    let out = h
        .retracer
        .retrace(&account, 3_000, &target.hash(), &Execution::detached())
        .await
        .unwrap();

    assert!(!out.state_matches);
    assert_ne!(
        out.emulated.transaction.state_update.new_hash,
        out.original.state_update.new_hash
    );
}

#[tokio::test]
async fn rejected_earlier_transaction_stops_the_replay() {
    let h = harness();
    let account = addr(0x10);
    let target = h.history.commit_cell(incoming(account, 3_000));
    h.history
        .same_block(&target, vec![incoming(account, 1_000), incoming(account, 2_000)]);
    h.vm.reject_at(2_000);

    let err = h
        .retracer
        .retrace(&account, 3_000, &target.hash(), &Execution::detached())
        .await
        .unwrap_err();

    match err {
        EmulationError::Rejected {
            address,
            error,
            exit_code,
            ..
        } => {
            assert_eq!(address, account);
            assert_eq!(error, "Transaction failed for lt: 2000");
            assert_eq!(exit_code, Some(13));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(*h.vm.lts.lock(), vec![1_000, 2_000]);
}

#[tokio::test]
async fn libraries_come_from_account_code_and_deploy_code() {
    let h = harness();
    let account = addr(0x10);
    let code_library = h.ledger.add_library(tagged(0x1ab));
    let init_library = h.ledger.add_library(tagged(0x2ab));
    h.history.set_code(account, code_using(&code_library));
    h.vm.script(
        account,
        Script {
            needs_library: Some(code_library),
            ..Script::default()
        },
    );

    let deploy = deploy_message(addr(0xee), account, code_using(&init_library), 2_999);
    let target = h
        .history
        .commit_cell(transaction(account, 3_000, NOW, deploy, Vec::new(), 0));

    let out = h
        .retracer
        .retrace(&account, 3_000, &target.hash(), &Execution::detached())
        .await
        .unwrap();

    assert!(h.libraries.contains(&code_library));
    assert!(h.libraries.contains(&init_library));
    assert_eq!(out.emulated.compute.exit_code, Some(0));
    assert!(out.state_matches);
}

#[tokio::test]
async fn superseded_retrace_is_cancelled() {
    let h = harness();
    let account = addr(0x10);
    let target = h.history.commit_cell(incoming(account, 3_000));
    let execution = Execution::detached();
    execution.cancel();

    let err = h
        .retracer
        .retrace(&account, 3_000, &target.hash(), &execution)
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
    assert!(h.vm.lts.lock().is_empty());
}
