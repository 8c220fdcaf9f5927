//! Replays an already committed transaction from archive state.
//!
//! The account is loaded as of the masterchain block preceding the one the
//! transaction was committed under. Every earlier transaction of the same
//! account in that block is replayed first so the target runs against the
//! exact state it saw on chain.

use std::sync::Arc;

use retrace_core::tlb::{Transaction, TxDescription};
use retrace_core::{Boc, Cell, HashBytes, StdAddress};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::cancel::Execution;
use crate::client::{HistoryClient, LedgerClient};
use crate::config::EmulationSection;
use crate::emulated::EmulatedTransaction;
use crate::error::EmulationError;
use crate::libraries::{LibraryResolver, LibraryTable};
use crate::state::AccountRecord;
use crate::vm::{EmulationArgs, EmulationOutcome, VmBoundary};

#[derive(Debug, Clone)]
pub struct RetracedTransaction {
    pub emulated: EmulatedTransaction,
    /// The transaction as committed on chain.
    pub original: Transaction,
    /// Whether the emulated new state hash equals the committed one.
    pub state_matches: bool,
    pub mc_seqno: u32,
    /// Number of transactions replayed, the target included.
    pub replayed: usize,
}

pub struct HistoricalRetracer {
    history: Arc<dyn HistoryClient>,
    resolver: LibraryResolver,
    vm: Arc<VmBoundary>,
    settings: EmulationSection,
}

fn ensure_live(execution: &Execution) -> Result<(), EmulationError> {
    if execution.is_live() {
        Ok(())
    } else {
        Err(EmulationError::Cancelled)
    }
}

impl HistoricalRetracer {
    pub fn new(
        history: Arc<dyn HistoryClient>,
        ledger: Arc<dyn LedgerClient>,
        libraries: Arc<LibraryTable>,
        vm: Arc<VmBoundary>,
        settings: EmulationSection,
    ) -> Self {
        Self {
            history,
            resolver: LibraryResolver::new(ledger, libraries),
            vm,
            settings,
        }
    }

    #[instrument(name = "retrace", skip_all, fields(run = %Uuid::new_v4(), %address, lt = lt))]
    pub async fn retrace(
        &self,
        address: &StdAddress,
        lt: u64,
        hash: &HashBytes,
        execution: &Execution,
    ) -> Result<RetracedTransaction, EmulationError> {
        let target = self.history.transaction(address, lt, hash).await?;
        ensure_live(execution)?;
        let target_tx = Transaction::load(&target.cell)?;
        let context = self.history.block_context(&target.block).await?;
        ensure_live(execution)?;
        let config = Boc::encode_base64(&self.history.config_at(context.mc_seqno).await?);
        ensure_live(execution)?;
        let remote = self
            .history
            .account_at(address, context.mc_seqno.saturating_sub(1))
            .await?;
        ensure_live(execution)?;
        let record = AccountRecord::from_remote(*address, remote);
        debug!(mc_seqno = context.mc_seqno, "loaded archive state");

        let mut candidates: Vec<Cell> = record.code().cloned().into_iter().collect();
        if let Some(init_code) = target_tx
            .in_message()?
            .and_then(|m| m.init)
            .and_then(|init| init.code)
        {
            candidates.push(init_code);
        }
        self.resolver.resolve(&candidates).await?;
        ensure_live(execution)?;
        let libs = self.resolver.table().to_dict()?;

        let history = self
            .history
            .block_transactions(address, lt, hash, context.mc_seqno)
            .await?;
        ensure_live(execution)?;

        let mut shard_account = Boc::encode_base64(&record.to_shard_account().to_cell()?);
        let mut last = None;
        let total = history.len();
        for (index, cell) in history.into_iter().enumerate() {
            ensure_live(execution)?;
            let committed = Transaction::load(&cell)?;
            debug!(step = index + 1, total, lt = committed.lt, "replaying");
            let args = EmulationArgs {
                config: &config,
                libs: libs.as_ref(),
                verbosity: self.settings.recovery_verbosity,
                shard_account: &shard_account,
                now: committed.now,
                lt: committed.lt,
                rand_seed: Some(context.rand_seed),
                ignore_chksig: false,
                debug_enabled: true,
            };
            let outcome = match (&committed.in_msg, &committed.description) {
                (Some(message), _) => self.vm.run_transaction(&args, message)?,
                (None, TxDescription::TickTock(tick_tock)) => self.vm.run_tick_tock(&args, tick_tock.is_tock)?,
                (None, _) => {
                    return Err(EmulationError::Rejected {
                        address: *address,
                        error: format!("no inbound message in transaction at lt {}", committed.lt),
                        exit_code: None,
                        vm_log: String::new(),
                    })
                }
            };
            let success = match outcome {
                EmulationOutcome::Success(success) => success,
                EmulationOutcome::Failure(failure) => {
                    warn!(lt = committed.lt, logs = %failure.logs, "replay rejected");
                    return Err(EmulationError::Rejected {
                        address: *address,
                        error: format!("Transaction failed for lt: {}", committed.lt),
                        exit_code: failure.vm_exit_code,
                        vm_log: failure.vm_log.unwrap_or_default(),
                    });
                }
            };
            let emulated = EmulatedTransaction::decode(success.transaction, *address, success.vm_log, success.logs)?;
            let state_matches = emulated.transaction.state_update.new_hash == committed.state_update.new_hash;
            info!(lt = committed.lt, state_matches, "state update checked");
            shard_account = success.shard_account;
            last = Some((emulated, committed, state_matches));
        }

        let (emulated, original, state_matches) = last.ok_or_else(|| EmulationError::Rejected {
            address: *address,
            error: "no transactions to replay".into(),
            exit_code: None,
            vm_log: String::new(),
        })?;
        Ok(RetracedTransaction {
            emulated,
            original,
            state_matches,
            mc_seqno: context.mc_seqno,
            replayed: total,
        })
    }
}
