//! Emulation session: runs a message cascade to completion, restarting from a
//! clean chain whenever a missing library is discovered and fetched.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use retrace_core::tlb::{ComputePhase, Message};
use retrace_core::{Boc, Cell, HashBytes, StdAddress};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::blockchain::{Blockchain, BlockchainSnapshot, ProducedTransaction};
use crate::cancel::Execution;
use crate::client::ShardLayout;
use crate::config::EmulationSection;
use crate::decode::{MessageDecoder, OpcodeDecoder, ParsedInternal};
use crate::emulated::{attach, EmulatedTransaction};
use crate::error::EmulationError;
use crate::jetton;
use crate::libraries::{extract_log_cells, LibraryResolver, LibraryTable};
use crate::progress::{self, ProgressSender};
use crate::shards::delivery_delay;
use crate::state::StateProvider;
use crate::vm::VmBoundary;

/// Exit code the VM reports when a cell cannot be loaded.
const CELL_UNDERFLOW_EXIT: i32 = 9;
const MISSING_LIBRARY_MARKER: &str = "failed to load library cell";

/// True when the compute phase died trying to dereference an unknown library.
pub fn is_missing_library(tx: &EmulatedTransaction) -> bool {
    let vm_failed = matches!(
        tx.transaction.compute_phase(),
        Some(ComputePhase::Vm(vm)) if vm.exit_code == CELL_UNDERFLOW_EXIT
    );
    vm_failed && tx.compute.vm_log.contains(MISSING_LIBRARY_MARKER)
}

fn ensure_live(execution: &Execution) -> Result<(), EmulationError> {
    if execution.is_live() {
        Ok(())
    } else {
        Err(EmulationError::Cancelled)
    }
}

#[derive(Debug, Clone)]
pub struct SessionOutput {
    pub transactions: Vec<EmulatedTransaction>,
    pub snapshot: BlockchainSnapshot,
    pub restarts: usize,
}

enum Attempt {
    Finished {
        transactions: Vec<EmulatedTransaction>,
        snapshot: BlockchainSnapshot,
    },
    Restart,
}

pub struct EmulationSession {
    provider: Arc<StateProvider>,
    resolver: LibraryResolver,
    vm: Arc<VmBoundary>,
    decoder: Arc<dyn MessageDecoder>,
    settings: EmulationSection,
}

impl EmulationSession {
    pub fn new(
        provider: Arc<StateProvider>,
        libraries: Arc<LibraryTable>,
        vm: Arc<VmBoundary>,
        settings: EmulationSection,
    ) -> Self {
        let resolver = LibraryResolver::new(Arc::clone(provider.client()), libraries);
        Self {
            provider,
            resolver,
            vm,
            decoder: Arc::new(OpcodeDecoder),
            settings,
        }
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn MessageDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn libraries(&self) -> &Arc<LibraryTable> {
        self.resolver.table()
    }

    /// Emulates `message` and everything it triggers.
    ///
    /// Transactions are published to `progress` as they are produced. A
    /// restart clears the published list before the next attempt begins.
    #[instrument(name = "emulation", skip_all, fields(run = %Uuid::new_v4(), message = %message.hash()))]
    pub async fn emulate(
        &self,
        message: &Cell,
        ignore_chksig: bool,
        execution: &Execution,
        progress: &ProgressSender<EmulatedTransaction>,
    ) -> Result<SessionOutput, EmulationError> {
        let mut restarts = 0;
        // Accounts whose missing library the ledger could not supply.
        let mut unrecoverable = HashSet::new();
        loop {
            ensure_live(execution)?;
            match self
                .attempt(message, ignore_chksig, &mut unrecoverable, execution, progress)
                .await?
            {
                Attempt::Finished { transactions, snapshot } => {
                    info!(count = transactions.len(), restarts, "emulation finished");
                    return Ok(SessionOutput {
                        transactions,
                        snapshot,
                        restarts,
                    });
                }
                Attempt::Restart => {
                    restarts += 1;
                    if restarts > self.settings.max_restarts {
                        return Err(EmulationError::RestartLimit(self.settings.max_restarts));
                    }
                    info!(restarts, libraries = self.libraries().len(), "restarting with new libraries");
                }
            }
        }
    }

    #[instrument(skip_all)]
    async fn attempt(
        &self,
        message: &Cell,
        ignore_chksig: bool,
        unrecoverable: &mut HashSet<StdAddress>,
        execution: &Execution,
        progress: &ProgressSender<EmulatedTransaction>,
    ) -> Result<Attempt, EmulationError> {
        if !progress::reset(progress, execution, 1) {
            return Err(EmulationError::Cancelled);
        }

        let client = self.provider.client();
        let block = client.reference_block().await?;
        ensure_live(execution)?;
        let config: Arc<str> = Boc::encode_base64(&client.config(&block).await?).into();
        let layout = client.shard_layout(&block).await?;
        ensure_live(execution)?;

        let mut chain = Blockchain::new(
            Arc::clone(&self.provider),
            Arc::clone(&self.vm),
            Arc::clone(&config),
            self.libraries().to_dict()?,
            self.settings.verbosity,
        )
        .with_gas_limit(self.settings.get_method_gas_limit);
        chain.send_message(message, ignore_chksig)?;

        let mut transactions: Vec<EmulatedTransaction> = Vec::new();
        // Outbound message hash -> index of the transaction that sent it.
        let mut senders: HashMap<HashBytes, usize> = HashMap::new();

        while let Some(produced) = chain.next().await? {
            ensure_live(execution)?;
            let parent = produced
                .transaction
                .in_msg
                .as_ref()
                .and_then(|m| senders.get(&m.hash()).copied());
            let mut tx = self.annotate(produced, parent.map(|p| &transactions[p]), &layout)?;
            self.enrich(&mut chain, &mut tx).await;
            ensure_live(execution)?;

            if is_missing_library(&tx) && !unrecoverable.contains(&tx.address) {
                warn!(account = %tx.address, lt = tx.lt, "missing library");
                let snapshot = chain.snapshot();
                if self.recover(message, &snapshot, &tx, &config, execution).await? {
                    return Ok(Attempt::Restart);
                }
                info!(account = %tx.address, "no new libraries found, keeping the failed transaction");
                unrecoverable.insert(tx.address);
            }

            for out in &tx.transaction.out_msgs {
                senders.insert(out.hash(), transactions.len());
            }
            let published = tx.clone();
            attach(&mut transactions, tx, parent);
            let total = transactions.len() + chain.pending();
            let landed = progress::update(progress, execution, total, |items| {
                attach(items, published, parent);
            });
            if !landed {
                return Err(EmulationError::Cancelled);
            }
        }

        Ok(Attempt::Finished {
            transactions,
            snapshot: chain.snapshot(),
        })
    }

    fn annotate(
        &self,
        produced: ProducedTransaction,
        parent: Option<&EmulatedTransaction>,
        layout: &ShardLayout,
    ) -> Result<EmulatedTransaction, EmulationError> {
        let mut tx = EmulatedTransaction::decode(produced.cell, produced.address, produced.vm_log, produced.logs)?;
        tx.actions = produced.actions;
        tx.shard = layout.shard_for(&tx.address);
        tx.delay = delivery_delay(
            &tx.address,
            parent.and_then(|p| p.shard),
            self.settings.cross_shard_delay,
        );
        tx.total_delay = tx.delay + parent.map_or(0, |p| p.total_delay);
        tx.parsed = tx
            .in_message
            .as_ref()
            .and_then(|m| self.decoder.decode(&m.body));
        Ok(tx)
    }

    /// Attaches jetton wallet data for jetton operations. Failures are logged
    /// and otherwise ignored.
    async fn enrich(&self, chain: &mut Blockchain, tx: &mut EmulatedTransaction) {
        if tx.parsed.as_ref().and_then(ParsedInternal::jetton_op).is_none() {
            return;
        }
        match jetton::wallet_data(chain, &tx.address).await {
            Ok(data) => tx.jetton = Some(data),
            Err(err) => warn!(account = %tx.address, %err, "get_wallet_data failed"),
        }
    }

    /// Replays the session from its starting state with verbose logging,
    /// gathers every cell that could reference the missing library and fetches
    /// what is not known yet. Returns whether anything new was added.
    #[instrument(skip_all, fields(account = %failing.address))]
    async fn recover(
        &self,
        message: &Cell,
        snapshot: &BlockchainSnapshot,
        failing: &EmulatedTransaction,
        config: &Arc<str>,
        execution: &Execution,
    ) -> Result<bool, EmulationError> {
        let mut replay = Blockchain::new(
            Arc::clone(&self.provider),
            Arc::clone(&self.vm),
            Arc::clone(config),
            snapshot.libs.clone(),
            self.settings.recovery_verbosity,
        );
        replay.restore(snapshot.clone());
        replay.rewind_to_origin()?;
        replay.send_message(message, true)?;

        let mut candidates = extract_log_cells(&failing.compute.vm_log);
        loop {
            ensure_live(execution)?;
            match replay.next().await {
                Ok(Some(produced)) => {
                    candidates.extend(extract_log_cells(&produced.vm_log));
                    if produced.address == failing.address && produced.transaction.exit_code() == Some(CELL_UNDERFLOW_EXIT)
                    {
                        break;
                    }
                }
                Ok(None) => break,
                Err(err) if err.is_cancelled() => return Err(err),
                Err(err) => {
                    warn!(%err, "diagnostic replay stopped early");
                    break;
                }
            }
        }

        for msg in [Message::load(message).ok(), failing.in_message.clone()].into_iter().flatten() {
            candidates.push(msg.body.clone());
            if let Some(code) = msg.init.and_then(|init| init.code) {
                candidates.push(code);
            }
        }
        for record in self.provider.known_contracts() {
            if record.address.hash == failing.address.hash {
                if let Some(code) = record.code() {
                    candidates.push(code.clone());
                }
            }
        }

        let added = self.resolver.resolve(&candidates).await?;
        ensure_live(execution)?;
        debug!(candidates = candidates.len(), added, "library recovery finished");
        Ok(added > 0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
