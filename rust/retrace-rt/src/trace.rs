//! Trace reconstruction: fetch the trace graph of a transaction from the
//! index, then retrace every node breadth-first so parents are always
//! published before their children.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use retrace_core::{HashBytes, StdAddress};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::cancel::Execution;
use crate::client::{IndexedTransaction, TraceIndex, TraceNode};
use crate::decode::{MessageDecoder, OpcodeDecoder};
use crate::emulated::{attach, EmulatedTransaction};
use crate::error::{ClientError, EmulationError, TraceError};
use crate::progress::{self, ProgressSender};
use crate::retrace::HistoricalRetracer;

fn ensure_live(execution: &Execution) -> Result<(), TraceError> {
    if execution.is_live() {
        Ok(())
    } else {
        Err(TraceError::Cancelled)
    }
}

pub struct TraceReconstructor {
    index: Arc<dyn TraceIndex>,
    retracer: Arc<HistoricalRetracer>,
    decoder: Arc<dyn MessageDecoder>,
}

impl TraceReconstructor {
    pub fn new(index: Arc<dyn TraceIndex>, retracer: Arc<HistoricalRetracer>) -> Self {
        Self {
            index,
            retracer,
            decoder: Arc::new(OpcodeDecoder),
        }
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn MessageDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    /// Rebuilds the trace containing `root_tx_hash`.
    ///
    /// Nodes that fail to retrace are logged and skipped together with their
    /// subtree. Progress is `(processed, total)` where total counts every
    /// transaction the index reported.
    #[instrument(name = "trace", skip_all, fields(run = %Uuid::new_v4(), root = root_tx_hash))]
    pub async fn reconstruct(
        &self,
        root_tx_hash: &str,
        execution: &Execution,
        progress: &ProgressSender<EmulatedTransaction>,
    ) -> Result<Vec<EmulatedTransaction>, TraceError> {
        if !progress::reset(progress, execution, 0) {
            return Err(TraceError::Cancelled);
        }

        let response = self
            .index
            .traces(root_tx_hash, execution.token())
            .await
            .map_err(|err| match err {
                ClientError::Cancelled => TraceError::Cancelled,
                other => TraceError::Client(other),
            })?;
        ensure_live(execution)?;

        let record = response
            .traces
            .into_iter()
            .next()
            .ok_or_else(|| TraceError::NoTrace(root_tx_hash.to_string()))?;
        let total = record.transactions.len();
        if !progress::reset(progress, execution, total) {
            return Err(TraceError::Cancelled);
        }
        info!(total, trace_id = ?record.trace_id, "trace fetched");

        let mut queue: VecDeque<(&TraceNode, Option<&str>)> = VecDeque::new();
        if record.transactions.contains_key(&record.trace.tx_hash) {
            queue.push_back((&record.trace, None));
        }

        let mut transactions: Vec<EmulatedTransaction> = Vec::new();
        let mut positions: HashMap<&str, usize> = HashMap::new();

        while let Some((node, parent_hash)) = queue.pop_front() {
            ensure_live(execution)?;
            let Some(indexed) = record.transactions.get(&node.tx_hash) else {
                continue;
            };

            let mut tx = match self.retrace_node(indexed, execution).await {
                Ok(tx) => tx,
                Err(err) if err.is_cancelled() || !execution.is_live() => return Err(TraceError::Cancelled),
                Err(err) => {
                    warn!(tx = %node.tx_hash, %err, "skipping trace node");
                    continue;
                }
            };
            ensure_live(execution)?;

            tx.parsed = tx
                .in_message
                .as_ref()
                .and_then(|m| self.decoder.decode(&m.body));
            let parent = parent_hash.and_then(|h| positions.get(h).copied());
            positions.insert(node.tx_hash.as_str(), transactions.len());
            for child in &node.children {
                if record.transactions.contains_key(&child.tx_hash) {
                    queue.push_back((child, Some(node.tx_hash.as_str())));
                }
            }

            let published = tx.clone();
            attach(&mut transactions, tx, parent);
            let landed = progress::update(progress, execution, total, |items| {
                attach(items, published, parent);
            });
            if !landed {
                return Err(TraceError::Cancelled);
            }
            debug!(tx = %node.tx_hash, done = transactions.len(), total, "node retraced");
        }

        Ok(transactions)
    }

    async fn retrace_node(
        &self,
        indexed: &IndexedTransaction,
        execution: &Execution,
    ) -> Result<EmulatedTransaction, EmulationError> {
        let address: StdAddress = indexed.account.parse()?;
        let hash: HashBytes = indexed.hash.parse()?;
        let retraced = self.retracer.retrace(&address, indexed.lt, &hash, execution).await?;
        Ok(retraced.emulated)
    }
}
