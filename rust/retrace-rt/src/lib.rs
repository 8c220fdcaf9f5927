//! Emulation runtime: account state, libraries, the VM boundary, the local
//! blockchain, emulation sessions and trace reconstruction.

pub mod blockchain;
pub mod cancel;
pub mod client;
pub mod config;
pub mod decode;
pub mod emulated;
pub mod error;
pub mod jetton;
pub mod libraries;
pub mod progress;
pub mod retrace;
pub mod retry;
pub mod session;
pub mod shards;
pub mod state;
pub mod trace;
pub mod vm;

pub use blockchain::{Blockchain, BlockchainSnapshot, ProducedTransaction, LT_ALIGN};
pub use cancel::{Execution, ExecutionFence};
pub use client::{
    BlockContext, BlockRef, HistoricalTx, HistoryClient, LastTransaction, LedgerClient, LibraryEntry, RemoteAccount,
    RemoteContract, ShardDescr, ShardLayout, TraceIndex, TraceNode, TraceRecord, TraceResponse,
};
pub use config::{ConfigError, EmulationSection, IndexSection, RetraceConfig};
pub use decode::{JettonOp, MessageDecoder, OpcodeDecoder, ParsedInternal};
pub use emulated::{ComputeSummary, EmulatedTransaction};
pub use error::{ClientError, EmulationError, TraceError, VmError};
pub use jetton::JettonWalletData;
pub use libraries::{LibraryResolver, LibraryTable};
pub use progress::{Progress, ProgressReceiver, ProgressSender};
pub use retrace::{HistoricalRetracer, RetracedTransaction};
pub use retry::{call_for_success, RetryPolicy};
pub use session::{EmulationSession, SessionOutput};
pub use state::{AccountRecord, ContractState, StateProvider};
pub use trace::TraceReconstructor;
pub use vm::{ComputeModule, EmulatorHandle, Verbosity, VmBoundary};
