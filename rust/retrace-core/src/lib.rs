//! Cell model for the retrace engine.
//!
//! Cells, builders and slices, bag-of-cells encoding, fixed-width-key
//! dictionaries, addresses, VM stacks and the TL-B codecs of the messages,
//! accounts and transactions that flow through emulation.

pub mod address;
pub mod boc;
pub mod builder;
pub mod cell;
pub mod dict;
pub mod error;
pub mod slice;
pub mod stack;
pub mod tlb;

pub use address::{MsgAddress, StdAddress};
pub use boc::Boc;
pub use builder::CellBuilder;
pub use cell::{Cell, CellKind, HashBytes};
pub use error::{CellError, CellResult};
pub use slice::CellSlice;
pub use stack::StackEntry;
