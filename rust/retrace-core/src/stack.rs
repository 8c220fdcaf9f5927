//! TVM stack values and their `VmStack` serialization, used for get-method
//! arguments and results.

use num_bigint::BigInt;

use crate::address::{crc16, MsgAddress};
use crate::builder::CellBuilder;
use crate::cell::Cell;
use crate::error::{CellError, CellResult};
use crate::slice::CellSlice;

/// Method id for a named get-method.
pub fn method_id(name: &str) -> u32 {
    (crc16(name.as_bytes()) as u32 & 0xffff) | 0x10000
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackEntry {
    Null,
    Int(BigInt),
    Nan,
    Cell(Cell),
    /// Slice contents materialized as a standalone cell.
    Slice(Cell),
    Builder(Cell),
    Tuple(Vec<StackEntry>),
}

impl StackEntry {
    pub fn int(value: impl Into<BigInt>) -> Self {
        StackEntry::Int(value.into())
    }

    pub fn as_int(&self) -> Option<&BigInt> {
        match self {
            StackEntry::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_cell(&self) -> Option<&Cell> {
        match self {
            StackEntry::Cell(c) | StackEntry::Slice(c) | StackEntry::Builder(c) => Some(c),
            _ => None,
        }
    }

    /// Reads an address from a slice (or cell) entry.
    pub fn as_address(&self) -> CellResult<MsgAddress> {
        let cell = self
            .as_cell()
            .ok_or_else(|| CellError::Unsupported("stack entry is not a slice".into()))?;
        MsgAddress::load(&mut cell.parse())
    }

    fn store(&self, b: &mut CellBuilder) -> CellResult<()> {
        match self {
            StackEntry::Null => {
                b.store_u8(0x00)?;
            }
            StackEntry::Int(value) => {
                if let Ok(small) = i64::try_from(value) {
                    b.store_u8(0x01)?;
                    b.store_int(small, 64)?;
                } else {
                    b.store_uint(0x0100, 15)?;
                    b.store_big_int(value, 257)?;
                }
            }
            StackEntry::Nan => {
                b.store_u16(0x02ff)?;
            }
            StackEntry::Cell(cell) => {
                b.store_u8(0x03)?;
                b.store_reference(cell.clone())?;
            }
            StackEntry::Slice(cell) => {
                b.store_u8(0x04)?;
                b.store_uint(0, 10)?;
                b.store_uint(cell.bit_len() as u64, 10)?;
                b.store_uint(0, 3)?;
                b.store_uint(cell.refs().len() as u64, 3)?;
                b.store_reference(cell.clone())?;
            }
            StackEntry::Builder(cell) => {
                b.store_u8(0x05)?;
                b.store_reference(cell.clone())?;
            }
            StackEntry::Tuple(items) => {
                let mut head: Option<Cell> = None;
                let mut tail: Option<Cell> = None;
                for (i, item) in items.iter().enumerate() {
                    std::mem::swap(&mut head, &mut tail);
                    if i > 1 {
                        let mut pair = CellBuilder::new();
                        if let Some(t) = tail.take() {
                            pair.store_reference(t)?;
                        }
                        if let Some(h) = head.take() {
                            pair.store_reference(h)?;
                        }
                        head = Some(pair.build()?);
                    }
                    let mut entry = CellBuilder::new();
                    item.store(&mut entry)?;
                    tail = Some(entry.build()?);
                }
                b.store_u8(0x07)?;
                b.store_u16(items.len() as u16)?;
                if let Some(h) = head {
                    b.store_reference(h)?;
                }
                if let Some(t) = tail {
                    b.store_reference(t)?;
                }
            }
        }
        Ok(())
    }

    fn load(s: &mut CellSlice<'_>) -> CellResult<Self> {
        let kind = s.load_u8()?;
        match kind {
            0x00 => Ok(StackEntry::Null),
            0x01 => Ok(StackEntry::Int(BigInt::from(s.load_int(64)?))),
            0x02 => {
                if s.load_uint(7)? == 0 {
                    Ok(StackEntry::Int(s.load_big_int(257)?))
                } else {
                    s.load_bit()?;
                    Ok(StackEntry::Nan)
                }
            }
            0x03 => Ok(StackEntry::Cell(s.load_reference()?.clone())),
            0x04 => {
                let start_bits = s.load_uint(10)? as usize;
                let end_bits = s.load_uint(10)? as usize;
                let start_ref = s.load_uint(3)? as usize;
                let end_ref = s.load_uint(3)? as usize;
                let cell = s.load_reference()?;
                let window = CellSlice::with_range(cell, (start_bits, end_bits), (start_ref, end_ref))?;
                Ok(StackEntry::Slice(window.to_cell()?))
            }
            0x05 => Ok(StackEntry::Builder(s.load_reference()?.clone())),
            0x07 => {
                let len = s.load_u16()? as usize;
                let mut items = Vec::with_capacity(len);
                if len > 1 {
                    let mut head = s.load_reference()?;
                    let tail = s.load_reference()?;
                    items.push(StackEntry::load(&mut tail.parse())?);
                    for _ in 0..len - 2 {
                        let mut pair = head.parse();
                        head = pair.load_reference()?;
                        let tail = pair.load_reference()?;
                        items.push(StackEntry::load(&mut tail.parse())?);
                    }
                    items.push(StackEntry::load(&mut head.parse())?);
                    items.reverse();
                } else if len == 1 {
                    items.push(StackEntry::load(&mut s.load_reference()?.parse())?);
                }
                Ok(StackEntry::Tuple(items))
            }
            other => Err(CellError::InvalidTag {
                what: "VmStackValue",
                tag: other as u64,
            }),
        }
    }
}

/// Serializes entries bottom-first; the last entry becomes the top of stack.
pub fn serialize_stack(entries: &[StackEntry]) -> CellResult<Cell> {
    fn store_tail(entries: &[StackEntry], b: &mut CellBuilder) -> CellResult<()> {
        if let Some((top, rest)) = entries.split_last() {
            let mut tail = CellBuilder::new();
            store_tail(rest, &mut tail)?;
            b.store_reference(tail.build()?)?;
            top.store(b)?;
        }
        Ok(())
    }

    let mut b = CellBuilder::new();
    b.store_uint(entries.len() as u64, 24)?;
    store_tail(entries, &mut b)?;
    b.build()
}

/// Inverse of [`serialize_stack`]: bottom entry first.
pub fn parse_stack(cell: &Cell) -> CellResult<Vec<StackEntry>> {
    let mut s = cell.parse();
    let depth = s.load_uint(24)? as usize;
    let mut out = Vec::with_capacity(depth);
    for _ in 0..depth {
        let next = s.load_reference()?;
        out.push(StackEntry::load(&mut s)?);
        s = next.parse();
    }
    out.reverse();
    Ok(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::StdAddress;
    use crate::cell::HashBytes;

    #[test]
    fn well_known_method_ids() {
        assert_eq!(method_id("get_wallet_data"), 97026);
        assert_eq!(method_id("seqno"), 85143);
    }

    #[test]
    fn empty_stack_is_24_zero_bits() {
        let cell = serialize_stack(&[]).unwrap();
        assert_eq!(cell.bit_len(), 24);
        assert_eq!(cell.data(), &[0, 0, 0]);
        assert!(parse_stack(&cell).unwrap().is_empty());
    }

    #[test]
    fn keeps_entry_order() {
        let owner = StdAddress::new(0, HashBytes([4; 32]));
        let mut b = CellBuilder::new();
        owner.store(&mut b).unwrap();
        let owner_slice = b.build().unwrap();

        let big: BigInt = BigInt::from(1u8) << 200;
        let entries = vec![
            StackEntry::int(1_000_000_000u64),
            StackEntry::Slice(owner_slice),
            StackEntry::Int(big.clone()),
            StackEntry::Cell(Cell::empty()),
            StackEntry::Null,
            StackEntry::Nan,
        ];
        let parsed = parse_stack(&serialize_stack(&entries).unwrap()).unwrap();
        assert_eq!(parsed, entries);
        assert_eq!(parsed[1].as_address().unwrap(), MsgAddress::Std(owner));
        assert_eq!(parsed[2].as_int(), Some(&big));
    }

    #[test]
    fn tuples_nest() {
        let tuple = StackEntry::Tuple(vec![
            StackEntry::int(1),
            StackEntry::int(2),
            StackEntry::int(3),
            StackEntry::Tuple(vec![StackEntry::int(4)]),
        ]);
        let parsed = parse_stack(&serialize_stack(std::slice::from_ref(&tuple)).unwrap()).unwrap();
        assert_eq!(parsed, vec![tuple]);
    }

    #[test]
    fn continuation_entries_are_rejected() {
        let mut b = CellBuilder::new();
        b.store_uint(1, 24).unwrap();
        b.store_reference(Cell::empty()).unwrap();
        b.store_u8(0x06).unwrap();
        assert!(parse_stack(&b.build().unwrap()).is_err());
    }
}
