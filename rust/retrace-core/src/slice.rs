//! Read cursor over a cell's bits and references.

use num_bigint::{BigInt, BigUint};
use num_traits::{One, Zero};

use crate::builder::CellBuilder;
use crate::cell::{Cell, HashBytes};
use crate::error::{CellError, CellResult};

#[derive(Debug, Clone)]
pub struct CellSlice<'a> {
    cell: &'a Cell,
    bit_pos: usize,
    bit_end: usize,
    ref_pos: usize,
    ref_end: usize,
}

impl<'a> CellSlice<'a> {
    pub fn new(cell: &'a Cell) -> Self {
        Self {
            cell,
            bit_pos: 0,
            bit_end: cell.bit_len(),
            ref_pos: 0,
            ref_end: cell.refs().len(),
        }
    }

    /// A window `[bits.0, bits.1) x [refs.0, refs.1)` over `cell`, as used by
    /// VM stack slices.
    pub fn with_range(cell: &'a Cell, bits: (usize, usize), refs: (usize, usize)) -> CellResult<Self> {
        if bits.0 > bits.1 || bits.1 > cell.bit_len() || refs.0 > refs.1 || refs.1 > cell.refs().len() {
            return Err(CellError::underflow("slice window outside cell"));
        }
        Ok(Self {
            cell,
            bit_pos: bits.0,
            bit_end: bits.1,
            ref_pos: refs.0,
            ref_end: refs.1,
        })
    }

    pub fn cell(&self) -> &'a Cell {
        self.cell
    }

    pub fn remaining_bits(&self) -> usize {
        self.bit_end - self.bit_pos
    }

    pub fn remaining_refs(&self) -> usize {
        self.ref_end - self.ref_pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining_bits() == 0 && self.remaining_refs() == 0
    }

    fn ensure_bits(&self, bits: usize) -> CellResult<()> {
        if bits > self.remaining_bits() {
            return Err(CellError::underflow(format!(
                "need {bits} bits, {} left",
                self.remaining_bits()
            )));
        }
        Ok(())
    }

    pub fn skip_bits(&mut self, bits: usize) -> CellResult<()> {
        self.ensure_bits(bits)?;
        self.bit_pos += bits;
        Ok(())
    }

    pub fn load_bit(&mut self) -> CellResult<bool> {
        self.ensure_bits(1)?;
        let bit = self.cell.bit(self.bit_pos);
        self.bit_pos += 1;
        Ok(bit)
    }

    pub fn preload_uint(&self, bits: usize) -> CellResult<u64> {
        self.clone().load_uint(bits)
    }

    pub fn load_uint(&mut self, bits: usize) -> CellResult<u64> {
        if bits > 64 {
            return Err(CellError::Unsupported(format!("uint{bits} does not fit u64")));
        }
        self.ensure_bits(bits)?;
        let mut value = 0u64;
        for _ in 0..bits {
            value = (value << 1) | self.load_bit()? as u64;
        }
        Ok(value)
    }

    pub fn load_int(&mut self, bits: usize) -> CellResult<i64> {
        if bits == 0 || bits > 64 {
            return Err(CellError::Unsupported(format!("int{bits} does not fit i64")));
        }
        let raw = self.load_uint(bits)?;
        if bits == 64 {
            return Ok(raw as i64);
        }
        let sign = 1u64 << (bits - 1);
        Ok(if raw & sign != 0 {
            (raw as i64) - ((1i64) << bits)
        } else {
            raw as i64
        })
    }

    pub fn load_u8(&mut self) -> CellResult<u8> {
        Ok(self.load_uint(8)? as u8)
    }

    pub fn load_u16(&mut self) -> CellResult<u16> {
        Ok(self.load_uint(16)? as u16)
    }

    pub fn load_u32(&mut self) -> CellResult<u32> {
        Ok(self.load_uint(32)? as u32)
    }

    pub fn load_u64(&mut self) -> CellResult<u64> {
        self.load_uint(64)
    }

    pub fn load_big_uint(&mut self, bits: usize) -> CellResult<BigUint> {
        self.ensure_bits(bits)?;
        let mut value = BigUint::zero();
        for _ in 0..bits {
            value <<= 1u32;
            if self.load_bit()? {
                value += 1u32;
            }
        }
        Ok(value)
    }

    pub fn load_big_int(&mut self, bits: usize) -> CellResult<BigInt> {
        if bits == 0 {
            return Err(CellError::Unsupported("int0".into()));
        }
        let raw = BigInt::from(self.load_big_uint(bits)?);
        let half = BigInt::one() << (bits - 1);
        if raw >= half {
            Ok(raw - (BigInt::one() << bits))
        } else {
            Ok(raw)
        }
    }

    /// Loads `bits` bits packed into bytes, the tail of the last byte zeroed.
    pub fn load_raw(&mut self, bits: usize) -> CellResult<Vec<u8>> {
        self.ensure_bits(bits)?;
        let mut out = vec![0u8; bits.div_ceil(8)];
        for i in 0..bits {
            if self.load_bit()? {
                out[i / 8] |= 0x80 >> (i % 8);
            }
        }
        Ok(out)
    }

    pub fn load_bytes(&mut self, len: usize) -> CellResult<Vec<u8>> {
        self.load_raw(len * 8)
    }

    pub fn load_hash(&mut self) -> CellResult<HashBytes> {
        HashBytes::from_slice(&self.load_bytes(32)?)
    }

    pub fn load_reference(&mut self) -> CellResult<&'a Cell> {
        if self.ref_pos >= self.ref_end {
            return Err(CellError::underflow("no references left"));
        }
        let cell = &self.cell.refs()[self.ref_pos];
        self.ref_pos += 1;
        Ok(cell)
    }

    /// `Maybe ^Cell`.
    pub fn load_maybe_ref(&mut self) -> CellResult<Option<Cell>> {
        if self.load_bit()? {
            Ok(Some(self.load_reference()?.clone()))
        } else {
            Ok(None)
        }
    }

    pub fn load_var_uint(&mut self, len_bits: usize) -> CellResult<u128> {
        let len = self.load_uint(len_bits)? as usize;
        if len > 16 {
            return Err(CellError::Unsupported(format!("VarUInteger of {len} bytes")));
        }
        let mut value = 0u128;
        for byte in self.load_bytes(len)? {
            value = (value << 8) | byte as u128;
        }
        Ok(value)
    }

    pub fn load_coins(&mut self) -> CellResult<u128> {
        self.load_var_uint(4)
    }

    /// Copies the unread remainder into a fresh ordinary cell.
    pub fn to_cell(&self) -> CellResult<Cell> {
        let mut b = CellBuilder::new();
        b.store_slice(self)?;
        b.build()
    }

    /// Fails unless every bit and reference was consumed.
    pub fn expect_end(&self, what: &str) -> CellResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(CellError::Overflow(format!(
                "{what}: {} bits and {} refs left unread",
                self.remaining_bits(),
                self.remaining_refs()
            )))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
