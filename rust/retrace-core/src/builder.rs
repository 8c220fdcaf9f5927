//! Incremental cell construction.

use num_bigint::{BigInt, BigUint, Sign};
use num_traits::{One, Zero};

use crate::cell::{Cell, CellKind, HashBytes, MAX_BITS, MAX_REFS};
use crate::error::{CellError, CellResult};
use crate::slice::CellSlice;

#[derive(Debug, Clone, Default)]
pub struct CellBuilder {
    data: Vec<u8>,
    bit_len: usize,
    refs: Vec<Cell>,
}

impl CellBuilder {
    pub fn new() -> Self {
        Self {
            data: Vec::with_capacity(128),
            bit_len: 0,
            refs: Vec::new(),
        }
    }

    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    pub fn ref_count(&self) -> usize {
        self.refs.len()
    }

    pub fn remaining_bits(&self) -> usize {
        MAX_BITS - self.bit_len
    }

    pub fn remaining_refs(&self) -> usize {
        MAX_REFS - self.refs.len()
    }

    pub fn has_capacity(&self, bits: usize, refs: usize) -> bool {
        bits <= self.remaining_bits() && refs <= self.remaining_refs()
    }

    fn reserve_bits(&self, bits: usize) -> CellResult<()> {
        if bits > self.remaining_bits() {
            return Err(CellError::overflow(format!(
                "cannot store {bits} bits, {} left",
                self.remaining_bits()
            )));
        }
        Ok(())
    }

    pub fn store_bit(&mut self, bit: bool) -> CellResult<&mut Self> {
        self.reserve_bits(1)?;
        let offset = self.bit_len % 8;
        if offset == 0 {
            self.data.push(0);
        }
        if bit {
            if let Some(last) = self.data.last_mut() {
                *last |= 0x80 >> offset;
            }
        }
        self.bit_len += 1;
        Ok(self)
    }

    /// Stores the low `bits` bits of `value`, most significant first.
    pub fn store_uint(&mut self, value: u64, bits: usize) -> CellResult<&mut Self> {
        if bits > 64 {
            return Err(CellError::overflow(format!("uint{bits} does not fit u64")));
        }
        if bits < 64 && value >> bits != 0 {
            return Err(CellError::overflow(format!("{value} does not fit in {bits} bits")));
        }
        self.reserve_bits(bits)?;
        for i in (0..bits).rev() {
            self.store_bit((value >> i) & 1 == 1)?;
        }
        Ok(self)
    }

    /// Stores a two's-complement signed integer of `bits` width.
    pub fn store_int(&mut self, value: i64, bits: usize) -> CellResult<&mut Self> {
        if bits == 0 || bits > 64 {
            return Err(CellError::overflow(format!("int{bits} does not fit i64")));
        }
        if bits < 64 {
            let min = -(1i64 << (bits - 1));
            let max = (1i64 << (bits - 1)) - 1;
            if value < min || value > max {
                return Err(CellError::overflow(format!("{value} does not fit in int{bits}")));
            }
        }
        let raw = if bits == 64 {
            value as u64
        } else {
            (value as u64) & ((1u64 << bits) - 1)
        };
        self.store_uint(raw, bits)
    }

    pub fn store_u8(&mut self, value: u8) -> CellResult<&mut Self> {
        self.store_uint(value as u64, 8)
    }

    pub fn store_u16(&mut self, value: u16) -> CellResult<&mut Self> {
        self.store_uint(value as u64, 16)
    }

    pub fn store_u32(&mut self, value: u32) -> CellResult<&mut Self> {
        self.store_uint(value as u64, 32)
    }

    pub fn store_u64(&mut self, value: u64) -> CellResult<&mut Self> {
        self.store_uint(value, 64)
    }

    pub fn store_big_uint(&mut self, value: &BigUint, bits: usize) -> CellResult<&mut Self> {
        if value.bits() as usize > bits {
            return Err(CellError::overflow(format!("{value} does not fit in {bits} bits")));
        }
        self.reserve_bits(bits)?;
        for i in (0..bits).rev() {
            self.store_bit(value.bit(i as u64))?;
        }
        Ok(self)
    }

    pub fn store_big_int(&mut self, value: &BigInt, bits: usize) -> CellResult<&mut Self> {
        if bits == 0 {
            return Err(CellError::overflow("int0"));
        }
        let half = BigInt::one() << (bits - 1);
        if *value >= half || *value < -&half {
            return Err(CellError::overflow(format!("{value} does not fit in int{bits}")));
        }
        let raw = if value.sign() == Sign::Minus {
            (BigInt::one() << bits) + value
        } else {
            value.clone()
        };
        let raw = raw.to_biguint().unwrap_or_else(BigUint::zero);
        self.store_big_uint(&raw, bits)
    }

    pub fn store_bytes(&mut self, bytes: &[u8]) -> CellResult<&mut Self> {
        self.store_raw(bytes, bytes.len() * 8)
    }

    /// Copies the first `bits` bits of `data`.
    pub fn store_raw(&mut self, data: &[u8], bits: usize) -> CellResult<&mut Self> {
        if data.len() * 8 < bits {
            return Err(CellError::underflow(format!("{} bytes for {bits} bits", data.len())));
        }
        self.reserve_bits(bits)?;
        if self.bit_len % 8 == 0 && bits % 8 == 0 {
            self.data.extend_from_slice(&data[..bits / 8]);
            self.bit_len += bits;
            return Ok(self);
        }
        for i in 0..bits {
            self.store_bit((data[i / 8] >> (7 - i % 8)) & 1 == 1)?;
        }
        Ok(self)
    }

    pub fn store_hash(&mut self, hash: &HashBytes) -> CellResult<&mut Self> {
        self.store_bytes(&hash.0)
    }

    pub fn store_reference(&mut self, cell: Cell) -> CellResult<&mut Self> {
        if self.refs.len() >= MAX_REFS {
            return Err(CellError::overflow("too many references"));
        }
        self.refs.push(cell);
        Ok(self)
    }

    /// `Maybe ^Cell`.
    pub fn store_maybe_ref(&mut self, cell: Option<&Cell>) -> CellResult<&mut Self> {
        match cell {
            Some(cell) => {
                self.store_bit(true)?;
                self.store_reference(cell.clone())
            }
            None => self.store_bit(false),
        }
    }

    /// `VarUInteger n` where `len_bits` is the width of the byte-length
    /// prefix (4 for `VarUInteger 16`, 3 for `VarUInteger 7`).
    pub fn store_var_uint(&mut self, value: u128, len_bits: usize) -> CellResult<&mut Self> {
        let bytes = (128 - value.leading_zeros() as usize).div_ceil(8);
        if bytes >= 1 << len_bits {
            return Err(CellError::overflow(format!("{value} exceeds VarUInteger prefix {len_bits}")));
        }
        self.store_uint(bytes as u64, len_bits)?;
        let be = value.to_be_bytes();
        self.store_bytes(&be[16 - bytes..])
    }

    /// `Grams` / `Coins`: `VarUInteger 16`.
    pub fn store_coins(&mut self, amount: u128) -> CellResult<&mut Self> {
        self.store_var_uint(amount, 4)
    }

    /// Appends the unread remainder of `slice`, bits and refs.
    pub fn store_slice(&mut self, slice: &CellSlice<'_>) -> CellResult<&mut Self> {
        let bits = slice.remaining_bits();
        if !self.has_capacity(bits, slice.remaining_refs()) {
            return Err(CellError::overflow("slice does not fit builder"));
        }
        let mut copy = slice.clone();
        for _ in 0..bits {
            self.store_bit(copy.load_bit()?)?;
        }
        while copy.remaining_refs() > 0 {
            self.store_reference(copy.load_reference()?.clone())?;
        }
        Ok(self)
    }

    pub fn store_builder(&mut self, other: &CellBuilder) -> CellResult<&mut Self> {
        if !self.has_capacity(other.bit_len, other.refs.len()) {
            return Err(CellError::overflow("builder does not fit"));
        }
        self.store_raw(&other.data, other.bit_len)?;
        for r in &other.refs {
            self.store_reference(r.clone())?;
        }
        Ok(self)
    }

    pub fn build(self) -> CellResult<Cell> {
        Cell::new(self.data, self.bit_len, self.refs, CellKind::Ordinary)
    }

    /// Builds an exotic cell; the kind comes from the first data byte.
    pub fn build_exotic(self) -> CellResult<Cell> {
        let tag = *self
            .data
            .first()
            .ok_or_else(|| CellError::InvalidExotic("exotic cell without type byte".into()))?;
        let kind = CellKind::from_exotic_tag(tag)?;
        Cell::new(self.data, self.bit_len, self.refs, kind)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
