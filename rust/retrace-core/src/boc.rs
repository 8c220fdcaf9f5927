//! Bag-of-cells serialization.
//!
//! Encodes with the generic `b5ee9c72` header, no index and a trailing
//! CRC32C. Decodes the generic header plus the two legacy indexed headers.

use std::collections::HashMap;

use base64::Engine;

use crate::cell::{Cell, CellKind, HashBytes};
use crate::error::{CellError, CellResult};

const GENERIC_MAGIC: u32 = 0xb5ee_9c72;
const INDEXED_MAGIC: u32 = 0x68ff_65f3;
const INDEXED_CRC_MAGIC: u32 = 0xacc3_a728;

pub struct Boc;

impl Boc {
    pub fn encode(root: &Cell) -> Vec<u8> {
        Self::encode_all(std::slice::from_ref(root))
    }

    pub fn encode_base64(root: &Cell) -> String {
        base64::engine::general_purpose::STANDARD.encode(Self::encode(root))
    }

    pub fn encode_hex(root: &Cell) -> String {
        hex::encode(Self::encode(root))
    }

    pub fn encode_all(roots: &[Cell]) -> Vec<u8> {
        let order = topological_order(roots);
        let index: HashMap<HashBytes, usize> = order
            .iter()
            .enumerate()
            .map(|(i, c)| (c.hash(), i))
            .collect();

        let size_bytes = bytes_for(order.len() as u64).max(1);
        let mut body = Vec::new();
        for cell in &order {
            body.extend_from_slice(&cell.descriptors());
            body.extend_from_slice(&cell.padded_data());
            for r in cell.refs() {
                write_be(&mut body, index[&r.hash()] as u64, size_bytes);
            }
        }
        let off_bytes = bytes_for(body.len() as u64).max(1);

        let mut out = Vec::with_capacity(body.len() + 32);
        out.extend_from_slice(&GENERIC_MAGIC.to_be_bytes());
        // has_idx = 0, has_crc32c = 1, has_cache_bits = 0, flags = 0
        out.push(0x40 | size_bytes as u8);
        out.push(off_bytes as u8);
        write_be(&mut out, order.len() as u64, size_bytes);
        write_be(&mut out, roots.len() as u64, size_bytes);
        write_be(&mut out, 0, size_bytes);
        write_be(&mut out, body.len() as u64, off_bytes);
        for root in roots {
            write_be(&mut out, index[&root.hash()] as u64, size_bytes);
        }
        out.extend_from_slice(&body);
        let crc = crc32c(&out);
        out.extend_from_slice(&crc.to_le_bytes());
        out
    }

    /// Decodes a BOC that must contain exactly one root.
    pub fn decode(bytes: &[u8]) -> CellResult<Cell> {
        let mut roots = Self::decode_all(bytes)?;
        if roots.len() != 1 {
            return Err(CellError::InvalidBoc(format!("expected one root, found {}", roots.len())));
        }
        Ok(roots.remove(0))
    }

    pub fn decode_base64(s: &str) -> CellResult<Cell> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(s.trim())
            .or_else(|_| base64::engine::general_purpose::URL_SAFE.decode(s.trim()))
            .map_err(|e| CellError::InvalidBoc(format!("bad base64: {e}")))?;
        Self::decode(&bytes)
    }

    pub fn decode_hex(s: &str) -> CellResult<Cell> {
        let bytes = hex::decode(s.trim()).map_err(|e| CellError::InvalidBoc(format!("bad hex: {e}")))?;
        Self::decode(&bytes)
    }

    pub fn decode_all(bytes: &[u8]) -> CellResult<Vec<Cell>> {
        let mut r = Reader { bytes, pos: 0 };
        let magic = r.uint(4)? as u32;
        let (has_idx, has_crc, size_bytes) = match magic {
            GENERIC_MAGIC => {
                let flags = r.uint(1)? as u8;
                if flags & 0x20 != 0 {
                    return Err(CellError::Unsupported("boc cache bits".into()));
                }
                (flags & 0x80 != 0, flags & 0x40 != 0, (flags & 0x07) as usize)
            }
            INDEXED_MAGIC => (true, false, r.uint(1)? as usize),
            INDEXED_CRC_MAGIC => (true, true, r.uint(1)? as usize),
            other => return Err(CellError::InvalidBoc(format!("unknown magic {other:#010x}"))),
        };
        if size_bytes == 0 || size_bytes > 4 {
            return Err(CellError::InvalidBoc(format!("size_bytes {size_bytes}")));
        }
        if has_crc {
            if bytes.len() < 4 {
                return Err(CellError::InvalidBoc("truncated crc".into()));
            }
            let (payload, tail) = bytes.split_at(bytes.len() - 4);
            let expected = u32::from_le_bytes([tail[0], tail[1], tail[2], tail[3]]);
            if crc32c(payload) != expected {
                return Err(CellError::InvalidBoc("crc32c mismatch".into()));
            }
        }

        let off_bytes = r.uint(1)? as usize;
        if off_bytes == 0 || off_bytes > 8 {
            return Err(CellError::InvalidBoc(format!("off_bytes {off_bytes}")));
        }
        let cell_count = r.uint(size_bytes)? as usize;
        // Every cell takes at least its two descriptor bytes.
        if cell_count > r.remaining() / 2 {
            return Err(CellError::InvalidBoc(format!("{cell_count} cells do not fit the payload")));
        }
        let root_count = r.uint(size_bytes)? as usize;
        let _absent = r.uint(size_bytes)?;
        let _total_size = r.uint(off_bytes)?;
        if root_count > cell_count {
            return Err(CellError::InvalidBoc("more roots than cells".into()));
        }
        let root_indices = if magic == GENERIC_MAGIC {
            (0..root_count)
                .map(|_| r.uint(size_bytes).map(|v| v as usize))
                .collect::<CellResult<Vec<_>>>()?
        } else {
            (0..root_count).collect()
        };
        if has_idx {
            let index_len = cell_count
                .checked_mul(off_bytes)
                .ok_or_else(|| CellError::InvalidBoc("index size overflow".into()))?;
            r.skip(index_len)?;
        }

        let mut raw = Vec::with_capacity(cell_count);
        for index in 0..cell_count {
            raw.push(RawCell::read(&mut r, size_bytes, index, cell_count)?);
        }

        let mut built: Vec<Option<Cell>> = vec![None; cell_count];
        for index in (0..cell_count).rev() {
            let cell = &raw[index];
            let refs = cell
                .refs
                .iter()
                .map(|&i| {
                    built[i]
                        .clone()
                        .ok_or_else(|| CellError::InvalidBoc(format!("dangling ref {i}")))
                })
                .collect::<CellResult<Vec<_>>>()?;
            let kind = if cell.exotic {
                let tag = *cell
                    .data
                    .first()
                    .ok_or_else(|| CellError::InvalidExotic("empty exotic cell".into()))?;
                CellKind::from_exotic_tag(tag)?
            } else {
                CellKind::Ordinary
            };
            built[index] = Some(Cell::new(cell.data.clone(), cell.bit_len, refs, kind)?);
        }

        root_indices
            .into_iter()
            .map(|i| {
                built
                    .get(i)
                    .cloned()
                    .flatten()
                    .ok_or_else(|| CellError::InvalidBoc(format!("root index {i} out of range")))
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Internals
// ---------------------------------------------------------------------------

struct RawCell {
    data: Vec<u8>,
    bit_len: usize,
    refs: Vec<usize>,
    exotic: bool,
}

impl RawCell {
    fn read(r: &mut Reader<'_>, size_bytes: usize, index: usize, total: usize) -> CellResult<Self> {
        let d1 = r.uint(1)? as u8;
        let d2 = r.uint(1)? as usize;
        if d1 & 16 != 0 {
            return Err(CellError::Unsupported("boc with stored hashes".into()));
        }
        let ref_count = (d1 & 7) as usize;
        if ref_count > 4 {
            return Err(CellError::InvalidBoc(format!("cell {index} has {ref_count} refs")));
        }
        let exotic = d1 & 8 != 0;
        let byte_len = d2.div_ceil(2);
        let mut data = r.take(byte_len)?.to_vec();
        let bit_len = if d2 % 2 == 1 {
            let last = data.last().copied().unwrap_or(0);
            if last == 0 {
                return Err(CellError::InvalidBoc(format!("cell {index} missing completion tag")));
            }
            let tag_pos = last.trailing_zeros() as usize;
            if let Some(b) = data.last_mut() {
                *b &= !(1u8 << tag_pos);
            }
            byte_len * 8 - tag_pos - 1
        } else {
            byte_len * 8
        };
        let mut refs = Vec::with_capacity(ref_count);
        for _ in 0..ref_count {
            let target = r.uint(size_bytes)? as usize;
            if target <= index || target >= total {
                return Err(CellError::InvalidBoc(format!(
                    "cell {index} references {target}, not in topological order"
                )));
            }
            refs.push(target);
        }
        Ok(Self {
            data,
            bit_len,
            refs,
            exotic,
        })
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, n: usize) -> CellResult<&'a [u8]> {
        if n > self.remaining() {
            return Err(CellError::InvalidBoc("unexpected end of data".into()));
        }
        let out = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn skip(&mut self, n: usize) -> CellResult<()> {
        self.take(n).map(|_| ())
    }

    fn uint(&mut self, n: usize) -> CellResult<u64> {
        Ok(self.take(n)?.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64))
    }
}

/// Reverse DFS post-order: every cell precedes its descendants.
fn topological_order(roots: &[Cell]) -> Vec<Cell> {
    fn visit(cell: &Cell, seen: &mut HashMap<HashBytes, ()>, out: &mut Vec<Cell>) {
        if seen.insert(cell.hash(), ()).is_some() {
            return;
        }
        for r in cell.refs().iter().rev() {
            visit(r, seen, out);
        }
        out.push(cell.clone());
    }

    let mut seen = HashMap::new();
    let mut out = Vec::new();
    for root in roots.iter().rev() {
        visit(root, &mut seen, &mut out);
    }
    out.reverse();
    out
}

fn bytes_for(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.div_ceil(8)
}

fn write_be(out: &mut Vec<u8>, value: u64, width: usize) {
    let be = value.to_be_bytes();
    out.extend_from_slice(&be[8 - width..]);
}

/// CRC-32C (Castagnoli), reflected.
pub fn crc32c(data: &[u8]) -> u32 {
    let mut crc = !0u32;
    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (0x82f6_3b78 & mask);
        }
    }
    !crc
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
