//! Immutable content-addressed cells.
//!
//! A cell holds up to 1023 data bits and up to four references to other
//! cells. Its representation hash and depth are computed once when the cell
//! is built and never change afterwards; cells are shared through `Arc`, so
//! cloning a [`Cell`] is cheap and whole subtrees can be reused between
//! messages, accounts and transactions.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::{CellError, CellResult};
use crate::slice::CellSlice;

pub const MAX_BITS: usize = 1023;
pub const MAX_REFS: usize = 4;
/// Deepest allowed chain of references below a cell.
pub const MAX_DEPTH: u16 = 1024;

// ---------------------------------------------------------------------------
// HashBytes
// ---------------------------------------------------------------------------

/// A 256-bit hash (cell hashes, account ids, library ids).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct HashBytes(pub [u8; 32]);

impl HashBytes {
    pub const ZERO: HashBytes = HashBytes([0; 32]);

    pub fn from_slice(bytes: &[u8]) -> CellResult<Self> {
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CellError::Unsupported(format!("hash must be 32 bytes, got {}", bytes.len())))?;
        Ok(HashBytes(arr))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.0)
    }

    /// First 64 bits, big-endian. Used as the account id for shard routing.
    pub fn prefix_u64(&self) -> u64 {
        let mut head = [0u8; 8];
        head.copy_from_slice(&self.0[..8]);
        u64::from_be_bytes(head)
    }
}

impl fmt::Display for HashBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for HashBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HashBytes({})", self.to_hex())
    }
}

/// Accepts 64 hex digits or 44 characters of standard / url-safe base64.
impl FromStr for HashBytes {
    type Err = CellError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let bytes = if s.len() == 64 {
            hex::decode(s).map_err(|e| CellError::Unsupported(format!("bad hex hash: {e}")))?
        } else {
            let normalized: String = s
                .chars()
                .map(|c| match c {
                    '-' => '+',
                    '_' => '/',
                    other => other,
                })
                .collect();
            base64::engine::general_purpose::STANDARD
                .decode(normalized)
                .map_err(|e| CellError::Unsupported(format!("bad base64 hash: {e}")))?
        };
        HashBytes::from_slice(&bytes)
    }
}

impl Serialize for HashBytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for HashBytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Cell kinds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum CellKind {
    Ordinary,
    PrunedBranch,
    Library,
    MerkleProof,
    MerkleUpdate,
}

impl CellKind {
    /// Type byte stored as the first byte of an exotic cell.
    pub fn exotic_tag(self) -> Option<u8> {
        match self {
            CellKind::Ordinary => None,
            CellKind::PrunedBranch => Some(1),
            CellKind::Library => Some(2),
            CellKind::MerkleProof => Some(3),
            CellKind::MerkleUpdate => Some(4),
        }
    }

    pub fn from_exotic_tag(tag: u8) -> CellResult<Self> {
        match tag {
            1 => Ok(CellKind::PrunedBranch),
            2 => Ok(CellKind::Library),
            3 => Ok(CellKind::MerkleProof),
            4 => Ok(CellKind::MerkleUpdate),
            other => Err(CellError::InvalidExotic(format!("unknown exotic type {other}"))),
        }
    }

    pub fn is_exotic(self) -> bool {
        self != CellKind::Ordinary
    }
}

// ---------------------------------------------------------------------------
// Cell
// ---------------------------------------------------------------------------

struct CellInner {
    data: Vec<u8>,
    bit_len: u16,
    refs: Vec<Cell>,
    kind: CellKind,
    level_mask: u8,
    depth: u16,
    hash: HashBytes,
}

#[derive(Clone)]
pub struct Cell(Arc<CellInner>);

impl Cell {
    /// Builds a cell from raw parts, validating exotic layouts and computing
    /// the representation hash. `data` must hold at least `ceil(bit_len / 8)`
    /// bytes; bits past `bit_len` are cleared.
    pub fn new(mut data: Vec<u8>, bit_len: usize, refs: Vec<Cell>, kind: CellKind) -> CellResult<Self> {
        if bit_len > MAX_BITS {
            return Err(CellError::overflow(format!("{bit_len} bits")));
        }
        if refs.len() > MAX_REFS {
            return Err(CellError::overflow(format!("{} refs", refs.len())));
        }
        let byte_len = bit_len.div_ceil(8);
        if data.len() < byte_len {
            return Err(CellError::underflow(format!(
                "{} data bytes for {bit_len} bits",
                data.len()
            )));
        }
        data.truncate(byte_len);
        if bit_len % 8 != 0 {
            let keep = 0xffu8 << (8 - bit_len % 8);
            if let Some(last) = data.last_mut() {
                *last &= keep;
            }
        }

        let level_mask = compute_level_mask(&data, bit_len, &refs, kind)?;
        let depth = refs.iter().map(|r| r.depth() as usize + 1).max().unwrap_or(0);
        if depth > MAX_DEPTH as usize {
            return Err(CellError::overflow(format!("depth {depth}")));
        }
        let depth = depth as u16;
        let hash = representation_hash(&data, bit_len, &refs, kind, level_mask);

        Ok(Cell(Arc::new(CellInner {
            data,
            bit_len: bit_len as u16,
            refs,
            kind,
            level_mask,
            depth,
            hash,
        })))
    }

    /// An ordinary cell with no bits and no refs.
    pub fn empty() -> Self {
        // Zero bits, zero refs: every size check above passes.
        match Cell::new(Vec::new(), 0, Vec::new(), CellKind::Ordinary) {
            Ok(cell) => cell,
            Err(_) => unreachable!("empty cell is always valid"),
        }
    }

    /// A library-reference exotic cell pointing at `hash`.
    pub fn library(hash: &HashBytes) -> Self {
        let mut data = Vec::with_capacity(33);
        data.push(2);
        data.extend_from_slice(&hash.0);
        match Cell::new(data, 8 + 256, Vec::new(), CellKind::Library) {
            Ok(cell) => cell,
            Err(_) => unreachable!("library cell layout is fixed"),
        }
    }

    pub fn hash(&self) -> HashBytes {
        self.0.hash
    }

    pub fn depth(&self) -> u16 {
        self.0.depth
    }

    pub fn kind(&self) -> CellKind {
        self.0.kind
    }

    pub fn is_exotic(&self) -> bool {
        self.0.kind.is_exotic()
    }

    pub fn level_mask(&self) -> u8 {
        self.0.level_mask
    }

    pub fn level(&self) -> u8 {
        (self.0.level_mask & 7).count_ones() as u8
    }

    pub fn bit_len(&self) -> usize {
        self.0.bit_len as usize
    }

    pub fn data(&self) -> &[u8] {
        &self.0.data
    }

    pub fn refs(&self) -> &[Cell] {
        &self.0.refs
    }

    pub fn reference(&self, index: usize) -> Option<&Cell> {
        self.0.refs.get(index)
    }

    /// Hash of the library this cell references, if it is a library cell.
    pub fn library_hash(&self) -> Option<HashBytes> {
        if self.0.kind != CellKind::Library {
            return None;
        }
        HashBytes::from_slice(&self.0.data[1..33]).ok()
    }

    pub fn bit(&self, index: usize) -> bool {
        let byte = self.0.data[index / 8];
        (byte >> (7 - index % 8)) & 1 == 1
    }

    /// Read-only cursor over this cell. Exotic cells can be sliced too; the
    /// caller sees the raw type byte first.
    pub fn parse(&self) -> CellSlice<'_> {
        CellSlice::new(self)
    }

    /// Descriptor bytes `d1` and `d2` as used in hashing and BOC encoding.
    pub fn descriptors(&self) -> [u8; 2] {
        descriptors(self.0.bit_len as usize, self.0.refs.len(), self.0.kind, self.0.level_mask)
    }

    /// Data bytes with the completion tag applied when the bit length is not
    /// byte aligned.
    pub fn padded_data(&self) -> Vec<u8> {
        padded(&self.0.data, self.0.bit_len as usize)
    }
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        self.0.hash == other.0.hash
    }
}

impl Eq for Cell {}

impl std::hash::Hash for Cell {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash.hash(state)
    }
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cell")
            .field("kind", &self.0.kind)
            .field("bits", &self.0.bit_len)
            .field("refs", &self.0.refs.len())
            .field("hash", &self.0.hash.to_hex())
            .finish()
    }
}

impl Default for Cell {
    fn default() -> Self {
        Cell::empty()
    }
}

// ---------------------------------------------------------------------------
// Hashing
// ---------------------------------------------------------------------------

fn descriptors(bit_len: usize, refs: usize, kind: CellKind, level_mask: u8) -> [u8; 2] {
    let exotic = if kind.is_exotic() { 8 } else { 0 };
    let d1 = refs as u8 + exotic + 32 * level_mask;
    let d2 = (bit_len / 8 + bit_len.div_ceil(8)) as u8;
    [d1, d2]
}

fn padded(data: &[u8], bit_len: usize) -> Vec<u8> {
    let mut out = data.to_vec();
    if bit_len % 8 != 0 {
        if let Some(last) = out.last_mut() {
            *last |= 1 << (7 - bit_len % 8);
        }
    }
    out
}

fn compute_level_mask(data: &[u8], bit_len: usize, refs: &[Cell], kind: CellKind) -> CellResult<u8> {
    let children = refs.iter().fold(0u8, |acc, r| acc | r.level_mask());
    match kind {
        CellKind::Ordinary => Ok(children),
        CellKind::PrunedBranch => {
            if !refs.is_empty() || data.len() < 2 || data[0] != 1 {
                return Err(CellError::InvalidExotic("malformed pruned branch".into()));
            }
            let mask = data[1];
            if mask == 0 || mask > 7 {
                return Err(CellError::InvalidExotic(format!("pruned branch level mask {mask}")));
            }
            let expected = 16 + mask.count_ones() as usize * (256 + 16);
            if bit_len != expected {
                return Err(CellError::InvalidExotic(format!(
                    "pruned branch has {bit_len} bits, expected {expected}"
                )));
            }
            Ok(mask)
        }
        CellKind::Library => {
            if bit_len != 8 + 256 || !refs.is_empty() || data[0] != 2 {
                return Err(CellError::InvalidExotic("malformed library cell".into()));
            }
            Ok(0)
        }
        CellKind::MerkleProof => {
            if bit_len != 8 + 256 + 16 || refs.len() != 1 || data[0] != 3 {
                return Err(CellError::InvalidExotic("malformed merkle proof".into()));
            }
            Ok(children >> 1)
        }
        CellKind::MerkleUpdate => {
            if bit_len != 8 + 2 * (256 + 16) || refs.len() != 2 || data[0] != 4 {
                return Err(CellError::InvalidExotic("malformed merkle update".into()));
            }
            Ok(children >> 1)
        }
    }
}

fn representation_hash(data: &[u8], bit_len: usize, refs: &[Cell], kind: CellKind, level_mask: u8) -> HashBytes {
    let mut hasher = Sha256::new();
    hasher.update(descriptors(bit_len, refs.len(), kind, level_mask));
    hasher.update(padded(data, bit_len));
    for r in refs {
        hasher.update(r.depth().to_be_bytes());
    }
    for r in refs {
        hasher.update(r.hash().0);
    }
    HashBytes(hasher.finalize().into())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
