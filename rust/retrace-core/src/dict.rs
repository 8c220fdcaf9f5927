//! Fixed-width-key patricia dictionaries (`Hashmap n X` / `HashmapE n X`).
//!
//! Keys are bit strings of exactly `key_bits` length. Values are arbitrary
//! bits and refs appended at the leaf; callers choose the layout (most uses
//! here store a single `^Cell`).

use crate::builder::CellBuilder;
use crate::cell::{Cell, HashBytes};
use crate::error::{CellError, CellResult};
use crate::slice::CellSlice;

pub type DictKey = Vec<bool>;

pub fn key_from_u64(value: u64, bits: usize) -> DictKey {
    (0..bits).rev().map(|i| i < 64 && (value >> i) & 1 == 1).collect()
}

pub fn key_from_hash(hash: &HashBytes) -> DictKey {
    hash.0
        .iter()
        .flat_map(|b| (0..8).rev().map(move |i| (b >> i) & 1 == 1))
        .collect()
}

pub fn key_to_u64(key: &[bool]) -> u64 {
    key.iter().fold(0u64, |acc, &b| (acc << 1) | b as u64)
}

pub fn key_to_hash(key: &[bool]) -> CellResult<HashBytes> {
    if key.len() != 256 {
        return Err(CellError::Unsupported(format!("{}-bit key is not a hash", key.len())));
    }
    let mut out = [0u8; 32];
    for (i, bit) in key.iter().enumerate() {
        if *bit {
            out[i / 8] |= 0x80 >> (i % 8);
        }
    }
    Ok(HashBytes(out))
}

/// Width of a `#<= m` field.
fn len_bits(max: usize) -> usize {
    (usize::BITS - max.leading_zeros()) as usize
}

// ---------------------------------------------------------------------------
// Building
// ---------------------------------------------------------------------------

/// Builds the root of a `Hashmap key_bits X`, or `None` for an empty map.
/// Duplicate keys keep the last value.
pub fn build(key_bits: usize, mut entries: Vec<(DictKey, CellBuilder)>) -> CellResult<Option<Cell>> {
    if let Some((key, _)) = entries.iter().find(|(k, _)| k.len() != key_bits) {
        return Err(CellError::Unsupported(format!(
            "dictionary key has {} bits, expected {key_bits}",
            key.len()
        )));
    }
    if entries.is_empty() {
        return Ok(None);
    }
    // Stable sort so the later duplicate sits last, then keep it.
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    let mut deduped: Vec<(DictKey, CellBuilder)> = Vec::with_capacity(entries.len());
    for entry in entries {
        match deduped.last_mut() {
            Some(last) if last.0 == entry.0 => *last = entry,
            _ => deduped.push(entry),
        }
    }
    build_edge(&deduped, 0, key_bits).map(Some)
}

/// Stores a `HashmapE` header: `0` for empty, `1` plus a ref otherwise.
pub fn store_dict(builder: &mut CellBuilder, root: Option<&Cell>) -> CellResult<()> {
    builder.store_maybe_ref(root)?;
    Ok(())
}

fn build_edge(entries: &[(DictKey, CellBuilder)], offset: usize, remaining: usize) -> CellResult<Cell> {
    let first = &entries[0].0;
    let last = &entries[entries.len() - 1].0;
    // Entries are sorted, so the common prefix of first and last is shared.
    let mut prefix = 0;
    while prefix < remaining && first[offset + prefix] == last[offset + prefix] {
        prefix += 1;
    }

    let mut b = CellBuilder::new();
    store_label(&mut b, &first[offset..offset + prefix], remaining)?;
    let rest = remaining - prefix;
    if rest == 0 {
        b.store_builder(&entries[0].1)?;
        return b.build();
    }

    let split_at = offset + prefix;
    let pivot = entries.partition_point(|(k, _)| !k[split_at]);
    let left = build_edge(&entries[..pivot], split_at + 1, rest - 1)?;
    let right = build_edge(&entries[pivot..], split_at + 1, rest - 1)?;
    b.store_reference(left)?;
    b.store_reference(right)?;
    b.build()
}

fn store_label(b: &mut CellBuilder, label: &[bool], max: usize) -> CellResult<()> {
    let n = label.len();
    let width = len_bits(max);
    let short_len = 2 * n + 2;
    let long_len = 2 + width + n;
    let same_len = 3 + width;
    let all_same = n > 0 && label.iter().all(|&bit| bit == label[0]);

    let mut kind = 0; // short
    let mut best = short_len;
    if long_len < best {
        kind = 1;
        best = long_len;
    }
    if all_same && same_len < best {
        kind = 2;
    }

    match kind {
        0 => {
            b.store_bit(false)?;
            for _ in 0..n {
                b.store_bit(true)?;
            }
            b.store_bit(false)?;
            for &bit in label {
                b.store_bit(bit)?;
            }
        }
        1 => {
            b.store_uint(0b10, 2)?;
            b.store_uint(n as u64, width)?;
            for &bit in label {
                b.store_bit(bit)?;
            }
        }
        _ => {
            b.store_uint(0b11, 2)?;
            b.store_bit(label[0])?;
            b.store_uint(n as u64, width)?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Reads a `HashmapE` header, returning the root cell if present.
pub fn load_dict<'a>(slice: &mut CellSlice<'a>) -> CellResult<Option<&'a Cell>> {
    if slice.load_bit()? {
        Ok(Some(slice.load_reference()?))
    } else {
        Ok(None)
    }
}

/// Lists every `(key, value)` pair in key order. The value slice is
/// positioned right after the leaf's label.
pub fn entries<'a>(root: &'a Cell, key_bits: usize) -> CellResult<Vec<(DictKey, CellSlice<'a>)>> {
    let mut out = Vec::new();
    let mut prefix = Vec::with_capacity(key_bits);
    walk(root, key_bits, &mut prefix, &mut out)?;
    Ok(out)
}

fn walk<'a>(
    cell: &'a Cell,
    remaining: usize,
    prefix: &mut DictKey,
    out: &mut Vec<(DictKey, CellSlice<'a>)>,
) -> CellResult<()> {
    let mut s = cell.parse();
    let label = load_label(&mut s, remaining)?;
    if label.len() > remaining {
        return Err(CellError::underflow("dictionary label longer than key"));
    }
    let base = prefix.len();
    prefix.extend_from_slice(&label);
    let rest = remaining - label.len();
    if rest == 0 {
        out.push((prefix.clone(), s));
    } else {
        let left = s.load_reference()?;
        let right = s.load_reference()?;
        prefix.push(false);
        walk(left, rest - 1, prefix, out)?;
        prefix.pop();
        prefix.push(true);
        walk(right, rest - 1, prefix, out)?;
        prefix.pop();
    }
    prefix.truncate(base);
    Ok(())
}

fn load_label(s: &mut CellSlice<'_>, max: usize) -> CellResult<DictKey> {
    if !s.load_bit()? {
        let mut n = 0;
        while s.load_bit()? {
            n += 1;
        }
        return (0..n).map(|_| s.load_bit()).collect();
    }
    let width = len_bits(max);
    if !s.load_bit()? {
        let n = s.load_uint(width)? as usize;
        (0..n).map(|_| s.load_bit()).collect()
    } else {
        let bit = s.load_bit()?;
        let n = s.load_uint(width)? as usize;
        Ok(vec![bit; n])
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn ref_value(tag: u32) -> CellBuilder {
        let mut inner = CellBuilder::new();
        inner.store_u32(tag).unwrap();
        let mut b = CellBuilder::new();
        b.store_reference(inner.build().unwrap()).unwrap();
        b
    }

    #[test]
    fn empty_dictionary_has_no_root() {
        assert!(build(15, Vec::new()).unwrap().is_none());
    }

    #[test]
    fn entries_come_back_in_key_order() {
        let root = build(
            15,
            vec![
                (key_from_u64(2, 15), ref_value(20)),
                (key_from_u64(0, 15), ref_value(0)),
                (key_from_u64(1, 15), ref_value(10)),
            ],
        )
        .unwrap()
        .unwrap();

        let listed = entries(&root, 15).unwrap();
        let keys: Vec<u64> = listed.iter().map(|(k, _)| key_to_u64(k)).collect();
        assert_eq!(keys, vec![0, 1, 2]);
        let tags: Vec<u32> = listed
            .into_iter()
            .map(|(_, mut v)| v.load_reference().unwrap().parse().load_u32().unwrap())
            .collect();
        assert_eq!(tags, vec![0, 10, 20]);
    }

    #[test]
    fn single_entry_uses_one_leaf() {
        let key = HashBytes([0xaa; 32]);
        let root = build(256, vec![(key_from_hash(&key), ref_value(1))]).unwrap().unwrap();
        assert_eq!(root.refs().len(), 1);
        let listed = entries(&root, 256).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(key_to_hash(&listed[0].0).unwrap(), key);
    }

    #[test]
    fn duplicate_keys_keep_the_last_value() {
        let root = build(
            8,
            vec![(key_from_u64(5, 8), ref_value(1)), (key_from_u64(5, 8), ref_value(2))],
        )
        .unwrap()
        .unwrap();
        let mut listed = entries(&root, 8).unwrap();
        assert_eq!(listed.len(), 1);
        let value = listed[0].1.load_reference().unwrap().parse().load_u32().unwrap();
        assert_eq!(value, 2);
    }

    #[test]
    fn wrong_key_width_is_rejected() {
        assert!(build(8, vec![(key_from_u64(1, 4), ref_value(1))]).is_err());
    }

    #[test]
    fn same_label_is_chosen_for_constant_runs() {
        // A single zero key of 256 bits is cheapest as hml_same.
        let root = build(256, vec![(vec![false; 256], CellBuilder::new())]).unwrap().unwrap();
        let mut s = root.parse();
        assert_eq!(s.load_uint(2).unwrap(), 0b11);
        assert!(!s.load_bit().unwrap());
        assert_eq!(s.load_uint(9).unwrap(), 256);
    }
}
