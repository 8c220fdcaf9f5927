//! Integration tests for bag-of-cells encoding over generated cell trees.

use proptest::prelude::*;
use retrace_core::{Boc, Cell, CellBuilder, CellKind, HashBytes};

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

fn leaf() -> impl Strategy<Value = Cell> {
    prop_oneof![
        (proptest::collection::vec(any::<u8>(), 0..=127), 0usize..8).prop_map(|(bytes, trim)| {
            let bits = (bytes.len() * 8).saturating_sub(trim);
            let mut b = CellBuilder::new();
            b.store_raw(&bytes, bits).unwrap();
            b.build().unwrap()
        }),
        any::<[u8; 32]>().prop_map(|h| Cell::library(&HashBytes(h))),
    ]
}

fn tree() -> impl Strategy<Value = Cell> {
    leaf().prop_recursive(4, 32, 4, |inner| {
        (proptest::collection::vec(inner, 0..=4), any::<u32>()).prop_map(|(children, tag)| {
            let mut b = CellBuilder::new();
            b.store_u32(tag).unwrap();
            for child in children {
                b.store_reference(child).unwrap();
            }
            b.build().unwrap()
        })
    })
}

// ---------------------------------------------------------------------------
// Laws
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn round_trip_preserves_hash(cell in tree()) {
        let decoded = Boc::decode(&Boc::encode(&cell)).unwrap();
        prop_assert_eq!(decoded.hash(), cell.hash());
        prop_assert_eq!(decoded.depth(), cell.depth());
    }

    #[test]
    fn base64_round_trip_preserves_hash(cell in tree()) {
        let decoded = Boc::decode_base64(&Boc::encode_base64(&cell)).unwrap();
        prop_assert_eq!(decoded, cell);
    }
}

#[test]
fn multi_root_encoding_keeps_root_order() {
    let a = {
        let mut b = CellBuilder::new();
        b.store_u8(1).unwrap();
        b.build().unwrap()
    };
    let lib = Cell::library(&HashBytes([3; 32]));
    let roots = Boc::decode_all(&Boc::encode_all(&[lib.clone(), a.clone()])).unwrap();
    assert_eq!(roots, vec![lib, a]);
    assert_eq!(roots[0].kind(), CellKind::Library);
}
