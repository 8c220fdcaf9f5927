//! Library table and resolver.
//!
//! Contracts may replace their code with an exotic library cell that names
//! another cell by hash. The emulator can only follow such references if the
//! target is passed in its libraries dictionary, so before (and while)
//! emulating we walk every cell we can see, collect library references and
//! fetch the ones we do not know yet.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use retrace_core::{dict, Boc, Cell, CellBuilder, CellKind, CellResult, HashBytes};
use tracing::{debug, info, warn};

use crate::client::LedgerClient;
use crate::error::ClientError;

// ---------------------------------------------------------------------------
// LibraryTable
// ---------------------------------------------------------------------------

/// Additive `hash -> cell` map shared between sessions.
///
/// Writers publish a new map; readers hold an `Arc` to whichever version
/// they took, so a running emulation never sees the table change under it.
#[derive(Default)]
pub struct LibraryTable {
    current: Mutex<Arc<BTreeMap<HashBytes, Cell>>>,
    dict: Mutex<Option<(usize, Option<Cell>)>>,
}

impl LibraryTable {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn snapshot(&self) -> Arc<BTreeMap<HashBytes, Cell>> {
        Arc::clone(&self.current.lock())
    }

    pub fn len(&self) -> usize {
        self.current.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, hash: &HashBytes) -> bool {
        self.current.lock().contains_key(hash)
    }

    /// Adds entries not already present and returns how many were new.
    /// Existing entries are never replaced or removed.
    pub fn insert_many(&self, entries: impl IntoIterator<Item = (HashBytes, Cell)>) -> usize {
        let mut guard = self.current.lock();
        let mut next: Option<BTreeMap<HashBytes, Cell>> = None;
        for (hash, cell) in entries {
            if guard.contains_key(&hash) || next.as_ref().is_some_and(|n| n.contains_key(&hash)) {
                continue;
            }
            next.get_or_insert_with(|| (**guard).clone()).insert(hash, cell);
        }
        match next {
            Some(map) => {
                let added = map.len() - guard.len();
                *guard = Arc::new(map);
                added
            }
            None => 0,
        }
    }

    /// `HashmapE 256 ^Cell` root for the emulator, `None` while empty.
    pub fn to_dict(&self) -> CellResult<Option<Cell>> {
        let snapshot = self.snapshot();
        let mut cached = self.dict.lock();
        if let Some((len, dict)) = cached.as_ref() {
            // The table only grows, so its size identifies the version.
            if *len == snapshot.len() {
                return Ok(dict.clone());
            }
        }
        let entries = snapshot
            .iter()
            .map(|(hash, cell)| {
                let mut value = CellBuilder::new();
                value.store_reference(cell.clone())?;
                Ok((dict::key_from_hash(hash), value))
            })
            .collect::<CellResult<Vec<_>>>()?;
        let root = dict::build(256, entries)?;
        *cached = Some((snapshot.len(), root.clone()));
        Ok(root)
    }
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// Hashes of every library cell reachable from `roots`.
pub fn collect_library_refs(roots: &[Cell]) -> BTreeSet<HashBytes> {
    let mut found = BTreeSet::new();
    let mut seen = HashSet::new();
    let mut stack: Vec<&Cell> = roots.iter().collect();
    while let Some(cell) = stack.pop() {
        if !seen.insert(cell.hash()) {
            continue;
        }
        if cell.kind() == CellKind::Library {
            if let Some(hash) = cell.library_hash() {
                found.insert(hash);
            }
        }
        stack.extend(cell.refs());
    }
    found
}

static CELL_DUMP: Lazy<Regex> = Lazy::new(|| Regex::new(r"C\{([0-9A-Fa-f]+)\}").expect("valid regex"));

/// Cells printed into a verbose VM log as `C{<hex boc>}`. Dumps that do not
/// decode are skipped.
pub fn extract_log_cells(log: &str) -> Vec<Cell> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    for caps in CELL_DUMP.captures_iter(log) {
        match Boc::decode_hex(&caps[1]) {
            Ok(cell) => {
                if seen.insert(cell.hash()) {
                    out.push(cell);
                }
            }
            Err(err) => debug!(%err, "skipping undecodable cell dump"),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// LibraryResolver
// ---------------------------------------------------------------------------

pub struct LibraryResolver {
    client: Arc<dyn LedgerClient>,
    table: Arc<LibraryTable>,
}

impl LibraryResolver {
    pub fn new(client: Arc<dyn LedgerClient>, table: Arc<LibraryTable>) -> Self {
        Self { client, table }
    }

    pub fn table(&self) -> &Arc<LibraryTable> {
        &self.table
    }

    /// Fetches every library referenced from `candidates` (and, transitively,
    /// from fetched libraries) that the table does not hold yet. Returns the
    /// number of libraries added.
    pub async fn resolve(&self, candidates: &[Cell]) -> Result<usize, ClientError> {
        let mut added = 0;
        let mut requested: HashSet<HashBytes> = HashSet::new();
        let mut frontier: Vec<Cell> = candidates.to_vec();

        loop {
            let missing: Vec<HashBytes> = collect_library_refs(&frontier)
                .into_iter()
                .filter(|h| !self.table.contains(h) && !requested.contains(h))
                .collect();
            if missing.is_empty() {
                break;
            }
            requested.extend(missing.iter().copied());
            debug!(count = missing.len(), "fetching libraries");

            let fetched = self.client.libraries(&missing).await?;
            let mut verified = Vec::with_capacity(fetched.len());
            for entry in fetched {
                if entry.root.hash() != entry.hash {
                    warn!(expected = %entry.hash, actual = %entry.root.hash(), "library hash mismatch");
                    continue;
                }
                verified.push((entry.hash, entry.root));
            }
            frontier = verified.iter().map(|(_, root)| root.clone()).collect();
            added += self.table.insert_many(verified);
        }

        if added > 0 {
            info!(added, total = self.table.len(), "libraries resolved");
        }
        Ok(added)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
