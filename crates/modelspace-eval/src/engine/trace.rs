//! Dependency edges between cached cells results and what they read.
//!
//! While a cells result is being computed, every namespace read and every
//! nested cells call is recorded against it. Invalidating a lazy node or a
//! result then clears exactly the results that observed it.

use modelspace_common::{ArgKey, CellsId};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use super::lazy::NodeId;

/// One cached result: a cells and the bound argument tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResultKey {
    pub cells: CellsId,
    pub args: ArgKey,
}

/// Something a result can depend on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TraceKey {
    Node(NodeId),
    Result(ResultKey),
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct DependencyTrace {
    readers: FxHashMap<TraceKey, FxHashSet<ResultKey>>,
    reads: FxHashMap<ResultKey, FxHashSet<TraceKey>>,
}

impl DependencyTrace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `reader` read `key`.
    pub fn record(&mut self, key: TraceKey, reader: ResultKey) {
        if key == TraceKey::Result(reader.clone()) {
            return;
        }
        self.reads
            .entry(reader.clone())
            .or_default()
            .insert(key.clone());
        self.readers.entry(key).or_default().insert(reader);
    }

    /// Drop every edge recorded for `reader`.
    pub fn forget(&mut self, reader: &ResultKey) {
        let Some(keys) = self.reads.remove(reader) else {
            return;
        };
        for key in keys {
            if let Some(set) = self.readers.get_mut(&key) {
                set.remove(reader);
                if set.is_empty() {
                    self.readers.remove(&key);
                }
            }
        }
    }

    /// Remove and return the results that read `key`.
    pub fn take_readers(&mut self, key: &TraceKey) -> Vec<ResultKey> {
        self.readers
            .remove(key)
            .map(|set| set.into_iter().collect())
            .unwrap_or_default()
    }

    pub fn readers_of(&self, key: &TraceKey) -> usize {
        self.readers.get(key).map_or(0, FxHashSet::len)
    }

    /// Number of results with at least one recorded read.
    pub fn len(&self) -> usize {
        self.reads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reads.is_empty()
    }
}
