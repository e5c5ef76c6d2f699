//! Known-set filter: classify candidates as already stored or not, by point lookup or by an
//! in-memory snapshot of stored identities. Read-only with respect to the store.

use log::{debug, warn};
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::PathBuf;

use crate::FilterStrategy;
use crate::engine::db_ops::MetadataStore;

/// Prepared filter for one pass over candidates.
pub enum KnownSet {
    /// Ask the store per candidate.
    Lookup,
    /// Identities loaded once from the store.
    Snapshot(HashSet<String>),
}

impl KnownSet {
    /// A snapshot that cannot be loaded degrades to an empty set: everything is treated as
    /// unknown and the idempotent insert absorbs the duplicates.
    pub fn prepare<S: MetadataStore + ?Sized>(strategy: FilterStrategy, store: &S) -> Self {
        match strategy {
            FilterStrategy::Lookup => KnownSet::Lookup,
            FilterStrategy::Snapshot => match store.known_paths() {
                Ok(set) => {
                    debug!("Loaded {} known identities", set.len());
                    KnownSet::Snapshot(set)
                }
                Err(e) => {
                    warn!("Could not load known identities, treating all as new: {e}");
                    KnownSet::Snapshot(HashSet::new())
                }
            },
        }
    }

    /// A failed lookup counts as unknown.
    pub fn is_known<S: MetadataStore + ?Sized>(&self, store: &S, identity: &str) -> bool {
        match self {
            KnownSet::Lookup => store.contains(identity).unwrap_or_else(|e| {
                warn!("Lookup failed for {identity}, treating as new: {e}");
                false
            }),
            KnownSet::Snapshot(set) => set.contains(identity),
        }
    }

    /// Split `(path, identity)` pairs into unknown candidates and the count of known ones.
    /// Snapshot membership is tested in parallel; lookups stay on the caller's thread.
    pub fn partition<S: MetadataStore + ?Sized>(
        &self,
        store: &S,
        candidates: Vec<(PathBuf, String)>,
    ) -> (Vec<(PathBuf, String)>, usize) {
        match self {
            KnownSet::Snapshot(set) => {
                let (known, unknown): (Vec<_>, Vec<_>) = candidates
                    .into_par_iter()
                    .partition(|(_, id)| set.contains(id));
                (unknown, known.len())
            }
            KnownSet::Lookup => {
                let mut known = 0_usize;
                let unknown = candidates
                    .into_iter()
                    .filter(|(_, id)| {
                        let hit = self.is_known(store, id);
                        known += usize::from(hit);
                        !hit
                    })
                    .collect();
                (unknown, known)
            }
        }
    }
}
