//! Relatives graph checks and edge-set arithmetic.
//!
//! Callers submit relatives as directed adjacency lists keyed by caller citizen ids;
//! storage keeps one undirected row per pair keyed by surrogate row ids.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use thiserror::Error;

use crate::{CensusError, CitizenId, RowId};

pub type Adjacency = BTreeMap<CitizenId, Vec<CitizenId>>;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum RelationViolation {
    #[error("citizen {citizen} lists unknown relative {relative}")]
    UnknownRelative {
        citizen: CitizenId,
        relative: CitizenId,
    },
    #[error("citizen {citizen} lists itself as a relative")]
    SelfRelation { citizen: CitizenId },
    #[error("citizen {citizen} lists relative {relative} more than once")]
    DuplicateRelative {
        citizen: CitizenId,
        relative: CitizenId,
    },
    #[error("citizen {citizen} lists {relative} as a relative but not the other way round")]
    Asymmetric {
        citizen: CitizenId,
        relative: CitizenId,
    },
}

impl From<RelationViolation> for CensusError {
    fn from(value: RelationViolation) -> Self {
        CensusError::relation(value.to_string())
    }
}

/// Checks that `adjacency` describes an undirected simple graph.
///
/// Violations are reported in ascending citizen order so the same input always yields
/// the same error.
pub fn validate_symmetry(adjacency: &Adjacency) -> Result<(), RelationViolation> {
    let mut directed = HashSet::new();
    for (&citizen, relatives) in adjacency {
        for &relative in relatives {
            if relative == citizen {
                return Err(RelationViolation::SelfRelation { citizen });
            }
            if !adjacency.contains_key(&relative) {
                return Err(RelationViolation::UnknownRelative { citizen, relative });
            }
            if !directed.insert((citizen, relative)) {
                return Err(RelationViolation::DuplicateRelative { citizen, relative });
            }
        }
    }
    for &(citizen, relative) in &directed_sorted(&directed) {
        if !directed.contains(&(relative, citizen)) {
            return Err(RelationViolation::Asymmetric { citizen, relative });
        }
    }
    Ok(())
}

fn directed_sorted(directed: &HashSet<(CitizenId, CitizenId)>) -> Vec<(CitizenId, CitizenId)> {
    let mut pairs: Vec<_> = directed.iter().copied().collect();
    pairs.sort_unstable();
    pairs
}

/// Emits every undirected pair of a validated adjacency exactly once.
///
/// Citizens are visited in ascending id order; once a citizen's own list has been
/// emitted it is marked done and later mentions of it are skipped.
pub fn unique_pairs(adjacency: &Adjacency) -> Vec<(CitizenId, CitizenId)> {
    let mut done = HashSet::with_capacity(adjacency.len());
    let mut pairs = Vec::new();
    for (&citizen, relatives) in adjacency {
        for &relative in relatives {
            if !done.contains(&relative) {
                pairs.push((citizen, relative));
            }
        }
        done.insert(citizen);
    }
    pairs
}

/// Checks a replacement relatives list for one citizen and returns it as a set.
pub fn check_relatives_list(
    citizen: CitizenId,
    relatives: &[CitizenId],
) -> Result<BTreeSet<CitizenId>, RelationViolation> {
    let mut set = BTreeSet::new();
    for &relative in relatives {
        if relative == citizen {
            return Err(RelationViolation::SelfRelation { citizen });
        }
        if !set.insert(relative) {
            return Err(RelationViolation::DuplicateRelative { citizen, relative });
        }
    }
    Ok(set)
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EdgeDiff<T: Ord> {
    pub to_delete: BTreeSet<T>,
    pub to_insert: BTreeSet<T>,
}

impl<T: Ord> Default for EdgeDiff<T> {
    fn default() -> Self {
        Self {
            to_delete: BTreeSet::new(),
            to_insert: BTreeSet::new(),
        }
    }
}

impl<T: Ord> EdgeDiff<T> {
    pub fn is_empty(&self) -> bool {
        self.to_delete.is_empty() && self.to_insert.is_empty()
    }
}

/// Minimal change turning the neighbor set `old` into `new`.
pub fn diff_neighbors<T: Ord + Copy>(old: &BTreeSet<T>, new: &BTreeSet<T>) -> EdgeDiff<T> {
    EdgeDiff {
        to_delete: old.difference(new).copied().collect(),
        to_insert: new.difference(old).copied().collect(),
    }
}

/// Canonical storage order of an undirected edge.
pub fn normalize_edge(a: RowId, b: RowId) -> (RowId, RowId) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Expands stored edges into per-row neighbor sets.
pub fn neighbor_map(edges: &[(RowId, RowId)]) -> BTreeMap<RowId, BTreeSet<RowId>> {
    let mut map: BTreeMap<RowId, BTreeSet<RowId>> = BTreeMap::new();
    for &(a, b) in edges {
        map.entry(a).or_default().insert(b);
        map.entry(b).or_default().insert(a);
    }
    map
}
