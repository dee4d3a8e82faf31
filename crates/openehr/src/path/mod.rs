//! openEHR path parsing and resolution.
//!
//! Paths such as `/content[openEHR-EHR-OBSERVATION.blood_pressure.v1]/data/events[at0006]`
//! navigate an [`RmTree`](crate::rm::RmTree) from a node or value. Resolution lives on the
//! tree itself ([`RmTree::resolve`](crate::rm::RmTree::resolve) and friends); this module holds
//! the grammar, the result type and the per-tree result cache.

mod parser;
mod resolver;

pub use parser::{parse_path, ParsedPath, PathSegment, Predicate};

use crate::rm::{NodeHandle, RmItem};
use std::collections::HashMap;
use std::sync::Mutex;

/// What a path resolved to.
#[derive(Clone, Debug, PartialEq)]
pub enum PathResult {
    Nothing,
    One(RmItem),
    /// Produced whenever a multiple-valued attribute was crossed without selecting a single
    /// member by node id and name, even if only one item matched.
    Many(Vec<RmItem>),
}

impl PathResult {
    pub fn is_nothing(&self) -> bool {
        matches!(self, PathResult::Nothing)
    }

    pub fn len(&self) -> usize {
        match self {
            PathResult::Nothing => 0,
            PathResult::One(_) => 1,
            PathResult::Many(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_items(self) -> Vec<RmItem> {
        match self {
            PathResult::Nothing => Vec::new(),
            PathResult::One(item) => vec![item],
            PathResult::Many(items) => items,
        }
    }
}

/// Memoised path results keyed by start node and path text.
///
/// The tree clears the cache on every mutation. A poisoned lock disables caching for that
/// call instead of failing resolution.
#[derive(Debug)]
pub(crate) struct PathCache {
    enabled: bool,
    entries: Mutex<HashMap<(NodeHandle, String), PathResult>>,
}

impl PathCache {
    pub(crate) fn new(enabled: bool) -> Self {
        Self {
            enabled,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn get(&self, start: NodeHandle, path: &str) -> Option<PathResult> {
        if !self.enabled {
            return None;
        }
        match self.entries.lock() {
            Ok(entries) => entries.get(&(start, path.to_string())).cloned(),
            Err(_) => {
                tracing::warn!("path cache lock poisoned, resolving {} uncached", path);
                None
            }
        }
    }

    pub(crate) fn put(&self, start: NodeHandle, path: &str, result: &PathResult) {
        if !self.enabled {
            return;
        }
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert((start, path.to_string()), result.clone());
        }
    }

    pub(crate) fn clear(&mut self) {
        match self.entries.get_mut() {
            Ok(entries) => entries.clear(),
            Err(poisoned) => {
                poisoned.into_inner().clear();
                self.entries.clear_poison();
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }
}
