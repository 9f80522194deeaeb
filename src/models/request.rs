use std::collections::HashMap;

use super::indexable::{Indexable, IndexableKind};

/// A batch of indexables, de-duplicated by URI in submission order
#[derive(Clone, Debug, Default)]
pub struct IndexerRequest {
    indexables: Vec<Indexable>,
    by_uri: HashMap<String, usize>,
    /// Compact both stores after the flush
    pub optimize: bool,
}

impl IndexerRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_optimize(mut self) -> Self {
        self.optimize = true;
        self
    }

    /// Add an indexable, folding it into any prior entry for the same URI
    ///
    /// Add and Remove replace the prior entry in place. A PropertyChange
    /// merges into a prior Add or PropertyChange and is dropped after a Remove.
    pub fn add(&mut self, indexable: Indexable) {
        let Some(&slot) = self.by_uri.get(&indexable.uri) else {
            self.by_uri
                .insert(indexable.uri.clone(), self.indexables.len());
            self.indexables.push(indexable);
            return;
        };

        match indexable.kind {
            IndexableKind::Add | IndexableKind::Remove => self.indexables[slot] = indexable,
            IndexableKind::PropertyChange => {
                let prior = &mut self.indexables[slot];
                if prior.kind != IndexableKind::Remove {
                    prior.merge(indexable);
                }
            }
        }
    }

    pub fn push(mut self, indexable: Indexable) -> Self {
        self.add(indexable);
        self
    }

    pub fn len(&self) -> usize {
        self.indexables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indexables.is_empty() && !self.optimize
    }

    pub fn indexables(&self) -> &[Indexable] {
        &self.indexables
    }

    pub fn into_indexables(self) -> Vec<Indexable> {
        self.indexables
    }
}

impl FromIterator<Indexable> for IndexerRequest {
    fn from_iter<I: IntoIterator<Item = Indexable>>(iter: I) -> Self {
        let mut request = IndexerRequest::new();
        for indexable in iter {
            request.add(indexable);
        }
        request
    }
}
