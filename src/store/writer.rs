use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use super::document::{Analysis, DocNo, Document, StoredDocument};
use super::index::TermIndex;
use super::snapshot::StoreSnapshot;
use super::state::{Posting, StoreState};
use crate::error::{QuarryError, Result};

/// Position gap between two values of the same field, so phrases never span values
const POSITION_GAP: u32 = 100;

/// Exclusive writer over one store
///
/// Works on a private copy of the store state. Nothing is visible to
/// readers until `commit`; dropping the writer discards its changes and
/// releases the write lock.
pub struct StoreWriter<'a> {
    index: &'a TermIndex,
    state: StoreState,
    added: usize,
    deleted: u64,
}

impl<'a> StoreWriter<'a> {
    pub(crate) fn new(index: &'a TermIndex, state: StoreState) -> Self {
        Self {
            index,
            state,
            added: 0,
            deleted: 0,
        }
    }

    /// Check that `add` would accept the document, without changing anything
    pub fn check(&self, doc: &Document) -> Result<()> {
        let max_bytes = self.index.max_field_bytes();
        match doc
            .fields
            .iter()
            .find(|f| f.analysis != Analysis::None && f.value.len() > max_bytes)
        {
            Some(field) => Err(QuarryError::FieldTooLarge {
                field: field.name.clone(),
                size: field.value.len(),
            }),
            None => Ok(()),
        }
    }

    /// Add a document and return its doc number within this writer's generation
    pub fn add(&mut self, doc: &Document) -> Result<DocNo> {
        self.check(doc)?;

        let doc_no = self.state.max_doc();
        let tokenizer = self.index.tokenizer();

        let mut stored = Vec::new();
        let mut lengths: BTreeMap<String, u32> = BTreeMap::new();
        let mut next_position: HashMap<&str, u32> = HashMap::new();
        let mut occurrences: BTreeMap<(&str, String), Vec<u32>> = BTreeMap::new();

        for field in &doc.fields {
            if field.stored {
                stored.push((field.name.clone(), field.value.clone()));
            }

            let base = next_position.entry(field.name.as_str()).or_insert(0);
            match field.analysis {
                Analysis::None => {}
                Analysis::Keyword => {
                    occurrences
                        .entry((field.name.as_str(), field.value.clone()))
                        .or_default()
                        .push(*base);
                    *base += 1 + POSITION_GAP;
                    *lengths.entry(field.name.clone()).or_insert(0) += 1;
                }
                Analysis::Text => {
                    let tokens = tokenizer.tokenize_with_positions_ordered(&field.value);
                    let mut end = *base;
                    for (term, position) in &tokens {
                        let position = *base + position;
                        occurrences
                            .entry((field.name.as_str(), term.clone()))
                            .or_default()
                            .push(position);
                        end = end.max(position + 1);
                    }
                    *base = end + POSITION_GAP;
                    *lengths.entry(field.name.clone()).or_insert(0) += tokens.len() as u32;
                }
            }
        }

        for ((field, term), positions) in occurrences {
            self.state
                .postings
                .entry(field.to_string())
                .or_default()
                .entry(term)
                .or_default()
                .push(Posting {
                    doc: doc_no,
                    positions,
                });
        }
        self.state.docs.push(StoredDocument::new(stored, lengths));
        self.added += 1;

        Ok(doc_no)
    }

    /// Delete every document containing `term` in `field`; returns how many were live
    pub fn delete_term(&mut self, field: &str, term: &str) -> u64 {
        let docs: Vec<DocNo> = self
            .state
            .postings(field, term)
            .iter()
            .map(|p| p.doc)
            .collect();

        let mut removed = 0;
        for doc in docs {
            if self.state.deleted.insert(doc) {
                removed += 1;
            }
        }
        self.deleted += removed;
        removed
    }

    /// Drop deleted documents and renumber the remainder
    pub fn optimize(&mut self) {
        self.state.compact();
    }

    /// Append every live document of another store
    pub fn add_snapshot(&mut self, other: &StoreSnapshot) {
        other.with_state(|state| self.state.append(state));
    }

    /// Persist and publish the changes
    pub fn commit(mut self) -> Result<()> {
        let mut state = std::mem::take(&mut self.state);
        state.generation += 1;
        debug!(
            store = self.index.name(),
            generation = state.generation,
            added = self.added,
            deleted = self.deleted,
            "committing store"
        );
        self.index.publish(state)
    }
}

impl Drop for StoreWriter<'_> {
    fn drop(&mut self) {
        self.index.release_writer();
    }
}
