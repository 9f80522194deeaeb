use std::collections::{BTreeMap, HashMap};

use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};

use super::document::{DocNo, StoredDocument};

/// One document's occurrences of a term
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    pub doc: DocNo,
    pub positions: Vec<u32>,
}

impl Posting {
    pub fn freq(&self) -> u32 {
        self.positions.len() as u32
    }
}

/// field -> term -> postings sorted by doc
pub type FieldPostings = BTreeMap<String, BTreeMap<String, Vec<Posting>>>;

/// Complete contents of one store at one generation
///
/// Deleted documents keep their doc numbers (and postings) until the
/// store is compacted.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StoreState {
    pub(crate) docs: Vec<StoredDocument>,
    pub(crate) deleted: RoaringBitmap,
    pub(crate) postings: FieldPostings,
    pub(crate) generation: u64,
}

impl StoreState {
    pub fn max_doc(&self) -> u32 {
        self.docs.len() as u32
    }

    pub fn num_docs(&self) -> u64 {
        self.docs.len() as u64 - self.deleted.len()
    }

    pub fn is_deleted(&self, doc: DocNo) -> bool {
        self.deleted.contains(doc)
    }

    pub fn live_docs(&self) -> RoaringBitmap {
        let mut live = RoaringBitmap::new();
        live.insert_range(0..self.max_doc());
        live -= &self.deleted;
        live
    }

    pub fn postings(&self, field: &str, term: &str) -> &[Posting] {
        self.postings
            .get(field)
            .and_then(|terms| terms.get(term))
            .map(|p| p.as_slice())
            .unwrap_or(&[])
    }

    /// Append the live documents of `other`, renumbering them after ours
    pub(crate) fn append(&mut self, other: &StoreState) {
        let base = self.max_doc();
        let remap = other.renumbering(base);
        for (old, doc) in other.docs.iter().enumerate() {
            if !other.is_deleted(old as DocNo) {
                self.docs.push(doc.clone());
            }
        }
        for (field, terms) in &other.postings {
            let target = self.postings.entry(field.clone()).or_default();
            for (term, list) in terms {
                let mapped = remap_postings(list, &remap);
                if !mapped.is_empty() {
                    target.entry(term.clone()).or_default().extend(mapped);
                }
            }
        }
    }

    /// Drop deleted documents and renumber the rest densely
    pub(crate) fn compact(&mut self) {
        if self.deleted.is_empty() {
            return;
        }
        let remap = self.renumbering(0);
        let docs = std::mem::take(&mut self.docs);
        self.docs = docs
            .into_iter()
            .enumerate()
            .filter(|(old, _)| !self.deleted.contains(*old as DocNo))
            .map(|(_, doc)| doc)
            .collect();

        for terms in self.postings.values_mut() {
            for list in terms.values_mut() {
                *list = remap_postings(list, &remap);
            }
            terms.retain(|_, list| !list.is_empty());
        }
        self.postings.retain(|_, terms| !terms.is_empty());
        self.deleted.clear();
    }

    fn renumbering(&self, base: DocNo) -> HashMap<DocNo, DocNo> {
        let mut next = base;
        let mut remap = HashMap::with_capacity(self.num_docs() as usize);
        for old in 0..self.max_doc() {
            if !self.is_deleted(old) {
                remap.insert(old, next);
                next += 1;
            }
        }
        remap
    }
}

fn remap_postings(list: &[Posting], remap: &HashMap<DocNo, DocNo>) -> Vec<Posting> {
    list.iter()
        .filter_map(|p| {
            remap.get(&p.doc).map(|&doc| Posting {
                doc,
                positions: p.positions.clone(),
            })
        })
        .collect()
}
