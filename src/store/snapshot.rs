use std::ops::Bound;
use std::sync::Arc;

use roaring::RoaringBitmap;

use super::document::{DocNo, StoredDocument};
use super::query::{extract_prefix, pattern_to_regex, Occur, PostingsQuery};
use super::state::{Posting, StoreState};
use crate::error::{QuarryError, Result};
use crate::index::scoring;

/// Immutable point-in-time view of one store
///
/// Cloning is cheap; every clone sees the same generation regardless of
/// later commits.
#[derive(Clone, Debug)]
pub struct StoreSnapshot {
    state: Arc<StoreState>,
    max_clause_count: usize,
}

impl StoreSnapshot {
    pub(crate) fn new(state: Arc<StoreState>, max_clause_count: usize) -> Self {
        Self {
            state,
            max_clause_count,
        }
    }

    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&StoreState) -> R) -> R {
        f(&self.state)
    }

    pub fn generation(&self) -> u64 {
        self.state.generation
    }

    pub fn max_doc(&self) -> u32 {
        self.state.max_doc()
    }

    pub fn num_docs(&self) -> u64 {
        self.state.num_docs()
    }

    pub fn max_clause_count(&self) -> usize {
        self.max_clause_count
    }

    pub fn is_deleted(&self, doc: DocNo) -> bool {
        self.state.is_deleted(doc)
    }

    pub fn live_docs(&self) -> RoaringBitmap {
        self.state.live_docs()
    }

    /// Stored document for a live doc number
    pub fn document(&self, doc: DocNo) -> Option<&StoredDocument> {
        if self.state.is_deleted(doc) {
            return None;
        }
        self.state.docs.get(doc as usize)
    }

    pub fn stored_field(&self, doc: DocNo, name: &str) -> Option<&str> {
        self.document(doc).and_then(|d| d.get(name))
    }

    /// Live documents containing `term` in `field`, ascending
    pub fn term_docs<'a>(&'a self, field: &str, term: &str) -> impl Iterator<Item = DocNo> + 'a {
        self.state
            .postings(field, term)
            .iter()
            .map(|p| p.doc)
            .filter(move |doc| !self.state.is_deleted(*doc))
    }

    pub fn doc_freq(&self, field: &str, term: &str) -> u64 {
        self.term_docs(field, term).count() as u64
    }

    pub fn term_freq(&self, doc: DocNo, field: &str, term: &str) -> u32 {
        find_posting(self.state.postings(field, term), doc)
            .map(|p| p.freq())
            .unwrap_or(0)
    }

    /// Terms of `field` in descending order with their raw postings
    pub fn terms_descending<'a>(
        &'a self,
        field: &str,
    ) -> impl Iterator<Item = (&'a str, &'a [Posting])> + 'a {
        self.state
            .postings
            .get(field)
            .into_iter()
            .flat_map(|terms| terms.iter().rev())
            .map(|(term, list)| (term.as_str(), list.as_slice()))
    }

    /// Live documents matching `query`
    pub fn matches(&self, query: &PostingsQuery) -> Result<RoaringBitmap> {
        let mut docs = self.eval(query)?;
        docs -= &self.state.deleted;
        Ok(docs)
    }

    pub fn count(&self, query: &PostingsQuery) -> Result<u64> {
        Ok(self.matches(query)?.len())
    }

    /// Live documents matching `query` with tf-idf scores, best first
    pub fn search(&self, query: &PostingsQuery) -> Result<Vec<(DocNo, f32)>> {
        let docs = self.matches(query)?;
        let mut leaves = Vec::new();
        let mut constant = 0.0f32;
        collect_scoring_leaves(query, &mut leaves, &mut constant);

        let num_docs = self.num_docs();
        let doc_freqs: Vec<u64> = leaves
            .iter()
            .map(|(field, term, _)| self.doc_freq(field, term))
            .collect();

        let mut scored: Vec<(DocNo, f32)> = docs
            .iter()
            .map(|doc| {
                let mut score = constant;
                for ((field, term, boost), df) in leaves.iter().zip(&doc_freqs) {
                    let freq = self.term_freq(doc, field, term);
                    if freq == 0 {
                        continue;
                    }
                    let length = self
                        .state
                        .docs
                        .get(doc as usize)
                        .map(|d| d.field_length(field))
                        .unwrap_or(0);
                    score += scoring::tf_idf(freq, *df, num_docs, length, *boost);
                }
                (doc, score)
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.0.cmp(&a.0))
        });
        Ok(scored)
    }

    fn eval(&self, query: &PostingsQuery) -> Result<RoaringBitmap> {
        match query {
            PostingsQuery::Term { field, term, .. } => Ok(self.term_bitmap(field, term)),
            PostingsQuery::Phrase { field, terms, .. } => self.phrase_bitmap(field, terms),
            PostingsQuery::Wildcard { field, pattern, .. } => self.wildcard_bitmap(field, pattern),
            PostingsQuery::Range {
                field,
                lower,
                upper,
            } => Ok(self.range_bitmap(field, lower.as_deref(), upper.as_deref())),
            PostingsQuery::Boolean(clauses) => {
                if clauses.len() > self.max_clause_count {
                    return Err(QuarryError::TooManyClauses {
                        count: clauses.len(),
                        max: self.max_clause_count,
                    });
                }

                let mut must: Option<RoaringBitmap> = None;
                let mut should = RoaringBitmap::new();
                let mut must_not = RoaringBitmap::new();
                let mut has_should = false;

                for clause in clauses {
                    let docs = self.eval(&clause.query)?;
                    match clause.occur {
                        Occur::Must => {
                            must = Some(match must {
                                Some(acc) => acc & docs,
                                None => docs,
                            });
                        }
                        Occur::Should => {
                            has_should = true;
                            should |= docs;
                        }
                        Occur::MustNot => must_not |= docs,
                    }
                }

                let mut result = match must {
                    Some(acc) => acc,
                    None if has_should => should,
                    None => RoaringBitmap::new(),
                };
                result -= must_not;
                Ok(result)
            }
        }
    }

    fn term_bitmap(&self, field: &str, term: &str) -> RoaringBitmap {
        self.state
            .postings(field, term)
            .iter()
            .map(|p| p.doc)
            .collect()
    }

    fn phrase_bitmap(&self, field: &str, terms: &[(String, u32)]) -> Result<RoaringBitmap> {
        match terms {
            [] => return Ok(RoaringBitmap::new()),
            [(term, _)] => return Ok(self.term_bitmap(field, term)),
            _ => {}
        }

        let lists: Vec<&[Posting]> = terms
            .iter()
            .map(|(term, _)| self.state.postings(field, term))
            .collect();

        let mut candidates = self.term_bitmap(field, &terms[0].0);
        for (term, _) in &terms[1..] {
            candidates &= self.term_bitmap(field, term);
        }

        let mut result = RoaringBitmap::new();
        for doc in candidates.iter() {
            let postings: Option<Vec<&Posting>> =
                lists.iter().map(|list| find_posting(list, doc)).collect();
            let Some(postings) = postings else {
                continue;
            };
            let first_offset = terms[0].1;
            let matched = postings[0].positions.iter().any(|&start| {
                let Some(base) = start.checked_sub(first_offset) else {
                    return false;
                };
                postings
                    .iter()
                    .zip(terms)
                    .skip(1)
                    .all(|(posting, (_, offset))| posting.positions.contains(&(base + offset)))
            });
            if matched {
                result.insert(doc);
            }
        }
        Ok(result)
    }

    fn wildcard_bitmap(&self, field: &str, pattern: &str) -> Result<RoaringBitmap> {
        let Some(terms) = self.state.postings.get(field) else {
            return Ok(RoaringBitmap::new());
        };
        let regex = pattern_to_regex(pattern)?;
        let prefix = extract_prefix(pattern);

        // Only boolean clauses count against the clause limit.
        let mut result = RoaringBitmap::new();
        for (term, list) in terms.range::<str, _>((Bound::Included(prefix), Bound::Unbounded)) {
            if !term.starts_with(prefix) {
                break;
            }
            if regex.is_match(term) {
                result.extend(list.iter().map(|p| p.doc));
            }
        }
        Ok(result)
    }

    fn range_bitmap(&self, field: &str, lower: Option<&str>, upper: Option<&str>) -> RoaringBitmap {
        let Some(terms) = self.state.postings.get(field) else {
            return RoaringBitmap::new();
        };
        let lower = lower.map_or(Bound::Unbounded, Bound::Included);
        let upper = upper.map_or(Bound::Unbounded, Bound::Included);
        if let (Bound::Included(lo), Bound::Included(hi)) = (lower, upper) {
            if lo > hi {
                return RoaringBitmap::new();
            }
        }

        terms
            .range::<str, _>((lower, upper))
            .flat_map(|(_, list)| list.iter().map(|p| p.doc))
            .collect()
    }
}

fn find_posting(list: &[Posting], doc: DocNo) -> Option<&Posting> {
    list.binary_search_by_key(&doc, |p| p.doc)
        .ok()
        .map(|i| &list[i])
}

fn collect_scoring_leaves<'q>(
    query: &'q PostingsQuery,
    leaves: &mut Vec<(&'q str, &'q str, f32)>,
    constant: &mut f32,
) {
    match query {
        PostingsQuery::Term { field, term, boost } => {
            leaves.push((field.as_str(), term.as_str(), *boost))
        }
        PostingsQuery::Phrase {
            field,
            terms,
            boost,
        } => leaves.extend(terms.iter().map(|(term, _)| (field.as_str(), term.as_str(), *boost))),
        PostingsQuery::Wildcard { boost, .. } => *constant += boost,
        PostingsQuery::Range { .. } => *constant += 1.0,
        PostingsQuery::Boolean(clauses) => {
            for clause in clauses.iter().filter(|c| c.occur != Occur::MustNot) {
                collect_scoring_leaves(&clause.query, leaves, constant);
            }
        }
    }
}

impl StoreSnapshot {
    /// Number of distinct terms per indexed field
    pub fn field_term_counts(&self) -> Vec<(String, usize)> {
        self.state
            .postings
            .iter()
            .map(|(field, terms)| (field.clone(), terms.len()))
            .collect()
    }
}
