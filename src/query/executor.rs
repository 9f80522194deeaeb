//! Turns the matching primary documents into hits
//!
//! Selection keeps the `max_hits` newest matches, ordered by
//! (timestamp, doc number) descending. Only the selected documents are
//! materialized, reunified with their mutable properties and scored.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use tracing::debug;

use super::bitset::StoreBitset;
use super::compiler::{CompiledQuery, ScoringTerm};
use crate::error::Result;
use crate::index::scoring;
use crate::models::{parse_date, Hit, HitFilter, HitSink, Property, UriFilter};
use crate::schema::fields::{MIME_TYPE, PARENT_URI, TIMESTAMP, TYPE, URI};
use crate::schema::properties_of;
use crate::store::{DocNo, StoreSnapshot};

/// Ordering key of a candidate: newest first, ties broken by the higher doc number
type RecencyKey<'a> = (Option<&'a str>, DocNo);

/// Which selection path produced the candidates
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Selection {
    All,
    ShortCircuit,
    FullScan,
}

pub struct ResultAssembler<'a> {
    primary: &'a StoreSnapshot,
    secondary: &'a StoreSnapshot,
    short_circuit_factor: f64,
    source: &'a str,
}

impl<'a> ResultAssembler<'a> {
    pub fn new(
        primary: &'a StoreSnapshot,
        secondary: &'a StoreSnapshot,
        short_circuit_factor: f64,
        source: &'a str,
    ) -> Self {
        Self {
            primary,
            secondary,
            short_circuit_factor,
            source,
        }
    }

    /// Select, assemble and stream hits; returns how many reached the sink
    pub fn assemble(
        &self,
        matches: &StoreBitset<'a>,
        compiled: &CompiledQuery,
        max_hits: usize,
        uri_filter: Option<UriFilter<'_>>,
        hit_filter: Option<HitFilter<'_>>,
        sink: &mut dyn HitSink,
    ) -> Result<usize> {
        let (candidates, selection) = self.select(matches, max_hits, uri_filter);
        debug!(
            matches = matches.count(),
            candidates = candidates.len(),
            ?selection,
            "selected candidates"
        );

        let mut hits = self.materialize(&candidates);
        let secondary_docs = self.reunify(&candidates, &mut hits)?;
        self.score(&candidates, &secondary_docs, &compiled.scoring_terms, &mut hits);

        let mut emitted = 0;
        for mut hit in hits {
            if !compiled.accepts(&hit) {
                continue;
            }
            if let Some(filter) = hit_filter {
                if !filter(&hit) {
                    continue;
                }
            }
            hit.properties.retain(|p| !p.is_private());
            sink.accept(hit);
            emitted += 1;
        }
        Ok(emitted)
    }

    /// Pick at most `max_hits` candidates, newest first
    pub fn select(
        &self,
        matches: &StoreBitset<'a>,
        max_hits: usize,
        uri_filter: Option<UriFilter<'_>>,
    ) -> (Vec<DocNo>, Selection) {
        let accept = |doc: DocNo| match uri_filter {
            Some(filter) => matches.uri(doc).is_some_and(filter),
            None => true,
        };

        if matches.count() <= max_hits as u64 {
            let mut all: Vec<DocNo> = matches.iter().filter(|&doc| accept(doc)).collect();
            all.sort_by(|a, b| self.recency_key(*b).cmp(&self.recency_key(*a)));
            return (all, Selection::All);
        }

        if let Some(walked) = self.short_circuit(matches, max_hits, &accept) {
            return (walked, Selection::ShortCircuit);
        }
        (self.full_scan(matches, max_hits, &accept), Selection::FullScan)
    }

    /// Walk timestamp terms newest first, giving up after a bounded number of postings
    fn short_circuit(
        &self,
        matches: &StoreBitset<'a>,
        max_hits: usize,
        accept: &dyn Fn(DocNo) -> bool,
    ) -> Option<Vec<DocNo>> {
        if max_hits == 0 {
            return Some(Vec::new());
        }
        let budget = (matches.count() as f64 * self.short_circuit_factor).ceil() as u64;
        let mut walked = 0u64;
        let mut found = Vec::with_capacity(max_hits);

        for (_, postings) in self.primary.terms_descending(TIMESTAMP) {
            for posting in postings.iter().rev() {
                walked += 1;
                if walked > budget {
                    debug!(walked, budget, "short-circuit budget exhausted");
                    return None;
                }
                if matches.contains(posting.doc) && accept(posting.doc) {
                    found.push(posting.doc);
                    if found.len() == max_hits {
                        return Some(found);
                    }
                }
            }
        }
        None
    }

    /// Bounded heap over every match
    fn full_scan(
        &self,
        matches: &StoreBitset<'a>,
        max_hits: usize,
        accept: &dyn Fn(DocNo) -> bool,
    ) -> Vec<DocNo> {
        if max_hits == 0 {
            return Vec::new();
        }
        let mut heap: BinaryHeap<Reverse<RecencyKey<'a>>> = BinaryHeap::with_capacity(max_hits + 1);

        for doc in matches.iter() {
            if !accept(doc) {
                continue;
            }
            let key = self.recency_key(doc);
            if heap.len() < max_hits {
                heap.push(Reverse(key));
            } else if let Some(Reverse(lowest)) = heap.peek() {
                if key > *lowest {
                    heap.pop();
                    heap.push(Reverse(key));
                }
            }
        }

        let mut keys: Vec<RecencyKey<'a>> = heap.into_iter().map(|Reverse(key)| key).collect();
        keys.sort_by(|a, b| b.cmp(a));
        keys.into_iter().map(|(_, doc)| doc).collect()
    }

    fn recency_key(&self, doc: DocNo) -> RecencyKey<'a> {
        (self.primary.stored_field(doc, TIMESTAMP), doc)
    }

    fn materialize(&self, candidates: &[DocNo]) -> Vec<Hit> {
        candidates
            .iter()
            .filter_map(|&doc| {
                let stored = self.primary.document(doc)?;
                Some(Hit {
                    uri: stored.get(URI)?.to_string(),
                    parent_uri: stored.get(PARENT_URI).map(str::to_string),
                    timestamp: stored.get(TIMESTAMP).and_then(parse_date),
                    hit_type: stored.get(TYPE).unwrap_or_default().to_string(),
                    mime_type: stored.get(MIME_TYPE).map(str::to_string),
                    score: 0.0,
                    source: self.source.to_string(),
                    properties: properties_of(stored, false),
                })
            })
            .collect()
    }

    /// Merge mutable properties onto the hits; returns each hit's secondary doc
    fn reunify(&self, candidates: &[DocNo], hits: &mut [Hit]) -> Result<HashMap<String, DocNo>> {
        if hits.is_empty() || self.secondary.num_docs() == 0 {
            return Ok(HashMap::new());
        }

        let mut selected = StoreBitset::new(self.primary);
        for &doc in candidates {
            selected.insert(doc);
        }
        let mut image = StoreBitset::new(self.secondary);
        selected.project_onto(&mut image)?;

        let mut secondary_docs = HashMap::with_capacity(image.count() as usize);
        let mut mutable: HashMap<&str, Vec<Property>> = HashMap::new();
        for doc in image.iter() {
            let Some(stored) = self.secondary.document(doc) else {
                continue;
            };
            let Some(uri) = stored.get(URI) else {
                continue;
            };
            secondary_docs.insert(uri.to_string(), doc);
            mutable.insert(uri, properties_of(stored, true));
        }

        for hit in hits.iter_mut() {
            if let Some(properties) = mutable.remove(hit.uri.as_str()) {
                hit.properties.extend(properties);
            }
        }
        Ok(secondary_docs)
    }

    /// tf-idf over the final hits only
    fn score(
        &self,
        candidates: &[DocNo],
        secondary_docs: &HashMap<String, DocNo>,
        terms: &[ScoringTerm],
        hits: &mut [Hit],
    ) {
        if terms.is_empty() {
            return;
        }
        let stats: Vec<(u64, u64)> = terms
            .iter()
            .map(|t| {
                (
                    self.primary.doc_freq(&t.field, &t.term),
                    self.secondary.doc_freq(&t.field, &t.term),
                )
            })
            .collect();

        let primary_docs: HashMap<&str, DocNo> = candidates
            .iter()
            .filter_map(|&doc| self.primary.stored_field(doc, URI).map(|uri| (uri, doc)))
            .collect();

        for hit in hits.iter_mut() {
            let mut score = 0.0;
            for (term, (primary_df, secondary_df)) in terms.iter().zip(&stats) {
                if let Some(&doc) = primary_docs.get(hit.uri.as_str()) {
                    score += term_score(self.primary, doc, term, *primary_df);
                }
                if let Some(&doc) = secondary_docs.get(&hit.uri) {
                    score += term_score(self.secondary, doc, term, *secondary_df);
                }
            }
            hit.score = score;
        }
    }
}

fn term_score(snapshot: &StoreSnapshot, doc: DocNo, term: &ScoringTerm, doc_freq: u64) -> f32 {
    let freq = snapshot.term_freq(doc, &term.field, &term.term);
    if freq == 0 {
        return 0.0;
    }
    let length = snapshot
        .document(doc)
        .map(|d| d.field_length(&term.field))
        .unwrap_or(0);
    scoring::tf_idf(freq, doc_freq, snapshot.num_docs(), length, term.boost)
}
