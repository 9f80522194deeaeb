//! Bitset algebra over one store snapshot, with cross-store projection by URI
//!
//! Doc numbers of the two stores are unrelated; the only shared identity
//! is the `Uri` field. Projection translates a set in one store into the
//! set of documents with the same URIs in the other, so callers never see
//! internal ids.

use roaring::RoaringBitmap;

use crate::error::Result;
use crate::schema::fields::URI;
use crate::store::{DocNo, PostingsQuery, StoreSnapshot};

/// A set of documents of one store snapshot
pub struct StoreBitset<'s> {
    snapshot: &'s StoreSnapshot,
    bits: RoaringBitmap,
    pending_uris: Vec<String>,
}

impl<'s> StoreBitset<'s> {
    pub fn new(snapshot: &'s StoreSnapshot) -> Self {
        Self {
            snapshot,
            bits: RoaringBitmap::new(),
            pending_uris: Vec::new(),
        }
    }

    /// Set of documents matching `query`
    pub fn from_query(snapshot: &'s StoreSnapshot, query: &PostingsQuery) -> Result<Self> {
        let mut bitset = Self::new(snapshot);
        bitset.or_query(query)?;
        Ok(bitset)
    }

    /// Every live document
    pub fn all(snapshot: &'s StoreSnapshot) -> Self {
        Self {
            bits: snapshot.live_docs(),
            ..Self::new(snapshot)
        }
    }

    pub fn snapshot(&self) -> &'s StoreSnapshot {
        self.snapshot
    }

    pub fn or_query(&mut self, query: &PostingsQuery) -> Result<()> {
        self.bits |= self.snapshot.matches(query)?;
        Ok(())
    }

    pub fn and_query(&mut self, query: &PostingsQuery) -> Result<()> {
        self.bits &= self.snapshot.matches(query)?;
        Ok(())
    }

    pub fn and_not_query(&mut self, query: &PostingsQuery) -> Result<()> {
        self.bits -= self.snapshot.matches(query)?;
        Ok(())
    }

    pub fn xor_query(&mut self, query: &PostingsQuery) -> Result<()> {
        self.bits ^= self.snapshot.matches(query)?;
        Ok(())
    }

    pub fn or(&mut self, other: &StoreBitset<'_>) {
        self.bits |= &other.bits;
    }

    pub fn and(&mut self, other: &StoreBitset<'_>) {
        self.bits &= &other.bits;
    }

    pub fn and_not(&mut self, other: &StoreBitset<'_>) {
        self.bits -= &other.bits;
    }

    /// Complement over the live documents of the snapshot
    pub fn not(&mut self) {
        let mut complement = self.snapshot.live_docs();
        complement -= &self.bits;
        self.bits = complement;
    }

    /// Queue a URI to be OR-ed in by the next `flush_uris`
    ///
    /// Flushes on its own once a full clause batch is pending.
    pub fn add_uri(&mut self, uri: impl Into<String>) -> Result<()> {
        self.pending_uris.push(uri.into());
        if self.pending_uris.len() >= self.snapshot.max_clause_count() {
            self.flush_uris()?;
        }
        Ok(())
    }

    /// OR in every pending URI, in batches no larger than the clause limit
    pub fn flush_uris(&mut self) -> Result<()> {
        if self.pending_uris.is_empty() {
            return Ok(());
        }
        let pending = std::mem::take(&mut self.pending_uris);
        for chunk in pending.chunks(self.snapshot.max_clause_count().max(1)) {
            let query = PostingsQuery::any(
                chunk
                    .iter()
                    .map(|uri| PostingsQuery::term(URI, uri.as_str())),
            );
            self.or_query(&query)?;
        }
        Ok(())
    }

    /// OR the documents of `target` sharing a URI with ours into `target`
    pub fn project_onto(&self, target: &mut StoreBitset<'_>) -> Result<()> {
        for doc in self.bits.iter() {
            if let Some(uri) = self.snapshot.stored_field(doc, URI) {
                target.add_uri(uri)?;
            }
        }
        target.flush_uris()
    }

    /// Make both sets the union of the two, each in its own store
    ///
    /// The second projection only carries the part of `other` that the
    /// first projection did not already cover.
    pub fn join(&mut self, other: &mut StoreBitset<'_>) -> Result<()> {
        let mut image = StoreBitset::new(other.snapshot);
        self.project_onto(&mut image)?;
        other.or(&image);

        image.not();
        image.and(other);
        image.project_onto(self)
    }

    pub fn uri(&self, doc: DocNo) -> Option<&'s str> {
        self.snapshot.stored_field(doc, URI)
    }

    pub fn uris(&self) -> impl Iterator<Item = &'s str> + '_ {
        let snapshot = self.snapshot;
        self.bits
            .iter()
            .filter_map(move |doc| snapshot.stored_field(doc, URI))
    }

    pub fn insert(&mut self, doc: DocNo) {
        if !self.snapshot.is_deleted(doc) {
            self.bits.insert(doc);
        }
    }

    pub fn contains(&self, doc: DocNo) -> bool {
        self.bits.contains(doc)
    }

    pub fn count(&self) -> u64 {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn bits(&self) -> &RoaringBitmap {
        &self.bits
    }

    pub fn iter(&self) -> impl Iterator<Item = DocNo> + '_ {
        self.bits.iter()
    }

    pub fn clear(&mut self) {
        self.bits.clear();
    }
}

impl Clone for StoreBitset<'_> {
    fn clone(&self) -> Self {
        Self {
            snapshot: self.snapshot,
            bits: self.bits.clone(),
            pending_uris: self.pending_uris.clone(),
        }
    }
}
