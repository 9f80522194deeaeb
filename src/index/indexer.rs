//! Applies an `IndexerRequest` to both stores
//!
//! A flush runs in two commits. The first removes every document the
//! request replaces, so the second can write without ever observing two
//! documents for one URI.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use super::filter::FilterOutcome;
use super::DualIndex;
use crate::error::{QuarryError, Result};
use crate::models::{Indexable, IndexableKind, IndexerRequest, Receipt};
use crate::schema::{self, fields::PARENT_URI, fields::URI};
use crate::store::{Document, StoreSnapshot, StoreWriter, StoredDocument};

/// Notified as a flush makes progress
pub trait FlushObserver {
    fn item_indexed(&mut self, _uri: &str, _filter: Option<&FilterOutcome>) {}

    fn filter_failed(&mut self, _uri: &str, _error: &QuarryError) {}

    /// The item could not be written even without content
    fn item_dropped(&mut self, _uri: &str, _error: &QuarryError) {}

    fn flushed(&mut self, _receipts: &[Receipt]) {}
}

#[derive(Debug, Default)]
pub struct NoopObserver;

impl FlushObserver for NoopObserver {}

/// State captured before deletion for each PropertyChange
struct PendingChange {
    indexed: bool,
    old_secondary: Option<StoredDocument>,
    children: Vec<String>,
}

impl DualIndex {
    /// Apply a request and return one receipt per affected item
    pub fn flush(&self, request: IndexerRequest) -> Result<Vec<Receipt>> {
        self.flush_observed(request, &mut NoopObserver)
    }

    pub fn flush_observed(
        &self,
        request: IndexerRequest,
        observer: &mut dyn FlushObserver,
    ) -> Result<Vec<Receipt>> {
        let optimize = request.optimize;
        let indexables = request.into_indexables();
        let mut receipts = Vec::new();
        if indexables.is_empty() && !optimize {
            return Ok(receipts);
        }

        let primary_reader = self.primary().open_reader();
        let secondary_reader = self.secondary().open_reader();

        let pending = self.capture_property_changes(&indexables, &primary_reader, &secondary_reader);

        // Deletions, committed before anything is written.
        let mut removed: HashSet<String> = HashSet::new();
        {
            let mut primary = self.open_writer(self.primary())?;
            let mut secondary = self.open_writer(self.secondary())?;
            for indexable in &indexables {
                match indexable.kind {
                    IndexableKind::Add | IndexableKind::Remove => {
                        let count = delete_with_descendants(
                            &indexable.uri,
                            &primary_reader,
                            &mut primary,
                            &mut secondary,
                            &mut removed,
                        );
                        if indexable.kind == IndexableKind::Remove {
                            debug!("-{} ({} documents)", indexable.uri, count);
                            receipts.push(Receipt::Removed {
                                uri: indexable.uri.clone(),
                            });
                        }
                    }
                    IndexableKind::PropertyChange => {
                        secondary.delete_term(URI, &indexable.uri);
                    }
                }
            }
            primary.commit()?;
            secondary.commit()?;
        }
        drop(primary_reader);
        drop(secondary_reader);

        let mut primary = self.open_writer(self.primary())?;
        let mut secondary = self.open_writer(self.secondary())?;
        for indexable in indexables {
            match indexable.kind {
                IndexableKind::Remove => {}
                IndexableKind::Add => {
                    self.write_add(indexable, &mut primary, &mut secondary, observer, &mut receipts)
                }
                IndexableKind::PropertyChange => {
                    // Items removed earlier in this flush are gone.
                    let change = pending
                        .get(&indexable.uri)
                        .filter(|_| !removed.contains(&indexable.uri));
                    write_property_change(
                        indexable,
                        change,
                        &mut secondary,
                        observer,
                        &mut receipts,
                    );
                }
            }
        }

        if optimize {
            primary.optimize();
            secondary.optimize();
        }
        primary.commit()?;
        secondary.commit()?;

        self.refresh_item_count();
        observer.flushed(&receipts);
        info!(
            receipts = receipts.len(),
            items = self.item_count(),
            optimized = optimize,
            "flushed"
        );
        Ok(receipts)
    }

    fn capture_property_changes(
        &self,
        indexables: &[Indexable],
        primary: &StoreSnapshot,
        secondary: &StoreSnapshot,
    ) -> HashMap<String, PendingChange> {
        indexables
            .iter()
            .filter(|i| i.kind == IndexableKind::PropertyChange)
            .map(|indexable| {
                let old_secondary = secondary
                    .term_docs(URI, &indexable.uri)
                    .next()
                    .and_then(|doc| secondary.document(doc))
                    .cloned();
                let indexed = primary.term_docs(URI, &indexable.uri).next().is_some();
                let children = child_uris(primary, &indexable.uri);
                (
                    indexable.uri.clone(),
                    PendingChange {
                        indexed,
                        old_secondary,
                        children,
                    },
                )
            })
            .collect()
    }

    fn write_add(
        &self,
        mut indexable: Indexable,
        primary: &mut StoreWriter<'_>,
        secondary: &mut StoreWriter<'_>,
        observer: &mut dyn FlushObserver,
        receipts: &mut Vec<Receipt>,
    ) {
        let outcome = if indexable.content.is_some() {
            match self.content_filter().filter(&mut indexable) {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(uri = %indexable.uri, error = %e, "filter failed, indexing metadata only");
                    observer.filter_failed(&indexable.uri, &e);
                    indexable.no_content = true;
                    None
                }
            }
        } else {
            None
        };

        if let Err(e) = write_documents(&indexable, primary, secondary) {
            if !e.is_item_local() {
                warn!(uri = %indexable.uri, error = %e, "dropping item");
                observer.item_dropped(&indexable.uri, &e);
                return;
            }
            warn!(uri = %indexable.uri, error = %e, "write failed, retrying without content");
            indexable.no_content = true;
            if let Err(e) = write_documents(&indexable, primary, secondary) {
                warn!(uri = %indexable.uri, error = %e, "giving up on item");
                observer.item_dropped(&indexable.uri, &e);
                return;
            }
        }
        debug!("+{}", indexable.uri);
        observer.item_indexed(&indexable.uri, outcome.as_ref());

        receipts.push(Receipt::Added {
            uri: indexable.uri.clone(),
            filter_name: outcome.as_ref().map(|o| o.name.clone()),
            filter_version: outcome.as_ref().map(|o| o.version),
            property_changes_only: false,
        });

        if let Some(outcome) = outcome {
            if !outcome.children.is_empty() {
                let children = outcome
                    .children
                    .into_iter()
                    .map(|mut child| {
                        child.set_child_of(&indexable);
                        child
                    })
                    .collect();
                receipts.push(Receipt::ChildIndexables {
                    parent: indexable.uri.clone(),
                    children,
                });
            }
        }
    }
}

fn write_property_change(
    indexable: Indexable,
    change: Option<&PendingChange>,
    secondary: &mut StoreWriter<'_>,
    observer: &mut dyn FlushObserver,
    receipts: &mut Vec<Receipt>,
) {
    let Some(change) = change.filter(|c| c.indexed) else {
        debug!(uri = %indexable.uri, "ignoring property change for unindexed item");
        return;
    };
    match schema::rewrite(change.old_secondary.as_ref(), &indexable) {
        Some(doc) => {
            if let Err(e) = secondary.add(&doc) {
                warn!(uri = %indexable.uri, error = %e, "dropping property change");
                observer.item_dropped(&indexable.uri, &e);
                return;
            }
            debug!("+{} (properties)", indexable.uri);
        }
        None => debug!("+{} (no mutable properties left)", indexable.uri),
    }
    observer.item_indexed(&indexable.uri, None);

    receipts.push(Receipt::Added {
        uri: indexable.uri.clone(),
        filter_name: None,
        filter_version: None,
        property_changes_only: true,
    });

    let children: Vec<Indexable> = change
        .children
        .iter()
        .map(|uri| {
            let mut child = Indexable::property_change(uri.as_str());
            child.set_child_of(&indexable);
            child
        })
        .collect();
    if !children.is_empty() {
        receipts.push(Receipt::ChildIndexables {
            parent: indexable.uri,
            children,
        });
    }
}

/// Write both documents of an indexable, or neither
fn write_documents(
    indexable: &Indexable,
    primary: &mut StoreWriter<'_>,
    secondary: &mut StoreWriter<'_>,
) -> Result<()> {
    let (primary_doc, secondary_doc): (Document, Option<Document>) = schema::build(indexable);
    primary.check(&primary_doc)?;
    if let Some(doc) = &secondary_doc {
        secondary.check(doc)?;
    }
    primary.add(&primary_doc)?;
    if let Some(doc) = &secondary_doc {
        secondary.add(doc)?;
    }
    Ok(())
}

/// Live URIs whose parent is `uri`
fn child_uris(primary: &StoreSnapshot, uri: &str) -> Vec<String> {
    primary
        .term_docs(PARENT_URI, uri)
        .filter_map(|doc| primary.stored_field(doc, URI))
        .map(str::to_string)
        .collect()
}

/// Delete `uri` and, transitively, everything parented under it
///
/// URIs already in `removed` are skipped; every URI visited is added.
fn delete_with_descendants(
    uri: &str,
    primary_reader: &StoreSnapshot,
    primary: &mut StoreWriter<'_>,
    secondary: &mut StoreWriter<'_>,
    removed: &mut HashSet<String>,
) -> u64 {
    let mut stack = vec![uri.to_string()];
    let mut count = 0;

    while let Some(current) = stack.pop() {
        if !removed.insert(current.clone()) {
            continue;
        }
        count += primary.delete_term(URI, &current);
        secondary.delete_term(URI, &current);
        stack.extend(child_uris(primary_reader, &current));
    }
    count
}
