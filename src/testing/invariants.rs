//! Invariant checking framework for correctness verification
//!
//! Each invariant inspects the committed state of both stores of a
//! `DualIndex` and reports the first inconsistency it finds.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::index::DualIndex;
use crate::schema::fields::{self, PARENT_URI, URI};
use crate::store::StoreSnapshot;

/// A violation of an invariant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub invariant: String,
    pub description: String,
    /// URIs involved in the violation
    pub uris: Vec<String>,
    pub context: HashMap<String, String>,
}

impl Violation {
    fn new(invariant: &str, description: impl Into<String>, uris: Vec<String>) -> Self {
        Self {
            invariant: invariant.to_string(),
            description: description.into(),
            uris,
            context: HashMap::new(),
        }
    }

    fn with_context(mut self, key: &str, value: impl ToString) -> Self {
        self.context.insert(key.to_string(), value.to_string());
        self
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "INVARIANT VIOLATION: {}", self.invariant)?;
        writeln!(f, "  Description: {}", self.description)?;
        writeln!(f, "  URIs: {:?}", self.uris)?;
        if !self.context.is_empty() {
            writeln!(f, "  Context:")?;
            for (key, value) in &self.context {
                writeln!(f, "    {}: {}", key, value)?;
            }
        }
        Ok(())
    }
}

/// Trait for invariant checkers
pub trait Invariant: Send + Sync {
    /// Name of the invariant
    fn name(&self) -> &str;

    /// Check the invariant against the committed state of an index
    fn check(&self, index: &DualIndex) -> Result<(), Violation>;

    /// Human-readable description
    fn description(&self) -> &str {
        "No description provided"
    }
}

/// Check all invariants and return violations
pub fn check_all_invariants(index: &DualIndex, invariants: &[Box<dyn Invariant>]) -> Vec<Violation> {
    invariants
        .iter()
        .filter_map(|invariant| invariant.check(index).err())
        .collect()
}

/// URIs with more than one live document in a store
fn duplicate_uris(snapshot: &StoreSnapshot) -> (Vec<String>, usize) {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut duplicates: Vec<String> = Vec::new();
    let mut live = 0;
    for doc in snapshot.live_docs().iter() {
        live += 1;
        if let Some(uri) = snapshot.stored_field(doc, URI) {
            if !seen.insert(uri) && !duplicates.iter().any(|d| d == uri) {
                duplicates.push(uri.to_string());
            }
        }
    }
    duplicates.sort();
    (duplicates, live)
}

/// Invariant: at most one primary document per URI
pub struct UniquePrimaryPerUri;

impl Invariant for UniquePrimaryPerUri {
    fn name(&self) -> &str {
        "UniquePrimaryPerUri"
    }

    fn description(&self) -> &str {
        "The primary store holds at most one live document per URI"
    }

    fn check(&self, index: &DualIndex) -> Result<(), Violation> {
        let (duplicates, live) = duplicate_uris(&index.primary().open_reader());
        if duplicates.is_empty() {
            return Ok(());
        }
        Err(Violation::new(
            self.name(),
            format!("{} URIs have several primary documents", duplicates.len()),
            duplicates,
        )
        .with_context("live_docs", live))
    }
}

/// Invariant: at most one secondary document per URI
pub struct UniqueSecondaryPerUri;

impl Invariant for UniqueSecondaryPerUri {
    fn name(&self) -> &str {
        "UniqueSecondaryPerUri"
    }

    fn description(&self) -> &str {
        "The secondary store holds at most one live document per URI"
    }

    fn check(&self, index: &DualIndex) -> Result<(), Violation> {
        let (duplicates, live) = duplicate_uris(&index.secondary().open_reader());
        if duplicates.is_empty() {
            return Ok(());
        }
        Err(Violation::new(
            self.name(),
            format!("{} URIs have several secondary documents", duplicates.len()),
            duplicates,
        )
        .with_context("live_docs", live))
    }
}

/// Invariant: no child outlives its parent
///
/// A document whose parent URI is itself indexed is fine; one whose parent
/// was removed means a cascade delete was missed. Children whose parent
/// was never indexed are not checked.
pub struct NoOrphanedChildren {
    /// Parents known to have been removed
    pub removed_parents: HashSet<String>,
}

impl NoOrphanedChildren {
    pub fn new<I, S>(removed_parents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            removed_parents: removed_parents.into_iter().map(Into::into).collect(),
        }
    }
}

impl Invariant for NoOrphanedChildren {
    fn name(&self) -> &str {
        "NoOrphanedChildren"
    }

    fn description(&self) -> &str {
        "Removing a URI removes every document parented under it"
    }

    fn check(&self, index: &DualIndex) -> Result<(), Violation> {
        let primary = index.primary().open_reader();
        let indexed: HashSet<&str> = primary
            .live_docs()
            .iter()
            .filter_map(|doc| primary.stored_field(doc, URI))
            .collect();

        let mut orphans: Vec<String> = primary
            .live_docs()
            .iter()
            .filter_map(|doc| {
                let parent = primary.stored_field(doc, PARENT_URI)?;
                if indexed.contains(parent) || !self.removed_parents.contains(parent) {
                    return None;
                }
                primary.stored_field(doc, URI).map(str::to_string)
            })
            .collect();
        if orphans.is_empty() {
            return Ok(());
        }
        orphans.sort();
        Err(Violation::new(
            self.name(),
            format!("{} children outlived their parent", orphans.len()),
            orphans,
        ))
    }
}

/// Invariant: secondary documents carry only a URI and mutable properties,
/// and never exist without a primary document
pub struct SecondaryOnlyMutable;

impl Invariant for SecondaryOnlyMutable {
    fn name(&self) -> &str {
        "SecondaryOnlyMutable"
    }

    fn description(&self) -> &str {
        "Secondary documents hold only the URI and property fields of an indexed item"
    }

    fn check(&self, index: &DualIndex) -> Result<(), Violation> {
        let primary = index.primary().open_reader();
        let secondary = index.secondary().open_reader();

        let mut offending: Vec<String> = Vec::new();
        let mut reason = String::new();
        for doc in secondary.live_docs().iter() {
            let Some(stored) = secondary.document(doc) else {
                continue;
            };
            let Some(uri) = stored.get(URI) else {
                offending.push(format!("#{}", doc));
                reason = "secondary document without a URI".to_string();
                continue;
            };
            let foreign = stored
                .fields()
                .iter()
                .find(|(name, _)| name != URI && fields::parse_property_field(name).is_none());
            if let Some((name, _)) = foreign {
                offending.push(uri.to_string());
                reason = format!("secondary document stores field {}", name);
            } else if primary.term_docs(URI, uri).next().is_none() {
                offending.push(uri.to_string());
                reason = "secondary document without a primary document".to_string();
            }
        }
        if offending.is_empty() {
            return Ok(());
        }
        Err(Violation::new(self.name(), reason, offending))
    }
}

/// Invariants that need no knowledge of the operations applied
pub fn default_invariants() -> Vec<Box<dyn Invariant>> {
    vec![
        Box::new(UniquePrimaryPerUri),
        Box::new(UniqueSecondaryPerUri),
        Box::new(SecondaryOnlyMutable),
    ]
}
