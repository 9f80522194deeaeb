use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::property::{Property, PARENT_PREFIX};

/// What an indexable asks the pipeline to do with its URI
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexableKind {
    /// Replace both documents for the URI
    Add,
    /// Delete both documents for the URI and its descendants
    Remove,
    /// Rewrite only the mutable document for the URI
    PropertyChange,
}

/// A unit of work submitted to the indexer
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Indexable {
    pub uri: String,
    pub parent_uri: Option<String>,
    pub kind: IndexableKind,
    pub hit_type: String,
    pub mime_type: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub revision: Option<u64>,
    /// Raw bytes handed to the content filter
    pub content: Option<Vec<u8>>,
    /// Filtered text stream
    pub text: Option<String>,
    /// Filtered high-weight text stream (titles, headings)
    pub hot_text: Option<String>,
    /// Metadata-only mode: text streams are not indexed
    pub no_content: bool,
    pub properties: Vec<Property>,
}

impl Indexable {
    pub fn new(kind: IndexableKind, uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            parent_uri: None,
            kind,
            hit_type: "File".to_string(),
            mime_type: None,
            timestamp: None,
            revision: None,
            content: None,
            text: None,
            hot_text: None,
            no_content: false,
            properties: Vec::new(),
        }
    }

    pub fn add(uri: impl Into<String>) -> Self {
        Self::new(IndexableKind::Add, uri)
    }

    pub fn remove(uri: impl Into<String>) -> Self {
        Self::new(IndexableKind::Remove, uri)
    }

    pub fn property_change(uri: impl Into<String>) -> Self {
        Self::new(IndexableKind::PropertyChange, uri)
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent_uri = Some(parent.into());
        self
    }

    pub fn with_hit_type(mut self, hit_type: impl Into<String>) -> Self {
        self.hit_type = hit_type.into();
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_hot_text(mut self, hot_text: impl Into<String>) -> Self {
        self.hot_text = Some(hot_text.into());
        self
    }

    pub fn with_content(mut self, content: impl Into<Vec<u8>>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_property(mut self, property: Property) -> Self {
        self.set_property(property);
        self
    }

    /// Insert a property, replacing any existing one with the same key
    pub fn set_property(&mut self, property: Property) {
        match self.properties.iter_mut().find(|p| p.key == property.key) {
            Some(existing) => *existing = property,
            None => self.properties.push(property),
        }
    }

    pub fn property(&self, key: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.key == key)
    }

    /// Fold a later request for the same URI into this one
    ///
    /// Properties of `other` overlay ours by key; scalar metadata from
    /// `other` wins when it is set.
    pub fn merge(&mut self, other: Indexable) {
        for property in other.properties {
            self.set_property(property);
        }
        if other.timestamp.is_some() {
            self.timestamp = other.timestamp;
        }
        if other.revision.is_some() {
            self.revision = other.revision;
        }
    }

    /// Make this a child of `parent`, copying the parent's properties as `parent:<key>`
    pub fn set_child_of(&mut self, parent: &Indexable) {
        self.parent_uri = Some(parent.uri.clone());
        if self.timestamp.is_none() {
            self.timestamp = parent.timestamp;
        }
        for property in &parent.properties {
            if property.key.starts_with(PARENT_PREFIX) || property.is_private() {
                continue;
            }
            let mut copy = property.clone();
            copy.key = format!("{}{}", PARENT_PREFIX, property.key);
            self.set_property(copy);
        }
    }
}
