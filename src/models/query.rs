use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::property::PropertyKind;

/// Whether a part must match or must not match
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Logic {
    Required,
    Prohibited,
}

/// The matching condition of a query part
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PartKind {
    /// Phrase over the text streams and/or searched text properties
    Text {
        text: String,
        search_full_text: bool,
        search_text_properties: bool,
    },
    /// Exact property match. A key of `*` matches any searched property of that kind.
    Property {
        key: String,
        value: String,
        kind: PropertyKind,
    },
    /// `*` / `?` pattern over analyzed text terms
    Wildcard { pattern: String },
    /// Inclusive range over the document timestamp (no key) or a date property
    DateRange {
        key: Option<String>,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    },
    /// Matches when any alternative matches
    Or(Vec<PartKind>),
}

impl PartKind {
    pub fn text(text: impl Into<String>) -> Self {
        PartKind::Text {
            text: text.into(),
            search_full_text: true,
            search_text_properties: true,
        }
    }

    pub fn property(kind: PropertyKind, key: impl Into<String>, value: impl Into<String>) -> Self {
        PartKind::Property {
            key: key.into(),
            value: value.into(),
            kind,
        }
    }

    pub fn keyword(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::property(PropertyKind::Keyword, key, value)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryPart {
    pub logic: Logic,
    pub kind: PartKind,
}

impl QueryPart {
    pub fn required(kind: PartKind) -> Self {
        Self {
            logic: Logic::Required,
            kind,
        }
    }

    pub fn prohibited(kind: PartKind) -> Self {
        Self {
            logic: Logic::Prohibited,
            kind,
        }
    }
}

/// A structured query. Hits match every Required part and no Prohibited part.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Query {
    pub parts: Vec<QueryPart>,
    pub max_hits: usize,
    /// Restrict to these MIME types when non-empty
    pub mime_types: Vec<String>,
    /// Restrict to these hit types when non-empty
    pub hit_types: Vec<String>,
}

impl Default for Query {
    fn default() -> Self {
        Self {
            parts: Vec::new(),
            max_hits: 100,
            mime_types: Vec::new(),
            hit_types: Vec::new(),
        }
    }
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require(mut self, kind: PartKind) -> Self {
        self.parts.push(QueryPart::required(kind));
        self
    }

    pub fn prohibit(mut self, kind: PartKind) -> Self {
        self.parts.push(QueryPart::prohibited(kind));
        self
    }

    pub fn with_max_hits(mut self, max_hits: usize) -> Self {
        self.max_hits = max_hits;
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_types.push(mime_type.into());
        self
    }

    pub fn with_hit_type(mut self, hit_type: impl Into<String>) -> Self {
        self.hit_types.push(hit_type.into());
        self
    }

    pub fn required_parts(&self) -> impl Iterator<Item = &QueryPart> {
        self.parts.iter().filter(|p| p.logic == Logic::Required)
    }
}
