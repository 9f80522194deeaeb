use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Key prefix for properties that are never written to either store
pub const UNINDEXED_PREFIX: &str = "_unindexed:";
/// Key prefix for properties stripped from hits before they reach callers
pub const PRIVATE_PREFIX: &str = "_private:";
/// Key prefix for properties copied from a parent onto its children
pub const PARENT_PREFIX: &str = "parent:";

const DATE_FORMAT: &str = "%Y%m%d%H%M%S";

/// How a property value is analyzed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyKind {
    /// Tokenized and stemmed
    Text,
    /// Indexed as a single opaque token
    Keyword,
    /// `yyyyMMddHHmmss` string, single token, ordered like time
    Date,
}

impl PropertyKind {
    pub fn code(&self) -> char {
        match self {
            PropertyKind::Text => 't',
            PropertyKind::Keyword => 'k',
            PropertyKind::Date => 'd',
        }
    }

    pub fn from_code(code: char) -> Option<Self> {
        match code {
            't' => Some(PropertyKind::Text),
            'k' => Some(PropertyKind::Keyword),
            'd' => Some(PropertyKind::Date),
            _ => None,
        }
    }
}

/// A typed key/value attached to an indexable
///
/// `value == None` only has meaning on a PropertyChange, where it deletes
/// the key from the mutable store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub key: String,
    pub value: Option<String>,
    pub kind: PropertyKind,
    pub is_searched: bool,
    pub is_mutable: bool,
}

impl Property {
    pub fn new(kind: PropertyKind, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
            kind,
            is_searched: true,
            is_mutable: false,
        }
    }

    pub fn text(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(PropertyKind::Text, key, value)
    }

    pub fn keyword(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(PropertyKind::Keyword, key, value)
    }

    pub fn date(key: impl Into<String>, value: DateTime<Utc>) -> Self {
        Self::new(PropertyKind::Date, key, format_date(&value))
    }

    /// A property change that removes `key` from the mutable store
    pub fn deletion(kind: PropertyKind, key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
            kind,
            is_searched: false,
            is_mutable: true,
        }
    }

    pub fn mutable(mut self) -> Self {
        self.is_mutable = true;
        self
    }

    pub fn unsearched(mut self) -> Self {
        self.is_searched = false;
        self
    }

    pub fn is_unindexed(&self) -> bool {
        self.key.starts_with(UNINDEXED_PREFIX)
    }

    pub fn is_private(&self) -> bool {
        self.key.starts_with(PRIVATE_PREFIX)
    }

    /// Parsed value of a Date property
    pub fn date_value(&self) -> Option<DateTime<Utc>> {
        match self.kind {
            PropertyKind::Date => self.value.as_deref().and_then(parse_date),
            _ => None,
        }
    }
}

/// Format a timestamp so lexicographic order matches time order
pub fn format_date(value: &DateTime<Utc>) -> String {
    value.format(DATE_FORMAT).to_string()
}

pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, DATE_FORMAT)
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}
