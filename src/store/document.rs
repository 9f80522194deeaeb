use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Document number inside one store. Only meaningful against the snapshot it came from.
pub type DocNo = u32;

/// How a field value is turned into terms
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Analysis {
    /// Not searchable
    None,
    /// The whole value is one term
    Keyword,
    /// Tokenized and stemmed
    Text,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    pub name: String,
    pub value: String,
    pub stored: bool,
    pub analysis: Analysis,
}

impl Field {
    /// Stored and indexed as one term
    pub fn keyword(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            stored: true,
            analysis: Analysis::Keyword,
        }
    }

    /// Indexed as one term, not stored
    pub fn unstored_keyword(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            stored: false,
            ..Self::keyword(name, value)
        }
    }

    /// Tokenized, not stored
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            stored: false,
            analysis: Analysis::Text,
        }
    }

    pub fn stored(mut self, stored: bool) -> Self {
        self.stored = stored;
        self
    }

    /// Stored only
    pub fn stored_only(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            stored: true,
            analysis: Analysis::None,
        }
    }
}

/// A document as handed to a store writer
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Document {
    pub fields: Vec<Field>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: Field) {
        self.fields.push(field);
    }

    /// First stored value of `name`
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.stored && f.name == name)
            .map(|f| f.value.as_str())
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }
}

/// The stored half of a document, as kept by the store
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    fields: Vec<(String, String)>,
    /// Number of indexed terms per field, for length normalization
    lengths: BTreeMap<String, u32>,
}

impl StoredDocument {
    pub(crate) fn new(fields: Vec<(String, String)>, lengths: BTreeMap<String, u32>) -> Self {
        Self { fields, lengths }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.fields
            .iter()
            .filter(move |(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    pub fn field_length(&self, name: &str) -> u32 {
        self.lengths.get(name).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_skips_unstored_fields() {
        let mut doc = Document::new();
        doc.push(Field::text("Text", "hidden body"));
        doc.push(Field::keyword("Uri", "file:///a"));

        assert_eq!(doc.get("Uri"), Some("file:///a"));
        assert_eq!(doc.get("Text"), None);
    }

    #[test]
    fn test_stored_get_all() {
        let stored = StoredDocument::new(
            vec![
                ("tag".to_string(), "a".to_string()),
                ("tag".to_string(), "b".to_string()),
            ],
            BTreeMap::new(),
        );
        assert_eq!(stored.get_all("tag").collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(stored.get("tag"), Some("a"));
    }
}
