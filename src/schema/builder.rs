//! Splits an indexable into its primary and secondary documents

use tracing::debug;

use super::fields::{self, HOT_TEXT, MIME_TYPE, PARENT_URI, TEXT, TIMESTAMP, TYPE, URI};
use crate::models::{format_date, Indexable, Property, PropertyKind};
use crate::store::{Document, Field, StoredDocument};

/// Build the primary document and, if any mutable property exists, the secondary one
///
/// Properties with the `_unindexed:` prefix are dropped. When the indexable
/// is in metadata-only mode its text streams are skipped.
pub fn build(indexable: &Indexable) -> (Document, Option<Document>) {
    let mut primary = Document::new();
    primary.push(Field::keyword(URI, &indexable.uri));
    if let Some(parent) = &indexable.parent_uri {
        primary.push(Field::keyword(PARENT_URI, parent));
    }
    primary.push(Field::keyword(TYPE, &indexable.hit_type));
    if let Some(mime_type) = &indexable.mime_type {
        primary.push(Field::keyword(MIME_TYPE, mime_type));
    }
    if let Some(timestamp) = &indexable.timestamp {
        primary.push(Field::keyword(TIMESTAMP, format_date(timestamp)));
    }

    if !indexable.no_content {
        if let Some(text) = &indexable.text {
            primary.push(Field::text(TEXT, text));
        }
        if let Some(hot_text) = &indexable.hot_text {
            primary.push(Field::text(HOT_TEXT, hot_text));
        }
    }

    let mut secondary: Option<Document> = None;
    for property in indexable.properties.iter().filter(|p| !p.is_unindexed()) {
        let Some(value) = &property.value else {
            continue;
        };
        let target = if property.is_mutable {
            secondary.get_or_insert_with(|| secondary_skeleton(&indexable.uri))
        } else {
            &mut primary
        };
        add_property(target, property, value);
    }

    (primary, secondary)
}

/// Rewrite a secondary document with the property changes of `indexable`
///
/// New values overlay old ones by key and a `None` value deletes the key.
/// Properties the change does not mention survive. Returns `None` when no
/// mutable property is left.
pub fn rewrite(old: Option<&StoredDocument>, indexable: &Indexable) -> Option<Document> {
    let mut properties = old
        .map(|doc| properties_of(doc, true))
        .unwrap_or_default();

    for change in &indexable.properties {
        if !change.is_mutable {
            debug!(uri = %indexable.uri, key = %change.key, "ignoring immutable property in change");
            continue;
        }
        properties.retain(|p| p.key != change.key);
        if change.value.is_some() {
            properties.push(change.clone());
        }
    }

    let mut doc: Option<Document> = None;
    for property in properties.iter().filter(|p| !p.is_unindexed()) {
        if let Some(value) = &property.value {
            let target = doc.get_or_insert_with(|| secondary_skeleton(&indexable.uri));
            add_property(target, property, value);
        }
    }
    doc
}

/// Decode the stored properties of a document
pub fn properties_of(doc: &StoredDocument, mutable: bool) -> Vec<Property> {
    doc.fields()
        .iter()
        .filter_map(|(name, stored)| {
            let (kind, key) = fields::parse_property_field(name)?;
            let (is_searched, value) = fields::decode_value(stored)?;
            Some(Property {
                key: key.to_string(),
                value: Some(value.to_string()),
                kind,
                is_searched,
                is_mutable: mutable,
            })
        })
        .collect()
}

fn secondary_skeleton(uri: &str) -> Document {
    let mut doc = Document::new();
    doc.push(Field::keyword(URI, uri));
    doc
}

fn add_property(doc: &mut Document, property: &Property, value: &str) {
    let name = fields::property_field(property.kind, &property.key);
    doc.push(Field::stored_only(
        name.clone(),
        fields::encode_value(value, property.is_searched),
    ));

    let indexed = match property.kind {
        PropertyKind::Text => Field::text(name, value),
        PropertyKind::Keyword | PropertyKind::Date => Field::unstored_keyword(name, value),
    };
    doc.push(indexed);

    if property.is_searched {
        let wildcard = fields::wildcard_field(property.kind);
        doc.push(match property.kind {
            PropertyKind::Text => Field::text(wildcard, value),
            PropertyKind::Keyword | PropertyKind::Date => Field::unstored_keyword(wildcard, value),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Analysis;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    fn stored(doc: &Document) -> StoredDocument {
        StoredDocument::new(
            doc.fields
                .iter()
                .filter(|f| f.stored)
                .map(|f| (f.name.clone(), f.value.clone()))
                .collect(),
            BTreeMap::new(),
        )
    }

    fn sample() -> Indexable {
        Indexable::add("file:///home/u/report.txt")
            .with_parent("file:///home/u")
            .with_mime_type("text/plain")
            .with_timestamp(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap())
            .with_text("quarterly ledger body")
            .with_hot_text("Ledger")
            .with_property(Property::keyword("fixme:filename", "report.txt"))
            .with_property(Property::keyword("tag", "work").mutable())
            .with_property(Property::keyword("_unindexed:raw", "zzz"))
    }

    #[test]
    fn test_build_partitions_by_mutability() {
        let (primary, secondary) = build(&sample());

        assert_eq!(primary.get(URI), Some("file:///home/u/report.txt"));
        assert_eq!(primary.get(PARENT_URI), Some("file:///home/u"));
        assert_eq!(primary.get(TIMESTAMP), Some("20240501120000"));
        assert_eq!(primary.get("prop:k:fixme:filename"), Some("s:report.txt"));
        assert_eq!(primary.get("prop:k:tag"), None);
        assert!(primary
            .fields
            .iter()
            .any(|f| f.name == TEXT && f.analysis == Analysis::Text));
        assert!(!primary.field_names().any(|n| n.contains("_unindexed:")));

        let secondary = secondary.unwrap();
        assert_eq!(secondary.get(URI), Some("file:///home/u/report.txt"));
        assert_eq!(secondary.get("prop:k:tag"), Some("s:work"));
        assert_eq!(secondary.get("prop:k:fixme:filename"), None);
    }

    #[test]
    fn test_build_without_mutable_properties_has_no_secondary() {
        let indexable = Indexable::add("file:///a").with_property(Property::text("title", "hello"));
        let (_, secondary) = build(&indexable);
        assert!(secondary.is_none());
    }

    #[test]
    fn test_no_content_skips_text_streams() {
        let mut indexable = sample();
        indexable.no_content = true;
        let (primary, _) = build(&indexable);
        assert!(!primary.field_names().any(|n| n == TEXT || n == HOT_TEXT));
        assert_eq!(primary.get(URI), Some("file:///home/u/report.txt"));
    }

    #[test]
    fn test_rewrite_overlays_and_deletes() {
        let old = Indexable::property_change("file:///a")
            .with_property(Property::keyword("tag", "red").mutable())
            .with_property(Property::keyword("owner", "alice").mutable())
            .with_property(Property::text("note", "draft memo").mutable());
        let (_, old_doc) = build(&Indexable {
            kind: crate::models::IndexableKind::Add,
            ..old
        });
        let old_doc = stored(&old_doc.unwrap());

        let change = Indexable::property_change("file:///a")
            .with_property(Property::keyword("tag", "blue").mutable())
            .with_property(Property::deletion(PropertyKind::Text, "note"));
        let rewritten = rewrite(Some(&old_doc), &change).unwrap();

        let props = properties_of(&stored(&rewritten), true);
        let find = |key: &str| props.iter().find(|p| p.key == key);
        assert_eq!(find("tag").unwrap().value.as_deref(), Some("blue"));
        assert_eq!(find("owner").unwrap().value.as_deref(), Some("alice"));
        assert!(find("note").is_none());
        assert_eq!(rewritten.get(URI), Some("file:///a"));
    }

    #[test]
    fn test_rewrite_without_prior_document() {
        let change = Indexable::property_change("file:///new")
            .with_property(Property::keyword("tag", "x").mutable());
        let doc = rewrite(None, &change).unwrap();
        assert_eq!(doc.get(URI), Some("file:///new"));
        assert_eq!(doc.get("prop:k:tag"), Some("s:x"));
    }

    #[test]
    fn test_rewrite_deleting_last_property_leaves_nothing() {
        let (_, old_doc) = build(
            &Indexable::add("file:///a").with_property(Property::keyword("tag", "red").mutable()),
        );
        let old_doc = stored(&old_doc.unwrap());

        let change = Indexable::property_change("file:///a")
            .with_property(Property::deletion(PropertyKind::Keyword, "tag"))
            .with_property(Property::keyword("title", "immutable"));
        assert!(rewrite(Some(&old_doc), &change).is_none());
        assert!(rewrite(None, &change).is_none());
    }

    #[test]
    fn test_properties_of_keeps_searched_flag() {
        let indexable = Indexable::add("file:///a")
            .with_property(Property::keyword("hidden", "v").unsearched());
        let (primary, _) = build(&indexable);
        let props = properties_of(&stored(&primary), false);
        assert_eq!(props.len(), 1);
        assert!(!props[0].is_searched);
        assert!(!props[0].is_mutable);
    }
}
