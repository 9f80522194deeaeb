//! Field names and property encoding shared by both stores

use crate::models::PropertyKind;

pub const URI: &str = "Uri";
pub const PARENT_URI: &str = "ParentUri";
pub const TYPE: &str = "Type";
pub const MIME_TYPE: &str = "MimeType";
pub const TIMESTAMP: &str = "Timestamp";
pub const TEXT: &str = "Text";
pub const HOT_TEXT: &str = "HotText";

/// Catch-all fields receiving every searched property of one kind
pub const PROPERTY_TEXT: &str = "PropertyText";
pub const PROPERTY_KEYWORD: &str = "PropertyKeyword";
pub const PROPERTY_DATE: &str = "PropertyDate";

const PROPERTY_PREFIX: &str = "prop:";
const SEARCHED_MARKER: &str = "s:";
const UNSEARCHED_MARKER: &str = "_:";

/// Field name for property `key`: `prop:<t|k|d>:<key>`
pub fn property_field(kind: PropertyKind, key: &str) -> String {
    format!("{}{}:{}", PROPERTY_PREFIX, kind.code(), key)
}

/// Inverse of `property_field`
pub fn parse_property_field(name: &str) -> Option<(PropertyKind, &str)> {
    let rest = name.strip_prefix(PROPERTY_PREFIX)?;
    let mut chars = rest.chars();
    let kind = PropertyKind::from_code(chars.next()?)?;
    let key = chars.as_str().strip_prefix(':')?;
    Some((kind, key))
}

pub fn wildcard_field(kind: PropertyKind) -> &'static str {
    match kind {
        PropertyKind::Text => PROPERTY_TEXT,
        PropertyKind::Keyword => PROPERTY_KEYWORD,
        PropertyKind::Date => PROPERTY_DATE,
    }
}

/// Stored form of a property value, carrying its searched flag
pub fn encode_value(value: &str, is_searched: bool) -> String {
    let marker = if is_searched {
        SEARCHED_MARKER
    } else {
        UNSEARCHED_MARKER
    };
    format!("{}{}", marker, value)
}

/// Returns (is_searched, value)
pub fn decode_value(stored: &str) -> Option<(bool, &str)> {
    if let Some(value) = stored.strip_prefix(SEARCHED_MARKER) {
        Some((true, value))
    } else {
        stored
            .strip_prefix(UNSEARCHED_MARKER)
            .map(|value| (false, value))
    }
}
