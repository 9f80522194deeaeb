//! Content filter seam: turns raw bytes into text streams

use crate::error::{QuarryError, Result};
use crate::models::Indexable;

/// What a filter did with an indexable
#[derive(Clone, Debug, Default)]
pub struct FilterOutcome {
    pub name: String,
    pub version: u32,
    /// Follow-up indexables discovered inside the content (archive members, attachments)
    pub children: Vec<Indexable>,
}

/// Extracts text from an indexable's raw content
///
/// Returns `Ok(None)` when no filter applies; the item is then indexed
/// with whatever text it already carries. An error makes the pipeline
/// index the item in metadata-only mode.
pub trait ContentFilter: Send + Sync {
    fn filter(&self, indexable: &mut Indexable) -> Result<Option<FilterOutcome>>;
}

/// Passes `text/*` content through as the text stream
#[derive(Clone, Copy, Debug, Default)]
pub struct PlainTextFilter;

impl PlainTextFilter {
    pub const NAME: &'static str = "PlainText";
    pub const VERSION: u32 = 1;
}

impl ContentFilter for PlainTextFilter {
    fn filter(&self, indexable: &mut Indexable) -> Result<Option<FilterOutcome>> {
        let is_text = indexable
            .mime_type
            .as_deref()
            .is_some_and(|m| m.starts_with("text/"));
        if !is_text {
            return Ok(None);
        }
        let Some(content) = indexable.content.take() else {
            return Ok(None);
        };

        let text = String::from_utf8(content).map_err(|e| {
            QuarryError::ContentFilter(format!("{} is not valid UTF-8: {}", indexable.uri, e))
        })?;
        match &mut indexable.text {
            Some(existing) => {
                existing.push('\n');
                existing.push_str(&text);
            }
            None => indexable.text = Some(text),
        }

        Ok(Some(FilterOutcome {
            name: Self::NAME.to_string(),
            version: Self::VERSION,
            children: Vec::new(),
        }))
    }
}
