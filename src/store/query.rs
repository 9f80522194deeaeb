//! Queries understood by a single store

use regex::Regex;

use crate::error::{QuarryError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Occur {
    Must,
    Should,
    MustNot,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Clause {
    pub occur: Occur,
    pub query: PostingsQuery,
}

/// A postings-level query against one store
#[derive(Clone, Debug, PartialEq)]
pub enum PostingsQuery {
    Term {
        field: String,
        term: String,
        boost: f32,
    },
    /// Terms with their positions relative to the first term
    Phrase {
        field: String,
        terms: Vec<(String, u32)>,
        boost: f32,
    },
    Wildcard {
        field: String,
        pattern: String,
        boost: f32,
    },
    /// Inclusive bounds on the raw term; `None` is unbounded
    Range {
        field: String,
        lower: Option<String>,
        upper: Option<String>,
    },
    Boolean(Vec<Clause>),
}

impl PostingsQuery {
    pub fn term(field: impl Into<String>, term: impl Into<String>) -> Self {
        PostingsQuery::Term {
            field: field.into(),
            term: term.into(),
            boost: 1.0,
        }
    }

    pub fn phrase(field: impl Into<String>, terms: Vec<(String, u32)>) -> Self {
        PostingsQuery::Phrase {
            field: field.into(),
            terms,
            boost: 1.0,
        }
    }

    pub fn wildcard(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        PostingsQuery::Wildcard {
            field: field.into(),
            pattern: pattern.into(),
            boost: 1.0,
        }
    }

    pub fn range(
        field: impl Into<String>,
        lower: Option<String>,
        upper: Option<String>,
    ) -> Self {
        PostingsQuery::Range {
            field: field.into(),
            lower,
            upper,
        }
    }

    /// Boolean query where any clause may match
    pub fn any(queries: impl IntoIterator<Item = PostingsQuery>) -> Self {
        PostingsQuery::Boolean(
            queries
                .into_iter()
                .map(|query| Clause {
                    occur: Occur::Should,
                    query,
                })
                .collect(),
        )
    }

    /// Boolean query where every clause must match
    pub fn all(queries: impl IntoIterator<Item = PostingsQuery>) -> Self {
        PostingsQuery::Boolean(
            queries
                .into_iter()
                .map(|query| Clause {
                    occur: Occur::Must,
                    query,
                })
                .collect(),
        )
    }

    pub fn with_boost(mut self, value: f32) -> Self {
        match &mut self {
            PostingsQuery::Term { boost, .. }
            | PostingsQuery::Phrase { boost, .. }
            | PostingsQuery::Wildcard { boost, .. } => *boost = value,
            PostingsQuery::Range { .. } | PostingsQuery::Boolean(_) => {}
        }
        self
    }

    /// A phrase of one term is a term query
    pub(crate) fn simplify(self) -> Self {
        match self {
            PostingsQuery::Phrase {
                field,
                mut terms,
                boost,
            } if terms.len() == 1 => {
                let (term, _) = terms.remove(0);
                PostingsQuery::Term { field, term, boost }
            }
            other => other,
        }
    }
}

/// Compile a `*` / `?` pattern to an anchored regex
pub(crate) fn pattern_to_regex(pattern: &str) -> Result<Regex> {
    let mut regex_pattern = String::with_capacity(pattern.len() + 2);
    regex_pattern.push('^');

    for ch in pattern.chars() {
        match ch {
            '*' => regex_pattern.push_str(".*"),
            '?' => regex_pattern.push('.'),
            '.' | '+' | '(' | ')' | '[' | ']' | '{' | '}' | '^' | '$' | '|' | '\\' => {
                regex_pattern.push('\\');
                regex_pattern.push(ch);
            }
            _ => regex_pattern.push(ch),
        }
    }

    regex_pattern.push('$');

    Regex::new(&regex_pattern)
        .map_err(|e| QuarryError::InvalidRequest(format!("Invalid wildcard pattern: {}", e)))
}

/// Literal prefix before the first wildcard character, used to narrow the term scan
pub(crate) fn extract_prefix(pattern: &str) -> &str {
    let end = pattern.find(['*', '?']).unwrap_or(pattern.len());
    &pattern[..end]
}
