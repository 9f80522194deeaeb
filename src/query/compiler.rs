//! Translates a structured query into per-store postings queries

use chrono::{DateTime, SubsecRound, Utc};

use crate::models::{format_date, Hit, Logic, PartKind, PropertyKind, Query};
use crate::schema::fields::{
    self, HOT_TEXT, MIME_TYPE, PROPERTY_TEXT, TEXT, TIMESTAMP, TYPE,
};
use crate::store::{Clause, Occur, PostingsQuery};
use crate::tokenizer::Tokenizer;

/// Boost applied to hot text and text properties relative to body text
pub const HOT_BOOST: f32 = 1.75;

/// Check applied to assembled hits after the postings match
#[derive(Clone, Debug, PartialEq)]
pub enum PostFilter {
    DateRange {
        key: Option<String>,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    },
    /// Passes when any alternative passes
    Any(Vec<PostFilter>),
}

impl PostFilter {
    pub fn accepts(&self, hit: &Hit) -> bool {
        match self {
            PostFilter::DateRange { key: None, start, end } => hit
                .timestamp
                .is_some_and(|ts| in_range(&ts, start.as_ref(), end.as_ref())),
            PostFilter::DateRange {
                key: Some(key),
                start,
                end,
            } => hit
                .properties
                .iter()
                .filter(|p| p.kind == PropertyKind::Date && (key == "*" || &p.key == key))
                .filter_map(|p| p.date_value())
                .any(|date| in_range(&date, start.as_ref(), end.as_ref())),
            PostFilter::Any(filters) => filters.iter().any(|f| f.accepts(hit)),
        }
    }
}

fn in_range(value: &DateTime<Utc>, start: Option<&DateTime<Utc>>, end: Option<&DateTime<Utc>>) -> bool {
    start.map_or(true, |s| value >= s) && end.map_or(true, |e| value <= e)
}

/// One query part, split by store. `None` means the part cannot match in that store.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompiledPart {
    pub primary: Option<PostingsQuery>,
    pub secondary: Option<PostingsQuery>,
    pub post_filter: Option<PostFilter>,
}

impl CompiledPart {
    pub fn matches_nothing(&self) -> bool {
        self.primary.is_none() && self.secondary.is_none()
    }

    pub fn touches_secondary(&self) -> bool {
        self.secondary.is_some()
    }
}

/// A term that contributes to the relevance of final hits
#[derive(Clone, Debug, PartialEq)]
pub struct ScoringTerm {
    pub field: String,
    pub term: String,
    pub boost: f32,
}

impl ScoringTerm {
    fn new(field: &str, term: String, boost: f32) -> Self {
        Self {
            field: field.to_string(),
            term,
            boost,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct CompiledQuery {
    pub required: Vec<CompiledPart>,
    pub prohibited_primary: Option<PostingsQuery>,
    pub prohibited_secondary: Option<PostingsQuery>,
    pub post_filters: Vec<PostFilter>,
    /// MIME type / hit type restriction, primary store only
    pub restriction: Option<PostingsQuery>,
    pub scoring_terms: Vec<ScoringTerm>,
}

impl CompiledQuery {
    /// A query with no required parts matches nothing
    pub fn is_empty(&self) -> bool {
        self.required.is_empty()
    }

    pub fn has_prohibited(&self) -> bool {
        self.prohibited_primary.is_some() || self.prohibited_secondary.is_some()
    }

    pub fn accepts(&self, hit: &Hit) -> bool {
        self.post_filters.iter().all(|f| f.accepts(hit))
    }
}

pub struct QueryCompiler<'t> {
    tokenizer: &'t Tokenizer,
}

impl<'t> QueryCompiler<'t> {
    pub fn new(tokenizer: &'t Tokenizer) -> Self {
        Self { tokenizer }
    }

    pub fn compile(&self, query: &Query) -> CompiledQuery {
        let mut compiled = CompiledQuery::default();
        let mut prohibited_primary = Vec::new();
        let mut prohibited_secondary = Vec::new();

        for part in &query.parts {
            let Some(part_compiled) = self.compile_kind(&part.kind) else {
                continue;
            };
            match part.logic {
                Logic::Required => {
                    self.collect_scoring_terms(&part.kind, &mut compiled.scoring_terms);
                    if let Some(filter) = &part_compiled.post_filter {
                        compiled.post_filters.push(filter.clone());
                    }
                    compiled.required.push(part_compiled);
                }
                Logic::Prohibited => {
                    prohibited_primary.extend(part_compiled.primary);
                    prohibited_secondary.extend(part_compiled.secondary);
                }
            }
        }

        compiled.prohibited_primary = union(prohibited_primary);
        compiled.prohibited_secondary = union(prohibited_secondary);
        compiled.restriction = restriction(query);
        compiled
    }

    /// Compile one part; `None` when it analyzes to nothing and should be ignored
    fn compile_kind(&self, kind: &PartKind) -> Option<CompiledPart> {
        match kind {
            PartKind::Text {
                text,
                search_full_text,
                search_text_properties,
            } => {
                let terms = self.tokenizer.tokenize_with_positions_ordered(text);
                if terms.is_empty() {
                    return None;
                }
                let phrase = |field: &str| PostingsQuery::phrase(field, terms.clone()).simplify();

                let mut primary = Vec::new();
                let mut secondary = None;
                if *search_full_text {
                    primary.push(phrase(TEXT));
                    primary.push(phrase(HOT_TEXT).with_boost(HOT_BOOST));
                }
                if *search_text_properties {
                    primary.push(phrase(PROPERTY_TEXT).with_boost(HOT_BOOST));
                    secondary = Some(phrase(PROPERTY_TEXT).with_boost(HOT_BOOST));
                }
                Some(CompiledPart {
                    primary: union(primary),
                    secondary,
                    post_filter: None,
                })
            }
            PartKind::Property { key, value, kind } => {
                let field = property_target(*kind, key);
                let query = match kind {
                    PropertyKind::Text => {
                        let terms = self.tokenizer.tokenize_with_positions_ordered(value);
                        if terms.is_empty() {
                            return None;
                        }
                        PostingsQuery::phrase(field, terms).simplify()
                    }
                    PropertyKind::Keyword | PropertyKind::Date => {
                        PostingsQuery::term(field, self.tokenizer.keyword(value))
                    }
                };
                Some(CompiledPart {
                    primary: Some(query.clone()),
                    secondary: Some(query),
                    post_filter: None,
                })
            }
            PartKind::Wildcard { pattern } => {
                let pattern = pattern.to_lowercase();
                if pattern.chars().all(|c| c == '*' || c == '?') {
                    return None;
                }
                Some(CompiledPart {
                    primary: Some(PostingsQuery::any([
                        PostingsQuery::wildcard(TEXT, pattern.as_str()),
                        PostingsQuery::wildcard(HOT_TEXT, pattern.as_str()).with_boost(HOT_BOOST),
                        PostingsQuery::wildcard(PROPERTY_TEXT, pattern.as_str())
                            .with_boost(HOT_BOOST),
                    ])),
                    secondary: Some(
                        PostingsQuery::wildcard(PROPERTY_TEXT, pattern.as_str())
                            .with_boost(HOT_BOOST),
                    ),
                    post_filter: None,
                })
            }
            PartKind::DateRange { key, start, end } => {
                let lower = start.as_ref().map(format_date);
                let upper = end.as_ref().map(format_date);
                // Stored dates have whole-second precision.
                let post_filter = Some(PostFilter::DateRange {
                    key: key.clone(),
                    start: start.map(|s| s.trunc_subsecs(0)),
                    end: end.map(|e| e.trunc_subsecs(0)),
                });
                Some(match key {
                    None => CompiledPart {
                        primary: Some(PostingsQuery::range(TIMESTAMP, lower, upper)),
                        secondary: None,
                        post_filter,
                    },
                    Some(key) => {
                        let query = PostingsQuery::range(
                            property_target(PropertyKind::Date, key),
                            lower,
                            upper,
                        );
                        CompiledPart {
                            primary: Some(query.clone()),
                            secondary: Some(query),
                            post_filter,
                        }
                    }
                })
            }
            PartKind::Or(alternatives) => {
                let children: Vec<CompiledPart> = alternatives
                    .iter()
                    .filter_map(|alt| self.compile_kind(alt))
                    .collect();
                if children.is_empty() {
                    return None;
                }
                let post_filter = if children.iter().all(|c| c.post_filter.is_some()) {
                    Some(PostFilter::Any(
                        children.iter().filter_map(|c| c.post_filter.clone()).collect(),
                    ))
                } else {
                    None
                };
                let (primary, secondary): (Vec<_>, Vec<_>) = children
                    .into_iter()
                    .map(|c| (c.primary, c.secondary))
                    .unzip();
                Some(CompiledPart {
                    primary: union(primary.into_iter().flatten().collect()),
                    secondary: union(secondary.into_iter().flatten().collect()),
                    post_filter,
                })
            }
        }
    }

    fn collect_scoring_terms(&self, kind: &PartKind, out: &mut Vec<ScoringTerm>) {
        match kind {
            PartKind::Text {
                text,
                search_full_text,
                search_text_properties,
            } => {
                for term in self.tokenizer.tokenize(text) {
                    if *search_full_text {
                        out.push(ScoringTerm::new(TEXT, term.clone(), 1.0));
                        out.push(ScoringTerm::new(HOT_TEXT, term.clone(), HOT_BOOST));
                    }
                    if *search_text_properties {
                        out.push(ScoringTerm::new(PROPERTY_TEXT, term, HOT_BOOST));
                    }
                }
            }
            PartKind::Property { key, value, kind } => {
                let field = property_target(*kind, key);
                match kind {
                    PropertyKind::Text => {
                        for term in self.tokenizer.tokenize(value) {
                            out.push(ScoringTerm::new(&field, term, 1.0));
                        }
                    }
                    PropertyKind::Keyword | PropertyKind::Date => {
                        out.push(ScoringTerm::new(&field, self.tokenizer.keyword(value), 1.0))
                    }
                }
            }
            PartKind::Or(alternatives) => {
                for alt in alternatives {
                    self.collect_scoring_terms(alt, out);
                }
            }
            PartKind::Wildcard { .. } | PartKind::DateRange { .. } => {}
        }
    }
}

/// Field a property query targets; `*` means any searched property of the kind
fn property_target(kind: PropertyKind, key: &str) -> String {
    if key == "*" {
        fields::wildcard_field(kind).to_string()
    } else {
        fields::property_field(kind, key)
    }
}

/// OR of the given queries; `None` when there are none
fn union(mut queries: Vec<PostingsQuery>) -> Option<PostingsQuery> {
    match queries.len() {
        0 => None,
        1 => queries.pop(),
        _ => Some(PostingsQuery::any(queries)),
    }
}

fn restriction(query: &Query) -> Option<PostingsQuery> {
    let mut clauses = Vec::new();
    if !query.mime_types.is_empty() {
        clauses.push(Clause {
            occur: Occur::Must,
            query: PostingsQuery::any(
                query
                    .mime_types
                    .iter()
                    .map(|m| PostingsQuery::term(MIME_TYPE, m.as_str())),
            ),
        });
    }
    if !query.hit_types.is_empty() {
        clauses.push(Clause {
            occur: Occur::Must,
            query: PostingsQuery::any(
                query
                    .hit_types
                    .iter()
                    .map(|t| PostingsQuery::term(TYPE, t.as_str())),
            ),
        });
    }
    if clauses.is_empty() {
        None
    } else {
        Some(PostingsQuery::Boolean(clauses))
    }
}
