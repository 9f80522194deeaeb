//! Combines compiled query parts across the two stores
//!
//! Each required part is evaluated in both stores. Parts are then
//! intersected cheapest first, joining each one across stores so a URI
//! matched only through its mutable properties still counts.

use tracing::debug;

use super::bitset::StoreBitset;
use super::compiler::{CompiledPart, CompiledQuery};
use crate::error::Result;
use crate::store::{PostingsQuery, StoreSnapshot};

/// Documents a query is allowed to return, in both stores
pub struct Whitelist<'a> {
    pub primary: StoreBitset<'a>,
    pub secondary: StoreBitset<'a>,
}

/// A required part evaluated in both stores
struct PartMatches<'a> {
    primary: StoreBitset<'a>,
    secondary: StoreBitset<'a>,
}

impl PartMatches<'_> {
    fn upper_bound(&self) -> u64 {
        self.primary.count() + self.secondary.count()
    }
}

pub struct MatchPlanner<'a> {
    primary: &'a StoreSnapshot,
    secondary: &'a StoreSnapshot,
}

impl<'a> MatchPlanner<'a> {
    pub fn new(primary: &'a StoreSnapshot, secondary: &'a StoreSnapshot) -> Self {
        Self { primary, secondary }
    }

    /// Build the whitelist from the search subset, the type restriction and
    /// the prohibited parts. `None` means everything is allowed.
    pub fn whitelist(
        &self,
        compiled: &CompiledQuery,
        subset: Option<&[String]>,
    ) -> Result<Option<Whitelist<'a>>> {
        let mut whitelist: Option<Whitelist<'a>> = None;

        if let Some(uris) = subset {
            let mut primary = StoreBitset::new(self.primary);
            let mut secondary = StoreBitset::new(self.secondary);
            for uri in uris {
                primary.add_uri(uri.as_str())?;
                secondary.add_uri(uri.as_str())?;
            }
            primary.flush_uris()?;
            secondary.flush_uris()?;
            whitelist = Some(Whitelist { primary, secondary });
        }

        if let Some(restriction) = &compiled.restriction {
            let mut primary = StoreBitset::from_query(self.primary, restriction)?;
            if let Some(existing) = &whitelist {
                primary.and(&existing.primary);
            }
            let mut secondary = StoreBitset::new(self.secondary);
            primary.project_onto(&mut secondary)?;
            whitelist = Some(Whitelist { primary, secondary });
        }

        if compiled.has_prohibited() {
            let mut black_primary = self.bitset(self.primary, compiled.prohibited_primary.as_ref())?;
            let mut black_secondary =
                self.bitset(self.secondary, compiled.prohibited_secondary.as_ref())?;
            black_primary.join(&mut black_secondary)?;

            let mut allowed = whitelist.unwrap_or_else(|| Whitelist {
                primary: StoreBitset::all(self.primary),
                secondary: StoreBitset::all(self.secondary),
            });
            allowed.primary.and_not(&black_primary);
            allowed.secondary.and_not(&black_secondary);
            debug!(
                blacklisted = black_primary.count(),
                allowed = allowed.primary.count(),
                "applied prohibited parts"
            );
            whitelist = Some(allowed);
        }

        Ok(whitelist)
    }

    /// Primary documents matching every required part within the whitelist
    pub fn required_matches(
        &self,
        compiled: &CompiledQuery,
        whitelist: Option<&Whitelist<'a>>,
    ) -> Result<StoreBitset<'a>> {
        if compiled.is_empty() || compiled.required.iter().any(CompiledPart::matches_nothing) {
            return Ok(StoreBitset::new(self.primary));
        }

        if self.secondary.num_docs() == 0 {
            return self.single_store(compiled, whitelist);
        }
        self.two_store(compiled, whitelist)
    }

    /// All parts folded into one conjunctive query against the primary store
    fn single_store(
        &self,
        compiled: &CompiledQuery,
        whitelist: Option<&Whitelist<'a>>,
    ) -> Result<StoreBitset<'a>> {
        let mut queries = Vec::with_capacity(compiled.required.len());
        for part in &compiled.required {
            match &part.primary {
                Some(query) => queries.push(query.clone()),
                None => return Ok(StoreBitset::new(self.primary)),
            }
        }

        let combined = if queries.len() == 1 {
            queries.remove(0)
        } else {
            PostingsQuery::all(queries)
        };
        let mut matches = StoreBitset::from_query(self.primary, &combined)?;
        if let Some(whitelist) = whitelist {
            matches.and(&whitelist.primary);
        }
        debug!(matches = matches.count(), "single store match");
        Ok(matches)
    }

    fn two_store(
        &self,
        compiled: &CompiledQuery,
        whitelist: Option<&Whitelist<'a>>,
    ) -> Result<StoreBitset<'a>> {
        let mut parts = Vec::with_capacity(compiled.required.len());
        for part in &compiled.required {
            let mut primary = self.bitset(self.primary, part.primary.as_ref())?;
            let mut secondary = self.bitset(self.secondary, part.secondary.as_ref())?;
            if let Some(whitelist) = whitelist {
                primary.and(&whitelist.primary);
                secondary.and(&whitelist.secondary);
            }
            parts.push(PartMatches { primary, secondary });
        }

        let mut accumulated: Option<PartMatches<'a>> = None;
        while !parts.is_empty() {
            let cheapest = parts
                .iter()
                .enumerate()
                .min_by_key(|(_, p)| p.upper_bound())
                .map(|(i, _)| i)
                .unwrap_or(0);
            let mut part = parts.swap_remove(cheapest);

            if part.upper_bound() == 0 {
                debug!(remaining = parts.len(), "required part matched nothing");
                return Ok(StoreBitset::new(self.primary));
            }

            if parts.is_empty() {
                // Only the primary side is needed for the final result.
                part.secondary.project_onto(&mut part.primary)?;
                let mut result = part.primary;
                if let Some(acc) = &accumulated {
                    result.and(&acc.primary);
                }
                return Ok(result);
            }

            part.primary.join(&mut part.secondary)?;
            let acc = match accumulated.take() {
                Some(mut acc) => {
                    acc.primary.and(&part.primary);
                    acc.secondary.and(&part.secondary);
                    acc
                }
                None => part,
            };

            for remaining in parts.iter_mut() {
                remaining.primary.and(&acc.primary);
                remaining.secondary.and(&acc.secondary);
            }
            debug!(
                accumulated = acc.primary.count(),
                remaining = parts.len(),
                "joined required part"
            );
            accumulated = Some(acc);
        }

        Ok(accumulated
            .map(|acc| acc.primary)
            .unwrap_or_else(|| StoreBitset::new(self.primary)))
    }

    fn bitset(
        &self,
        snapshot: &'a StoreSnapshot,
        query: Option<&PostingsQuery>,
    ) -> Result<StoreBitset<'a>> {
        match query {
            Some(query) => StoreBitset::from_query(snapshot, query),
            None => Ok(StoreBitset::new(snapshot)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{IndexSettings, TokenizerConfig};
    use crate::schema::fields::URI;
    use crate::store::{Document, Field, TermIndex};
    use crate::tokenizer::Tokenizer;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn store(tmp: &TempDir, name: &str, docs: &[(&str, &str)]) -> TermIndex {
        let index = TermIndex::open(
            name,
            tmp.path().join(name),
            tmp.path().join("Locks"),
            &IndexSettings::default(),
            Arc::new(Tokenizer::new(&TokenizerConfig::default())),
        )
        .unwrap();
        let mut writer = index.open_writer().unwrap();
        for (uri, tag) in docs {
            let mut doc = Document::new();
            doc.push(Field::keyword(URI, *uri));
            doc.push(Field::unstored_keyword("tag", *tag));
            writer.add(&doc).unwrap();
        }
        writer.commit().unwrap();
        index
    }

    fn part(primary: Option<&str>, secondary: Option<&str>) -> CompiledPart {
        CompiledPart {
            primary: primary.map(|tag| PostingsQuery::term("tag", tag)),
            secondary: secondary.map(|tag| PostingsQuery::term("tag", tag)),
            post_filter: None,
        }
    }

    fn required(parts: Vec<CompiledPart>) -> CompiledQuery {
        CompiledQuery {
            required: parts,
            ..CompiledQuery::default()
        }
    }

    fn sorted<'s>(set: &StoreBitset<'s>) -> Vec<&'s str> {
        let mut uris: Vec<&str> = set.uris().collect();
        uris.sort();
        uris
    }

    #[test]
    fn test_part_matching_nothing_short_circuits() {
        let tmp = TempDir::new().unwrap();
        let primary = store(&tmp, "PrimaryIndex", &[("a", "p"), ("b", "p")]);
        let secondary = store(&tmp, "SecondaryIndex", &[("a", "s")]);
        let (p, s) = (primary.open_reader(), secondary.open_reader());
        let planner = MatchPlanner::new(&p, &s);

        let compiled = required(vec![part(Some("p"), Some("s")), part(Some("none"), Some("none"))]);
        let matches = planner.required_matches(&compiled, None).unwrap();
        assert!(matches.is_empty());

        assert!(planner
            .required_matches(&CompiledQuery::default(), None)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_last_part_counts_secondary_only_matches() {
        let tmp = TempDir::new().unwrap();
        let primary = store(
            &tmp,
            "PrimaryIndex",
            &[("a", "p"), ("b", "p"), ("c", "q"), ("d", "p")],
        );
        let secondary = store(&tmp, "SecondaryIndex", &[("c", "s"), ("b", "r")]);
        let (p, s) = (primary.open_reader(), secondary.open_reader());
        let planner = MatchPlanner::new(&p, &s);

        // The cheap part runs first; the wide one is left for last and only
        // matches `c` through the secondary store.
        let compiled = required(vec![part(Some("p"), Some("s")), part(Some("q"), None)]);
        let matches = planner.required_matches(&compiled, None).unwrap();
        assert_eq!(sorted(&matches), vec!["c"]);

        let compiled = required(vec![part(Some("p"), Some("s")), part(None, Some("r"))]);
        let matches = planner.required_matches(&compiled, None).unwrap();
        assert_eq!(sorted(&matches), vec!["b"]);
    }

    #[test]
    fn test_empty_secondary_uses_single_store_query() {
        let tmp = TempDir::new().unwrap();
        let primary = store(&tmp, "PrimaryIndex", &[("a", "p"), ("b", "q"), ("c", "p")]);
        let secondary = store(&tmp, "SecondaryIndex", &[]);
        let (p, s) = (primary.open_reader(), secondary.open_reader());
        let planner = MatchPlanner::new(&p, &s);

        let compiled = required(vec![part(Some("p"), Some("s"))]);
        assert_eq!(sorted(&planner.required_matches(&compiled, None).unwrap()), vec!["a", "c"]);

        let compiled = required(vec![part(Some("p"), None), part(None, Some("s"))]);
        assert!(planner.required_matches(&compiled, None).unwrap().is_empty());
    }

    #[test]
    fn test_prohibited_secondary_match_removes_primary_document() {
        let tmp = TempDir::new().unwrap();
        let primary = store(&tmp, "PrimaryIndex", &[("a", "p"), ("b", "p"), ("c", "p")]);
        let secondary = store(&tmp, "SecondaryIndex", &[("b", "hidden"), ("c", "shown")]);
        let (p, s) = (primary.open_reader(), secondary.open_reader());
        let planner = MatchPlanner::new(&p, &s);

        let compiled = CompiledQuery {
            prohibited_secondary: Some(PostingsQuery::term("tag", "hidden")),
            ..required(vec![part(Some("p"), None)])
        };
        let whitelist = planner.whitelist(&compiled, None).unwrap().unwrap();
        assert_eq!(sorted(&whitelist.primary), vec!["a", "c"]);
        assert_eq!(sorted(&whitelist.secondary), vec!["c"]);

        let matches = planner.required_matches(&compiled, Some(&whitelist)).unwrap();
        assert_eq!(sorted(&matches), vec!["a", "c"]);
    }

    #[test]
    fn test_subset_whitelist_limits_matches() {
        let tmp = TempDir::new().unwrap();
        let primary = store(&tmp, "PrimaryIndex", &[("a", "p"), ("b", "p"), ("c", "p")]);
        let secondary = store(&tmp, "SecondaryIndex", &[("b", "s")]);
        let (p, s) = (primary.open_reader(), secondary.open_reader());
        let planner = MatchPlanner::new(&p, &s);

        let compiled = required(vec![part(Some("p"), Some("s"))]);
        let subset = vec!["b".to_string(), "c".to_string(), "missing".to_string()];
        let whitelist = planner.whitelist(&compiled, Some(subset.as_slice())).unwrap();
        let matches = planner
            .required_matches(&compiled, whitelist.as_ref())
            .unwrap();
        assert_eq!(sorted(&matches), vec!["b", "c"]);
    }
}
