use tracing::debug;

use super::DualIndex;
use crate::error::Result;
use crate::models::{Hit, HitFilter, HitSink, Query, QueryResponse, UriFilter};
use crate::query::{MatchPlanner, QueryCompiler, ResultAssembler};

impl DualIndex {
    /// Run a query, streaming hits into `sink`
    ///
    /// `subset` limits the search to the given URIs. `uri_filter` is checked
    /// before a candidate is materialized, `hit_filter` after. Returns the
    /// number of primary documents matching the query, which can exceed the
    /// number of hits delivered.
    pub fn query(
        &self,
        query: &Query,
        sink: &mut dyn HitSink,
        subset: Option<&[String]>,
        uri_filter: Option<UriFilter<'_>>,
        hit_filter: Option<HitFilter<'_>>,
    ) -> Result<usize> {
        let compiled = QueryCompiler::new(self.tokenizer()).compile(query);
        if compiled.is_empty() {
            debug!("query has no required parts");
            return Ok(0);
        }

        let primary = self.primary().open_reader();
        let secondary = self.secondary().open_reader();

        let planner = MatchPlanner::new(&primary, &secondary);
        let whitelist = planner.whitelist(&compiled, subset)?;
        let matches = planner.required_matches(&compiled, whitelist.as_ref())?;
        let total = matches.count() as usize;
        if total == 0 {
            return Ok(0);
        }

        let assembler = ResultAssembler::new(
            &primary,
            &secondary,
            self.settings().short_circuit_factor,
            &self.settings().source_name,
        );
        let emitted = assembler.assemble(
            &matches,
            &compiled,
            query.max_hits,
            uri_filter,
            hit_filter,
            sink,
        )?;
        debug!(total, emitted, "query complete");
        Ok(total)
    }

    /// Collect the hits of a query
    pub fn search(&self, query: &Query) -> Result<QueryResponse> {
        let mut hits: Vec<Hit> = Vec::new();
        let total_matches = self.query(query, &mut hits, None, None, None)?;
        Ok(QueryResponse {
            hits,
            total_matches,
        })
    }
}
