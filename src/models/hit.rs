use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::property::Property;

/// A single search result, reunified from both stores
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Hit {
    pub uri: String,
    pub parent_uri: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub hit_type: String,
    pub mime_type: Option<String>,
    pub score: f32,
    /// Name of the index that produced the hit
    pub source: String,
    pub properties: Vec<Property>,
}

impl Hit {
    pub fn property(&self, key: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.key == key)
    }

    /// All values stored under `key`
    pub fn property_values(&self, key: &str) -> Vec<&str> {
        self.properties
            .iter()
            .filter(|p| p.key == key)
            .filter_map(|p| p.value.as_deref())
            .collect()
    }
}

/// Consumer of hits streamed out of a query
pub trait HitSink {
    fn accept(&mut self, hit: Hit);
}

impl HitSink for Vec<Hit> {
    fn accept(&mut self, hit: Hit) {
        self.push(hit);
    }
}

/// Caller-supplied predicate on candidate URIs, checked before materialization
pub type UriFilter<'a> = &'a dyn Fn(&str) -> bool;

/// Caller-supplied predicate on fully assembled hits
pub type HitFilter<'a> = &'a dyn Fn(&Hit) -> bool;

/// Collected hits plus the total number of matching documents
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct QueryResponse {
    pub hits: Vec<Hit>,
    pub total_matches: usize,
}
