use serde::{Deserialize, Serialize};

use super::indexable::Indexable;

/// Outcome of one indexable within a flush
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Receipt {
    Added {
        uri: String,
        filter_name: Option<String>,
        filter_version: Option<u32>,
        property_changes_only: bool,
    },
    Removed {
        uri: String,
    },
    /// Follow-up work generated while indexing `parent`
    ChildIndexables {
        parent: String,
        children: Vec<Indexable>,
    },
}

impl Receipt {
    pub fn uri(&self) -> &str {
        match self {
            Receipt::Added { uri, .. } | Receipt::Removed { uri } => uri,
            Receipt::ChildIndexables { parent, .. } => parent,
        }
    }
}
