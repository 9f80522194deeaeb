pub mod hit;
pub mod indexable;
pub mod property;
pub mod query;
pub mod receipt;
pub mod request;

pub use hit::{Hit, HitFilter, HitSink, QueryResponse, UriFilter};
pub use indexable::{Indexable, IndexableKind};
pub use property::{format_date, parse_date, Property, PropertyKind};
pub use query::{Logic, PartKind, Query, QueryPart};
pub use receipt::Receipt;
pub use request::IndexerRequest;
