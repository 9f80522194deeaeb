pub mod config;
pub mod error;
pub mod index;
pub mod models;
pub mod query;
pub mod schema;
pub mod store;
pub mod testing;
pub mod tokenizer;

pub use config::{BusyRetryPolicy, IndexSettings, TokenizerConfig};
pub use error::{QuarryError, Result};
pub use index::{ContentFilter, DualIndex, FilterOutcome, FlushObserver, PlainTextFilter};
pub use models::*;
pub use tokenizer::Tokenizer;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
