//! Term index primitive: one store of documents with postings, stored
//! fields, deletion by term, snapshot readers and a single writer.

pub mod document;
pub mod index;
pub mod query;
pub mod snapshot;
pub mod state;
pub mod writer;

pub use document::{Analysis, DocNo, Document, Field, StoredDocument};
pub use index::TermIndex;
pub use query::{Clause, Occur, PostingsQuery};
pub use snapshot::StoreSnapshot;
pub use state::Posting;
pub use writer::StoreWriter;
