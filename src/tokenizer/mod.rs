//! Text analysis shared by the document builder and the query compiler

mod analyzer;

pub use analyzer::Tokenizer;
