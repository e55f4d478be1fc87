//! Ingestion stages: routing, conversion, fan-in, cleaning and splitting

pub mod chunker;
pub mod cleaner;
pub mod joiner;
pub mod parser;
pub mod router;

pub use chunker::{merge_chunks, DocumentSplitter};
pub use cleaner::DocumentCleaner;
pub use joiner::DocumentJoiner;
pub use parser::{converter_for, Converter, ConverterComponent};
pub use router::{TypeRouter, UNCLASSIFIED_PORT};
