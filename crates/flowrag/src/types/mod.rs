//! Core types flowing through the pipelines

pub mod document;
pub mod response;

pub use document::{Document, MetaValue, Metadata, SourceRef};
pub use response::{AskResponse, IndexReport, SkippedFile};
