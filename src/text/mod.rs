//! Document text: extraction from source files and deterministic cleaning.

pub mod clean;
pub mod extract;

pub use clean::{clean_text, filter_unwanted_content, FilterOutcome, RemovedSection};
pub use extract::{DocumentExtractor, ExtractionError, FileExtractor, SourceKind};
