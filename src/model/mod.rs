//! Data model: configuration documents and label canonicalization.

mod document;
mod labels;
pub use document::*;
pub use labels::*;
