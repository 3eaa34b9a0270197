//! Annotation module
//!
//! Bookmarks, highlights and notes anchored to an opaque location within a
//! book, with SQLite persistence.

mod store;
mod types;

pub use store::{AnnotationQuery, AnnotationRepository};
pub use types::{
    Annotation, AnnotationContent, AnnotationPatch, AnnotationType, DEFAULT_HIGHLIGHT_COLOR,
};
