//! Annotation types
//!
//! Bookmarks, highlights and notes share an envelope (owner, book, location,
//! optional page, timestamps) and differ in their content.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::now;

/// Default highlight colour (yellow)
pub const DEFAULT_HIGHLIGHT_COLOR: &str = "#ffff00";

/// A bookmark, highlight or note anchored in a book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    /// Unique identifier (UUID)
    pub id: String,
    pub book_id: String,
    pub user_id: String,
    /// Opaque locator produced by the viewer
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(flatten)]
    pub content: AnnotationContent,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Kind-specific payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AnnotationContent {
    Bookmark {
        title: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    Highlight {
        text: String,
        color: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },
    Note {
        text: String,
    },
}

/// Types of annotations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationType {
    Bookmark,
    Highlight,
    Note,
}

impl AnnotationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnnotationType::Bookmark => "bookmark",
            AnnotationType::Highlight => "highlight",
            AnnotationType::Note => "note",
        }
    }

    /// Accepts both singular and plural forms
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "bookmark" | "bookmarks" => Some(AnnotationType::Bookmark),
            "highlight" | "highlights" => Some(AnnotationType::Highlight),
            "note" | "notes" => Some(AnnotationType::Note),
            _ => None,
        }
    }
}

impl AnnotationContent {
    pub fn kind(&self) -> AnnotationType {
        match self {
            AnnotationContent::Bookmark { .. } => AnnotationType::Bookmark,
            AnnotationContent::Highlight { .. } => AnnotationType::Highlight,
            AnnotationContent::Note { .. } => AnnotationType::Note,
        }
    }
}

impl Annotation {
    fn new(user_id: &str, book_id: &str, location: &str, page: Option<u32>, content: AnnotationContent) -> Self {
        let now = now();
        Self {
            id: Uuid::new_v4().to_string(),
            book_id: book_id.to_string(),
            user_id: user_id.to_string(),
            location: location.to_string(),
            page,
            content,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a new bookmark annotation
    pub fn new_bookmark(
        user_id: &str,
        book_id: &str,
        location: &str,
        page: Option<u32>,
        title: &str,
        description: Option<&str>,
    ) -> Self {
        Self::new(
            user_id,
            book_id,
            location,
            page,
            AnnotationContent::Bookmark {
                title: title.to_string(),
                description: description.map(str::to_string),
            },
        )
    }

    /// Create a new highlight annotation
    pub fn new_highlight(
        user_id: &str,
        book_id: &str,
        location: &str,
        page: Option<u32>,
        text: &str,
        color: Option<&str>,
    ) -> Self {
        Self::new(
            user_id,
            book_id,
            location,
            page,
            AnnotationContent::Highlight {
                text: text.to_string(),
                color: color.unwrap_or(DEFAULT_HIGHLIGHT_COLOR).to_string(),
                note: None,
            },
        )
    }

    /// Create a new note annotation
    pub fn new_note(user_id: &str, book_id: &str, location: &str, page: Option<u32>, text: &str) -> Self {
        Self::new(
            user_id,
            book_id,
            location,
            page,
            AnnotationContent::Note {
                text: text.to_string(),
            },
        )
    }

    pub fn annotation_type(&self) -> AnnotationType {
        self.content.kind()
    }
}

/// Edit to an existing annotation; fields must fit the annotation's kind
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub text: Option<String>,
    pub color: Option<String>,
    pub note: Option<String>,
}

impl AnnotationPatch {
    /// Apply the patch, bumping `updated_at`.
    ///
    /// Fails with the offending field name when a field does not exist on
    /// the annotation's kind.
    pub fn apply(self, annotation: &mut Annotation) -> std::result::Result<(), &'static str> {
        match &mut annotation.content {
            AnnotationContent::Bookmark { title, description } => {
                reject(&self.text, "text")?;
                reject(&self.color, "color")?;
                reject(&self.note, "note")?;
                if let Some(t) = self.title {
                    *title = t;
                }
                if self.description.is_some() {
                    *description = self.description;
                }
            }
            AnnotationContent::Highlight { text, color, note } => {
                reject(&self.title, "title")?;
                reject(&self.description, "description")?;
                if let Some(t) = self.text {
                    *text = t;
                }
                if let Some(c) = self.color {
                    *color = c;
                }
                if self.note.is_some() {
                    *note = self.note;
                }
            }
            AnnotationContent::Note { text } => {
                reject(&self.title, "title")?;
                reject(&self.description, "description")?;
                reject(&self.color, "color")?;
                reject(&self.note, "note")?;
                if let Some(t) = self.text {
                    *text = t;
                }
            }
        }
        annotation.updated_at = now().max(annotation.updated_at);
        Ok(())
    }
}

fn reject<T>(value: &Option<T>, field: &'static str) -> std::result::Result<(), &'static str> {
    match value {
        Some(_) => Err(field),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_highlight() {
        let highlight =
            Annotation::new_highlight("user-1", "book-123", "epubcfi(/6/4!/4/2/1:10)", Some(12), "call me", None);

        assert_eq!(highlight.annotation_type(), AnnotationType::Highlight);
        assert_eq!(highlight.book_id, "book-123");
        match highlight.content {
            AnnotationContent::Highlight { color, .. } => assert_eq!(color, DEFAULT_HIGHLIGHT_COLOR),
            other => panic!("unexpected content {:?}", other),
        }
    }

    #[test]
    fn test_serialization_is_flat() {
        let note = Annotation::new_note("user-1", "book-123", "loc", None, "This is my note");

        let json = serde_json::to_value(&note).unwrap();
        assert_eq!(json["type"], "note");
        assert_eq!(json["text"], "This is my note");
        assert_eq!(json["bookId"], "book-123");
        assert!(json.get("page").is_none());

        let parsed: Annotation = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, note);
    }

    #[test]
    fn test_patch_rejects_foreign_fields() {
        let mut bookmark = Annotation::new_bookmark("u", "b", "loc", None, "Chapter 3", None);
        let err = AnnotationPatch {
            color: Some("#ff0000".to_string()),
            ..Default::default()
        }
        .apply(&mut bookmark)
        .unwrap_err();
        assert_eq!(err, "color");

        AnnotationPatch {
            title: Some("Chapter 4".to_string()),
            ..Default::default()
        }
        .apply(&mut bookmark)
        .unwrap();
        assert!(matches!(
            bookmark.content,
            AnnotationContent::Bookmark { ref title, .. } if title == "Chapter 4"
        ));
    }

    #[test]
    fn test_type_parse() {
        assert_eq!(AnnotationType::parse("highlights"), Some(AnnotationType::Highlight));
        assert_eq!(AnnotationType::parse("Note"), Some(AnnotationType::Note));
        assert_eq!(AnnotationType::parse("underline"), None);
    }
}
