//! Note model and sync delta types

use std::fmt;
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Update sequence number assigned by the remote service.
///
/// Strictly increases with every remote edit; the local index uses it to
/// order and deduplicate deltas.
pub type Usn = i64;

/// Remote identifier of a note, assigned by the note service
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(String);

impl NoteId {
    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NoteId {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            Err(crate::error::Error::InvalidInput(
                "note ID must not be empty".to_string(),
            ))
        } else {
            Ok(Self(trimmed.to_string()))
        }
    }
}

impl From<&str> for NoteId {
    fn from(value: &str) -> Self {
        Self(value.trim().to_string())
    }
}

/// A synchronized note
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Remote identifier
    pub id: NoteId,
    /// Note title
    pub title: String,
    /// Plain text body, markup already stripped
    pub body: String,
    /// Tag names, lowercased and sorted
    pub tags: Vec<String>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last-modified timestamp (Unix ms)
    pub updated_at: i64,
    /// Update sequence number of the edit that produced this state
    pub usn: Usn,
}

impl Note {
    /// Normalize tags in place: lowercase, trim, dedupe, sort.
    pub fn normalize_tags(&mut self) {
        let mut tags: Vec<String> = self
            .tags
            .iter()
            .map(|tag| tag.trim().to_lowercase())
            .filter(|tag| !tag.is_empty())
            .collect();
        tags.sort();
        tags.dedup();
        self.tags = tags;
    }

    /// Whether the note carries the given tag (case-insensitive).
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        let needle = tag.trim().to_lowercase();
        self.tags.iter().any(|candidate| candidate == &needle)
    }
}

/// A single sync delta: a creation/update or a deletion of a note
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NoteChange {
    /// The note was created or edited remotely
    Upsert {
        /// Full note state at this USN
        note: Note,
    },
    /// The note was deleted remotely
    Delete {
        /// Identifier of the deleted note
        id: NoteId,
        /// USN of the deletion
        usn: Usn,
    },
}

impl NoteChange {
    /// Identifier of the affected note
    #[must_use]
    pub fn id(&self) -> &NoteId {
        match self {
            Self::Upsert { note } => &note.id,
            Self::Delete { id, .. } => id,
        }
    }

    /// USN carried by this change
    #[must_use]
    pub fn usn(&self) -> Usn {
        match self {
            Self::Upsert { note } => note.usn,
            Self::Delete { usn, .. } => *usn,
        }
    }
}

/// Reduce the service's XML-ish note markup to plain text.
///
/// Drops the XML declaration and doctype, turns `<br/>` and `<div>`
/// boundaries into newlines, strips remaining tags, and trims the result.
#[must_use]
pub fn strip_markup(content: &str) -> String {
    let declaration = Regex::new(r"<\?xml[^?]*\?>").expect("Invalid regex");
    let doctype = Regex::new(r"<!DOCTYPE[^>]*>").expect("Invalid regex");
    let line_breaks = Regex::new(r"<br\s*/?>|</?div>").expect("Invalid regex");
    let tags = Regex::new(r"<[^>]+>").expect("Invalid regex");

    let content = declaration.replace_all(content, "");
    let content = doctype.replace_all(&content, "");
    let content = line_breaks.replace_all(&content, "\n");
    let content = tags.replace_all(&content, "");
    content.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_note() -> Note {
        Note {
            id: "n-1".into(),
            title: "Sample".to_string(),
            body: "Body text".to_string(),
            tags: vec!["Work".to_string(), " work ".to_string(), "Home".to_string()],
            created_at: 1_000,
            updated_at: 2_000,
            usn: 5,
        }
    }

    #[test]
    fn note_id_rejects_empty() {
        assert!("  ".parse::<NoteId>().is_err());
        assert_eq!("abc".parse::<NoteId>().unwrap().as_str(), "abc");
    }

    #[test]
    fn normalize_tags_lowercases_and_dedupes() {
        let mut note = sample_note();
        note.normalize_tags();
        assert_eq!(note.tags, vec!["home".to_string(), "work".to_string()]);
    }

    #[test]
    fn has_tag_is_case_insensitive() {
        let mut note = sample_note();
        note.normalize_tags();
        assert!(note.has_tag("WORK"));
        assert!(!note.has_tag("travel"));
    }

    #[test]
    fn change_accessors_cover_both_variants() {
        let upsert = NoteChange::Upsert {
            note: sample_note(),
        };
        assert_eq!(upsert.id().as_str(), "n-1");
        assert_eq!(upsert.usn(), 5);

        let delete = NoteChange::Delete {
            id: "n-2".into(),
            usn: 9,
        };
        assert_eq!(delete.id().as_str(), "n-2");
        assert_eq!(delete.usn(), 9);
    }

    #[test]
    fn strip_markup_removes_declaration_and_tags() {
        let raw = "<?xml version=\"1.0\"?><!DOCTYPE note><note><div>First line</div><div>Second <b>bold</b> line</div></note>";
        assert_eq!(strip_markup(raw), "First line\n\nSecond bold line");
    }

    #[test]
    fn strip_markup_converts_breaks_to_newlines() {
        assert_eq!(strip_markup("one<br/>two<br>three"), "one\ntwo\nthree");
    }

    #[test]
    fn strip_markup_keeps_plain_text() {
        assert_eq!(strip_markup("  plain text  "), "plain text");
    }
}
