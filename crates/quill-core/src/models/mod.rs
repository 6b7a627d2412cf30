//! Data models shared across Quill components

mod credential;
mod note;

pub use credential::Credential;
pub use note::{strip_markup, Note, NoteChange, NoteId, Usn};
