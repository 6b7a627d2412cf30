//! quill-core - Core library for Quill
//!
//! This crate contains the shared models, credential store, sync client,
//! local index, and query engine used by the Quill CLI.

pub mod config;
pub mod credentials;
pub mod error;
pub mod index;
pub mod models;
pub mod query;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{Note, NoteChange, NoteId, Usn};
