//! Content store boundary and its file-backed implementation.
//!
//! The workflow only ever talks to [`ContentStore`]. `FileStore` keeps one
//! JSON document per class under `records/`, with a draft stage that `save`
//! writes and a live stage that `publish` copies the draft into.
use crate::schema::{ClassSchema, Record, RecordId};
use anyhow::Result;

mod class_file;

pub use class_file::FileStore;

/// Operations the workflow needs from the system holding the records.
pub trait ContentStore {
    /// Field registry for a class, if the class exists.
    fn schema(&self, class: &str) -> Option<&ClassSchema>;

    /// Identifiers of every record currently in `class`, ascending.
    fn list_identifiers(&self, class: &str) -> Result<Vec<RecordId>>;

    /// Load the draft stage of a record, `None` when it does not exist.
    fn load(&self, class: &str, id: RecordId) -> Result<Option<Record>>;

    /// Persist the record's fields to its draft stage.
    fn save(&mut self, record: &Record) -> Result<()>;

    /// Whether a live (published) version of the record exists.
    fn is_published(&self, record: &Record) -> Result<bool>;

    /// Whether the draft differs from the live version.
    ///
    /// `None` means the store cannot tell, which callers treat as clean.
    fn has_unsaved_draft_changes(&self, record: &Record) -> Result<Option<bool>>;

    /// Copy the draft stage to live.
    fn publish(&mut self, record: &Record) -> Result<()>;
}
