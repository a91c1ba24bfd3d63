//! # notes-image-extract
//!
//! Pulls inline base64 images out of archived note HTML exports.
//!
//! ## What it does
//!
//! Note exports are stored as raw HTML snapshots whose `<img>` tags often carry the
//! whole picture inline as a `data:image/...;base64,...` URI. For every note the
//! export tracker reports as pending, this tool decodes those images into standalone
//! files named `{note}-attachment-NNN.{ext}` and writes a processed copy of the HTML
//! whose `src` attributes point at `./attachments/...` instead.
//!
//! Raw files are never modified. Re-running overwrites earlier output in place.
//!
//! ## Layout
//!
//! ```text
//! <root>/raw/<notebook>/<note>.html                       read
//! <root>/html/<notebook>/<note>.html                      written
//! <root>/html/<notebook>/attachments/<note>-attachment-001.png
//! ```
//!
//! Without per-notebook subdirectories the `<notebook>` level is dropped.
//!
//! ## Images-only mode
//!
//! With `NOTES_EXPORT_IMAGES_ONLY=true` images land directly in `<root>` and no
//! processed HTML is produced.
pub mod extractor;
pub mod tracker;
pub mod utils;

pub use extractor::{NoteOutcome, NotePaths, RunSummary, process_pending_notes};
pub use tracker::{IMAGES_STAGE, JsonTracker, NoteDescriptor, Tracker};
pub use utils::ExtractConfig;
