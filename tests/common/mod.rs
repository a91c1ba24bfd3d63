//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use eyre::{Result, eyre};
use notes_image_extract::{NoteDescriptor, Tracker};
use std::fs;
use std::path::{Path, PathBuf};

/// One transparent 1x1 PNG, base64-encoded.
pub const PNG_1X1: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

/// The smallest valid GIF.
pub const GIF_1X1: &str = "R0lGODlhAQABAAAAACH5BAEKAAEALAAAAAABAAEAAAICTAEAOw==";

/// In-memory tracker that hands out a fixed list of notes and records marks.
pub struct FakeTracker {
    pub root: PathBuf,
    pub subdirs: bool,
    pub pending: Vec<NoteDescriptor>,
    pub marked: Vec<(PathBuf, String, String)>,
    pub fail_listing: bool,
    pub fail_marking: bool,
}

impl FakeTracker {
    pub fn new(root: &Path, subdirs: bool, pending: Vec<NoteDescriptor>) -> Self {
        Self {
            root: root.to_path_buf(),
            subdirs,
            pending,
            marked: Vec::new(),
            fail_listing: false,
            fail_marking: false,
        }
    }

    pub fn marked_ids(&self) -> Vec<&str> {
        self.marked.iter().map(|(_, id, _)| id.as_str()).collect()
    }
}

impl Tracker for FakeTracker {
    fn root_directory(&self) -> &Path {
        &self.root
    }

    fn uses_subdirs(&self) -> bool {
        self.subdirs
    }

    fn notes_to_process(&self, _stage: &str) -> Result<Vec<NoteDescriptor>> {
        if self.fail_listing {
            return Err(eyre!("tracker state unavailable"));
        }
        Ok(self.pending.clone())
    }

    fn mark_note_exported(&mut self, json_file: &Path, note_id: &str, stage: &str) -> Result<()> {
        if self.fail_marking {
            return Err(eyre!("tracker state is read-only"));
        }
        self.marked
            .push((json_file.to_path_buf(), note_id.to_string(), stage.to_string()));
        Ok(())
    }
}

pub fn note(filename: &str, notebook: &str, id: &str) -> NoteDescriptor {
    NoteDescriptor {
        filename: filename.to_string(),
        notebook: notebook.to_string(),
        json_file: PathBuf::from(format!("data/{}.json", notebook)),
        note_id: id.to_string(),
    }
}

/// Write `<root>/raw[/<notebook>]/<filename>.html`.
pub fn write_raw(root: &Path, notebook: Option<&str>, filename: &str, body: &[u8]) -> PathBuf {
    let mut dir = root.join("raw");
    if let Some(nb) = notebook {
        dir = dir.join(nb);
    }
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join(format!("{}.html", filename));
    fs::write(&path, body).unwrap();
    path
}

pub fn img(format: &str, payload: &str) -> String {
    format!(r#"<img src="data:image/{};base64,{}">"#, format, payload)
}

pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .map(|d| {
            d.flatten()
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}
