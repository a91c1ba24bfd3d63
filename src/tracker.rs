//! Export-status bookkeeping shared by the stages of the notes export pipeline.
//!
//! The extractor only talks to the [`Tracker`] trait. [`JsonTracker`] is the
//! file-backed implementation the binary uses: one JSON index per notebook under
//! `<root>/data/`, each note carrying a per-stage export timestamp.

use chrono::{DateTime, Utc};
use eyre::{Context, Result, eyre};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Stage name recorded once a note's inline images have been extracted.
pub const IMAGES_STAGE: &str = "images";

/// One exported note pending a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteDescriptor {
    pub filename: String,
    pub notebook: String,
    pub json_file: PathBuf,
    pub note_id: String,
}

pub trait Tracker {
    /// Root of the export tree (`raw/`, `html/`, `data/` live below it).
    fn root_directory(&self) -> &Path;

    /// Whether raw and html files are grouped in per-notebook subdirectories.
    fn uses_subdirs(&self) -> bool;

    /// Notes that have not completed `stage`, in processing order.
    fn notes_to_process(&self, stage: &str) -> Result<Vec<NoteDescriptor>>;

    /// Record that `note_id` from `json_file` completed `stage`. Re-marking is harmless.
    fn mark_note_exported(&mut self, json_file: &Path, note_id: &str, stage: &str) -> Result<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct NotebookIndex {
    notebook: String,
    #[serde(default)]
    notes: Vec<NoteEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct NoteEntry {
    id: String,
    filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    modified: Option<DateTime<Utc>>,
    #[serde(default)]
    exports: BTreeMap<String, DateTime<Utc>>,
}

impl NoteEntry {
    fn needs(&self, stage: &str) -> bool {
        match (self.exports.get(stage), self.modified) {
            (None, _) => true,
            (Some(done), Some(modified)) => modified > *done,
            (Some(_), None) => false,
        }
    }
}

pub struct JsonTracker {
    root: PathBuf,
    subdirs: Option<bool>,
}

impl JsonTracker {
    /// `subdirs` forces the layout; `None` detects it from `<root>/raw`.
    pub fn new(root: impl Into<PathBuf>, subdirs: Option<bool>) -> Self {
        Self {
            root: root.into(),
            subdirs,
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join("data")
    }

    fn index_files(&self) -> Result<Vec<PathBuf>> {
        let dir = self.data_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).wrap_err_with(|| format!("Failed to list: {}", dir.display()));
            }
        };
        let mut files: Vec<PathBuf> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        files.sort();
        Ok(files)
    }

    fn load(path: &Path) -> Result<NotebookIndex> {
        let content = fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read tracker file: {}", path.display()))?;
        serde_json::from_str(&content)
            .wrap_err_with(|| format!("Failed to parse tracker file: {}", path.display()))
    }

    fn store(path: &Path, index: &NotebookIndex) -> Result<()> {
        let dir = path
            .parent()
            .ok_or_else(|| eyre!("Tracker file has no parent: {}", path.display()))?;
        let mut tmp = NamedTempFile::new_in(dir).wrap_err("Failed to create temporary file")?;
        serde_json::to_writer_pretty(&mut tmp, index).wrap_err("Failed to serialize tracker")?;
        tmp.write_all(b"\n")?;
        tmp.persist(path)
            .wrap_err_with(|| format!("Failed to replace tracker file: {}", path.display()))?;
        Ok(())
    }
}

impl Tracker for JsonTracker {
    fn root_directory(&self) -> &Path {
        &self.root
    }

    fn uses_subdirs(&self) -> bool {
        if let Some(forced) = self.subdirs {
            return forced;
        }
        fs::read_dir(self.root.join("raw"))
            .map(|d| d.flatten().any(|e| e.path().is_dir()))
            .unwrap_or(false)
    }

    fn notes_to_process(&self, stage: &str) -> Result<Vec<NoteDescriptor>> {
        let mut pending = Vec::new();
        for json_file in self.index_files()? {
            let index = Self::load(&json_file)?;
            pending.extend(
                index
                    .notes
                    .iter()
                    .filter(|n| n.needs(stage))
                    .map(|n| NoteDescriptor {
                        filename: n.filename.clone(),
                        notebook: index.notebook.clone(),
                        json_file: json_file.clone(),
                        note_id: n.id.clone(),
                    }),
            );
        }
        Ok(pending)
    }

    fn mark_note_exported(&mut self, json_file: &Path, note_id: &str, stage: &str) -> Result<()> {
        let mut index = Self::load(json_file)?;
        let entry = index
            .notes
            .iter_mut()
            .find(|n| n.id == note_id)
            .ok_or_else(|| eyre!("Note {} not found in {}", note_id, json_file.display()))?;
        entry.exports.insert(stage.to_string(), Utc::now());
        Self::store(json_file, &index)
    }
}
