use crate::tracker::{IMAGES_STAGE, JsonTracker, NoteDescriptor, Tracker};
use crate::utils::{self, DataUri, ExtractConfig};
use eyre::{Context, Result, eyre};
use log::{debug, error, info, warn};
use scraper::{Html, Node, Selector};
use std::fs;
use std::path::{Path, PathBuf};

/// Counts gathered over one run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub notes_total: usize,
    pub notes_completed: usize,
    pub notes_skipped: usize,
    pub notes_failed: usize,
    pub images_extracted: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteOutcome {
    Completed { images: usize },
    Skipped,
}

/// Where one note is read from and written to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotePaths {
    pub raw_file: PathBuf,
    /// `None` in images-only mode: no processed HTML is written.
    pub html_file: Option<PathBuf>,
    pub attachments_dir: PathBuf,
}

impl NotePaths {
    pub fn resolve(
        root: &Path,
        note: &NoteDescriptor,
        uses_subdirs: bool,
        images_only: bool,
    ) -> Self {
        let file_name = format!("{}.html", note.filename);
        let (raw_dir, html_dir) = if uses_subdirs {
            (
                root.join("raw").join(&note.notebook),
                root.join("html").join(&note.notebook),
            )
        } else {
            (root.join("raw"), root.join("html"))
        };

        if images_only {
            Self {
                raw_file: raw_dir.join(&file_name),
                html_file: None,
                attachments_dir: root.to_path_buf(),
            }
        } else {
            Self {
                raw_file: raw_dir.join(&file_name),
                attachments_dir: html_dir.join("attachments"),
                html_file: Some(html_dir.join(&file_name)),
            }
        }
    }
}

/// Build the file-backed tracker from `config` and run one extraction pass.
pub fn execute(config: ExtractConfig) -> Result<RunSummary> {
    let mut tracker = JsonTracker::new(&config.root, config.subdirs);
    process_pending_notes(&mut tracker, &config)
}

/// Extract inline images for every note the tracker reports as pending.
///
/// Per-note and per-image failures are logged and skipped. Only a failure to
/// enumerate notes (or to create the images-only output directory) is returned.
pub fn process_pending_notes(
    tracker: &mut dyn Tracker,
    config: &ExtractConfig,
) -> Result<RunSummary> {
    if config.images_only {
        info!("Running in IMAGES-ONLY mode - extracting images to flat directory");
    }

    let notes = tracker
        .notes_to_process(IMAGES_STAGE)
        .wrap_err("Failed to list notes pending image extraction")?;

    let mut summary = RunSummary {
        notes_total: notes.len(),
        ..RunSummary::default()
    };

    if notes.is_empty() {
        info!("No notes need image extraction - all up to date!");
        return Ok(summary);
    }

    info!("Processing {} notes for image extraction...", notes.len());

    let root = tracker.root_directory().to_path_buf();
    let selector = Selector::parse("img").map_err(|e| eyre!("Invalid selector: {:?}", e))?;
    if config.images_only {
        fs::create_dir_all(&root)
            .wrap_err_with(|| format!("Failed to create output directory: {}", root.display()))?;
    }

    for note in &notes {
        info!("Extracting images from: {} from {}", note.filename, note.notebook);

        let paths = NotePaths::resolve(&root, note, tracker.uses_subdirs(), config.images_only);
        let result = extract_note(
            &root,
            note,
            &paths,
            &selector,
            config.images_only,
            &mut summary.images_extracted,
        )
        .and_then(|outcome| {
            if let NoteOutcome::Completed { .. } = outcome {
                tracker.mark_note_exported(&note.json_file, &note.note_id, IMAGES_STAGE)?;
            }
            Ok(outcome)
        });

        match result {
            Ok(NoteOutcome::Completed { .. }) => summary.notes_completed += 1,
            Ok(NoteOutcome::Skipped) => summary.notes_skipped += 1,
            Err(e) => {
                summary.notes_failed += 1;
                error!("processing {}: {:#}", note.filename, e);
            }
        }
    }

    if config.images_only {
        println!();
        println!("=== IMAGES-ONLY MODE COMPLETE ===");
        println!("Total images extracted: {}", summary.images_extracted);
        println!("Output directory: {}", root.display());
    }

    Ok(summary)
}

/// Process a single note. Image files written before an error stay on disk and
/// are already counted in `images_written`.
pub fn extract_note(
    root: &Path,
    note: &NoteDescriptor,
    paths: &NotePaths,
    selector: &Selector,
    images_only: bool,
    images_written: &mut usize,
) -> Result<NoteOutcome> {
    if !paths.raw_file.exists() {
        warn!("Raw file not found: {}", paths.raw_file.display());
        return Ok(NoteOutcome::Skipped);
    }

    let text = match utils::read_text_with_fallback(&paths.raw_file) {
        Ok((text, encoding)) => {
            debug!("Decoded {} as {}", paths.raw_file.display(), encoding.name());
            text
        }
        Err(e) => {
            error!(
                "Could not read {} with any encoding: {:#}",
                paths.raw_file.display(),
                e
            );
            return Ok(NoteOutcome::Skipped);
        }
    };

    let mut document = Html::parse_document(&text);

    let data_images: Vec<_> = document
        .select(selector)
        .filter_map(|img| {
            img.value()
                .attr("src")
                .filter(|src| src.starts_with("data:image"))
                .map(|src| (img.id(), src.to_string()))
        })
        .collect();

    let mut counter = 0usize;
    let mut written = 0usize;

    for (node_id, src) in data_images {
        counter += 1;

        if !paths.attachments_dir.exists() {
            fs::create_dir_all(&paths.attachments_dir).wrap_err_with(|| {
                format!("Failed to create: {}", paths.attachments_dir.display())
            })?;
        }

        let name = match write_image(&src, &note.filename, counter, &paths.attachments_dir) {
            Ok(name) => name,
            Err(e) => {
                error!(
                    "extracting image {} from {}: {:#}",
                    counter,
                    paths.raw_file.display(),
                    e
                );
                continue;
            }
        };

        let image_path = paths.attachments_dir.join(&name);
        if images_only {
            info!("Image written: {}", name);
        } else {
            let shown = image_path.strip_prefix(root).unwrap_or(&image_path);
            info!("Image written: {}", shown.display());

            let new_src = format!("./attachments/{}", name);
            if let Some(mut node) = document.tree.get_mut(node_id)
                && let Node::Element(element) = node.value()
            {
                for (attr, value) in element.attrs.iter_mut() {
                    if &*attr.local == "src" {
                        *value = new_src.as_str().into();
                    }
                }
            }
        }
        written += 1;
        *images_written += 1;
    }

    if let Some(html_file) = &paths.html_file {
        if let Some(parent) = html_file.parent() {
            fs::create_dir_all(parent)
                .wrap_err_with(|| format!("Failed to create: {}", parent.display()))?;
        }
        fs::write(html_file, document.html())
            .wrap_err_with(|| format!("Failed to write: {}", html_file.display()))?;

        if written > 0 {
            info!("Processed HTML with extracted images saved: {}", html_file.display());
        } else {
            info!("Processed HTML saved (no images found): {}", html_file.display());
        }
    }

    Ok(NoteOutcome::Completed { images: written })
}

/// Decode one `data:image` source and write it under `dir`. Returns the file name.
fn write_image(src: &str, filename: &str, counter: usize, dir: &Path) -> Result<String> {
    let uri = DataUri::parse(src)?;
    let bytes = uri.decode()?;
    let name = utils::attachment_name(filename, counter, uri.format);

    if let Some(sniffed) = utils::sniff_mismatch(uri.format, &bytes) {
        debug!("{} is declared {} but looks like {}", name, uri.format, sniffed);
    }

    let path = dir.join(&name);
    fs::write(&path, &bytes).wrap_err_with(|| format!("Failed to write: {}", path.display()))?;
    Ok(name)
}
