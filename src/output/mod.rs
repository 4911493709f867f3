use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::resolver::VideoIdentifier;
use crate::transcribe::TranscriptDocument;

pub mod formatters;

pub use formatters::{group_paragraphs, render_json, render_markdown, Paragraph};

const MARKDOWN_EXTENSION: &str = "md";
const RAW_SUFFIX: &str = "_full.json";

/// Canonical Markdown artifact path for an identifier
pub fn markdown_path(output_dir: &Path, id: &VideoIdentifier) -> PathBuf {
    output_dir.join(format!("{}.{}", id, MARKDOWN_EXTENSION))
}

/// Raw structured-data artifact path for an identifier
pub fn raw_path(output_dir: &Path, id: &VideoIdentifier) -> PathBuf {
    output_dir.join(format!("{}{}", id, RAW_SUFFIX))
}

/// Reconstruct the identifier from a Markdown artifact's file name
pub fn identifier_from_path(path: &Path) -> Option<VideoIdentifier> {
    if path.extension()?.to_str()? != MARKDOWN_EXTENSION {
        return None;
    }
    VideoIdentifier::parse(path.file_stem()?.to_str()?)
}

/// Atomic write: write to temp file in same dir, then rename
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("no parent dir for {}", path.display()))?;
    fs_err::create_dir_all(parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("cannot create temp file in {}", parent.display()))?;
    tmp.write_all(data)?;
    tmp.flush()?;
    tmp.persist(path)
        .with_context(|| format!("cannot move temp file to {}", path.display()))?;
    Ok(())
}

/// Renders documents into identifier-keyed artifacts under one directory
#[derive(Debug, Clone)]
pub struct DocumentWriter {
    output_dir: PathBuf,
    write_raw: bool,
    paragraph_minutes: u32,
    timestamps: bool,
}

impl DocumentWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            write_raw: true,
            paragraph_minutes: 5,
            timestamps: true,
        }
    }

    pub fn with_raw_json(mut self, write_raw: bool) -> Self {
        self.write_raw = write_raw;
        self
    }

    pub fn with_paragraph_minutes(mut self, minutes: u32) -> Self {
        self.paragraph_minutes = minutes;
        self
    }

    pub fn with_timestamps(mut self, timestamps: bool) -> Self {
        self.timestamps = timestamps;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn path_for(&self, id: &VideoIdentifier) -> PathBuf {
        markdown_path(&self.output_dir, id)
    }

    /// Whether the canonical artifact for `id` is already on disk
    pub fn exists(&self, id: &VideoIdentifier) -> bool {
        self.path_for(id).is_file()
    }

    /// Write the raw JSON (when enabled) and then the Markdown document.
    ///
    /// The Markdown file is the idempotency signal, so it is only renamed into place after
    /// everything else succeeded.
    pub fn write(&self, doc: &TranscriptDocument) -> Result<PathBuf> {
        let markdown = render_markdown(doc, self.paragraph_minutes, self.timestamps);

        if self.write_raw {
            let json = render_json(doc).context("cannot serialize transcript document")?;
            let path = raw_path(&self.output_dir, &doc.identifier);
            write_atomic(&path, json.as_bytes())?;
            tracing::debug!(path = %path.display(), "Wrote raw transcript data");
        }

        let path = self.path_for(&doc.identifier);
        write_atomic(&path, markdown.as_bytes())?;
        tracing::info!(video_id = %doc.identifier, path = %path.display(), "Wrote transcript");

        Ok(path)
    }
}
