use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::output::{identifier_from_path, markdown_path, write_atomic};
use crate::resolver::VideoIdentifier;
use crate::HarvestError;

/// On-disk progress artifact
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgressRecord {
    #[serde(default)]
    pub last_updated: Option<String>,

    #[serde(default)]
    pub processed_videos: Vec<String>,
}

/// Durable set of identifiers whose transcript has been written
#[derive(Debug)]
pub struct ProgressStore {
    path: PathBuf,
    output_dir: PathBuf,
    done: BTreeSet<VideoIdentifier>,
}

impl ProgressStore {
    /// Load the progress file and union it with the artifacts already in `output_dir`.
    ///
    /// A missing or malformed progress file is treated as empty.
    pub fn open(path: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let output_dir = output_dir.into();

        let mut done = read_record(&path);
        let recorded = done.len();

        let scanned = scan_output_dir(&output_dir);
        let found = scanned.len();
        done.extend(scanned);

        tracing::info!(
            progress_file = %path.display(),
            recorded,
            found_on_disk = found,
            total = done.len(),
            "Loaded progress"
        );

        Self { path, output_dir, done }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Recorded as done, or its artifact appeared on disk since the store was opened
    pub fn is_done(&self, id: &VideoIdentifier) -> bool {
        self.done.contains(id) || markdown_path(&self.output_dir, id).is_file()
    }

    /// Record `id` and flush the record to disk
    pub fn mark_done(&mut self, id: &VideoIdentifier) -> Result<()> {
        self.done.insert(id.clone());
        self.flush()
    }

    pub fn snapshot(&self) -> BTreeSet<VideoIdentifier> {
        self.done.clone()
    }

    pub fn len(&self) -> usize {
        self.done.len()
    }

    pub fn is_empty(&self) -> bool {
        self.done.is_empty()
    }

    /// Write the record atomically
    pub fn flush(&self) -> Result<()> {
        let record = ProgressRecord {
            last_updated: Some(Utc::now().to_rfc3339()),
            processed_videos: self.done.iter().map(|id| id.to_string()).collect(),
        };
        let json = serde_json::to_string_pretty(&record).context("cannot serialize progress")?;
        write_atomic(&self.path, json.as_bytes())
            .map_err(|e| HarvestError::Persistence(format!("{}: {:#}", self.path.display(), e)))?;
        tracing::debug!(path = %self.path.display(), count = self.done.len(), "Saved progress");
        Ok(())
    }
}

fn read_record(path: &Path) -> BTreeSet<VideoIdentifier> {
    let content = match fs_err::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeSet::new(),
        Err(e) => {
            tracing::warn!(error = %e, "Cannot read progress file, starting empty");
            return BTreeSet::new();
        }
    };

    let record: ProgressRecord = match serde_json::from_str(&content) {
        Ok(record) => record,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Malformed progress file, starting empty");
            return BTreeSet::new();
        }
    };

    record
        .processed_videos
        .iter()
        .filter_map(|raw| {
            let id = VideoIdentifier::parse(raw);
            if id.is_none() {
                tracing::warn!(entry = %raw, "Ignoring invalid identifier in progress file");
            }
            id
        })
        .collect()
}

fn scan_output_dir(output_dir: &Path) -> BTreeSet<VideoIdentifier> {
    let Ok(entries) = fs_err::read_dir(output_dir) else {
        return BTreeSet::new();
    };
    entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .filter_map(|entry| identifier_from_path(&entry.path()))
        .collect()
}
