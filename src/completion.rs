//! Per-series completion record.
//!
//! An append-only text file with one chapter name per line. A name in the
//! record means the chapter's images were fetched; it says nothing about
//! whether an artifact still exists.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct CompletionRecord {
    path: PathBuf,
}

impl CompletionRecord {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Chapter names in the record. A missing file is an empty record.
    pub fn names(&self) -> io::Result<Vec<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    pub fn contains(&self, chapter_name: &str) -> io::Result<bool> {
        Ok(self.names()?.iter().any(|name| name == chapter_name))
    }

    /// Appends `chapter_name` unless it is already recorded.
    pub fn append(&self, chapter_name: &str) -> io::Result<()> {
        if self.contains(chapter_name)? {
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", chapter_name)
    }
}
