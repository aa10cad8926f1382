//! Series and chapter records and the on-disk download layout.
//!
//! ```text
//! <root>/<platform>/<series>/downloaded_chapters.txt
//! <root>/<platform>/<series>/<chapter>/<NN>.<ext>
//! <root>/<platform>/<series>/<chapter>/.placeholder_pages
//! <root>/<platform>/<series>/<chapter>/<chapter>.<pdf|zip|cbz>
//! ```

use std::path::{Path, PathBuf};

/// Name of the per-series completion record.
pub const COMPLETION_RECORD_FILE: &str = "downloaded_chapters.txt";

/// Lists, one per line, the page files of a chapter directory that hold the
/// placeholder because the downloaded bytes could not be decoded.
pub const PLACEHOLDER_PAGES_FILE: &str = ".placeholder_pages";

/// Paths of the download tree.
#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn series_dir(&self, platform: &str, series: &str) -> PathBuf {
        self.root.join(platform).join(series)
    }

    pub fn chapter_dir(&self, platform: &str, series: &str, chapter: &str) -> PathBuf {
        self.series_dir(platform, series).join(chapter)
    }

    pub fn completion_record(&self, platform: &str, series: &str) -> PathBuf {
        self.series_dir(platform, series)
            .join(COMPLETION_RECORD_FILE)
    }
}

/// One chapter, identified by (platform, series name, chapter name).
///
/// Names are already sanitized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    pub platform: String,
    pub series_name: String,
    pub name: String,

    /// Working directory holding the raw images and the artifact.
    pub directory: PathBuf,

    /// Packaged artifact, once built.
    pub artifact: Option<PathBuf>,
}

impl Chapter {
    pub fn new(layout: &Layout, platform: &str, series_name: &str, name: &str) -> Self {
        Self {
            platform: platform.to_string(),
            series_name: series_name.to_string(),
            name: name.to_string(),
            directory: layout.chapter_dir(platform, series_name, name),
            artifact: None,
        }
    }

    /// Human-readable `series - chapter` label used in log lines.
    pub fn full_name(&self) -> String {
        format!("{} - {}", self.series_name, self.name)
    }
}

/// A series and the chapters fetched from it during this run.
#[derive(Debug, Clone)]
pub struct Series {
    pub platform: String,
    pub link: String,

    /// Sanitized series name.
    pub name: String,

    /// Chapter links, oldest first. Stable once set.
    pub chapter_links: Vec<String>,

    /// Chapters that completed, in chapter link order.
    pub chapters: Vec<Chapter>,
}

impl Series {
    pub fn new(platform: &str, link: &str, name: &str, chapter_links: Vec<String>) -> Self {
        Self {
            platform: platform.to_string(),
            link: link.to_string(),
            name: name.to_string(),
            chapter_links,
            chapters: Vec::new(),
        }
    }

    pub fn add_chapter(&mut self, chapter: Chapter) {
        self.chapters.push(chapter);
    }
}
