//! Chapter and series download pipelines.
//!
//! A chapter attempt goes through
//!
//! ```text
//! resolve titles -> AlreadyDone                          (name in the record, not forced)
//!               \-> recreate dir -> fetch -> record -> Persisted
//! ```
//!
//! and any error abandons the attempt. The series loop retries a chapter
//! up to `retry.max_attempts` times, then records the failure and moves on.

use crate::completion::CompletionRecord;
use crate::config::RetryConfig;
use crate::error::{ChapterError, ScraperError};
use crate::fetcher::{Fetcher, ImageOrigin};
use crate::imaging::has_image_extension;
use crate::logging::LogSink;
use crate::model::{Chapter, Layout, PLACEHOLDER_PAGES_FILE, Series};
use crate::naming::sanitize;
use crate::sources::{SourceAdapter, rate_limit};
use std::path::Path;

/// Result of one successful chapter attempt.
#[derive(Debug, Clone)]
pub enum ChapterOutcome {
    /// The chapter was already in the completion record; nothing was touched.
    AlreadyDone(Chapter),

    /// Images were fetched and the chapter was recorded.
    Persisted { chapter: Chapter, saved: usize },
}

impl ChapterOutcome {
    pub fn chapter(&self) -> &Chapter {
        match self {
            ChapterOutcome::AlreadyDone(chapter) => chapter,
            ChapterOutcome::Persisted { chapter, .. } => chapter,
        }
    }

    pub fn into_chapter(self) -> Chapter {
        match self {
            ChapterOutcome::AlreadyDone(chapter) => chapter,
            ChapterOutcome::Persisted { chapter, .. } => chapter,
        }
    }
}

/// A chapter given up on after exhausting its attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterFailure {
    pub link: String,
    pub attempts: u32,
    pub reason: String,
}

/// What a series download produced.
#[derive(Debug, Clone)]
pub struct SeriesReport {
    pub series: Series,
    pub already_done: usize,
    pub persisted: usize,
    pub failures: Vec<ChapterFailure>,
}

/// Drives chapter and series downloads.
pub struct Pipeline {
    layout: Layout,
    fetcher: Fetcher,
    retry: RetryConfig,
    force: bool,
}

impl Pipeline {
    pub fn new(layout: Layout, fetcher: Fetcher, retry: RetryConfig, force: bool) -> Self {
        Self {
            layout,
            fetcher,
            retry,
            force,
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Runs one attempt at `chapter_link`.
    ///
    /// `series_name` pins the series directory when the chapter belongs to
    /// a series being downloaded; otherwise the title from the chapter page
    /// is used.
    pub async fn download_chapter(
        &self,
        adapter: &dyn SourceAdapter,
        chapter_link: &str,
        series_name: Option<&str>,
        log: &dyn LogSink,
    ) -> Result<ChapterOutcome, ChapterError> {
        let platform = adapter.platform();

        let page = adapter.fetch_chapter_page(chapter_link).await?;
        let titles = adapter.resolve_titles(&page)?;
        let series = series_name
            .map(str::to_string)
            .unwrap_or_else(|| sanitize(&titles.series));
        let name = sanitize(&titles.chapter);

        let chapter = Chapter::new(&self.layout, platform, &series, &name);
        let record = CompletionRecord::new(self.layout.completion_record(platform, &series));

        let done = record.contains(&name).map_err(|source| ChapterError::Record {
            path: record.path().to_path_buf(),
            source,
        })?;
        if done && !self.force {
            log.info(
                platform,
                &format!("'{}': already downloaded", chapter.full_name()),
            );
            return Ok(ChapterOutcome::AlreadyDone(chapter));
        }

        recreate_dir(&chapter.directory)?;

        let urls = adapter.extract_image_urls(&page)?;
        if urls.is_empty() {
            return Err(ChapterError::NoImages(chapter_link.to_string()));
        }
        log.debug(
            platform,
            &format!("'{}': {} images listed", chapter.full_name(), urls.len()),
        );

        let saved = self
            .fetcher
            .fetch_chapter_images(&urls, &chapter.directory, image_origin(adapter), log)
            .await?;
        if saved == 0 {
            return Err(ChapterError::NoImages(chapter_link.to_string()));
        }

        record.append(&name).map_err(|source| ChapterError::Record {
            path: record.path().to_path_buf(),
            source,
        })?;

        log.info(
            platform,
            &format!(
                "'{}': complete ({}/{} images)",
                chapter.full_name(),
                saved,
                urls.len()
            ),
        );

        Ok(ChapterOutcome::Persisted { chapter, saved })
    }

    /// Attempts `chapter_link` until it succeeds or the attempts run out.
    pub async fn download_chapter_with_retry(
        &self,
        adapter: &dyn SourceAdapter,
        chapter_link: &str,
        series_name: Option<&str>,
        log: &dyn LogSink,
    ) -> Result<ChapterOutcome, ChapterFailure> {
        let platform = adapter.platform();
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self
                .download_chapter(adapter, chapter_link, series_name, log)
                .await
            {
                Ok(outcome) => return Ok(outcome),
                Err(e) if attempt < max_attempts => {
                    log.warn(
                        platform,
                        &format!(
                            "Attempt {}/{} failed for {}: {}",
                            attempt, max_attempts, chapter_link, e
                        ),
                    );
                    rate_limit(self.retry.delay_sec).await;
                }
                Err(e) => {
                    log.error(
                        platform,
                        &format!(
                            "Giving up on {} after {} attempts: {}",
                            chapter_link, attempt, e
                        ),
                    );
                    return Err(ChapterFailure {
                        link: chapter_link.to_string(),
                        attempts: attempt,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    /// Downloads every chapter of the series at `series_link`, in order.
    ///
    /// Only a failure to list the chapters is returned as an error; chapter
    /// failures end up in the report.
    pub async fn download_series(
        &self,
        adapter: &dyn SourceAdapter,
        series_link: &str,
        log: &dyn LogSink,
    ) -> Result<SeriesReport, ScraperError> {
        let platform = adapter.platform();
        log.info(platform, &format!("Fetching chapter list of {}", series_link));

        let index = adapter.list_chapter_links(series_link).await?;
        let mut series = Series::new(
            platform,
            series_link,
            &sanitize(&index.title),
            index.chapter_links,
        );
        log.info(
            platform,
            &format!("'{}': {} chapters", series.name, series.chapter_links.len()),
        );

        let mut already_done = 0;
        let mut persisted = 0;
        let mut failures = Vec::new();

        let links = series.chapter_links.clone();
        for link in &links {
            match self
                .download_chapter_with_retry(adapter, link, Some(&series.name), log)
                .await
            {
                Ok(ChapterOutcome::AlreadyDone(chapter)) => {
                    already_done += 1;
                    series.add_chapter(chapter);
                }
                Ok(ChapterOutcome::Persisted { chapter, .. }) => {
                    persisted += 1;
                    series.add_chapter(chapter);
                }
                Err(failure) => failures.push(failure),
            }
        }

        log.info(
            platform,
            &format!(
                "'{}': completed ({} new, {} already downloaded, {} failed)",
                series.name,
                persisted,
                already_done,
                failures.len()
            ),
        );

        Ok(SeriesReport {
            series,
            already_done,
            persisted,
            failures,
        })
    }
}

fn image_origin(adapter: &dyn SourceAdapter) -> ImageOrigin<'_> {
    if adapter.reads_local_files() {
        ImageOrigin::Disk
    } else {
        ImageOrigin::Web {
            referer: adapter.referer(),
            cookies: adapter.cookies(),
        }
    }
}

/// Removes `dir` if present and creates it empty.
fn recreate_dir(dir: &Path) -> Result<(), ChapterError> {
    let setup = |source| ChapterError::Setup {
        path: dir.to_path_buf(),
        source,
    };

    if dir.exists() {
        std::fs::remove_dir_all(dir).map_err(setup)?;
    }
    std::fs::create_dir_all(dir).map_err(setup)
}

/// Deletes the raw images of a chapter directory and their placeholder
/// listing, keeping everything else.
///
/// Returns the number of images removed.
pub fn purge_raw_images(chapter_dir: &Path) -> std::io::Result<usize> {
    let mut removed = 0;
    for entry in std::fs::read_dir(chapter_dir)? {
        let path = entry?.path();
        if path.is_file() && has_image_extension(&path) {
            std::fs::remove_file(&path)?;
            removed += 1;
        }
    }

    match std::fs::remove_file(chapter_dir.join(PLACEHOLDER_PAGES_FILE)) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e),
        _ => {}
    }
    Ok(removed)
}
