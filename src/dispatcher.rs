//! Turns raw input links into downloads and artifacts.
//!
//! Links are matched against the registry once up front. Unmatched links
//! are reported together in one warning. Work items then run one at a
//! time: download, package each produced chapter, purge raw images.

use crate::logging::LogSink;
use crate::model::Chapter;
use crate::packager::{ArtifactFormat, Packager};
use crate::pipeline::{ChapterFailure, Pipeline, purge_raw_images};
use crate::sources::{LinkKind, SourceRegistry};

const TAG: &str = "Dispatcher";

/// One link matched to an adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub platform: &'static str,
    pub kind: LinkKind,
    pub link: String,
}

/// Matched work items and the links no adapter recognized.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub items: Vec<WorkItem>,
    pub unmatched: Vec<String>,
}

/// What a run did.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Chapters fetched or already present, across all items.
    pub chapters: Vec<Chapter>,
    pub failures: Vec<ChapterFailure>,
    /// Series whose chapter list could not be fetched.
    pub series_errors: usize,
    pub artifacts: usize,
    pub package_errors: usize,
}

/// Matches every link against `registry`.
///
/// Logs a single warning naming all unmatched links and the supported
/// platforms.
pub fn resolve(registry: &SourceRegistry, links: &[String], log: &dyn LogSink) -> Resolution {
    let mut resolution = Resolution::default();

    for link in links {
        match registry.find_for_link(link) {
            Some((adapter, kind)) => resolution.items.push(WorkItem {
                platform: adapter.platform(),
                kind,
                link: link.clone(),
            }),
            None => resolution.unmatched.push(link.clone()),
        }
    }

    if !resolution.unmatched.is_empty() {
        let links = resolution
            .unmatched
            .iter()
            .map(|l| format!("'{}'", l))
            .collect::<Vec<_>>()
            .join(", ");
        log.warn(
            TAG,
            &format!(
                "No source recognizes {}. Supported platforms: {}",
                links,
                registry.platforms().join(", ")
            ),
        );
    }

    resolution
}

/// Runs work items through the pipeline and the packager.
pub struct Dispatcher<'a> {
    registry: &'a SourceRegistry,
    pipeline: Pipeline,
    packager: Packager,
    format: Option<ArtifactFormat>,
    keep_images: bool,
}

impl<'a> Dispatcher<'a> {
    pub fn new(
        registry: &'a SourceRegistry,
        pipeline: Pipeline,
        packager: Packager,
        format: Option<ArtifactFormat>,
        keep_images: bool,
    ) -> Self {
        Self {
            registry,
            pipeline,
            packager,
            format,
            keep_images,
        }
    }

    /// Processes every item in order. Never fails; problems are logged and
    /// counted in the summary.
    pub async fn run(&self, items: &[WorkItem], log: &dyn LogSink) -> RunSummary {
        let mut summary = RunSummary::default();

        for item in items {
            let Some(adapter) = self.registry.get(item.platform) else {
                log.error(TAG, &format!("No adapter named {}", item.platform));
                continue;
            };

            log.info(
                item.platform,
                &format!("[{}] {}", item.kind, item.link),
            );

            let chapters = match item.kind {
                LinkKind::Series => match self.pipeline.download_series(adapter, &item.link, log).await {
                    Ok(report) => {
                        summary.failures.extend(report.failures);
                        report.series.chapters
                    }
                    Err(e) => {
                        log.error(
                            item.platform,
                            &format!("Could not list chapters of {}: {}", item.link, e),
                        );
                        summary.series_errors += 1;
                        continue;
                    }
                },
                LinkKind::Chapter => match self
                    .pipeline
                    .download_chapter_with_retry(adapter, &item.link, None, log)
                    .await
                {
                    Ok(outcome) => vec![outcome.into_chapter()],
                    Err(failure) => {
                        summary.failures.push(failure);
                        continue;
                    }
                },
            };

            for mut chapter in chapters {
                self.finish_chapter(&mut chapter, &mut summary, log);
                summary.chapters.push(chapter);
            }
        }

        log.info(
            TAG,
            &format!(
                "Run finished: {} chapters, {} failed, {} artifacts",
                summary.chapters.len(),
                summary.failures.len(),
                summary.artifacts
            ),
        );

        summary
    }

    /// Packages `chapter` and purges its raw images when asked to.
    fn finish_chapter(&self, chapter: &mut Chapter, summary: &mut RunSummary, log: &dyn LogSink) {
        let Some(format) = self.format else {
            return;
        };

        if !chapter.directory.is_dir() {
            log.warn(
                TAG,
                &format!("'{}': nothing on disk to package", chapter.full_name()),
            );
            return;
        }

        // A chapter completed on an earlier run may have had its artifact
        // moved away and its raw images purged.
        if Packager::existing_artifact(&chapter.directory, &chapter.name, format).is_none()
            && !Packager::has_pages(&chapter.directory)
        {
            log.info(
                TAG,
                &format!(
                    "'{}': no raw images left to package, skipping",
                    chapter.full_name()
                ),
            );
            return;
        }

        match self
            .packager
            .package(&chapter.directory, &chapter.name, format, log)
        {
            Ok(path) => {
                chapter.artifact = Some(path);
                summary.artifacts += 1;
            }
            Err(e) => {
                log.error(
                    TAG,
                    &format!("'{}': packaging failed: {}", chapter.full_name(), e),
                );
                summary.package_errors += 1;
                return;
            }
        }

        if !self.keep_images {
            match purge_raw_images(&chapter.directory) {
                Ok(removed) => log.debug(
                    TAG,
                    &format!("'{}': removed {} raw images", chapter.full_name(), removed),
                ),
                Err(e) => log.warn(
                    TAG,
                    &format!("'{}': could not remove raw images: {}", chapter.full_name(), e),
                ),
            }
        }
    }
}
