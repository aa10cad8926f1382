//! Local folder source.
//!
//! A directory holding files is a chapter; a directory holding only
//! sub-directories is a series whose chapters are the sub-directories that
//! hold files. "Image URLs" are plain file paths, which the fetcher reads
//! from disk instead of over HTTP.

use super::{ChapterPage, ChapterTitles, SeriesIndex, SourceAdapter};
use crate::error::ScraperError;
use crate::imaging::has_image_extension;
use crate::naming::natural_cmp;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

const PLATFORM: &str = "LocalFolder";

/// Used when a path has no usable parent or file name.
const DEFAULT_SERIES: &str = "Custom Series";
const DEFAULT_CHAPTER: &str = "Unknown Chapter";

/// Local directory source.
#[derive(Debug, Default)]
pub struct LocalFolderSource;

impl LocalFolderSource {
    pub fn new() -> Self {
        Self
    }
}

fn is_web_link(link: &str) -> bool {
    url::Url::parse(link).is_ok_and(|url| matches!(url.scheme(), "http" | "https"))
}

fn io_error(path: &Path, source: std::io::Error) -> ScraperError {
    ScraperError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Lists the entries of `dir` split into (files, directories).
fn list_dir(dir: &Path) -> Result<(Vec<PathBuf>, Vec<PathBuf>), ScraperError> {
    let mut files = Vec::new();
    let mut dirs = Vec::new();

    for entry in std::fs::read_dir(dir).map_err(|e| io_error(dir, e))? {
        let path = entry.map_err(|e| io_error(dir, e))?.path();
        if path.is_dir() {
            dirs.push(path);
        } else if path.is_file() {
            files.push(path);
        }
    }

    Ok((files, dirs))
}

fn holds_files(dir: &Path) -> bool {
    list_dir(dir).is_ok_and(|(files, _)| !files.is_empty())
}

fn sort_naturally(paths: &mut [PathBuf]) {
    paths.sort_by(|a, b| natural_cmp(&file_name(a), &file_name(b)));
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn local_dir(link: &str) -> Option<&Path> {
    if is_web_link(link) {
        return None;
    }
    let path = Path::new(link);
    path.is_dir().then_some(path)
}

#[async_trait]
impl SourceAdapter for LocalFolderSource {
    fn platform(&self) -> &'static str {
        PLATFORM
    }

    fn referer(&self) -> &str {
        ""
    }

    fn reads_local_files(&self) -> bool {
        true
    }

    fn is_series_link(&self, link: &str) -> bool {
        local_dir(link).is_some_and(|dir| !holds_files(dir))
    }

    fn is_chapter_link(&self, link: &str) -> bool {
        local_dir(link).is_some_and(holds_files)
    }

    async fn list_chapter_links(&self, series_link: &str) -> Result<SeriesIndex, ScraperError> {
        let dir = Path::new(series_link);
        let (_, mut chapters) = list_dir(dir)?;
        chapters.retain(|chapter| holds_files(chapter));
        sort_naturally(&mut chapters);

        let title = std::path::absolute(dir)
            .ok()
            .as_deref()
            .map(file_name)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| DEFAULT_SERIES.to_string());

        Ok(SeriesIndex {
            title,
            chapter_links: chapters
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect(),
        })
    }

    async fn fetch_chapter_page(&self, chapter_link: &str) -> Result<ChapterPage, ScraperError> {
        let dir = Path::new(chapter_link);
        if !dir.is_dir() {
            return Err(io_error(
                dir,
                std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
            ));
        }
        Ok(ChapterPage::new(chapter_link, String::new()))
    }

    fn extract_image_urls(&self, page: &ChapterPage) -> Result<Vec<String>, ScraperError> {
        let (mut files, _) = list_dir(Path::new(&page.link))?;
        files.retain(|f| has_image_extension(f));
        sort_naturally(&mut files);

        Ok(files
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect())
    }

    fn resolve_titles(&self, page: &ChapterPage) -> Result<ChapterTitles, ScraperError> {
        let dir = std::path::absolute(&page.link).map_err(|e| io_error(Path::new(&page.link), e))?;

        let chapter = Some(file_name(&dir))
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| DEFAULT_CHAPTER.to_string());
        let series = dir
            .parent()
            .map(file_name)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| DEFAULT_SERIES.to_string());

        Ok(ChapterTitles { series, chapter })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"x").unwrap();
    }

    fn series_fixture() -> TempDir {
        let dir = TempDir::new().unwrap();
        let series = dir.path().join("My Series");
        touch(&series.join("Chapter 10").join("1.jpg"));
        touch(&series.join("Chapter 2").join("1.jpg"));
        touch(&series.join("Chapter 2").join("10.png"));
        touch(&series.join("Chapter 2").join("2.png"));
        touch(&series.join("Chapter 2").join("notes.txt"));
        std::fs::create_dir_all(series.join("empty")).unwrap();
        dir
    }

    #[test]
    fn test_link_recognition() {
        let fixture = series_fixture();
        let series = fixture.path().join("My Series");
        let chapter = series.join("Chapter 2");
        let source = LocalFolderSource::new();

        assert!(source.is_series_link(series.to_str().unwrap()));
        assert!(!source.is_chapter_link(series.to_str().unwrap()));
        assert!(source.is_chapter_link(chapter.to_str().unwrap()));
        assert!(!source.is_series_link(chapter.to_str().unwrap()));

        assert!(source.reads_local_files());
        assert!(!source.is_series_link("not-a-real-link"));
        assert!(!source.is_chapter_link("https://example.com/manga/foo/"));
    }

    #[tokio::test]
    async fn test_chapters_in_natural_order() {
        let fixture = series_fixture();
        let series = fixture.path().join("My Series");

        let index = LocalFolderSource::new()
            .list_chapter_links(series.to_str().unwrap())
            .await
            .unwrap();

        assert_eq!(index.title, "My Series");
        let names: Vec<String> = index
            .chapter_links
            .iter()
            .map(|l| file_name(Path::new(l)))
            .collect();
        assert_eq!(names, vec!["Chapter 2", "Chapter 10"]);
    }

    #[tokio::test]
    async fn test_images_and_titles() {
        let fixture = series_fixture();
        let chapter = fixture.path().join("My Series").join("Chapter 2");
        let source = LocalFolderSource::new();

        let page = source
            .fetch_chapter_page(chapter.to_str().unwrap())
            .await
            .unwrap();

        let names: Vec<String> = source
            .extract_image_urls(&page)
            .unwrap()
            .iter()
            .map(|l| file_name(Path::new(l)))
            .collect();
        assert_eq!(names, vec!["1.jpg", "2.png", "10.png"]);

        let titles = source.resolve_titles(&page).unwrap();
        assert_eq!(titles.series, "My Series");
        assert_eq!(titles.chapter, "Chapter 2");
    }

    #[tokio::test]
    async fn test_missing_chapter_dir() {
        let source = LocalFolderSource::new();
        assert!(source.fetch_chapter_page("/definitely/not/here").await.is_err());
    }
}
