//! Manga18.club source implementation.
//!
//! Chapter pages don't carry `<img>` tags for the pages; the image URLs are
//! base64 strings inside the `slides_p_path` JavaScript array.

use super::{
    ChapterPage, ChapterTitles, SeriesIndex, SiteClient, SourceAdapter, resolve_url, select_text,
    with_trailing_slash,
};
use crate::error::ScraperError;
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::LazyLock;

const PLATFORM: &str = "Manga18.club";
const BASE_URL: &str = "https://manga18.club";

/// Extensions accepted for decoded slide URLs.
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tiff", "bmp", "gif"];

static SERIES_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://(www\.)?manga18\.club/manhwa/[\w\-%]+/?$").unwrap()
});

static CHAPTER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://(www\.)?manga18\.club/manhwa/.+/(\w+-)?\d+/?$").unwrap()
});

static SLIDES_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"slides_p_path\s*=\s*\[([^\]]*)\]").unwrap());

struct Selectors {
    series_title: Selector,
    chapter_links: Selector,
    scripts: Selector,
    story_name: Selector,
    chapter_name: Selector,
}

static SELECTORS: LazyLock<Selectors> = LazyLock::new(|| Selectors {
    series_title: Selector::parse("div.detail_name h1").unwrap(),
    chapter_links: Selector::parse("div.chapter_box li a[href]").unwrap(),
    scripts: Selector::parse("script").unwrap(),
    story_name: Selector::parse("div.story_name h1").unwrap(),
    chapter_name: Selector::parse("div.chapter_name span").unwrap(),
});

/// Manga18.club source.
pub struct Manga18Source {
    site: SiteClient,
}

impl Manga18Source {
    pub fn new(site: SiteClient) -> Self {
        Self { site }
    }

    fn parse_series_page(doc: &Html) -> Result<SeriesIndex, ScraperError> {
        let title = select_text(doc, &SELECTORS.series_title, "series title")?;

        // The site lists newest first.
        let mut chapter_links: Vec<String> = doc
            .select(&SELECTORS.chapter_links)
            .filter_map(|a| a.value().attr("href"))
            .map(|href| resolve_url(BASE_URL, href))
            .collect();
        chapter_links.reverse();

        Ok(SeriesIndex {
            title,
            chapter_links,
        })
    }

    fn parse_image_urls(doc: &Html) -> Result<Vec<String>, ScraperError> {
        let array = doc
            .select(&SELECTORS.scripts)
            .map(|script| script.text().collect::<String>())
            .find_map(|js| {
                SLIDES_REGEX
                    .captures(&js)
                    .and_then(|caps| caps.get(1))
                    .map(|m| m.as_str().to_string())
            })
            .ok_or_else(|| ScraperError::ElementNotFound("slides_p_path array".to_string()))?;

        let urls = array
            .split(',')
            .map(|entry| entry.trim().trim_matches('"').trim_matches('\''))
            .filter(|entry| !entry.is_empty())
            .filter_map(|entry| {
                let decoded = STANDARD.decode(entry).ok()?;
                String::from_utf8(decoded).ok()
            })
            .filter(|url| has_image_extension(url))
            .collect();

        Ok(urls)
    }

    fn parse_titles(doc: &Html) -> Result<ChapterTitles, ScraperError> {
        Ok(ChapterTitles {
            series: select_text(doc, &SELECTORS.story_name, "series title")?,
            chapter: select_text(doc, &SELECTORS.chapter_name, "chapter title")?,
        })
    }
}

fn has_image_extension(url: &str) -> bool {
    url.rsplit_once('.')
        .is_some_and(|(_, ext)| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

#[async_trait]
impl SourceAdapter for Manga18Source {
    fn platform(&self) -> &'static str {
        PLATFORM
    }

    fn referer(&self) -> &str {
        BASE_URL
    }

    fn is_series_link(&self, link: &str) -> bool {
        SERIES_PATTERN.is_match(link)
    }

    fn is_chapter_link(&self, link: &str) -> bool {
        CHAPTER_PATTERN.is_match(link)
    }

    async fn list_chapter_links(&self, series_link: &str) -> Result<SeriesIndex, ScraperError> {
        let html = self.site.get(&with_trailing_slash(series_link), None).await?;
        Self::parse_series_page(&Html::parse_document(&html))
    }

    async fn fetch_chapter_page(&self, chapter_link: &str) -> Result<ChapterPage, ScraperError> {
        let html = self.site.get(chapter_link, None).await?;
        Ok(ChapterPage::new(chapter_link, html))
    }

    fn extract_image_urls(&self, page: &ChapterPage) -> Result<Vec<String>, ScraperError> {
        Self::parse_image_urls(&page.document())
    }

    fn resolve_titles(&self, page: &ChapterPage) -> Result<ChapterTitles, ScraperError> {
        Self::parse_titles(&page.document())
    }
}
