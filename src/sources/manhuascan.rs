//! Manhuascan (manhuascan.us) source implementation.

use super::{
    ChapterPage, ChapterTitles, SeriesIndex, SiteClient, SourceAdapter, resolve_url, select_text,
    with_trailing_slash,
};
use crate::error::ScraperError;
use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::LazyLock;

const PLATFORM: &str = "Manhuascan";
const REFERER: &str = "https://manhuascan.us";

static SERIES_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://(www\.)?manhuascan\.us/manga/[\w\-%]+/?$").unwrap()
});

static CHAPTER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://(www\.)?manhuascan\.us/manga/.+/(\w+-)?\d+/?$").unwrap()
});

struct Selectors {
    series_title: Selector,
    chapter_links: Selector,
    /// The reader block is the fifth div of the third article section.
    images: Selector,
    breadcrumb_series: Selector,
    selected_chapter: Selector,
}

static SELECTORS: LazyLock<Selectors> = LazyLock::new(|| Selectors {
    series_title: Selector::parse("article h1").unwrap(),
    chapter_links: Selector::parse("div.chbox a[href]").unwrap(),
    images: Selector::parse("article > div:nth-of-type(3) > div:nth-of-type(5) > img[src]")
        .unwrap(),
    breadcrumb_series: Selector::parse("article > div:nth-of-type(1) a").unwrap(),
    selected_chapter: Selector::parse("#chapter option[selected]").unwrap(),
});

/// Manhuascan source.
pub struct ManhuascanSource {
    site: SiteClient,
}

impl ManhuascanSource {
    pub fn new(site: SiteClient) -> Self {
        Self { site }
    }

    fn parse_series_page(doc: &Html) -> Result<SeriesIndex, ScraperError> {
        let title = select_text(doc, &SELECTORS.series_title, "series title")?;

        let mut chapter_links: Vec<String> = doc
            .select(&SELECTORS.chapter_links)
            .filter_map(|a| a.value().attr("href"))
            .map(str::to_string)
            .collect();
        chapter_links.reverse();

        Ok(SeriesIndex {
            title,
            chapter_links,
        })
    }

    fn parse_image_urls(doc: &Html, base: &str) -> Vec<String> {
        doc.select(&SELECTORS.images)
            .filter_map(|img| img.value().attr("src"))
            .map(str::trim)
            .filter(|src| !src.is_empty())
            .map(|src| resolve_url(base, src))
            .collect()
    }

    fn parse_titles(doc: &Html) -> Result<ChapterTitles, ScraperError> {
        Ok(ChapterTitles {
            series: select_text(doc, &SELECTORS.breadcrumb_series, "series title")?,
            chapter: select_text(doc, &SELECTORS.selected_chapter, "chapter title")?,
        })
    }
}

#[async_trait]
impl SourceAdapter for ManhuascanSource {
    fn platform(&self) -> &'static str {
        PLATFORM
    }

    fn referer(&self) -> &str {
        REFERER
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
        Ok(Self::parse_image_urls(&page.document(), &page.link))
    }

    fn resolve_titles(&self, page: &ChapterPage) -> Result<ChapterTitles, ScraperError> {
        Self::parse_titles(&page.document())
    }
}
