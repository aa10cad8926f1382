//! Sites built on the Madara WordPress theme.
//!
//! ReaperScans, Manga-Scantrad and Manga-Origines-X share the reader markup
//! and breadcrumb layout, and differ in link shapes, where the chapter index
//! lives and which breadcrumb entry holds the series title.

use super::{
    ChapterPage, ChapterTitles, SeriesIndex, SiteClient, SourceAdapter, resolve_url, select_text,
    with_trailing_slash,
};
use crate::error::ScraperError;
use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::LazyLock;

static REAPER_SERIES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://(www\.)?reaperscans\.fr/series?/[^/?]+/?$").unwrap()
});

static REAPER_CHAPTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://(www\.)?reaperscans\.fr/series?/[^/]+/chapitre-\d+/?$").unwrap()
});

static SCANTRAD_SERIES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://(www\.)?manga-scantrad\.net/manga/[\w\-%]+/?$").unwrap()
});

static SCANTRAD_CHAPTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^https?://(www\.)?manga-scantrad\.net/manga/[\w\-%]+/(chapitre|ch)-\d+[\w\-%]*/?(\?style=(list|paged))?$",
    )
    .unwrap()
});

static ORIGINES_SERIES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://(www\.)?x\.mangas-origines\.fr/oeuvre/[\w\-%]+/?$").unwrap()
});

static ORIGINES_CHAPTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^https?://(www\.)?x\.mangas-origines\.fr/oeuvre/[\w\-%]+/chapitre-\d+/?(\?style=(list|paged))?$",
    )
    .unwrap()
});

/// CSS selectors used for parsing.
struct Selectors {
    post_title: Selector,
    /// Chapter entries rendered on the series page itself.
    page_chapters: Selector,
    /// Chapter entries returned by the ajax endpoint.
    ajax_chapters: Selector,
    images: Selector,
    crumb_second: Selector,
    crumb_third: Selector,
    crumb_active: Selector,
}

static SELECTORS: LazyLock<Selectors> = LazyLock::new(|| Selectors {
    post_title: Selector::parse("div.post-title h1").unwrap(),
    page_chapters: Selector::parse("div.chapter-link a[href]").unwrap(),
    ajax_chapters: Selector::parse(".wp-manga-chapter > a[href]").unwrap(),
    images: Selector::parse(".reading-content img").unwrap(),
    crumb_second: Selector::parse(".breadcrumb > li:nth-child(2)").unwrap(),
    crumb_third: Selector::parse(".breadcrumb > li:nth-child(3)").unwrap(),
    crumb_active: Selector::parse(".breadcrumb > .active").unwrap(),
});

/// Where a site publishes its chapter index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChapterIndex {
    /// Listed on the series page.
    SeriesPage,
    /// Returned by `POST <series>/ajax/chapters/`.
    Ajax,
}

/// Breadcrumb entry holding the series title.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SeriesCrumb {
    Second,
    Third,
}

/// Madara-theme source, configured per site.
pub struct MadaraSource {
    site: SiteClient,
    platform: &'static str,
    referer: &'static str,
    series_pattern: &'static Regex,
    chapter_pattern: &'static Regex,
    index: ChapterIndex,
    series_crumb: SeriesCrumb,
    /// Request the single-page reader (`?style=list`).
    list_style: bool,
}

impl MadaraSource {
    pub fn reaper_scans(site: SiteClient) -> Self {
        Self {
            site,
            platform: "ReaperScans",
            referer: "https://reaperscans.fr/",
            series_pattern: &REAPER_SERIES,
            chapter_pattern: &REAPER_CHAPTER,
            index: ChapterIndex::SeriesPage,
            series_crumb: SeriesCrumb::Second,
            list_style: false,
        }
    }

    pub fn manga_scantrad(site: SiteClient) -> Self {
        Self {
            site,
            platform: "Manga-Scantrad",
            referer: "https://manga-scantrad.net/",
            series_pattern: &SCANTRAD_SERIES,
            chapter_pattern: &SCANTRAD_CHAPTER,
            index: ChapterIndex::Ajax,
            series_crumb: SeriesCrumb::Second,
            list_style: true,
        }
    }

    pub fn manga_origines_x(site: SiteClient) -> Self {
        Self {
            site,
            platform: "Manga-Origines-X",
            referer: "https://x.mangas-origines.fr/",
            series_pattern: &ORIGINES_SERIES,
            chapter_pattern: &ORIGINES_CHAPTER,
            index: ChapterIndex::Ajax,
            series_crumb: SeriesCrumb::Third,
            list_style: true,
        }
    }

    /// Returns the link actually requested for a chapter.
    fn reader_link(&self, chapter_link: &str) -> String {
        if !self.list_style {
            return chapter_link.to_string();
        }
        let base = chapter_link.split('?').next().unwrap_or(chapter_link);
        format!("{}?style=list", base)
    }

    fn parse_title(doc: &Html) -> Result<String, ScraperError> {
        select_text(doc, &SELECTORS.post_title, "series title")
    }

    /// Chapter links in `doc`, oldest first.
    fn parse_chapter_links(doc: &Html, selector: &Selector) -> Vec<String> {
        let mut links: Vec<String> = doc
            .select(selector)
            .filter_map(|a| a.value().attr("href"))
            .map(|href| href.trim().to_string())
            .collect();
        links.reverse();
        links
    }

    /// Reader images, resolved against the chapter page at `base`.
    fn parse_image_urls(doc: &Html, base: &str) -> Vec<String> {
        doc.select(&SELECTORS.images)
            .filter_map(|img| {
                let attrs = img.value();
                attrs
                    .attr("data-src")
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .or_else(|| attrs.attr("src").map(str::trim))
            })
            .filter(|url| !url.is_empty())
            .map(|url| resolve_url(base, &url.replace('\n', "")))
            .collect()
    }

    fn parse_titles(&self, doc: &Html) -> Result<ChapterTitles, ScraperError> {
        let crumb = match self.series_crumb {
            SeriesCrumb::Second => &SELECTORS.crumb_second,
            SeriesCrumb::Third => &SELECTORS.crumb_third,
        };

        Ok(ChapterTitles {
            series: select_text(doc, crumb, "series breadcrumb")?,
            chapter: select_text(doc, &SELECTORS.crumb_active, "chapter breadcrumb")?,
        })
    }
}

#[async_trait]
impl SourceAdapter for MadaraSource {
    fn platform(&self) -> &'static str {
        self.platform
    }

    fn referer(&self) -> &str {
        self.referer
    }

    fn is_series_link(&self, link: &str) -> bool {
        self.series_pattern.is_match(link)
    }

    fn is_chapter_link(&self, link: &str) -> bool {
        self.chapter_pattern.is_match(link)
    }

    async fn list_chapter_links(&self, series_link: &str) -> Result<SeriesIndex, ScraperError> {
        let link = with_trailing_slash(series_link);
        let html = self.site.get(&link, None).await?;

        let (title, chapter_links) = match self.index {
            ChapterIndex::SeriesPage => {
                let doc = Html::parse_document(&html);
                let title = Self::parse_title(&doc)?;
                (title, Self::parse_chapter_links(&doc, &SELECTORS.page_chapters))
            }
            ChapterIndex::Ajax => {
                let title = Self::parse_title(&Html::parse_document(&html))?;
                let listing = self
                    .site
                    .post(&format!("{}ajax/chapters/", link), &link)
                    .await?;
                let doc = Html::parse_document(&listing);
                (title, Self::parse_chapter_links(&doc, &SELECTORS.ajax_chapters))
            }
        };

        Ok(SeriesIndex {
            title,
            chapter_links,
        })
    }

    async fn fetch_chapter_page(&self, chapter_link: &str) -> Result<ChapterPage, ScraperError> {
        let html = self.site.get(&self.reader_link(chapter_link), None).await?;
        Ok(ChapterPage::new(chapter_link, html))
    }

    fn extract_image_urls(&self, page: &ChapterPage) -> Result<Vec<String>, ScraperError> {
        Ok(Self::parse_image_urls(&page.document(), &page.link))
    }

    fn resolve_titles(&self, page: &ChapterPage) -> Result<ChapterTitles, ScraperError> {
        self.parse_titles(&page.document())
    }
}
