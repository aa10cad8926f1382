//! Webtoon (www.webtoons.com) source implementation.
//!
//! The list page is paginated, so instead of walking every page the adapter
//! reads the newest episode number and synthesizes viewer links for
//! episodes 1 through N.

use super::{
    ChapterPage, ChapterTitles, SeriesIndex, SiteClient, SourceAdapter, select_text,
};
use crate::error::ScraperError;
use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::LazyLock;

const PLATFORM: &str = "Webtoon";
const REFERER: &str = "https://www.webtoons.com";
const COOKIES: &str = "pagGDPR=true";

/// Image host serving the actual page images.
const IMAGE_HOST: &str = "https://webtoon-phinf.pstatic.net/";

static SERIES_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://(www\.)?webtoons\.com/\w{2}/[\w\-%]+/[\w\-%]+/list\?title_no=\d+$")
        .unwrap()
});

static CHAPTER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^https?://(www\.)?webtoons\.com/\w{2}/[\w\-%]+/[\w\-%]+/[a-zA-Z\d-]+/viewer\?title_no=\d*&episode_no=\d+$",
    )
    .unwrap()
});

/// CSS selectors used for parsing.
struct Selectors {
    /// Series title on the list page.
    series_title: Selector,
    /// Newest episode entry on the list page.
    latest_episode: Selector,
    /// Page images in the viewer.
    images: Selector,
    /// Series title in the viewer toolbar.
    toolbar_series: Selector,
    /// Episode title in the viewer toolbar.
    toolbar_episode: Selector,
}

static SELECTORS: LazyLock<Selectors> = LazyLock::new(|| Selectors {
    series_title: Selector::parse("h1.subj").unwrap(),
    latest_episode: Selector::parse("#_listUl > li:first-child a").unwrap(),
    images: Selector::parse("#_imageList img[data-url]").unwrap(),
    toolbar_series: Selector::parse("#toolbar .subj_info a").unwrap(),
    toolbar_episode: Selector::parse("#toolbar .subj_info h1").unwrap(),
});

/// Webtoon source for webtoons.com series and episodes.
pub struct WebtoonSource {
    site: SiteClient,
}

impl WebtoonSource {
    pub fn new(site: SiteClient) -> Self {
        Self { site }
    }

    /// Builds the series index from the list page of `link`.
    fn parse_series_page(link: &str, doc: &Html) -> Result<SeriesIndex, ScraperError> {
        let (base, title_no) = link
            .split_once("/list?title_no=")
            .ok_or_else(|| ScraperError::InvalidUrl(link.to_string()))?;

        let title = select_text(doc, &SELECTORS.series_title, "series title")?;

        let latest_href = doc
            .select(&SELECTORS.latest_episode)
            .next()
            .and_then(|a| a.value().attr("href"))
            .ok_or_else(|| ScraperError::ElementNotFound("latest episode link".to_string()))?;

        let latest: u32 = latest_href
            .split("&episode_no=")
            .nth(1)
            .and_then(|n| n.split('&').next())
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| {
                ScraperError::ParseError(format!("No episode number in {}", latest_href))
            })?;

        let chapter_links = (1..=latest)
            .map(|n| format!("{base}/ep{n}/viewer?title_no={title_no}&episode_no={n}"))
            .collect();

        Ok(SeriesIndex {
            title,
            chapter_links,
        })
    }

    fn parse_image_urls(doc: &Html) -> Vec<String> {
        doc.select(&SELECTORS.images)
            .filter_map(|img| img.value().attr("data-url"))
            .filter(|url| url.contains(IMAGE_HOST))
            .map(|url| url.replace("?type=q90", ""))
            .collect()
    }

    fn parse_titles(doc: &Html) -> Result<ChapterTitles, ScraperError> {
        Ok(ChapterTitles {
            series: select_text(doc, &SELECTORS.toolbar_series, "series title")?,
            chapter: select_text(doc, &SELECTORS.toolbar_episode, "episode title")?,
        })
    }
}

#[async_trait]
impl SourceAdapter for WebtoonSource {
    fn platform(&self) -> &'static str {
        PLATFORM
    }

    fn referer(&self) -> &str {
        REFERER
    }

    fn cookies(&self) -> Option<&str> {
        Some(COOKIES)
    }

    fn is_series_link(&self, link: &str) -> bool {
        SERIES_PATTERN.is_match(link)
    }

    fn is_chapter_link(&self, link: &str) -> bool {
        CHAPTER_PATTERN.is_match(link)
    }

    async fn list_chapter_links(&self, series_link: &str) -> Result<SeriesIndex, ScraperError> {
        let html = self.site.get(series_link, Some(COOKIES)).await?;
        Self::parse_series_page(series_link, &Html::parse_document(&html))
    }

    async fn fetch_chapter_page(&self, chapter_link: &str) -> Result<ChapterPage, ScraperError> {
        let html = self.site.get(chapter_link, Some(COOKIES)).await?;
        Ok(ChapterPage::new(chapter_link, html))
    }

    fn extract_image_urls(&self, page: &ChapterPage) -> Result<Vec<String>, ScraperError> {
        Ok(Self::parse_image_urls(&page.document()))
    }

    fn resolve_titles(&self, page: &ChapterPage) -> Result<ChapterTitles, ScraperError> {
        Self::parse_titles(&page.document())
    }
}
