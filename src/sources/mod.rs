//! Source adapter trait and common types for chapter sources.
//!
//! Each adapter knows how to recognize the links of one site (or of local
//! folders), enumerate a series' chapters, and pull page image URLs and
//! titles out of a chapter page.

mod local;
mod madara;
mod manga18;
mod manhuascan;
mod webtoon;

pub use local::LocalFolderSource;
pub use madara::MadaraSource;
pub use manga18::Manga18Source;
pub use manhuascan::ManhuascanSource;
pub use webtoon::WebtoonSource;

use crate::config::ScrapingConfig;
use crate::error::ScraperError;
use crate::utils::check_response_status;
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::fmt;
use std::time::Duration;

/// What kind of work a link stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Series,
    Chapter,
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkKind::Series => f.write_str("Series"),
            LinkKind::Chapter => f.write_str("Chapter"),
        }
    }
}

/// Title and chapter links of a series.
#[derive(Debug, Clone)]
pub struct SeriesIndex {
    /// Series title as shown by the source (not sanitized).
    pub title: String,

    /// Chapter links, oldest first.
    pub chapter_links: Vec<String>,
}

/// A fetched chapter page.
#[derive(Debug, Clone)]
pub struct ChapterPage {
    /// Link the page was fetched from.
    pub link: String,

    /// Raw page body. Empty for sources that don't serve HTML.
    pub html: String,
}

impl ChapterPage {
    pub fn new(link: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            link: link.into(),
            html: html.into(),
        }
    }

    /// Parses the page body.
    pub fn document(&self) -> Html {
        Html::parse_document(&self.html)
    }
}

/// Series and chapter titles of a chapter page (not sanitized).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterTitles {
    pub series: String,
    pub chapter: String,
}

/// Trait for chapter sources.
///
/// Each adapter handles one site family (or local folders). Link
/// recognition and extraction are pure; listing and page fetching perform
/// I/O.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Platform tag, also used as the top-level download directory.
    fn platform(&self) -> &'static str;

    /// Referer sent with every image request.
    fn referer(&self) -> &str;

    /// Cookie header sent with every image request.
    fn cookies(&self) -> Option<&str> {
        None
    }

    /// Returns true if image URLs are file paths to read from disk.
    ///
    /// Every other adapter's image URLs are fetched over HTTP.
    fn reads_local_files(&self) -> bool {
        false
    }

    /// Checks if the link points at a whole series.
    fn is_series_link(&self, link: &str) -> bool;

    /// Checks if the link points at a single chapter.
    fn is_chapter_link(&self, link: &str) -> bool;

    /// Fetches the series title and its chapter links, oldest first.
    async fn list_chapter_links(&self, series_link: &str) -> Result<SeriesIndex, ScraperError>;

    /// Fetches the chapter page behind `chapter_link`.
    async fn fetch_chapter_page(&self, chapter_link: &str) -> Result<ChapterPage, ScraperError>;

    /// Extracts page image URLs, in reading order.
    fn extract_image_urls(&self, page: &ChapterPage) -> Result<Vec<String>, ScraperError>;

    /// Extracts the series and chapter titles.
    fn resolve_titles(&self, page: &ChapterPage) -> Result<ChapterTitles, ScraperError>;
}

/// Registry of available source adapters, in match priority order.
pub struct SourceRegistry {
    adapters: Vec<Box<dyn SourceAdapter>>,
}

impl SourceRegistry {
    /// Creates a registry with every built-in adapter sharing `client`.
    ///
    /// The local folder adapter is last so that no web adapter is shadowed
    /// by a path that happens to exist.
    pub fn new(client: reqwest::Client, config: &ScrapingConfig) -> Self {
        let site = SiteClient::new(client, config);

        let adapters: Vec<Box<dyn SourceAdapter>> = vec![
            Box::new(WebtoonSource::new(site.clone())),
            Box::new(Manga18Source::new(site.clone())),
            Box::new(ManhuascanSource::new(site.clone())),
            Box::new(MadaraSource::reaper_scans(site.clone())),
            Box::new(MadaraSource::manga_scantrad(site.clone())),
            Box::new(MadaraSource::manga_origines_x(site)),
            Box::new(LocalFolderSource::new()),
        ];

        Self { adapters }
    }

    /// Creates a registry from an explicit adapter list.
    pub fn with_adapters(adapters: Vec<Box<dyn SourceAdapter>>) -> Self {
        Self { adapters }
    }

    /// Finds the first adapter recognizing `link` as a series or a chapter.
    pub fn find_for_link(&self, link: &str) -> Option<(&dyn SourceAdapter, LinkKind)> {
        self.adapters.iter().find_map(|adapter| {
            if adapter.is_series_link(link) {
                Some((adapter.as_ref(), LinkKind::Series))
            } else if adapter.is_chapter_link(link) {
                Some((adapter.as_ref(), LinkKind::Chapter))
            } else {
                None
            }
        })
    }

    /// Looks an adapter up by platform tag.
    pub fn get(&self, platform: &str) -> Option<&dyn SourceAdapter> {
        self.adapters
            .iter()
            .find(|a| a.platform() == platform)
            .map(|a| a.as_ref())
    }

    /// Platform tags of every registered adapter.
    pub fn platforms(&self) -> Vec<&'static str> {
        self.adapters.iter().map(|a| a.platform()).collect()
    }
}

/// Common HTTP client configuration for sources and image fetches.
pub fn create_http_client(config: &ScrapingConfig) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(config.user_agent.as_str())
        .cookie_store(true)
        .timeout(config.request_timeout())
        .build()
}

/// Applies rate limiting delay.
pub async fn rate_limit(delay_sec: f64) {
    if delay_sec > 0.0 {
        tokio::time::sleep(Duration::from_secs_f64(delay_sec)).await;
    }
}

/// Rate-limited page requests shared by the web adapters.
#[derive(Clone)]
pub struct SiteClient {
    client: reqwest::Client,
    delay_sec: f64,
}

impl SiteClient {
    pub fn new(client: reqwest::Client, config: &ScrapingConfig) -> Self {
        Self {
            client,
            delay_sec: config.delay_between_requests_sec,
        }
    }

    /// GETs a page and returns its body.
    pub async fn get(&self, url: &str, cookies: Option<&str>) -> Result<String, ScraperError> {
        rate_limit(self.delay_sec).await;

        let mut request = self.client.get(url);
        if let Some(cookies) = cookies {
            request = request.header("Cookie", cookies);
        }

        let response = check_response_status(request.send().await?).await?;
        tracing::debug!(url, status = %response.status(), "fetched page");
        Ok(response.text().await?)
    }

    /// POSTs an empty form with `referer` and returns the body.
    pub async fn post(&self, url: &str, referer: &str) -> Result<String, ScraperError> {
        rate_limit(self.delay_sec).await;

        let response = self
            .client
            .post(url)
            .header("Referer", referer)
            .send()
            .await?;

        let response = check_response_status(response).await?;
        tracing::debug!(url, status = %response.status(), "posted");
        Ok(response.text().await?)
    }
}

/// Collects the trimmed text of the first element matching `selector`.
pub(crate) fn select_text(
    doc: &Html,
    selector: &Selector,
    what: &str,
) -> Result<String, ScraperError> {
    doc.select(selector)
        .next()
        .map(|elem| elem.text().collect::<String>().trim().to_string())
        .filter(|text| !text.is_empty())
        .ok_or_else(|| {
            tracing::debug!(what, "selector matched nothing");
            ScraperError::ElementNotFound(what.to_string())
        })
}

/// Appends a trailing slash if missing.
pub(crate) fn with_trailing_slash(link: &str) -> String {
    if link.ends_with('/') {
        link.to_string()
    } else {
        format!("{}/", link)
    }
}

/// Resolves `relative` against `base`.
pub(crate) fn resolve_url(base: &str, relative: &str) -> String {
    if relative.starts_with("http://") || relative.starts_with("https://") {
        return relative.to_string();
    }

    if let Ok(base_url) = url::Url::parse(base)
        && let Ok(resolved) = base_url.join(relative)
    {
        return resolved.to_string();
    }

    let base = base.trim_end_matches('/');
    format!("{}/{}", base, relative.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> SourceRegistry {
        let config = ScrapingConfig::default();
        SourceRegistry::new(create_http_client(&config).unwrap(), &config)
    }

    #[test]
    fn test_registry_order() {
        assert_eq!(
            registry().platforms(),
            vec![
                "Webtoon",
                "Manga18.club",
                "Manhuascan",
                "ReaperScans",
                "Manga-Scantrad",
                "Manga-Origines-X",
                "LocalFolder",
            ]
        );
    }

    #[test]
    fn test_find_for_link() {
        let registry = registry();

        let (adapter, kind) = registry
            .find_for_link("https://www.webtoons.com/en/fantasy/tower-of-god/list?title_no=95")
            .unwrap();
        assert_eq!(adapter.platform(), "Webtoon");
        assert_eq!(kind, LinkKind::Series);

        let (adapter, kind) = registry
            .find_for_link("https://manga18.club/manhwa/some-title/chap-12")
            .unwrap();
        assert_eq!(adapter.platform(), "Manga18.club");
        assert_eq!(kind, LinkKind::Chapter);

        assert!(registry.find_for_link("not-a-real-link").is_none());
        assert!(registry.find_for_link("https://example.com/manga/foo/").is_none());
    }

    #[test]
    fn test_get_by_platform() {
        let registry = registry();
        assert!(registry.get("Manhuascan").is_some());
        assert!(registry.get("Unknown").is_none());
    }

    #[test]
    fn test_only_local_folder_reads_disk() {
        let registry = registry();
        let local: Vec<&str> = registry
            .platforms()
            .into_iter()
            .filter(|platform| registry.get(platform).is_some_and(|a| a.reads_local_files()))
            .collect();
        assert_eq!(local, vec!["LocalFolder"]);
    }

    #[test]
    fn test_resolve_url() {
        assert_eq!(
            resolve_url("https://manga18.club/manhwa/foo/", "/manhwa/foo/chap-1"),
            "https://manga18.club/manhwa/foo/chap-1"
        );
        assert_eq!(
            resolve_url("https://a.com/x", "https://b.com/y"),
            "https://b.com/y"
        );
        assert_eq!(
            resolve_url("https://a.com/read/ch-1/", "//cdn.a.com/p/1.jpg"),
            "https://cdn.a.com/p/1.jpg"
        );
        assert_eq!(
            resolve_url("https://a.com/read/ch-1/", "01.jpg"),
            "https://a.com/read/ch-1/01.jpg"
        );
    }

    #[test]
    fn test_trailing_slash() {
        assert_eq!(with_trailing_slash("https://a.com/x"), "https://a.com/x/");
        assert_eq!(with_trailing_slash("https://a.com/x/"), "https://a.com/x/");
    }

    #[test]
    fn test_select_text() {
        let doc = Html::parse_document("<div class='t'>  Title \n</div><p class='e'> </p>");
        let title = Selector::parse(".t").unwrap();
        let empty = Selector::parse(".e").unwrap();
        assert_eq!(select_text(&doc, &title, "title").unwrap(), "Title");
        assert!(select_text(&doc, &empty, "empty").is_err());
    }
}
