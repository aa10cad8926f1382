#![allow(dead_code)]

use std::collections::HashMap;
use std::fs::File;
use std::io::Cursor;
use std::path::Path;
use std::sync::Mutex;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use kao::config::{Config, ImageBoundsConfig, RetryConfig, ScrapingConfig};
use kao::error::ScraperError;
use kao::fetcher::Fetcher;
use kao::model::Layout;
use kao::pipeline::Pipeline;
use kao::sources::{ChapterPage, ChapterTitles, SeriesIndex, SourceAdapter};

pub const SERIES_LINK: &str = "https://example.com/manga/foo/";
pub const PLATFORM: &str = "TestSite";
pub const SERIES_NAME: &str = "Foo";

pub fn png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([120, 40, 200]));
    encode_png(image::DynamicImage::ImageRgb8(img))
}

pub fn rgba_png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba([10, 200, 30, 90]));
    encode_png(image::DynamicImage::ImageRgba8(img))
}

fn encode_png(img: image::DynamicImage) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png)
        .expect("encode png");
    out.into_inner()
}

/// Serves generated images over HTTP.
///
/// `/img/<w>x<h>.png` is an opaque PNG, `/alpha/<w>x<h>.png` a PNG with
/// transparency, `/fake` answers `OK` with status 200, `/broken` answers
/// bytes that are not an image. Anything else is a 404.
pub struct ImageServer {
    pub base_url: String,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ImageServer {
    pub fn spawn() -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start image server");
        let addr = server.server_addr();
        let base_url = format!("http://{addr}");

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let path = request.url().to_string();
                let body = match path.as_str() {
                    "/fake" => Some(b"OK".to_vec()),
                    "/broken" => Some(b"\x89PNG but not really".to_vec()),
                    _ => image_route(&path),
                };

                let response = match body {
                    Some(bytes) => tiny_http::Response::from_data(bytes).with_status_code(200),
                    None => tiny_http::Response::from_data(b"not found".to_vec())
                        .with_status_code(404),
                };
                let _ = request.respond(response);
            }
        });

        Self {
            base_url,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn image(&self, width: u32, height: u32) -> String {
        format!("{}/img/{}x{}.png", self.base_url, width, height)
    }

    pub fn alpha_image(&self, width: u32, height: u32) -> String {
        format!("{}/alpha/{}x{}.png", self.base_url, width, height)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for ImageServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn image_route(path: &str) -> Option<Vec<u8>> {
    let (kind, rest) = path.trim_start_matches('/').split_once('/')?;
    let (width, height) = rest.strip_suffix(".png")?.split_once('x')?;
    let (width, height) = (width.parse().ok()?, height.parse().ok()?);
    match kind {
        "img" => Some(png(width, height)),
        "alpha" => Some(rgba_png(width, height)),
        _ => None,
    }
}

/// Adapter serving a fixed series `Foo` at [`SERIES_LINK`].
///
/// Chapter `n` lives at `<SERIES_LINK>chapter-<n>` and is titled
/// `Chapter <n>`. Chapters marked failing answer every page request
/// with a 503.
pub struct ScriptedSource {
    chapters: Vec<(String, Vec<String>)>,
    failing: Vec<String>,
    page_requests: Mutex<HashMap<String, usize>>,
}

impl ScriptedSource {
    /// One chapter per entry of `images`, numbered from 1.
    pub fn new(images: Vec<Vec<String>>) -> Self {
        let chapters = images
            .into_iter()
            .enumerate()
            .map(|(i, urls)| (chapter_link(i + 1), urls))
            .collect();

        Self {
            chapters,
            failing: Vec::new(),
            page_requests: Mutex::new(HashMap::new()),
        }
    }

    /// Makes chapter `number` fail on every attempt.
    pub fn failing(mut self, number: usize) -> Self {
        self.failing.push(chapter_link(number));
        self
    }

    /// How many times the page of `link` was requested.
    pub fn page_requests(&self, link: &str) -> usize {
        self.page_requests
            .lock()
            .unwrap()
            .get(link)
            .copied()
            .unwrap_or(0)
    }
}

pub fn chapter_link(number: usize) -> String {
    format!("{}chapter-{}", SERIES_LINK, number)
}

#[async_trait]
impl SourceAdapter for ScriptedSource {
    fn platform(&self) -> &'static str {
        PLATFORM
    }

    fn referer(&self) -> &str {
        "https://example.com"
    }

    fn is_series_link(&self, link: &str) -> bool {
        link == SERIES_LINK
    }

    fn is_chapter_link(&self, link: &str) -> bool {
        link.starts_with(SERIES_LINK) && link.contains("/chapter-")
    }

    async fn list_chapter_links(&self, _series_link: &str) -> Result<SeriesIndex, ScraperError> {
        Ok(SeriesIndex {
            title: SERIES_NAME.to_string(),
            chapter_links: self.chapters.iter().map(|(link, _)| link.clone()).collect(),
        })
    }

    async fn fetch_chapter_page(&self, chapter_link: &str) -> Result<ChapterPage, ScraperError> {
        *self
            .page_requests
            .lock()
            .unwrap()
            .entry(chapter_link.to_string())
            .or_default() += 1;

        if self.failing.iter().any(|l| l == chapter_link) {
            return Err(ScraperError::Status {
                status: 503,
                url: chapter_link.to_string(),
            });
        }
        Ok(ChapterPage::new(chapter_link, ""))
    }

    fn extract_image_urls(&self, page: &ChapterPage) -> Result<Vec<String>, ScraperError> {
        self.chapters
            .iter()
            .find(|(link, _)| *link == page.link)
            .map(|(_, urls)| urls.clone())
            .ok_or_else(|| ScraperError::ElementNotFound(page.link.clone()))
    }

    fn resolve_titles(&self, page: &ChapterPage) -> Result<ChapterTitles, ScraperError> {
        let number = page
            .link
            .rsplit('-')
            .next()
            .ok_or_else(|| ScraperError::ParseError(page.link.clone()))?;

        Ok(ChapterTitles {
            series: SERIES_NAME.to_string(),
            chapter: format!("Chapter {}", number),
        })
    }
}

/// Client for the local image server; environment proxies are ignored.
pub fn local_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(ScrapingConfig::default().request_timeout())
        .build()
        .expect("build client")
}

pub fn pipeline(root: &Path, force: bool) -> Pipeline {
    let scraping = ScrapingConfig::default();
    let fetcher = Fetcher::new(local_client(), scraping.image_workers, ImageBoundsConfig::default());
    let retry = RetryConfig {
        delay_sec: 0.0,
        ..Config::default().retry
    };
    Pipeline::new(Layout::new(root), fetcher, retry, force)
}

pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

pub fn archive_entries(path: &Path) -> Vec<String> {
    let mut archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
    (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect()
}
