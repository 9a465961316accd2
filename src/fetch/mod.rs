// src/fetch/mod.rs

//! Download collaborator: index page → spreadsheet file → raw table.

pub mod xlsx;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use reqwest::blocking::Client;
use scraper::{Html, Selector};
use std::{
    fs,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};
use tracing::{info, warn};
use url::Url;

use crate::config::{IndexConfig, PipelineConfig};
use crate::process::RawTable;

static DOWNLOAD_LINK: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a.download").expect("CSS selector for download links should be valid"));
static ANY_LINK: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("CSS selector for links should be valid"));

const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xls", "ods"];

/// Fetches one index's spreadsheet to a local file.
pub trait Downloader {
    fn download(&self, index: &IndexConfig) -> Result<PathBuf>;
}

/// Yields one index's raw extract. This is the seam the pipeline depends on;
/// tests plug in synthetic tables here.
pub trait SpreadsheetSource {
    fn fetch(&self, index: &IndexConfig) -> Result<RawTable>;
}

/// Finds the spreadsheet link on an index page: the first `a.download`, else
/// the first link whose path ends in a spreadsheet extension.
pub fn find_download_link(html: &str, base: &Url) -> Option<Url> {
    let doc = Html::parse_document(html);
    let resolve = |href: &str| base.join(href).ok();

    if let Some(url) = doc
        .select(&DOWNLOAD_LINK)
        .filter_map(|e| e.value().attr("href"))
        .find_map(resolve)
    {
        return Some(url);
    }
    doc.select(&ANY_LINK)
        .filter_map(|e| e.value().attr("href"))
        .filter_map(resolve)
        .find(|u| spreadsheet_extension(u).is_some())
}

fn spreadsheet_extension(url: &Url) -> Option<&'static str> {
    let last = url.path_segments()?.last()?.to_lowercase();
    let ext = Path::new(&last).extension()?.to_str()?.to_string();
    SPREADSHEET_EXTENSIONS.iter().copied().find(|e| *e == ext)
}

/// Blocking HTTP downloader: scrape the index page, then fetch the file.
pub struct HttpDownloader {
    client: Client,
    download_dir: PathBuf,
}

impl HttpDownloader {
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        fs::create_dir_all(&config.download_dir).with_context(|| {
            format!("creating download directory {}", config.download_dir.display())
        })?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .cookie_store(true)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            client,
            download_dir: config.download_dir.clone(),
        })
    }

    fn resolve_link(&self, index: &IndexConfig) -> Result<Url> {
        if let Some(direct) = &index.download_url {
            return Url::parse(direct).with_context(|| format!("parsing {}", direct));
        }
        let page = Url::parse(&index.source_url)
            .with_context(|| format!("parsing source URL {}", index.source_url))?;
        let html = self
            .client
            .get(page.clone())
            .send()
            .with_context(|| format!("GET {}", page))?
            .error_for_status()?
            .text()
            .with_context(|| format!("reading body from {}", page))?;
        find_download_link(&html, &page)
            .with_context(|| format!("no spreadsheet link found on {}", page))
    }
}

impl Downloader for HttpDownloader {
    #[tracing::instrument(level = "info", skip(self, index), fields(index = %index.name))]
    fn download(&self, index: &IndexConfig) -> Result<PathBuf> {
        let start = Instant::now();
        let link = self.resolve_link(index)?;
        info!(url = %link, "downloading");

        let bytes = self
            .client
            .get(link.clone())
            .send()
            .with_context(|| format!("GET {}", link))?
            .error_for_status()?
            .bytes()
            .with_context(|| format!("reading body from {}", link))?;

        let ext = spreadsheet_extension(&link).unwrap_or("xlsx");
        let dest = self.download_dir.join(format!("{}.{}", index.name, ext));
        fs::write(&dest, &bytes).with_context(|| format!("writing {}", dest.display()))?;
        info!(path = %dest.display(), bytes = bytes.len(), elapsed = ?start.elapsed(), "downloaded");
        Ok(dest)
    }
}

/// Download, read the configured sheet, remove the file.
pub struct XlsxSource<D: Downloader> {
    downloader: D,
}

impl<D: Downloader> XlsxSource<D> {
    pub fn new(downloader: D) -> Self {
        Self { downloader }
    }
}

impl<D: Downloader> SpreadsheetSource for XlsxSource<D> {
    fn fetch(&self, index: &IndexConfig) -> Result<RawTable> {
        let path = self.downloader.download(index)?;
        let table = xlsx::read_sheet(&path, index);
        if let Err(e) = fs::remove_file(&path) {
            warn!(path = %path.display(), "failed to delete download: {}", e);
        }
        table
    }
}
