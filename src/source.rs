//! The paginated listing endpoint, live or replayed from a capture.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::Settings;
use crate::error::{LoadError, SourceError};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/139.0.0.0 Safari/537.36";

/// One page of the listing as the server reported it.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingPage {
    /// Table-row markup, possibly empty.
    pub rows: String,
    pub success: bool,
    pub has_more: bool,
}

impl ListingPage {
    /// Read `{"success": .., "data": {"rows": "..", "has_more": ..}}`.
    pub fn from_payload(page: u32, payload: &Value) -> Result<Self, SourceError> {
        let obj = payload.as_object().ok_or_else(|| SourceError::ResponseFormat {
            page,
            message: format!("expected a JSON object, got {}", kind(payload)),
        })?;
        let data = obj.get("data").and_then(Value::as_object);
        Ok(ListingPage {
            rows: data
                .and_then(|d| d.get("rows"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            success: obj.get("success").is_some_and(truthy),
            has_more: data.and_then(|d| d.get("has_more")).is_some_and(truthy),
        })
    }
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty() && s != "0" && !s.eq_ignore_ascii_case("false"),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::Null => false,
    }
}

fn kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

pub trait ListingSource {
    fn fetch(&mut self, page: u32, per_page: u32) -> Result<ListingPage, SourceError>;
}

/// Raw responses appended to a JSON array file, in the same shape
/// [`ReplaySource`] reads back.
struct ResponseDump {
    path: PathBuf,
    pages: Vec<Value>,
}

impl ResponseDump {
    fn record(&mut self, payload: Value) {
        self.pages.push(payload);
        if let Err(e) = self.flush() {
            warn!(path = %self.path.display(), "Could not write response dump: {:#}", e);
        }
    }

    fn flush(&self) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let file = std::fs::File::create(&self.path)?;
        serde_json::to_writer_pretty(std::io::BufWriter::new(file), &self.pages)?;
        Ok(())
    }
}

/// Status and body of one listing POST.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub body: String,
}

/// One attempt at the listing form. `relaxed` asks for a client that skips
/// certificate verification. `Err` is a transport failure message.
pub trait Poster {
    fn post(&mut self, page: u32, per_page: u32, relaxed: bool) -> Result<Reply, String>;
}

/// The admin-ajax form over reqwest.
pub struct FormPoster {
    url: String,
    nonce: String,
    timeout: Duration,
    client: Client,
    relaxed: bool,
}

impl FormPoster {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = build_client(&settings.ajax_url, settings.timeout(), false)
            .context("Failed to build HTTP client")?;
        Ok(FormPoster {
            url: settings.ajax_url.clone(),
            nonce: settings.nonce.clone(),
            timeout: settings.timeout(),
            client,
            relaxed: false,
        })
    }
}

impl Poster for FormPoster {
    fn post(&mut self, page: u32, per_page: u32, relaxed: bool) -> Result<Reply, String> {
        let chain = |e: reqwest::Error| format!("{:#}", anyhow::Error::from(e));
        if relaxed && !self.relaxed {
            self.client = build_client(&self.url, self.timeout, true).map_err(chain)?;
            self.relaxed = true;
        }
        let page = page.to_string();
        let per_page = per_page.to_string();
        let resp = self
            .client
            .post(&self.url)
            .form(&[
                ("action", "filter_projects"),
                ("nonce", self.nonce.as_str()),
                ("page", page.as_str()),
                ("per_page", per_page.as_str()),
                ("region", ""),
                ("year", ""),
                ("type_of_work", ""),
                ("municipality", ""),
                ("search_itm", ""),
            ])
            .send()
            .map_err(chain)?;
        let status = resp.status().as_u16();
        let body = resp.text().map_err(chain)?;
        Ok(Reply { status, body })
    }
}

/// admin-ajax over HTTPS. The first transport failure switches, for the rest
/// of the run, to a client that skips certificate verification; a second one
/// is final.
pub struct HttpListingSource<P = FormPoster> {
    poster: P,
    relaxed: bool,
    dump: Option<ResponseDump>,
}

impl HttpListingSource<FormPoster> {
    pub fn new(settings: &Settings) -> Result<Self> {
        let dump = settings.ajax_dump_path.clone().map(|path| ResponseDump {
            path,
            pages: Vec::new(),
        });
        Ok(HttpListingSource::with_poster(FormPoster::new(settings)?, dump))
    }
}

impl<P: Poster> HttpListingSource<P> {
    fn with_poster(poster: P, dump: Option<ResponseDump>) -> Self {
        HttpListingSource {
            poster,
            relaxed: false,
            dump,
        }
    }

    fn send(&mut self, page: u32, per_page: u32) -> Result<Reply, SourceError> {
        let transport = |message: String| SourceError::Transport { page, message };
        match self.poster.post(page, per_page, self.relaxed) {
            Ok(reply) => Ok(reply),
            Err(e) if !self.relaxed => {
                warn!(page, "Request failed ({}), retrying without certificate verification", e);
                self.relaxed = true;
                self.poster.post(page, per_page, true).map_err(transport)
            }
            Err(e) => Err(transport(e)),
        }
    }
}

impl<P: Poster> ListingSource for HttpListingSource<P> {
    fn fetch(&mut self, page: u32, per_page: u32) -> Result<ListingPage, SourceError> {
        let reply = self.send(page, per_page)?;
        if !(200..300).contains(&reply.status) {
            return Err(SourceError::Status {
                page,
                status: reply.status,
            });
        }
        let body = &reply.body;
        let payload: Value = serde_json::from_str(body).map_err(|e| SourceError::ResponseFormat {
            page,
            message: format!("{} (body starts {:?})", e, body.chars().take(120).collect::<String>()),
        })?;
        let listing = ListingPage::from_payload(page, &payload)?;
        if let Some(dump) = self.dump.as_mut() {
            dump.record(payload);
        }
        debug!(page, bytes = listing.rows.len(), has_more = listing.has_more, "listing page fetched");
        Ok(listing)
    }
}

fn build_client(url: &str, timeout: Duration, relaxed: bool) -> reqwest::Result<Client> {
    Client::builder()
        .timeout(timeout)
        .default_headers(browser_headers(url))
        .danger_accept_invalid_certs(relaxed)
        .build()
}

fn browser_headers(url: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::ACCEPT, HeaderValue::from_static("*/*"));
    headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));
    headers.insert(
        HeaderName::from_static("x-requested-with"),
        HeaderValue::from_static("XMLHttpRequest"),
    );
    if let Some(origin) = origin_of(url) {
        if let Ok(v) = HeaderValue::from_str(&origin) {
            headers.insert(header::ORIGIN, v);
        }
        if let Ok(v) = HeaderValue::from_str(&format!("{}/", origin)) {
            headers.insert(header::REFERER, v);
        }
    }
    headers
}

fn origin_of(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    parsed.host_str()?;
    Some(parsed.origin().ascii_serialization())
}

/// Pages served from a captured array of admin-ajax responses.
pub struct ReplaySource {
    pages: Vec<Value>,
}

impl ReplaySource {
    pub fn new(pages: Vec<Value>) -> Self {
        ReplaySource { pages }
    }

    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let raw = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let pages = serde_json::from_str(&raw).map_err(|source| LoadError::Json {
            path: path.display().to_string(),
            source,
        })?;
        Ok(ReplaySource::new(pages))
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }
}

impl ListingSource for ReplaySource {
    fn fetch(&mut self, page: u32, _per_page: u32) -> Result<ListingPage, SourceError> {
        let payload = (page as usize)
            .checked_sub(1)
            .and_then(|i| self.pages.get(i))
            .ok_or_else(|| SourceError::ResponseFormat {
                page,
                message: format!("capture holds {} pages", self.pages.len()),
            })?;
        ListingPage::from_payload(page, payload)
    }
}

// ── Tests ──
