//! Core data model shared by every component: `spec.md` §3.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// An absolute, fragment-free `http`/`https` URL.
///
/// The only way to build one is [`NormalizedUrl::parse`] /
/// [`NormalizedUrl::resolve`], which enforce Inv-1 and Inv-2 from
/// `spec.md` §3 at construction time: `data:`/`blob:` and any other
/// non-http(s) scheme is rejected rather than normalized.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NormalizedUrl(Url);

impl NormalizedUrl {
    /// Resolve `raw` against `base` (if any) and normalize it.
    ///
    /// Returns `None` for empty input, unresolvable relatives, or schemes
    /// other than `http`/`https`. The fragment is always stripped.
    pub fn resolve(base: Option<&Url>, raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        let url = match base {
            Some(base) => base.join(raw).ok()?,
            None => Url::parse(raw).ok()?,
        };
        Self::from_url(url)
    }

    /// Normalize an already-parsed URL.
    pub fn from_url(mut url: Url) -> Option<Self> {
        if url.scheme() != "http" && url.scheme() != "https" {
            return None;
        }
        url.set_fragment(None);
        Some(NormalizedUrl(url))
    }

    pub fn as_url(&self) -> &Url {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn into_url(self) -> Url {
        self.0
    }
}

impl fmt::Display for NormalizedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for NormalizedUrl {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        self.0.as_str().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for NormalizedUrl {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let url = Url::parse(&raw).map_err(serde::de::Error::custom)?;
        NormalizedUrl::from_url(url).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "not an absolute http(s) url: {raw}"
            ))
        })
    }
}

/// Which surface observed a URL. Used downstream to classify api-like
/// traffic vs file resources, and to break ties when a URL is observed
/// through more than one surface (see [`RequestSource::specificity`]).
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RequestSource {
    Resource,
    Img,
    Css,
    Fetch,
    Xhr,
    Unknown,
}

impl RequestSource {
    /// Higher is more specific. `spec.md` §9's open question ("two
    /// observations for one URL") is resolved by preferring the more
    /// specific source — see Design Decision DD-1 in `DESIGN.md`.
    fn specificity(self) -> u8 {
        match self {
            RequestSource::Fetch | RequestSource::Xhr => 3,
            RequestSource::Img => 2,
            RequestSource::Css => 1,
            RequestSource::Resource => 0,
            RequestSource::Unknown => 0,
        }
    }

    /// Whether `self` should replace `existing` as the record's source.
    pub fn supersedes(self, existing: RequestSource) -> bool {
        self.specificity() > existing.specificity()
    }
}

impl fmt::Display for RequestSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RequestSource::Resource => "resource",
            RequestSource::Img => "img",
            RequestSource::Css => "css",
            RequestSource::Fetch => "fetch",
            RequestSource::Xhr => "xhr",
            RequestSource::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// Inferred kind of a resource. `spec.md` §4.1.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Html,
    Css,
    Js,
    Img,
    Font,
    Media,
    Json,
    Unknown,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceKind::Html => "html",
            ResourceKind::Css => "css",
            ResourceKind::Js => "js",
            ResourceKind::Img => "img",
            ResourceKind::Font => "font",
            ResourceKind::Media => "media",
            ResourceKind::Json => "json",
            ResourceKind::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// Text vs base64 body encoding, per `spec.md` §4.1's
/// `resolveBodyEncoding`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyEncoding {
    Text,
    Base64,
}

/// A URL observed through one interception surface, before it's been
/// folded into a [`RequestRecord`] by the crawl engine. Produced by both
/// the static DOM walk and the dynamic script harness (`spec.md` §4.4
/// / §4.5), which is why it lives here rather than in either module.
#[derive(Clone, Debug)]
pub struct Observation {
    pub raw_url: String,
    pub source: RequestSource,
}

/// Captured body + metadata for one HTTP response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub status: u16,
    pub status_text: String,
    /// Last-write-wins on case-insensitive header name collision.
    pub headers: HashMap<String, String>,
    pub body: String,
    pub body_encoding: BodyEncoding,
}

/// One logical HTTP request seen or synthesized during a Run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RequestRecord {
    pub url: NormalizedUrl,
    pub method: String,
    pub source: RequestSource,
    pub timestamp: DateTime<Utc>,
    pub referrer: Option<NormalizedUrl>,
    pub response: Option<ResponseRecord>,
    pub error: Option<String>,
}

impl RequestRecord {
    pub fn new(
        url: NormalizedUrl,
        source: RequestSource,
        referrer: Option<NormalizedUrl>,
    ) -> Self {
        RequestRecord {
            url,
            method: "GET".to_string(),
            source,
            timestamp: Utc::now(),
            referrer,
            response: None,
            error: None,
        }
    }

    /// Inv-2: at most one of `response`/`error` is ever set.
    pub fn attach_response(&mut self, response: ResponseRecord) {
        self.error = None;
        self.response = Some(response);
    }

    pub fn attach_error(&mut self, error: impl Into<String>) {
        if self.response.is_none() {
            self.error = Some(error.into());
        }
    }
}

/// Output of a Run: `spec.md` §3's `Snapshot`.
///
/// `url` is a plain `String`, not a [`NormalizedUrl`]: a Run's input may
/// be inline HTML with no absolute root URL at all (`spec.md` §6 — the
/// `input` heuristic), so this field can't carry the same "absolute
/// http(s)" guarantee `RequestRecord::url` does. See Design Decision
/// DD-4 in `DESIGN.md`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Snapshot {
    pub url: String,
    pub title: Option<String>,
    pub captured_at: DateTime<Utc>,
    pub requests: Vec<RequestRecord>,
}

impl Snapshot {
    /// `networkRecords`: requests that captured a response.
    pub fn network_records(&self) -> Vec<&RequestRecord> {
        self.requests
            .iter()
            .filter(|r| r.response.is_some())
            .collect()
    }

    /// `resources`: every request regardless of outcome, kept for parity
    /// with the on-disk format in `spec.md` §6.
    pub fn resources(&self) -> &[RequestRecord] {
        &self.requests
    }
}

/// Append-only list of [`RequestRecord`]s plus a URL index, for dedup and
/// in-place `response`/`error` updates. `spec.md` §3's `RequestTable`.
#[derive(Debug, Default)]
pub struct RequestTable {
    records: Vec<RequestRecord>,
    index: HashMap<NormalizedUrl, usize>,
}

impl RequestTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observation of `url` through `source`.
    ///
    /// Inv-4's "first observation fixes the record" is resolved for the
    /// two-observations-one-URL case (`spec.md` §9's open question) by
    /// Design Decision DD-1: a later observation upgrades `source` only
    /// when it is strictly more specific (see
    /// [`RequestSource::supersedes`]), and never touches
    /// `response`/`error`.
    pub fn record_url(
        &mut self,
        url: NormalizedUrl,
        source: RequestSource,
        referrer: Option<NormalizedUrl>,
    ) {
        if let Some(&idx) = self.index.get(&url) {
            let record = &mut self.records[idx];
            if source.supersedes(record.source) {
                record.source = source;
            }
        } else {
            let idx = self.records.len();
            self.index.insert(url.clone(), idx);
            self.records.push(RequestRecord::new(url, source, referrer));
        }
    }

    pub fn attach_response(
        &mut self,
        url: &NormalizedUrl,
        response: ResponseRecord,
    ) {
        if let Some(&idx) = self.index.get(url) {
            self.records[idx].attach_response(response);
        }
    }

    pub fn attach_error(&mut self, url: &NormalizedUrl, error: impl Into<String>) {
        if let Some(&idx) = self.index.get(url) {
            self.records[idx].attach_error(error);
        }
    }

    pub fn contains(&self, url: &NormalizedUrl) -> bool {
        self.index.contains_key(url)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<RequestRecord> {
        self.records
    }
}

/// FIFO work queue of `(url, kind)` pairs, deduplicated by URL alone
/// (first kind wins) irrespective of how many times that URL is
/// re-discovered. `spec.md` §3's `CrawlQueue`.
#[derive(Debug, Default)]
pub struct CrawlQueue {
    queue: std::collections::VecDeque<(NormalizedUrl, ResourceKind)>,
    seen: std::collections::HashSet<NormalizedUrl>,
}

impl CrawlQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// `spec.md` §4.7's `enqueue`: no-op if `url` has already been
    /// enqueued (by any kind).
    pub fn enqueue(&mut self, url: NormalizedUrl, kind: ResourceKind) {
        if self.seen.insert(url.clone()) {
            self.queue.push_back((url, kind));
        }
    }

    pub fn pop(&mut self) -> Option<(NormalizedUrl, ResourceKind)> {
        self.queue.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
