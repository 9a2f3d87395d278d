//! Recursive crawl engine: `spec.md` §4.7 (C7).
//!
//! Drives the whole Run: seeds the queue with the root document, then
//! repeatedly pops a `(url, kind)` pair and dispatches it to a
//! kind-specific drain that fetches the body, records it, and pushes
//! any URLs it discovers back onto the queue, until the queue is empty.
//! `spec.md` §3's Inv-5: a Run terminates iff `CrawlQueue` is empty and
//! no in-flight fetch remains — no resource cap of any kind.

use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::analyzer::{self, AnalyzeInput};
use crate::http_cache::SharedHttpCache;
use crate::model::{
    BodyEncoding, NormalizedUrl, Observation, RequestSource, RequestTable,
    ResourceKind, ResponseRecord,
};
use crate::url::infer_kind_hint;

/// `spec.md` §4.7's crawl-wide knobs, owned by [`crate::Lighterceptor`]
/// and threaded down into `drain` unchanged for the lifetime of a Run.
#[derive(Clone, Debug)]
pub struct CrawlOptions {
    pub settle_time: Duration,
    /// Whether `drain` walks the queue the root analysis seeds, or
    /// stops after recording the root document's own observations.
    /// `spec.md` §6's `recursion` option on `Lighterceptor` — set to
    /// `false`, a Run records what the root document statically and
    /// dynamically reveals without fetching any of it.
    pub recursive: bool,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        CrawlOptions {
            settle_time: Duration::from_millis(200),
            recursive: true,
        }
    }
}

/// A quoted string literal immediately following `import`, `from`,
/// `require(`, or `fetch(`, scanned for inside fetched-but-unexecuted
/// script bodies (e.g. a Worker script, or a script this crate's own
/// dynamic harness never runs) so the obvious cases — `import
/// "./feature.js"`, `fetch("https://example.com/api/data")` — still
/// surface even without running the script. `spec.md` §4.7 calls this
/// "a lightweight import/require/fetch-literal regex pass"; it is
/// deliberately shallow and not a substitute for the dynamic harness.
static JS_URL_LITERAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:\bimport\s+|\bfrom\s+|\brequire\(\s*|\bfetch\(\s*)["']([^"']+)["']"#)
        .unwrap()
});

pub struct CrawlEngine<'a> {
    cache: SharedHttpCache,
    table: RequestTable,
    options: &'a CrawlOptions,
    title: Option<String>,
}

impl<'a> CrawlEngine<'a> {
    pub fn new(cache: SharedHttpCache, options: &'a CrawlOptions) -> Self {
        CrawlEngine {
            cache,
            table: RequestTable::new(),
            options,
            title: None,
        }
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn into_table(self) -> RequestTable {
        self.table
    }

    /// Run the crawl to completion: analyze `root_html` at `base_url`,
    /// then drain the resulting queue until it's empty (`spec.md` §3's
    /// Inv-5).
    ///
    /// `root_response` is `Some` only when the root document was
    /// itself fetched as an HTTP resource (a URL Run) — it then
    /// becomes the root's own `RequestRecord`. When the root is inline
    /// HTML with no real request behind it, `base_url` is used purely
    /// to resolve relative references and no root record is created.
    pub async fn drain(
        &mut self,
        root_html: &str,
        base_url: Url,
        root_response: Option<ResponseRecord>,
    ) -> anyhow::Result<()> {
        let root_url = NormalizedUrl::from_url(base_url.clone());
        if let (Some(ref root_url), Some(response)) =
            (&root_url, root_response)
        {
            self.table.record_url(
                root_url.clone(),
                RequestSource::Resource,
                None,
            );
            self.table.attach_response(root_url, response);
        }

        let mut queue = crate::model::CrawlQueue::new();
        let analysis = analyzer::analyze_html(AnalyzeInput {
            html: root_html.to_string(),
            base_url: base_url.clone(),
            settle_time: self.options.settle_time,
            want_title: true,
        })
        .await?;
        self.title = analysis.title;
        for warning in &analysis.warnings {
            log::warn!("root document analysis warning: {warning}");
        }
        self.ingest(
            analysis.observations,
            Some(&base_url),
            root_url.as_ref(),
            &mut queue,
        );

        if self.options.recursive {
            while let Some((url, kind)) = queue.pop() {
                self.drain_one(url, kind, root_url.as_ref(), &mut queue).await;
            }
        }

        Ok(())
    }

    async fn drain_one(
        &mut self,
        url: NormalizedUrl,
        kind: ResourceKind,
        referrer: Option<&NormalizedUrl>,
        queue: &mut crate::model::CrawlQueue,
    ) {
        let result = self.cache.fetch(&url).await;

        if !result.ok {
            let message = result
                .error
                .clone()
                .unwrap_or_else(|| "fetch failed".to_string());
            self.table.attach_error(&url, message);
            return;
        }

        let body_encoding = result.body_encoding.unwrap_or(BodyEncoding::Base64);
        let body = crate::url::encode_body(
            result.buffer.as_deref().unwrap_or_default(),
            result.text.as_deref(),
            body_encoding,
        );
        self.table.attach_response(
            &url,
            ResponseRecord {
                status: result.status.unwrap_or_default(),
                status_text: result.status_text.clone().unwrap_or_default(),
                headers: result.headers.clone(),
                body,
                body_encoding,
            },
        );

        let Some(text) = result.text.as_deref() else {
            return;
        };

        let effective_kind = if matches!(kind, ResourceKind::Unknown) {
            infer_kind_hint(RequestSource::Resource, &url)
        } else {
            kind
        };

        match effective_kind {
            ResourceKind::Css => self.drain_css(&url, text, referrer, queue),
            ResourceKind::Html => self.drain_html(&url, text, queue).await,
            ResourceKind::Js => self.drain_js(&url, text, queue),
            _ => {}
        }
    }

    fn drain_css(
        &mut self,
        css_url: &NormalizedUrl,
        css_text: &str,
        _referrer: Option<&NormalizedUrl>,
        queue: &mut crate::model::CrawlQueue,
    ) {
        for discovered in
            crate::css::extract_css_urls(css_text, Some(css_url.as_url()))
        {
            let kind = infer_kind_hint(RequestSource::Css, &discovered);
            self.table.record_url(
                discovered.clone(),
                RequestSource::Css,
                Some(css_url.clone()),
            );
            queue.enqueue(discovered, kind);
        }
    }

    async fn drain_html(
        &mut self,
        doc_url: &NormalizedUrl,
        html_text: &str,
        queue: &mut crate::model::CrawlQueue,
    ) {
        let analysis = match analyzer::analyze_html(AnalyzeInput {
            html: html_text.to_string(),
            base_url: doc_url.as_url().clone(),
            settle_time: self.options.settle_time,
            want_title: false,
        })
        .await
        {
            Ok(analysis) => analysis,
            Err(err) => {
                log::warn!("nested document analysis failed for {doc_url}: {err}");
                return;
            }
        };
        for warning in &analysis.warnings {
            log::warn!("{doc_url} analysis warning: {warning}");
        }
        self.ingest(
            analysis.observations,
            Some(doc_url.as_url()),
            Some(doc_url),
            queue,
        );
    }

    /// Best-effort scan of a fetched-but-unexecuted script body (e.g. a
    /// Worker script the dynamic harness never runs) for URL-shaped
    /// string literals. `spec.md` §4.7 — deliberately shallow; anything
    /// the dynamic harness already saw is deduplicated downstream by
    /// [`RequestTable`].
    fn drain_js(
        &mut self,
        script_url: &NormalizedUrl,
        js_text: &str,
        queue: &mut crate::model::CrawlQueue,
    ) {
        for capture in JS_URL_LITERAL.captures_iter(js_text) {
            let raw = &capture[1];
            if let Some(discovered) =
                NormalizedUrl::resolve(Some(script_url.as_url()), raw)
            {
                let kind =
                    infer_kind_hint(RequestSource::Resource, &discovered);
                self.table.record_url(
                    discovered.clone(),
                    RequestSource::Resource,
                    Some(script_url.clone()),
                );
                queue.enqueue(discovered, kind);
            }
        }
    }

    fn ingest(
        &mut self,
        observations: Vec<Observation>,
        base_url: Option<&Url>,
        referrer: Option<&NormalizedUrl>,
        queue: &mut crate::model::CrawlQueue,
    ) {
        for observation in observations {
            let Some(url) =
                NormalizedUrl::resolve(base_url, &observation.raw_url)
            else {
                continue;
            };
            let kind = infer_kind_hint(observation.source, &url);
            self.table.record_url(
                url.clone(),
                observation.source,
                referrer.cloned(),
            );
            queue.enqueue(url, kind);
        }
    }
}
