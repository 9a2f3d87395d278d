//! Lighterceptor: offline-snapshot resource interception engine.
//!
//! Given a URL or inline HTML, a [`Lighterceptor`] Run loads the
//! document inside a headless DOM harness, hooks every code path that
//! can reference a URL, recursively fetches CSS/JS/HTML resources it
//! discovers, and returns a de-duplicated, source-tagged [`Snapshot`].
//! It also ships the replay-patch contract ([`replay`]) that a
//! separately-built archive can install to resolve network calls
//! against that Snapshot offline.
//!
//! Nothing here installs a logger — library code logs through the
//! [`log`] facade only; callers (binaries, test harnesses) own
//! `env_logger::init()` or equivalent.

pub mod adapter;
pub mod analyzer;
pub mod crawl;
pub mod css;
pub mod dom;
pub mod error;
pub mod http_cache;
pub mod model;
pub mod replay;
pub mod url;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use ::url::Url as StdUrl;

use crate::crawl::{CrawlEngine, CrawlOptions};
use crate::error::{LighterceptorError, Result};
use crate::http_cache::HttpCache;
use crate::model::{BodyEncoding, ResponseRecord, Snapshot};

/// Configuration surface for a Run. `spec.md` §6's `Lighterceptor`
/// constructor options; there is no file-based config loader here —
/// `spec.md` explicitly assigns config loading to the (out of scope)
/// CLI layer, so this struct, constructed directly by the caller, is
/// the whole configuration story this crate owns.
#[derive(Clone, Debug)]
pub struct LighterceptorOptions {
    /// Whether discovered CSS/JS/HTML resources are recursively
    /// fetched and re-analyzed, or only the root document is recorded.
    pub recursion: bool,
    pub settle_time: Duration,
    /// Overrides the base URL used to resolve relative references,
    /// when `input` is inline HTML with no URL of its own.
    pub base_url: Option<String>,
}

impl Default for LighterceptorOptions {
    fn default() -> Self {
        LighterceptorOptions {
            recursion: true,
            settle_time: Duration::from_millis(50),
            base_url: None,
        }
    }
}

/// A single offline-snapshot Run. `spec.md` §6's `Lighterceptor` class.
///
/// `input` is either a fully-qualified URL or inline HTML — the same
/// heuristic `spec.md` uses: after trimming, input starting with `<` is
/// treated as HTML; everything else is resolved as a URL.
pub struct Lighterceptor {
    input: String,
    options: LighterceptorOptions,
}

impl Lighterceptor {
    pub fn new(input: impl Into<String>, options: LighterceptorOptions) -> Self {
        Lighterceptor {
            input: input.into(),
            options,
        }
    }

    /// Run to completion: analyze the root document, then (if
    /// `options.recursion`) drain every resource the analysis and
    /// subsequent fetches discover. Only rejects for unrecoverable
    /// root failures (`spec.md` §7's policy) — individual resource
    /// failures are captured into the returned [`Snapshot`] instead.
    pub async fn run(&self) -> Result<Snapshot> {
        let trimmed = self.input.trim();
        let is_inline_html = trimmed.starts_with('<');

        let cache = Arc::new(HttpCache::new());
        let crawl_options = CrawlOptions {
            settle_time: self.options.settle_time,
            recursive: self.options.recursion,
        };

        let (display_url, root_html, base_url, root_response) = if is_inline_html {
            let base_url = self
                .options
                .base_url
                .as_deref()
                .and_then(|raw| StdUrl::parse(raw).ok())
                .unwrap_or_else(|| {
                    StdUrl::parse("about:blank").expect("about:blank always parses")
                });
            let display_url = self
                .options
                .base_url
                .clone()
                .unwrap_or_else(|| "about:blank".to_string());
            (display_url, trimmed.to_string(), base_url, None)
        } else {
            let root_url = StdUrl::parse(trimmed).map_err(|err| {
                LighterceptorError::Other(format!("invalid input url: {err}"))
            })?;
            let body = cache
                .fetch(&model::NormalizedUrl::from_url(root_url.clone()).ok_or_else(|| {
                    LighterceptorError::Other(
                        "root url must be http(s)".to_string(),
                    )
                })?)
                .await;
            if !body.ok {
                return Err(LighterceptorError::Transport(
                    body.error.unwrap_or_else(|| "root fetch failed".to_string()),
                ));
            }
            let body_encoding = body.body_encoding.unwrap_or(BodyEncoding::Base64);
            let response_record = ResponseRecord {
                status: body.status.unwrap_or_default(),
                status_text: body.status_text.clone().unwrap_or_default(),
                headers: body.headers.clone(),
                body: crate::url::encode_body(
                    body.buffer.as_deref().unwrap_or_default(),
                    body.text.as_deref(),
                    body_encoding,
                ),
                body_encoding,
            };
            let html = body.text.unwrap_or_default();
            (root_url.to_string(), html, root_url, Some(response_record))
        };

        let mut engine = CrawlEngine::new(cache, &crawl_options);
        engine
            .drain(&root_html, base_url, root_response)
            .await
            .map_err(|err| LighterceptorError::Harness(err.to_string()))?;

        let title = engine.title().map(|t| t.to_string());
        let requests = engine.into_table().into_records();

        Ok(Snapshot {
            url: display_url,
            title,
            captured_at: Utc::now(),
            requests,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::routing::get;
    use std::net::SocketAddr;
    use tokio::net::TcpListener;

    async fn spawn_server(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    /// Boundary behavior from `spec.md` §8: empty HTML input yields a
    /// Snapshot with zero request records, a valid `captured_at`, and
    /// no panics/errors.
    #[tokio::test]
    async fn empty_inline_html_yields_empty_snapshot() {
        let engine = Lighterceptor::new(
            "",
            LighterceptorOptions {
                base_url: Some("https://example.com/".to_string()),
                ..Default::default()
            },
        );
        let snapshot = engine.run().await.unwrap();
        assert!(snapshot.requests.is_empty());
        assert!(snapshot.title.is_none());
    }

    #[tokio::test]
    async fn inline_html_is_detected_by_leading_angle_bracket() {
        let engine = Lighterceptor::new(
            "  <div style=\"background: url(https://example.com/x.png)\"></div>  ",
            LighterceptorOptions {
                base_url: Some("https://example.com/".to_string()),
                recursion: false,
                ..Default::default()
            },
        );
        let snapshot = engine.run().await.unwrap();
        assert!(
            snapshot
                .requests
                .iter()
                .any(|r| r.url.as_str() == "https://example.com/x.png")
        );
    }

    #[tokio::test]
    async fn url_input_fetches_the_root_document() {
        let router = Router::new().route(
            "/",
            get(|| async {
                axum::response::Html(
                    r#"<title>Hi</title><img src="/a.png">"#,
                )
            }),
        );
        let base = spawn_server(router).await;

        let engine = Lighterceptor::new(
            base.clone(),
            LighterceptorOptions {
                recursion: false,
                ..Default::default()
            },
        );
        let snapshot = engine.run().await.unwrap();
        assert_eq!(snapshot.title.as_deref(), Some("Hi"));
        assert!(
            snapshot
                .requests
                .iter()
                .any(|r| r.url.as_str().ends_with("/a.png"))
        );
        let root_record = snapshot
            .requests
            .iter()
            .find(|r| r.url.as_str() == format!("{base}/"))
            .expect("root document gets its own RequestRecord");
        let response = root_record
            .response
            .as_ref()
            .expect("root document's response is captured");
        assert_eq!(response.status, 200);
        assert!(response.body.contains("<title>Hi</title>"));
    }

    #[tokio::test]
    async fn unreachable_root_url_rejects_the_run() {
        let engine = Lighterceptor::new(
            "http://127.0.0.1:1/",
            LighterceptorOptions::default(),
        );
        let result = engine.run().await;
        assert!(result.is_err());
    }

    /// Boundary behavior from `spec.md` §8: `data:`/`blob:` URLs are
    /// never recorded.
    #[tokio::test]
    async fn data_and_blob_urls_are_never_recorded() {
        let engine = Lighterceptor::new(
            r#"<img src="data:image/png;base64,aGVsbG8="><video src="blob:https://example.com/uuid"></video>"#,
            LighterceptorOptions {
                base_url: Some("https://example.com/".to_string()),
                recursion: false,
                ..Default::default()
            },
        );
        let snapshot = engine.run().await.unwrap();
        assert!(snapshot.requests.is_empty());
    }
}
