//! HTTP cache client: `spec.md` §4.3 (C3).
//!
//! Single-flight, URL-keyed fetcher. Shared across a whole Run the way
//! the teacher shares `chromiumoxide`'s CDP session across a test run —
//! here the shared resource is a `reqwest::Client` plus a map of
//! in-flight futures rather than a browser tab, but the "one fetch per
//! URL, concurrent callers await the same result" contract is the same
//! shape as any single-flight cache.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, broadcast};

use crate::model::{BodyEncoding, NormalizedUrl};
use crate::url::{decode_text, resolve_body_encoding};

/// Outcome of a single-flight fetch. Never constructed directly by
/// callers other than [`HttpCache::fetch`].
#[derive(Clone, Debug)]
pub struct FetchResult {
    pub ok: bool,
    pub status: Option<u16>,
    pub status_text: Option<String>,
    pub headers: HashMap<String, String>,
    pub content_type: Option<String>,
    pub text: Option<String>,
    pub buffer: Option<Vec<u8>>,
    pub body_encoding: Option<BodyEncoding>,
    pub error: Option<String>,
}

impl FetchResult {
    fn failure(error: impl Into<String>) -> Self {
        FetchResult {
            ok: false,
            status: None,
            status_text: None,
            headers: HashMap::new(),
            content_type: None,
            text: None,
            buffer: None,
            body_encoding: None,
            error: Some(error.into()),
        }
    }
}

enum Slot {
    /// A fetch is in flight; subscribers await the broadcast.
    Pending(broadcast::Sender<FetchResult>),
    /// The fetch has completed; its result is cached for later callers.
    Done(FetchResult),
}

/// URL-keyed single-flight fetcher. Inv-3 from `spec.md` §3: at most one
/// concurrent fetch per URL.
pub struct HttpCache {
    client: Option<reqwest::Client>,
    slots: Mutex<HashMap<NormalizedUrl, Slot>>,
}

impl HttpCache {
    /// Build a cache backed by a real `reqwest::Client`.
    pub fn new() -> Self {
        HttpCache {
            client: reqwest::Client::builder().build().ok(),
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Build a cache with no HTTP client present — every fetch fails
    /// with `"fetch-unavailable"`, per `spec.md` §4.3. Used in
    /// environments (or tests) that want to exercise that path without
    /// making a client unreachable some other way.
    pub fn without_client() -> Self {
        HttpCache { client: None, slots: Mutex::new(HashMap::new()) }
    }

    /// Fetch `url`, sharing the in-flight future with any other caller
    /// currently fetching the same URL. Never panics or propagates a
    /// transport exception: failures are mapped to `ok=false`.
    pub async fn fetch(&self, url: &NormalizedUrl) -> FetchResult {
        let mut receiver = {
            let mut slots = self.slots.lock().await;
            match slots.get(url) {
                Some(Slot::Done(result)) => return result.clone(),
                Some(Slot::Pending(sender)) => sender.subscribe(),
                None => {
                    let (sender, receiver) = broadcast::channel(1);
                    slots.insert(
                        url.clone(),
                        Slot::Pending(sender.clone()),
                    );
                    drop(slots);
                    let result = self.perform_fetch(url).await;
                    let mut slots = self.slots.lock().await;
                    slots.insert(
                        url.clone(),
                        Slot::Done(result.clone()),
                    );
                    let _ = sender.send(result.clone());
                    return result;
                }
            }
        };
        receiver
            .recv()
            .await
            .unwrap_or_else(|_| FetchResult::failure("single-flight producer dropped"))
    }

    async fn perform_fetch(&self, url: &NormalizedUrl) -> FetchResult {
        let Some(client) = &self.client else {
            return FetchResult::failure("fetch-unavailable");
        };

        let response = match client.get(url.as_url().clone()).send().await {
            Ok(response) => response,
            Err(error) => return FetchResult::failure(error.to_string()),
        };

        let status = response.status().as_u16();
        let status_text = response
            .status()
            .canonical_reason()
            .unwrap_or("")
            .to_string();
        let mut headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.insert(name.as_str().to_string(), value.to_string());
            }
        }
        let content_type = headers.get("content-type").cloned();

        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(error) => return FetchResult::failure(error.to_string()),
        };

        let body_encoding = resolve_body_encoding(content_type.as_deref());
        let text = matches!(body_encoding, BodyEncoding::Text)
            .then(|| decode_text(&bytes, content_type.as_deref(), ""));

        FetchResult {
            ok: true,
            status: Some(status),
            status_text: Some(status_text),
            headers,
            content_type,
            text,
            buffer: Some(bytes.to_vec()),
            body_encoding: Some(body_encoding),
            error: None,
        }
    }
}

impl Default for HttpCache {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedHttpCache = Arc<HttpCache>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::routing::get;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn spawn_server(
        app: Router,
    ) -> (tokio::task::JoinHandle<()>, url::Url) {
        let listener =
            tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (handle, url::Url::parse(&format!("http://{addr}/")).unwrap())
    }

    #[tokio::test]
    async fn fetch_unavailable_without_client() {
        let cache = HttpCache::without_client();
        let url =
            NormalizedUrl::resolve(None, "https://example.com/a").unwrap();
        let result = cache.fetch(&url).await;
        assert!(!result.ok);
        assert_eq!(result.error.as_deref(), Some("fetch-unavailable"));
    }

    #[tokio::test]
    async fn fetch_captures_status_headers_and_body() {
        let app = Router::new().route(
            "/thing",
            get(|| async {
                (
                    [("content-type", "text/css")],
                    "body { color: red }",
                )
            }),
        );
        let (_handle, base) = spawn_server(app).await;
        let url = NormalizedUrl::resolve(Some(&base), "thing").unwrap();

        let cache = HttpCache::new();
        let result = cache.fetch(&url).await;
        assert!(result.ok);
        assert_eq!(result.status, Some(200));
        assert_eq!(result.text.as_deref(), Some("body { color: red }"));
        assert_eq!(result.body_encoding, Some(BodyEncoding::Text));
    }

    #[tokio::test]
    async fn concurrent_fetches_for_same_url_are_single_flight() {
        static HITS: AtomicUsize = AtomicUsize::new(0);
        let app = Router::new().route(
            "/counted",
            get(|| async {
                HITS.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(50))
                    .await;
                "ok"
            }),
        );
        let (_handle, base) = spawn_server(app).await;
        let url =
            NormalizedUrl::resolve(Some(&base), "counted").unwrap();

        let cache = Arc::new(HttpCache::new());
        let mut tasks = Vec::new();
        for _ in 0..5 {
            let cache = cache.clone();
            let url = url.clone();
            tasks.push(tokio::spawn(async move {
                cache.fetch(&url).await
            }));
        }
        for task in tasks {
            let result = task.await.unwrap();
            assert!(result.ok);
        }
        assert_eq!(HITS.load(Ordering::SeqCst), 1);
    }
}
