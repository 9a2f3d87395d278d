//! `NetworkInterceptorAdapter` collaborator contract: `spec.md` §6.
//!
//! Out of scope per `spec.md` §1 ("the adapter facade ... that merely
//! streams Lighterceptor's records as normalized events") — this module
//! is the interface only, no implementation. It exists so a caller
//! wiring a real CDP/Puppeteer session in front of this crate has a
//! stable, documented shape to implement against, the same way the
//! teacher's `browser` module exposes trait boundaries for a CDP
//! transport without committing to a single client library.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;

/// What an adapter implementation can actually provide. A caller
/// inspects this before deciding which optional event fields to expect.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AdapterCapabilities {
    pub can_get_response_body: bool,
    pub can_stream_response_body: bool,
    pub can_get_request_body: bool,
    pub provides_resource_type: bool,
}

/// What an adapter is asked to attach to. `spec.md` §6's target kinds.
#[derive(Clone, Debug)]
pub enum AdapterTarget {
    Url(String),
    PuppeteerPage { page_handle: String },
    CdpTab { tab_id: String },
    CdpSession { session_id: String },
}

/// How a response body is made available to the caller.
#[derive(Clone, Debug)]
pub enum AdapterResponseBody {
    Buffer(Vec<u8>),
    /// A stream the adapter owns; callers are handed an opaque handle
    /// to read from, specific to the adapter implementation.
    Stream { handle: String },
    /// The body isn't available yet (still loading); a later event on
    /// the same `request_id` will carry it.
    Late,
}

/// One normalized event an adapter implementation emits via
/// `handlers.on_event`. `spec.md` §6's event order invariant: for a
/// given `request_id`, `Request` precedes `Response`/`Failed`; a
/// `request_id` appears at most once across `Response`+`Failed`
/// combined.
#[derive(Clone, Debug)]
pub enum AdapterEvent {
    Request {
        request_id: String,
        url: String,
        method: String,
        headers: HashMap<String, String>,
        resource_type: Option<String>,
        timestamp: DateTime<Utc>,
    },
    Response {
        request_id: String,
        url: String,
        status: u16,
        status_text: Option<String>,
        headers: HashMap<String, String>,
        mime_type: Option<String>,
        timestamp: DateTime<Utc>,
        body: Option<AdapterResponseBody>,
    },
    Failed {
        request_id: String,
        url: String,
        error_text: String,
        timestamp: DateTime<Utc>,
    },
}

/// Callbacks an adapter implementation drives during a session.
pub trait AdapterHandlers: Send + Sync {
    fn on_event(&self, event: AdapterEvent);
}

/// A running adapter session, returned by
/// [`NetworkInterceptorAdapter::start`]. Dropping it without calling
/// `stop` is implementation-defined; callers should always call `stop`
/// explicitly.
pub trait AdapterSession: Send {
    fn stop(self: Box<Self>) -> BoxFuture<'static, anyhow::Result<()>>;
}

/// `spec.md` §6's `NetworkInterceptorAdapter` interface. Not
/// implemented by this crate — Lighterceptor's own interception
/// happens inside the embedded DOM harness (C4/C5), at a lower level
/// than any adapter here could observe. This trait exists purely as
/// the documented shape a CDP/Puppeteer-backed adapter would implement
/// to feed the same normalized event stream into downstream tooling.
pub trait NetworkInterceptorAdapter: Send + Sync {
    fn name(&self) -> &str;
    fn capabilities(&self) -> AdapterCapabilities;

    fn start(
        &self,
        target: AdapterTarget,
        handlers: Box<dyn AdapterHandlers>,
    ) -> BoxFuture<'static, anyhow::Result<Box<dyn AdapterSession>>>;
}
