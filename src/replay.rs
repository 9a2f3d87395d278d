//! Replay patch library: `spec.md` §4.8 (C8).
//!
//! Every function here is a pure string-producing builder — no
//! execution happens in this crate. `spec.md` §9 ("String-built replay
//! patches") is explicit that this code is never run server-side; it's
//! concatenated into the archived page and runs there, against a host
//! preamble providing `ready`, `findRecord`, `responseFromRecord`,
//! `decodeBase64`, `defineProp`, and `ensureReplayPatches`. The only
//! templating seam is [`ReplayContext`] — just enough to namespace the
//! `__pagepocketOriginal` markers these patches are required to leave
//! behind (`spec.md` §4.8's invariants), not a general template engine.

/// Templating seam for the handful of names every patch needs to agree
/// on with its neighbours and with the host preamble.
#[derive(Clone, Debug)]
pub struct ReplayContext {
    /// Property name used to stash the pre-patch original
    /// (`window.fetch.<marker>`, …). `spec.md` §4.8: "every patch
    /// exposes its original via `<patched>.__pagepocketOriginal`".
    pub original_marker: String,
    /// Global promise the host preamble resolves once the request
    /// table has finished loading. Every replay-stage patch awaits this
    /// before answering a call.
    pub ready_global: String,
}

impl Default for ReplayContext {
    fn default() -> Self {
        ReplayContext {
            original_marker: "__pagepocketOriginal".to_string(),
            ready_global: "__pagepocketReady".to_string(),
        }
    }
}

/// Preload-stage patch: installs a `fetch` wrapper that records every
/// outgoing request/response pair during the live capture run.
/// `spec.md` §4.8 — not on Lighterceptor's own capture path (which
/// intercepts lower, at C5), but part of the replay contract other
/// capture strategies rely on.
pub fn preload_fetch_recorder(ctx: &ReplayContext) -> String {
    let marker = &ctx.original_marker;
    format!(
        r#"(function() {{
    if (window.fetch && window.fetch.{marker}) return;
    var original = window.fetch;
    var patched = function(input, init) {{
        var url = typeof input === "string" ? input : input.url;
        var method = (init && init.method) || "GET";
        return original.call(window, input, init).then(function(response) {{
            try {{
                window.__pagepocketRecordedRequests = window.__pagepocketRecordedRequests || [];
                window.__pagepocketRecordedRequests.push({{
                    url: url,
                    method: method,
                    status: response.status,
                    statusText: response.statusText
                }});
            }} catch (e) {{}}
            return response;
        }});
    }};
    patched.{marker} = original;
    window.fetch = patched;
}})();"#
    )
}

/// Preload-stage patch: same recording contract as
/// [`preload_fetch_recorder`], for `XMLHttpRequest`.
pub fn preload_xhr_recorder(ctx: &ReplayContext) -> String {
    let marker = &ctx.original_marker;
    format!(
        r#"(function() {{
    var proto = XMLHttpRequest.prototype;
    if (proto.open.{marker}) return;
    var originalOpen = proto.open;
    var originalSend = proto.send;
    proto.open = function(method, url) {{
        this.__pagepocketMethod = method;
        this.__pagepocketUrl = url;
        return originalOpen.apply(this, arguments);
    }};
    proto.open.{marker} = originalOpen;
    proto.send = function(body) {{
        var self = this;
        this.addEventListener("loadend", function() {{
            try {{
                window.__pagepocketRecordedRequests = window.__pagepocketRecordedRequests || [];
                window.__pagepocketRecordedRequests.push({{
                    url: self.__pagepocketUrl,
                    method: self.__pagepocketMethod,
                    status: self.status,
                    statusText: self.statusText
                }});
            }} catch (e) {{}}
        }});
        return originalSend.apply(this, arguments);
    }};
    proto.send.{marker} = originalSend;
}})();"#
    )
}

/// Replay-stage patch: replaces `window.fetch` with a responder that
/// answers from the captured request table, falling back to a
/// synthetic 404. `spec.md` §4.8 / end-to-end scenario 6.
pub fn replay_fetch_responder(ctx: &ReplayContext) -> String {
    let marker = &ctx.original_marker;
    let ready = &ctx.ready_global;
    format!(
        r#"(function() {{
    if (window.fetch && window.fetch.{marker}) return;
    var original = window.fetch;
    var patched = function(input, init) {{
        var url = typeof input === "string" ? input : input.url;
        var method = (init && init.method) || "GET";
        var body = init && init.body;
        return {ready}.then(function() {{
            try {{
                var record = findRecord(method, url, body);
                if (record) {{
                    return responseFromRecord(record);
                }}
            }} catch (e) {{
                console.error("replay-fetch-responder lookup failed", e);
            }}
            return new Response("", {{ status: 404, statusText: "Not Found" }});
        }});
    }};
    patched.{marker} = original;
    window.fetch = patched;
}})();"#
    )
}

/// Replay-stage patch: replaces `XMLHttpRequest.prototype.open`/`send`
/// with a responder delivering `readystatechange`/`load`/`loadend`
/// through both the legacy `on*` hooks and `dispatchEvent`.
/// `spec.md` §4.8.
pub fn replay_xhr_responder(ctx: &ReplayContext) -> String {
    let marker = &ctx.original_marker;
    let ready = &ctx.ready_global;
    format!(
        r#"(function() {{
    var proto = XMLHttpRequest.prototype;
    if (proto.open.{marker}) return;
    var originalOpen = proto.open;
    var originalSend = proto.send;

    proto.open = function(method, url) {{
        this.__pagepocketMethod = method;
        this.__pagepocketUrl = url;
        this.readyState = 1;
    }};
    proto.open.{marker} = originalOpen;

    function deliver(xhr, record) {{
        var status = record ? record.status : 404;
        var statusText = record ? record.statusText : "Not Found";
        var responseBody = record ? record.body : "";
        var chosen = responseBody;
        if (xhr.responseType === "arraybuffer" && typeof decodeBase64 === "function") {{
            chosen = decodeBase64(responseBody);
        }}
        xhr.readyState = 4;
        xhr.status = status;
        xhr.statusText = statusText;
        xhr.response = chosen;
        xhr.responseText = responseBody;
        if (typeof xhr.onreadystatechange === "function") xhr.onreadystatechange();
        xhr.dispatchEvent({{ type: "readystatechange" }});
        if (typeof xhr.onload === "function") xhr.onload();
        xhr.dispatchEvent({{ type: "load" }});
        if (typeof xhr.onloadend === "function") xhr.onloadend();
        xhr.dispatchEvent({{ type: "loadend" }});
    }}

    proto.send = function(body) {{
        var self = this;
        {ready}.then(function() {{
            var record = null;
            try {{
                record = findRecord(self.__pagepocketMethod, self.__pagepocketUrl, body);
            }} catch (e) {{
                console.error("replay-xhr-responder lookup failed", e);
            }}
            deliver(self, record);
        }});
    }};
    proto.send.{marker} = originalSend;

    if (typeof ensureReplayPatches === "function") ensureReplayPatches();
}})();"#
    )
}

/// Replay-stage patch: `navigator.sendBeacon` becomes a no-op that
/// always reports success, satisfying callers' shape expectations
/// without emitting traffic. `spec.md` §4.8.
pub fn replay_beacon_stub(ctx: &ReplayContext) -> String {
    let marker = &ctx.original_marker;
    format!(
        r#"(function() {{
    var original = navigator.sendBeacon ? navigator.sendBeacon.bind(navigator) : undefined;
    if (navigator.sendBeacon && navigator.sendBeacon.{marker}) return;
    var patched = function() {{ return true; }};
    patched.{marker} = original;
    navigator.sendBeacon = patched;
}})();"#
    )
}

/// Replay-stage patch: `WebSocket` becomes a no-op constructor whose
/// instances never connect and never emit events. `spec.md` §4.8.
pub fn replay_websocket_stub(ctx: &ReplayContext) -> String {
    let marker = &ctx.original_marker;
    format!(
        r#"(function() {{
    if (window.WebSocket && window.WebSocket.{marker}) return;
    var original = window.WebSocket;
    function StubWebSocket(url, protocols) {{
        this.url = url;
        this.protocols = protocols;
        this.readyState = 3;
        this.send = function() {{}};
        this.close = function() {{}};
        this.addEventListener = function() {{}};
        this.removeEventListener = function() {{}};
        this.dispatchEvent = function() {{ return false; }};
    }}
    StubWebSocket.{marker} = original;
    window.WebSocket = StubWebSocket;
}})();"#
    )
}

/// Replay-stage patch: `EventSource` becomes a no-op constructor.
/// `spec.md` §4.8.
pub fn replay_eventsource_stub(ctx: &ReplayContext) -> String {
    let marker = &ctx.original_marker;
    format!(
        r#"(function() {{
    if (window.EventSource && window.EventSource.{marker}) return;
    var original = window.EventSource;
    function StubEventSource(url) {{
        this.url = url;
        this.readyState = 2;
        this.close = function() {{}};
        this.addEventListener = function() {{}};
        this.removeEventListener = function() {{}};
        this.dispatchEvent = function() {{ return false; }};
    }}
    StubEventSource.{marker} = original;
    window.EventSource = StubEventSource;
}})();"#
    )
}

/// Replay-stage patch: on `DOMContentLoaded`, rewrites every SVG
/// `<image href>`/`xlink:href` to its archive-local path.
/// `spec.md` §4.8.
pub fn replay_svg_image_rewriter(ctx: &ReplayContext) -> String {
    let marker = &ctx.original_marker;
    format!(
        r#"(function() {{
    if (document.{marker}SvgRewrite) return;
    document.{marker}SvgRewrite = true;
    document.addEventListener("DOMContentLoaded", function() {{
        var images = document.querySelectorAll("image");
        for (var i = 0; i < images.length; i++) {{
            var el = images[i];
            var href = el.getAttribute("href") || el.getAttribute("xlink:href");
            if (!href) continue;
            var mapped = window.__pagepocketPathMap && window.__pagepocketPathMap[href];
            if (mapped) {{
                el.setAttribute("href", mapped);
                el.setAttribute("xlink:href", mapped);
            }}
        }}
    }});
}})();"#
    )
}

/// Replay-stage patch: on `DOMContentLoaded`, rewrites every URL
/// attribute (`src`, `href`, `srcset`, `poster`, `data`) on the whole
/// document to the corresponding archive-local path. `spec.md` §4.8.
pub fn replay_dom_rewrite(ctx: &ReplayContext) -> String {
    let marker = &ctx.original_marker;
    format!(
        r#"(function() {{
    if (document.{marker}DomRewrite) return;
    document.{marker}DomRewrite = true;
    var urlAttrs = ["src", "href", "poster", "data"];
    document.addEventListener("DOMContentLoaded", function() {{
        var map = window.__pagepocketPathMap || {{}};
        var all = document.querySelectorAll("*");
        for (var i = 0; i < all.length; i++) {{
            var el = all[i];
            for (var a = 0; a < urlAttrs.length; a++) {{
                var attr = urlAttrs[a];
                var value = el.getAttribute(attr);
                if (value && map[value]) {{
                    el.setAttribute(attr, map[value]);
                }}
            }}
            var srcset = el.getAttribute("srcset");
            if (srcset) {{
                var rewritten = srcset.split(",").map(function(candidate) {{
                    var trimmed = candidate.trim();
                    var parts = trimmed.split(/\s+/);
                    var mapped = map[parts[0]];
                    if (mapped) {{
                        parts[0] = mapped;
                        return parts.join(" ");
                    }}
                    return trimmed;
                }}).join(", ");
                el.setAttribute("srcset", rewritten);
            }}
        }}
    }});
}})();"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use boa_engine::object::FunctionObjectBuilder;
    use boa_engine::{Context, JsValue, NativeFunction, Source, js_string};

    /// Minimal test host: a fake `window`/`document`/`navigator`
    /// sufficient to load one patch and observe `__pagepocketOriginal`
    /// behaviour, plus the preamble globals §6 requires
    /// (`ready`/`findRecord`/`responseFromRecord`/`decodeBase64`).
    const TEST_PREAMBLE: &str = r#"
        function EventTargetShim() { this.__listeners = {}; }
        EventTargetShim.prototype.addEventListener = function(type, fn) {
            this.__listeners[type] = this.__listeners[type] || [];
            this.__listeners[type].push(fn);
        };
        EventTargetShim.prototype.removeEventListener = function() {};
        EventTargetShim.prototype.dispatchEvent = function(evt) {
            var fns = this.__listeners[evt.type] || [];
            for (var i = 0; i < fns.length; i++) fns[i](evt);
            return true;
        };

        function makeElement() {
            var attrs = {};
            return {
                getAttribute: function(name) { return attrs[name] || null; },
                setAttribute: function(name, value) { attrs[name] = value; },
            };
        }

        var document = new EventTargetShim();
        document.querySelectorAll = function() { return []; };

        var navigator = {};
        var window = { fetch: undefined };
        window.WebSocket = undefined;
        window.EventSource = undefined;

        function XMLHttpRequest() {}
        XMLHttpRequest.prototype = Object.create(EventTargetShim.prototype);
        XMLHttpRequest.prototype.open = function() {};
        XMLHttpRequest.prototype.send = function() {};

        function Response(body, init) {
            this.__body = body || "";
            this.status = (init && init.status) || 200;
            this.statusText = (init && init.statusText) || "OK";
        }
        Response.prototype.text = function() { return Promise.resolve(this.__body); };

        var __pagepocketReady = Promise.resolve();
        var __fixtureRecord = null;
        function findRecord(method, url, body) { return __fixtureRecord; }
        function responseFromRecord(record) {
            return new Response(record.body, { status: record.status, statusText: record.statusText });
        }
        function decodeBase64(s) { return s; }
        function defineProp(obj, name, value) { obj[name] = value; }
        function ensureReplayPatches() {}
    "#;

    fn context_with_preamble() -> Context {
        let mut context = Context::default();
        context
            .eval(Source::from_bytes(TEST_PREAMBLE.as_bytes()))
            .expect("preamble must evaluate");
        let console_error = unsafe {
            NativeFunction::from_closure(|_this, _args, _ctx| Ok(JsValue::undefined()))
        };
        let console_error = FunctionObjectBuilder::new(context.realm(), console_error)
            .name(js_string!("error"))
            .build();
        context
            .eval(Source::from_bytes(b"var console = {};"))
            .unwrap();
        let console = context
            .global_object()
            .get(js_string!("console"), &mut context)
            .unwrap();
        console
            .as_object()
            .unwrap()
            .set(
                js_string!("error"),
                console_error,
                false,
                &mut context,
            )
            .unwrap();
        context
    }

    /// P7: installing a replay patch twice leaves the patched function
    /// reference-stable and `__pagepocketOriginal` unchanged.
    #[test]
    fn replay_fetch_responder_is_idempotent() {
        let mut context = context_with_preamble();
        let ctx = ReplayContext::default();
        let patch = replay_fetch_responder(&ctx);

        context.eval(Source::from_bytes(patch.as_bytes())).unwrap();
        context
            .eval(Source::from_bytes(b"var firstFetch = window.fetch;"))
            .unwrap();
        context.eval(Source::from_bytes(patch.as_bytes())).unwrap();
        context
            .eval(Source::from_bytes(b"var secondFetch = window.fetch;"))
            .unwrap();

        let stable = context
            .eval(Source::from_bytes(b"firstFetch === secondFetch"))
            .unwrap();
        assert_eq!(stable.as_boolean(), Some(true));
    }

    /// End-to-end scenario 6 from `spec.md` §8.
    #[test]
    fn replay_fetch_responder_falls_back_to_404_on_miss() {
        let mut context = context_with_preamble();
        let ctx = ReplayContext::default();
        let patch = replay_fetch_responder(&ctx);
        context.eval(Source::from_bytes(patch.as_bytes())).unwrap();

        context
            .eval(Source::from_bytes(
                br#"
                var __result = null;
                window.fetch("https://anywhere").then(function(response) {
                    return response.text().then(function(body) {
                        __result = { status: response.status, statusText: response.statusText, body: body };
                    });
                });
            "#,
            ))
            .unwrap();
        context.run_jobs().unwrap();

        let status = context
            .eval(Source::from_bytes(b"__result.status"))
            .unwrap();
        let status_text = context
            .eval(Source::from_bytes(b"__result.statusText"))
            .unwrap();
        let body = context.eval(Source::from_bytes(b"__result.body")).unwrap();

        assert_eq!(status.to_string(&mut context).unwrap().to_std_string_escaped(), "404");
        assert_eq!(
            status_text.to_string(&mut context).unwrap().to_std_string_escaped(),
            "Not Found"
        );
        assert_eq!(body.to_string(&mut context).unwrap().to_std_string_escaped(), "");
    }

    #[test]
    fn replay_xhr_responder_is_idempotent() {
        let mut context = context_with_preamble();
        let ctx = ReplayContext::default();
        let patch = replay_xhr_responder(&ctx);

        context.eval(Source::from_bytes(patch.as_bytes())).unwrap();
        context
            .eval(Source::from_bytes(
                b"var firstOpen = XMLHttpRequest.prototype.open;",
            ))
            .unwrap();
        context.eval(Source::from_bytes(patch.as_bytes())).unwrap();
        context
            .eval(Source::from_bytes(
                b"var secondOpen = XMLHttpRequest.prototype.open;",
            ))
            .unwrap();

        let stable = context
            .eval(Source::from_bytes(b"firstOpen === secondOpen"))
            .unwrap();
        assert_eq!(stable.as_boolean(), Some(true));
    }

    #[test]
    fn beacon_stub_always_reports_success() {
        let mut context = context_with_preamble();
        let ctx = ReplayContext::default();
        context
            .eval(Source::from_bytes(replay_beacon_stub(&ctx).as_bytes()))
            .unwrap();
        let result = context
            .eval(Source::from_bytes(
                b"navigator.sendBeacon('https://example.com/beacon', 'x')",
            ))
            .unwrap();
        assert_eq!(result.as_boolean(), Some(true));
    }

    #[test]
    fn websocket_stub_never_reaches_open_state() {
        let mut context = context_with_preamble();
        let ctx = ReplayContext::default();
        context
            .eval(Source::from_bytes(replay_websocket_stub(&ctx).as_bytes()))
            .unwrap();
        let ready_state = context
            .eval(Source::from_bytes(
                b"new WebSocket('wss://example.com').readyState",
            ))
            .unwrap();
        assert_eq!(ready_state.to_string(&mut context).unwrap().to_std_string_escaped(), "3");
    }

    #[test]
    fn all_patches_are_syntactically_self_contained() {
        let ctx = ReplayContext::default();
        let sources = vec![
            preload_fetch_recorder(&ctx),
            preload_xhr_recorder(&ctx),
            replay_fetch_responder(&ctx),
            replay_xhr_responder(&ctx),
            replay_beacon_stub(&ctx),
            replay_websocket_stub(&ctx),
            replay_eventsource_stub(&ctx),
            replay_svg_image_rewriter(&ctx),
            replay_dom_rewrite(&ctx),
        ];
        for source in sources {
            // A standalone parse/eval pass over a fresh context with
            // nothing but the preamble in scope: every fragment must
            // stand on its own, per `spec.md` §9's lint requirement.
            let mut context = context_with_preamble();
            context
                .eval(Source::from_bytes(source.as_bytes()))
                .unwrap_or_else(|e| panic!("patch failed to parse/eval standalone: {e}\n{source}"));
        }
    }
}
