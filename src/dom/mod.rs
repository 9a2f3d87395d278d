//! Headless DOM harness (`spec.md` §4.4, C4) and interceptor injector
//! (§4.5, C5).
//!
//! There's no browser engine in the dependency stack, so the harness
//! pairs two pieces the teacher already depended on: `html5ever` /
//! `markup5ever_rcdom` parse markup for the static walk in
//! [`crate::analyzer`], and `boa_engine` runs page scripts for the
//! dynamic half implemented here. `boa_engine::Context` is `!Send`, so
//! (mirroring the dedicated-OS-thread-plus-channel bridge a sandboxed
//! script engine needs to stay off an async runtime's worker threads)
//! each call to [`analyze_dynamic`] spawns its own thread, builds a
//! fresh `Context`, runs the document's scripts, and tears the thread
//! down — the harness "lives for the duration of analyzing one
//! document" by construction, not by convention.
//!
//! What it can't do: bind live getters/setters onto markup that
//! `html5ever` already parsed. Script that mutates an existing,
//! statically-written element (`document.querySelector('img').src =
//! ...`) is invisible here; `querySelector`-family calls return
//! empty/null. Script that *creates* an element and assigns a URL
//! property to it — the common dynamic-injection pattern — is
//! observed, because `document.createElement` returns a stub object
//! wired straight into the interceptor. This is a deliberate scope cut,
//! recorded in `DESIGN.md`.

mod shims;

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use boa_engine::object::FunctionObjectBuilder;
use boa_engine::property::Attribute;
use boa_engine::{Context, JsResult, JsValue, NativeFunction, Source, js_string};
use tokio::sync::oneshot;
use url::Url;

pub use crate::model::Observation;
use crate::model::RequestSource;

/// One document's worth of script text to run against a fresh harness.
pub struct HarnessInput {
    pub base_url: Url,
    /// Inline `<script>` bodies and the fetched text of `<script src>`
    /// resources, in document order.
    pub scripts: Vec<String>,
    /// Upper bound on how long late (`setTimeout`-scheduled) code gets
    /// to run before the harness is torn down. `spec.md` §4.4's settle
    /// window; queued timers are drained synchronously against this
    /// harness rather than waited out in real time, since nothing here
    /// produces further callbacks once that drain finishes.
    pub settle_time: Duration,
}

#[derive(Debug, Default)]
pub struct HarnessOutcome {
    pub observations: Vec<Observation>,
    pub warnings: Vec<String>,
}

/// Run `input`'s scripts to completion and collect every URL the shims
/// observed. Never fails on a script-level error — those are recorded
/// as warnings — only on the harness itself failing to start.
pub async fn analyze_dynamic(
    input: HarnessInput,
) -> anyhow::Result<HarnessOutcome> {
    let (tx, rx) = oneshot::channel();
    std::thread::Builder::new()
        .name("lighterceptor-dom-harness".to_string())
        .spawn(move || {
            let outcome = run_harness(input);
            let _ = tx.send(outcome);
        })?;
    rx.await.map_err(|_| {
        anyhow::anyhow!("dom harness thread dropped before completing")
    })
}

fn run_harness(input: HarnessInput) -> HarnessOutcome {
    log::debug!(
        "dom harness starting for {} ({} scripts, settle={:?})",
        input.base_url,
        input.scripts.len(),
        input.settle_time
    );

    let observations = Rc::new(RefCell::new(Vec::<Observation>::new()));
    let warnings = Rc::new(RefCell::new(Vec::<String>::new()));

    let mut context = Context::default();
    if let Err(err) = install_bridge(
        &mut context,
        input.base_url.clone(),
        observations.clone(),
        warnings.clone(),
    ) {
        warnings
            .borrow_mut()
            .push(format!("bridge install failed: {err}"));
        return finish(observations, warnings);
    }

    if let Err(err) =
        context.eval(Source::from_bytes(shims::SHIM_JS.as_bytes()))
    {
        warnings
            .borrow_mut()
            .push(format!("shim bootstrap failed: {err}"));
        return finish(observations, warnings);
    }
    let _ = context.run_jobs();

    for script in &input.scripts {
        if let Err(err) = context.eval(Source::from_bytes(script.as_bytes()))
        {
            warnings.borrow_mut().push(format!("script error: {err}"));
        }
        let _ = context.run_jobs();
    }

    if let Err(err) =
        context.eval(Source::from_bytes(shims::SETTLE_JS.as_bytes()))
    {
        warnings
            .borrow_mut()
            .push(format!("settle phase failed: {err}"));
    }
    let _ = context.run_jobs();

    finish(observations, warnings)
}

fn finish(
    observations: Rc<RefCell<Vec<Observation>>>,
    warnings: Rc<RefCell<Vec<String>>>,
) -> HarnessOutcome {
    HarnessOutcome {
        observations: observations.borrow().clone(),
        warnings: warnings.borrow().clone(),
    }
}

fn parse_source(raw: &str) -> RequestSource {
    match raw {
        "fetch" => RequestSource::Fetch,
        "xhr" => RequestSource::Xhr,
        "img" => RequestSource::Img,
        "css" => RequestSource::Css,
        _ => RequestSource::Resource,
    }
}

/// Register the four native functions every JS shim in [`shims::SHIM_JS`]
/// calls back into: URL/CSS/srcset interception, plus a console sink.
/// Everything else (fetch, XHR, `document.createElement`, observers...)
/// is pure JS built on top of these.
fn install_bridge(
    context: &mut Context,
    base_url: Url,
    observations: Rc<RefCell<Vec<Observation>>>,
    warnings: Rc<RefCell<Vec<String>>>,
) -> JsResult<()> {
    let attr = Attribute::WRITABLE
        | Attribute::NON_ENUMERABLE
        | Attribute::CONFIGURABLE;

    let base = base_url.clone();
    let sink = observations.clone();
    let intercept = unsafe {
        NativeFunction::from_closure(
            move |_this, args, ctx| -> JsResult<JsValue> {
                let url = arg_string(args, 0, ctx)?;
                let source = parse_source(&arg_string(args, 1, ctx)?);
                if let Some(normalized) =
                    crate::model::NormalizedUrl::resolve(Some(&base), &url)
                {
                    sink.borrow_mut().push(Observation {
                        raw_url: normalized.as_str().to_string(),
                        source,
                    });
                }
                Ok(JsValue::undefined())
            },
        )
    };
    let intercept = FunctionObjectBuilder::new(context.realm(), intercept)
        .length(2)
        .name(js_string!("__pp_intercept"))
        .build();
    context.register_global_property(
        js_string!("__pp_intercept"),
        intercept,
        attr,
    )?;

    let base = base_url.clone();
    let sink = observations.clone();
    let intercept_css = unsafe {
        NativeFunction::from_closure(
            move |_this, args, ctx| -> JsResult<JsValue> {
                let css_text = arg_string(args, 0, ctx)?;
                for url in
                    crate::css::extract_css_urls(&css_text, Some(&base))
                {
                    sink.borrow_mut().push(Observation {
                        raw_url: url.as_str().to_string(),
                        source: RequestSource::Css,
                    });
                }
                Ok(JsValue::undefined())
            },
        )
    };
    let intercept_css =
        FunctionObjectBuilder::new(context.realm(), intercept_css)
            .length(1)
            .name(js_string!("__pp_intercept_css"))
            .build();
    context.register_global_property(
        js_string!("__pp_intercept_css"),
        intercept_css,
        attr,
    )?;

    let base = base_url;
    let sink = observations;
    let intercept_srcset = unsafe {
        NativeFunction::from_closure(
            move |_this, args, ctx| -> JsResult<JsValue> {
                let srcset_text = arg_string(args, 0, ctx)?;
                let source = parse_source(&arg_string(args, 1, ctx)?);
                for url in crate::url::parse_srcset_urls(
                    &srcset_text,
                    Some(&base),
                ) {
                    sink.borrow_mut().push(Observation {
                        raw_url: url.as_str().to_string(),
                        source,
                    });
                }
                Ok(JsValue::undefined())
            },
        )
    };
    let intercept_srcset =
        FunctionObjectBuilder::new(context.realm(), intercept_srcset)
            .length(2)
            .name(js_string!("__pp_intercept_srcset"))
            .build();
    context.register_global_property(
        js_string!("__pp_intercept_srcset"),
        intercept_srcset,
        attr,
    )?;

    let console_sink = warnings;
    let console = unsafe {
        NativeFunction::from_closure(
            move |_this, args, ctx| -> JsResult<JsValue> {
                let mut parts = Vec::with_capacity(args.len());
                for arg in args {
                    parts.push(arg.to_string(ctx)?.to_std_string_escaped());
                }
                let line = parts.join(" ");
                log::debug!("[dom-harness console] {line}");
                let _ = &console_sink;
                Ok(JsValue::undefined())
            },
        )
    };
    let console = FunctionObjectBuilder::new(context.realm(), console)
        .length(1)
        .name(js_string!("__pp_console"))
        .build();
    context.register_global_property(
        js_string!("__pp_console"),
        console,
        attr,
    )?;

    Ok(())
}

fn arg_string(
    args: &[JsValue],
    index: usize,
    ctx: &mut Context,
) -> JsResult<String> {
    Ok(args
        .get(index)
        .cloned()
        .unwrap_or_default()
        .to_string(ctx)?
        .to_std_string_escaped())
}
