//! HTML analyzer: `spec.md` §4.6 (C6).
//!
//! Parses one document with `html5ever` / `markup5ever_rcdom`, walks the
//! resulting tree for every static URL-bearing surface §4.5 lists
//! (`srcset`, `<video poster>`, preload `imagesrcset`, link-rel,
//! inline `style=`/`<style>`…), and hands inline `<script>` bodies to
//! the dynamic harness (C4+C5 — [`crate::dom::analyze_dynamic`]) so
//! script-driven interceptions are picked up too. The two passes are
//! independent and their findings are just concatenated; `spec.md` §9's
//! "two observations, one URL" tie-break is the crawl engine's and the
//! `RequestTable`'s job, not this module's.

use std::collections::HashMap;
use std::time::Duration;

use html5ever::tendril::TendrilSink;
use html5ever::{ParseOpts, parse_document};
use markup5ever_rcdom::{Handle, NodeData, RcDom};
use url::Url;

use crate::css::extract_css_urls;
use crate::dom::{self, HarnessInput};
use crate::model::{Observation, RequestSource};
use crate::url::parse_srcset_urls;

/// `link[rel]` values the injector/analyzer treats as resources.
/// `spec.md` §4.5's surface table.
const LINK_REL_ALLOW: &[&str] =
    &["stylesheet", "preload", "icon", "prefetch", "modulepreload"];

pub struct AnalyzeInput {
    pub html: String,
    pub base_url: Url,
    /// `spec.md` §4.6's settle window, forwarded to the dynamic harness.
    pub settle_time: Duration,
    pub want_title: bool,
}

#[derive(Debug, Default)]
pub struct AnalyzeOutput {
    pub title: Option<String>,
    pub observations: Vec<Observation>,
    pub warnings: Vec<String>,
}

/// Analyze one HTML document: static DOM walk + dynamic script harness.
/// Fails only if the dynamic harness itself can't start (`spec.md` §7's
/// "harness construction failed for the root document" case) — a
/// throwing page script never propagates past here, it becomes a
/// warning.
pub async fn analyze_html(
    input: AnalyzeInput,
) -> anyhow::Result<AnalyzeOutput> {
    let dom = parse_document(RcDom::default(), ParseOpts::default())
        .one(input.html.as_str());

    let mut effective_base = input.base_url.clone();
    if let Some(href) = find_base_href(&dom.document) {
        if let Ok(joined) = effective_base.join(&href) {
            effective_base = joined;
        }
    }

    let mut walker = StaticWalker::new(effective_base.clone());
    walker.walk(&dom.document);

    let title = if input.want_title { walker.title.clone() } else { None };

    let harness_outcome = dom::analyze_dynamic(HarnessInput {
        base_url: effective_base,
        scripts: walker.inline_scripts,
        settle_time: input.settle_time,
    })
    .await?;

    let mut observations = walker.observations;
    observations.extend(harness_outcome.observations);

    Ok(AnalyzeOutput {
        title,
        observations,
        warnings: harness_outcome.warnings,
    })
}

/// Depth-first search for the first `<base href>`, per the HTML spec's
/// "first base element with an href" rule (we don't bother replicating
/// "in tree order" exactly — first hit during a pre-order walk is close
/// enough for the documents this crate archives).
fn find_base_href(handle: &Handle) -> Option<String> {
    if let NodeData::Element { ref name, ref attrs, .. } = handle.data {
        if &*name.local == "base" {
            for attr in attrs.borrow().iter() {
                if &*attr.name.local == "href" {
                    return Some(attr.value.to_string());
                }
            }
        }
    }
    for child in handle.children.borrow().iter() {
        if let Some(href) = find_base_href(child) {
            return Some(href);
        }
    }
    None
}

fn collect_text(handle: &Handle) -> String {
    let mut out = String::new();
    collect_text_into(handle, &mut out);
    out
}

fn collect_text_into(handle: &Handle, out: &mut String) {
    if let NodeData::Text { ref contents } = handle.data {
        out.push_str(&contents.borrow());
    }
    for child in handle.children.borrow().iter() {
        collect_text_into(child, out);
    }
}

fn read_attrs(handle: &Handle) -> HashMap<String, String> {
    let mut map = HashMap::new();
    if let NodeData::Element { ref attrs, .. } = handle.data {
        for attr in attrs.borrow().iter() {
            map.insert(
                attr.name.local.to_string().to_ascii_lowercase(),
                attr.value.to_string(),
            );
        }
    }
    map
}

struct StaticWalker {
    base: Url,
    observations: Vec<Observation>,
    inline_scripts: Vec<String>,
    title: Option<String>,
}

impl StaticWalker {
    fn new(base: Url) -> Self {
        StaticWalker {
            base,
            observations: Vec::new(),
            inline_scripts: Vec::new(),
            title: None,
        }
    }

    fn walk(&mut self, handle: &Handle) {
        if let NodeData::Element { ref name, .. } = handle.data {
            let tag = name.local.to_string().to_ascii_lowercase();
            let attrs = read_attrs(handle);
            self.handle_element(&tag, &attrs);

            match tag.as_str() {
                "script" if !attrs.contains_key("src") => {
                    let text = collect_text(handle);
                    if !text.trim().is_empty() {
                        self.inline_scripts.push(text);
                    }
                }
                "style" => {
                    let text = collect_text(handle);
                    self.push_css(&text);
                }
                "title" if self.title.is_none() => {
                    self.title = Some(collect_text(handle).trim().to_string());
                }
                _ => {}
            }
        }

        for child in handle.children.borrow().iter() {
            self.walk(child);
        }
    }

    fn handle_element(&mut self, tag: &str, attrs: &HashMap<String, String>) {
        match tag {
            "img" => {
                self.record(attrs.get("src"), RequestSource::Img);
                self.record_srcset(attrs.get("srcset"), RequestSource::Img);
            }
            "source" => {
                // <picture><source srcset> is an image candidate set;
                // <video>/<audio><source src> is a plain resource.
                self.record_srcset(attrs.get("srcset"), RequestSource::Img);
                self.record(attrs.get("src"), RequestSource::Resource);
            }
            "script" => {
                self.record(attrs.get("src"), RequestSource::Resource);
            }
            "link" => {
                let rel = attrs
                    .get("rel")
                    .map(|r| r.to_ascii_lowercase())
                    .unwrap_or_default();
                let allowed = rel
                    .split_whitespace()
                    .any(|token| LINK_REL_ALLOW.contains(&token));
                if allowed {
                    self.record(attrs.get("href"), RequestSource::Resource);
                }
                self.record_srcset(
                    attrs.get("imagesrcset"),
                    RequestSource::Resource,
                );
            }
            "iframe" | "frame" => {
                self.record(attrs.get("src"), RequestSource::Resource);
            }
            "video" => {
                self.record(attrs.get("src"), RequestSource::Resource);
                self.record(attrs.get("poster"), RequestSource::Resource);
            }
            "audio" | "track" | "embed" => {
                self.record(attrs.get("src"), RequestSource::Resource);
            }
            "object" => {
                self.record(attrs.get("data"), RequestSource::Resource);
            }
            _ => {}
        }

        if let Some(style) = attrs.get("style") {
            self.push_css(style);
        }
    }

    fn record(&mut self, raw: Option<&String>, source: RequestSource) {
        if let Some(raw) = raw {
            self.observations.push(Observation {
                raw_url: raw.clone(),
                source,
            });
        }
    }

    fn record_srcset(&mut self, raw: Option<&String>, source: RequestSource) {
        let Some(raw) = raw else { return };
        for url in parse_srcset_urls(raw, Some(&self.base)) {
            self.observations.push(Observation {
                raw_url: url.as_str().to_string(),
                source,
            });
        }
    }

    fn push_css(&mut self, css_text: &str) {
        for url in extract_css_urls(css_text, Some(&self.base)) {
            self.observations.push(Observation {
                raw_url: url.as_str().to_string(),
                source: RequestSource::Css,
            });
        }
    }
}
