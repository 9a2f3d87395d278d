//! CSS URL extractor: `spec.md` §4.2 (C2).
//!
//! `url(...)` syntax is lexically self-contained, so a single tokenizer
//! that finds `url(...)` and `@import` targets is correct without a full
//! CSS parser — extraction and rewriting share that tokenizer, but the
//! rewriter additionally has to leave everything it doesn't touch
//! byte-for-byte untouched, so both operations walk the same token list
//! rather than reparsing.

use crate::model::NormalizedUrl;
use url::Url;

/// One `url(...)` or `@import "..."` target found in a CSS string.
#[derive(Debug, Clone, PartialEq, Eq)]
struct UrlToken {
    /// Byte range of the quoted-or-bare literal, including quote chars.
    span: std::ops::Range<usize>,
    /// Quote character used (`'`, `"`), if any.
    quote: Option<char>,
    /// The raw (unresolved, unescaped) URL text.
    raw: String,
}

/// Find every `url(...)` and `@import (url(...) | "..." | '...')` target
/// in `css`, in source order.
fn tokenize(css: &str) -> Vec<UrlToken> {
    let bytes = css.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if matches_keyword_ci(bytes, i, b"url(") {
            let open = i + 4;
            if let Some((token, after_close)) =
                parse_parenthesized(css, open)
            {
                i = after_close;
                tokens.push(token);
                continue;
            }
        } else if matches_keyword_ci(bytes, i, b"@import") {
            let mut j = i + 7;
            j = skip_whitespace(css, j);
            if matches_keyword_ci(bytes, j, b"url(") {
                // Handled on the next loop iteration via the `url(` arm.
                i += 1;
                continue;
            }
            if let Some(quote) = bytes.get(j).copied().filter(|b| {
                *b == b'"' || b'\'' == *b
            }) {
                let quote = quote as char;
                if let Some(end) = find_unescaped(css, j + 1, quote) {
                    tokens.push(UrlToken {
                        span: j..end + 1,
                        quote: Some(quote),
                        raw: css[j + 1..end].to_string(),
                    });
                    i = end + 1;
                    continue;
                }
            }
        }
        i += 1;
    }
    tokens
}

fn matches_keyword_ci(bytes: &[u8], pos: usize, keyword: &[u8]) -> bool {
    if pos + keyword.len() > bytes.len() {
        return false;
    }
    bytes[pos..pos + keyword.len()]
        .iter()
        .zip(keyword)
        .all(|(a, b)| a.to_ascii_lowercase() == *b)
}

fn skip_whitespace(s: &str, mut pos: usize) -> usize {
    let bytes = s.as_bytes();
    while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
        pos += 1;
    }
    pos
}

fn find_unescaped(s: &str, start: usize, target: char) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut i = start;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            i += 2;
            continue;
        }
        if bytes[i] as char == target {
            return Some(i);
        }
        i += 1;
    }
    None
}

/// Parse the contents of `url(` starting right after the opening paren.
///
/// Returns the token — spanning exactly the literal (including its own
/// quotes, if any), so that everything else inside the parens (leading
/// or trailing whitespace, the parens themselves) is left untouched by a
/// rewrite — together with the byte offset just past the matching `)`,
/// for the tokenizer to resume scanning from.
fn parse_parenthesized(
    css: &str,
    open: usize,
) -> Option<(UrlToken, usize)> {
    let start = skip_whitespace(css, open);
    let bytes = css.as_bytes();
    let quote = bytes
        .get(start)
        .copied()
        .filter(|b| *b == b'"' || *b == b'\'')
        .map(|b| b as char);

    let span = if let Some(q) = quote {
        let end = find_unescaped(css, start + 1, q)?;
        start..end + 1
    } else {
        let end = css[start..].find(')').map(|p| start + p)?;
        let raw = css[start..end].trim_end();
        start..start + raw.len()
    };

    let close = skip_whitespace(css, span.end);
    if bytes.get(close) != Some(&b')') {
        return None;
    }

    let raw = match quote {
        Some(_) => css[span.start + 1..span.end - 1].to_string(),
        None => css[span.clone()].to_string(),
    };

    Some((UrlToken { span, quote, raw }, close + 1))
}

/// Extract every `url(...)`/`@import` target, resolved against `base_url`
/// and restricted to `http`/`https`. `data:`/`blob:` targets are skipped.
/// `spec.md` §4.2's `extractCssUrls`.
pub fn extract_css_urls(
    css_text: &str,
    base_url: Option<&Url>,
) -> Vec<NormalizedUrl> {
    tokenize(css_text)
        .iter()
        .filter_map(|token| NormalizedUrl::resolve(base_url, &token.raw))
        .collect()
}

/// Rewrite every `url(...)`/`@import` target whose absolute URL resolves
/// via `resolve`, preserving quoting style and any text the tokenizer
/// didn't match. If `resolve` returns `None` for a target (including
/// `data:`/`blob:`, which are never passed to `resolve` at all), the
/// original literal is left unchanged. `spec.md` §4.2's `rewriteCssText`.
pub fn rewrite_css_text(
    css_text: &str,
    css_url: Option<&Url>,
    mut resolve: impl FnMut(&NormalizedUrl) -> Option<String>,
) -> String {
    let tokens = tokenize(css_text);
    let mut out = String::with_capacity(css_text.len());
    let mut cursor = 0;
    for token in &tokens {
        out.push_str(&css_text[cursor..token.span.start]);
        let replacement = NormalizedUrl::resolve(css_url, &token.raw)
            .and_then(|absolute| resolve(&absolute));
        match replacement {
            Some(new_url) => {
                if let Some(q) = token.quote {
                    out.push(q);
                    out.push_str(&new_url);
                    out.push(q);
                } else {
                    out.push_str(&new_url);
                }
            }
            None => out.push_str(&css_text[token.span.clone()]),
        }
        cursor = token.span.end;
    }
    out.push_str(&css_text[cursor..]);
    out
}
