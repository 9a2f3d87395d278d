//! URL & content-type utilities: `spec.md` §4.1 (C1).

use crate::model::{BodyEncoding, NormalizedUrl, RequestSource, ResourceKind};
use base64::Engine as _;
use encoding_rs::Encoding;
use url::Url;

/// Resolve `raw` against `base` and normalize the result.
///
/// Thin wrapper over [`NormalizedUrl::resolve`] kept under the name the
/// spec uses, so callers reading `spec.md` alongside this crate can find
/// the operation by name.
pub fn resolve_url(base: Option<&Url>, raw: &str) -> Option<NormalizedUrl> {
    NormalizedUrl::resolve(base, raw)
}

/// Split a `srcset` attribute value into its candidate URLs, discarding
/// width/density descriptors (`1x`, `2x`, `480w`).
///
/// Candidates are comma-separated, but commas may appear inside a URL
/// (rare, but valid for data: URLs with embedded commas), so splitting is
/// done outside of parentheses rather than on every comma. `spec.md`
/// §4.1 / §8-P6.
pub fn parse_srcset_urls(
    srcset: &str,
    base: Option<&Url>,
) -> Vec<NormalizedUrl> {
    split_srcset_candidates(srcset)
        .iter()
        .filter_map(|candidate| {
            let first_token = candidate.split_whitespace().next()?;
            resolve_url(base, first_token)
        })
        .collect()
}

/// Split on top-level commas (i.e. commas not nested inside parentheses),
/// trimming whitespace from each candidate and dropping empty ones.
fn split_srcset_candidates(srcset: &str) -> Vec<String> {
    let mut candidates = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for ch in srcset.chars() {
        match ch {
            '(' => {
                depth += 1;
                current.push(ch);
            }
            ')' => {
                depth -= 1;
                current.push(ch);
            }
            ',' if depth <= 0 => {
                candidates.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    if !current.trim().is_empty() {
        candidates.push(current.trim().to_string());
    }
    candidates.into_iter().filter(|c| !c.is_empty()).collect()
}

const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "webp", "avif", "svg", "bmp", "ico",
];
const FONT_EXTENSIONS: &[&str] = &["woff", "woff2", "ttf", "otf", "eot"];
const MEDIA_EXTENSIONS: &[&str] =
    &["mp4", "webm", "ogv", "mp3", "wav", "ogg", "m4a", "flac"];

/// Infer a [`ResourceKind`] from a URL's path extension.
/// `spec.md` §4.1's `inferResourceKindFromUrl`.
pub fn infer_resource_kind_from_url(url: &NormalizedUrl) -> ResourceKind {
    let path = url.as_url().path();
    let ext = path
        .rsplit('.')
        .next()
        .filter(|_| path.contains('.'))
        .unwrap_or_default()
        .to_ascii_lowercase();

    match ext.as_str() {
        "css" => ResourceKind::Css,
        "js" | "mjs" | "cjs" => ResourceKind::Js,
        "html" | "htm" => ResourceKind::Html,
        "json" => ResourceKind::Json,
        ext if IMAGE_EXTENSIONS.contains(&ext) => ResourceKind::Img,
        ext if FONT_EXTENSIONS.contains(&ext) => ResourceKind::Font,
        ext if MEDIA_EXTENSIONS.contains(&ext) => ResourceKind::Media,
        _ => ResourceKind::Unknown,
    }
}

/// Infer a [`ResourceKind`] from an HTML tag name and, for `<link>`, its
/// `rel` attribute. `spec.md` §4.1's `inferKindFromElement`.
pub fn infer_kind_from_element(
    tag: &str,
    rel: Option<&str>,
) -> ResourceKind {
    match tag {
        "script" => ResourceKind::Js,
        "link" => match rel.map(|r| r.to_ascii_lowercase()) {
            Some(rel)
                if rel.split_whitespace().any(|t| t == "stylesheet") =>
            {
                ResourceKind::Css
            }
            _ => ResourceKind::Unknown,
        },
        "iframe" | "frame" => ResourceKind::Html,
        "img" | "source" => ResourceKind::Img,
        _ => ResourceKind::Unknown,
    }
}

/// Pick a [`ResourceKind`] for a URL discovered by the crawl engine
/// (C7): extension wins when it says anything at all; otherwise fall
/// back to a hint from the surface that observed it, since a `css`
/// observation (an `@import` or `url()` target) is overwhelmingly
/// likely to itself be CSS even without a `.css` suffix.
pub fn infer_kind_hint(
    source: RequestSource,
    url: &NormalizedUrl,
) -> ResourceKind {
    match infer_resource_kind_from_url(url) {
        ResourceKind::Unknown => match source {
            RequestSource::Css => ResourceKind::Css,
            _ => ResourceKind::Unknown,
        },
        kind => kind,
    }
}

/// Body-encoding classifier: `spec.md` §4.1's `resolveBodyEncoding`.
///
/// Errs on the side of base64 for unknown types — mis-classifying binary
/// as text corrupts the archive irreversibly, while the reverse merely
/// bloats it (`spec.md` §9).
pub fn resolve_body_encoding(
    content_type: Option<&str>,
) -> crate::model::BodyEncoding {
    use crate::model::BodyEncoding;

    let Some(content_type) = content_type else {
        return BodyEncoding::Base64;
    };
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    let is_text = mime.starts_with("text/")
        || mime == "application/json"
        || (mime.starts_with("application/") && mime.ends_with("+json"))
        || mime == "application/javascript"
        || mime == "application/xml"
        || mime == "image/svg+xml";

    if is_text {
        BodyEncoding::Text
    } else {
        BodyEncoding::Base64
    }
}

/// Render a fetched body as the string `ResponseRecord::body` carries,
/// honouring the encoding [`resolve_body_encoding`] chose: the decoded text
/// itself for `Text`, or a base64 encoding of the raw bytes for `Base64`.
/// `spec.md` §4.3's `ResponseRecord` — every binary response must survive
/// the round trip through a JSON snapshot, which a bare byte buffer can't.
pub fn encode_body(
    buffer: &[u8],
    text: Option<&str>,
    encoding: BodyEncoding,
) -> String {
    match encoding {
        BodyEncoding::Text => text.unwrap_or_default().to_string(),
        BodyEncoding::Base64 => {
            base64::engine::general_purpose::STANDARD.encode(buffer)
        }
    }
}

/// Decode a response body to text, honouring a `charset` parameter on the
/// content-type when present, defaulting to UTF-8. `fallback` is used
/// when the detected encoding can't decode the bytes without mangling
/// them.
/// `spec.md` §4.1's `decodeText`.
pub fn decode_text(
    buffer: &[u8],
    content_type: Option<&str>,
    fallback: &str,
) -> String {
    let charset_label = content_type.and_then(|ct| {
        ct.split(';').skip(1).find_map(|param| {
            let param = param.trim();
            param
                .strip_prefix("charset=")
                .map(|v| v.trim_matches('"').trim_matches('\''))
        })
    });

    let encoding = charset_label
        .and_then(Encoding::for_label)
        .unwrap_or(encoding_rs::UTF_8);

    let (decoded, _, had_errors) = encoding.decode(buffer);
    if had_errors && encoding != encoding_rs::UTF_8 {
        return fallback.to_string();
    }
    decoded.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_srcset_urls_basic() {
        let urls = parse_srcset_urls(
            "https://example.com/pic-1x.jpg 1x, https://example.com/pic-2x.jpg 2x",
            None,
        );
        assert_eq!(
            urls.iter().map(|u| u.as_str()).collect::<Vec<_>>(),
            vec![
                "https://example.com/pic-1x.jpg",
                "https://example.com/pic-2x.jpg"
            ]
        );
    }

    #[test]
    fn parse_srcset_urls_without_descriptor() {
        let urls =
            parse_srcset_urls("https://example.com/pic.jpg", None);
        assert_eq!(urls.len(), 1);
        assert_eq!(urls[0].as_str(), "https://example.com/pic.jpg");
    }

    /// P6: parseSrcsetUrls is insensitive to whitespace normalization.
    #[test]
    fn parse_srcset_urls_whitespace_insensitive() {
        let s1 = "https://example.com/a.jpg 1x,   https://example.com/b.jpg 2x";
        let s2 = "https://example.com/a.jpg 1x, https://example.com/b.jpg 2x";
        let normalize =
            |s: &str| s.split_whitespace().collect::<Vec<_>>().join(" ");
        assert_eq!(
            parse_srcset_urls(s1, None),
            parse_srcset_urls(&normalize(s2), None)
        );
    }

    #[test]
    fn infer_resource_kind_from_url_covers_families() {
        let u = |s: &str| NormalizedUrl::resolve(None, s).unwrap();
        assert_eq!(
            infer_resource_kind_from_url(&u("https://e.com/a.css")),
            ResourceKind::Css
        );
        assert_eq!(
            infer_resource_kind_from_url(&u("https://e.com/a.mjs")),
            ResourceKind::Js
        );
        assert_eq!(
            infer_resource_kind_from_url(&u("https://e.com/a.woff2")),
            ResourceKind::Font
        );
        assert_eq!(
            infer_resource_kind_from_url(&u("https://e.com/a.mp4")),
            ResourceKind::Media
        );
        assert_eq!(
            infer_resource_kind_from_url(&u("https://e.com/a.unknownext")),
            ResourceKind::Unknown
        );
    }

    #[test]
    fn infer_kind_from_element_link_requires_stylesheet_rel() {
        assert_eq!(
            infer_kind_from_element("link", Some("stylesheet")),
            ResourceKind::Css
        );
        assert_eq!(
            infer_kind_from_element("link", Some("preload")),
            ResourceKind::Unknown
        );
    }

    #[test]
    fn resolve_body_encoding_prefers_base64_for_unknown() {
        use crate::model::BodyEncoding;
        assert_eq!(resolve_body_encoding(None), BodyEncoding::Base64);
        assert_eq!(
            resolve_body_encoding(Some("application/octet-stream")),
            BodyEncoding::Base64
        );
        assert_eq!(
            resolve_body_encoding(Some("text/css; charset=utf-8")),
            BodyEncoding::Text
        );
        assert_eq!(
            resolve_body_encoding(Some("image/svg+xml")),
            BodyEncoding::Text
        );
        assert_eq!(
            resolve_body_encoding(Some("application/ld+json")),
            BodyEncoding::Text
        );
    }

    #[test]
    fn encode_body_base64_encodes_binary_payloads() {
        let png_bytes = vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a];
        let encoded = encode_body(&png_bytes, None, BodyEncoding::Base64);
        assert_eq!(
            base64::engine::general_purpose::STANDARD
                .decode(&encoded)
                .unwrap(),
            png_bytes
        );
    }

    #[test]
    fn encode_body_text_passes_decoded_text_through() {
        let encoded =
            encode_body(b"ignored", Some("body { color: red }"), BodyEncoding::Text);
        assert_eq!(encoded, "body { color: red }");
    }

    #[test]
    fn decode_text_defaults_to_utf8() {
        let bytes = "héllo".as_bytes();
        assert_eq!(decode_text(bytes, None, "fallback"), "héllo");
    }

    #[test]
    fn decode_text_honours_charset_param() {
        let (encoded, _, _) = encoding_rs::WINDOWS_1252.encode("café");
        let text = decode_text(
            &encoded,
            Some("text/plain; charset=windows-1252"),
            "fallback",
        );
        assert_eq!(text, "café");
    }

    #[test]
    fn infer_kind_hint_falls_back_to_css_source() {
        let url = NormalizedUrl::resolve(
            None,
            "https://example.com/theme-bundle",
        )
        .unwrap();
        assert_eq!(
            infer_kind_hint(RequestSource::Css, &url),
            ResourceKind::Css
        );
        assert_eq!(
            infer_kind_hint(RequestSource::Fetch, &url),
            ResourceKind::Unknown
        );
    }

    #[test]
    fn infer_kind_hint_prefers_extension_over_source_hint() {
        let url =
            NormalizedUrl::resolve(None, "https://example.com/a.png").unwrap();
        assert_eq!(
            infer_kind_hint(RequestSource::Css, &url),
            ResourceKind::Img
        );
    }

    proptest::proptest! {
        /// P6: `parseSrcsetUrls` is insensitive to whitespace — padding
        /// every candidate and separator with extra spaces must not
        /// change which URLs are extracted.
        #[test]
        fn parse_srcset_urls_is_whitespace_insensitive_prop(
            names in proptest::collection::vec("[a-z]{1,8}", 1..5),
        ) {
            let candidates: Vec<String> = names
                .iter()
                .map(|name| format!("https://example.com/{name}.jpg"))
                .collect();
            let tight = candidates.join(",");
            let loose = candidates
                .iter()
                .map(|c| format!("  {c}  "))
                .collect::<Vec<_>>()
                .join("  ,  ");

            let a: Vec<String> = parse_srcset_urls(&tight, None)
                .iter()
                .map(|u| u.as_str().to_string())
                .collect();
            let b: Vec<String> = parse_srcset_urls(&loose, None)
                .iter()
                .map(|u| u.as_str().to_string())
                .collect();
            proptest::prop_assert_eq!(a, b);
        }
    }
}
