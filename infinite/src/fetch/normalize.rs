//! Text and URL clean-up applied to feed entries before they are stored.

use std::sync::OnceLock;

use regex::Regex;
use url::Url;

use crate::model::MediaVariant;

pub const EXCERPT_MAX_CHARS: usize = 240;
const ELLIPSIS: &str = "...";

static RE_TAG: OnceLock<Regex> = OnceLock::new();
static RE_IMG_SRC: OnceLock<Regex> = OnceLock::new();
static RE_SCHEME: OnceLock<Regex> = OnceLock::new();

/// Decode the handful of entities feeds actually use.
pub fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Markup-free, whitespace-collapsed text.
pub fn strip_html(html: &str) -> String {
    let re = RE_TAG.get_or_init(|| Regex::new(r"<[^>]*>").expect("tag regex"));
    let decoded = decode_entities(html);
    let without_tags = re.replace_all(&decoded, " ");
    without_tags
        .replace(['<', '>'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Plain-text excerpt of at most `max_chars` characters plus an ellipsis.
///
/// Truncation prefers the last word boundary when it falls in the final 20%
/// of the window, otherwise cuts mid-word.
pub fn extract_excerpt(html: &str, max_chars: usize) -> String {
    let text = strip_html(html);
    if text.chars().count() <= max_chars {
        return text;
    }

    let truncated: String = text.chars().take(max_chars).collect();
    let last_space = truncated
        .char_indices()
        .filter(|(_, c)| *c == ' ')
        .map(|(byte_idx, _)| (byte_idx, truncated[..byte_idx].chars().count()))
        .last();

    match last_space {
        Some((byte_idx, char_idx)) if char_idx as f64 > max_chars as f64 * 0.8 => {
            format!("{}{}", &truncated[..byte_idx], ELLIPSIS)
        }
        _ => format!("{}{}", truncated, ELLIPSIS),
    }
}

/// Repair feed URLs with a second scheme glued onto the first, e.g.
/// `https://www.esahubble.orghttps://cdn.example.com/a.jpg`, keeping the
/// innermost absolute URL. Schemes inside a query string are left alone.
pub fn repair_url(url: &str) -> String {
    let trimmed = url.trim();
    let re = RE_SCHEME.get_or_init(|| Regex::new(r"https?://").expect("scheme regex"));

    let last_embedded = re
        .find_iter(trimmed)
        .filter(|m| m.start() > 0)
        .filter(|m| !trimmed[..m.start()].contains(['?', '#', '=']))
        .last();

    match last_embedded {
        Some(m) => trimmed[m.start()..].to_string(),
        None => trimmed.to_string(),
    }
}

/// Resolve `href` against `base`, handling protocol-relative and relative links.
pub fn resolve_url(base: &str, href: &str) -> Option<String> {
    let href = repair_url(href);
    if is_valid_url(&href) {
        return Some(href);
    }
    let base = Url::parse(base).ok()?;
    let joined = base.join(&href).ok()?;
    Some(joined.to_string()).filter(|u| is_valid_url(u))
}

/// Absolute http(s) URL with a host.
pub fn is_valid_url(candidate: &str) -> bool {
    match Url::parse(candidate) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.host_str().is_some(),
        Err(_) => false,
    }
}

/// Repair and validate, returning `None` for anything unusable.
pub fn clean_url(candidate: Option<&str>) -> Option<String> {
    candidate
        .map(repair_url)
        .filter(|u| !u.is_empty() && is_valid_url(u))
}

/// Variant with the largest `width × height`; the first one wins ties.
pub fn select_main_image(variants: &[MediaVariant]) -> Option<&MediaVariant> {
    variants.iter().fold(None, |best, candidate| match best {
        Some(current) if current.area() >= candidate.area() => Some(current),
        _ => Some(candidate),
    })
}

/// `src` of the first `<img>` in an HTML fragment.
pub fn first_img_src(html: &str) -> Option<String> {
    let re = RE_IMG_SRC.get_or_init(|| {
        Regex::new(r#"(?i)<img[^>]+src\s*=\s*["']([^"']+)["']"#).expect("img regex")
    });
    re.captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| decode_entities(m.as_str()))
}

/// HTML to readable plain text, paragraphs kept on separate lines.
pub fn html_to_text(html: &str) -> String {
    match html2text::from_read(html.as_bytes(), 10_000) {
        Ok(text) => text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        Err(_) => strip_html(html),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variant(url: &str, w: u32, h: u32) -> MediaVariant {
        MediaVariant {
            url: url.to_string(),
            width: Some(w),
            height: Some(h),
            mime_type: Some("image/jpeg".into()),
        }
    }

    #[test]
    fn excerpt_strips_markup_and_entities() {
        let html = "<p>Galaxy&nbsp;<b>NGC&nbsp;1300</b> &lt;barred&gt; &amp; bright</p>";
        let excerpt = extract_excerpt(html, EXCERPT_MAX_CHARS);
        assert_eq!(excerpt, "Galaxy NGC 1300 & bright");
        assert!(!excerpt.contains('<') && !excerpt.contains('>'));
    }

    #[test]
    fn excerpt_never_contains_angle_brackets() {
        for html in ["a < b > c", "<<script>>x", "&lt;img src=x&gt;tail", "unterminated <b"] {
            let excerpt = extract_excerpt(html, 10);
            assert!(!excerpt.contains('<'), "{:?}", excerpt);
            assert!(!excerpt.contains('>'), "{:?}", excerpt);
        }
    }

    #[test]
    fn excerpt_truncates_at_word_boundary() {
        let words = "hviezda ".repeat(40);
        let excerpt = extract_excerpt(&words, 50);
        assert!(excerpt.ends_with("..."));
        assert!(excerpt.chars().count() <= 50 + 3);
        assert!(!excerpt.trim_end_matches("...").ends_with(' '));
        assert!(excerpt.trim_end_matches("...").ends_with("hviezda"));
    }

    #[test]
    fn excerpt_cuts_mid_word_without_late_space() {
        let text = format!("ab {}", "x".repeat(100));
        let excerpt = extract_excerpt(&text, 20);
        assert_eq!(excerpt.chars().count(), 23);
        assert!(excerpt.starts_with("ab x"));
    }

    #[test]
    fn excerpt_counts_characters_not_bytes() {
        let text = "ľščťžýáíé ".repeat(30);
        let excerpt = extract_excerpt(&text, 25);
        assert!(excerpt.chars().count() <= 28);
    }

    #[test]
    fn malformed_double_protocol_url_is_repaired() {
        assert_eq!(
            repair_url("https://www.esahubble.orghttps://example.com/img.jpg"),
            "https://example.com/img.jpg"
        );
        assert_eq!(
            repair_url("https://host https://cdn.host/a.png"),
            "https://cdn.host/a.png"
        );
        assert_eq!(repair_url("https://example.com/a.jpg"), "https://example.com/a.jpg");
        assert_eq!(
            repair_url("https://a.com/go?to=https://b.com"),
            "https://a.com/go?to=https://b.com"
        );
    }

    #[test]
    fn relative_links_resolve_against_base() {
        assert_eq!(
            resolve_url("https://apod.nasa.gov/apod/", "image/2501/m87.jpg").as_deref(),
            Some("https://apod.nasa.gov/apod/image/2501/m87.jpg")
        );
        assert_eq!(
            resolve_url("https://apod.nasa.gov/apod/", "//cdn.example.com/x.jpg").as_deref(),
            Some("https://cdn.example.com/x.jpg")
        );
    }

    #[test]
    fn url_validation() {
        assert!(is_valid_url("https://apod.nasa.gov/apod/image/a.jpg"));
        assert!(!is_valid_url("not a url"));
        assert!(!is_valid_url("ftp://example.com/a.jpg"));
        assert_eq!(clean_url(Some("::bad")), None);
        assert_eq!(clean_url(None), None);
    }

    #[test]
    fn largest_variant_wins_and_ties_keep_first() {
        let variants = vec![
            variant("small", 320, 240),
            variant("big-a", 1920, 1080),
            variant("big-b", 1080, 1920),
            variant("medium", 800, 600),
        ];
        assert_eq!(select_main_image(&variants).unwrap().url, "big-a");
        assert!(select_main_image(&[]).is_none());

        let no_size = vec![
            MediaVariant { url: "a".into(), width: None, height: None, mime_type: None },
            MediaVariant { url: "b".into(), width: None, height: None, mime_type: None },
        ];
        assert_eq!(select_main_image(&no_size).unwrap().url, "a");
    }

    #[test]
    fn img_src_is_found_in_description() {
        let html = r#"<p>Text</p><IMG class="x" SRC='https://cdn.example.com/p.jpg?a=1&amp;b=2'>"#;
        assert_eq!(
            first_img_src(html).as_deref(),
            Some("https://cdn.example.com/p.jpg?a=1&b=2")
        );
        assert_eq!(first_img_src("<p>none</p>"), None);
    }
}
