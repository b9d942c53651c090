//! Reduction of article markup to paragraph-structured plain text.
//!
//! Feed bodies come from third-party publishing platforms and are anything
//! but regular, so the reduction is best-effort: isolate the document body,
//! narrow down to the platform's main content container when one is found,
//! drop non-content elements, turn block boundaries into line breaks and
//! strip whatever markup is left.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::debug;

/// Containers that hold the primary article text on the platforms we read,
/// tried in order.
const MAIN_CONTENT_SELECTORS: &[&str] = &["#js_content", ".rich_media_content"];

/// Elements removed together with everything inside them.
const NON_CONTENT_TAGS: &[&str] = &["script", "style", "link", "meta", "noscript"];

static BODY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<body[^>]*>(.*?)</body>").unwrap());

static NON_CONTENT: Lazy<Vec<(Regex, Regex)>> = Lazy::new(|| {
    NON_CONTENT_TAGS
        .iter()
        .map(|tag| {
            (
                Regex::new(&format!(r"(?is)<{tag}\b[^>]*>.*?</{tag}\s*>")).unwrap(),
                Regex::new(&format!(r"(?is)<{tag}\b[^>]*/>")).unwrap(),
            )
        })
        .collect()
});

static COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());

// Paragraph-level blocks end with a blank line, list items and rows with a
// single line break.
static PARAGRAPH_CLOSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</(div|p|section|article|h[1-6])\s*>").unwrap());
static LINE_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</(li|tr)\s*>").unwrap());
static BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<(br|hr)\b[^>]*>").unwrap());

// A bare `<` followed by anything but a tag start is text.
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"</?[A-Za-z!?][^>]*>").unwrap());

static HORIZONTAL_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+").unwrap());
static LINE_EDGE_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]+|[ \t]+$").unwrap());
static BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// Reduce an entry body to plain text, keeping paragraph breaks.
///
/// Running this on its own output returns it unchanged, as long as the
/// output holds no entity text (from a double-encoded `&amp;lt;`) and no
/// decoded tag such as `<b>` (from `&lt;b&gt;`).
pub fn reduce_markup(html: &str) -> String {
    if html.trim().is_empty() {
        return String::new();
    }

    let body = isolate_body(html);
    let main = isolate_main_content(body);
    html_to_text(main.as_deref().unwrap_or(body))
}

/// Return the contents of `<body>` when given a full HTML document.
fn isolate_body(html: &str) -> &str {
    let is_document = html.contains("<!DOCTYPE") || html.contains("<!doctype") || html.contains("<html");
    if !is_document {
        return html;
    }
    BODY.captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(html)
}

/// Inner markup of the first main-content container found, if any.
fn isolate_main_content(html: &str) -> Option<String> {
    if !html.contains('<') {
        return None;
    }
    let fragment = Html::parse_fragment(html);
    for raw in MAIN_CONTENT_SELECTORS {
        let Ok(selector) = Selector::parse(raw) else {
            continue;
        };
        if let Some(element) = fragment.select(&selector).next() {
            debug!(selector = raw, "Main content container matched");
            return Some(element.inner_html());
        }
    }
    None
}

fn html_to_text(html: &str) -> String {
    let mut text = html.replace("\r\n", "\n").replace('\r', "\n");

    for (paired, self_closing) in NON_CONTENT.iter() {
        text = paired.replace_all(&text, "").into_owned();
        text = self_closing.replace_all(&text, "").into_owned();
    }
    text = COMMENT.replace_all(&text, "").into_owned();

    text = PARAGRAPH_CLOSE.replace_all(&text, "\n\n").into_owned();
    text = LINE_CLOSE.replace_all(&text, "\n").into_owned();
    text = BREAK.replace_all(&text, "\n").into_owned();

    text = TAG.replace_all(&text, "").into_owned();
    text = decode_html_entities(&text);

    normalize_whitespace(&text)
}

/// Decode the handful of named entities that survive in article bodies.
/// `&amp;` goes last so that `&amp;lt;` stays a literal `&lt;`.
pub fn decode_html_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace('\u{a0}', " ")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

fn normalize_whitespace(text: &str) -> String {
    let text = HORIZONTAL_RUN.replace_all(text, " ");
    let text = LINE_EDGE_SPACE.replace_all(&text, "");
    let text = BLANK_RUN.replace_all(&text, "\n\n");
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_main_content_selector_and_paragraphs() {
        let html = r#"<div id="js_content"><p>Line one</p><p>Line two</p></div>"#;
        assert_eq!(reduce_markup(html), "Line one\n\nLine two");
    }

    #[test]
    fn test_main_content_drops_surrounding_chrome() {
        let html = r#"<div class="nav">Menu</div>
            <div class="rich_media_content"><p>Body text</p></div>
            <div class="footer">Share this</div>"#;
        assert_eq!(reduce_markup(html), "Body text");
    }

    #[test]
    fn test_first_matching_selector_wins() {
        let html = r#"<div class="rich_media_content"><p>second</p></div>
            <div id="js_content"><p>first</p></div>"#;
        assert_eq!(reduce_markup(html), "first");
    }

    #[test]
    fn test_no_selector_keeps_whole_body() {
        let html = "<p>Alpha</p><p>Beta</p>";
        assert_eq!(reduce_markup(html), "Alpha\n\nBeta");
    }

    #[test]
    fn test_full_document_uses_body_only() {
        let html = "<!DOCTYPE html><html><head><title>Ignored</title></head>\
                    <body><h1>Heading</h1><p>Para</p></body></html>";
        assert_eq!(reduce_markup(html), "Heading\n\nPara");
    }

    #[test]
    fn test_strips_scripts_styles_and_comments() {
        let html = "<p>Keep</p><script>var x = 1;</script><style>p { color: red }</style>\
                    <!-- hidden --><noscript>enable js</noscript><p>Also keep</p>";
        assert_eq!(reduce_markup(html), "Keep\n\nAlso keep");
    }

    #[test]
    fn test_line_breaks_and_list_items() {
        let html = "first<br>second<br/>third<hr><ul><li>a</li><li>b</li></ul>";
        assert_eq!(reduce_markup(html), "first\nsecond\nthird\na\nb");
    }

    #[test]
    fn test_entities_decoded() {
        let html = "<p>Fish &amp; chips&nbsp;&quot;daily&quot; &lt;3 it&apos;s</p>";
        assert_eq!(reduce_markup(html), "Fish & chips \"daily\" <3 it's");
    }

    #[test]
    fn test_whitespace_normalized() {
        let html = "<p>  lots   of\t\tspace  </p>\n   \n\n\n\n<p>next</p>";
        assert_eq!(reduce_markup(html), "lots of space\n\nnext");
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(reduce_markup(""), "");
        assert_eq!(reduce_markup("   \n "), "");
    }

    #[test]
    fn test_plain_text_passes_through() {
        let text = "Already plain.\n\nSecond paragraph.";
        assert_eq!(reduce_markup(text), text);
    }

    #[test]
    fn test_decoded_comparisons_survive_second_pass() {
        let once = reduce_markup("<p>if a &lt; b and c &gt; d</p>");
        assert_eq!(once, "if a < b and c > d");
        assert_eq!(reduce_markup(&once), once);
    }

    fn token() -> impl Strategy<Value = String> {
        prop_oneof![
            4 => "[a-zA-Z0-9.,]{1,8}",
            1 => prop::sample::select(vec!["<", ">", "&", "<=", "->", "&&"]).prop_map(|s| s.to_string()),
        ]
    }

    proptest! {
        #[test]
        fn prop_reduction_is_idempotent(words in prop::collection::vec(token(), 0..40),
                                        seps in prop::collection::vec(prop::sample::select(vec![" ", "\n", "\n\n", "  ", "\t", "\n \n\n"]), 40)) {
            let mut raw = String::new();
            for (w, sep) in words.iter().zip(&seps) {
                raw.push_str(w);
                raw.push_str(sep);
            }
            let once = reduce_markup(&raw);
            let twice = reduce_markup(&once);
            prop_assert_eq!(once, twice);
        }
    }
}
