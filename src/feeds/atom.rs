//! Tolerant, pattern-based extraction of entries from Atom-like documents.
//!
//! This is deliberately not an XML parser. Feeds served by content platforms
//! routinely carry stray namespaces, unescaped ampersands and other minor
//! damage that a strict parser rejects wholesale; matching the handful of
//! elements we need keeps every entry that is readable.

use crate::feeds::markup::reduce_markup;
use crate::models::FeedItem;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

/// Maximum number of entries processed per document.
pub const MAX_ENTRIES: usize = 100;

static ENTRY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<entry\b[^>]*>(.*?)</entry>").unwrap());
static TITLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<title\b[^>]*>(.*?)</title>").unwrap());
static LINK_HREF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?is)<link\b[^>]*?href=["']([^"']+)["']"#).unwrap());
static CONTENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<content\b[^>]*>(.*?)</content>").unwrap());

// One pattern per tag so an opening <updated> never pairs with </pubDate>.
static DATE_TAGS: Lazy<Vec<Regex>> = Lazy::new(|| {
    ["updated", "pubDate"]
        .iter()
        .map(|tag| Regex::new(&format!(r"(?is)<{tag}\b[^>]*>(.*?)</{tag}>")).unwrap())
        .collect()
});

/// Parse up to [`MAX_ENTRIES`] entries out of a feed document, in document order.
///
/// Entries without a title or link are dropped; entries with an empty body
/// are kept with `body_text` set to `None`.
pub fn parse_entries(xml: &str) -> Vec<FeedItem> {
    let items: Vec<FeedItem> = ENTRY
        .captures_iter(xml)
        .take(MAX_ENTRIES)
        .enumerate()
        .filter_map(|(index, caps)| {
            let entry = caps.get(1)?.as_str();
            let item = parse_entry(entry);
            if item.is_none() {
                debug!(index, "Dropping entry without title or link");
            }
            item
        })
        .collect();

    info!(count = items.len(), "Parsed feed entries");
    items
}

fn parse_entry(entry: &str) -> Option<FeedItem> {
    let title = first_capture(&TITLE, entry).map(decode_cdata)?;
    let link = first_capture(&LINK_HREF, entry)
        .map(|href| decode_cdata(href).trim().to_string())
        .filter(|href| !href.is_empty())?;

    let published_at = first_date_text(entry)
        .map(decode_cdata)
        .and_then(|raw| parse_timestamp(&raw));

    let body_text = first_capture(&CONTENT, entry)
        .map(decode_cdata)
        .map(|markup| reduce_markup(&markup))
        .filter(|text| !text.is_empty());

    Some(FeedItem {
        title,
        link,
        published_at,
        body_text,
    })
}

fn first_capture<'a>(re: &Regex, haystack: &'a str) -> Option<&'a str> {
    re.captures(haystack)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Text of whichever date element appears first in the entry.
fn first_date_text(entry: &str) -> Option<&str> {
    DATE_TAGS
        .iter()
        .filter_map(|re| re.captures(entry))
        .filter_map(|c| Some((c.get(0)?.start(), c.get(1)?.as_str())))
        .min_by_key(|(start, _)| *start)
        .map(|(_, text)| text)
}

/// Strip CDATA markers and decode the XML entities feeds escape markup with.
pub fn decode_cdata(text: &str) -> String {
    text.replace("<![CDATA[", "")
        .replace("]]>", "")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Accept RFC 3339 (Atom) and RFC 2822 (RSS) timestamps.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_rfc2822(raw))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}
