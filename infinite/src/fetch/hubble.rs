//! ESA Hubble RSS (picture of the week and image feeds), read with a
//! quick-xml pull parser so `media:*` renditions and credits survive.

use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use reqwest::Client;
use tracing::{info, warn};

use super::normalize::{
    clean_url, extract_excerpt, first_img_src, html_to_text, repair_url, resolve_url,
    select_main_image, EXCERPT_MAX_CHARS,
};
use super::{fetch_text, ingest, FetchReport};
use crate::model::{ContentSource, HubbleRawItem, MediaVariant, RawContentItem, SourceItem};
use crate::store::RawContentStore;

const ESA_BASE_URL: &str = "https://esahubble.org/";

/// One `<item>` as it appears in the feed, before validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedEntry {
    pub title: String,
    pub link: String,
    pub guid: String,
    pub pub_date: String,
    pub description: String,
    pub content_encoded: String,
    pub media: Vec<MediaVariant>,
    pub enclosure: Option<MediaVariant>,
    pub credit: String,
    pub copyright: String,
    pub keywords: String,
}

impl FeedEntry {
    fn set_text(&mut self, tag: &str, value: String) {
        let slot = match tag {
            "title" => &mut self.title,
            "link" => &mut self.link,
            "guid" => &mut self.guid,
            "pubDate" | "dc:date" => &mut self.pub_date,
            "description" => &mut self.description,
            "content:encoded" => &mut self.content_encoded,
            "media:credit" => &mut self.credit,
            "media:copyright" => &mut self.copyright,
            "media:keywords" => &mut self.keywords,
            _ => return,
        };
        if slot.is_empty() {
            *slot = value;
        }
    }

    fn add_media(&mut self, tag: &str, element: &BytesStart) {
        let attrs = attributes(element);
        let Some(url) = attrs.get("url").map(|u| repair_url(u)) else {
            return;
        };
        let variant = MediaVariant {
            url,
            width: attrs.get("width").and_then(|w| w.trim().parse().ok()),
            height: attrs.get("height").and_then(|h| h.trim().parse().ok()),
            mime_type: attrs.get("type").cloned(),
        };
        match tag {
            "media:content" => self.media.push(variant),
            "enclosure" if self.enclosure.is_none() => self.enclosure = Some(variant),
            _ => {}
        }
    }
}

/// Pull every `<item>` out of an RSS document.
pub fn parse_feed(xml: &str) -> Result<Vec<FeedEntry>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut entries = Vec::new();
    let mut current: Option<FeedEntry> = None;
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let tag = tag_name(e.name().as_ref());
                if tag == "item" {
                    current = Some(FeedEntry::default());
                } else if let Some(entry) = current.as_mut() {
                    entry.add_media(&tag, &e);
                }
                text.clear();
            }
            Ok(Event::Empty(e)) => {
                if let Some(entry) = current.as_mut() {
                    entry.add_media(&tag_name(e.name().as_ref()), &e);
                }
            }
            Ok(Event::Text(t)) => match t.unescape() {
                Ok(value) => text.push_str(&value),
                Err(_) => text.push_str(&String::from_utf8_lossy(&t)),
            },
            Ok(Event::CData(c)) => text.push_str(&String::from_utf8_lossy(&c.into_inner())),
            Ok(Event::End(e)) => {
                let tag = tag_name(e.name().as_ref());
                if tag == "item" {
                    if let Some(entry) = current.take() {
                        entries.push(entry);
                    }
                } else if let Some(entry) = current.as_mut() {
                    entry.set_text(&tag, text.trim().to_string());
                }
                text.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => anyhow::bail!("malformed feed XML at byte {}: {}", reader.buffer_position(), e),
            _ => {}
        }
    }

    Ok(entries)
}

fn tag_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

fn attributes(element: &BytesStart) -> HashMap<String, String> {
    element
        .attributes()
        .flatten()
        .map(|attr| {
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = match attr.unescape_value() {
                Ok(v) => v.into_owned(),
                Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
            };
            (key, value)
        })
        .collect()
}

/// RFC 2822 (RSS), RFC 3339, or a bare `YYYY-MM-DD`.
pub fn parse_pub_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    DateTime::parse_from_rfc2822(value)
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .map(|dt| dt.with_timezone(&Utc).date_naive())
        .ok()
        .or_else(|| NaiveDate::parse_from_str(value, "%Y-%m-%d").ok())
}

/// Main image and the remaining renditions: largest `media:content`, else an
/// image enclosure, else the first `<img>` in the description or body.
fn choose_images(entry: &FeedEntry) -> (Option<String>, Vec<MediaVariant>) {
    let media: Vec<MediaVariant> = entry
        .media
        .iter()
        .filter(|m| clean_url(Some(&m.url)).is_some())
        .cloned()
        .collect();

    if let Some(main) = select_main_image(&media) {
        let main_url = main.url.clone();
        let mut main_taken = false;
        let variants = media
            .iter()
            .filter(|m| {
                if !main_taken && m.url == main_url {
                    main_taken = true;
                    return false;
                }
                true
            })
            .cloned()
            .collect();
        return (Some(main_url), variants);
    }

    let enclosure = entry
        .enclosure
        .as_ref()
        .filter(|e| e.mime_type.as_deref().is_some_and(|t| t.starts_with("image/")))
        .and_then(|e| clean_url(Some(&e.url)));
    if enclosure.is_some() {
        return (enclosure, Vec::new());
    }

    let base = clean_url(Some(&entry.link)).unwrap_or_else(|| ESA_BASE_URL.to_string());
    let from_html = first_img_src(&entry.description)
        .or_else(|| first_img_src(&entry.content_encoded))
        .and_then(|src| resolve_url(&base, &src));
    (from_html, Vec::new())
}

/// Validate a feed entry and convert it into a raw item.
pub fn to_raw_item(entry: &FeedEntry, source: ContentSource) -> Result<RawContentItem> {
    let title = entry.title.trim();
    if title.is_empty() {
        anyhow::bail!("entry without title");
    }

    let date = if entry.pub_date.is_empty() {
        warn!(%title, "entry without pubDate, using today");
        Utc::now().date_naive()
    } else {
        parse_pub_date(&entry.pub_date)
            .with_context(|| format!("unparseable pubDate: {}", entry.pub_date))?
    };

    let body_html = if entry.description.is_empty() {
        &entry.content_encoded
    } else {
        &entry.description
    };
    let (image_url, image_variants) = choose_images(entry);
    let keywords = entry
        .keywords
        .split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect();

    let details = HubbleRawItem {
        description: html_to_text(body_html),
        excerpt: extract_excerpt(body_html, EXCERPT_MAX_CHARS),
        link: clean_url(Some(&entry.link)),
        image_url,
        image_variants,
        credit: non_empty(&entry.credit),
        copyright: non_empty(&entry.copyright),
        keywords,
    };

    let guid = non_empty(&entry.guid).or_else(|| non_empty(&entry.link));
    Ok(RawContentItem::new(source, date, title, guid, SourceItem::Hubble(details)))
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

pub struct HubbleFetcher {
    client: Client,
    feed_url: String,
    source: ContentSource,
}

impl HubbleFetcher {
    pub fn new(client: Client, feed_url: impl Into<String>, source: ContentSource) -> Self {
        Self {
            client,
            feed_url: feed_url.into(),
            source,
        }
    }

    pub async fn run(&self, store: &RawContentStore) -> Result<FetchReport> {
        info!(url = %self.feed_url, source = %self.source, "fetching ESA Hubble RSS");
        let body = fetch_text(&self.client, &self.feed_url).await?;
        let entries = parse_feed(&body)?;
        info!(entries = entries.len(), "ESA Hubble RSS parsed");

        let mut report = FetchReport::new(self.source);
        for entry in &entries {
            match to_raw_item(entry, self.source) {
                Ok(item) => ingest(store, &mut report, &item).await,
                Err(e) => report.record_error(entry.title.clone(), &e),
            }
        }
        report.log_summary();
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<rss version="2.0" xmlns:media="http://search.yahoo.com/mrss/" xmlns:content="http://purl.org/rss/1.0/modules/content/">
<channel>
  <title>ESA/Hubble Picture of the Week</title>
  <item>
    <title>A Galactic Spiral</title>
    <link>https://esahubble.org/images/potw2501a/</link>
    <guid>potw2501a</guid>
    <pubDate>Mon, 06 Jan 2025 06:00:00 +0100</pubDate>
    <description><![CDATA[<p>This <b>spiral</b> galaxy &amp; its arms.</p><img src="https://cdn.esahubble.org/thumb.jpg">]]></description>
    <media:content url="https://cdn.esahubble.org/small.jpg" type="image/jpeg" width="320" height="240"/>
    <media:content url="https://www.esahubble.orghttps://cdn.esahubble.org/large.jpg" type="image/jpeg" width="4000" height="3000"/>
    <media:content url="https://cdn.esahubble.org/medium.jpg" type="image/jpeg" width="1280" height="960"/>
    <media:credit>ESA/Hubble &amp; NASA</media:credit>
    <media:keywords>galaxy, spiral , ,Hubble</media:keywords>
  </item>
  <item>
    <title>Enclosure Only</title>
    <link>https://esahubble.org/images/potw2502a/</link>
    <pubDate>2025-01-13</pubDate>
    <description>No markup here</description>
    <enclosure url="https://cdn.esahubble.org/enc.jpg" type="image/jpeg" length="1"/>
  </item>
  <item>
    <title></title>
    <pubDate>Mon, 20 Jan 2025 06:00:00 +0100</pubDate>
  </item>
</channel>
</rss>"#;

    #[test]
    fn items_and_media_are_parsed() {
        let entries = parse_feed(FEED).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].title, "A Galactic Spiral");
        assert_eq!(entries[0].media.len(), 3);
        assert_eq!(entries[0].media[1].url, "https://cdn.esahubble.org/large.jpg");
        assert_eq!(entries[0].credit, "ESA/Hubble & NASA");
        assert!(entries[0].description.contains("<b>spiral</b>"));
        assert!(entries[1].enclosure.is_some());
    }

    #[test]
    fn largest_rendition_becomes_main_image() {
        let entries = parse_feed(FEED).unwrap();
        let item = to_raw_item(&entries[0], ContentSource::EsaHubblePotw).unwrap();
        assert_eq!(item.date, NaiveDate::from_ymd_opt(2025, 1, 6).unwrap());
        assert_eq!(item.guid.as_deref(), Some("potw2501a"));
        let SourceItem::Hubble(hubble) = &item.details else {
            panic!("expected hubble details");
        };
        assert_eq!(hubble.image_url.as_deref(), Some("https://cdn.esahubble.org/large.jpg"));
        assert_eq!(hubble.image_variants.len(), 2);
        assert_eq!(hubble.keywords, vec!["galaxy", "spiral", "Hubble"]);
        assert_eq!(hubble.excerpt, "This spiral galaxy & its arms.");
        assert_eq!(hubble.credit.as_deref(), Some("ESA/Hubble & NASA"));
    }

    #[test]
    fn enclosure_is_the_fallback_image() {
        let entries = parse_feed(FEED).unwrap();
        let item = to_raw_item(&entries[1], ContentSource::EsaHubble).unwrap();
        assert_eq!(item.image_url(), Some("https://cdn.esahubble.org/enc.jpg"));
        assert_eq!(item.guid.as_deref(), Some("https://esahubble.org/images/potw2502a/"));
    }

    #[test]
    fn description_image_is_the_last_resort() {
        let entry = FeedEntry {
            title: "Img".into(),
            link: "https://esahubble.org/images/x/".into(),
            pub_date: "2025-02-03".into(),
            description: r#"<p>Text</p><img src="/media/archives/images/x.jpg">"#.into(),
            ..Default::default()
        };
        let item = to_raw_item(&entry, ContentSource::EsaHubble).unwrap();
        assert_eq!(item.image_url(), Some("https://esahubble.org/media/archives/images/x.jpg"));
    }

    #[test]
    fn entry_without_title_is_rejected() {
        let entries = parse_feed(FEED).unwrap();
        assert!(to_raw_item(&entries[2], ContentSource::EsaHubble).is_err());
    }

    #[test]
    fn broken_xml_is_a_feed_error() {
        assert!(parse_feed("<rss><channel><item><title>x</item></rss>").is_err());
    }
}
