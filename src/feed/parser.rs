//! Streaming RSS parser.
//!
//! One forward pass over the tag stream, no DOM: memory use is bounded by
//! the largest single element, so arbitrarily large feeds parse in constant
//! space. The recognized shape is `rss > channel > item`; every unrecognized
//! tag and its whole subtree is skipped so unknown feed extensions never
//! abort the parse.

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;
use tokio::io::AsyncBufRead;

use crate::storage::Article;

/// RFC-822 style date format used by RSS 2.0 `pubDate` elements
pub const PUB_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

// ============================================================================
// Error Types
// ============================================================================

/// Errors that abort the whole parse.
///
/// Malformed *fields* (a bad date, a missing tag) are recovered locally with
/// fallback values instead; only a wrong document shape or broken XML syntax
/// surfaces here.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The document root is absent or is not `<rss>`
    #[error("Malformed feed: {0}")]
    MalformedFeed(String),

    /// The XML itself could not be read
    #[error("Feed XML error: {0}")]
    Xml(#[from] quick_xml::Error),
}

// ============================================================================
// Parsing
// ============================================================================

/// Parse an RSS document from a byte stream into articles in document order.
///
/// The returned list mirrors `<item>` order in the source; callers resort
/// for presentation (the store orders by publication date descending).
pub async fn parse<R>(reader: R) -> Result<Vec<Article>, ParseError>
where
    R: AsyncBufRead + Unpin,
{
    let mut xml = Reader::from_reader(reader);
    xml.config_mut().trim_text(true);

    let mut buf = Vec::new();

    // Locate the document root, tolerating prolog, comments and doctype
    loop {
        buf.clear();
        match xml.read_event_into_async(&mut buf).await? {
            Event::Start(e) => {
                if e.name().as_ref() != b"rss" {
                    let root = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    return Err(ParseError::MalformedFeed(format!(
                        "expected <rss> document root, found <{}>",
                        root
                    )));
                }
                break;
            }
            Event::Empty(e) => {
                // A childless <rss/> is a valid, empty feed
                if e.name().as_ref() == b"rss" {
                    return Ok(Vec::new());
                }
                let root = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                return Err(ParseError::MalformedFeed(format!(
                    "expected <rss> document root, found <{}>",
                    root
                )));
            }
            Event::Eof => {
                return Err(ParseError::MalformedFeed(
                    "document has no root element".to_string(),
                ));
            }
            _ => {}
        }
    }

    // Inside <rss>: read every <channel>, skip anything else
    let mut articles = Vec::new();
    loop {
        buf.clear();
        match xml.read_event_into_async(&mut buf).await? {
            Event::Start(e) => {
                if e.name().as_ref() == b"channel" {
                    read_channel(&mut xml, &mut articles).await?;
                } else {
                    skip_subtree(&mut xml).await?;
                }
            }
            Event::End(_) | Event::Eof => break,
            _ => {}
        }
    }

    Ok(articles)
}

/// Read `<item>` children of a `<channel>`, appending in document order
async fn read_channel<R>(xml: &mut Reader<R>, articles: &mut Vec<Article>) -> Result<(), ParseError>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match xml.read_event_into_async(&mut buf).await? {
            Event::Start(e) => {
                if e.name().as_ref() == b"item" {
                    articles.push(read_item(xml).await?);
                } else {
                    skip_subtree(xml).await?;
                }
            }
            Event::End(_) | Event::Eof => return Ok(()),
            _ => {}
        }
    }
}

/// Read one `<item>` into an [`Article`].
///
/// Missing tags leave their documented defaults: empty strings, an empty
/// keyword list, and the ingestion time for the publication date.
async fn read_item<R>(xml: &mut Reader<R>) -> Result<Article, ParseError>
where
    R: AsyncBufRead + Unpin,
{
    let mut article = Article {
        id: String::new(),
        title: String::new(),
        description: String::new(),
        author: String::new(),
        link: String::new(),
        image_url: String::new(),
        published: Utc::now().timestamp(),
        keywords: Vec::new(),
    };

    let mut buf = Vec::new();
    loop {
        buf.clear();
        match xml.read_event_into_async(&mut buf).await? {
            Event::Start(e) => match e.name().as_ref() {
                b"guid" => article.id = read_text(xml).await?,
                b"title" => article.title = read_text(xml).await?,
                b"description" => article.description = read_text(xml).await?,
                b"dc:creator" => article.author = read_text(xml).await?,
                b"link" => article.link = read_text(xml).await?,
                b"pubDate" => {
                    let raw = read_text(xml).await?;
                    article.published = parse_pub_date(&raw).unwrap_or_else(|| {
                        tracing::debug!(
                            date = %raw,
                            "unparseable pubDate, falling back to ingestion time"
                        );
                        Utc::now().timestamp()
                    });
                }
                b"category" => article.keywords.push(read_text(xml).await?),
                b"media:content" => {
                    // Attributes carry everything we need; the subtree
                    // (media:keywords and friends) is ignored. Last
                    // qualifying image wins.
                    let candidate = media_image_url(&e);
                    skip_subtree(xml).await?;
                    if let Some(url) = candidate {
                        article.image_url = url;
                    }
                }
                _ => skip_subtree(xml).await?,
            },
            Event::Empty(e) => {
                if e.name().as_ref() == b"media:content" {
                    if let Some(url) = media_image_url(&e) {
                        article.image_url = url;
                    }
                }
            }
            Event::End(_) | Event::Eof => return Ok(article),
            _ => {}
        }
    }
}

/// Extract the `url` attribute of a `media:content` tag whose `medium`
/// attribute contains "image"; anything else is not an image candidate.
fn media_image_url(tag: &BytesStart) -> Option<String> {
    let mut url = None;
    let mut is_image = false;

    for attr in tag.attributes().flatten() {
        match attr.key.as_ref() {
            b"url" => {
                url = Some(match attr.unescape_value() {
                    Ok(value) => value.into_owned(),
                    Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
                });
            }
            b"medium" => {
                is_image = String::from_utf8_lossy(&attr.value).contains("image");
            }
            _ => {}
        }
    }

    if is_image {
        url
    } else {
        None
    }
}

/// Collect the text content of the current element up to its end tag.
/// Nested markup is skipped; only top-level text and CDATA count.
async fn read_text<R>(xml: &mut Reader<R>) -> Result<String, ParseError>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let mut text = String::new();
    let mut depth = 1usize;

    loop {
        buf.clear();
        match xml.read_event_into_async(&mut buf).await? {
            Event::Text(e) => {
                if depth == 1 {
                    match e.unescape() {
                        Ok(value) => text.push_str(&value),
                        Err(_) => text.push_str(&String::from_utf8_lossy(e.as_ref())),
                    }
                }
            }
            Event::CData(e) => {
                if depth == 1 {
                    text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
            }
            Event::Start(_) => depth += 1,
            Event::End(_) => {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(text)
}

/// Skip the current element and its entire subtree without interpreting it
async fn skip_subtree<R>(xml: &mut Reader<R>) -> Result<(), ParseError>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let mut depth = 1usize;

    while depth > 0 {
        buf.clear();
        match xml.read_event_into_async(&mut buf).await? {
            Event::Start(_) => depth += 1,
            Event::End(_) => depth -= 1,
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(())
}

/// Parse an RFC-822 style date string to unix seconds.
///
/// Some feeds write a literal `Z` zone marker, which the numeric-offset
/// format rejects; the second attempt normalizes it to `+0000`.
fn parse_pub_date(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    DateTime::parse_from_str(trimmed, PUB_DATE_FORMAT)
        .or_else(|_| DateTime::parse_from_str(&trimmed.replace('Z', "+0000"), PUB_DATE_FORMAT))
        .ok()
        .map(|date| date.timestamp())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    async fn parse_str(xml: &str) -> Result<Vec<Article>, ParseError> {
        parse(xml.as_bytes()).await
    }

    const THREE_ITEMS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Example News</title>
    <item>
      <guid>item-1</guid>
      <title>First</title>
      <description>First description</description>
      <dc:creator>Alice</dc:creator>
      <pubDate>Mon, 01 Jan 2024 10:00:00 +0000</pubDate>
      <link>https://example.com/1</link>
      <category>tech</category>
      <category>ai</category>
    </item>
    <item>
      <guid>item-2</guid>
      <title>Second</title>
      <pubDate>Tue, 02 Jan 2024 10:00:00 +0000</pubDate>
    </item>
    <item>
      <guid>item-3</guid>
      <title>Third</title>
      <pubDate>Wed, 03 Jan 2024 10:00:00 +0000</pubDate>
    </item>
  </channel>
</rss>"#;

    #[tokio::test]
    async fn test_item_count_and_document_order() {
        let articles = parse_str(THREE_ITEMS).await.unwrap();
        assert_eq!(articles.len(), 3);
        let ids: Vec<&str> = articles.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["item-1", "item-2", "item-3"]);
    }

    #[tokio::test]
    async fn test_all_fields_mapped() {
        let articles = parse_str(THREE_ITEMS).await.unwrap();
        let first = &articles[0];
        assert_eq!(first.title, "First");
        assert_eq!(first.description, "First description");
        assert_eq!(first.author, "Alice");
        assert_eq!(first.link, "https://example.com/1");
        assert_eq!(first.keywords, vec!["tech", "ai"]);
        // Mon, 01 Jan 2024 10:00:00 +0000
        assert_eq!(first.published, 1704103200);
    }

    #[tokio::test]
    async fn test_missing_optional_tags_yield_defaults() {
        let articles = parse_str(THREE_ITEMS).await.unwrap();
        let second = &articles[1];
        assert_eq!(second.description, "");
        assert_eq!(second.author, "");
        assert_eq!(second.link, "");
        assert_eq!(second.image_url, "");
        assert!(second.keywords.is_empty());
    }

    #[tokio::test]
    async fn test_missing_pub_date_falls_back_to_now() {
        let xml = r#"<rss><channel>
            <item><guid>a</guid><pubDate>Mon, 01 Jan 2024 10:00:00 +0000</pubDate></item>
            <item><guid>b</guid></item>
            <item><guid>c</guid><pubDate>Wed, 03 Jan 2024 10:00:00 +0000</pubDate></item>
        </channel></rss>"#;

        let before = Utc::now().timestamp();
        let articles = parse_str(xml).await.unwrap();
        let after = Utc::now().timestamp();

        assert_eq!(articles.len(), 3);
        assert!(articles[1].published >= before && articles[1].published <= after);
    }

    #[tokio::test]
    async fn test_unparseable_date_does_not_drop_article() {
        let xml = r#"<rss><channel>
            <item><guid>a</guid><pubDate>yesterday-ish</pubDate></item>
        </channel></rss>"#;

        let before = Utc::now().timestamp();
        let articles = parse_str(xml).await.unwrap();
        assert_eq!(articles.len(), 1);
        assert!(articles[0].published >= before);
    }

    #[tokio::test]
    async fn test_literal_z_zone_marker_normalized() {
        let xml = r#"<rss><channel>
            <item><guid>a</guid><pubDate>Mon, 01 Jan 2024 10:00:00 Z</pubDate></item>
        </channel></rss>"#;

        let articles = parse_str(xml).await.unwrap();
        assert_eq!(articles[0].published, 1704103200);
    }

    #[tokio::test]
    async fn test_unknown_tags_skipped_with_subtrees() {
        let xml = r#"<rss><channel>
            <weird><nested><deeper>junk</deeper></nested></weird>
            <item>
                <guid>a</guid>
                <mystery attr="x"><inner>ignored</inner></mystery>
                <title>Survives</title>
            </item>
        </channel></rss>"#;

        let articles = parse_str(xml).await.unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].title, "Survives");
    }

    #[tokio::test]
    async fn test_media_content_image_medium() {
        let xml = r#"<rss><channel><item>
            <guid>a</guid>
            <media:content medium="image" url="https://img.example.com/a.jpg"/>
        </item></channel></rss>"#;

        let articles = parse_str(xml).await.unwrap();
        assert_eq!(articles[0].image_url, "https://img.example.com/a.jpg");
    }

    #[tokio::test]
    async fn test_media_content_non_image_ignored() {
        let xml = r#"<rss><channel><item>
            <guid>a</guid>
            <media:content medium="video" url="https://img.example.com/a.mp4"/>
        </item></channel></rss>"#;

        let articles = parse_str(xml).await.unwrap();
        assert_eq!(articles[0].image_url, "");
    }

    #[tokio::test]
    async fn test_media_content_last_qualifying_wins() {
        let xml = r#"<rss><channel><item>
            <guid>a</guid>
            <media:content medium="image" url="https://img.example.com/one.jpg">
                <media:keywords>headline</media:keywords>
            </media:content>
            <media:content medium="image" url="https://img.example.com/two.jpg"/>
        </item></channel></rss>"#;

        let articles = parse_str(xml).await.unwrap();
        assert_eq!(articles[0].image_url, "https://img.example.com/two.jpg");
    }

    #[tokio::test]
    async fn test_cdata_description() {
        let xml = r#"<rss><channel><item>
            <guid>a</guid>
            <description><![CDATA[Bold <b>markup</b> &amp; more]]></description>
        </item></channel></rss>"#;

        let articles = parse_str(xml).await.unwrap();
        assert_eq!(articles[0].description, "Bold <b>markup</b> &amp; more");
    }

    #[tokio::test]
    async fn test_entity_unescaped_in_text() {
        let xml = r#"<rss><channel><item>
            <guid>a</guid>
            <title>Cats &amp; Dogs</title>
        </item></channel></rss>"#;

        let articles = parse_str(xml).await.unwrap();
        assert_eq!(articles[0].title, "Cats & Dogs");
    }

    #[tokio::test]
    async fn test_wrong_root_is_malformed_feed() {
        let result = parse_str("<feed><entry/></feed>").await;
        assert!(matches!(result, Err(ParseError::MalformedFeed(_))));
    }

    #[tokio::test]
    async fn test_empty_document_is_malformed_feed() {
        let result = parse_str("").await;
        assert!(matches!(result, Err(ParseError::MalformedFeed(_))));
    }

    #[tokio::test]
    async fn test_empty_channel_yields_no_articles() {
        let articles = parse_str("<rss><channel></channel></rss>").await.unwrap();
        assert!(articles.is_empty());
    }

    #[test]
    fn test_parse_pub_date_valid() {
        assert_eq!(
            parse_pub_date("Mon, 01 Jan 2024 10:00:00 +0000"),
            Some(1704103200)
        );
    }

    #[test]
    fn test_parse_pub_date_offset_applied() {
        // +0200 is two hours ahead of UTC
        assert_eq!(
            parse_pub_date("Mon, 01 Jan 2024 12:00:00 +0200"),
            Some(1704103200)
        );
    }

    #[test]
    fn test_parse_pub_date_garbage() {
        assert_eq!(parse_pub_date("not a date"), None);
        assert_eq!(parse_pub_date(""), None);
    }
}
