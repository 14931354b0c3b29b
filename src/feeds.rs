//! News and events feeds.
//!
//! Both feeds are fetched on demand, sorted and trimmed, and never stored.
//! An unavailable feed is an empty list; the reason has already been queued
//! as a warning by [`GeoClient::fetch_and_parse`].

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::context::RequestContext;
use crate::geo::{FeedData, FeedFormat, GeoClient, RssItem};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    pub guid: String,
    /// Description for news, venue for events.
    pub description: String,
    pub category: String,
    /// Publish date for news, start for events, as sent by the feed.
    pub date: String,
    #[serde(skip)]
    pub timestamp: Option<DateTime<FixedOffset>>,
}

impl From<RssItem> for FeedItem {
    fn from(item: RssItem) -> Self {
        Self {
            timestamp: parse_timestamp(&item.pub_date),
            title: item.title.trim().to_string(),
            link: first(&item.link),
            guid: item.guid.value.trim().to_string(),
            description: item.description,
            category: item
                .category
                .first()
                .map(|c| c.value.trim().to_string())
                .unwrap_or_default(),
            date: item.pub_date.trim().to_string(),
        }
    }
}

/// RSS elements may repeat; the first one counts.
fn first(values: &[String]) -> String {
    values.first().map(|v| v.trim().to_string()).unwrap_or_default()
}

impl FeedItem {
    /// Builds an item from one entry of the events JSON.
    fn from_event(event: &Value) -> Self {
        let date = field(event, &["start", "pubDate"]);
        Self {
            title: field(event, &["title"]),
            link: field(event, &["url", "link"]),
            guid: field(event, &["id", "guid"]),
            description: field(event, &["location", "description"]),
            category: field(event, &["category"]),
            timestamp: parse_timestamp(&date),
            date,
        }
    }
}

/// First present key of `keys`, stringified.
fn field(obj: &Value, keys: &[&str]) -> String {
    keys.iter()
        .find_map(|k| match obj.get(*k)? {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        })
        .unwrap_or_default()
}

/// Parses the date formats seen in feeds: RFC 2822 (RSS), RFC 3339 and
/// plain `YYYY-MM-DD[ HH:MM[:SS]]` taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc2822(raw) {
        return Some(ts);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts);
    }

    let utc = FixedOffset::east_opt(0)?;
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc().with_timezone(&utc));
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().with_timezone(&utc))
}

/// The `num` most recent news articles of an RSS feed, newest first.
pub async fn get_news_feed(
    geo: &GeoClient,
    ctx: &RequestContext,
    url: &str,
    num: usize,
) -> Vec<FeedItem> {
    let Some(FeedData::Xml(rss)) = geo.fetch_and_parse(ctx, url, &[], FeedFormat::Xml).await else {
        return Vec::new();
    };

    let items: Vec<FeedItem> = rss.channel.items.into_iter().map(FeedItem::from).collect();
    debug!("News feed {} returned {} items", url, items.len());
    newest_first(items, num)
}

/// The next `num` events of a JSON events feed, earliest first.
pub async fn get_events_feed(
    geo: &GeoClient,
    ctx: &RequestContext,
    url: &str,
    num: usize,
) -> Vec<FeedItem> {
    let Some(FeedData::Json(json)) = geo.fetch_and_parse(ctx, url, &[], FeedFormat::Json).await
    else {
        return Vec::new();
    };

    let Value::Array(events) = json else {
        warn!("Events feed {} did not return a list", url);
        return Vec::new();
    };

    let items: Vec<FeedItem> = events.iter().map(FeedItem::from_event).collect();
    debug!("Events feed {} returned {} items", url, items.len());
    earliest_first(items, num)
}

/// Sorts by timestamp descending and keeps `num`. Undated items go last.
pub fn newest_first(mut items: Vec<FeedItem>, num: usize) -> Vec<FeedItem> {
    items.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    items.truncate(num);
    items
}

/// Sorts by timestamp ascending and keeps `num`. Undated items go first.
pub fn earliest_first(mut items: Vec<FeedItem>, num: usize) -> Vec<FeedItem> {
    items.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    items.truncate(num);
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Identity;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::time::Duration;

    fn client() -> GeoClient {
        let identity = Identity {
            contact_email: "info@example.org".to_string(),
            domain: "http://localhost".to_string(),
        };
        GeoClient::new(identity, Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn parses_feed_dates() {
        let rss = parse_timestamp("Tue, 01 Oct 2024 10:00:00 +0200").unwrap();
        assert_eq!(rss.to_rfc3339(), "2024-10-01T10:00:00+02:00");

        let iso = parse_timestamp("2024-10-01T08:00:00Z").unwrap();
        assert_eq!(iso, rss);

        let plain = parse_timestamp("2024-10-01 08:00:00").unwrap();
        assert_eq!(plain, rss);

        assert!(parse_timestamp("2024-10-01").is_some());
        assert!(parse_timestamp("soon").is_none());
    }

    #[tokio::test]
    async fn events_sorted_ascending_and_truncated() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/events.json");
                then.status(200).json_body(json!([
                    {"id": 3, "title": "JoomlaDay", "url": "https://e/3", "start": "2025-06-01 09:00:00", "location": "Berlin"},
                    {"id": 1, "title": "Meetup", "url": "https://e/1", "start": "2025-01-15 18:00:00", "location": "London"},
                    {"id": 4, "title": "World Conference", "url": "https://e/4", "start": "2025-11-20 09:00:00"},
                    {"id": 2, "title": "Sprint", "url": "https://e/2", "start": "2025-03-02T10:00:00+01:00", "category": "dev"}
                ]));
            })
            .await;

        let ctx = RequestContext::new(1, "en-UK");
        let events = get_events_feed(&client(), &ctx, &server.url("/events.json"), 3).await;

        let titles: Vec<&str> = events.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, ["Meetup", "Sprint", "JoomlaDay"]);
        assert_eq!(events[0].guid, "1");
        assert_eq!(events[0].link, "https://e/1");
        assert_eq!(events[0].description, "London");
        assert_eq!(events[1].category, "dev");
    }

    #[tokio::test]
    async fn news_sorted_descending() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/news.xml");
                then.status(200).body(
                    r#"<rss version="2.0"><channel><title>Joomla</title>
<item><title>Old</title><link>https://n/1</link><pubDate>Mon, 01 Jan 2024 10:00:00 +0000</pubDate></item>
<item><title>New</title><link>https://n/3</link><pubDate>Fri, 01 Mar 2024 10:00:00 +0000</pubDate></item>
<item><title>Middle</title><link>https://n/2</link><pubDate>Thu, 01 Feb 2024 10:00:00 +0000</pubDate></item>
</channel></rss>"#,
                );
            })
            .await;

        let ctx = RequestContext::new(1, "en-UK");
        let news = get_news_feed(&client(), &ctx, &server.url("/news.xml"), 2).await;

        let titles: Vec<&str> = news.iter().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, ["New", "Middle"]);
        assert_eq!(news[0].date, "Fri, 01 Mar 2024 10:00:00 +0000");
    }

    #[tokio::test]
    async fn repeated_rss_elements_take_the_first() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/news.xml");
                then.status(200).body(
                    r#"<rss version="2.0"><channel><title>Joomla</title>
<item>
  <title>Security release</title>
  <link>https://n/5</link>
  <category>Releases</category>
  <category>Security</category>
  <pubDate>Mon, 01 Jan 2024 10:00:00 +0000</pubDate>
  <category>Announcements</category>
</item>
</channel></rss>"#,
                );
            })
            .await;

        let ctx = RequestContext::new(1, "en-UK");
        let news = get_news_feed(&client(), &ctx, &server.url("/news.xml"), 3).await;

        assert_eq!(news.len(), 1);
        assert_eq!(news[0].title, "Security release");
        assert_eq!(news[0].link, "https://n/5");
        assert_eq!(news[0].category, "Releases");
        assert!(ctx.notices.snapshot().is_empty());
    }

    #[tokio::test]
    async fn unavailable_feed_is_empty() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/events.json");
                then.status(404);
            })
            .await;

        let ctx = RequestContext::new(1, "en-UK");
        let events = get_events_feed(&client(), &ctx, &server.url("/events.json"), 3).await;
        assert!(events.is_empty());
        assert_eq!(ctx.notices.snapshot().len(), 1);
    }

    #[test]
    fn undated_items_sort_to_the_edges() {
        let item = |title: &str, date: &str| FeedItem {
            title: title.to_string(),
            link: String::new(),
            guid: String::new(),
            description: String::new(),
            category: String::new(),
            date: date.to_string(),
            timestamp: parse_timestamp(date),
        };
        let items = vec![item("dated", "2024-01-01"), item("undated", "tbd")];

        assert_eq!(earliest_first(items.clone(), 5)[0].title, "undated");
        assert_eq!(newest_first(items, 5)[0].title, "dated");
    }
}
