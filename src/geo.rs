//! Outbound HTTP for the widget.
//!
//! [`GeoClient`] talks to two kinds of read-only services: the Nominatim
//! reverse geocoder and the operator configured feeds (links, news, events).
//! Every request identifies the site through `User-Agent` (contact e-mail)
//! and `Referer` (base domain), as the Nominatim usage policy requires.
//!
//! The `try_*`/[`fetch`](GeoClient::fetch) methods return a [`FetchError`];
//! the plain variants degrade to the documented fallback and queue a warning
//! notice instead.

use reqwest::header::{REFERER, USER_AGENT};
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Config;
use crate::context::RequestContext;

pub const NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid url '{0}'")]
    InvalidUrl(String),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid XML: {0}")]
    Xml(#[from] quick_xml::DeError),
    #[error("response has no address")]
    MissingAddress,
}

/// Who is calling, sent along with every request.
#[derive(Debug, Clone)]
pub struct Identity {
    pub contact_email: String,
    pub domain: String,
}

/// The expected body format of a fetched resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedFormat {
    Json,
    Xml,
    Raw,
}

#[derive(Debug, Clone)]
pub enum FeedData {
    Json(Value),
    Xml(Rss),
    Raw(String),
}

/// RSS 2.0 document, reduced to what the news feed needs.
#[derive(Debug, Clone, Deserialize)]
pub struct Rss {
    pub channel: Channel,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Channel {
    #[serde(rename = "item", default)]
    pub items: Vec<RssItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RssItem {
    pub title: String,
    pub link: Vec<String>,
    pub guid: XmlText,
    pub description: String,
    pub category: Vec<XmlText>,
    #[serde(rename = "pubDate")]
    pub pub_date: String,
}

/// Text content of an element that may carry attributes
/// (`<guid isPermaLink="false">`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct XmlText {
    #[serde(rename = "$text", default)]
    pub value: String,
}

#[derive(Deserialize)]
struct ReverseResponse {
    address: Option<Address>,
}

#[derive(Deserialize)]
struct Address {
    city: Option<String>,
    town: Option<String>,
    state: Option<String>,
    country_code: Option<String>,
}

impl Address {
    /// "{city or town}, {state}, {COUNTRY}", skipping missing parts.
    fn label(&self) -> String {
        let parts = [
            self.city.clone().or_else(|| self.town.clone()),
            self.state.clone(),
            self.country_code.as_ref().map(|c| c.to_uppercase()),
        ];

        parts
            .into_iter()
            .flatten()
            .filter(|p| !p.trim().is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

pub struct GeoClient {
    client: Client,
    identity: Identity,
    nominatim_url: String,
}

impl GeoClient {
    pub fn new(identity: Identity, timeout: Duration) -> Result<Self, FetchError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            identity,
            nominatim_url: NOMINATIM_URL.to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, FetchError> {
        let identity = Identity {
            contact_email: config.site.contact_email.trim().to_string(),
            domain: config.domain().to_string(),
        };
        let client = Self::new(identity, Duration::from_secs(config.http.timeout_seconds))?;
        Ok(client.with_nominatim_url(&config.http.nominatim_url))
    }

    pub fn with_nominatim_url(mut self, url: &str) -> Self {
        self.nominatim_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Turns a coordinate pair into a place name.
    pub async fn try_reverse_geocode(&self, lat: &str, lng: &str) -> Result<String, FetchError> {
        let url = format!("{}/reverse", self.nominatim_url);
        let body = self
            .get(&url, &[("format", "jsonv2"), ("lat", lat.trim()), ("lon", lng.trim())])
            .await?;

        let res: ReverseResponse = serde_json::from_str(&body)?;
        let label = res.address.ok_or(FetchError::MissingAddress)?.label();
        if label.is_empty() {
            return Err(FetchError::MissingAddress);
        }
        Ok(label)
    }

    /// Like [`try_reverse_geocode`](Self::try_reverse_geocode), falling back
    /// to `"{lat}, {lng}"` and a warning notice on failure.
    pub async fn reverse_geocode(&self, ctx: &RequestContext, lat: &str, lng: &str) -> String {
        match self.try_reverse_geocode(lat, lng).await {
            Ok(label) => {
                debug!("Reverse geocoded ({}, {}) to '{}'", lat, lng, label);
                label
            }
            Err(e) => {
                warn!(
                    "Reverse geocoding failed for ({}, {}): {}. Domain: {}, contact: {}",
                    lat, lng, e, self.identity.domain, self.identity.contact_email
                );
                ctx.notices.warning(ctx.translator.sprintf(
                    "MOD_COMMUNITY_ERROR_OPENSTREATMAP_NOMINATIM",
                    &[&self.identity.domain, &self.identity.contact_email],
                ));
                format!("{}, {}", lat, lng)
            }
        }
    }

    /// Fetches `url` with `vars` as query string and parses the body.
    pub async fn fetch(
        &self,
        url: &str,
        vars: &[(&str, &str)],
        format: FeedFormat,
    ) -> Result<FeedData, FetchError> {
        let body = self.get(url, vars).await?;

        Ok(match format {
            FeedFormat::Json => FeedData::Json(serde_json::from_str(&body)?),
            FeedFormat::Xml => FeedData::Xml(quick_xml::de::from_str(&body)?),
            FeedFormat::Raw => FeedData::Raw(body),
        })
    }

    /// Like [`fetch`](Self::fetch), but `None` means "feed unavailable" and a
    /// warning naming the target has been queued.
    pub async fn fetch_and_parse(
        &self,
        ctx: &RequestContext,
        url: &str,
        vars: &[(&str, &str)],
        format: FeedFormat,
    ) -> Option<FeedData> {
        match self.fetch(url, vars, format).await {
            Ok(data) => Some(data),
            Err(e) => {
                let target = target_url(url, vars);
                warn!("Fetching {} failed: {}", target, e);
                ctx.notices
                    .warning(ctx.translator.sprintf("MOD_COMMUNITY_ERROR_FETCH_API", &[&target]));
                None
            }
        }
    }

    async fn get(&self, url: &str, vars: &[(&str, &str)]) -> Result<String, FetchError> {
        let target = request_url(url, vars).ok_or_else(|| FetchError::InvalidUrl(url.to_string()))?;

        let res = self
            .client
            .get(target)
            .header(USER_AGENT, self.identity.contact_email.trim())
            .header(REFERER, self.identity.domain.trim())
            .send()
            .await?;

        if !res.status().is_success() {
            return Err(FetchError::Status(res.status().as_u16()));
        }
        Ok(res.text().await?)
    }
}

/// `url` with `vars` appended to its query string, if there are any.
fn request_url(url: &str, vars: &[(&str, &str)]) -> Option<Url> {
    if vars.is_empty() {
        Url::parse(url).ok()
    } else {
        Url::parse_with_params(url, vars).ok()
    }
}

/// The full request URL, for diagnostics.
fn target_url(url: &str, vars: &[(&str, &str)]) -> String {
    request_url(url, vars)
        .map(|u| u.to_string())
        .unwrap_or_else(|| url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::NoticeLevel;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client(server: &MockServer) -> GeoClient {
        let identity = Identity {
            contact_email: "admin@example.org".to_string(),
            domain: "https://www.example.org".to_string(),
        };
        GeoClient::new(identity, Duration::from_secs(2))
            .unwrap()
            .with_nominatim_url(&server.base_url())
    }

    #[tokio::test]
    async fn reverse_geocode_composes_label() {
        let server = MockServer::start_async().await;
        let m = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/reverse")
                    .query_param("format", "jsonv2")
                    .query_param("lat", "40.4168")
                    .query_param("lon", "-3.7038")
                    .header("user-agent", "admin@example.org")
                    .header("referer", "https://www.example.org");
                then.status(200).json_body(json!({
                    "address": {
                        "city": "Madrid",
                        "town": "Not used",
                        "state": "Comunidad de Madrid",
                        "country_code": "es"
                    }
                }));
            })
            .await;

        let ctx = RequestContext::new(1, "en-UK");
        let label = client(&server).reverse_geocode(&ctx, " 40.4168", "-3.7038 ").await;
        m.assert_async().await;
        assert_eq!(label, "Madrid, Comunidad de Madrid, ES");
        assert!(ctx.notices.snapshot().is_empty());
    }

    #[tokio::test]
    async fn reverse_geocode_skips_missing_parts() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/reverse");
                then.status(200)
                    .json_body(json!({"address": {"town": "Hay-on-Wye", "country_code": "gb"}}));
            })
            .await;

        let label = client(&server).try_reverse_geocode("52.07", "-3.12").await.unwrap();
        assert_eq!(label, "Hay-on-Wye, GB");
    }

    #[tokio::test]
    async fn reverse_geocode_without_address_falls_back() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/reverse");
                then.status(200).json_body(json!({"error": "Unable to geocode"}));
            })
            .await;

        let ctx = RequestContext::new(1, "en-UK");
        let label = client(&server).reverse_geocode(&ctx, "0.0", "-150.0").await;
        assert_eq!(label, "0.0, -150.0");

        let notices = ctx.notices.snapshot();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Warning);
        assert!(notices[0].message.contains("https://www.example.org"));
        assert!(notices[0].message.contains("admin@example.org"));
    }

    #[tokio::test]
    async fn reverse_geocode_server_error_falls_back() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/reverse");
                then.status(503);
            })
            .await;

        let geo = client(&server);
        assert!(matches!(
            geo.try_reverse_geocode("1.0", "2.0").await,
            Err(FetchError::Status(503))
        ));
    }

    #[tokio::test]
    async fn fetch_parses_rss() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/feed.xml");
                then.status(200).body(
                    r#"<?xml version="1.0" encoding="utf-8"?>
<rss version="2.0">
  <channel>
    <title>News</title>
    <item>
      <title>Release</title>
      <link>https://example.org/release</link>
      <guid isPermaLink="false">r-1</guid>
      <description><![CDATA[<p>Out now</p>]]></description>
      <category>Releases</category>
      <pubDate>Tue, 01 Oct 2024 10:00:00 +0000</pubDate>
    </item>
  </channel>
</rss>"#,
                );
            })
            .await;

        let data = client(&server)
            .fetch(&server.url("/feed.xml"), &[], FeedFormat::Xml)
            .await
            .unwrap();

        let FeedData::Xml(rss) = data else {
            panic!("expected xml");
        };
        assert_eq!(rss.channel.items.len(), 1);
        let item = &rss.channel.items[0];
        assert_eq!(item.title, "Release");
        assert_eq!(item.guid.value, "r-1");
        assert_eq!(item.description, "<p>Out now</p>");
        assert_eq!(item.link, ["https://example.org/release"]);
        assert_eq!(item.category.len(), 1);
        assert_eq!(item.category[0].value, "Releases");
    }

    #[tokio::test]
    async fn fetch_and_parse_reports_target() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/links");
                then.status(200).body("<html>not json</html>");
            })
            .await;

        let ctx = RequestContext::new(1, "en-UK");
        let url = server.url("/links");
        let data = client(&server)
            .fetch_and_parse(&ctx, &url, &[("location", "51.5,0.1")], FeedFormat::Json)
            .await;

        assert!(data.is_none());
        let notices = ctx.notices.snapshot();
        assert_eq!(notices.len(), 1);
        assert!(notices[0].message.contains("/links?location=51.5%2C0.1"));
    }

    #[tokio::test]
    async fn fetch_without_vars_keeps_url_as_is() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/news.xml");
                then.status(500);
            })
            .await;

        let ctx = RequestContext::new(1, "en-UK");
        let url = server.url("/news.xml");
        let data = client(&server)
            .fetch_and_parse(&ctx, &url, &[], FeedFormat::Xml)
            .await;

        assert!(data.is_none());
        let notices = ctx.notices.snapshot();
        assert_eq!(notices.len(), 1);
        assert!(notices[0].message.contains(&format!("{}.", url)), "{}", notices[0].message);
        assert!(!notices[0].message.contains("?"));
    }

    #[tokio::test]
    async fn fetch_rejects_invalid_url() {
        let server = MockServer::start_async().await;
        let err = client(&server)
            .fetch("not a url", &[], FeedFormat::Raw)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl(_)));
    }
}
