//! Community link sets.
//!
//! The widget ships a default set of community links. The configured
//! endpoint may return location specific sets, each with a `level`; the
//! highest level set that names a link overrides the default.

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::OnceLock;
use tracing::{debug, warn};

use crate::context::RequestContext;
use crate::geo::{FeedData, FeedFormat, GeoClient};
use crate::translate::Translator;

/// Named community links, in the order they were configured.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct LinkSet {
    links: Map<String, Value>,
}

impl From<Map<String, Value>> for LinkSet {
    fn from(map: Map<String, Value>) -> Self {
        map.into_iter()
            .filter_map(|(name, value)| as_url(&value).map(|url| (name, url)))
            .collect()
    }
}

impl From<LinkSet> for Map<String, Value> {
    fn from(set: LinkSet) -> Self {
        set.links
    }
}

impl FromIterator<(String, String)> for LinkSet {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            links: iter
                .into_iter()
                .map(|(name, url)| (name, Value::String(url)))
                .collect(),
        }
    }
}

impl LinkSet {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.links.get(name).and_then(Value::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.links.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.links
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|url| (k.as_str(), url)))
    }

    /// Overrides defaults with the values of `api_sets`.
    ///
    /// Sets are ranked by `level`, highest first; equal levels keep their
    /// input order. For every default link the first ranked set naming it
    /// wins. Names the defaults don't know are ignored.
    pub fn merge(&mut self, mut api_sets: Vec<Map<String, Value>>) {
        api_sets.sort_by_key(|set| std::cmp::Reverse(level(set)));

        for (name, url) in self.links.iter_mut() {
            let found = api_sets.iter().find_map(|set| set.get(name).and_then(as_url));
            if let Some(new_url) = found {
                debug!("Link '{}' overridden with {}", name, new_url);
                *url = Value::String(new_url);
            }
        }
    }
}

fn level(set: &Map<String, Value>) -> i64 {
    match set.get("level") {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

fn as_url(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Loads the link set for `geolocation`: the defaults, overridden by what
/// `endpoint` returns. A failing endpoint leaves the defaults untouched.
pub async fn get_links(
    geo: &GeoClient,
    ctx: &RequestContext,
    endpoint: &str,
    geolocation: &str,
    defaults: &LinkSet,
) -> LinkSet {
    let mut links = defaults.clone();
    let vars = [("location", geolocation)];

    match geo.fetch_and_parse(ctx, endpoint, &vars, FeedFormat::Json).await {
        Some(FeedData::Json(Value::Array(sets))) => {
            let sets = sets
                .into_iter()
                .filter_map(|set| match set {
                    Value::Object(map) => Some(map),
                    _ => None,
                })
                .collect();
            links.merge(sets);
        }
        Some(_) => warn!("Link endpoint {} did not return a list of link sets", endpoint),
        None => {}
    }
    links
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{(.*?)\}").expect("valid placeholder regex"))
}

/// Replaces `{name}` placeholders in `text`.
///
/// Known links become anchors labelled with the translated term, unknown
/// names become the translated term alone.
pub fn replace_text(text: &str, links: &LinkSet, translator: &dyn Translator) -> String {
    placeholder_pattern()
        .replace_all(text, |caps: &Captures| {
            let name = &caps[1];
            let term = translator.text(&format!("MOD_COMMUNITY_INFO_TERMS_{}", name.to_uppercase()));
            match links.get(&name.to_lowercase()) {
                Some(url) => format!(r#"<a href="{}" target="_blank">{}</a>"#, url, term),
                None => term,
            }
        })
        .into_owned()
}
