//! Module parameters.
//!
//! The host stores a module's configuration as a JSON object. Only a handful
//! of keys matter here; everything else is carried through untouched so a
//! write never loses settings owned by the host.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const KEY_LOCATION: &str = "location";
pub const KEY_AUTO_LOCATION: &str = "auto_location";
pub const KEY_FALLBACK_LOCATION: &str = "fallback-location";
pub const KEY_ENDPOINT: &str = "endpoint";
pub const KEY_NEWS_FEED: &str = "news-feed";
pub const KEY_EVENTS_FEED: &str = "events-feed";
pub const KEY_NEWS_COUNT: &str = "news-count";
pub const KEY_EVENTS_COUNT: &str = "events-count";

pub const DEFAULT_FALLBACK_LOCATION: &str = "en-UK";
pub const DEFAULT_ENDPOINT: &str = "http://www.example.com";
const DEFAULT_FEED_COUNT: usize = 3;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleParams(Map<String, Value>);

impl ModuleParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the raw JSON stored by the host. An empty record is an empty
    /// configuration, not an error.
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(raw)
    }

    pub fn to_json(&self) -> String {
        Value::Object(self.0.clone()).to_string()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    /// String view of a key. Numbers are stringified, null and missing keys
    /// come back as `None`.
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// The stored location, trimmed. `None` when unset or empty.
    ///
    /// A literal `0` counts as empty, the host writes it for "no location".
    pub fn location(&self) -> Option<String> {
        self.get_str(KEY_LOCATION)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty() && s != "0")
    }

    /// Whether automatic location updates are enabled. Defaults to enabled.
    pub fn auto_location(&self) -> bool {
        match self.0.get(KEY_AUTO_LOCATION) {
            None | Some(Value::Null) => true,
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_i64().map(|n| n != 0).unwrap_or(true),
            Some(Value::String(s)) => !matches!(s.trim(), "0" | "false" | ""),
            Some(_) => true,
        }
    }

    pub fn fallback_location(&self) -> String {
        self.get_str(KEY_FALLBACK_LOCATION)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_FALLBACK_LOCATION.to_string())
    }

    pub fn endpoint(&self) -> String {
        self.get_str(KEY_ENDPOINT)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string())
    }

    pub fn news_feed(&self) -> Option<String> {
        self.get_str(KEY_NEWS_FEED).filter(|s| !s.trim().is_empty())
    }

    pub fn events_feed(&self) -> Option<String> {
        self.get_str(KEY_EVENTS_FEED).filter(|s| !s.trim().is_empty())
    }

    pub fn news_count(&self) -> usize {
        self.count(KEY_NEWS_COUNT)
    }

    pub fn events_count(&self) -> usize {
        self.count(KEY_EVENTS_COUNT)
    }

    fn count(&self, key: &str) -> usize {
        self.get_str(key)
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(DEFAULT_FEED_COUNT)
    }
}

impl From<Map<String, Value>> for ModuleParams {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_record_has_defaults() {
        let params = ModuleParams::from_json("").unwrap();
        assert_eq!(params.location(), None);
        assert!(params.auto_location());
        assert_eq!(params.fallback_location(), "en-UK");
        assert_eq!(params.endpoint(), "http://www.example.com");
        assert_eq!(params.news_count(), 3);
    }

    #[test]
    fn auto_location_accepts_host_encodings() {
        for (raw, expected) in [
            (json!(0), false),
            (json!(1), true),
            (json!("0"), false),
            (json!("1"), true),
            (json!(false), false),
            (json!(true), true),
        ] {
            let mut params = ModuleParams::new();
            params.set(KEY_AUTO_LOCATION, raw.clone());
            assert_eq!(params.auto_location(), expected, "{raw}");
        }
    }

    #[test]
    fn zero_location_is_unset() {
        let params = ModuleParams::from_json(r#"{"location": 0}"#).unwrap();
        assert_eq!(params.location(), None);
    }

    #[test]
    fn json_keeps_unknown_keys() {
        let raw = r#"{"layout":"_:default","location":"de-DE","auto_location":1}"#;
        let mut params = ModuleParams::from_json(raw).unwrap();
        params.set(KEY_LOCATION, "51.5,0.1");

        let reparsed = ModuleParams::from_json(&params.to_json()).unwrap();
        assert_eq!(reparsed.get_str("layout").as_deref(), Some("_:default"));
        assert_eq!(reparsed.location().as_deref(), Some("51.5,0.1"));
    }
}
