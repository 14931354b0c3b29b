//! Client side of the ajax channel.
//!
//! The host answers ajax calls with a JSON envelope, but PHP hosts are known
//! to print warnings in front of it or to replace it with a fatal error page
//! altogether. [`parse_response`] recovers an [`AjaxResult`] from all of
//! these; [`AjaxClient`] performs the call itself.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, warn};

use crate::resolver::{AJAX_MODULE, AJAX_OPTION};

const CLEAN_PREFIX: &str = r#"{"success""#;
const FATAL_MARKER: &str = "Fatal error";
const BODY_SEPARATOR: &str = "\n{\"";

/// Uniform result of an ajax call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AjaxResult {
    pub success: bool,
    pub status: u16,
    pub message: String,
    pub messages: Value,
    pub data: Value,
}

/// The envelope as the host serializes it; most fields may be null.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    messages: Option<Value>,
    #[serde(default)]
    data: Value,
}

impl AjaxResult {
    /// A successful result wrapping `data`.
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            status: 200,
            message: String::new(),
            messages: Value::Object(Map::new()),
            data,
        }
    }

    /// A failed result carrying the raw response text as error detail.
    pub fn failure(status: u16, message: impl Into<String>, raw: &str) -> Self {
        Self {
            success: false,
            status,
            message: message.into(),
            messages: Value::Object(Map::new()),
            data: json!({ "error": raw, "data": null }),
        }
    }
}

/// What a raw response body turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseKind<'a> {
    /// The transport reported a non-success status.
    HttpError,
    /// A clean JSON envelope.
    Clean,
    /// A PHP fatal error page.
    FatalError,
    /// Diagnostic text followed by the JSON envelope.
    WarningPrefixed { warning: &'a str, body: &'a str },
}

/// Classifies a response body. Checks run in a fixed order: transport
/// status, fatal error marker, clean envelope, warning prefix.
///
/// A fatal error marker anywhere in the text wins over an envelope.
pub fn classify(status: u16, text: &str) -> ResponseKind<'_> {
    if !(200..300).contains(&status) {
        return ResponseKind::HttpError;
    }
    if text.contains(FATAL_MARKER) {
        return ResponseKind::FatalError;
    }
    if text.starts_with(CLEAN_PREFIX) {
        return ResponseKind::Clean;
    }
    match text.split_once(BODY_SEPARATOR) {
        Some((warning, rest)) => ResponseKind::WarningPrefixed {
            warning,
            body: rest,
        },
        None => ResponseKind::WarningPrefixed {
            warning: text,
            body: "",
        },
    }
}

/// Turns any response text into an [`AjaxResult`]. Never fails; parse
/// errors come back as failure results.
pub fn parse_response(status: u16, status_text: &str, text: &str) -> AjaxResult {
    let mut result = match classify(status, text) {
        ResponseKind::HttpError => AjaxResult::failure(status, status_text, text),
        ResponseKind::FatalError => AjaxResult::failure(status, status_text, text),
        ResponseKind::Clean => match parse_envelope(text, status, None) {
            Ok(res) => res,
            Err(e) => AjaxResult::failure(status, format!("Invalid JSON response: {}", e), text),
        },
        ResponseKind::WarningPrefixed { warning, body } => {
            if body.is_empty() {
                AjaxResult::failure(status, "No JSON body found in response", text)
            } else {
                let body = format!("{{\"{}", body);
                match parse_envelope(&body, status, Some(warning)) {
                    Ok(res) => res,
                    Err(e) => {
                        AjaxResult::failure(status, format!("Invalid JSON response: {}", e), text)
                    }
                }
            }
        }
    };

    normalize_queue(&mut result.data);
    result
}

/// Parses an envelope and unwraps a double encoded `data` string.
///
/// With a `warning` prefix the unwrapping is mandatory; a clean envelope
/// keeps `data` as is when it is not JSON.
fn parse_envelope(
    body: &str,
    status: u16,
    warning: Option<&str>,
) -> serde_json::Result<AjaxResult> {
    let envelope: Envelope = serde_json::from_str(body)?;

    let data = match envelope.data {
        Value::String(inner) => match serde_json::from_str(&inner) {
            Ok(parsed) => parsed,
            Err(e) if warning.is_some() => return Err(e),
            Err(_) => Value::String(inner),
        },
        other => other,
    };

    let message = match warning {
        Some(w) => w.to_string(),
        None => envelope.message.unwrap_or_default(),
    };

    Ok(AjaxResult {
        success: envelope.success.unwrap_or(false),
        status,
        message,
        messages: match envelope.messages {
            Some(Value::Null) | None => Value::Object(Map::new()),
            Some(m) => m,
        },
        data,
    })
}

/// Makes sure `queue` fields are dense lists.
///
/// Sparse arrays come out of PHP's `json_encode` as objects keyed by index.
/// Index keys are listed in ascending numeric order, any other keys in
/// document order.
fn normalize_queue(data: &mut Value) {
    for path in ["/data/queue", "/queue"] {
        if let Some(queue) = data.pointer_mut(path) {
            if let Value::Object(map) = queue {
                *queue = Value::Array(queue_values(std::mem::take(map)));
            }
        }
    }
}

fn queue_values(map: Map<String, Value>) -> Vec<Value> {
    let indexed: Option<Vec<(u64, Value)>> = map
        .iter()
        .map(|(k, v)| k.parse::<u64>().ok().map(|i| (i, v.clone())))
        .collect();

    match indexed {
        Some(mut entries) => {
            entries.sort_by_key(|(i, _)| *i);
            entries.into_iter().map(|(_, v)| v).collect()
        }
        None => map.into_iter().map(|(_, v)| v).collect(),
    }
}

/// Performs ajax calls against the host.
pub struct AjaxClient {
    client: Client,
    base_url: String,
}

impl AjaxClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Calls `method` of the module helper with the current location.
    pub async fn call(&self, location: &str, module_id: i64, method: &str) -> AjaxResult {
        let url = format!("{}/index.php", self.base_url);
        let module_id = module_id.to_string();

        let res = self
            .client
            .post(&url)
            .query(&[
                ("option", AJAX_OPTION),
                ("module", AJAX_MODULE),
                ("method", method),
                ("format", "json"),
                ("current_location", location),
            ])
            .form(&[("format", "json"), ("module_id", module_id.as_str())])
            .send()
            .await;

        let res = match res {
            Ok(res) => res,
            Err(e) => {
                warn!("Ajax call {} failed: {}", method, e);
                return AjaxResult::failure(0, e.to_string(), "");
            }
        };

        let status = res.status();
        let reason = status.canonical_reason().unwrap_or("").to_string();
        match res.text().await {
            Ok(text) => {
                debug!("Ajax call {} answered {} ({} bytes)", method, status, text.len());
                parse_response(status.as_u16(), &reason, &text)
            }
            Err(e) => AjaxResult::failure(status.as_u16(), e.to_string(), ""),
        }
    }
}
