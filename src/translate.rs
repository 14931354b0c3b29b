//! Text lookup.
//!
//! The host owns translations; this module only defines the lookup seam and
//! a TOML-backed catalog for standalone use.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::warn;

static DEFAULT_CATALOG: &str = include_str!("../data/en-GB.toml");

pub trait Translator: Send + Sync {
    /// Returns the text for `key`, or the key itself when unknown.
    fn text(&self, key: &str) -> String;

    /// Like [`text`](Translator::text), replacing each `%s` in order.
    fn sprintf(&self, key: &str, args: &[&str]) -> String {
        let mut out = String::new();
        let mut args = args.iter();
        let template = self.text(key);
        let mut parts = template.split("%s").peekable();

        while let Some(part) = parts.next() {
            out.push_str(part);
            if parts.peek().is_some() {
                out.push_str(args.next().copied().unwrap_or(""));
            }
        }
        out
    }
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    strings: HashMap<String, String>,
}

impl Catalog {
    /// The English catalog bundled with the crate.
    pub fn builtin() -> Self {
        Self::from_toml(DEFAULT_CATALOG).unwrap_or_default()
    }

    pub fn from_toml(raw: &str) -> Result<Self, toml::de::Error> {
        Ok(Self {
            strings: toml::from_str(raw)?,
        })
    }

    /// Loads a language file, layered over the builtin catalog.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let mut catalog = Self::builtin();
        let path = path.as_ref();

        match fs::read_to_string(path).map(|raw| Self::from_toml(&raw)) {
            Ok(Ok(overrides)) => catalog.strings.extend(overrides.strings),
            Ok(Err(e)) => warn!("Failed to parse language file {}: {}", path.display(), e),
            Err(e) => warn!("Could not read language file {}: {}", path.display(), e),
        }
        catalog
    }
}

impl Translator for Catalog {
    fn text(&self, key: &str) -> String {
        self.strings
            .get(key)
            .cloned()
            .unwrap_or_else(|| key.to_string())
    }
}
