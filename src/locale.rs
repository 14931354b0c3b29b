//! Static locale reference table.
//!
//! Maps a locale code (`en-UK`, `de-DE`, ...) to a representative position
//! and a display label. The table ships inside the binary as CSV.

use csv::ReaderBuilder;
use std::collections::HashMap;
use tracing::error;

use crate::resolver::LocationKey;

static LOCALES_CSV: &str = include_str!("../data/locales.csv");

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocaleEntry {
    pub geolocation: String,
    pub label: String,
}

impl LocaleEntry {
    pub fn get(&self, key: LocationKey) -> &str {
        match key {
            LocationKey::Geolocation => &self.geolocation,
            LocationKey::Label => &self.label,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LocaleTable {
    entries: HashMap<String, LocaleEntry>,
}

impl LocaleTable {
    /// Loads the table bundled with the crate.
    pub fn builtin() -> Self {
        Self::from_csv(LOCALES_CSV)
    }

    /// Parses a `code,geolocation,label` CSV document.
    ///
    /// Bad rows are logged and skipped; a broken table must not take the
    /// widget down with it.
    pub fn from_csv(data: &str) -> Self {
        let mut entries = HashMap::new();
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(data.as_bytes());

        let headers = match rdr.headers() {
            Ok(h) => h.clone(),
            Err(e) => {
                error!("Failed to read locale table headers: {}", e);
                return Self { entries };
            }
        };

        let find_col = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));
        let (code_idx, geo_idx, label_idx) =
            match (find_col("code"), find_col("geolocation"), find_col("label")) {
                (Some(c), Some(g), Some(l)) => (c, g, l),
                _ => {
                    error!("Locale table is missing columns. Headers found: {:?}", headers);
                    return Self { entries };
                }
            };

        for result in rdr.records() {
            let record = match result {
                Ok(r) => r,
                Err(e) => {
                    error!("Skipping locale row: {}", e);
                    continue;
                }
            };

            let field = |idx: usize| record.get(idx).unwrap_or("").to_string();
            let code = field(code_idx);
            if code.is_empty() {
                continue;
            }

            entries.insert(
                code,
                LocaleEntry {
                    geolocation: field(geo_idx),
                    label: field(label_idx),
                },
            );
        }

        Self { entries }
    }

    pub fn get(&self, code: &str) -> Option<&LocaleEntry> {
        self.entries.get(code)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.entries.contains_key(code)
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
