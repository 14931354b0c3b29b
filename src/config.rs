use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::links::LinkSet;

pub const DEFAULT_CONFIG_PATH: &str = "community-info.toml";

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Config {
    pub site: SiteConfig,
    pub http: HttpConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    pub links: LinkSet, // Default link set, overridden by the endpoint
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct SiteConfig {
    pub base_url: String,      // Sent as Referer to external APIs
    pub contact_email: String, // Sent as User-Agent, required by Nominatim
    pub language_file: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_seconds: u64,
    pub nominatim_url: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub directory: String,
    pub file_name: String,
    pub level: String, // trace, debug, info, warn, error or off
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost/".to_string(),
            contact_email: "info@example.org".to_string(),
            language_file: None,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 5,
            nominatim_url: "https://nominatim.openstreetmap.org".to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: "community_info.db".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: "logs".to_string(),
            file_name: "community-info.log".to_string(),
            level: "info".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let links = [
            ("forum", "https://forum.joomla.org/"),
            ("jug", "https://community.joomla.org/user-groups.html"),
            ("magazine", "https://magazine.joomla.org/"),
            ("newsletter", "https://community.joomla.org/general-newsletter"),
            ("events", "https://community.joomla.org/events.html"),
            ("volunteers", "https://volunteers.joomla.org/"),
            ("docs", "https://docs.joomla.org/"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            site: SiteConfig::default(),
            http: HttpConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
            links,
        }
    }
}

impl Config {
    /// Loads the configuration file at `path`.
    /// If it doesn't exist, creates a default one.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let config_path = path.as_ref();

        if let Ok(content) = fs::read_to_string(config_path) {
            match toml::from_str(&content) {
                Ok(config) => return config,
                Err(e) => {
                    warn!(
                        "Failed to parse {}: {}. Using defaults.",
                        config_path.display(),
                        e
                    );
                    return Config::default();
                }
            }
        }

        let default_config = Config::default();

        // Save default config to disk for the user to edit later
        match toml::to_string_pretty(&default_config) {
            Ok(toml_string) => {
                if fs::write(config_path, toml_string).is_err() {
                    warn!("Could not write default {} to disk.", config_path.display());
                }
            }
            Err(e) => warn!("Could not serialize default configuration: {}", e),
        }

        info!("Loaded default configuration.");
        default_config
    }

    /// The site's base domain, used as `Referer` on outbound calls.
    pub fn domain(&self) -> &str {
        self.site.base_url.trim().trim_end_matches('/')
    }
}
