//! Device location lookup.
//!
//! In the browser the position comes from the Geolocation API. Outside of
//! it, [`IpLocator`] asks an IP geolocation service instead. Either way the
//! result is a raw `"lat,lng"` string, or a descriptive error.

use ipgeolocate::{Locator, Service};
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum LocatorError {
    #[error("Geolocation is not supported: {0}")]
    Unsupported(String),
    #[error("Error getting location: {0}")]
    Lookup(String),
}

/// Asks the IP geolocation service where `ip` is.
pub struct IpLocator {
    ip: String,
}

impl Default for IpLocator {
    fn default() -> Self {
        Self::new("1.1.1.1")
    }
}

impl IpLocator {
    pub fn new(ip: impl Into<String>) -> Self {
        Self { ip: ip.into() }
    }

    /// Resolves the approximate position as `"lat,lng"`.
    ///
    /// Uses [IpApi](https://ip-api.com/). Nothing is defaulted here; on
    /// failure the caller keeps whatever location it already had.
    pub async fn current_location(&self) -> Result<String, LocatorError> {
        if self.ip.trim().is_empty() {
            return Err(LocatorError::Unsupported("no address to locate".to_string()));
        }

        match Locator::get(self.ip.trim(), Service::IpApi).await {
            Ok(loc) => {
                let location = format!("{},{}", loc.latitude.trim(), loc.longitude.trim());
                info!("Geolocation successful - ({})", location);
                Ok(location)
            }
            Err(e) => {
                error!("Error using geolocation service: {}", e);
                Err(LocatorError::Lookup(e.to_string()))
            }
        }
    }
}
