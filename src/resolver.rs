//! Location resolution and persistence.
//!
//! Reading: [`LocationResolver::resolve`] picks the effective location for a
//! module from, in order, the stored value, the active locale and the
//! configured fallback locale. Reading never fails; a failed reverse geocode
//! degrades to the raw coordinates.
//!
//! Writing: [`persist_location`] stores a freshly detected position when
//! automatic location is enabled and the value actually changed.
//! [`set_location_ajax`] is the guarded entry point for the ajax channel and
//! [`save_manual_location`] the one for the manual location form.

use regex::Regex;
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::context::RequestContext;
use crate::coords::{normalize_coordinates, CoordinateError};
use crate::geo::GeoClient;
use crate::locale::LocaleTable;
use crate::params::{ModuleParams, DEFAULT_FALLBACK_LOCATION, KEY_AUTO_LOCATION, KEY_LOCATION};
use crate::store::{ConfigStore, StoreError};

pub const AJAX_OPTION: &str = "com_ajax";
pub const AJAX_MODULE: &str = "community_info";

pub const MSG_PERMISSION_DENIED: &str = "Permission denied!";
pub const MSG_MISSING_MODULE_ID: &str = r#"You must provide a "module_id" variable with the request!"#;
pub const MSG_MISSING_LOCATION: &str =
    r#"You must provide a "current_location" variable with the request!"#;

/// Which facet of a location is wanted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationKey {
    Geolocation,
    Label,
}

/// How a stored `location` value is interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredLocation {
    Locale(String),
    Coordinates { lat: String, lng: String },
    Opaque(String),
}

fn coordinate_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"-?\d{1,4}\.\d{1,4}\s*,\s*-?\d{1,4}\.\d{1,4}").expect("valid coordinate regex")
    })
}

pub struct LocationResolver {
    locales: LocaleTable,
    geo: Arc<GeoClient>,
}

impl LocationResolver {
    pub fn new(locales: LocaleTable, geo: Arc<GeoClient>) -> Self {
        Self { locales, geo }
    }

    pub fn locales(&self) -> &LocaleTable {
        &self.locales
    }

    /// Classifies a stored location value.
    ///
    /// Anything that is neither a known locale code nor contains a coordinate
    /// pair is kept as an opaque override.
    pub fn classify(&self, stored: &str) -> StoredLocation {
        if self.locales.contains(stored) {
            return StoredLocation::Locale(stored.to_string());
        }

        if let Some(m) = coordinate_pattern().find(stored) {
            if let Some((lat, lng)) = m.as_str().split_once(',') {
                return StoredLocation::Coordinates {
                    lat: lat.trim().to_string(),
                    lng: lng.trim().to_string(),
                };
            }
        }

        StoredLocation::Opaque(stored.to_string())
    }

    /// Resolves the effective location of a module.
    pub async fn resolve(
        &self,
        ctx: &RequestContext,
        params: &ModuleParams,
        key: LocationKey,
    ) -> String {
        // Strategy 1: location stored in the params
        if let Some(stored) = params.location() {
            return match self.classify(&stored) {
                StoredLocation::Locale(code) => self.lookup(&code, key).unwrap_or(stored),
                StoredLocation::Coordinates { lat, lng } => match key {
                    LocationKey::Geolocation => stored,
                    LocationKey::Label => self.geo.reverse_geocode(ctx, &lat, &lng).await,
                },
                StoredLocation::Opaque(value) => value,
            };
        }

        // Strategy 2: current language
        if let Some(value) = self.lookup(&ctx.locale, key) {
            return value;
        }

        // Strategy 3: fallback location
        let fallback = params.fallback_location();
        debug!("Using fallback location '{}'", fallback);
        self.lookup(&fallback, key)
            .or_else(|| self.lookup(DEFAULT_FALLBACK_LOCATION, key))
            .unwrap_or_default()
    }

    fn lookup(&self, code: &str, key: LocationKey) -> Option<String> {
        self.locales.get(code).map(|entry| entry.get(key).to_string())
    }
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error(transparent)]
    Coordinates(#[from] CoordinateError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    Saved,
    NotNeeded,
}

/// Stores an automatically detected location for `ctx.module_id`.
///
/// Writes only when automatic location is enabled and the normalized value
/// differs from the stored one. The in-memory params are updated before the
/// write and are not rolled back if it fails.
pub fn persist_location(
    store: &dyn ConfigStore,
    ctx: &mut RequestContext,
    raw_location: &str,
) -> Result<PersistOutcome, PersistError> {
    let location = normalize_coordinates(raw_location)?;
    let module_id = ctx.module_id;
    let params = ctx.params(store)?;

    if !params.auto_location() || params.location().as_deref() == Some(location.as_str()) {
        debug!("Location for module {} unchanged", module_id);
        return Ok(PersistOutcome::NotNeeded);
    }

    params.set(KEY_LOCATION, location.clone());
    store.write_location(module_id, &location, None)?;
    info!("Saved location {} for module {}", location, module_id);
    Ok(PersistOutcome::Saved)
}

/// Request variables of an ajax call, as handed over by the host.
#[derive(Debug, Clone, Default)]
pub struct AjaxRequest {
    pub option: Option<String>,
    pub module: Option<String>,
    pub module_id: Option<String>,
    pub current_location: Option<String>,
}

impl AjaxRequest {
    /// Collects the known variables from query/form pairs. Later pairs win.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut req = Self::default();
        for (k, v) in pairs {
            let v = Some(v.to_string());
            match k {
                "option" => req.option = v,
                "module" => req.module = v,
                "module_id" => req.module_id = v,
                "current_location" => req.current_location = v,
                _ => {}
            }
        }
        req
    }

    fn is_ajax_channel(&self) -> bool {
        self.option.as_deref() == Some(AJAX_OPTION) && self.module.as_deref() == Some(AJAX_MODULE)
    }

    fn module_id(&self) -> Option<i64> {
        self.module_id
            .as_deref()
            .and_then(|id| id.trim().parse::<i64>().ok())
            .filter(|id| *id > 0)
    }

    fn current_location(&self) -> Option<&str> {
        self.current_location
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
    }
}

/// Guarded ajax entry point storing the browser's current location.
///
/// Always answers with a message for the user; nothing here is fatal.
pub fn set_location_ajax(
    store: &dyn ConfigStore,
    request: &AjaxRequest,
    locale: &str,
) -> String {
    if !request.is_ajax_channel() {
        return MSG_PERMISSION_DENIED.to_string();
    }
    let Some(module_id) = request.module_id() else {
        return MSG_MISSING_MODULE_ID.to_string();
    };
    let Some(current_location) = request.current_location() else {
        return MSG_MISSING_LOCATION.to_string();
    };

    let mut ctx = RequestContext::new(module_id, locale);
    let outcome = persist_location(store, &mut ctx, current_location);
    persist_message(&ctx, outcome)
}

/// Turns the outcome of a location write into a translated user message.
pub fn persist_message(
    ctx: &RequestContext,
    outcome: Result<PersistOutcome, PersistError>,
) -> String {
    let t = &ctx.translator;
    match outcome {
        Ok(PersistOutcome::Saved) => t.text("MOD_COMMUNITY_SUCCESS_SAVE_LOCATION"),
        Ok(PersistOutcome::NotNeeded) => t.text("MOD_COMMUNITY_MSG_SAVE_LOCATION_NOT_NEEDED"),
        Err(PersistError::Coordinates(e)) => {
            t.sprintf("MOD_COMMUNITY_ERROR_INVALID_LOCATION", &[&e.to_string()])
        }
        Err(PersistError::Store(e)) => {
            error!("Saving location for module {} failed: {}", ctx.module_id, e);
            format!("{} {}", t.text("MOD_COMMUNITY_ERROR_SAVE_LOCATION"), e)
        }
    }
}

/// Saves a location picked by hand, together with the auto-location flag.
///
/// This is an explicit user action, so it always writes. The result is also
/// queued as a notice on `ctx`.
pub fn save_manual_location(
    store: &dyn ConfigStore,
    ctx: &mut RequestContext,
    lat: &str,
    lng: &str,
    auto_location: bool,
) -> Result<(), PersistError> {
    let result = write_manual(store, ctx, lat, lng, auto_location);
    match &result {
        Ok(()) => ctx
            .notices
            .success(ctx.translator.text("MOD_COMMUNITY_SUCCESS_SAVE_LOCATION")),
        Err(e) => ctx.notices.error(format!(
            "{} {}",
            ctx.translator.text("MOD_COMMUNITY_ERROR_SAVE_LOCATION"),
            e
        )),
    }
    result
}

fn write_manual(
    store: &dyn ConfigStore,
    ctx: &mut RequestContext,
    lat: &str,
    lng: &str,
    auto_location: bool,
) -> Result<(), PersistError> {
    let location = normalize_coordinates(&format!("{},{}", lat, lng))?;
    let module_id = ctx.module_id;
    let params = ctx.params(store)?;

    params.set(KEY_LOCATION, location.clone());
    params.set(KEY_AUTO_LOCATION, i64::from(auto_location));
    store.write_location(module_id, &location, Some(auto_location))?;
    info!(
        "Saved manual location {} (auto: {}) for module {}",
        location, auto_location, module_id
    );
    Ok(())
}
