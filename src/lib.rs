//! Core of the community info widget: location resolution, geocoding,
//! feeds and the tolerant ajax response parser.

pub mod ajax;
pub mod config;
pub mod context;
pub mod coords;
pub mod feeds;
pub mod geo;
pub mod links;
pub mod locale;
pub mod locator;
pub mod logging;
pub mod params;
pub mod resolver;
pub mod store;
pub mod translate;
pub mod widget;
