//! Assembles everything the widget displays for one request.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::Config;
use crate::context::{Notice, RequestContext};
use crate::coords::split_geolocation;
use crate::feeds::{get_events_feed, get_news_feed, FeedItem};
use crate::geo::GeoClient;
use crate::links::{get_links, replace_text, LinkSet};
use crate::locale::LocaleTable;
use crate::resolver::{LocationKey, LocationResolver};
use crate::store::{ConfigStore, StoreError};

#[derive(Debug, Clone, Serialize)]
pub struct WidgetData {
    pub module_id: i64,
    pub links: LinkSet,
    pub contact_text: String,
    /// Map pin position, `(lat, lng)`.
    pub current_location: (String, String),
    pub label: String,
    pub auto_location: bool,
    pub news: Vec<FeedItem>,
    pub events: Vec<FeedItem>,
    pub notices: Vec<Notice>,
}

pub struct Widget {
    geo: Arc<GeoClient>,
    resolver: LocationResolver,
    default_links: LinkSet,
}

impl Widget {
    pub fn new(config: &Config, geo: Arc<GeoClient>) -> Self {
        Self::with_locales(config, geo, LocaleTable::builtin())
    }

    pub fn with_locales(config: &Config, geo: Arc<GeoClient>, locales: LocaleTable) -> Self {
        Self {
            resolver: LocationResolver::new(locales, geo.clone()),
            geo,
            default_links: config.links.clone(),
        }
    }

    pub fn resolver(&self) -> &LocationResolver {
        &self.resolver
    }

    /// Builds the widget data for the module of `ctx`.
    ///
    /// Returns `None` for guests, the widget is not shown to them.
    pub async fn load(
        &self,
        store: &dyn ConfigStore,
        ctx: &mut RequestContext,
    ) -> Result<Option<WidgetData>, StoreError> {
        if ctx.user.is_guest() {
            debug!("No user logged in, skipping module {}", ctx.module_id);
            return Ok(None);
        }

        let params = ctx.params(store)?.clone();
        let ctx = &*ctx;

        let geolocation = self
            .resolver
            .resolve(ctx, &params, LocationKey::Geolocation)
            .await;
        let label = self.resolver.resolve(ctx, &params, LocationKey::Label).await;
        let links = get_links(
            &self.geo,
            ctx,
            &params.endpoint(),
            &geolocation,
            &self.default_links,
        )
        .await;

        let news_url = params.news_feed();
        let events_url = params.events_feed();
        let (news, events) = tokio::join!(
            async {
                match &news_url {
                    Some(url) => get_news_feed(&self.geo, ctx, url, params.news_count()).await,
                    None => Vec::new(),
                }
            },
            async {
                match &events_url {
                    Some(url) => get_events_feed(&self.geo, ctx, url, params.events_count()).await,
                    None => Vec::new(),
                }
            }
        );

        let contact_text = replace_text(
            &ctx.translator.text("MOD_COMMUNITY_INFO_CONTACT_TEXT"),
            &links,
            ctx.translator.as_ref(),
        );

        info!(
            "Module {} located at {} ({}), {} news, {} events",
            ctx.module_id,
            geolocation,
            label,
            news.len(),
            events.len()
        );

        Ok(Some(WidgetData {
            module_id: ctx.module_id,
            links,
            contact_text,
            current_location: split_geolocation(&geolocation),
            label,
            auto_location: params.auto_location(),
            news,
            events,
            notices: ctx.notices.drain(),
        }))
    }
}
