use clap::{Parser, Subcommand};
use color_eyre::Result;
use community_info::{
    ajax::AjaxClient,
    config::{Config, DEFAULT_CONFIG_PATH},
    context::{CurrentUser, RequestContext},
    geo::GeoClient,
    locator::IpLocator,
    logging,
    resolver::{persist_location, persist_message, save_manual_location},
    store::SqliteStore,
    translate::{Catalog, Translator},
    widget::Widget,
};
use std::{sync::Arc, time::Duration};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "community-info", version, about = "Community info widget core")]
struct Cli {
    /// Configuration file, created with defaults when missing
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    #[arg(short, long, default_value_t = 1)]
    module_id: i64,

    /// Active UI locale, e.g. en-UK
    #[arg(short, long, default_value = "en-UK")]
    locale: String,

    /// Id of the logged-in user, 0 for a guest
    #[arg(short, long, default_value_t = 1)]
    user_id: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the widget data as JSON
    Show,
    /// Detect the location by IP and store it if auto location is enabled
    Locate {
        /// Address to locate instead of the default
        #[arg(long)]
        ip: Option<String>,
    },
    /// Store a manually picked location
    SetLocation {
        #[arg(long, allow_hyphen_values = true)]
        lat: String,
        #[arg(long, allow_hyphen_values = true)]
        lng: String,
        /// Disable automatic location updates
        #[arg(long)]
        no_auto: bool,
    },
    /// Call a method on a remote ajax endpoint and print the parsed result
    Ajax {
        #[arg(long, default_value = "setLocation")]
        method: String,
        /// Current location, "lat,lng"
        #[arg(long, allow_hyphen_values = true)]
        location: String,
        /// Site base URL, defaults to the configured one
        #[arg(long)]
        site: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    // Instrumentation
    let config = Config::load(&cli.config);
    let _log_guard = logging::initialize_logging(&config.logging);

    let translator: Arc<dyn Translator> = match &config.site.language_file {
        Some(path) => Arc::new(Catalog::load(path)),
        None => Arc::new(Catalog::builtin()),
    };

    let store = SqliteStore::open(&config.storage.database_path)?;
    store.ensure(cli.module_id)?;
    let geo = Arc::new(GeoClient::from_config(&config)?);

    let mut ctx = RequestContext::new(cli.module_id, cli.locale.as_str())
        .with_user(CurrentUser { id: cli.user_id })
        .with_translator(translator);

    match cli.command {
        Command::Show => {
            let widget = Widget::new(&config, geo);
            match widget.load(&store, &mut ctx).await? {
                Some(data) => println!("{}", serde_json::to_string_pretty(&data)?),
                None => println!("Nothing to show for guests."),
            }
        }
        Command::Locate { ip } => {
            let locator = ip.map(IpLocator::new).unwrap_or_default();
            match locator.current_location().await {
                Ok(location) => {
                    let outcome = persist_location(&store, &mut ctx, &location);
                    println!("{}", persist_message(&ctx, outcome));
                }
                Err(e) => {
                    error!("Location lookup failed: {}", e);
                    println!("{}", e);
                }
            }
        }
        Command::SetLocation { lat, lng, no_auto } => {
            if let Err(e) = save_manual_location(&store, &mut ctx, &lat, &lng, !no_auto) {
                error!("Saving manual location failed: {}", e);
            }
            for notice in ctx.notices.drain() {
                println!("[{:?}] {}", notice.level, notice.message);
            }
        }
        Command::Ajax {
            method,
            location,
            site,
        } => {
            let site = site.unwrap_or_else(|| config.site.base_url.clone());
            let timeout = Duration::from_secs(config.http.timeout_seconds);
            let client = AjaxClient::new(&site, timeout)?;
            let result = client.call(&location, cli.module_id, &method).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    info!("Done.");
    Ok(())
}
