//! Jamsync Server
//!
//! Hosts listening groups and mirrors each group leader's playback to the
//! other members.
//!
//! # Configuration
//!
//! Settings come from `JAMSYNC_CONFIG` (default: ~/.config/jamsync/config.yaml),
//! overridden by environment variables:
//! - `JAMSYNC_PORT`: Port to listen on (default: 8080)
//! - `JAMSYNC_DATABASE_PATH`: SQLite database file
//! - `JAMSYNC_SPOTIFY_CLIENT_ID`, `JAMSYNC_SPOTIFY_CLIENT_SECRET`: client credentials (required)
//! - `JAMSYNC_SPOTIFY_REDIRECT_URI`: link callback URL
//! - `JAMSYNC_LINK_SECRET`: key for signing link states
//!
//! # Config File Format
//!
//! ```yaml
//! port: 8080
//! spotify:
//!   client_id: "..."
//!   client_secret: "..."
//!   redirect_uri: "https://jam.example.com/api/spotify/login/callback"
//! link:
//!   secret: "a long random string"
//! ```
//!
//! Users and their API keys are managed with `jamsync-admin`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use jamsync::accounts::AccountService;
use jamsync::broker::TokenBroker;
use jamsync::config::ServerConfig;
use jamsync::db::{init_db, GroupRepository, UserRepository};
use jamsync::dispatcher::SyncDispatcher;
use jamsync::link::{AccountLinker, LinkSettings};
use jamsync::personality::PersonalityReader;
use jamsync::registry::{GroupRegistry, RandomLeader};
use jamsync::server::{router, AppState};
use jamsync::spotify::{SpotifyAccounts, SpotifyClient};

/// How often expired link states are purged
const LINK_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

// ============================================================================
// Startup
// ============================================================================

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::load(None)?;
    config.validate()?;

    tracing::info!("Database: {}", config.database_path.display());
    let pool = init_db(&config.database_path).await?;

    let users = Arc::new(UserRepository::new(pool.clone()));
    let registry = Arc::new(
        GroupRegistry::load(
            Arc::new(GroupRepository::new(pool)),
            Arc::new(RandomLeader),
        )
        .await?,
    );

    let spotify = &config.spotify;
    let exchange = Arc::new(SpotifyAccounts::new(
        &spotify.accounts_url,
        &spotify.client_id,
        &spotify.client_secret,
    ));
    let playback = Arc::new(SpotifyClient::new(&spotify.api_url));
    let broker = Arc::new(TokenBroker::new(users.clone(), exchange.clone()));

    let linker = Arc::new(AccountLinker::new(
        &config.link.secret_bytes(),
        LinkSettings {
            accounts_url: spotify.accounts_url.clone(),
            client_id: spotify.client_id.clone(),
            redirect_uri: spotify.redirect_uri.clone(),
            scopes: spotify.scopes.clone(),
            expiry_minutes: config.link.expiry_minutes,
        },
        exchange,
        users.clone(),
    ));

    let state = AppState {
        users,
        registry: registry.clone(),
        dispatcher: Arc::new(SyncDispatcher::new(
            registry.clone(),
            broker.clone(),
            playback.clone(),
        )),
        linker: linker.clone(),
        accounts: Arc::new(AccountService::new(registry)),
        personality: Arc::new(PersonalityReader::new(broker, playback)),
    };

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(LINK_CLEANUP_INTERVAL);
        loop {
            interval.tick().await;
            let removed = linker.cleanup_expired();
            if removed > 0 {
                tracing::debug!("Purged {} expired link state(s)", removed);
            }
        }
    });

    let app = router(state).layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "jamsync=info,jamsync_server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        tracing::error!("Server failed: {}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
