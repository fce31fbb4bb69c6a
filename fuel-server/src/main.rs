use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use fuel_server::backend::{BackendClient, MockBackend, PageSource, PaginationFetcher};
use fuel_server::config::load_app_config;
use fuel_server::realtime::{RealtimeChannel, RealtimeConfig, SseClient};
use fuel_server::regions::{RegionClassifier, RegionTable};
use fuel_server::store::StationDataStore;
use fuel_server::web::{AppState, create_router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("fuel_server=info,tower_http=info"))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    if config.mock_data.is_none() && config.backend_token.is_empty() {
        warn!("FUEL_BACKEND_TOKEN not set, backend requests go out unauthenticated");
    }

    let source: Arc<dyn PageSource> = match (&config.mock_data, config.backend_client_config()) {
        (Some(path), _) => {
            info!(path = %path.display(), "serving rows from mock data");
            Arc::new(MockBackend::from_file(path)?)
        }
        (None, Some(client_config)) => Arc::new(BackendClient::new(client_config)?),
        (None, None) => anyhow::bail!("no backend table configured"),
    };

    let fetcher = PaginationFetcher::new(source, config.pagination_config());
    let store = StationDataStore::new(fetcher, config.normalizer(), config.store_config());
    if store.warm_start().await {
        info!("restored station snapshot from disk");
    }

    let table = match &config.regions_path {
        Some(path) => RegionTable::from_path(path)
            .with_context(|| format!("loading regions from {}", path.display()))?,
        None => RegionTable::embedded()?,
    };
    info!(
        regions = table.regions().len(),
        cities = table.city_count(),
        "region table loaded"
    );

    let mut state = AppState::new(store.clone(), RegionClassifier::new(table));

    let realtime = match &config.realtime_url {
        Some(url) => {
            let client = SseClient::new(url.as_str())?;
            info!(url = %url, "subscribing to realtime updates");
            let channel = RealtimeChannel::start(Arc::new(client), store.clone(), RealtimeConfig::new());
            state = state.with_realtime(channel.clone());
            Some(channel)
        }
        None => None,
    };

    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!(addr = %config.bind_addr, "fuel station server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(channel) = realtime {
        channel.disconnect().await;
    }
    store.shutdown().await;
    info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("received shutdown signal, starting graceful shutdown");
}
