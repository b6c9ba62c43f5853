use crate::{
    app::{AppState, build_router},
    config::{ConfigError, Settings},
    config_store::ConfigStore,
    observability,
    upstream::Upstream,
};
use axum::{Router, serve::ListenerExt};
use std::{future::Future, sync::Arc};
use tokio::net::TcpListener;
use tracing::instrument;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to build registry client: {0}")]
    Client(#[from] reqwest::Error),
    #[error("server i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

#[instrument(skip(settings), fields(config = ?settings.config_path))]
pub fn build_state(settings: &Settings) -> Result<AppState, RuntimeError> {
    let store = ConfigStore::open(settings.config_path.clone(), settings.reload)?;
    Ok(AppState::new(Arc::new(store), Upstream::new()?))
}

pub async fn run(settings: Settings) -> Result<(), RuntimeError> {
    let state = build_state(&settings)?;
    reload_on_hangup(state.config.clone());
    let snapshot = state.config.snapshot();
    let app = build_router(state);
    let listener = TcpListener::bind(settings.bind).await?;

    tracing::info!(
        bind = %settings.bind,
        registry = snapshot.registry.as_deref().unwrap_or("<none>"),
        users = snapshot.users.len(),
        reload = ?settings.reload,
        "registry-guard listening"
    );

    serve(listener, app, shutdown_signal()).await?;
    Ok(())
}

/// Serves `app` on `listener` with Nagle disabled on every accepted
/// connection until `shutdown` resolves.
pub async fn serve<S>(listener: TcpListener, app: Router, shutdown: S) -> std::io::Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    let listener = listener.tap_io(|tcp| {
        if let Err(err) = tcp.set_nodelay(true) {
            tracing::warn!(error = %err, "failed to set TCP_NODELAY on accepted connection");
        }
    });
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

pub async fn run_standalone(settings: Settings) -> Result<(), RuntimeError> {
    let tracing_settings = observability::init(&settings.log_level, settings.log_format);
    tracing::debug!(
        log_filter = tracing_settings.filter,
        log_format = tracing_settings.log_format.as_str(),
        "initialized tracing subscriber"
    );
    run(settings).await
}

pub async fn run_from_env() -> Result<(), RuntimeError> {
    run_standalone(Settings::from_env()?).await
}

/// SIGHUP re-reads the configuration file regardless of the reload policy.
fn reload_on_hangup(store: Arc<ConfigStore>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(hangup) => hangup,
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    "cannot listen for SIGHUP, reload on signal disabled"
                );
                return;
            }
        };
        tokio::spawn(async move {
            while hangup.recv().await.is_some() {
                tracing::info!("SIGHUP received, reloading configuration");
                if let Err(err) = store.reload().await {
                    tracing::warn!(
                        error = %err,
                        "configuration reload failed, keeping previous snapshot"
                    );
                }
            }
        });
    }

    #[cfg(not(unix))]
    {
        let _ = store;
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let ctrl_c = async {
            let _ = tokio::signal::ctrl_c().await;
        };
        let terminate = async {
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                let _ = sigterm.recv().await;
            }
        };
        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    tracing::info!("shutdown signal received");
}
