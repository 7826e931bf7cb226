use crate::config::Settings;
use crate::proxy::{ProxyConfig, ProxyMiddlewareConfig, ProxyService};
use crate::Result;
use axum::Router;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{info, instrument};

/// Main application struct that coordinates all components
pub struct Application {
    settings: Settings,
    proxy_config: ProxyConfig,
    middleware_config: ProxyMiddlewareConfig,
}

impl Application {
    #[instrument(skip(settings))]
    pub fn new(settings: Settings) -> Result<Self> {
        let proxy_config = settings.proxy_config()?;
        let middleware_config = settings.middleware_config();

        info!(
            default_provider = %proxy_config.default_provider,
            rules = proxy_config.provider_rules.len(),
            rate_limit_enabled = proxy_config.rate_limit.enabled,
            api_key_gate = middleware_config.auth.enabled,
            "Configuration loaded"
        );

        Ok(Self {
            settings,
            proxy_config,
            middleware_config,
        })
    }

    /// The fully layered router, without a listener
    pub fn router(&self) -> Router {
        ProxyService::new(self.proxy_config.clone(), self.middleware_config.clone()).into_router()
    }

    #[instrument(skip(self))]
    pub async fn run(self) -> Result<()> {
        let listener = TcpListener::bind(self.settings.bind_address()).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until a shutdown signal arrives
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        info!(
            address = %listener.local_addr()?,
            environment = %self.settings.server.environment,
            "Starting Switchboard server"
        );

        axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        info!("Server stopped");
        Ok(())
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!(%error, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::error!(%error, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
