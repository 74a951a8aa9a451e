mod health;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use conduit_config::Config;
use conduit_core::{CompletionObserver, Observers};
use conduit_gateway::Gateway;
use conduit_telemetry::{LogObserver, MetricsObserver};
use tower_http::trace::TraceLayer;

/// Address used when neither the config nor the CLI provides one
pub const DEFAULT_LISTEN_ADDRESS: SocketAddr = SocketAddr::new(std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED), 3000);

/// Assembled server with all routes and middleware
pub struct Server {
    router: Router,
    listen_address: SocketAddr,
}

impl Server {
    /// Build the server with the default completion observers
    ///
    /// Completions are logged and recorded as metrics.
    ///
    /// # Errors
    ///
    /// Returns an error if the gateway cannot be built from the configuration
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let observers: Vec<Arc<dyn CompletionObserver>> = vec![Arc::new(LogObserver), Arc::new(MetricsObserver::new())];
        Self::with_observers(config, Observers::new(observers))
    }

    /// Build the server with a caller-supplied set of observers
    ///
    /// # Errors
    ///
    /// Returns an error if the gateway cannot be built from the configuration
    pub fn with_observers(config: &Config, observers: Observers) -> anyhow::Result<Self> {
        let listen_address = config.server.listen_address.unwrap_or(DEFAULT_LISTEN_ADDRESS);

        let gateway = Gateway::from_config(config, observers)?;

        let mut app = Router::new();

        // Health check
        if config.server.health.enabled {
            app = app.route(&config.server.health.path, axum::routing::get(health::health_handler));
        }

        app = app.merge(conduit_gateway::gateway_router(gateway));

        app = app.layer(TraceLayer::new_for_http());

        Ok(Self {
            router: app,
            listen_address,
        })
    }

    /// Override the listen address
    #[must_use]
    pub fn with_listen_address(mut self, listen_address: SocketAddr) -> Self {
        self.listen_address = listen_address;
        self
    }

    /// Get the configured listen address
    #[must_use]
    pub const fn listen_address(&self) -> SocketAddr {
        self.listen_address
    }

    /// Consume the server and return the inner router
    ///
    /// Useful for testing when the caller manages the listener
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Start serving requests
    ///
    /// Blocks until the cancellation token is triggered. In-flight
    /// requests, including open streams, are allowed to finish.
    ///
    /// # Errors
    ///
    /// Returns an error if binding the TCP listener or serving fails
    pub async fn serve(self, shutdown: tokio_util::sync::CancellationToken) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.listen_address).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(%local_addr, "server listening");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
                tracing::info!("graceful shutdown initiated");
            })
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;

    fn config(extra: &str) -> Config {
        Config::from_toml(&format!(
            r#"
            {extra}

            [[providers]]
            name = "openai"
            base_url = "http://127.0.0.1:9/v1"
            auth_type = "none"
            patterns = ["gpt-"]
            "#
        ))
        .unwrap()
    }

    async fn status(router: Router, path: &str) -> StatusCode {
        router
            .oneshot(Request::get(path).body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn health_is_served_on_configured_path() {
        let server = Server::with_observers(
            &config("[server.health]\npath = \"/healthz\""),
            Observers::default(),
        )
        .unwrap();

        let router = server.into_router();
        assert_eq!(status(router.clone(), "/healthz").await, StatusCode::OK);
        assert_eq!(status(router, "/health").await, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn health_can_be_disabled() {
        let server = Server::with_observers(
            &config("[server.health]\nenabled = false"),
            Observers::default(),
        )
        .unwrap();

        assert_eq!(status(server.into_router(), "/health").await, StatusCode::NOT_FOUND);
    }

    #[test]
    fn listen_address_defaults_and_overrides() {
        let server = Server::with_observers(&config(""), Observers::default()).unwrap();
        assert_eq!(server.listen_address(), DEFAULT_LISTEN_ADDRESS);

        let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        assert_eq!(server.with_listen_address(addr).listen_address(), addr);
    }
}
