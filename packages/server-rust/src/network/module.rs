//! Network module with deferred startup lifecycle.
//!
//! `new()` wraps the coordinator, `start()` binds the TCP listener, and
//! `serve()` accepts requests until the shutdown future resolves or the
//! coordinator itself triggers shutdown.

use std::future::Future;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::config::NetworkConfig;
use super::handlers::{
    health_handler, liveness_handler, readiness_handler, system_message_handler,
    user_message_handler, AppState,
};
use super::middleware::build_http_layers;
use super::shutdown::ShutdownController;
use crate::node::MetaServerNode;

/// Manages the HTTP server lifecycle for one `MetaServerNode`.
pub struct NetworkModule {
    config: NetworkConfig,
    listener: Option<TcpListener>,
    node: Arc<MetaServerNode>,
}

impl NetworkModule {
    /// Creates a new network module without binding any port.
    #[must_use]
    pub fn new(config: NetworkConfig, node: Arc<MetaServerNode>) -> Self {
        Self {
            config,
            listener: None,
            node,
        }
    }

    /// Returns the shutdown controller shared with the coordinator.
    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        self.node.shutdown_controller()
    }

    /// Assembles the axum router with all routes and middleware.
    ///
    /// Routes:
    /// - `GET /health` -- detailed health JSON
    /// - `GET /health/live` -- liveness probe
    /// - `GET /health/ready` -- readiness probe
    /// - `POST /v1/system/{id}` -- system message by numeric id (`MsgPack`)
    /// - `POST /v1/user/{name}` -- user message by name (opaque body)
    pub fn build_router(&self) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler))
            .route("/v1/system/{id}", post(system_message_handler))
            .route("/v1/user/{name}", post(user_message_handler))
            .layer(build_http_layers(&self.config))
            .with_state(AppState::new(Arc::clone(&self.node)))
    }

    /// Binds the TCP listener to the configured host and port.
    ///
    /// Returns the actual bound port, which differs from the configured port
    /// when port 0 is used.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound (e.g., port in use).
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        info!("TCP listener bound to {}:{}", self.config.host, port);

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves requests until `shutdown` resolves or the coordinator triggers
    /// shutdown (topology finished, or a fatal error).
    ///
    /// Draining and finalization are left to `MetaServerNode::finalize`.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called first or the server
    /// encounters a fatal I/O error.
    pub async fn serve(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let router = self.build_router();
        let listener = self
            .listener
            .ok_or_else(|| anyhow::anyhow!("start() must be called before serve()"))?;
        let shutdown_ctrl = self.node.shutdown_controller();
        let mut coordinator_shutdown = shutdown_ctrl.shutdown_receiver();

        shutdown_ctrl.set_ready();
        info!("Serving meta server requests");

        let signal = async move {
            tokio::select! {
                () = shutdown => info!("Shutdown requested"),
                _ = coordinator_shutdown.wait_for(|stop| *stop) => {
                    info!("Coordinator requested shutdown");
                }
            }
        };

        axum::serve(listener, router)
            .with_graceful_shutdown(signal)
            .await?;

        if shutdown_ctrl.fatal_error().is_some() {
            warn!("Server stopped after a fatal coordinator error");
        }
        shutdown_ctrl.trigger_shutdown();
        Ok(())
    }
}
