//! Network module with deferred startup lifecycle.
//!
//! Implements the deferred startup pattern: `new()` creates resources,
//! `start()` binds the TCP listener, and `serve()` starts accepting
//! connections. This separation lets the binary seed stores and start
//! background workers between binding the port and serving traffic.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Request, State};
use axum::middleware::{from_fn_with_state, Next};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::config::{NetworkConfig, TlsConfig};
use super::handlers::{
    create_language_handler, create_tag_handler, create_translation_handler,
    delete_translation_handler, export_handler, health_handler, list_languages_handler,
    list_tags_handler, list_translations_handler, liveness_handler, readiness_handler,
    show_translation_handler, update_translation_handler, AppState, Services,
};
use super::middleware::build_http_layers;
use super::shutdown::ShutdownController;

/// Assembles the axum router with all routes and middleware.
///
/// Routes:
/// - `GET /api/v1/export/{code}.json` (also at `/export/{code}.json`)
/// - `GET|POST /api/v1/languages`
/// - `GET|POST /api/v1/tags`
/// - `GET|POST /api/v1/translations`
/// - `GET|PUT|PATCH|DELETE /api/v1/translations/{id}`
/// - `GET /health`, `/health/live`, `/health/ready`
pub fn build_router(state: AppState) -> Router {
    let layers = build_http_layers(&state.config);

    let api = Router::new()
        .route("/export/{file}", get(export_handler))
        .route(
            "/languages",
            get(list_languages_handler).post(create_language_handler),
        )
        .route("/tags", get(list_tags_handler).post(create_tag_handler))
        .route(
            "/translations",
            get(list_translations_handler).post(create_translation_handler),
        )
        .route(
            "/translations/{id}",
            get(show_translation_handler)
                .put(update_translation_handler)
                .patch(update_translation_handler)
                .delete(delete_translation_handler),
        );

    Router::new()
        .nest("/api/v1", api)
        .route("/export/{file}", get(export_handler))
        .route("/health", get(health_handler))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler))
        .layer(from_fn_with_state(
            Arc::clone(&state.shutdown),
            track_in_flight,
        ))
        .layer(layers)
        .with_state(state)
}

/// Holds an in-flight guard for the lifetime of the handler call. Streamed
/// export bodies carry their own guard past this point.
async fn track_in_flight(
    State(shutdown): State<Arc<ShutdownController>>,
    request: Request,
    next: Next,
) -> Response {
    let _guard = shutdown.in_flight_guard();
    next.run(request).await
}

/// Manages the full HTTP server lifecycle.
///
/// Follows the deferred startup pattern:
/// 1. `new()` -- allocates shared state (shutdown controller)
/// 2. `start()` -- binds TCP listener to the configured address
/// 3. `serve()` -- begins accepting connections until shutdown is signalled
pub struct NetworkModule {
    config: NetworkConfig,
    services: Services,
    listener: Option<TcpListener>,
    shutdown: Arc<ShutdownController>,
}

impl NetworkModule {
    /// Creates a new network module without binding any port.
    #[must_use]
    pub fn new(config: NetworkConfig, services: Services) -> Self {
        Self {
            config,
            services,
            listener: None,
            shutdown: Arc::new(ShutdownController::new()),
        }
    }

    /// Returns a shared reference to the shutdown controller.
    ///
    /// Background tasks use this to stop together with the server.
    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    fn state(&self) -> AppState {
        AppState {
            services: self.services.clone(),
            shutdown: Arc::clone(&self.shutdown),
            config: Arc::new(self.config.clone()),
            start_time: Instant::now(),
        }
    }

    /// Router over this module's services and shutdown controller.
    pub fn router(&self) -> Router {
        build_router(self.state())
    }

    /// Binds the TCP listener to the configured host and port.
    ///
    /// Returns the actual bound port, which may differ from the configured
    /// port when port 0 is used (OS-assigned ephemeral port).
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound (e.g., port in use).
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        info!(host = %self.config.host, port, "TCP listener bound");

        self.listener = Some(listener);
        Ok(port)
    }

    /// Starts serving connections until the shutdown signal fires.
    ///
    /// Consumes `self` because the listener is moved into the server.
    ///
    /// After the shutdown signal:
    /// 1. Health state transitions to Draining
    /// 2. The listener stops accepting new connections
    /// 3. Waits up to `drain_timeout` for in-flight requests to complete
    /// 4. Health state transitions to Stopped
    ///
    /// # Errors
    ///
    /// Returns an error if the server encounters a fatal I/O error.
    ///
    /// # Panics
    ///
    /// Panics if `start()` was not called before `serve()`.
    pub async fn serve(
        mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let listener = self
            .listener
            .take()
            .expect("start() must be called before serve()");
        let router = self.router();
        let shutdown_ctrl = self.shutdown;
        let config = self.config;

        let signal_ctrl = Arc::clone(&shutdown_ctrl);
        let signal = async move {
            shutdown.await;
            info!("shutdown requested, draining");
            signal_ctrl.trigger_shutdown();
        };

        // Transition to Ready so readiness probes pass.
        shutdown_ctrl.set_ready();

        if let Some(ref tls_config) = config.tls {
            serve_tls(listener, router, tls_config, signal).await?;
        } else {
            serve_plain(listener, router, signal).await?;
        }

        drain(&shutdown_ctrl, config.drain_timeout).await;
        Ok(())
    }
}

/// Serves plain HTTP connections using axum's built-in server.
async fn serve_plain(
    listener: TcpListener,
    router: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    info!("Serving plain HTTP connections");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Serves TLS connections using `axum-server` with rustls.
///
/// Reuses the pre-bound TCP listener by converting it to a `std::net::TcpListener`.
async fn serve_tls(
    listener: TcpListener,
    router: Router,
    tls_config: &TlsConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    use axum_server::tls_rustls::RustlsConfig;

    let rustls_config = RustlsConfig::from_pem_file(&tls_config.cert_path, &tls_config.key_path)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to load TLS certificates: {e}"))?;

    let addr = listener.local_addr()?;
    let std_listener = listener.into_std()?;
    let handle = axum_server::Handle::new();
    let shutdown_handle = handle.clone();

    tokio::spawn(async move {
        shutdown.await;
        shutdown_handle.graceful_shutdown(None);
    });

    info!(%addr, "Serving TLS connections");

    axum_server::from_tcp_rustls(std_listener, rustls_config)
        .handle(handle)
        .serve(router.into_make_service())
        .await?;
    Ok(())
}

/// Waits for in-flight requests, then reports the outcome.
async fn drain(shutdown_ctrl: &ShutdownController, timeout: Duration) {
    // Already Draining when the signal fired; this covers a server that
    // stopped on its own.
    shutdown_ctrl.trigger_shutdown();

    if shutdown_ctrl.wait_for_drain(timeout).await {
        info!("All requests drained");
    } else {
        warn!(
            in_flight = shutdown_ctrl.in_flight_count(),
            "Drain timeout expired with in-flight requests remaining"
        );
    }
}
