//! Demo HTTP server hosted by each worker.
//!
//! # Responsibilities
//! - Bind the shared port and count live connections
//! - Answer `GET /` with the worker pid and `POST /restart` with a restart
//!   request to the coordinator
//! - Stop offering keep-alive once the graceful flag is set
//! - Expose itself to the drain cascade as a [`ServerResource`]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use futures_util::future::BoxFuture;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::ServerConfig;
use crate::error::{ClusterError, Result};
use crate::lifecycle::shutdown::Shutdown;
use crate::net::connection::ConnectionTracker;
use crate::net::listener::{bind_shared, TrackedListener};
use crate::worker::flag::GracefulFlag;
use crate::worker::resource::ServerResource;
use crate::worker::runtime::WorkerContext;

/// Start the server on `config.bind_address` and hand it to the runtime.
pub fn start(config: &ServerConfig, ctx: WorkerContext) -> Result<Arc<dyn ServerResource>> {
    let server = HttpServer::bind(config, ctx)?;
    let resource: Arc<dyn ServerResource> = server.spawn();
    Ok(resource)
}

/// A bound but not yet serving HTTP server.
pub struct HttpServer {
    listener: TcpListener,
    router: Router,
    tracker: ConnectionTracker,
    local_addr: SocketAddr,
}

impl HttpServer {
    pub fn bind(config: &ServerConfig, ctx: WorkerContext) -> Result<Self> {
        let addr: SocketAddr = config
            .bind_address
            .parse()
            .map_err(|e| ClusterError::Server(format!("invalid bind address {}: {}", config.bind_address, e)))?;
        let listener = bind_shared(addr)
            .map_err(|e| ClusterError::Server(format!("failed to bind {}: {}", addr, e)))?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            listener,
            router: build_router(config, ctx),
            tracker: ConnectionTracker::new(),
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve in a background task.
    pub fn spawn(self) -> Arc<HttpResource> {
        let shutdown = Shutdown::new();
        let (closed_tx, closed_rx) = watch::channel(false);
        let listener = TrackedListener::new(self.listener, self.tracker.clone());
        let stop = shutdown.wait();
        let address = self.local_addr;

        tracing::info!(address = %address, "HTTP server starting");
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, self.router)
                .with_graceful_shutdown(stop)
                .await
            {
                tracing::error!(address = %address, error = %e, "HTTP server failed");
            }
            tracing::info!(address = %address, "HTTP server stopped");
            closed_tx.send_replace(true);
        });

        Arc::new(HttpResource {
            tracker: self.tracker,
            shutdown,
            closed: closed_rx,
        })
    }
}

/// Running server, as seen by the drain cascade.
pub struct HttpResource {
    tracker: ConnectionTracker,
    shutdown: Shutdown,
    closed: watch::Receiver<bool>,
}

impl ServerResource for HttpResource {
    fn connection_count(&self) -> usize {
        self.tracker.active_count()
    }

    fn close(&self) {
        self.shutdown.trigger();
    }

    fn closed(&self) -> BoxFuture<'static, ()> {
        let mut closed = self.closed.clone();
        Box::pin(async move {
            let _ = closed.wait_for(|done| *done).await;
        })
    }
}

#[derive(Clone)]
struct AppState {
    ctx: WorkerContext,
}

#[allow(deprecated)]
fn build_router(config: &ServerConfig, ctx: WorkerContext) -> Router {
    let flag = ctx.graceful_flag();
    Router::new()
        .route("/", get(whoami))
        .route("/restart", post(request_restart))
        .with_state(AppState { ctx })
        .layer(middleware::from_fn_with_state(flag, refuse_keep_alive))
        .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
        .layer(TraceLayer::new_for_http())
}

async fn whoami(State(state): State<AppState>) -> impl IntoResponse {
    format!("Hello from worker {}\n", state.ctx.pid())
}

async fn request_restart(State(state): State<AppState>) -> impl IntoResponse {
    state.ctx.restart_current_worker();
    (StatusCode::ACCEPTED, "restart requested\n")
}

/// Mark responses `Connection: close` once the worker is draining.
async fn refuse_keep_alive(State(flag): State<GracefulFlag>, request: Request<Body>, next: Next) -> Response {
    let mut response = next.run(request).await;
    if flag.is_set() {
        response
            .headers_mut()
            .insert(header::CONNECTION, HeaderValue::from_static("close"));
    }
    response
}
