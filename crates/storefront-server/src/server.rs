use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{
    Router,
    http::{Method, header},
    middleware,
    routing::get,
};
use storefront_auth::{AuthState, DynIdentityVerifier, JwtVerifier, require_auth};
use storefront_storage::DynDocumentStore;
use tokio::task::JoinHandle;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::cache::{
    CacheBackend, CacheWriter, DynCacheStore, ReadThroughCache, WriterConfig, create_cache_backend,
};
use crate::config::AppConfig;
use crate::listing::Listings;
use crate::{handlers, middleware as app_middleware, storage};

/// Interval between sweeps of expired local cache entries.
const LOCAL_CACHE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub read_through: ReadThroughCache,
    pub listings: Arc<Listings>,
    pub user_ttl: Duration,
    pub auth: AuthState,
}

impl AppState {
    /// Wires the stores and the verifier together as configured.
    pub fn new(
        cfg: &AppConfig,
        cache: DynCacheStore,
        store: DynDocumentStore,
        verifier: DynIdentityVerifier,
    ) -> Self {
        let writer = CacheWriter::spawn(
            cache.clone(),
            WriterConfig {
                workers: cfg.cache.writer_workers,
                queue_capacity: cfg.cache.writer_queue_capacity,
                write_timeout: cfg.cache.write_timeout(),
            },
        );
        let read_through = ReadThroughCache::new(cache, store, writer)
            .with_lookup_timeout(cfg.cache.lookup_timeout())
            .with_query_timeout(cfg.storage.query_timeout());

        Self {
            read_through,
            listings: Arc::new(Listings::from_config(&cfg.cache)),
            user_ttl: cfg.cache.user_ttl(),
            auth: AuthState::from_config(verifier, &cfg.auth),
        }
    }

    pub fn writer(&self) -> &CacheWriter {
        self.read_through.writer()
    }
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_headers([
            header::ORIGIN,
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::AUTHORIZATION,
        ])
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
}

pub fn build_app(state: AppState, body_limit: usize) -> Router {
    let protected = Router::new()
        .route("/api/user/me", get(handlers::me))
        .route_layer(middleware::from_fn_with_state(
            state.auth.clone(),
            require_auth,
        ));

    Router::new()
        .route("/", get(handlers::root))
        .route("/api/categories/getCategories", get(handlers::get_categories))
        .route("/api/categories/getProducts", get(handlers::get_products))
        .merge(protected)
        .with_state(state)
        // Outermost last: request id -> trace -> cors -> compression -> security headers
        .layer(middleware::from_fn(app_middleware::security_headers))
        .layer(CompressionLayer::new())
        .layer(cors_layer())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    let req_id = req
                        .extensions()
                        .get::<axum::http::HeaderValue>()
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        http.status_code = Empty,
                        request_id = %req_id
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: Duration, span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(middleware::from_fn(app_middleware::request_id))
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
}

pub struct StorefrontServer {
    addr: SocketAddr,
    app: Router,
    state: AppState,
    sweeper: Option<JoinHandle<()>>,
}

#[derive(Default)]
pub struct ServerBuilder {
    config: AppConfig,
    cache: Option<DynCacheStore>,
    store: Option<DynDocumentStore>,
    verifier: Option<DynIdentityVerifier>,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.config = cfg;
        self
    }

    /// Uses the given cache store instead of one built from `redis` config.
    pub fn with_cache_store(mut self, cache: DynCacheStore) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Uses the given document store instead of one built from `storage` config.
    pub fn with_document_store(mut self, store: DynDocumentStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Uses the given verifier instead of a `JwtVerifier` built from `auth` config.
    pub fn with_verifier(mut self, verifier: DynIdentityVerifier) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub async fn build(self) -> anyhow::Result<StorefrontServer> {
        let cfg = self.config;

        let verifier = match self.verifier {
            Some(v) => v,
            None => Arc::new(
                JwtVerifier::from_config(&cfg.auth).context("building identity verifier")?,
            ),
        };

        let store = match self.store {
            Some(s) => s,
            None => storage::create_document_store(&cfg.storage).await?,
        };

        let (cache, sweeper): (DynCacheStore, _) = match self.cache {
            Some(c) => (c, None),
            None => {
                let backend = create_cache_backend(&cfg.redis).await;
                let sweeper = spawn_local_sweeper(backend.clone());
                (Arc::new(backend), Some(sweeper))
            }
        };

        let state = AppState::new(&cfg, cache, store, verifier);
        let app = build_app(state.clone(), cfg.server.body_limit_bytes);

        Ok(StorefrontServer {
            addr: cfg.addr(),
            app,
            state,
            sweeper,
        })
    }
}

fn spawn_local_sweeper(backend: CacheBackend) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(LOCAL_CACHE_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            let removed = backend.purge_expired();
            if removed > 0 {
                tracing::debug!(removed, stats = ?backend.stats(), "Swept expired cache entries");
            }
        }
    })
}

impl StorefrontServer {
    pub fn router(&self) -> Router {
        self.app.clone()
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        self.serve(listener, shutdown_signal()).await
    }

    /// Serves on `listener` until `shutdown` resolves, then drains pending
    /// cache writes.
    pub async fn serve(
        self,
        listener: tokio::net::TcpListener,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let result = axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown)
            .await;

        self.state.writer().shutdown().await;
        if let Some(sweeper) = self.sweeper {
            sweeper.abort();
        }
        result?;
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
