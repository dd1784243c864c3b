use axum::{
    response::IntoResponse,
    routing::get,
    Extension, Router,
};
use crate::store::CounterStore;
use axum_prometheus::{metrics_exporter_prometheus::PrometheusHandle, PrometheusMetricLayer};
use axum_server::{tls_rustls::RustlsConfig, Handle};
use axum_test::{transport_layer::IntoTransportLayer, TestServer};
use sentry_tower::{NewSentryLayer, SentryHttpLayer};
use std::{env, future::Future, io, net::SocketAddr, sync::OnceLock, time::Duration};
use tokio::net::TcpListener;
use tower_http::{compression::CompressionLayer, cors::CorsLayer};
use tracing::info;
use tracing_subscriber::{
    filter::EnvFilter,
    fmt::{
        self,
        format::{Format, JsonFields},
    },
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

pub const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    pub tls: Option<TlsFiles>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsFiles {
    pub pem_cert: String,
    pub pem_key: String,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let bind = env::var("SERVER_BIND").unwrap_or("0.0.0.0".into());
        let port = env::var("SERVER_PORT")
            .ok()
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);
        let tls = if env::var("TLS").is_ok() {
            Some(TlsFiles {
                pem_cert: env::var("TLS_PEM_CERT")?,
                pem_key: env::var("TLS_PEM_KEY")?,
            })
        } else {
            None
        };
        Ok(Self { bind, port, tls })
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.bind, self.port).parse()?)
    }
}

#[derive(Default)]
pub struct App {
    router: Router,
}

impl App {
    pub fn new() -> Self {
        // pool may be opened before the App exists, so both load .env
        dotenvy::dotenv().ok();
        logger();
        let router = Router::new().route("/status/liveness", get(|| async { "".into_response() }));
        Self { router }
    }

    pub async fn start(self) -> anyhow::Result<()> {
        start(self.into_router()).await
    }

    /// Serves the counter routes on `store` and closes the store once the
    /// server stops, whether it stopped cleanly or not.
    pub async fn serve_counter(self, store: CounterStore) -> anyhow::Result<()> {
        let served = self
            .router(crate::api::router())
            .inject(store.clone())
            .start()
            .await;
        store.close().await;
        served
    }

    pub fn router(self, router: Router) -> Self {
        Self {
            router: self.router.merge(router),
        }
    }

    /// Makes `t` available to every route added so far through `Extension<T>`.
    pub fn inject<T: Clone + Send + Sync + 'static>(self, t: T) -> Self {
        Self {
            router: self.router.layer(Extension(t)),
        }
    }

    pub fn as_test_server(self) -> anyhow::Result<TestServer> {
        TestServer::new(self)
    }

    /// Final router with metrics and CORS wrapped around every route.
    fn into_router(self) -> Router {
        let app = prometheus(self.router);
        app.layer(CorsLayer::permissive())
    }
}

impl IntoTransportLayer for App {
    fn into_http_transport_layer(
        self,
        builder: axum_test::transport_layer::TransportLayerBuilder,
    ) -> anyhow::Result<Box<dyn axum_test::transport_layer::TransportLayer>> {
        self.into_router().into_http_transport_layer(builder)
    }

    fn into_mock_transport_layer(
        self,
    ) -> anyhow::Result<Box<dyn axum_test::transport_layer::TransportLayer>> {
        self.into_router().into_mock_transport_layer()
    }
}

async fn start(app: Router) -> anyhow::Result<()> {
    let config = ServerConfig::from_env()?;
    let _guard = sentry();
    let compression_layer: CompressionLayer = CompressionLayer::new()
        .br(true)
        .deflate(true)
        .gzip(true)
        .zstd(true);
    let app = app
        .layer(NewSentryLayer::new_from_top())
        .layer(SentryHttpLayer::with_transaction())
        .layer(compression_layer);

    let addr = config.addr()?;
    if let Some(tls) = config.tls {
        info!("Server running at https://{addr}");
        let tls_config = RustlsConfig::from_pem_file(tls.pem_cert, tls.pem_key).await?;
        let handle = Handle::new();
        tokio::spawn(graceful(handle.clone()));
        axum_server::bind_rustls(addr, tls_config)
            .handle(handle)
            .serve(app.into_make_service())
            .await?
    } else {
        info!("Server running at http://{addr}");
        axum::serve(TcpListener::bind(addr).await?, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
    }
    info!("Server stopped");
    Ok(())
}

async fn graceful(handle: Handle) {
    shutdown_signal().await;
    handle.graceful_shutdown(Some(Duration::from_secs(10)));
}

async fn shutdown_signal() {
    let ctrl_c = signal_or_pending(tokio::signal::ctrl_c());
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
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

/// Resolves when `signal` fires. A handler that could not be installed never
/// fires instead of shutting the server down right away.
async fn signal_or_pending(signal: impl Future<Output = io::Result<()>>) {
    if signal.await.is_err() {
        std::future::pending::<()>().await;
    }
}

fn sentry() -> Option<sentry::ClientInitGuard> {
    if let Ok(url) = env::var("SENTRY_URL") {
        return Some(sentry::init((
            url,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                traces_sample_rate: 1.0,
                ..Default::default()
            },
        )));
    }
    None
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

pub(crate) fn logger() {
    let enabled: bool = env::var("STRUCTURED_LOGGING")
        .map(|s| s.parse::<bool>().unwrap_or(false))
        .unwrap_or(false);
    if enabled {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .event_format(Format::default().json())
                    .fmt_fields(JsonFields::new()),
            )
            .with(env_filter())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(env_filter())
            .try_init()
            .ok();
    };
}

fn prometheus(app: Router) -> Router {
    // the recorder is global, install it once per process
    static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
    let metric_printer = HANDLE.get_or_init(|| PrometheusMetricLayer::pair().1).clone();
    let metric_gatherer = PrometheusMetricLayer::new();
    app.route(
        "/metrics/prometheus",
        get(|| async move { metric_printer.render() }),
    )
    .layer(metric_gatherer)
}
