//! Polyglot server binary.
//!
//! Wires the store, export cache, and services together, optionally seeds
//! demo data, then serves the HTTP API until Ctrl-C or SIGTERM.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use polyglot_core::MutationClock;
use polyglot_server::cache::{ExportInvalidationObserver, InMemoryExportCache};
use polyglot_server::network::{NetworkConfig, NetworkModule, Services, TlsConfig};
use polyglot_server::seed::{seed_demo, seed_translations, SEED_BATCH_SIZE};
use polyglot_server::service::{
    BackgroundWorker, CacheMaintenance, ExportService, ServerConfig, TranslationService,
};
use polyglot_server::storage::engines::MemoryStore;
use polyglot_server::storage::{
    CompositeMutationObserver, MutationObserver, TracingMutationObserver,
};
use polyglot_server::{ExportCache, TranslationStore};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Json,
    Pretty,
}

#[derive(Parser, Debug)]
#[command(name = "polyglot-server", version, about = "Translation management server")]
struct Args {
    /// Bind address.
    #[arg(long, env = "POLYGLOT_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on. 0 picks a free port.
    #[arg(long, env = "POLYGLOT_PORT", default_value_t = 8080)]
    port: u16,

    /// Allowed CORS origin; repeat or comma-separate for several. `*` allows any.
    #[arg(
        long = "cors-origin",
        env = "POLYGLOT_CORS_ORIGINS",
        value_delimiter = ',',
        default_value = "*"
    )]
    cors_origins: Vec<String>,

    #[arg(long, env = "POLYGLOT_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    request_timeout_secs: u64,

    /// PEM certificate chain. TLS is enabled when both cert and key are set.
    #[arg(long, env = "POLYGLOT_TLS_CERT", requires = "tls_key")]
    tls_cert: Option<PathBuf>,

    /// PEM private key.
    #[arg(long, env = "POLYGLOT_TLS_KEY", requires = "tls_cert")]
    tls_key: Option<PathBuf>,

    #[arg(long, env = "POLYGLOT_CACHE_TTL_SECS", default_value_t = 60)]
    cache_ttl_secs: u64,

    /// Exports larger than this are streamed without caching.
    #[arg(long, env = "POLYGLOT_MAX_CACHED_EXPORT_BYTES", default_value_t = 8 * 1024 * 1024)]
    max_cached_export_bytes: u64,

    /// Rows read from the store per export page.
    #[arg(long, env = "POLYGLOT_EXPORT_PAGE_SIZE", default_value_t = 500)]
    export_page_size: usize,

    /// Persist to a redb file in this directory instead of memory.
    #[arg(long, env = "POLYGLOT_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Create the demo languages and tags.
    #[arg(long, env = "POLYGLOT_SEED")]
    seed: bool,

    /// Insert this many synthetic translations after seeding.
    #[arg(long, env = "POLYGLOT_SEED_TRANSLATIONS", default_value_t = 0)]
    seed_translations: usize,

    #[arg(long, env = "POLYGLOT_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

impl Args {
    fn network_config(&self) -> NetworkConfig {
        let tls = match (&self.tls_cert, &self.tls_key) {
            (Some(cert_path), Some(key_path)) => Some(TlsConfig {
                cert_path: cert_path.clone(),
                key_path: key_path.clone(),
            }),
            _ => None,
        };
        NetworkConfig {
            host: self.host.clone(),
            port: self.port,
            tls,
            cors_origins: self.cors_origins.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            ..NetworkConfig::default()
        }
    }

    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
            max_cached_export_bytes: self.max_cached_export_bytes,
            export_page_size: self.export_page_size.max(1),
            ..ServerConfig::default()
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

fn open_store(data_dir: Option<&Path>) -> anyhow::Result<Arc<dyn TranslationStore>> {
    let clock = Arc::new(MutationClock::system());
    match data_dir {
        #[cfg(feature = "redb")]
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let path = dir.join("polyglot.redb");
            let store = polyglot_server::storage::engines::RedbStore::open(&path, clock)?;
            info!(path = %path.display(), "opened redb store");
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "redb"))]
        Some(_) => anyhow::bail!("--data-dir requires the `redb` feature"),
        None => {
            info!("using in-memory store; data is lost on exit");
            Ok(Arc::new(MemoryStore::with_clock(clock)))
        }
    }
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
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
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    let server_config = args.server_config();
    let store = open_store(args.data_dir.as_deref())?;
    let cache: Arc<dyn ExportCache> = Arc::new(InMemoryExportCache::new());
    let observers: Vec<Arc<dyn MutationObserver>> = vec![
        Arc::new(ExportInvalidationObserver::new(Arc::clone(&cache))),
        Arc::new(TracingMutationObserver),
    ];
    let observer: Arc<dyn MutationObserver> = Arc::new(CompositeMutationObserver::new(observers));

    let services = Services {
        exports: Arc::new(ExportService::new(
            Arc::clone(&store),
            Arc::clone(&cache),
            &server_config,
        )),
        translations: Arc::new(TranslationService::new(store, observer, &server_config)),
        cache: Arc::clone(&cache),
    };

    let mut network = NetworkModule::new(args.network_config(), services.clone());
    let port = network.start().await?;

    if args.seed {
        seed_demo(&services.translations).await?;
    }
    if args.seed_translations > 0 {
        seed_translations(&services.translations, args.seed_translations, SEED_BATCH_SIZE)
            .await?;
    }

    let mut maintenance = BackgroundWorker::start(
        CacheMaintenance::new(cache),
        server_config.cache_purge_interval,
    );

    info!(port, "polyglot server ready");
    let served = network.serve(shutdown_signal()).await;

    maintenance.stop().await;
    info!("polyglot server stopped");
    served
}
