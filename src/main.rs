use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum_server::tls_rustls::RustlsConfig;
use clap::{Parser, ValueEnum};
use rustls::crypto::{ring, CryptoProvider};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use detection_visualizer::annotate::{AnnotationEngine, Typeface};
use detection_visualizer::auth::Credentials;
use detection_visualizer::config::{self, AppConfig};
use detection_visualizer::pipeline::{
    spawn_worker, FramePipeline, SubscriberWorker, TopicRegistry, WorkerStats,
};
use detection_visualizer::state::AppState;
use detection_visualizer::web;

/// Log level for the application
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Verbose,
    Debug,
    Trace,
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Detection visualizer command line arguments
#[derive(Parser, Debug)]
#[command(name = "detection-visualizer")]
#[command(version, about = "Annotated MJPEG streams of message-bus camera topics", long_about = None)]
struct CliArgs {
    /// Configuration file (default: $VISUALIZER_CONFIG or ./config.json)
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Listen address (overrides config)
    #[arg(short = 'a', long, value_name = "ADDRESS")]
    address: Option<String>,

    /// Listen port (overrides config)
    #[arg(short = 'p', long, value_name = "PORT")]
    port: Option<u16>,

    /// Development mode: plain HTTP and no login
    #[arg(long)]
    dev: bool,

    /// Log level (error, warn, info, verbose, debug, trace); default from config
    #[arg(short = 'l', long, value_name = "LEVEL")]
    log_level: Option<LogLevel>,

    /// Increase verbosity (-v for verbose, -vv for debug, -vvv for trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log output format
    #[arg(long, value_name = "FORMAT", default_value = "text")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = CliArgs::parse();

    let mut config = config::load(args.config.as_deref())?;
    apply_cli_overrides(&mut config, &args);

    let level = args.log_level.unwrap_or_else(|| {
        LogLevel::from_str(&config.log_level, true).unwrap_or_default()
    });
    init_logging(level, args.verbose, args.log_format);

    config::validate(&config)?;

    tracing::info!(
        "Starting detection-visualizer v{} ({} mode, {} topics)",
        env!("CARGO_PKG_VERSION"),
        if config.dev_mode { "development" } else { "production" },
        config.topics.len()
    );

    let typeface = match config.font_path.as_deref().map(Typeface::load) {
        Some(Ok(typeface)) => typeface,
        Some(Err(e)) => {
            tracing::warn!("{}, falling back to the builtin font", e);
            Typeface::builtin()?
        }
        None => Typeface::builtin()?,
    };
    tracing::info!("Overlay font: {}", typeface.name());

    let credentials =
        Credentials::from_config(&config.auth).context("failed to prepare login credentials")?;

    let config = Arc::new(config);
    let engine = Arc::new(AnnotationEngine::new(config.draw.clone(), typeface.clone()));
    let topics = TopicRegistry::new(
        config.topics.iter().map(|t| t.name.clone()),
        config.stream.queue_capacity,
    );
    let state = AppState::new(config.clone(), topics, credentials, typeface);

    state
        .sessions
        .clone()
        .start_cleanup_task(Duration::from_secs(60));

    // One worker per topic
    let mut workers = Vec::with_capacity(config.topics.len());
    let mut tasks = Vec::with_capacity(config.topics.len());
    for topic in &config.topics {
        let Some(queue) = state.topics.get(&topic.name) else {
            continue;
        };
        let worker = Arc::new(SubscriberWorker::new(
            FramePipeline::from_config(topic, engine.clone()),
            queue,
        ));
        tasks.push(spawn_worker(
            worker.clone(),
            topic.transport.clone(),
            state.shutdown.child_token(),
        ));
        workers.push(worker);
    }
    tracing::info!("Started {} topic workers", workers.len());

    // Create router
    let app = web::create_router(state.clone());

    let addr: SocketAddr = format!("{}:{}", config.web.bind_address, config.web.port)
        .parse()
        .with_context(|| {
            format!(
                "invalid listen address {}:{}",
                config.web.bind_address, config.web.port
            )
        })?;

    let shutdown_signal = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Shutdown signal received"),
            Err(e) => tracing::error!("Failed to listen for CTRL+C: {}", e),
        }
    };

    if config.dev_mode {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Starting HTTP server on {}", listener.local_addr()?);
        let server = axum::serve(listener, app);
        let server = async move { server.await };

        tokio::select! {
            _ = shutdown_signal => {}
            result = server => {
                if let Err(e) = result {
                    tracing::error!("HTTP server error: {}", e);
                }
            }
        }
    } else {
        // Install default crypto provider (required by rustls 0.23+)
        if CryptoProvider::install_default(ring::default_provider()).is_err() {
            tracing::debug!("rustls crypto provider already installed");
        }

        let (Some(cert_path), Some(key_path)) =
            (&config.web.tls_cert_path, &config.web.tls_key_path)
        else {
            anyhow::bail!("TLS certificate and key are required in production");
        };
        let tls_config = RustlsConfig::from_pem_file(cert_path, key_path)
            .await
            .with_context(|| format!("failed to load TLS files {}", cert_path.display()))?;

        tracing::info!("Starting HTTPS server on {}", addr);
        let server = axum_server::bind_rustls(addr, tls_config).serve(app.into_make_service());

        tokio::select! {
            _ = shutdown_signal => {}
            result = server => {
                if let Err(e) = result {
                    tracing::error!("HTTPS server error: {}", e);
                }
            }
        }
    }

    state.shutdown.cancel();
    for task in tasks {
        if tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .is_err()
        {
            tracing::warn!("Topic worker did not stop in time");
        }
    }
    for worker in &workers {
        let stats = worker.stats();
        tracing::info!(
            "Topic {} worker {:?}: {} received, {} dropped",
            worker.topic(),
            worker.state(),
            WorkerStats::get(&stats.received),
            WorkerStats::get(&stats.dropped),
        );
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

fn apply_cli_overrides(config: &mut AppConfig, args: &CliArgs) {
    if let Some(address) = &args.address {
        config.web.bind_address = address.clone();
    }
    if let Some(port) = args.port {
        config.web.port = port;
    }
    if args.dev {
        config.dev_mode = true;
    }
}

/// Initialize logging with tracing
fn init_logging(level: LogLevel, verbose_count: u8, format: LogFormat) {
    // Verbose count overrides log level
    let effective_level = match verbose_count {
        0 => level,
        1 => LogLevel::Verbose,
        2 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    // Build filter string based on effective level
    let filter = match effective_level {
        LogLevel::Error => "detection_visualizer=error,tower_http=error",
        LogLevel::Warn => "detection_visualizer=warn,tower_http=warn",
        LogLevel::Info => "detection_visualizer=info,tower_http=info",
        LogLevel::Verbose => "detection_visualizer=debug,tower_http=info",
        LogLevel::Debug => "detection_visualizer=debug,tower_http=debug",
        LogLevel::Trace => "detection_visualizer=trace,tower_http=debug",
    };

    // Environment variable takes highest priority
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    let (text, json) = match format {
        LogFormat::Text => (Some(tracing_subscriber::fmt::layer()), None),
        LogFormat::Json => (None, Some(tracing_subscriber::fmt::layer().json())),
    };

    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(text)
        .with(json)
        .try_init()
    {
        eprintln!("failed to initialize tracing: {}", err);
    }
}
