use anyhow::{Context, Result};
use clap::Parser;
use flamydash_server::{Api, Environment, Server, ServerConfig, DEFAULT_GAMES_DIR};
use flamydash_types::{codec::DEFAULT_MAX_AGE_SECS, Catalog, DEFAULT_PUBLIC_ORIGIN};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing() -> Result<()> {
    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
        .ok()
        .and_then(|value| {
            let trimmed = value.trim().to_string();
            (!trimmed.is_empty()).then_some(trimmed)
        });

    if let Some(endpoint) = endpoint {
        let service_name =
            std::env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| "flamydash-server".to_string());
        let rate = std::env::var("OTEL_SAMPLING_RATE")
            .ok()
            .and_then(|value| value.parse::<f64>().ok())
            .map(|value| value.clamp(0.0, 1.0))
            .unwrap_or(1.0);
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_http()
            .with_endpoint(endpoint)
            .build()
            .context("failed to build OTLP exporter")?;
        let tracer_provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
            .with_sampler(opentelemetry_sdk::trace::Sampler::TraceIdRatioBased(rate))
            .with_resource(
                opentelemetry_sdk::Resource::builder_empty()
                    .with_attributes([opentelemetry::KeyValue::new("service.name", service_name)])
                    .build(),
            )
            .with_batch_exporter(exporter)
            .build();
        let tracer = tracer_provider.tracer("flamydash-server");
        opentelemetry::global::set_tracer_provider(tracer_provider);

        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_filter(LevelFilter::INFO))
            .with(tracing_opentelemetry::layer().with_tracer(tracer))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .init();
    }

    Ok(())
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Host interface to bind (default: localhost).
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    #[arg(short, long, default_value_t = 3000)]
    port: u16,

    /// Game catalog JSON (defaults to the bundled catalog).
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Directory holding `<game>/latest/index.html` pages.
    #[arg(long, default_value = DEFAULT_GAMES_DIR)]
    games_dir: PathBuf,

    /// Origin used for asset and embed URLs.
    #[arg(long, default_value = DEFAULT_PUBLIC_ORIGIN)]
    public_origin: String,

    /// Maximum accepted age of a config request timestamp, in seconds.
    #[arg(long, default_value_t = DEFAULT_MAX_AGE_SECS)]
    max_request_age_secs: u64,

    /// Deployment environment (overridden by FLAMYDASH_ENV).
    #[arg(long, value_enum)]
    environment: Option<Environment>,

    /// Requests per IP allowed on /api within one window (0 disables rate limiting).
    #[arg(long)]
    rate_limit_requests: Option<u32>,

    /// Rate limit window in seconds (0 disables rate limiting).
    #[arg(long)]
    rate_limit_window_secs: Option<u64>,

    /// Max request body size in bytes (0 disables limit).
    #[arg(long)]
    http_body_limit_bytes: Option<usize>,
}

fn parse_env_u64(var: &str) -> Option<u64> {
    std::env::var(var).ok().and_then(|v| v.trim().parse().ok())
}

fn parse_env_u32(var: &str) -> Option<u32> {
    std::env::var(var).ok().and_then(|v| v.trim().parse().ok())
}

fn parse_env_environment(var: &str) -> Result<Option<Environment>> {
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => value
            .parse()
            .map(Some)
            .map_err(|err: String| anyhow::anyhow!("invalid {var}: {err}")),
        _ => Ok(None),
    }
}

/// Maps an optional arg value to Option: 0 => None, Some(v) => Some(v), None => default
fn map_optional_limit<T: Copy + PartialEq + From<u8>>(
    arg: Option<T>,
    default: Option<T>,
) -> Option<T> {
    match arg {
        Some(v) if v == T::from(0) => None,
        Some(v) => Some(v),
        None => default,
    }
}

fn build_config(args: &Args) -> Result<ServerConfig> {
    let defaults = ServerConfig::default();
    if args.max_request_age_secs == 0 {
        anyhow::bail!("max_request_age_secs must be > 0");
    }
    let origin = url::Url::parse(&args.public_origin)
        .with_context(|| format!("invalid public origin: {}", args.public_origin))?;
    if !matches!(origin.scheme(), "http" | "https") {
        anyhow::bail!("public origin must be http(s): {}", args.public_origin);
    }
    let environment = match parse_env_environment("FLAMYDASH_ENV")? {
        Some(environment) => environment,
        None => args.environment.unwrap_or(defaults.environment),
    };

    Ok(ServerConfig {
        public_origin: args.public_origin.trim_end_matches('/').to_string(),
        games_dir: Some(args.games_dir.clone()),
        max_request_age_secs: Some(args.max_request_age_secs),
        environment,
        rate_limit_requests: map_optional_limit(
            parse_env_u32("RATE_LIMIT_REQUESTS").or(args.rate_limit_requests),
            defaults.rate_limit_requests,
        ),
        rate_limit_window_secs: map_optional_limit(
            parse_env_u64("RATE_LIMIT_WINDOW_SECS").or(args.rate_limit_window_secs),
            defaults.rate_limit_window_secs,
        ),
        http_body_limit_bytes: map_optional_limit(
            args.http_body_limit_bytes,
            defaults.http_body_limit_bytes,
        ),
    })
}

fn load_catalog(path: Option<&PathBuf>) -> Result<Catalog> {
    match path {
        Some(path) => Catalog::load(path).context("load catalog"),
        None => Catalog::bundled().context("load bundled catalog"),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(?err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::warn!(?err, "failed to listen for SIGTERM");
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
    info!("shutting down gracefully");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse args
    let args = Args::parse();

    // Create logger
    init_tracing()?;

    let config = build_config(&args)?;
    let catalog = load_catalog(args.catalog.as_ref())?;
    info!(
        games = catalog.len(),
        environment = ?config.environment,
        public_origin = %config.public_origin,
        "catalog loaded"
    );

    let server = Arc::new(Server::new_with_config(catalog, config));
    let app = Api::new(server).router();

    // Start server
    let addr = SocketAddr::new(args.host, args.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Listening on {}", addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("axum server error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_server_config() {
        let args = Args::parse_from(["flamydash-server"]);
        let config = build_config(&args).expect("config should parse");
        assert_eq!(config.public_origin, DEFAULT_PUBLIC_ORIGIN);
        assert_eq!(config.max_request_age_secs(), DEFAULT_MAX_AGE_SECS);
        assert_eq!(config.http_body_limit_bytes(), Some(10 * 1024 * 1024));
        assert_eq!(config.games_dir, Some(PathBuf::from(DEFAULT_GAMES_DIR)));
    }

    #[test]
    fn zero_disables_limits() {
        let args = Args::parse_from([
            "flamydash-server",
            "--http-body-limit-bytes",
            "0",
            "--public-origin",
            "https://cdn.example/",
            "--environment",
            "production",
        ]);
        let config = build_config(&args).expect("config should parse");
        assert_eq!(config.http_body_limit_bytes, None);
        assert_eq!(config.public_origin, "https://cdn.example");
    }

    #[test]
    fn rejects_bad_origin_and_zero_age() {
        let args = Args::parse_from(["flamydash-server", "--public-origin", "not a url"]);
        assert!(build_config(&args).is_err());

        let args = Args::parse_from(["flamydash-server", "--public-origin", "ftp://files.example"]);
        assert!(build_config(&args).is_err());

        let args = Args::parse_from(["flamydash-server", "--max-request-age-secs", "0"]);
        let err = build_config(&args).unwrap_err();
        assert!(
            err.to_string().contains("max_request_age_secs"),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn loads_catalog_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("games.json");
        std::fs::write(&path, flamydash_types::catalog::BUNDLED_CATALOG).unwrap();
        assert_eq!(load_catalog(Some(&path)).unwrap().len(), 1);
        assert_eq!(load_catalog(None).unwrap().len(), 1);
        assert!(load_catalog(Some(&dir.path().join("missing.json"))).is_err());
    }
}
