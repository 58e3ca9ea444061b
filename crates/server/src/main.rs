//! lattice-serve server entry point

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use lattice_serve_config::{parse_model_specs, Settings};
use lattice_serve_core::engine::Engine;
use lattice_serve_decoder::Dispatcher;
use lattice_serve_server::{create_router, init_metrics, AppState};

#[derive(Parser, Debug)]
#[command(
    name = "lattice-serve",
    version,
    about = "Multi-tenant ASR lattice decoding server"
)]
struct Cli {
    /// Path to the TOML file listing the models to load
    model_spec_toml: PathBuf,

    /// Bind address override
    #[arg(long)]
    host: Option<String>,

    /// Listen port override
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut settings = Settings::from_env();
    if let Some(host) = cli.host {
        settings.host = host;
    }
    if let Some(port) = cli.port {
        settings.port = port;
    }

    let specs = parse_model_specs(&cli.model_spec_toml)?;
    if specs.is_empty() {
        anyhow::bail!(
            "no model found in {} for loading",
            cli.model_spec_toml.display()
        );
    }

    tracing::info!(models = specs.len(), "loading models");
    for spec in &specs {
        tracing::info!(
            model = %spec.model_id(),
            path = %spec.path.display(),
            n_decoders = spec.n_decoders,
            "model spec"
        );
    }

    // pool construction loads every model up front; keep it off the runtime
    let engine = build_engine();
    let dispatcher = tokio::task::spawn_blocking({
        let specs = specs.clone();
        move || Dispatcher::new(engine.as_ref(), &specs)
    })
    .await??;

    let metrics = init_metrics();
    let state = AppState::new(Arc::new(dispatcher), settings.clone());
    let app = create_router(state, metrics);

    let addr: SocketAddr = format!("{}:{}", settings.host, settings.port).parse()?;
    tracing::info!(%addr, "lattice-serve listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shutdown complete");
    Ok(())
}

#[cfg(feature = "mock-engine")]
fn build_engine() -> Arc<dyn Engine> {
    tracing::warn!("serving with the deterministic mock engine; transcriptions are synthetic");
    Arc::new(lattice_serve_decoder::testing::MockEngine::new())
}

#[cfg(not(feature = "mock-engine"))]
compile_error!(
    "no ASR engine backend enabled: build with the `mock-engine` feature \
     or wire a real engine implementation into build_engine()"
);

fn init_tracing() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "lattice_serve=info,tower_http=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C, shutting down");
        }
        _ = terminate => {
            tracing::info!("received SIGTERM, shutting down");
        }
    }
}
