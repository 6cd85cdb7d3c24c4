//! Revision Desk binary.
//!
//! ```text
//! main() -> config::load() -> init_tracing() -> open_store() -> router() -> axum::serve
//! ```
//!
//! The server runs until Ctrl-C (or SIGTERM on unix); in-flight requests finish
//! before exit.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use revdesk_server::{AppState, router};
use revdesk_store::{Store, load_seed};
use revdesk_types::{NotifierSettings, Settings};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = revdesk_config::load().context("failed to load configuration")?;
    init_tracing(&settings.data_dir);

    tracing::info!(
        bind = %settings.bind,
        base_url = %settings.base_url,
        extractor = settings.extractor.label(),
        webhook = matches!(settings.notifier, NotifierSettings::Webhook { .. }),
        "Starting Revision Desk"
    );

    prepare_output_dirs(&settings)?;
    let store = open_store(&settings)?;

    let listener = TcpListener::bind(&settings.bind)
        .await
        .with_context(|| format!("failed to bind {}", settings.bind))?;
    tracing::info!(addr = %listener.local_addr()?, "Listening");

    let app = router(AppState::new(settings, store));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("Shut down");
    Ok(())
}

fn init_tracing(data_dir: &Path) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::try_new("warn").expect("warn filter is valid"));

    let (log_file, init_warnings) = open_log_file(&log_file_candidates(data_dir));
    let stderr_layer = fmt::layer().with_writer(std::io::stderr);

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(stderr_layer)
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();
        tracing::info!(path = %log_path.display(), "Logging initialized");
    } else {
        tracing_subscriber::registry()
            .with(stderr_layer)
            .with(env_filter)
            .init();
    }

    for warning in init_warnings {
        tracing::warn!("{warning}");
    }
}

fn open_log_file(candidates: &[PathBuf]) -> (Option<(PathBuf, fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in candidates {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new().create(true).append(true).open(candidate) {
            Ok(file) => return (Some((candidate.clone(), file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn log_file_candidates(data_dir: &Path) -> Vec<PathBuf> {
    vec![
        // Primary: <data_dir>/logs/revdesk.log
        data_dir.join("logs").join("revdesk.log"),
        // Fallback: ./.revdesk/logs/revdesk.log
        PathBuf::from(".revdesk").join("logs").join("revdesk.log"),
    ]
}

fn prepare_output_dirs(settings: &Settings) -> Result<()> {
    for dir in [
        settings.uploads_dir(),
        settings.presentations_dir(),
        settings.knowledge_base_dir(),
    ] {
        fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
    }
    Ok(())
}

fn open_store(settings: &Settings) -> Result<Store> {
    let db_path = settings.database_path();
    let mut store = Store::open(&db_path)
        .with_context(|| format!("failed to open database {}", db_path.display()))?;

    let seed_path = settings.seed_path();
    let seed = load_seed(&seed_path)
        .with_context(|| format!("failed to load project seed {}", seed_path.display()))?;
    let inserted = store
        .seed_projects_if_empty(&seed)
        .context("failed to seed projects")?;
    if inserted > 0 {
        tracing::info!(inserted, "Seeded project registry");
    }
    Ok(store)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {e}");
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
    tracing::info!("Shutdown signal received");
}
