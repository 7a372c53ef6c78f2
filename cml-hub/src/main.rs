//! cml-hub server
//!
//! Serves the access-controlled document hierarchy over HTTP.

use anyhow::Result;
use clap::Parser;
use cml_hub::api::{self, AppState, Identity};
use cml_hub_core::{
    accounts::Provisioning,
    bootstrap,
    storage::{FsBlobStorage, MemoryStore},
    HubConfig,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cml-hub")]
#[command(about = "Group-based access control over an imported CML document tree")]
struct Cli {
    /// Listen address
    #[arg(short, long, default_value = "127.0.0.1:3000")]
    listen: String,

    /// Record store directory (overrides DATA_DIR)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Blob directory (overrides STORAGE)
    #[arg(long)]
    storage: Option<PathBuf>,

    /// Identify callers by the X-User-Id header when JWT_SECRET is unset
    #[arg(long)]
    trust_user_header: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = HubConfig::from_env();
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    if let Some(dir) = cli.storage {
        config.storage = dir;
    }
    config.trust_user_header |= cli.trust_user_header;
    let identity = Identity::from_config(&config)?;
    if matches!(identity, Identity::TrustedHeader) {
        warn!("JWT_SECRET is not set; trusting the X-User-Id header");
    }

    let store = Arc::new(MemoryStore::open(&config.data_dir)?);
    let blobs = Arc::new(FsBlobStorage::new(
        &config.storage,
        config.content_extension.clone(),
    )?);
    let (well_known, report) =
        bootstrap::initialize(store.as_ref(), blobs.as_ref(), &config).await?;
    if let Some(report) = report {
        info!(?report, "Initial import complete");
    }

    let state = AppState {
        store,
        blobs,
        well_known,
        identity,
        provisioning: Provisioning {
            verified: !config.require_accept,
            create_home: config.auto_create_directory,
        },
    };
    let app = api::router(state);

    let listener = TcpListener::bind(&cli.listen).await?;
    info!("Listening on {}", cli.listen);
    axum::serve(listener, app).await?;
    Ok(())
}
