//! scanflow-cli: drive one receipt capture session from the terminal.
//!
//! # Subcommands
//! - `capture <image> [--entity ..] [--tags ..] [--notes ..] [--vendor ..] [--amount ..]`
//!   uploads the image, narrates the processing stages, applies any field
//!   overrides and saves (remotely, or to the offline queue)
//! - `queue list`: print pending offline items as JSON

use anyhow::{bail, Context};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use scanflow_capture::{
    CaptureController, Collaborators, HttpReceiptService, SaveOutcome, SubmissionContext,
    TokioPacer,
};
use scanflow_core::normalize::parse_tags;
use scanflow_core::{
    AuthProvider, CapturedImage, FileQueue, FixedConnectivity, Gateway, ImageSource,
    OfflineStore, ScanflowConfig, TracingTelemetry,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "scanflow-cli", version, about = "Receipt capture and offline queue tool")]
struct Cli {
    #[arg(short, long, env = "SCANFLOW_CONFIG", default_value = "scanflow.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Upload a receipt image and save the extracted expense
    Capture {
        /// Path to the receipt photo
        image: PathBuf,

        /// Business entity the expense belongs to
        #[arg(long, default_value = "")]
        entity: String,

        /// Comma-separated tags
        #[arg(long, default_value = "")]
        tags: String,

        #[arg(long, default_value = "")]
        notes: String,

        /// Override the extracted vendor
        #[arg(long)]
        vendor: Option<String>,

        /// Override the extracted amount
        #[arg(long)]
        amount: Option<String>,

        /// Image came from the photo library rather than the camera
        #[arg(long)]
        library: bool,

        /// Treat the device as offline when saving
        #[arg(long)]
        offline: bool,
    },

    /// Inspect the offline queue
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },
}

#[derive(Debug, Subcommand)]
enum QueueCommands {
    /// Print pending items, oldest first
    List,
}

// ============================================================================
// Auth
// ============================================================================

/// Bearer token from `SCANFLOW_TOKEN`; `SCANFLOW_REFRESH_TOKEN`, when set,
/// is handed out once as the refreshed token.
struct EnvTokenProvider {
    token: Mutex<Option<String>>,
    refresh: Mutex<Option<String>>,
}

impl EnvTokenProvider {
    fn from_env() -> Self {
        Self {
            token: Mutex::new(std::env::var("SCANFLOW_TOKEN").ok()),
            refresh: Mutex::new(std::env::var("SCANFLOW_REFRESH_TOKEN").ok()),
        }
    }
}

#[async_trait]
impl AuthProvider for EnvTokenProvider {
    async fn current_token(&self) -> Option<String> {
        self.token.lock().await.clone()
    }

    async fn refresh_token(&self) -> Option<String> {
        let fresh = self.refresh.lock().await.take();
        if let Some(token) = &fresh {
            *self.token.lock().await = Some(token.clone());
        }
        fresh
    }

    async fn is_authenticated(&self) -> bool {
        self.token.lock().await.is_some()
    }

    async fn sign_out(&self) {
        tracing::warn!("Session expired; clearing token");
        *self.token.lock().await = None;
    }
}

// ============================================================================
// Entry point
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config = match ScanflowConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", cli.config, e);
            std::process::exit(1);
        }
    };

    let level = config
        .service
        .log_level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::INFO);
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    let queue = Arc::new(
        FileQueue::open(config.queue.resolved_dir())
            .await
            .context("Failed to open offline queue")?,
    );

    match cli.command {
        Commands::Queue {
            command: QueueCommands::List,
        } => {
            let items = queue.drain_all().await?;
            println!("{}", serde_json::to_string_pretty(&items)?);
            Ok(())
        }
        Commands::Capture {
            image,
            entity,
            tags,
            notes,
            vendor,
            amount,
            library,
            offline,
        } => {
            if !image.exists() {
                bail!("Image not found: {}", image.display());
            }
            let auth = Arc::new(EnvTokenProvider::from_env());
            if !auth.is_authenticated().await {
                tracing::warn!("SCANFLOW_TOKEN is not set; requests will be rejected by the backend");
            }

            let gateway = Gateway::from_config(&config.api, auth, Arc::new(TracingTelemetry))?;
            let controller = CaptureController::new(
                Collaborators {
                    service: Arc::new(HttpReceiptService::new(Arc::new(gateway), &config.api)),
                    queue,
                    connectivity: Arc::new(FixedConnectivity(!offline)),
                    pacer: Arc::new(TokioPacer),
                },
                config.progress.clone(),
            );

            let mut progress = controller.subscribe_progress();
            let printer = tokio::spawn(async move {
                while progress.changed().await.is_ok() {
                    if let Some(update) = progress.borrow_and_update().clone() {
                        println!("[{:>3}%] {:<10} {}", update.percent, update.stage.as_str(), update.message);
                    }
                }
            });

            let source = if library {
                ImageSource::Library
            } else {
                ImageSource::Camera
            };
            let tag_list = parse_tags(&tags);
            let tag_refs: Vec<&str> = tag_list.iter().map(String::as_str).collect();
            let record = controller
                .capture(
                    CapturedImage::new(image, source),
                    SubmissionContext::new(entity, &tag_refs, notes),
                )
                .await?;
            if let Some(e) = controller.processing_error() {
                println!("Processing failed ({}); continuing with manual entry", e);
            }

            let mut fields = record.fields;
            if let Some(vendor) = vendor {
                fields.vendor = vendor;
            }
            if let Some(amount) = amount {
                fields.amount = amount;
            }
            controller.update_fields(fields)?;

            let outcome = controller.save().await;
            printer.abort();

            match outcome? {
                SaveOutcome::SavedRemote { remote_id } => {
                    println!("✅ Saved expense {}", remote_id);
                }
                SaveOutcome::SavedOffline { item, reason } => {
                    println!("📥 Queued offline ({:?}); will sync later: {}", reason, item.id);
                }
            }
            Ok(())
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
