use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use directories::ProjectDirs;
use serde::Serialize;
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};
use viewmark_core::{
    epoch_millis, resolve_key, FileMedium, KeyValueMedium, LegacyScrollRecord, MemoryBackend,
    OpenRequest, ProgressBackend, Session, SyncConfig, ViewState, ViewStateStore, Viewport,
};
use viewmark_render::{open_document, LoadedDocument, PagedViewport, DEFAULT_CLIENT_HEIGHT};

/// Simulated time between renderer frames.
const FRAME_MS: u64 = 50;
/// Simulated time between replayed scroll offsets.
const SCROLL_STEP_MS: u64 = 200;

#[derive(Debug, Parser)]
#[command(
    name = "viewmark",
    version,
    about = "Remembers and restores reading positions in documents"
)]
struct Args {
    /// Directory holding saved view states and logs
    #[arg(long = "state-dir", global = true)]
    state_dir: Option<PathBuf>,

    /// Sync settings (TOML); defaults to config.toml in the platform config directory
    #[arg(long = "config", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: CommandKind,
}

#[derive(Debug, Subcommand)]
enum CommandKind {
    /// Print the identity and stored position of a document
    Show {
        file: PathBuf,
        #[arg(long = "document-id")]
        document_id: Option<String>,
    },
    /// Open a document, restore its position, replay scrolls and save on exit
    Read {
        file: PathBuf,
        #[arg(long = "document-id")]
        document_id: Option<String>,
        /// Open on this page instead of the remembered position (1-based)
        #[arg(short = 'p', long = "page")]
        page: Option<u32>,
        /// Scroll offsets to visit, in order
        #[arg(long = "scroll-to", value_delimiter = ',')]
        scroll_to: Vec<f64>,
        /// Pages rendered per frame
        #[arg(long = "render-batch", default_value_t = 8)]
        render_batch: u32,
        #[arg(long = "page-height", default_value_t = 1100.0)]
        page_height: f64,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ShowReport {
    key: Option<String>,
    document: LoadedDocument,
    view_state: Option<ViewState>,
    legacy: Option<LegacyScrollRecord>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReadReport {
    key: Option<String>,
    phase: String,
    outcome: Option<String>,
    restored_page: Option<u32>,
    restored_scroll_top: Option<f64>,
    saved: Option<ViewState>,
    remote_updates: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let project_dirs = ProjectDirs::from("net", "viewmark", "viewmark");
    let data_dir = match (&args.state_dir, &project_dirs) {
        (Some(dir), _) => dir.clone(),
        (None, Some(dirs)) => dirs.data_local_dir().to_path_buf(),
        (None, None) => return Err(anyhow!("unable to resolve platform data directories")),
    };
    let _log_guard = init_logging(&data_dir)?;

    let config_path = args.config.clone().unwrap_or_else(|| {
        match (&args.state_dir, &project_dirs) {
            (None, Some(dirs)) => dirs.config_dir().join("config.toml"),
            _ => data_dir.join("config.toml"),
        }
    });
    let config = SyncConfig::load(&config_path)?;
    debug!(?config, "loaded sync settings");

    let medium: Arc<dyn KeyValueMedium> = Arc::new(FileMedium::new(data_dir.join("state"))?);
    let store = Arc::new(ViewStateStore::with_debounce(medium, config.debounce_ms));

    let report = match args.command {
        CommandKind::Show { file, document_id } => {
            serde_json::to_string_pretty(&show(&store, &file, document_id.as_deref())?)?
        }
        CommandKind::Read {
            file,
            document_id,
            page,
            scroll_to,
            render_batch,
            page_height,
        } => {
            let document = open_document(&file)?;
            let mut viewport = PagedViewport::new(
                document.page_count,
                page_height,
                DEFAULT_CLIENT_HEIGHT,
            )
            .with_position_override(page.is_some());
            // No server to talk to from the command line; progress updates land in memory.
            let backend = Arc::new(MemoryBackend::new());
            let mut session = Session::new(
                config,
                store,
                Some(backend.clone() as Arc<dyn ProgressBackend>),
            );
            let mut report = read(
                &mut session,
                &mut viewport,
                &document,
                document_id.as_deref(),
                page,
                &scroll_to,
                render_batch.max(1),
            )
            .await
            .with_context(|| format!("failed to read {:?}", file))?;
            report.remote_updates = backend.updates().len();
            serde_json::to_string_pretty(&report)?
        }
    };
    println!("{report}");
    Ok(())
}

fn show(store: &ViewStateStore, file: &Path, document_id: Option<&str>) -> Result<ShowReport> {
    let document = open_document(file)?;
    let key = resolve_key(&document.hints(document_id));
    Ok(ShowReport {
        key: key.as_ref().map(ToString::to_string),
        view_state: key.as_ref().and_then(|key| store.get(key)),
        legacy: document_id.and_then(|id| store.get_legacy(id)),
        document,
    })
}

async fn read(
    session: &mut Session,
    viewport: &mut PagedViewport,
    document: &LoadedDocument,
    document_id: Option<&str>,
    page: Option<u32>,
    offsets: &[f64],
    render_batch: u32,
) -> Result<ReadReport> {
    let mut now = epoch_millis();
    let request = OpenRequest::new(document.hints(document_id));
    let key = resolve_key(&request.hints);
    session.open(request, viewport, now).await;

    loop {
        let added = viewport.render_pages(render_batch);
        if added > 0 {
            session.on_pages_rendered(viewport, now);
        }
        session.tick(viewport, now);
        if added == 0 && !session.coordinator().is_suppressing() {
            break;
        }
        now += FRAME_MS;
    }
    if let Some(page) = page {
        let mut coarse = viewport.coarse();
        coarse.page_number = page;
        viewport.apply_coarse(coarse);
    }
    let phase = session.coordinator().phase();
    let outcome = session.coordinator().outcome();
    let restored = viewport.scroll_geometry();
    let restored_page = viewport.visible_page();
    info!(?phase, ?outcome, "document ready");

    for offset in offsets {
        now += SCROLL_STEP_MS;
        viewport.scroll_to(*offset);
        if let Some(event) = viewport.position_event() {
            session.on_scroll(event, now);
        }
        session.tick(viewport, now);
    }

    now += SCROLL_STEP_MS;
    session
        .shutdown(Some(viewport as &mut dyn Viewport), now)
        .await;

    Ok(ReadReport {
        saved: key.as_ref().and_then(|key| session.store().get(key)),
        key: key.map(|key| key.to_string()),
        phase: format!("{phase:?}"),
        outcome: outcome.map(|outcome| format!("{outcome:?}")),
        restored_page,
        restored_scroll_top: restored.map(|geometry| geometry.scroll_top),
        remote_updates: 0,
    })
}

fn init_logging(data_dir: &Path) -> Result<WorkerGuard> {
    let log_dir = data_dir.join("logs");
    fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, "viewmark.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);
    let console_layer = tracing_subscriber::fmt::layer().with_writer(io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}
