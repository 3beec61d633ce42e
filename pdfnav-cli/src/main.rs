mod layout;

use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use directories::ProjectDirs;
use pdfnav_core::{
    scroll_progress, Config, DocumentEngine, DocumentProvider, OutlineEntry, OutlineId,
    OutlineSession, OutlineView, ScrollBehavior, Viewport,
};
use pdfnav_lopdf::LopdfProvider;
use serde::Serialize;
use tracing::{debug, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

use crate::layout::{ContinuousLayout, RecordedScroll};

const MAX_INDENT_LEVELS: usize = 8;

#[derive(Debug, Parser)]
#[command(
    name = "pdfnav",
    version,
    about = "Inspect PDF outlines and where their entries navigate to"
)]
struct Args {
    /// Config file to use instead of the platform default
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: CommandKind,
}

#[derive(Debug, Subcommand)]
enum CommandKind {
    /// Print the outline, marking the entry active for a page
    Outline {
        file: PathBuf,

        /// Current page (1-based)
        #[arg(short = 'p', long, default_value_t = 1)]
        page: usize,

        /// Entry id to treat as hovered
        #[arg(long)]
        hover: Option<String>,

        /// Emit JSON instead of a tree
        #[arg(long)]
        json: bool,
    },
    /// Compute the scroll offset an outline entry navigates to
    Locate {
        file: PathBuf,

        /// Entry id, e.g. `0-1`
        #[arg(long)]
        entry: String,

        #[arg(long, default_value_t = 1.0)]
        zoom: f64,

        /// Vertical gap between pages, in pixels
        #[arg(long, default_value_t = 16.0)]
        gap: f64,

        #[arg(long = "viewport-height", default_value_t = 900.0)]
        viewport_height: f64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let project_dirs = ProjectDirs::from("net", "pdfnav", "pdfnav");
    let _log_guard = init_logging(project_dirs.as_ref())?;

    let config_path = args.config.clone().or_else(|| {
        project_dirs
            .as_ref()
            .map(|dirs| dirs.config_dir().join("config.toml"))
    });
    let config = match config_path {
        Some(path) => Config::load(&path)
            .with_context(|| format!("failed to load config from {:?}", path))?,
        None => Config::default(),
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match args.command {
        CommandKind::Outline {
            file,
            page,
            hover,
            json,
        } => run_outline(config, &file, page, hover, json, &mut out).await,
        CommandKind::Locate {
            file,
            entry,
            zoom,
            gap,
            viewport_height,
        } => run_locate(config, &file, &entry, zoom, gap, viewport_height, &mut out).await,
    }
}

async fn open_session(config: Config, file: &Path) -> Result<OutlineSession> {
    let engine = LopdfProvider
        .open(file)
        .await
        .with_context(|| format!("failed to open {:?}", file))?;
    let mut session = OutlineSession::new(config);
    if !session.load(engine).await {
        warn!(?file, "outline build was superseded");
    }
    for event in session.events().lock().drain(..) {
        debug!(?event, "session event");
    }
    Ok(session)
}

fn loaded_engine(session: &OutlineSession) -> Result<&Arc<dyn DocumentEngine>> {
    session
        .document()
        .ok_or_else(|| anyhow!("no document loaded"))
}

fn known_entry(session: &OutlineSession, raw: &str) -> Result<OutlineId> {
    let id = OutlineId::from(raw);
    if session.outline().get(&id).is_none() {
        bail!("unknown outline entry {raw:?}");
    }
    Ok(id)
}

#[derive(Debug, Serialize)]
struct OutlineReport<'a> {
    file: &'a Path,
    page_count: usize,
    current_page: usize,
    active_id: Option<&'a OutlineId>,
    active_ids: &'a BTreeSet<OutlineId>,
    hovered_id: Option<&'a OutlineId>,
    highlighted_id: Option<&'a OutlineId>,
    entries: &'a [OutlineEntry],
}

async fn run_outline(
    config: Config,
    file: &Path,
    page: usize,
    hover: Option<String>,
    json: bool,
    out: &mut impl Write,
) -> Result<()> {
    let mut session = open_session(config, file).await?;
    let page_count = loaded_engine(&session)?.page_count();
    if page == 0 || page > page_count {
        bail!("page {page} is outside 1..={page_count}");
    }
    session.set_current_page(page);
    if let Some(raw) = hover.as_deref() {
        let id = known_entry(&session, raw)?;
        session.set_hovered(Some(id));
    }

    let view = session.view();
    if json {
        let report = OutlineReport {
            file,
            page_count,
            current_page: session.current_page(),
            active_id: view.active_id,
            active_ids: view.active_ids,
            hovered_id: view.hovered_id,
            highlighted_id: view.highlighted_id(),
            entries: view.entries,
        };
        serde_json::to_writer_pretty(&mut *out, &report)?;
        writeln!(out)?;
        return Ok(());
    }

    if view.entries.is_empty() {
        writeln!(out, "(no outline)")?;
        return Ok(());
    }
    for line in outline_lines(&view) {
        writeln!(out, "{line}")?;
    }
    Ok(())
}

async fn run_locate(
    config: Config,
    file: &Path,
    entry: &str,
    zoom: f64,
    gap: f64,
    viewport_height: f64,
    out: &mut impl Write,
) -> Result<()> {
    if !(zoom > 0.0) {
        bail!("zoom must be positive, got {zoom}");
    }
    let mut session = open_session(config, file).await?;
    let id = known_entry(&session, entry)?;

    let engine = Arc::clone(loaded_engine(&session)?);
    let mut viewports: Vec<Viewport> = Vec::with_capacity(engine.page_count());
    for page in 1..=engine.page_count() {
        viewports.push(engine.page_viewport(page).await?);
    }
    let layout = ContinuousLayout::new(&viewports, zoom, gap);
    let container = RecordedScroll::new(viewport_height);

    session.navigate_to_entry(&id, &layout, &container).await;
    let Some((top, behavior)) = container.last() else {
        bail!("outline entry {id} has no navigable destination");
    };

    let current_page = session.update_from_scroll(layout.metrics(top, viewport_height), layout.pages());
    let title = session
        .outline()
        .get(&id)
        .map(|entry| entry.title.as_str())
        .unwrap_or_default();
    writeln!(out, "entry {id} {title}")?;
    writeln!(out, "scroll_top {top:.1}")?;
    writeln!(
        out,
        "behavior {}",
        match behavior {
            ScrollBehavior::Smooth => "smooth",
            ScrollBehavior::Instant => "instant",
        }
    )?;
    writeln!(out, "current_page {current_page}")?;
    match session.active().active_id.as_ref() {
        Some(active) => writeln!(out, "active {active}")?,
        None => writeln!(out, "active -")?,
    }
    writeln!(
        out,
        "progress {:.1}",
        scroll_progress(layout.metrics(top, viewport_height))
    )?;
    Ok(())
}

fn outline_lines(view: &OutlineView<'_>) -> Vec<String> {
    let mut lines = Vec::new();
    push_lines(view, view.entries, 0, &mut lines);
    lines
}

fn push_lines(view: &OutlineView<'_>, entries: &[OutlineEntry], depth: usize, lines: &mut Vec<String>) {
    for entry in entries {
        lines.push(format_outline_line(view, entry, depth));
        push_lines(view, &entry.items, depth + 1, lines);
    }
}

fn format_outline_line(view: &OutlineView<'_>, entry: &OutlineEntry, depth: usize) -> String {
    let marker = if view.highlighted_id() == Some(&entry.id) {
        '*'
    } else if view.active_ids.contains(&entry.id) {
        '+'
    } else {
        ' '
    };
    let indent = "  ".repeat(depth.min(MAX_INDENT_LEVELS));
    let page_suffix = match entry.page_number {
        Some(page) => format!(" (p{page})"),
        None => " (p-)".to_owned(),
    };
    format!("{marker} {indent}{}{page_suffix} [{}]", entry.title, entry.id)
}

fn init_logging(project_dirs: Option<&ProjectDirs>) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match project_dirs {
        Some(project_dirs) => {
            let log_dir = project_dirs.data_local_dir().join("logs");
            fs::create_dir_all(&log_dir)?;
            let file_appender = tracing_appender::rolling::never(log_dir, "pdfnav.log");
            let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };
    let console_layer = tracing_subscriber::fmt::layer().with_writer(io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, title: &str, page_number: Option<usize>, items: Vec<OutlineEntry>) -> OutlineEntry {
        OutlineEntry {
            id: OutlineId::from(id),
            title: title.to_owned(),
            dest: None,
            page_number,
            items,
        }
    }

    fn sample() -> Vec<OutlineEntry> {
        vec![
            entry(
                "0",
                "Part I",
                Some(1),
                vec![entry("0-0", "Chapter 1", Some(2), vec![])],
            ),
            entry("1", "Notes", None, vec![]),
        ]
    }

    #[test]
    fn active_entry_and_ancestors_are_marked() {
        let entries = sample();
        let active_ids: BTreeSet<OutlineId> = ["0", "0-0"].into_iter().map(OutlineId::from).collect();
        let active = OutlineId::from("0-0");
        let view = OutlineView {
            entries: &entries,
            active_id: Some(&active),
            active_ids: &active_ids,
            hovered_id: None,
        };

        assert_eq!(
            outline_lines(&view),
            [
                "+ Part I (p1) [0]",
                "*   Chapter 1 (p2) [0-0]",
                "  Notes (p-) [1]",
            ]
        );
    }

    #[test]
    fn hover_moves_the_highlight() {
        let entries = sample();
        let active_ids: BTreeSet<OutlineId> = ["0"].into_iter().map(OutlineId::from).collect();
        let active = OutlineId::from("0");
        let hovered = OutlineId::from("1");
        let view = OutlineView {
            entries: &entries,
            active_id: Some(&active),
            active_ids: &active_ids,
            hovered_id: Some(&hovered),
        };

        let lines = outline_lines(&view);
        assert!(lines[0].starts_with("+ "));
        assert!(lines[2].starts_with("* "));
    }

    #[test]
    fn logging_installs_without_platform_dirs() {
        let guard = init_logging(None).unwrap();
        assert!(guard.is_none());
        tracing::warn!("console only");
    }
}
