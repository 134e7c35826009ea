use anyhow::{Context, Result};
use clap::Parser;
use event_scanner::cli::{Cli, Commands, OutputFormat};
use event_scanner::config::{load_mod, resolve_multi_thread_threshold};
use event_scanner::descriptor::internal_to_binary;
use event_scanner::markers::Side;
use event_scanner::modscan::{ModScanner, ModSource, ScanResult, ScanScope};
use event_scanner::source::ModRoot;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let threshold = resolve_multi_thread_threshold(cli.threads_at);

    match cli.command {
        Commands::Scan {
            roots,
            only,
            classpath,
            side,
            format,
            mod_ids,
        } => {
            let start = Instant::now();
            let scanner = ModScanner::new(side)
                .with_classpath(open_roots(&classpath)?)
                .with_multi_thread_threshold(threshold);
            let mod_ids = if mod_ids.is_empty() {
                vec![fallback_mod_id(&roots)]
            } else {
                mod_ids
            };
            let scope = if only.is_empty() {
                ScanScope::All
            } else {
                ScanScope::Only(only)
            };
            let source = ModSource::new(mod_ids, open_roots(&roots)?, scope);
            let result = scanner.scan_mod(&source);
            let report = ScanReport::new(side, &[source], &result, start);
            write_report(&report, format)?;
        }
        Commands::Mods {
            mods,
            classpath,
            side,
            format,
        } => {
            let start = Instant::now();
            let scanner = ModScanner::new(side)
                .with_classpath(open_roots(&classpath)?)
                .with_multi_thread_threshold(threshold);
            let mut sources = Vec::new();
            for path in &mods {
                match load_mod(path) {
                    Ok(Some(source)) => sources.push(source),
                    Ok(None) => {}
                    Err(e) => warn!(
                        path = %path.display(),
                        error = %format!("{e:#}"),
                        "Error loading mod. Skipping..."
                    ),
                }
            }
            info!(requested = mods.len(), opted_in = sources.len(), "Loaded mod descriptors");
            let result = scanner.scan_mods(&sources);
            let report = ScanReport::new(side, &sources, &result, start);
            write_report(&report, format)?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn open_roots(paths: &[PathBuf]) -> Result<Vec<ModRoot>> {
    paths
        .iter()
        .map(|p| ModRoot::from_path(p).with_context(|| format!("Invalid root: {}", p.display())))
        .collect()
}

fn fallback_mod_id(roots: &[PathBuf]) -> String {
    roots
        .first()
        .map(Path::new)
        .and_then(|p| p.file_stem())
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("unknown")
        .to_string()
}

#[derive(Debug, Serialize)]
struct ListenerEntry {
    phase: String,
    owner: String,
    method: String,
    descriptor: String,
    is_static: bool,
}

#[derive(Debug, Serialize)]
struct ListenerGroup {
    key: String,
    callback_type: String,
    qualifier: String,
    listeners: Vec<ListenerEntry>,
}

#[derive(Debug, Serialize)]
struct BusEventEntry {
    owner: String,
    field: String,
    buses: Vec<String>,
}

#[derive(Debug, Serialize)]
struct BusGroup {
    bus: String,
    events: Vec<BusEventEntry>,
}

#[derive(Debug, Serialize)]
struct ScanReport {
    side: Side,
    mods: Vec<Vec<String>>,
    listener_count: usize,
    bus_event_count: usize,
    duration_ms: u64,
    listeners: Vec<ListenerGroup>,
    bus_events: Vec<BusGroup>,
}

impl ScanReport {
    fn new(side: Side, sources: &[ModSource], result: &ScanResult, start: Instant) -> Self {
        let listeners = result
            .listeners()
            .map(|(key, handles)| ListenerGroup {
                key: key.to_string(),
                callback_type: key.callback_type.class_name(),
                qualifier: key.qualifier.clone(),
                listeners: handles
                    .iter()
                    .map(|h| ListenerEntry {
                        phase: h.phase().to_string(),
                        owner: internal_to_binary(h.owner()),
                        method: h.method_name().to_string(),
                        descriptor: h.descriptor().to_string(),
                        is_static: h.is_static(),
                    })
                    .collect(),
            })
            .collect();

        let bus_events = result
            .bus_events()
            .map(|(bus, handles)| BusGroup {
                bus: bus.to_string(),
                events: handles
                    .iter()
                    .map(|h| BusEventEntry {
                        owner: internal_to_binary(h.owner()),
                        field: h.field_name().to_string(),
                        buses: h.bus_names().iter().map(ToString::to_string).collect(),
                    })
                    .collect(),
            })
            .collect();

        Self {
            side,
            mods: sources.iter().map(|s| s.mod_ids.clone()).collect(),
            listener_count: result.listener_count(),
            bus_event_count: result.bus_event_count(),
            duration_ms: start.elapsed().as_millis() as u64,
            listeners,
            bus_events,
        }
    }
}

fn render_text(report: &ScanReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("side: {:?}\n", report.side));
    out.push_str(&format!("mods: {}\n", report.mods.len()));
    out.push_str(&format!("listeners: {}\n", report.listener_count));
    out.push_str(&format!("bus_events: {}\n", report.bus_event_count));
    out.push_str(&format!("duration_ms: {}\n", report.duration_ms));
    for group in &report.listeners {
        out.push_str(&format!("{}\n", group.key));
        for l in &group.listeners {
            let static_str = if l.is_static { "static " } else { "" };
            out.push_str(&format!(
                "  [{}] {static_str}{}.{}{}\n",
                l.phase, l.owner, l.method, l.descriptor
            ));
        }
    }
    for group in &report.bus_events {
        out.push_str(&format!("bus {}\n", group.bus));
        for e in &group.events {
            out.push_str(&format!("  {}.{}\n", e.owner, e.field));
        }
    }
    out
}

fn write_report(report: &ScanReport, format: OutputFormat) -> Result<()> {
    let content = match format {
        OutputFormat::Json => serde_json::to_string_pretty(report)?,
        OutputFormat::Text => render_text(report),
    };
    print!("{content}");
    if !content.ends_with('\n') {
        println!();
    }
    Ok(())
}
