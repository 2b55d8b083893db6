mod classify;
mod config;
mod db;
mod dedup;
mod enrich;
mod error;
mod fallback;
mod geometry;
mod output;
mod parser;
mod pipeline;
mod record;
mod sanitize;
mod source;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::enrich::{CleanedDataset, Enricher, ModalMap, SeedDocument, Sources};
use crate::error::LoadError;
use crate::fallback::{Fallback, GeoJsonFallback};
use crate::geometry::{GeometrySource, HttpFeatureService};
use crate::pipeline::{Paging, Pipeline};
use crate::source::{HttpListingSource, ReplaySource};

#[derive(Parser)]
#[command(name = "fcp_scraper", about = "Flood control project listing scraper and reconciler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect the paginated listing, enrich, deduplicate and write outputs
    Run {
        /// Stop after this many pages
        #[arg(short = 'n', long)]
        max_pages: Option<u32>,
        /// Rows requested per page
        #[arg(long)]
        per_page: Option<u32>,
        /// Replay a captured JSON array of listing responses instead of the live endpoint
        #[arg(long)]
        replay: Option<PathBuf>,
        /// Fill missing coordinates from the feature layer
        #[arg(long)]
        backfill: bool,
    },
    /// Export the feature layer with geometry backfill
    Layer,
    /// Show stored projects and recent runs
    Stats {
        /// Runs to list
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
        /// Write every stored project to this CSV
        #[arg(long)]
        export: Option<PathBuf>,
    },
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .try_init();
}

fn main() -> Result<()> {
    init_tracing();
    let t0 = Instant::now();
    let cli = Cli::parse();
    let mut settings = Settings::load()?;
    debug!(?settings, "settings loaded");

    let result = match cli.command {
        Commands::Run {
            max_pages,
            per_page,
            replay,
            backfill,
        } => {
            if let Some(n) = max_pages {
                settings.max_pages = n;
            }
            if let Some(n) = per_page {
                settings.per_page = n;
            }
            settings.layer_backfill |= backfill;
            run_listing(&settings, replay.as_deref())
        }
        Commands::Layer => export_layer(&settings),
        Commands::Stats { limit, export } => show_stats(&settings, limit, export.as_deref()),
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn run_listing(settings: &Settings, replay: Option<&Path>) -> Result<()> {
    let started = Utc::now();
    let run_id = new_run_id(&started);
    let enricher = Enricher::new(load_sources(settings));
    let pipeline = Pipeline::new(&enricher, Paging::from_settings(settings));

    let mut out = match replay {
        Some(path) => {
            let mut src = ReplaySource::load(path).context("Cannot replay capture")?;
            println!("Replaying {} captured pages from {}", src.len(), path.display());
            pipeline.run(&mut src, None)
        }
        None => {
            let mut src = HttpListingSource::new(settings)?;
            let fallback = if settings.fallback_geojson {
                Some(GeoJsonFallback::new(settings)?)
            } else {
                None
            };
            pipeline.run(&mut src, fallback.as_ref().map(|f| f as &dyn Fallback))
        }
    };

    let mut backfilled = 0;
    if settings.layer_backfill {
        let service = HttpFeatureService::new(settings)?;
        let geo = GeometrySource::new(&service, settings.geometry_page_size, settings.geometry_chunk_size);
        backfilled = geo.backfill(&settings.layer_urls, &mut out.records);
    }

    output::write_json(&settings.out_json, &out.records)?;
    output::write_csv(&settings.out_csv, &out.records)?;

    let conn = db::connect(&settings.db_path)?;
    db::init_schema(&conn)?;
    db::save_projects(&conn, &run_id, &out.records)?;
    let s = &out.stats;
    db::record_run(
        &conn,
        &db::RunRow {
            run_id: run_id.clone(),
            command: "run".into(),
            started_at: started.to_rfc3339(),
            finished_at: Utc::now().to_rfc3339(),
            pages_fetched: s.pages_fetched,
            rows_parsed: s.rows_parsed,
            rows_skipped: s.rows_skipped,
            collected: s.collected,
            unique_records: s.unique,
            duplicates: s.duplicates,
            fallback_records: s.fallback_records,
            backfilled,
            termination: s.termination.label().to_string(),
            detail: match &s.termination {
                pipeline::Termination::SourceFailed(msg) => Some(msg.clone()),
                _ => None,
            },
        },
    )?;

    println!(
        "Fetched {} pages: {} rows parsed, {} skipped",
        s.pages_fetched, s.rows_parsed, s.rows_skipped
    );
    println!(
        "Collected {} records, {} unique ({} duplicates dropped)",
        s.collected, s.unique, s.duplicates
    );
    println!("Detail from modal: {}, from seed page: {}", s.modal_hits, s.seed_hits);
    if s.fallback_records > 0 {
        println!("{} records came from the GeoJSON fallback", s.fallback_records);
    }
    if settings.layer_backfill {
        println!("Backfilled coordinates for {} records", backfilled);
    }
    if s.termination.is_partial() {
        println!("Stopped early: {}", s.termination);
    }
    println!(
        "Wrote {} and {} ({})",
        settings.out_json.display(),
        settings.out_csv.display(),
        run_id
    );
    Ok(())
}

fn export_layer(settings: &Settings) -> Result<()> {
    let started = Utc::now();
    let service = HttpFeatureService::new(settings)?;
    let geo = GeometrySource::new(&service, settings.geometry_page_size, settings.geometry_chunk_size);
    let export = geo.export(&settings.layer_urls);

    output::write_json(&settings.layer_out_json, &export.rows)?;
    output::write_csv(&settings.layer_out_csv, export.rows.iter().map(|r| &r.record))?;

    let conn = db::connect(&settings.db_path)?;
    db::init_schema(&conn)?;
    db::record_run(
        &conn,
        &db::RunRow {
            run_id: new_run_id(&started),
            command: "layer".into(),
            started_at: started.to_rfc3339(),
            finished_at: Utc::now().to_rfc3339(),
            pages_fetched: 0,
            rows_parsed: export.rows.len(),
            rows_skipped: 0,
            collected: export.rows.len(),
            unique_records: export.rows.len(),
            duplicates: 0,
            fallback_records: 0,
            backfilled: export.backfilled,
            termination: if export.layer_url.is_some() { "exported" } else { "no_layer" }.into(),
            detail: export.last_error.clone(),
        },
    )?;

    match &export.layer_url {
        Some(url) => println!("From {}", url),
        None => println!(
            "No candidate layer returned features (last error: {})",
            export.last_error.as_deref().unwrap_or("none")
        ),
    }
    println!(
        "Wrote {} rows ({} backfilled) to {} and {}",
        export.rows.len(),
        export.backfilled,
        settings.layer_out_json.display(),
        settings.layer_out_csv.display()
    );
    Ok(())
}

fn show_stats(settings: &Settings, limit: usize, export: Option<&Path>) -> Result<()> {
    let conn = db::connect(&settings.db_path)?;
    db::init_schema(&conn)?;
    if let Some(path) = export {
        let projects = db::fetch_projects(&conn)?;
        output::write_csv(path, &projects)?;
        println!("Exported {} projects to {}", projects.len(), path.display());
    }
    let s = db::get_stats(&conn)?;
    println!("Projects:         {}", s.projects);
    println!("With coordinates: {}", s.with_coordinates);
    println!("With type:        {}", s.with_project_type);
    println!("With region:      {}", s.with_region);
    println!("Runs:             {}", s.runs);

    let runs = db::fetch_runs(&conn, limit)?;
    if runs.is_empty() {
        return Ok(());
    }
    println!(
        "\n{:<22} | {:<5} | {:>5} | {:>7} | {:>6} | {:>5} | {}",
        "Run", "Cmd", "Pages", "Parsed", "Unique", "Dups", "Termination"
    );
    println!("{}", "-".repeat(80));
    for r in &runs {
        println!(
            "{:<22} | {:<5} | {:>5} | {:>7} | {:>6} | {:>5} | {}",
            r.run_id, r.command, r.pages_fetched, r.rows_parsed, r.unique_records, r.duplicates, r.termination
        );
    }
    Ok(())
}

fn load_sources(settings: &Settings) -> Sources {
    let seed = if settings.use_seed {
        optional(&settings.seed_path, "seed page", SeedDocument::load)
    } else {
        if settings.seed_path.exists() {
            info!(path = %settings.seed_path.display(), "Seed page present but disabled");
        }
        None
    };
    let modal = optional(&settings.modal_path, "modal map", ModalMap::load);
    if let Some(m) = &modal {
        info!(entries = m.len(), "Modal fragments available");
    }
    let cleaned = optional(&settings.cleaned_path, "cleaned dataset", CleanedDataset::load);
    if let Some(c) = &cleaned {
        info!(ids = c.len(), "Cleaned dataset indexed");
    }
    Sources { modal, seed, cleaned }
}

/// Load an enrichment input if its file exists. A broken file is logged and
/// the run continues without it.
fn optional<T>(path: &Path, what: &str, load: impl FnOnce(&Path) -> Result<T, LoadError>) -> Option<T> {
    if !path.exists() {
        debug!(path = %path.display(), "No {}", what);
        return None;
    }
    match load(path) {
        Ok(v) => {
            info!(path = %path.display(), "Loaded {}", what);
            Some(v)
        }
        Err(e) => {
            warn!("Continuing without {}: {}", what, e);
            None
        }
    }
}

fn new_run_id(started: &DateTime<Utc>) -> String {
    format!("run-{}", started.format("%Y%m%dT%H%M%S"))
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
