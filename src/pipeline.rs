//! The listing run: fetch pages in order, turn rows into enriched records,
//! keep the first record per key.

use std::fmt;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::dedup::Accumulator;
use crate::enrich::{Detail, Enricher};
use crate::fallback::Fallback;
use crate::parser::parse_rows;
use crate::record::ProjectRecord;
use crate::sanitize;
use crate::source::ListingSource;

#[derive(Debug, Clone, Copy)]
pub struct Paging {
    pub per_page: u32,
    pub max_pages: u32,
    pub delay: Duration,
}

impl Paging {
    pub fn from_settings(settings: &Settings) -> Self {
        Paging {
            per_page: settings.per_page,
            max_pages: settings.max_pages,
            delay: settings.page_delay(),
        }
    }
}

/// Why the page loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// Server said there is nothing more.
    Exhausted,
    /// `success=false`; that page's rows were still kept.
    ServerReportedFailure,
    /// A page parsed to zero records.
    EmptyPage,
    PageCap,
    SourceFailed(String),
}

impl Termination {
    pub fn label(&self) -> &'static str {
        match self {
            Termination::Exhausted => "exhausted",
            Termination::ServerReportedFailure => "server_reported_failure",
            Termination::EmptyPage => "empty_page",
            Termination::PageCap => "page_cap",
            Termination::SourceFailed(_) => "source_failed",
        }
    }

    /// Whether the run may have missed pages.
    pub fn is_partial(&self) -> bool {
        !matches!(self, Termination::Exhausted | Termination::EmptyPage)
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::SourceFailed(msg) => write!(f, "source_failed ({})", msg),
            other => f.write_str(other.label()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunStats {
    pub pages_fetched: u32,
    pub rows_parsed: usize,
    pub rows_skipped: usize,
    /// Records offered to the accumulator, duplicates included.
    pub collected: usize,
    pub unique: usize,
    pub duplicates: usize,
    pub fallback_records: usize,
    /// Records whose detail came from a captured modal, or from the seed page.
    pub modal_hits: usize,
    pub seed_hits: usize,
    pub termination: Termination,
}

pub struct RunOutput {
    pub records: Vec<ProjectRecord>,
    pub stats: RunStats,
}

pub struct Pipeline<'a> {
    enricher: &'a Enricher,
    paging: Paging,
}

impl<'a> Pipeline<'a> {
    pub fn new(enricher: &'a Enricher, paging: Paging) -> Self {
        Pipeline { enricher, paging }
    }

    /// Run the page loop to completion. Never fails: whatever was collected
    /// before a source error is returned with the error recorded in
    /// `stats.termination`.
    pub fn run(&self, source: &mut dyn ListingSource, fallback: Option<&dyn Fallback>) -> RunOutput {
        let mut acc = Accumulator::new();
        let mut pages_fetched = 0u32;
        let mut rows_parsed = 0usize;
        let mut rows_skipped = 0usize;
        let mut modal_hits = 0usize;
        let mut seed_hits = 0usize;

        let pb = spinner();
        let mut page = 1u32;
        let termination = loop {
            if page > self.paging.max_pages {
                info!(max_pages = self.paging.max_pages, "Page cap reached");
                break Termination::PageCap;
            }
            pb.set_message(format!("page {} | {} unique", page, acc.len()));

            let listing = match source.fetch(page, self.paging.per_page) {
                Ok(listing) => listing,
                Err(e) => {
                    warn!(page, "Listing fetch failed: {}", e);
                    break Termination::SourceFailed(e.to_string());
                }
            };
            pages_fetched += 1;

            let mut parsed = 0usize;
            let mut new = 0usize;
            for outcome in parse_rows(&listing.rows) {
                match outcome {
                    Ok(mut record) => {
                        parsed += 1;
                        match self.enricher.enrich(&mut record) {
                            Detail::Modal => modal_hits += 1,
                            Detail::Seed => seed_hits += 1,
                            Detail::Missing => {}
                        }
                        sanitize::normalize(&mut record);
                        if acc.push(record) {
                            new += 1;
                        }
                    }
                    Err(skip) => {
                        rows_skipped += 1;
                        debug!(page, reason = %skip, "row skipped");
                    }
                }
            }
            rows_parsed += parsed;
            info!(page, parsed, new, has_more = listing.has_more, "Page processed");

            if !listing.success {
                warn!(page, "Server reported failure");
                break Termination::ServerReportedFailure;
            }
            if parsed == 0 {
                break Termination::EmptyPage;
            }
            if !listing.has_more {
                break Termination::Exhausted;
            }
            page += 1;
            if !self.paging.delay.is_zero() {
                std::thread::sleep(self.paging.delay);
            }
        };
        pb.finish_and_clear();

        let mut fallback_records = 0;
        if acc.is_empty() {
            if let Some(fallback) = fallback {
                match fallback.records() {
                    Ok(records) => {
                        fallback_records = records.len();
                        for mut record in records {
                            self.enricher.fill_from_cleaned_and_region(&mut record);
                            sanitize::normalize(&mut record);
                            acc.push(record);
                        }
                    }
                    Err(e) => warn!("Fallback failed: {:#}", e),
                }
            }
        }

        let reclassified = sanitize::sweep(acc.records_mut());
        if reclassified > 0 {
            debug!(reclassified, "final region sweep");
        }

        let stats = RunStats {
            pages_fetched,
            rows_parsed,
            rows_skipped,
            collected: rows_parsed + fallback_records,
            unique: acc.len(),
            duplicates: acc.duplicates(),
            fallback_records,
            modal_hits,
            seed_hits,
            termination,
        };
        info!(
            pages = stats.pages_fetched,
            collected = stats.collected,
            unique = stats.unique,
            duplicates = stats.duplicates,
            skipped = stats.rows_skipped,
            modal = stats.modal_hits,
            seed = stats.seed_hits,
            termination = %stats.termination,
            "Listing run finished"
        );
        RunOutput {
            records: acc.into_records(),
            stats,
        }
    }
}

fn spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

// ── Tests ──
