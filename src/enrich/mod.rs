//! Filling the fields a listing row leaves empty.
//!
//! Sources are consulted in a fixed order and every step is
//! non-destructive: a field written by an earlier step is never replaced.
//!
//! 1. captured modal fragment, else the seed page fragment (never both)
//! 2. heuristic project type, seed path only
//! 3. cleaned dataset
//! 4. region reclassification, then location → region table

pub mod cleaned;
pub mod regions;
pub mod seed;

use std::collections::HashMap;
use std::path::Path;

use tracing::debug;

use crate::classify::infer_project_type;
use crate::error::LoadError;
use crate::parser::{Extracted, FieldRules, Fragment};
use crate::record::{Field, ProjectRecord};
use crate::sanitize::reclassify_region;

pub use cleaned::CleanedDataset;
pub use seed::SeedDocument;

/// Captured modal markup keyed by project id.
#[derive(Debug, Default, Clone)]
pub struct ModalMap(HashMap<String, String>);

impl ModalMap {
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let raw = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let map = serde_json::from_str(&raw).map_err(|source| LoadError::Json {
            path: path.display().to_string(),
            source,
        })?;
        Ok(ModalMap(map))
    }

    pub fn get(&self, pid: &str) -> Option<&str> {
        self.0.get(pid).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl From<HashMap<String, String>> for ModalMap {
    fn from(map: HashMap<String, String>) -> Self {
        ModalMap(map)
    }
}

/// Optional enrichment inputs. Any of them may be absent.
#[derive(Default)]
pub struct Sources {
    pub modal: Option<ModalMap>,
    pub seed: Option<SeedDocument>,
    pub cleaned: Option<CleanedDataset>,
}

/// Which detail source supplied the fragment for a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detail {
    Modal,
    Seed,
    Missing,
}

pub struct Enricher {
    sources: Sources,
    rules: FieldRules,
}

impl Enricher {
    pub fn new(sources: Sources) -> Self {
        Enricher {
            sources,
            rules: FieldRules::new(),
        }
    }

    pub fn enrich(&self, record: &mut ProjectRecord) -> Detail {
        let detail = self.apply_detail(record);
        self.fill_from_cleaned_and_region(record);
        detail
    }

    /// Steps 3 and 4 only. Records that never had a detail fragment
    /// (GeoJSON fallback rows) enter here.
    pub fn fill_from_cleaned_and_region(&self, record: &mut ProjectRecord) {
        if let Some(entry) = self.sources.cleaned.as_ref().and_then(|c| c.lookup(record)) {
            let written = entry.apply(record);
            if !written.is_empty() {
                debug!(key = %record.key(), fields = written.len(), "filled from cleaned dataset");
            }
        }

        reclassify_region(record);
        if record.is_blank(Field::Region) {
            if let Some(region) = record.location.as_deref().and_then(regions::region_for_location) {
                record.fill(Field::Region, region);
            }
        }
    }

    fn apply_detail(&self, record: &mut ProjectRecord) -> Detail {
        let Some(pid) = record.project_id.clone() else {
            return Detail::Missing;
        };

        if let Some(markup) = self.sources.modal.as_ref().and_then(|m| m.get(&pid)) {
            let fragment = Fragment::parse(markup);
            apply_extracted(record, self.rules.extract(&fragment));
            return Detail::Modal;
        }

        let Some(fragment) = self.sources.seed.as_ref().and_then(|s| s.find(&pid)) else {
            return Detail::Missing;
        };
        apply_extracted(record, self.rules.extract(&fragment));
        if record.is_blank(Field::ProjectType) {
            let blob = format!(
                "{} {}",
                fragment.text(),
                record.description.as_deref().unwrap_or_default()
            );
            if let Some(guess) = infer_project_type(&blob) {
                record.fill(Field::ProjectType, guess);
            }
        }
        Detail::Seed
    }
}

fn apply_extracted(record: &mut ProjectRecord, x: Extracted) {
    let text = [
        (Field::StartDate, x.start_date),
        (Field::ProjectType, x.project_type),
        (Field::FundingYear, x.funding_year),
        (Field::ReportYear, x.report_year),
        (Field::Region, x.region),
    ];
    for (field, value) in text {
        if let Some(value) = value {
            record.fill(field, value);
        }
    }
    if let Some((lat, lng)) = x.coords {
        record.fill_point(lat, lng);
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    const CLEANED: &str = "\
project_id,start_date,contractor,region,lat,lng
201,2021-01-01,Agno Builders,,,
301,,,,14.0,121.5
";

    fn seed() -> SeedDocument {
        let html = std::fs::read_to_string("tests/fixtures/seed_page.html").unwrap();
        SeedDocument::parse(&html)
    }

    fn modal(entries: &[(&str, &str)]) -> ModalMap {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>()
            .into()
    }

    fn record(pid: &str) -> ProjectRecord {
        ProjectRecord {
            project_id: Some(pid.into()),
            ..Default::default()
        }
    }

    #[test]
    fn seed_beats_cleaned_dataset() {
        let enricher = Enricher::new(Sources {
            modal: Some(ModalMap::default()),
            seed: Some(seed()),
            cleaned: Some(CleanedDataset::from_reader(CLEANED.as_bytes()).unwrap()),
        });
        let mut r = record("201");
        assert_eq!(enricher.enrich(&mut r), Detail::Seed);
        assert_eq!(r.start_date.as_deref(), Some("2022-05-01"));
        // Cleaned dataset still fills what the seed left empty.
        assert_eq!(r.contractor.as_deref(), Some("Agno Builders"));
        assert_eq!(r.funding_year.as_deref(), Some("2021"));
        assert_eq!((r.lat, r.lng), (Some(16.0431), Some(120.3333)));
    }

    #[test]
    fn heuristic_runs_on_seed_path() {
        let enricher = Enricher::new(Sources {
            seed: Some(seed()),
            ..Default::default()
        });
        let mut r = record("201");
        enricher.enrich(&mut r);
        assert_eq!(r.project_type.as_deref(), Some("Slope Protection"));

        let mut r = record("203");
        enricher.enrich(&mut r);
        assert_eq!(r.project_type.as_deref(), Some("Gabion works"));
    }

    #[test]
    fn modal_hit_excludes_seed() {
        let enricher = Enricher::new(Sources {
            modal: Some(modal(&[("201", "<p>nothing useful here</p>")])),
            seed: Some(seed()),
            cleaned: None,
        });
        let mut r = record("201");
        assert_eq!(enricher.enrich(&mut r), Detail::Modal);
        assert_eq!(r.start_date, None);
        assert_eq!(r.lat, None);
        // No heuristic on the modal path.
        assert_eq!(r.project_type, None);
    }

    #[test]
    fn existing_values_survive() {
        let enricher = Enricher::new(Sources {
            seed: Some(seed()),
            ..Default::default()
        });
        let mut r = ProjectRecord {
            start_date: Some("2020-02-02".into()),
            lat: Some(10.0),
            ..record("201")
        };
        enricher.enrich(&mut r);
        assert_eq!(r.start_date.as_deref(), Some("2020-02-02"));
        // half a point is not completed from the seed pair
        assert_eq!((r.lat, r.lng), (Some(10.0), None));
    }

    #[test]
    fn modal_coordinates_respect_bounding_box() {
        let enricher = Enricher::new(Sources {
            modal: Some(modal(&[
                ("301", "<p>Pin (13.5, 121.0)</p>"),
                ("302", "<p>Pin (90.0, 200.0)</p>"),
            ])),
            ..Default::default()
        });
        let mut r = record("301");
        enricher.enrich(&mut r);
        assert_eq!((r.lat, r.lng), (Some(13.5), Some(121.0)));

        let mut r = record("302");
        enricher.enrich(&mut r);
        assert_eq!((r.lat, r.lng), (None, None));
    }

    #[test]
    fn region_from_location_after_reclassification() {
        let enricher = Enricher::new(Sources::default());
        let mut r = ProjectRecord {
            location: Some("Brgy. Tumana, Marikina City".into()),
            region: Some("Rehab of pumping station".into()),
            ..record("400")
        };
        assert_eq!(enricher.enrich(&mut r), Detail::Missing);
        assert_eq!(r.project_type.as_deref(), Some("Rehab of pumping station"));
        assert_eq!(r.region.as_deref(), Some("National Capital Region"));
    }

    #[test]
    fn no_project_id_skips_detail_sources() {
        let enricher = Enricher::new(Sources {
            seed: Some(seed()),
            ..Default::default()
        });
        let mut r = ProjectRecord {
            report_contract_id: Some("22CA0011".into()),
            ..Default::default()
        };
        assert_eq!(enricher.enrich(&mut r), Detail::Missing);
    }
}
