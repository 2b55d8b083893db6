//! The previously finalized dataset, used only to fill fields still empty
//! after the structured sources ran.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use crate::error::LoadError;
use crate::record::{Field, ProjectRecord};
use crate::sanitize::{coerce_coord, is_descriptive_region, is_placeholder};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct CleanedEntry {
    values: HashMap<Field, String>,
}

impl CleanedEntry {
    pub fn get(&self, field: Field) -> Option<&str> {
        self.values.get(&field).map(String::as_str)
    }

    /// Descriptive text in `region` moves to `project_type` (if absent) and
    /// the region is dropped.
    fn sanitize_region(&mut self) {
        let Some(region) = self.values.get(&Field::Region).map(|r| r.trim().to_string()) else {
            return;
        };
        if region.is_empty() || !is_descriptive_region(&region) {
            return;
        }
        self.values.entry(Field::ProjectType).or_insert(region);
        self.values.remove(&Field::Region);
    }

    /// Copy every value into a field that is still empty. Returns fields written.
    pub fn apply(&self, record: &mut ProjectRecord) -> Vec<Field> {
        let mut written = Vec::new();
        for field in Field::ALL {
            if field.is_identifier() || field.is_coordinate() {
                continue;
            }
            let Some(value) = self.get(field) else {
                continue;
            };
            if record.fill(field, value.trim()) {
                written.push(field);
            }
        }
        let lat = self.get(Field::Lat).and_then(coerce_coord);
        let lng = self.get(Field::Lng).and_then(coerce_coord);
        if let (Some(lat), Some(lng)) = (lat, lng) {
            if record.fill_point(lat, lng) {
                written.extend([Field::Lat, Field::Lng]);
            }
        }
        written
    }
}

/// Entries keyed by both project id and report contract id.
#[derive(Debug, Default)]
pub struct CleanedDataset {
    entries: HashMap<String, CleanedEntry>,
}

impl CleanedDataset {
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let file = std::fs::File::open(path).map_err(|source| LoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_reader(file).map_err(|source| LoadError::Csv {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, csv::Error> {
        let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
        let columns: Vec<Option<Field>> = rdr.headers()?.iter().map(Field::from_name).collect();

        let mut dataset = CleanedDataset::default();
        for row in rdr.records() {
            let row = row?;
            let mut pid = None;
            let mut rcid = None;
            let mut entry = CleanedEntry::default();
            for (col, raw) in columns.iter().zip(row.iter()) {
                let Some(field) = col else { continue };
                let value = raw.trim();
                if value.is_empty() || value.eq_ignore_ascii_case("nan") {
                    continue;
                }
                match field {
                    Field::ProjectId => pid = Some(normalize_id(value)),
                    Field::ReportContractId => rcid = Some(value.to_string()),
                    _ => {
                        entry.values.insert(*field, value.to_string());
                    }
                }
            }
            entry.sanitize_region();
            for key in [pid, rcid].into_iter().flatten() {
                dataset
                    .entries
                    .entry(key)
                    .or_default()
                    .values
                    .extend(entry.values.clone());
            }
        }
        Ok(dataset)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, id: &str) -> Option<&CleanedEntry> {
        self.entries.get(id.trim())
    }

    /// Entry for the record's project id, else its report contract id.
    pub fn lookup(&self, record: &ProjectRecord) -> Option<&CleanedEntry> {
        record
            .project_id
            .as_deref()
            .and_then(|id| self.get(id))
            .or_else(|| record.report_contract_id.as_deref().and_then(|id| self.get(id)))
    }
}

/// Spreadsheet exports turn `101` into `101.0`; undo that for integral ids.
fn normalize_id(raw: &str) -> String {
    let raw = raw.trim();
    if is_placeholder(raw) {
        return raw.to_string();
    }
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 => format!("{}", v as i64),
        _ => raw.to_string(),
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "\
project_id,description,report_contract_id,start_date,project_type,funding_year,region,lat,lng
101.0,Flood wall,22CA0011,2021-01-01,,2021,Construction of riprap revetment,15.1,120.6
,Pumping station,22OA0102,,Pump,,Region III,n/a,
abc-7,,,,,,NCR,,
";

    fn dataset() -> CleanedDataset {
        CleanedDataset::from_reader(CSV.as_bytes()).unwrap()
    }

    #[test]
    fn keyed_by_both_ids() {
        let d = dataset();
        assert!(d.get("101").is_some());
        assert!(d.get("22CA0011").is_some());
        assert!(d.get("22OA0102").is_some());
        assert!(d.get("abc-7").is_some());
        assert_eq!(d.len(), 4);
    }

    #[test]
    fn descriptive_region_sanitized_at_load() {
        let e = dataset();
        let e = e.get("101").unwrap();
        assert_eq!(e.get(Field::Region), None);
        assert_eq!(e.get(Field::ProjectType), Some("Construction of riprap revetment"));
    }

    #[test]
    fn apply_only_fills_nulls() {
        let d = dataset();
        let mut r = ProjectRecord {
            project_id: Some("101".into()),
            start_date: Some("2022-05-01".into()),
            ..Default::default()
        };
        let written = d.lookup(&r).unwrap().apply(&mut r);
        assert_eq!(r.start_date.as_deref(), Some("2022-05-01"));
        assert_eq!(r.funding_year.as_deref(), Some("2021"));
        assert_eq!(r.description.as_deref(), Some("Flood wall"));
        assert_eq!((r.lat, r.lng), (Some(15.1), Some(120.6)));
        assert!(!written.contains(&Field::StartDate));
        assert!(!written.contains(&Field::ReportContractId));
    }

    #[test]
    fn lookup_falls_back_to_contract_id() {
        let d = dataset();
        let mut r = ProjectRecord {
            project_id: Some("555".into()),
            report_contract_id: Some("22OA0102".into()),
            ..Default::default()
        };
        d.lookup(&r).unwrap().apply(&mut r);
        assert_eq!(r.project_type.as_deref(), Some("Pump"));
        assert_eq!(r.region.as_deref(), Some("Region III"));
        assert_eq!(r.lat, None);
    }

    #[test]
    fn id_normalization() {
        assert_eq!(normalize_id("101.0"), "101");
        assert_eq!(normalize_id(" 42 "), "42");
        assert_eq!(normalize_id("P-00042"), "P-00042");
        assert_eq!(normalize_id("1.5"), "1.5");
    }
}
