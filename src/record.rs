use serde::{Deserialize, Serialize};

/// Output columns, in the order every tabular export must use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    ProjectId,
    Description,
    Location,
    Contractor,
    Cost,
    CompletionDate,
    ReportContractId,
    StartDate,
    ProjectType,
    FundingYear,
    ReportYear,
    Region,
    Lat,
    Lng,
}

impl Field {
    pub const ALL: [Field; 14] = [
        Field::ProjectId,
        Field::Description,
        Field::Location,
        Field::Contractor,
        Field::Cost,
        Field::CompletionDate,
        Field::ReportContractId,
        Field::StartDate,
        Field::ProjectType,
        Field::FundingYear,
        Field::ReportYear,
        Field::Region,
        Field::Lat,
        Field::Lng,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Field::ProjectId => "project_id",
            Field::Description => "description",
            Field::Location => "location",
            Field::Contractor => "contractor",
            Field::Cost => "cost",
            Field::CompletionDate => "completion_date",
            Field::ReportContractId => "report_contract_id",
            Field::StartDate => "start_date",
            Field::ProjectType => "project_type",
            Field::FundingYear => "funding_year",
            Field::ReportYear => "report_year",
            Field::Region => "region",
            Field::Lat => "lat",
            Field::Lng => "lng",
        }
    }

    pub fn from_name(name: &str) -> Option<Field> {
        let name = name.trim();
        Field::ALL.into_iter().find(|f| f.name() == name)
    }

    pub fn is_coordinate(self) -> bool {
        matches!(self, Field::Lat | Field::Lng)
    }

    pub fn is_identifier(self) -> bool {
        matches!(self, Field::ProjectId | Field::ReportContractId)
    }
}

/// One infrastructure project, as emitted by the pipeline.
///
/// Field order matches [`Field::ALL`]; serde keeps that order for JSON output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub project_id: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub contractor: Option<String>,
    pub cost: Option<String>,
    pub completion_date: Option<String>,
    pub report_contract_id: Option<String>,
    pub start_date: Option<String>,
    pub project_type: Option<String>,
    pub funding_year: Option<String>,
    pub report_year: Option<String>,
    pub region: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

/// Identity of a record within one run: `(project_id, report_contract_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompositeKey {
    pub project_id: Option<String>,
    pub report_contract_id: Option<String>,
}

impl std::fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "pid:{}|rcid:{}",
            self.project_id.as_deref().unwrap_or("None"),
            self.report_contract_id.as_deref().unwrap_or("None")
        )
    }
}

impl ProjectRecord {
    pub fn key(&self) -> CompositeKey {
        CompositeKey {
            project_id: self.project_id.clone(),
            report_contract_id: self.report_contract_id.clone(),
        }
    }

    /// Text value of a field. Coordinates are not text; use `lat`/`lng` directly.
    pub fn text(&self, field: Field) -> Option<&str> {
        match field {
            Field::ProjectId => self.project_id.as_deref(),
            Field::Description => self.description.as_deref(),
            Field::Location => self.location.as_deref(),
            Field::Contractor => self.contractor.as_deref(),
            Field::Cost => self.cost.as_deref(),
            Field::CompletionDate => self.completion_date.as_deref(),
            Field::ReportContractId => self.report_contract_id.as_deref(),
            Field::StartDate => self.start_date.as_deref(),
            Field::ProjectType => self.project_type.as_deref(),
            Field::FundingYear => self.funding_year.as_deref(),
            Field::ReportYear => self.report_year.as_deref(),
            Field::Region => self.region.as_deref(),
            Field::Lat | Field::Lng => None,
        }
    }

    pub fn text_mut(&mut self, field: Field) -> Option<&mut Option<String>> {
        let slot = match field {
            Field::ProjectId => &mut self.project_id,
            Field::Description => &mut self.description,
            Field::Location => &mut self.location,
            Field::Contractor => &mut self.contractor,
            Field::Cost => &mut self.cost,
            Field::CompletionDate => &mut self.completion_date,
            Field::ReportContractId => &mut self.report_contract_id,
            Field::StartDate => &mut self.start_date,
            Field::ProjectType => &mut self.project_type,
            Field::FundingYear => &mut self.funding_year,
            Field::ReportYear => &mut self.report_year,
            Field::Region => &mut self.region,
            Field::Lat | Field::Lng => return None,
        };
        Some(slot)
    }

    pub fn coord(&self, field: Field) -> Option<f64> {
        match field {
            Field::Lat => self.lat,
            Field::Lng => self.lng,
            _ => None,
        }
    }

    /// True when the field holds nothing usable (None, or only whitespace).
    pub fn is_blank(&self, field: Field) -> bool {
        if field.is_coordinate() {
            return self.coord(field).is_none();
        }
        self.text(field).map_or(true, |v| v.trim().is_empty())
    }

    /// Non-destructive write: only fills a blank field. Returns whether it wrote.
    pub fn fill(&mut self, field: Field, value: impl Into<String>) -> bool {
        if !self.is_blank(field) {
            return false;
        }
        let value = value.into();
        if value.trim().is_empty() {
            return false;
        }
        match self.text_mut(field) {
            Some(slot) => {
                *slot = Some(value);
                true
            }
            None => false,
        }
    }

    /// Write a coordinate pair only when the record has neither axis, so a
    /// point is never assembled from two sources.
    pub fn fill_point(&mut self, lat: f64, lng: f64) -> bool {
        if !lat.is_finite() || !lng.is_finite() || self.lat.is_some() || self.lng.is_some() {
            return false;
        }
        self.lat = Some(lat);
        self.lng = Some(lng);
        true
    }

    pub fn missing_coords(&self) -> bool {
        self.lat.is_none() || self.lng.is_none()
    }

    /// Cell values in canonical column order; `None` renders as an empty cell.
    pub fn row(&self) -> Vec<String> {
        Field::ALL
            .iter()
            .map(|&f| match f {
                Field::Lat | Field::Lng => self.coord(f).map(|v| v.to_string()).unwrap_or_default(),
                _ => self.text(f).unwrap_or_default().to_string(),
            })
            .collect()
    }
}

// ── Tests ──
