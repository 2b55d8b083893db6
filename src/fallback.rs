//! Open GeoJSON dataset, used only when the listing produced nothing.

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde_json::{Map, Value};
use tracing::info;

use crate::config::Settings;
use crate::record::ProjectRecord;
use crate::sanitize::{coord_from_json, text_from_json};

/// Something that can hand over a complete record set when the listing fails.
pub trait Fallback {
    fn records(&self) -> Result<Vec<ProjectRecord>>;
}

pub struct GeoJsonFallback {
    url: String,
    client: Client,
}

impl GeoJsonFallback {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.timeout())
            .build()
            .context("Failed to build HTTP client")?;
        Ok(GeoJsonFallback {
            url: settings.geojson_url.clone(),
            client,
        })
    }
}

impl Fallback for GeoJsonFallback {
    fn records(&self) -> Result<Vec<ProjectRecord>> {
        info!(url = %self.url, "Listing returned no data, trying GeoJSON fallback");
        let collection: Value = self
            .client
            .get(&self.url)
            .send()
            .and_then(|r| r.error_for_status())
            .with_context(|| format!("GET {}", self.url))?
            .json()
            .context("GeoJSON body is not JSON")?;
        let records = map_collection(&collection);
        info!(count = records.len(), "Loaded records from GeoJSON fallback");
        Ok(records)
    }
}

pub fn map_collection(collection: &Value) -> Vec<ProjectRecord> {
    collection
        .get("features")
        .and_then(Value::as_array)
        .map(|features| features.iter().map(map_feature).collect())
        .unwrap_or_default()
}

pub fn map_feature(feature: &Value) -> ProjectRecord {
    let empty = Map::new();
    let props = feature
        .get("properties")
        .and_then(Value::as_object)
        .unwrap_or(&empty);
    let prop = |key: &str| props.get(key).and_then(text_from_json);

    let location = [prop("Municipality"), prop("Province")]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(", ");
    let year = prop("InfraYear");

    let mut record = ProjectRecord {
        project_id: prop("ContractID").or_else(|| prop("GlobalID")),
        description: prop("ProjectDescription"),
        location: Some(location).filter(|l| !l.is_empty()),
        contractor: prop("Contractor"),
        cost: prop("ContractCost"),
        completion_date: prop("CompletionDate"),
        report_contract_id: prop("ContractID"),
        start_date: prop("StartDate"),
        project_type: prop("TypeofWork"),
        funding_year: year.clone(),
        report_year: year,
        region: prop("Region"),
        lat: None,
        lng: None,
    };

    // GeoJSON positions are [lng, lat].
    if let Some(pos) = feature
        .pointer("/geometry/coordinates")
        .and_then(Value::as_array)
        .filter(|p| p.len() >= 2)
    {
        record.lng = coord_from_json(&pos[0]);
        record.lat = coord_from_json(&pos[1]);
    }
    record
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn feature_properties_map_to_record() {
        let r = map_feature(&json!({
            "type": "Feature",
            "properties": {
                "ContractID": "21CE0042",
                "GlobalID": "{ABC}",
                "ProjectDescription": "Construction of Revetment",
                "Municipality": "Iriga City",
                "Province": "Camarines Sur",
                "Contractor": "Bicol Works",
                "ContractCost": 48500000.5,
                "CompletionDate": "2022-11-30",
                "StartDate": "2021-06-01",
                "TypeofWork": "Revetment",
                "InfraYear": 2021,
                "Region": "Region V"
            },
            "geometry": {"type": "Point", "coordinates": [123.42, 13.42]}
        }));
        assert_eq!(r.project_id.as_deref(), Some("21CE0042"));
        assert_eq!(r.report_contract_id.as_deref(), Some("21CE0042"));
        assert_eq!(r.location.as_deref(), Some("Iriga City, Camarines Sur"));
        assert_eq!(r.cost.as_deref(), Some("48500000.5"));
        assert_eq!(r.funding_year.as_deref(), Some("2021"));
        assert_eq!(r.report_year.as_deref(), Some("2021"));
        assert_eq!(r.region.as_deref(), Some("Region V"));
        assert_eq!((r.lat, r.lng), (Some(13.42), Some(123.42)));
    }

    #[test]
    fn global_id_when_contract_id_missing() {
        let r = map_feature(&json!({
            "properties": {"GlobalID": "{F00}", "Province": "Bulacan", "ContractID": ""},
            "geometry": null
        }));
        assert_eq!(r.project_id.as_deref(), Some("{F00}"));
        assert_eq!(r.report_contract_id, None);
        assert_eq!(r.location.as_deref(), Some("Bulacan"));
        assert_eq!((r.lat, r.lng), (None, None));
    }

    #[test]
    fn collection_without_features() {
        assert!(map_collection(&json!({"type": "FeatureCollection"})).is_empty());
        let rs = map_collection(&json!({"features": [{"properties": {}}, {}]}));
        assert_eq!(rs.len(), 2);
        assert_eq!(rs[0], ProjectRecord::default());
    }
}
