//! ArcGIS feature layer: attribute export and point geometry backfill.

use std::collections::{HashMap, HashSet};

use reqwest::blocking::Client;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::error::GeometryError;
use crate::record::ProjectRecord;
use crate::sanitize::{coord_from_json, text_from_json};

/// GET `url?params` returning a JSON document.
pub trait FeatureService {
    fn get(&self, url: &str, params: &[(&str, String)]) -> Result<Value, GeometryError>;
}

pub struct HttpFeatureService {
    client: Client,
}

impl HttpFeatureService {
    pub fn new(settings: &Settings) -> Result<Self, GeometryError> {
        let client = Client::builder()
            .timeout(settings.timeout())
            .build()
            .map_err(|e| GeometryError::Http(e.to_string()))?;
        Ok(HttpFeatureService { client })
    }
}

impl FeatureService for HttpFeatureService {
    fn get(&self, url: &str, params: &[(&str, String)]) -> Result<Value, GeometryError> {
        let resp = self
            .client
            .get(url)
            .query(params)
            .send()
            .map_err(|e| GeometryError::Http(format!("{}: {}", url, e)))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(GeometryError::Http(format!("{}: HTTP {}", url, status.as_u16())));
        }
        resp.json::<Value>()
            .map_err(|e| GeometryError::Payload(format!("{}: {}", url, e)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayerInfo {
    pub name: Option<String>,
    pub max_record_count: Option<usize>,
    pub object_id_field: String,
}

impl LayerInfo {
    fn from_json(v: &Value) -> Self {
        let max_record_count = ["maxRecordCount", "standardMaxRecordCount"]
            .iter()
            .find_map(|k| v.get(*k).and_then(Value::as_u64))
            .filter(|n| *n > 0)
            .map(|n| n as usize);
        let object_id_field = ["objectIdField", "objectIdFieldName"]
            .iter()
            .find_map(|k| v.get(*k).and_then(Value::as_str))
            .or_else(|| v.pointer("/fields/0/name").and_then(Value::as_str))
            .unwrap_or("OBJECTID")
            .to_string();
        LayerInfo {
            name: v.get("name").and_then(Value::as_str).map(str::to_string),
            max_record_count,
            object_id_field,
        }
    }
}

/// One exported layer feature.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerRow {
    pub object_id: Option<i64>,
    #[serde(flatten)]
    pub record: ProjectRecord,
}

#[derive(Debug, Default)]
pub struct LayerExport {
    pub layer_url: Option<String>,
    pub rows: Vec<LayerRow>,
    pub backfilled: usize,
    pub last_error: Option<String>,
}

struct PopulatedLayer {
    url: String,
    info: LayerInfo,
    features: Vec<Map<String, Value>>,
}

pub struct GeometrySource<'s> {
    service: &'s dyn FeatureService,
    page_size: usize,
    chunk_size: usize,
}

impl<'s> GeometrySource<'s> {
    pub fn new(service: &'s dyn FeatureService, page_size: usize, chunk_size: usize) -> Self {
        GeometrySource {
            service,
            page_size: page_size.max(1),
            chunk_size: chunk_size.max(1),
        }
    }

    fn query(&self, url: &str, params: &[(&str, String)]) -> Result<Value, GeometryError> {
        let v = self.service.get(url, params)?;
        if let Some(err) = v.get("error") {
            let message = err
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| err.to_string());
            return Err(GeometryError::Service(message));
        }
        Ok(v)
    }

    pub fn layer_info(&self, layer_url: &str) -> Result<LayerInfo, GeometryError> {
        let v = self.query(layer_url, &[("f", "json".to_string())])?;
        if !v.is_object() {
            return Err(GeometryError::Payload("layer description is not an object".into()));
        }
        Ok(LayerInfo::from_json(&v))
    }

    /// Every feature's attributes, paged by offset in object id order.
    pub fn fetch_all_features(
        &self,
        layer_url: &str,
        info: &LayerInfo,
    ) -> Result<Vec<Map<String, Value>>, GeometryError> {
        let page_size = info
            .max_record_count
            .map_or(self.page_size, |max| self.page_size.min(max));
        let query_url = format!("{}/query", layer_url);
        let mut all = Vec::new();
        let mut offset = 0usize;
        loop {
            let v = self.query(
                &query_url,
                &[
                    ("f", "json".to_string()),
                    ("where", "1=1".to_string()),
                    ("outFields", "*".to_string()),
                    ("returnGeometry", "false".to_string()),
                    ("orderByFields", format!("{} ASC", info.object_id_field)),
                    ("resultOffset", offset.to_string()),
                    ("resultRecordCount", page_size.to_string()),
                ],
            )?;
            let features = features_of(&v)?;
            if features.is_empty() {
                break;
            }
            let n = features.len();
            all.extend(
                features
                    .iter()
                    .map(|f| f.get("attributes").and_then(Value::as_object).cloned().unwrap_or_default()),
            );
            offset += n;
            debug!(offset, "feature page fetched");
            if n < page_size {
                break;
            }
        }
        Ok(all)
    }

    /// Point geometry (WGS84) per object id, queried in chunks. Only geometries
    /// carrying both `x` and `y` are returned, as `(lat, lng)`.
    pub fn fetch_geometries(
        &self,
        layer_url: &str,
        oid_field: &str,
        object_ids: &[i64],
    ) -> Result<HashMap<i64, (f64, f64)>, GeometryError> {
        let query_url = format!("{}/query", layer_url);
        let mut points = HashMap::new();
        for chunk in object_ids.chunks(self.chunk_size) {
            let ids = chunk.iter().map(i64::to_string).collect::<Vec<_>>().join(",");
            let v = self.query(
                &query_url,
                &[
                    ("f", "json".to_string()),
                    ("objectIds", ids),
                    ("outFields", oid_field.to_string()),
                    ("returnGeometry", "true".to_string()),
                    ("outSR", "4326".to_string()),
                ],
            )?;
            for f in features_of(&v)? {
                let Some(oid) = f.get("attributes").and_then(|a| a.get(oid_field)).and_then(as_object_id)
                else {
                    continue;
                };
                let Some(geom) = f.get("geometry").and_then(Value::as_object) else {
                    continue;
                };
                let x = geom.get("x").and_then(coord_from_json);
                let y = geom.get("y").and_then(coord_from_json);
                if let (Some(lng), Some(lat)) = (x, y) {
                    points.insert(oid, (lat, lng));
                }
            }
        }
        Ok(points)
    }

    /// First candidate layer that returns any features. Failing candidates are
    /// logged and skipped.
    fn first_populated(&self, urls: &[String], last_error: &mut Option<String>) -> Option<PopulatedLayer> {
        for url in urls {
            info!(%url, "Fetching layer info");
            let attempt = self
                .layer_info(url)
                .and_then(|info| self.fetch_all_features(url, &info).map(|f| (info, f)));
            match attempt {
                Ok((info, features)) => {
                    info!(
                        name = info.name.as_deref().unwrap_or("?"),
                        oid = %info.object_id_field,
                        count = features.len(),
                        "Layer queried"
                    );
                    if !features.is_empty() {
                        return Some(PopulatedLayer {
                            url: url.clone(),
                            info,
                            features,
                        });
                    }
                }
                Err(e) => {
                    warn!(%url, "Layer candidate failed: {}", e);
                    *last_error = Some(e.to_string());
                }
            }
        }
        None
    }

    /// Export the first populated layer, filling missing points from the
    /// geometry query, one row per object id.
    pub fn export(&self, urls: &[String]) -> LayerExport {
        let mut export = LayerExport::default();
        let Some(layer) = self.first_populated(urls, &mut export.last_error) else {
            return export;
        };
        let oid_field = &layer.info.object_id_field;

        let mut rows: Vec<LayerRow> = layer
            .features
            .iter()
            .map(|attrs| LayerRow {
                object_id: object_id(attrs, oid_field),
                record: map_feature(attrs),
            })
            .collect();

        let missing: Vec<i64> = rows
            .iter()
            .filter(|r| r.record.missing_coords())
            .filter_map(|r| r.object_id)
            .collect();
        if !missing.is_empty() {
            info!(count = missing.len(), "Backfilling geometry for rows without coordinates");
            match self.fetch_geometries(&layer.url, oid_field, &missing) {
                Ok(points) => {
                    for row in rows.iter_mut() {
                        let Some(&(lat, lng)) = row.object_id.and_then(|id| points.get(&id)) else {
                            continue;
                        };
                        if row.record.fill_point(lat, lng) {
                            export.backfilled += 1;
                        }
                    }
                }
                Err(e) => {
                    warn!("Geometry backfill failed: {}", e);
                    export.last_error = Some(e.to_string());
                }
            }
        }

        let mut seen = HashSet::new();
        rows.retain(|r| seen.insert(r.object_id));
        export.layer_url = Some(layer.url);
        export.rows = rows;
        export
    }

    /// Fill coordinates of listing records from the layer, matching on
    /// project id, else report contract id. Returns records that gained a point.
    pub fn backfill(&self, urls: &[String], records: &mut [ProjectRecord]) -> usize {
        if !records.iter().any(ProjectRecord::missing_coords) {
            return 0;
        }
        let mut last_error = None;
        let Some(layer) = self.first_populated(urls, &mut last_error) else {
            return 0;
        };
        let oid_field = &layer.info.object_id_field;

        let mut by_id: HashMap<String, usize> = HashMap::new();
        for (i, attrs) in layer.features.iter().enumerate() {
            for key in ["ProjectID", "ContractID"] {
                if let Some(id) = attrs.get(key).and_then(text_from_json) {
                    by_id.entry(id).or_insert(i);
                }
            }
        }
        let feature_for = |r: &ProjectRecord| {
            [&r.project_id, &r.report_contract_id]
                .into_iter()
                .flatten()
                .find_map(|id| by_id.get(id.trim()).copied())
        };

        let mut filled = 0;
        let mut pending: Vec<(usize, i64)> = Vec::new();
        for (i, record) in records.iter_mut().enumerate() {
            if !record.missing_coords() {
                continue;
            }
            let Some(fi) = feature_for(&*record) else { continue };
            let attrs = &layer.features[fi];
            let mapped = map_feature(attrs);
            if let (Some(lat), Some(lng)) = (mapped.lat, mapped.lng) {
                if record.fill_point(lat, lng) {
                    filled += 1;
                }
            }
            if record.missing_coords() {
                if let Some(oid) = object_id(attrs, oid_field) {
                    pending.push((i, oid));
                }
            }
        }

        if !pending.is_empty() {
            let ids: Vec<i64> = pending.iter().map(|(_, oid)| *oid).collect();
            match self.fetch_geometries(&layer.url, oid_field, &ids) {
                Ok(points) => {
                    for (i, oid) in pending {
                        if let Some(&(lat, lng)) = points.get(&oid) {
                            if records[i].fill_point(lat, lng) {
                                filled += 1;
                            }
                        }
                    }
                }
                Err(e) => warn!("Geometry backfill failed: {}", e),
            }
        }
        info!(filled, "Coordinates backfilled from feature layer");
        filled
    }
}

fn features_of(v: &Value) -> Result<&Vec<Value>, GeometryError> {
    match v.get("features") {
        Some(Value::Array(features)) => Ok(features),
        None | Some(Value::Null) => Err(GeometryError::Payload("response has no features".into())),
        Some(_) => Err(GeometryError::Payload("features is not an array".into())),
    }
}

fn as_object_id(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn object_id(attrs: &Map<String, Value>, oid_field: &str) -> Option<i64> {
    ["OBJECTID", "ObjectId", oid_field]
        .iter()
        .find_map(|k| attrs.get(*k).and_then(as_object_id))
}

/// Layer attributes → record. A zero latitude or longitude means "unknown".
pub fn map_feature(attrs: &Map<String, Value>) -> ProjectRecord {
    let text = |key: &str| attrs.get(key).and_then(text_from_json);
    let coord = |key: &str| {
        attrs
            .get(key)
            .and_then(coord_from_json)
            .filter(|v| v.abs() >= 1e-9)
    };
    let year = text("FundingYear").or_else(|| text("infra_year"));
    ProjectRecord {
        project_id: text("ProjectID"),
        description: text("ProjectDescription"),
        location: text("Province"),
        contractor: text("Contractor"),
        cost: ["ContractCost_String", "ABC_String", "ContractCost", "ABC"]
            .into_iter()
            .find_map(text),
        completion_date: text("CompletionDateActual"),
        report_contract_id: text("ContractID"),
        start_date: text("StartDate"),
        project_type: text("TypeofWork"),
        funding_year: year.clone(),
        report_year: year,
        region: text("Region"),
        lat: coord("Latitude"),
        lng: coord("Longitude"),
    }
}

// ── Tests ──
