use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use config::Config;
use serde::Deserialize;

pub const DEFAULT_AJAX_URL: &str = "https://sumbongsapangulo.ph/wp-admin/admin-ajax.php";
pub const DEFAULT_GEOJSON_URL: &str =
    "https://raw.githubusercontent.com/rukku/sumbongsapangulo.ph-datasets/main/flood_control_projects.geojson";
pub const DEFAULT_LAYER_URLS: &[&str] = &[
    "https://services1.arcgis.com/IwZZTMxZCmAmFYvF/arcgis/rest/services/DPWH_Flood_Control_Projects/FeatureServer/0",
    "https://services1.arcgis.com/IwZZTMxZCmAmFYvF/arcgis/rest/services/FloodControl_Data_20250802_v6_corrected_coordinates_for_uploading/FeatureServer/0",
];

/// Every knob of a run. Sources, in increasing priority: defaults below,
/// optional `fcp.toml`, `FCP_*` environment variables, CLI flags.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Listing endpoint (admin-ajax).
    pub ajax_url: String,
    /// Form token sent as `nonce`; some deployments accept it empty.
    pub nonce: String,
    pub per_page: u32,
    /// Safety cap on pages per run, not a correctness condition.
    pub max_pages: u32,
    /// Pause between page fetches.
    pub page_delay_ms: u64,
    pub timeout_secs: u64,

    /// Load `seed_path` when it exists.
    pub use_seed: bool,
    pub seed_path: PathBuf,
    pub modal_path: PathBuf,
    pub cleaned_path: PathBuf,
    /// Raw admin-ajax responses are appended here when set.
    pub ajax_dump_path: Option<PathBuf>,

    /// Download the open GeoJSON dataset when the listing yields nothing.
    pub fallback_geojson: bool,
    pub geojson_url: String,

    pub layer_urls: Vec<String>,
    /// Backfill missing coordinates of listing records from the feature layer.
    pub layer_backfill: bool,
    pub geometry_page_size: usize,
    pub geometry_chunk_size: usize,

    pub out_json: PathBuf,
    pub out_csv: PathBuf,
    pub layer_out_json: PathBuf,
    pub layer_out_csv: PathBuf,
    pub db_path: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            ajax_url: DEFAULT_AJAX_URL.to_string(),
            nonce: String::new(),
            per_page: 200,
            max_pages: 1000,
            page_delay_ms: 200,
            timeout_secs: 60,
            use_seed: true,
            seed_path: PathBuf::from("data/live_page.html"),
            modal_path: PathBuf::from("data/project_modals.json"),
            cleaned_path: PathBuf::from("data/Flood Control Projects Cleaned.csv"),
            ajax_dump_path: None,
            fallback_geojson: true,
            geojson_url: DEFAULT_GEOJSON_URL.to_string(),
            layer_urls: DEFAULT_LAYER_URLS.iter().map(|s| s.to_string()).collect(),
            layer_backfill: false,
            geometry_page_size: 2000,
            geometry_chunk_size: 500,
            out_json: PathBuf::from("data/Flood Control Projects Raw.json"),
            out_csv: PathBuf::from("data/Flood Control Projects Raw.csv"),
            layer_out_json: PathBuf::from("data/Flood Control Projects Layer.json"),
            layer_out_csv: PathBuf::from("data/Flood Control Projects Layer.csv"),
            db_path: PathBuf::from("data/fcp.sqlite"),
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        let cfg = Config::builder()
            .add_source(config::File::with_name("fcp").required(false))
            .add_source(
                config::Environment::with_prefix("FCP")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("layer_urls"),
            )
            .build()
            .context("Failed to assemble configuration")?;
        cfg.try_deserialize().context("Invalid configuration")
    }

    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let s = Settings::default();
        assert_eq!(s.per_page, 200);
        assert_eq!(s.max_pages, 1000);
        assert_eq!(s.geometry_page_size, 2000);
        assert_eq!(s.geometry_chunk_size, 500);
        assert_eq!(s.layer_urls.len(), 2);
        assert!(s.use_seed);
    }

    #[test]
    fn partial_sources_keep_defaults() {
        let cfg = Config::builder()
            .set_override("per_page", 20i64)
            .unwrap()
            .set_override("max_pages", 1i64)
            .unwrap()
            .build()
            .unwrap();
        let s: Settings = cfg.try_deserialize().unwrap();
        assert_eq!(s.per_page, 20);
        assert_eq!(s.max_pages, 1);
        assert_eq!(s.ajax_url, DEFAULT_AJAX_URL);
    }
}
