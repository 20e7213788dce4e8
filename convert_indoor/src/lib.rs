//! Turns indoor-mapped OSM data into consolidated building geometry and back
//! into an osmChange diff: fetch or read raw XML, extract buildings from
//! tagged relations, run the consolidation passes, export the result.

use anyhow::{Context, Result};
use serde::Deserialize;

use geom::Distance;
use sit_model::ConsolidateOptions;

pub mod export;
pub mod extract;
pub mod fetch;
pub mod reader;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default = "default_server_url")]
    pub server_url: String,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
    /// Two points closer than this many meters mean the same wall corner.
    #[serde(default = "default_max_wall_width")]
    pub max_wall_width_m: f64,
    /// Tolerance in meters for matching vertical passages across levels.
    #[serde(default = "default_max_level_connection_offset")]
    pub max_level_connection_offset_m: f64,
    /// Tag keys marking decorative boundary points.
    #[serde(default = "default_decorative_tags")]
    pub decorative_tags: Vec<String>,
    /// Bounding boxes to download and process.
    #[serde(default)]
    pub areas: Vec<Area>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Area {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

fn default_server_url() -> String {
    "https://api.openstreetmap.org".to_string()
}
fn default_cache_dir() -> String {
    "osm_cache".to_string()
}
fn default_max_wall_width() -> f64 {
    0.4
}
fn default_max_level_connection_offset() -> f64 {
    2.0
}
fn default_decorative_tags() -> Vec<String> {
    vec!["door".to_string(), "window".to_string()]
}

impl Config {
    pub fn load(path: &str) -> Result<Config> {
        let raw = fs_err::read_to_string(path)?;
        let config: Config =
            serde_json::from_str(&raw).with_context(|| format!("parsing {}", path))?;
        Ok(config)
    }

    pub fn consolidate_options(&self) -> ConsolidateOptions {
        ConsolidateOptions {
            max_wall_width: Distance::meters(self.max_wall_width_m),
            max_level_connection_offset: Distance::meters(self.max_level_connection_offset_m),
            decorative_tags: self.decorative_tags.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.server_url, "https://api.openstreetmap.org");
        assert_eq!(config.max_wall_width_m, 0.4);
        assert!(config.areas.is_empty());
        let opts = config.consolidate_options();
        assert_eq!(opts.max_wall_width, Distance::meters(0.4));
    }

    #[test]
    fn test_config_overrides() {
        let config: Config = serde_json::from_str(
            r#"{
                "max_wall_width_m": 0.2,
                "decorative_tags": ["door"],
                "areas": [{"min_lon": 13.7, "min_lat": 51.0, "max_lon": 13.8, "max_lat": 51.1}]
            }"#,
        )
        .unwrap();
        assert_eq!(config.max_wall_width_m, 0.2);
        assert_eq!(config.decorative_tags, vec!["door".to_string()]);
        assert_eq!(config.areas.len(), 1);
    }
}
