//! Downloads OSM data from an API server, with a directory of cached
//! responses so repeated runs over the same area don't hit the network.

use anyhow::{bail, Context, Result};
use log::info;
use std::path::Path;

use situtil::{prettyprint_usize, Timer};

use crate::reader::{self, Document};
use crate::Area;

// Indoor relations can nest; stop chasing references after this many rounds.
const MAX_RESOLVE_ROUNDS: usize = 10;
// Keep URLs to a sane length.
const IDS_PER_REQUEST: usize = 200;

pub struct Fetcher {
    server_url: String,
    cache_dir: String,
}

impl Fetcher {
    pub fn new(server_url: &str, cache_dir: &str) -> Fetcher {
        Fetcher {
            server_url: server_url.trim_end_matches('/').to_string(),
            cache_dir: cache_dir.to_string(),
        }
    }

    /// Downloads everything inside one bounding box.
    pub fn load_area(&self, area: &Area, timer: &mut Timer) -> Result<Document> {
        let url = format!(
            "{}/api/0.6/map?bbox={},{},{},{}",
            self.server_url, area.min_lon, area.min_lat, area.max_lon, area.max_lat
        );
        timer.start(format!("load {}", url));
        let doc = reader::read_str(&self.get_cached(&url)?)?;
        timer.stop(format!("load {}", url));
        timer.note(format!(
            "Found {} nodes, {} ways, {} relations",
            prettyprint_usize(doc.nodes.len()),
            prettyprint_usize(doc.ways.len()),
            prettyprint_usize(doc.relations.len())
        ));
        Ok(doc)
    }

    /// Repeatedly fetches whatever the document references but doesn't
    /// contain, until it's closed. A bounding-box download routinely clips
    /// away nodes of border-crossing ways and members of large relations.
    pub fn resolve_missing(&self, doc: &mut Document, timer: &mut Timer) -> Result<()> {
        timer.start("resolve missing references");
        for _ in 0..MAX_RESOLVE_ROUNDS {
            let (nodes, ways, relations) = doc.missing_references();
            if nodes.is_empty() && ways.is_empty() && relations.is_empty() {
                timer.stop("resolve missing references");
                return Ok(());
            }
            if !nodes.is_empty() {
                info!("Fetching {} missing nodes", nodes.len());
            }
            for chunk in nodes
                .into_iter()
                .map(|id| id.0)
                .collect::<Vec<_>>()
                .chunks(IDS_PER_REQUEST)
            {
                doc.merge(self.fetch_elements("nodes", chunk)?);
            }
            if !ways.is_empty() {
                info!("Fetching {} missing ways", ways.len());
            }
            for chunk in ways
                .into_iter()
                .map(|id| id.0)
                .collect::<Vec<_>>()
                .chunks(IDS_PER_REQUEST)
            {
                doc.merge(self.fetch_elements("ways", chunk)?);
            }
            if !relations.is_empty() {
                info!("Fetching {} missing relations", relations.len());
            }
            for chunk in relations
                .into_iter()
                .map(|id| id.0)
                .collect::<Vec<_>>()
                .chunks(IDS_PER_REQUEST)
            {
                doc.merge(self.fetch_elements("relations", chunk)?);
            }
        }
        bail!(
            "Still missing references after {} rounds of fetching",
            MAX_RESOLVE_ROUNDS
        );
    }

    /// One batch request for "nodes", "ways" or "relations" by id.
    fn fetch_elements(&self, kind: &str, ids: &[i64]) -> Result<Document> {
        let id_list = ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let url = format!("{}/api/0.6/{}?{}={}", self.server_url, kind, kind, id_list);
        reader::read_str(&self.get_cached(&url)?)
    }

    fn get_cached(&self, url: &str) -> Result<String> {
        let path = format!("{}/{}", self.cache_dir, cache_filename(url));
        if Path::new(&path).exists() {
            info!("Using cached {}", url);
            return Ok(fs_err::read_to_string(path)?);
        }
        info!("Fetching {}", url);
        let resp = reqwest::blocking::get(url)
            .and_then(|resp| resp.error_for_status())
            .with_context(|| format!("fetching {}", url))?
            .text()?;
        fs_err::create_dir_all(&self.cache_dir)?;
        fs_err::write(path, &resp)?;
        Ok(resp)
    }
}

fn cache_filename(url: &str) -> String {
    url.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_filename() {
        assert_eq!(
            cache_filename("https://api.openstreetmap.org/api/0.6/map?bbox=1,2,3,4"),
            "https___api_openstreetmap_org_api_0_6_map_bbox_1_2_3_4"
        );
    }

    #[test]
    fn test_trailing_slash_normalized() {
        let fetcher = Fetcher::new("https://example.com/", "cache");
        assert_eq!(fetcher.server_url, "https://example.com");
    }
}
