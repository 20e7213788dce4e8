use anyhow::Result;
use log::warn;
use structopt::StructOpt;

use situtil::Timer;

use convert_indoor::{export, extract, fetch::Fetcher, reader, Config};

#[derive(StructOpt)]
#[structopt(
    name = "convert_indoor",
    about = "Consolidates indoor-mapped OSM buildings and writes the result as an osmChange diff"
)]
struct Flags {
    /// Path to the JSON config
    #[structopt(long, default_value = "config.json")]
    config: String,
    /// Read this local .osm file instead of querying the configured API
    #[structopt(long)]
    osm: Option<String>,
    /// Where to write the diff
    #[structopt(long, default_value = "diff.osc")]
    output: String,
}

fn main() -> Result<()> {
    situtil::logger::setup();
    let flags = Flags::from_args();
    let config = Config::load(&flags.config)?;
    let opts = config.consolidate_options();
    let mut timer = Timer::new("convert indoor maps");

    let doc = if let Some(path) = &flags.osm {
        let doc = reader::read(path, &mut timer)?;
        let (nodes, ways, relations) = doc.missing_references();
        if !nodes.is_empty() || !ways.is_empty() || !relations.is_empty() {
            warn!(
                "{} is incomplete: {} nodes, {} ways, {} relations referenced but absent",
                path,
                nodes.len(),
                ways.len(),
                relations.len()
            );
        }
        doc
    } else {
        let fetcher = Fetcher::new(&config.server_url, &config.cache_dir);
        let mut doc = reader::Document::empty();
        for area in &config.areas {
            doc.merge(fetcher.load_area(area, &mut timer)?);
        }
        fetcher.resolve_missing(&mut doc, &mut timer)?;
        doc
    };

    let mut buildings = extract::extract_buildings(&doc, &opts, &mut timer);
    for building in &mut buildings {
        building.run_all_consolidations(&opts, &mut timer);
    }
    export::write_osmchange(&buildings, &flags.output, &mut timer)?;
    timer.done();
    Ok(())
}
