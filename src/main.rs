use std::error::Error;
use std::fs;

use log::{debug, info};

use common::{utils::Timer, Settings};
use wikialias::anchor_counts::{aggregate_anchors, write_anchor_counts};
use wikialias::loaders::{extract_or_reuse_shards, load_titles};
use wikialias::redirect::resolve_redirects;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let settings = Settings::new("config.toml")?;
    debug!("settings: {:#?}", settings);

    let output = &settings.data.output;
    fs::create_dir_all(output)?;
    let mut timer = Timer::new();

    if let Some(stats) = extract_or_reuse_shards(&settings)? {
        stats.log();
        timer.finish("Extraction");
    }

    let shards = load_titles(output)?;
    let excluded = &settings.resolve.excluded_prefixes;
    let resolution = resolve_redirects(shards.titles, shards.redirects, excluded);
    resolution.write_to_dir(output)?;
    timer.finish("Redirect resolution");

    if settings.anchors.enabled {
        let (counts, _) = aggregate_anchors(output, &resolution, excluded)?;
        write_anchor_counts(&counts, output)?;
        timer.finish("Anchor aggregation");
    } else {
        info!("Anchor aggregation disabled");
    }
    Ok(())
}
