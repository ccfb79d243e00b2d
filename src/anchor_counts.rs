use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use common::title::{is_excluded, normalize};
use common::WikiError;
use fnv::FnvHashMap;
use log::{debug, info};
use storage::page::writer::ANCHORS_PREFIX;
use storage::tsv::{shard_paths, TsvRows};

use crate::redirect::Resolution;

/// Output file of the anchor frequency table.
pub const ANCHORS_OUTPUT: &str = "anchors.tsv";

/// How often each anchor text is used to link to each page.
#[derive(Clone, Debug, Default)]
pub struct AnchorCounts {
    counts: FnvHashMap<u64, FnvHashMap<String, u32>>,
}

impl AnchorCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, id: u64, anchor: &str) {
        let anchors = self.counts.entry(id).or_insert_with(FnvHashMap::default);
        match anchors.get_mut(anchor) {
            Some(count) => *count += 1,
            None => {
                anchors.insert(anchor.to_owned(), 1);
            }
        }
    }

    pub fn get(&self, id: u64, anchor: &str) -> u32 {
        self.counts
            .get(&id)
            .and_then(|anchors| anchors.get(anchor))
            .cloned()
            .unwrap_or(0)
    }

    /// Number of distinct pages linked to.
    pub fn pages(&self) -> usize {
        self.counts.len()
    }

    /// Number of distinct (page, anchor) pairs.
    pub fn len(&self) -> usize {
        self.counts.values().map(|anchors| anchors.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Write `anchor\tid\tfrequency` lines sorted by id, then anchor.
    pub fn write_tsv<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let mut ids = self.counts.keys().cloned().collect::<Vec<_>>();
        ids.sort();
        for id in ids {
            let mut anchors = self.counts[&id].iter().collect::<Vec<_>>();
            anchors.sort();
            for (anchor, freq) in anchors {
                writeln!(writer, "{}\t{}\t{}", anchor, id, freq)?;
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AnchorStats {
    pub lines: usize,
    pub counted: usize,
    pub empty_anchor: usize,
    /// Links to titles that are neither pages nor resolved aliases.
    pub broken: usize,
    /// Broken links into an excluded namespace.
    pub broken_excluded: usize,
}

/// Count `anchor, target` rows against the resolved titles.
pub fn count_anchor_rows<I, S>(
    rows: I,
    resolution: &Resolution,
    excluded: &[S],
    counts: &mut AnchorCounts,
    stats: &mut AnchorStats,
) -> Result<(), WikiError>
where
    I: Iterator<Item = Result<Vec<String>, WikiError>>,
    S: AsRef<str>,
{
    for row in rows {
        let row = row?;
        stats.lines += 1;
        let anchor = &row[0];
        if anchor.is_empty() {
            stats.empty_anchor += 1;
            continue;
        }
        let target = normalize(&row[1]);
        match resolution.lookup(&target) {
            Some(id) => {
                counts.add(id, anchor);
                stats.counted += 1;
            }
            None => {
                stats.broken += 1;
                if is_excluded(&target, excluded) {
                    stats.broken_excluded += 1;
                } else {
                    debug!("Broken link: {} -> {}", anchor, target);
                }
            }
        }
    }
    Ok(())
}

/// Count every anchor shard in `dir`.
pub fn aggregate_anchors<P, S>(
    dir: P,
    resolution: &Resolution,
    excluded: &[S],
) -> Result<(AnchorCounts, AnchorStats), WikiError>
where
    P: AsRef<Path>,
    S: AsRef<str>,
{
    let paths = shard_paths(&dir, ANCHORS_PREFIX)?;
    let mut counts = AnchorCounts::new();
    let mut stats = AnchorStats::default();
    let mut pbar = pbr::ProgressBar::new(paths.len() as u64);
    for path in &paths {
        count_anchor_rows(
            TsvRows::open(path, 2)?,
            resolution,
            excluded,
            &mut counts,
            &mut stats,
        )?;
        pbar.inc();
    }
    pbar.finish();
    info!(
        "Counted {} of {} links into {} anchors for {} pages, {} broken ({} excluded), {} empty",
        stats.counted,
        stats.lines,
        counts.len(),
        counts.pages(),
        stats.broken,
        stats.broken_excluded,
        stats.empty_anchor
    );
    Ok((counts, stats))
}

/// Write the anchor table to `dir`.
pub fn write_anchor_counts<P: AsRef<Path>>(counts: &AnchorCounts, dir: P) -> io::Result<()> {
    let path = dir.as_ref().join(ANCHORS_OUTPUT);
    let mut file = BufWriter::with_capacity(8192 * 1024, File::create(&path)?);
    counts.write_tsv(&mut file)?;
    file.flush()?;
    info!("Wrote {} anchors to {:?}", counts.len(), path);
    Ok(())
}
