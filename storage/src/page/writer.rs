use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use common::utils::create_bufwriter;
use common::WikiError;
use log::warn;

use super::record::PageRecord;

/// File name prefix of the per-worker title/id/redirect shards.
pub const TITLES_PREFIX: &str = "title_wid_redirect";
/// File name prefix of the per-worker anchor shards.
pub const ANCHORS_PREFIX: &str = "anchors";

static SHARD_BUF_SIZE: usize = 8192 * 128;

/// Path of the title shard written by a worker.
pub fn titles_shard_path<P: AsRef<Path>>(dir: P, worker: usize) -> PathBuf {
    dir.as_ref().join(format!("{}-{}.tsv", TITLES_PREFIX, worker))
}

/// Path of the anchor shard written by a worker.
pub fn anchors_shard_path<P: AsRef<Path>>(dir: P, worker: usize) -> PathBuf {
    dir.as_ref().join(format!("{}-{}.tsv", ANCHORS_PREFIX, worker))
}

/// What was written for a single page.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PageSummary {
    pub anchors: usize,
    /// Links dropped for carrying unresolved markup.
    pub rejected: usize,
    /// The page markup could not be scanned, so no anchors were written.
    pub unparsed: bool,
}

pub trait PageWriter {
    /// Write PageRecord data.
    fn write_page(&mut self, page: PageRecord) -> Result<PageSummary, WikiError>;

    /// Flush any buffered output.
    fn flush(&mut self) -> Result<(), WikiError>;
}

/// Refuse values that would break the TSV layout.
fn check_field<'a>(field: &'static str, value: &'a str) -> Result<&'a str, WikiError> {
    if value.contains(|c: char| c == '\t' || c == '\n') {
        return Err(WikiError::Separator {
            field,
            value: value.to_owned(),
        });
    }
    Ok(value)
}

/// Writes the title and anchor shards owned by a single worker.
pub struct ShardWriter<W: Write> {
    titles: W,
    anchors: W,
}

impl ShardWriter<BufWriter<File>> {
    /// Create (truncating) both shard files for a worker in `dir`.
    pub fn create<P: AsRef<Path>>(dir: P, worker: usize) -> io::Result<Self> {
        let titles = create_bufwriter(titles_shard_path(&dir, worker), SHARD_BUF_SIZE)?;
        let anchors = create_bufwriter(anchors_shard_path(&dir, worker), SHARD_BUF_SIZE)?;
        Ok(ShardWriter::new(titles, anchors))
    }
}

impl<W: Write> ShardWriter<W> {
    pub fn new(titles: W, anchors: W) -> Self {
        ShardWriter { titles, anchors }
    }

    pub fn into_inner(self) -> (W, W) {
        (self.titles, self.anchors)
    }
}

impl<W: Write> PageWriter for ShardWriter<W> {
    fn write_page(&mut self, page: PageRecord) -> Result<PageSummary, WikiError> {
        let title = check_field("title", &page.title)?;
        let redirect = check_field("redirect", page.redirect.as_deref().unwrap_or(""))?;
        writeln!(self.titles, "{}\t{}\t{}", title, page.id, redirect)?;

        let mut links = page.links();
        let parsed = links.by_ref().collect::<Result<Vec<_>, _>>();
        let mut summary = PageSummary {
            rejected: links.rejected(),
            ..PageSummary::default()
        };
        match parsed {
            Ok(parsed) => {
                for link in parsed {
                    let anchor = check_field("anchor", &link.anchor)?;
                    let target = check_field("link target", &link.target)?;
                    writeln!(self.anchors, "{}\t{}", anchor, target)?;
                    summary.anchors += 1;
                }
            }
            Err(err) => {
                warn!(
                    "Could not parse text for article: {} (wid {}), skipping: {}",
                    page.title, page.id, err
                );
                summary.unparsed = true;
            }
        }
        Ok(summary)
    }

    fn flush(&mut self) -> Result<(), WikiError> {
        self.titles.flush()?;
        self.anchors.flush()?;
        Ok(())
    }
}
