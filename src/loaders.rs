use std::path::Path;

use common::{error::parse_number, title::normalize, Settings, WikiError};
use fnv::FnvHashMap;
use log::{debug, info};
use storage::page::writer::{ANCHORS_PREFIX, TITLES_PREFIX};
use storage::tsv::{shard_paths, TsvRows};

use crate::pipeline::{extract_dump, ExtractStats, EXTRACT_COMPLETE};
use crate::redirect::RedirectEdge;

/// Contents of the title shards: canonical titles and raw redirect edges.
#[derive(Clone, Debug, Default)]
pub struct TitleShards {
    pub titles: FnvHashMap<String, u64>,
    pub redirects: Vec<RedirectEdge>,
    pub rows: usize,
    /// Non-redirect titles seen more than once; the last id wins.
    pub duplicates: usize,
}

impl TitleShards {
    /// Add one `title, id, redirect` row.
    pub fn add_row(&mut self, row: &[String]) -> Result<(), WikiError> {
        let title = normalize(&row[0]);
        let id = parse_number("id", &row[1])?;
        self.rows += 1;
        if row[2].is_empty() {
            if let Some(previous) = self.titles.insert(title, id) {
                debug!("Duplicate title {:?}: {} replaced by {}", row[0], previous, id);
                self.duplicates += 1;
            }
        } else {
            self.redirects.push(RedirectEdge::new(title, id, normalize(&row[2])));
        }
        Ok(())
    }
}

/// Load rows from one title shard.
pub fn load_title_rows<I>(rows: I, shards: &mut TitleShards) -> Result<(), WikiError>
where
    I: Iterator<Item = Result<Vec<String>, WikiError>>,
{
    for row in rows {
        shards.add_row(&row?)?;
    }
    Ok(())
}

/// Load every title shard in `dir`.
pub fn load_titles<P: AsRef<Path>>(dir: P) -> Result<TitleShards, WikiError> {
    let paths = shard_paths(&dir, TITLES_PREFIX)?;
    if paths.is_empty() {
        return Err(WikiError::Integrity(format!(
            "no title shards found in {:?}",
            dir.as_ref()
        )));
    }
    let mut shards = TitleShards::default();
    let mut pbar = pbr::ProgressBar::new(paths.len() as u64);
    for path in &paths {
        load_title_rows(TsvRows::open(path, 3)?, &mut shards)?;
        pbar.inc();
    }
    pbar.finish();
    info!(
        "Loaded {} titles and {} redirects from {} shards ({} duplicate titles)",
        shards.titles.len(),
        shards.redirects.len(),
        paths.len(),
        shards.duplicates
    );
    Ok(shards)
}

/// True if a completed extraction left both kinds of shard in `dir`.
pub fn shards_exist<P: AsRef<Path>>(dir: P) -> Result<bool, WikiError> {
    if !dir.as_ref().join(EXTRACT_COMPLETE).exists() {
        return Ok(false);
    }
    Ok(!shard_paths(&dir, TITLES_PREFIX)?.is_empty()
        && !shard_paths(&dir, ANCHORS_PREFIX)?.is_empty())
}

/// Run extraction unless shards from an earlier run can be reused.
pub fn extract_or_reuse_shards(settings: &Settings) -> Result<Option<ExtractStats>, WikiError> {
    let output = &settings.data.output;
    if !settings.extract.overwrite && shards_exist(output)? {
        info!("Reusing shards in {:?}", output);
        return Ok(None);
    }
    debug!("Extracting shards from {:?}", settings.data.dump);
    extract_dump(settings).map(Some)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::anchor_counts::{aggregate_anchors, write_anchor_counts, ANCHORS_OUTPUT};
    use crate::redirect::{resolve_redirects, REDIRECTS_OUTPUT, TITLES_OUTPUT};
    use std::fs;
    use tempfile::TempDir;

    fn page(title: &str, id: u64, redirect: Option<&str>, text: &str) -> String {
        let redirect = redirect
            .map(|r| format!("<redirect title=\"{}\" />", r))
            .unwrap_or_default();
        format!(
            "<page><title>{}</title><ns>0</ns><id>{}</id>{}\
             <revision><id>{}</id><text>{}</text></revision></page>",
            title,
            id,
            redirect,
            id + 100,
            text
        )
    }

    fn write_dump(path: &Path, pages: &[String]) {
        fs::write(path, format!("<mediawiki>{}</mediawiki>", pages.concat())).unwrap();
    }

    #[test]
    fn test_rows_split_into_titles_and_redirects() {
        let data = "Cat\t1\t\nkitty\t2\tcat\nhouse_cat\t3\tKitty\nCat\t4\t\n";
        let mut shards = TitleShards::default();
        load_title_rows(TsvRows::from_buf(data.as_bytes(), "mem", 3), &mut shards).unwrap();
        assert_eq!(shards.rows, 4);
        assert_eq!(shards.titles.len(), 1);
        assert_eq!(shards.titles["Cat"], 4);
        assert_eq!(shards.duplicates, 1);
        assert_eq!(
            shards.redirects,
            vec![
                RedirectEdge::new("Kitty", 2, "Cat"),
                RedirectEdge::new("House cat", 3, "Kitty"),
            ]
        );
    }

    #[test]
    fn test_bad_id_is_fatal() {
        let data = "Cat\tone\t\n";
        let mut shards = TitleShards::default();
        match load_title_rows(TsvRows::from_buf(data.as_bytes(), "mem", 3), &mut shards) {
            Err(WikiError::InvalidNumber { field, value }) => {
                assert_eq!(field, "id");
                assert_eq!(value, "one");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_load_titles_across_shards() {
        let tmp_dir = TempDir::new().unwrap();
        fs::write(tmp_dir.path().join("title_wid_redirect-0.tsv"), "A\t1\t\n").unwrap();
        fs::write(tmp_dir.path().join("title_wid_redirect-1.tsv"), "B\t2\tA\n").unwrap();
        fs::write(tmp_dir.path().join(EXTRACT_COMPLETE), "2\n").unwrap();
        assert!(!shards_exist(tmp_dir.path()).unwrap());
        fs::write(tmp_dir.path().join("anchors-0.tsv"), "").unwrap();
        assert!(shards_exist(tmp_dir.path()).unwrap());

        let shards = load_titles(tmp_dir.path()).unwrap();
        assert_eq!(shards.titles["A"], 1);
        assert_eq!(shards.redirects, vec![RedirectEdge::new("B", 2, "A")]);
    }

    #[test]
    fn test_shards_without_marker_are_not_reused() {
        let tmp_dir = TempDir::new().unwrap();
        fs::write(tmp_dir.path().join("title_wid_redirect-0.tsv"), "A\t1\t\n").unwrap();
        fs::write(tmp_dir.path().join("anchors-0.tsv"), "").unwrap();
        assert!(!shards_exist(tmp_dir.path()).unwrap());
    }

    #[test]
    fn test_failed_extraction_is_not_reused() {
        let tmp_dir = TempDir::new().unwrap();
        let dump_path = tmp_dir.path().join("dump.xml");
        let pages = (0..10)
            .map(|i| page(&format!("Page {}", i), i, None, "Some text."))
            .collect::<Vec<_>>();
        let mut broken = pages.clone();
        broken[5] = broken[5].replace("<id>5</id>", "<id>five</id>");

        let mut settings = Settings::for_dump(&dump_path);
        settings.data.output = tmp_dir.path().join("out");
        settings.extract.workers = 2;

        write_dump(&dump_path, &broken);
        assert!(extract_or_reuse_shards(&settings).is_err());
        assert!(!shards_exist(&settings.data.output).unwrap());

        write_dump(&dump_path, &pages);
        assert!(extract_or_reuse_shards(&settings).unwrap().is_some());
        assert_eq!(load_titles(&settings.data.output).unwrap().titles.len(), 10);
        assert!(extract_or_reuse_shards(&settings).unwrap().is_none());
    }

    #[test]
    fn test_dump_to_tables() {
        let tmp_dir = TempDir::new().unwrap();
        let dump_path = tmp_dir.path().join("dump.xml");
        write_dump(
            &dump_path,
            &[
                page("A", 1, None, "Felines like [[B|the cat]] and [[A#History|history]]."),
                page("B", 2, Some("A"), "#REDIRECT [[A]]"),
                page("C", 3, Some("B"), "#REDIRECT [[B]]"),
                page("D", 4, Some("Z"), "#REDIRECT [[Z]]"),
                page("E", 5, None, "See [[C]] and [[Nowhere]]."),
            ],
        );
        let output = tmp_dir.path().join("out");
        let mut settings = Settings::for_dump(&dump_path);
        settings.data.output = output.clone();
        settings.extract.workers = 3;

        let stats = extract_or_reuse_shards(&settings).unwrap().unwrap();
        assert_eq!(stats.pages_written(), 5);

        let shards = load_titles(&output).unwrap();
        assert_eq!(shards.rows, 5);
        let edges = shards.redirects.len();
        let excluded = &settings.resolve.excluded_prefixes;
        let resolution = resolve_redirects(shards.titles, shards.redirects, excluded);
        assert_eq!(resolution.aliases.len() + resolution.broken.len(), edges);
        assert_eq!(resolution.broken, vec![RedirectEdge::new("D", 4, "Z")]);
        resolution.write_to_dir(&output).unwrap();

        let (counts, anchor_stats) = aggregate_anchors(&output, &resolution, excluded).unwrap();
        assert_eq!(anchor_stats.counted, 4);
        assert_eq!(anchor_stats.broken, 2);
        write_anchor_counts(&counts, &output).unwrap();

        let read = |name: &str| fs::read_to_string(output.join(name)).unwrap();
        assert_eq!(read(TITLES_OUTPUT), "A\t1\nE\t5\n");
        assert_eq!(read(REDIRECTS_OUTPUT), "B\t2\t1\nC\t3\t1\n");
        assert_eq!(
            read(ANCHORS_OUTPUT),
            "A\t1\t1\nB\t1\t1\nC\t1\t1\nthe cat\t1\t1\n"
        );
    }

    #[test]
    fn test_missing_shards_is_an_error() {
        let tmp_dir = TempDir::new().unwrap();
        assert!(load_titles(tmp_dir.path()).is_err());
    }
}
