use std::fs;
use std::io::BufRead;
use std::path::Path;
use std::thread;

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use log::{debug, error, info};

use common::{utils::open_dump, Settings, WikiError};
use storage::page::writer::{ANCHORS_PREFIX, TITLES_PREFIX};
use storage::tsv::shard_paths;
use storage::{PageIterator, PageRecord, PageWriter, ReaderStats, ShardWriter};

/// Message passed from the dump reader to the workers.
#[derive(Debug)]
pub enum Message {
    Page(PageRecord),
    /// No further pages will be sent. Each worker passes it on before exiting.
    Done,
}

/// Work done by one worker.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct WorkerStats {
    pub worker: usize,
    /// Pages taken off the queue, whether or not they were written.
    pub dequeued: usize,
    pub pages: usize,
    pub anchors: usize,
    pub rejected: usize,
    pub unparsed: usize,
}

/// Combined reader and worker statistics for one extraction run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExtractStats {
    pub reader: ReaderStats,
    pub workers: Vec<WorkerStats>,
}

impl ExtractStats {
    pub fn pages_written(&self) -> usize {
        self.workers.iter().map(|w| w.pages).sum()
    }

    pub fn anchors_written(&self) -> usize {
        self.workers.iter().map(|w| w.anchors).sum()
    }

    /// Log a summary of the run.
    pub fn log(&self) {
        let reader = &self.reader;
        info!(
            "Read {} pages: {} emitted, {} outside ns 0, {} redirects without target, {} empty",
            reader.pages,
            reader.emitted,
            reader.skipped_namespace,
            reader.skipped_redirect_stub,
            reader.skipped_empty
        );
        for w in &self.workers {
            debug!(
                "Parser-{} pages:{} anchors:{} rejected links:{} unparsed:{}",
                w.worker, w.pages, w.anchors, w.rejected, w.unparsed
            );
        }
        info!(
            "Wrote {} pages and {} anchors with {} workers",
            self.pages_written(),
            self.anchors_written(),
            self.workers.len()
        );
    }
}

/// Number of workers to run; zero means one per CPU.
pub fn worker_count(configured: usize) -> usize {
    if configured == 0 {
        num_cpus::get()
    } else {
        configured
    }
}

/// Publishes the termination message when dropped, so workers are released
/// even if reading stops early.
struct DoneGuard<'a>(&'a Sender<Message>);

impl<'a> Drop for DoneGuard<'a> {
    fn drop(&mut self) {
        if self.0.send(Message::Done).is_err() {
            error!("Reader - could not publish termination message");
        }
    }
}

/// Publish every page onto the queue, blocking while it is full, then
/// publish a single `Done`. Returns the number of pages published.
pub fn publish_pages<I>(pages: I, queue: &Sender<Message>) -> Result<usize, WikiError>
where
    I: Iterator<Item = Result<PageRecord, WikiError>>,
{
    let _done = DoneGuard(queue);
    let mut sent = 0;
    for page in pages {
        let page = page?;
        queue
            .send(Message::Page(page))
            .map_err(|_| WikiError::Integrity("queue closed while reading".to_owned()))?;
        sent += 1;
    }
    Ok(sent)
}

/// Pull pages off the queue and write them until `Done` arrives, then pass
/// `Done` on for the next worker.
///
/// A worker whose writer fails keeps draining the queue without writing, so
/// the reader and the other workers can still finish.
pub fn run_worker<W: PageWriter>(
    worker: usize,
    mut writer: W,
    queue: &Receiver<Message>,
    requeue: &Sender<Message>,
) -> Result<WorkerStats, WikiError> {
    let mut stats = WorkerStats {
        worker,
        ..WorkerStats::default()
    };
    let mut failure = None;
    loop {
        match queue.recv() {
            Ok(Message::Page(page)) => {
                stats.dequeued += 1;
                if failure.is_some() {
                    continue;
                }
                let title = page.title.clone();
                match writer.write_page(page) {
                    Ok(summary) => {
                        stats.pages += 1;
                        stats.anchors += summary.anchors;
                        stats.rejected += summary.rejected;
                        if summary.unparsed {
                            stats.unparsed += 1;
                        }
                    }
                    Err(err) => {
                        error!("Parser-{} failed on {}: {}", worker, title, err);
                        failure = Some(err);
                    }
                }
                if stats.pages % 10_000 == 0 && stats.pages > 0 {
                    info!(
                        "Parser-{} written pages:{} queue size:{}",
                        worker,
                        stats.pages,
                        queue.len()
                    );
                }
            }
            Ok(Message::Done) => {
                requeue.send(Message::Done).map_err(|_| {
                    WikiError::Integrity(format!("worker {} could not pass on termination", worker))
                })?;
                break;
            }
            Err(_) => {
                return Err(WikiError::Integrity(format!(
                    "worker {}: queue disconnected before termination",
                    worker
                )))
            }
        }
    }
    if failure.is_none() {
        failure = writer.flush().err();
    }
    info!("Parser-{} written pages:{} (done)", worker, stats.pages);
    match failure {
        Some(err) => Err(err),
        None => Ok(stats),
    }
}

/// After every worker has exited exactly one `Done` must remain, and nothing
/// else.
fn check_queue(queue: &Receiver<Message>) -> Result<(), WikiError> {
    match queue.try_recv() {
        Ok(Message::Done) => (),
        Ok(Message::Page(page)) => {
            return Err(WikiError::Integrity(format!(
                "page {:?} left in queue after shutdown",
                page.title
            )))
        }
        Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {
            return Err(WikiError::Integrity(
                "termination message missing after shutdown".to_owned(),
            ))
        }
    }
    if !queue.is_empty() {
        return Err(WikiError::Integrity(format!(
            "{} messages left in queue after shutdown",
            queue.len()
        )));
    }
    Ok(())
}

/// Stream pages from a dump reader through a bounded queue to one thread per
/// writer.
pub fn run_pipeline<R, W>(
    pages: PageIterator<R>,
    writers: Vec<W>,
    capacity: usize,
) -> Result<ExtractStats, WikiError>
where
    R: BufRead + Send,
    W: PageWriter + Send,
{
    if writers.is_empty() {
        return Err(WikiError::Integrity("no workers to write pages".to_owned()));
    }
    let (sender, receiver) = bounded(capacity.max(1));

    let (reader_result, worker_results) = thread::scope(|scope| {
        let reader = {
            let sender = sender.clone();
            scope.spawn(move || {
                let mut pages = pages;
                let published = publish_pages(pages.by_ref(), &sender);
                (published, pages.stats())
            })
        };
        let workers = writers
            .into_iter()
            .enumerate()
            .map(|(worker, writer)| {
                let queue = receiver.clone();
                let requeue = sender.clone();
                scope.spawn(move || run_worker(worker, writer, &queue, &requeue))
            })
            .collect::<Vec<_>>();

        let reader_result = reader.join();
        let worker_results = workers
            .into_iter()
            .enumerate()
            .map(|(worker, handle)| {
                handle.join().unwrap_or_else(|_| {
                    Err(WikiError::Integrity(format!("worker {} panicked", worker)))
                })
            })
            .collect::<Vec<_>>();
        (reader_result, worker_results)
    });

    check_queue(&receiver)?;

    let (published, reader_stats) = reader_result
        .map_err(|_| WikiError::Integrity("reader panicked".to_owned()))?;
    let published = published?;

    let mut stats = ExtractStats {
        reader: reader_stats,
        workers: vec![],
    };
    for result in worker_results {
        stats.workers.push(result?);
    }

    let dequeued: usize = stats.workers.iter().map(|w| w.dequeued).sum();
    if dequeued != published {
        return Err(WikiError::Integrity(format!(
            "{} pages published but {} dequeued",
            published, dequeued
        )));
    }
    Ok(stats)
}

/// Written into the output directory once every shard has been flushed.
pub const EXTRACT_COMPLETE: &str = ".extract_complete";

/// Delete shard files left by a previous run.
pub fn remove_shards(dir: &Path) -> Result<(), WikiError> {
    for prefix in &[TITLES_PREFIX, ANCHORS_PREFIX] {
        for path in shard_paths(dir, prefix)? {
            debug!("Removing stale shard {:?}", path);
            fs::remove_file(path)?;
        }
    }
    Ok(())
}

/// Extract title, redirect and anchor shards from the configured dump.
///
/// The completion marker is only written after a clean run. Shards from a
/// failed run are deleted.
pub fn extract_dump(settings: &Settings) -> Result<ExtractStats, WikiError> {
    let output = &settings.data.output;
    fs::create_dir_all(output)?;
    let marker = output.join(EXTRACT_COMPLETE);
    if marker.exists() {
        fs::remove_file(&marker)?;
    }
    remove_shards(output)?;

    match extract_shards(settings, output) {
        Ok(stats) => {
            fs::write(&marker, format!("{}\n", stats.pages_written()))?;
            Ok(stats)
        }
        Err(err) => {
            error!("Extraction failed, removing shards in {:?}: {}", output, err);
            remove_shards(output)?;
            Err(err)
        }
    }
}

fn extract_shards(settings: &Settings, output: &Path) -> Result<ExtractStats, WikiError> {
    let workers = worker_count(settings.extract.workers);
    let writers = (0..workers)
        .map(|worker| ShardWriter::create(output, worker))
        .collect::<Result<Vec<_>, _>>()?;

    info!(
        "Extracting {:?} into {:?} with {} workers",
        settings.data.dump, output, workers
    );
    let source = open_dump(&settings.data.dump)?;
    let pages = PageIterator::new(source)
        .with_marker(&settings.extract.redirect_marker)
        .with_log_every(settings.extract.log_every);
    run_pipeline(pages, writers, settings.extract.queue_capacity)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::{Arc, Mutex};
    use storage::page::PageSummary;
    use tempfile::TempDir;

    /// Records the titles it is asked to write.
    struct CollectingWriter {
        titles: Arc<Mutex<Vec<String>>>,
        fail_on: Option<String>,
    }

    impl PageWriter for CollectingWriter {
        fn write_page(&mut self, page: PageRecord) -> Result<PageSummary, WikiError> {
            if self.fail_on.as_ref() == Some(&page.title) {
                return Err(WikiError::Separator {
                    field: "title",
                    value: page.title,
                });
            }
            self.titles.lock().unwrap().push(page.title);
            Ok(PageSummary::default())
        }

        fn flush(&mut self) -> Result<(), WikiError> {
            Ok(())
        }
    }

    fn collecting(
        n: usize,
        fail_on: Option<&str>,
    ) -> (Vec<CollectingWriter>, Arc<Mutex<Vec<String>>>) {
        let titles = Arc::new(Mutex::new(vec![]));
        let writers = (0..n)
            .map(|_| CollectingWriter {
                titles: titles.clone(),
                fail_on: fail_on.map(str::to_owned),
            })
            .collect();
        (writers, titles)
    }

    fn dump(n: usize) -> String {
        let pages = (0..n)
            .map(|i| {
                format!(
                    "<page><title>Page {}</title><ns>0</ns><id>{}</id>\
                     <revision><id>9{}</id><text>See [[Page {}]].</text></revision></page>",
                    i,
                    i,
                    i,
                    i + 1
                )
            })
            .collect::<String>();
        format!("<mediawiki>{}</mediawiki>", pages)
    }

    #[test]
    fn test_worker_passes_done_on() {
        let (sender, receiver) = bounded(4);
        sender
            .send(Message::Page(PageRecord::new("A".into(), 1, None, "x".into())))
            .unwrap();
        sender.send(Message::Done).unwrap();
        let (mut writers, titles) = collecting(1, None);
        let stats = run_worker(0, writers.remove(0), &receiver, &sender).unwrap();
        assert_eq!(stats.pages, 1);
        assert_eq!(stats.dequeued, 1);
        assert_eq!(*titles.lock().unwrap(), vec!["A".to_owned()]);
        assert!(matches!(receiver.try_recv(), Ok(Message::Done)));
        assert!(receiver.is_empty());
    }

    #[test]
    fn test_every_page_written_once() {
        let xml = dump(500);
        for &workers in &[1, 3, 8] {
            let (writers, titles) = collecting(workers, None);
            let stats = run_pipeline(PageIterator::new(xml.as_bytes()), writers, 4).unwrap();
            assert_eq!(stats.reader.emitted, 500);
            assert_eq!(stats.pages_written(), 500);
            assert_eq!(stats.workers.len(), workers);
            let mut titles = titles.lock().unwrap().clone();
            titles.sort();
            titles.dedup();
            assert_eq!(titles.len(), 500);
        }
    }

    #[test]
    fn test_reader_error_still_shuts_down_workers() {
        let xml = dump(10).replace("<id>5</id>", "<id>five</id>");
        let (writers, titles) = collecting(3, None);
        match run_pipeline(PageIterator::new(xml.as_bytes()), writers, 2) {
            Err(WikiError::InvalidNumber { field, .. }) => assert_eq!(field, "id"),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(titles.lock().unwrap().len(), 5);
    }

    #[test]
    fn test_failing_worker_does_not_deadlock() {
        let xml = dump(200);
        let (writers, titles) = collecting(2, Some("Page 3"));
        match run_pipeline(PageIterator::new(xml.as_bytes()), writers, 1) {
            Err(WikiError::Separator { value, .. }) => assert_eq!(value, "Page 3"),
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(titles.lock().unwrap().len() < 200);
    }

    #[test]
    fn test_no_workers_is_an_error() {
        let xml = dump(1);
        let writers: Vec<CollectingWriter> = vec![];
        assert!(run_pipeline(PageIterator::new(xml.as_bytes()), writers, 1).is_err());
    }

    #[test]
    fn test_extract_dump_writes_shards() {
        let tmp_dir = TempDir::new().unwrap();
        let dump_path = tmp_dir.path().join("dump.xml");
        fs::write(&dump_path, dump(20)).unwrap();
        let output = tmp_dir.path().join("out");
        fs::create_dir_all(&output).unwrap();
        // stale shard from an earlier run with more workers
        fs::write(output.join("anchors-7.tsv"), "old\tOld\n").unwrap();

        let mut settings = Settings::for_dump(&dump_path);
        settings.data.output = output.clone();
        settings.extract.workers = 2;
        let stats = extract_dump(&settings).unwrap();
        assert_eq!(stats.pages_written(), 20);
        assert_eq!(stats.anchors_written(), 20);

        assert_eq!(shard_paths(&output, TITLES_PREFIX).unwrap().len(), 2);
        let anchors = shard_paths(&output, ANCHORS_PREFIX).unwrap();
        assert_eq!(anchors.len(), 2);
        let lines: usize = anchors
            .iter()
            .map(|path| fs::read_to_string(path).unwrap().lines().count())
            .sum();
        assert_eq!(lines, 20);
        assert!(output.join(EXTRACT_COMPLETE).exists());
    }

    #[test]
    fn test_failed_extraction_leaves_no_shards() {
        let tmp_dir = TempDir::new().unwrap();
        let dump_path = tmp_dir.path().join("dump.xml");
        let output = tmp_dir.path().join("out");

        let mut settings = Settings::for_dump(&dump_path);
        settings.data.output = output.clone();
        settings.extract.workers = 2;
        fs::write(&dump_path, dump(10)).unwrap();
        extract_dump(&settings).unwrap();

        fs::write(&dump_path, dump(10).replace("<id>5</id>", "<id>five</id>")).unwrap();
        assert!(extract_dump(&settings).is_err());
        assert!(!output.join(EXTRACT_COMPLETE).exists());
        assert!(shard_paths(&output, TITLES_PREFIX).unwrap().is_empty());
        assert!(shard_paths(&output, ANCHORS_PREFIX).unwrap().is_empty());
    }
}
