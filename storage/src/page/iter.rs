use std::fmt;
use std::io::BufRead;

use common::error::parse_number;
use common::title::{collapse_whitespace, is_redirect_text};
use common::WikiError;
use log::{info, trace, warn};
use quick_xml::{
    self as qx,
    events::{BytesStart, Event},
};

use super::record::PageRecord;

/// Tally of every `<page>` seen by a PageIterator. Each page is counted in
/// exactly one of the `emitted` or `skipped_*` fields.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ReaderStats {
    pub pages: usize,
    pub emitted: usize,
    /// Pages outside the article namespace, or without a namespace.
    pub skipped_namespace: usize,
    /// Pages whose text is a redirect but which carry no redirect target.
    pub skipped_redirect_stub: usize,
    /// Pages with an empty title or text.
    pub skipped_empty: usize,
    /// Total bytes of emitted page text.
    pub text_bytes: usize,
}

/// Fields of the page currently being read.
#[derive(Debug, Default)]
struct PageState {
    title: Option<String>,
    id: Option<u64>,
    ns: Option<i64>,
    redirect: Option<String>,
    text: Option<String>,
}

/// Streaming iterator yielding a PageRecord for each article or redirect in a
/// dump. Only the page currently being read is held in memory.
///
/// Iteration stops after the first error.
pub struct PageIterator<R: BufRead> {
    reader: qx::Reader<R>,
    buf: Vec<u8>,
    text_buf: Vec<u8>,
    page: Option<PageState>,
    marker: String,
    log_every: usize,
    stats: ReaderStats,
    done: bool,
}

/// Capture the target of a `<redirect title="..."/>` tag.
fn redirect_target<B: BufRead>(tag: &BytesStart, reader: &qx::Reader<B>) -> Option<String> {
    tag.attributes()
        .filter_map(|attr| attr.ok())
        .find(|attr| attr.key == b"title")
        .and_then(|attr| attr.unescape_and_decode_value(reader).ok())
        .map(|title| title.trim().to_owned())
        .filter(|title| !title.is_empty())
}

impl<R: BufRead> PageIterator<R> {
    /// Create a new iterator from an XML source.
    pub fn new(xml_stream: R) -> Self {
        PageIterator {
            reader: qx::Reader::from_reader(xml_stream),
            buf: vec![],
            text_buf: vec![],
            page: None,
            marker: "#redirect".to_owned(),
            log_every: 100_000,
            stats: ReaderStats::default(),
            done: false,
        }
    }

    /// Use a different redirect marker, compared case-insensitively.
    pub fn with_marker(self, marker: &str) -> Self {
        PageIterator {
            marker: marker.to_owned(),
            ..self
        }
    }

    /// Log progress every `log_every` emitted pages; zero disables logging.
    pub fn with_log_every(self, log_every: usize) -> Self {
        PageIterator { log_every, ..self }
    }

    pub fn stats(&self) -> ReaderStats {
        self.stats
    }

    fn xml_error<E: fmt::Display>(&self, err: E) -> WikiError {
        WikiError::Xml {
            position: self.reader.buffer_position(),
            message: err.to_string(),
        }
    }

    /// Read the text content of the current element, normalising whitespace.
    fn read_text(&mut self, tag: &[u8]) -> Result<String, WikiError> {
        let text = match self.reader.read_text(tag, &mut self.text_buf) {
            Ok(text) => text,
            Err(err) => return Err(self.xml_error(err)),
        };
        self.text_buf.clear();
        Ok(collapse_whitespace(&text))
    }

    fn extract_title(&mut self) -> Result<(), WikiError> {
        let title = self.read_text(b"title")?;
        if let Some(page) = self.page.as_mut() {
            page.title = Some(title);
        }
        Ok(())
    }

    /// Only the first id of a page is its own; later ones belong to
    /// revisions and contributors.
    fn extract_id(&mut self) -> Result<(), WikiError> {
        let id = self.read_text(b"id")?;
        if let Some(page) = self.page.as_mut() {
            page.id = Some(parse_number("id", &id)?);
        }
        Ok(())
    }

    fn extract_ns(&mut self) -> Result<(), WikiError> {
        let ns = self.read_text(b"ns")?;
        if let Some(page) = self.page.as_mut() {
            page.ns = Some(parse_number("ns", &ns)?);
        }
        Ok(())
    }

    fn extract_text(&mut self) -> Result<(), WikiError> {
        let text = self.read_text(b"text")?;
        if let Some(page) = self.page.as_mut() {
            page.text = Some(text);
        }
        Ok(())
    }

    fn wants_id(&self) -> bool {
        self.page.as_ref().map(|page| page.id.is_none()).unwrap_or(false)
    }

    /// Decide whether a completed page becomes a record.
    fn finish_page(&mut self, page: PageState) -> Result<Option<PageRecord>, WikiError> {
        self.stats.pages += 1;
        let title = page.title.unwrap_or_default();
        let id = match page.id {
            Some(id) => id,
            None => return Err(WikiError::MissingId { title }),
        };
        if page.ns != Some(0) {
            trace!("Skipping {} (ns {:?})", title, page.ns);
            self.stats.skipped_namespace += 1;
            return Ok(None);
        }
        let text = page.text.unwrap_or_default();
        let is_redirect = is_redirect_text(&text, &self.marker);
        if is_redirect && page.redirect.is_none() {
            warn!("Skipping redirect without target: {} (wid {})", title, id);
            self.stats.skipped_redirect_stub += 1;
            return Ok(None);
        }
        if title.is_empty() || text.is_empty() {
            self.stats.skipped_empty += 1;
            return Ok(None);
        }
        if page.redirect.is_some() && !is_redirect {
            return Err(WikiError::RedirectMismatch { title });
        }

        self.stats.emitted += 1;
        self.stats.text_bytes += text.len();
        if self.log_every > 0 && self.stats.emitted % self.log_every == 0 {
            info!(
                "Reader - read bytes:{} pages:{} emitted:{}",
                self.stats.text_bytes, self.stats.pages, self.stats.emitted
            );
        }
        Ok(Some(PageRecord::new(title, id, page.redirect, text)))
    }

    fn read_page(&mut self) -> Result<Option<PageRecord>, WikiError> {
        enum Tag {
            Page,
            PageEnd,
            Id,
            Ns,
            Text,
            Title,
            Redirect(Option<String>),
            Eof,
            Error(String),
            None,
        }
        loop {
            let action = {
                match self.reader.read_event(&mut self.buf) {
                    Ok(Event::Start(ref tag)) => match tag.name() {
                        b"page" => Tag::Page,
                        b"title" => Tag::Title,
                        b"id" => Tag::Id,
                        b"ns" => Tag::Ns,
                        b"text" => Tag::Text,
                        b"redirect" => Tag::Redirect(redirect_target(tag, &self.reader)),
                        _ => Tag::None,
                    },
                    Ok(Event::Empty(ref tag)) => match tag.name() {
                        b"redirect" => Tag::Redirect(redirect_target(tag, &self.reader)),
                        _ => Tag::None,
                    },
                    Ok(Event::End(ref tag)) => match tag.name() {
                        b"page" => Tag::PageEnd,
                        _ => Tag::None,
                    },
                    Ok(Event::Eof) => Tag::Eof,
                    Ok(_) => Tag::None,
                    Err(err) => Tag::Error(err.to_string()),
                }
            };
            self.buf.clear();
            let in_page = self.page.is_some();
            match action {
                Tag::Page => self.page = Some(PageState::default()),
                Tag::Title if in_page => self.extract_title()?,
                Tag::Id if self.wants_id() => self.extract_id()?,
                Tag::Ns if in_page => self.extract_ns()?,
                Tag::Text if in_page => self.extract_text()?,
                Tag::Redirect(target) => {
                    if let Some(page) = self.page.as_mut() {
                        page.redirect = target;
                    }
                }
                Tag::PageEnd => {
                    if let Some(page) = self.page.take() {
                        if let Some(record) = self.finish_page(page)? {
                            return Ok(Some(record));
                        }
                    }
                }
                Tag::Eof => {
                    if self.page.is_some() {
                        return Err(self.xml_error("unexpected end of stream inside <page>"));
                    }
                    return Ok(None);
                }
                Tag::Error(message) => return Err(self.xml_error(message)),
                _ => (),
            }
        }
    }
}

impl<R: BufRead> Iterator for PageIterator<R> {
    type Item = Result<PageRecord, WikiError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_page() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}
