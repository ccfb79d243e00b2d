use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;

/// Deepest nesting of `[[` accepted before an article is considered
/// unparseable.
pub const MAX_DEPTH: usize = 40;

/// Characters that mark a link target or anchor as unresolved markup.
const STRUCTURAL: &[char] = &['|', '[', ']', '{', '}', '#'];

lazy_static! {
    static ref EMPHASIS: Regex = Regex::new("''+").unwrap();
    static ref LINE_BREAK: Regex = Regex::new(r"(?i)<\s*br\s*/?>").unwrap();
    static ref INLINE_TAG: Regex = Regex::new("<[^>]*>").unwrap();
}

/// Wikipedia anchor, representing a link between pages, optionally with a
/// surface realisation.
#[derive(Clone, Debug, PartialEq)]
pub enum Anchor {
    Direct(String),
    Label { surface: String, page: String },
}

impl Anchor {
    /// Parse the inside of a `[[...]]` construct, returning an Anchor.
    ///
    /// We consider two forms:
    /// - [[abc]] is seen as "abc" in text and links to page "abc".
    /// - [[a|b]] is labelled "b" but links to page "a".
    pub fn parse(anchor: &str) -> Self {
        match anchor.find('|') {
            Some(index) => {
                let page = anchor[..index].trim().to_owned();
                let surface = anchor[index + 1..].trim();
                if surface.is_empty() {
                    Anchor::Direct(page)
                } else {
                    Anchor::Label {
                        page,
                        surface: surface.to_owned(),
                    }
                }
            }
            None => Anchor::Direct(anchor.trim().to_owned()),
        }
    }

    /// Clean the surface text and convert to a Link, or `None` if either side
    /// is empty or still carries structural markup.
    pub fn into_link(self) -> Option<Link> {
        let (target, anchor) = match self {
            Anchor::Direct(page) => (page.clone(), page),
            Anchor::Label { surface, page } => {
                let surface = clean_anchor(&surface);
                if surface.is_empty() {
                    (page.clone(), page)
                } else {
                    (page, surface)
                }
            }
        };
        if target.is_empty() || anchor.is_empty() {
            return None;
        }
        if target.contains(STRUCTURAL) || anchor.contains(STRUCTURAL) {
            return None;
        }
        Some(Link { target, anchor })
    }
}

/// A resolved link: the page it points at and the text it is shown as.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Link {
    pub target: String,
    pub anchor: String,
}

/// Strip emphasis, line breaks, inline tags and the few entities that show up
/// in link labels.
pub fn clean_anchor(anchor: &str) -> String {
    let anchor = EMPHASIS.replace_all(anchor.trim(), "");
    let anchor = LINE_BREAK.replace_all(&anchor, " ");
    let anchor = INLINE_TAG.replace_all(&anchor, "");
    anchor
        .replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .trim()
        .to_owned()
}

/// Article markup that could not be scanned for links.
#[derive(Clone, Debug, PartialEq)]
pub enum MarkupError {
    TooDeep { offset: usize },
}

impl std::error::Error for MarkupError {}

impl fmt::Display for MarkupError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MarkupError::TooDeep { offset } => write!(
                f,
                "links nested deeper than {} at byte {}",
                MAX_DEPTH, offset
            ),
        }
    }
}

/// Lazy iterator over the links of an article, innermost links first.
///
/// Links that do not survive cleanup are skipped and counted; a nesting error
/// is yielded once and ends the iteration.
pub struct Links<'a> {
    text: &'a str,
    pos: usize,
    open: Vec<usize>,
    rejected: usize,
}

impl<'a> Links<'a> {
    pub fn new(text: &'a str) -> Self {
        Links {
            text,
            pos: 0,
            open: vec![],
            rejected: 0,
        }
    }

    /// Number of links dropped so far for containing structural markup.
    pub fn rejected(&self) -> usize {
        self.rejected
    }
}

impl<'a> Iterator for Links<'a> {
    type Item = Result<Link, MarkupError>;

    fn next(&mut self) -> Option<Self::Item> {
        let bytes = self.text.as_bytes();
        while self.pos + 1 < bytes.len() {
            let i = self.pos;
            match (bytes[i], bytes[i + 1]) {
                (b'[', b'[') => {
                    self.pos = i + 2;
                    self.open.push(self.pos);
                    if self.open.len() > MAX_DEPTH {
                        self.pos = bytes.len();
                        return Some(Err(MarkupError::TooDeep { offset: i }));
                    }
                }
                (b']', b']') => {
                    self.pos = i + 2;
                    if let Some(begin) = self.open.pop() {
                        match Anchor::parse(&self.text[begin..i]).into_link() {
                            Some(link) => return Some(Ok(link)),
                            None => self.rejected += 1,
                        }
                    }
                }
                _ => self.pos += 1,
            }
        }
        None
    }
}

/// Extract links from the text of a Wikipedia page.
pub fn extract_links(page: &str) -> Links {
    Links::new(page)
}
