use super::anchor::{extract_links, Links};

/// One article or redirect page as read from the dump.
///
/// Records are moved from the reader to exactly one worker and dropped once
/// written.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PageRecord {
    pub title: String,
    pub id: u64,
    pub redirect: Option<String>,
    pub text: String,
}

impl PageRecord {
    pub fn new(title: String, id: u64, redirect: Option<String>, text: String) -> Self {
        PageRecord {
            title,
            id,
            redirect,
            text,
        }
    }

    /// Links found in the text of the page.
    pub fn links(&self) -> Links {
        extract_links(&self.text)
    }
}
