pub mod anchor;
pub mod iter;
pub mod record;
pub mod writer;

pub use self::{
    anchor::{extract_links, Anchor, Link, Links, MarkupError},
    iter::{PageIterator, ReaderStats},
    record::PageRecord,
    writer::{PageSummary, PageWriter, ShardWriter},
};
