pub mod page;
pub mod tsv;

pub use self::page::{PageIterator, PageRecord, PageWriter, ReaderStats, ShardWriter};
