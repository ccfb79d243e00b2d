use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use common::WikiError;
use log::debug;

/// Iterator over the rows of a tab-separated file, checking that every row
/// has the expected number of columns.
#[derive(Debug)]
pub struct TsvRows<B> {
    buf: B,
    path: PathBuf,
    columns: usize,
    line: usize,
    done: bool,
}

impl<B: BufRead> TsvRows<B> {
    /// Read rows from a buffer; `path` is only used in error messages.
    pub fn from_buf<P: Into<PathBuf>>(buf: B, path: P, columns: usize) -> Self {
        TsvRows {
            buf,
            path: path.into(),
            columns,
            line: 0,
            done: false,
        }
    }

    fn read_row(&mut self) -> Result<Option<Vec<String>>, WikiError> {
        let mut line = String::new();
        if self.buf.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        self.line += 1;
        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }
        let row = line.split('\t').map(str::to_owned).collect::<Vec<_>>();
        if row.len() != self.columns {
            return Err(WikiError::MalformedLine {
                path: self.path.clone(),
                line: self.line,
                expected: self.columns,
                found: row.len(),
            });
        }
        Ok(Some(row))
    }
}

impl TsvRows<BufReader<File>> {
    /// Open a TSV file.
    pub fn open<P: AsRef<Path>>(path: P, columns: usize) -> Result<Self, WikiError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        Ok(TsvRows::from_buf(
            BufReader::with_capacity(8192 * 128, file),
            path,
            columns,
        ))
    }
}

impl<B: BufRead> Iterator for TsvRows<B> {
    type Item = Result<Vec<String>, WikiError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_row() {
            Ok(Some(row)) => Some(Ok(row)),
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

/// Find every shard `{prefix}-*.tsv` in a directory, sorted by path.
pub fn shard_paths<P: AsRef<Path>>(dir: P, prefix: &str) -> Result<Vec<PathBuf>, WikiError> {
    let pattern = dir.as_ref().join(format!("{}-*.tsv", prefix));
    let pattern = pattern.to_string_lossy();
    let entries = glob::glob(&pattern).map_err(|err| {
        WikiError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            err.to_string(),
        ))
    })?;
    let mut paths = vec![];
    for entry in entries {
        let path = entry.map_err(|err| WikiError::Io(err.into()))?;
        paths.push(path);
    }
    paths.sort();
    debug!("Found {} shards matching {}", paths.len(), pattern);
    Ok(paths)
}
