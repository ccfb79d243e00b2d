use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter};
use std::path::Path;
use std::time::Instant;

use bzip2::read::MultiBzDecoder;
use log::info;

/// Simple timer for logging task duration.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Create a new Timer.
    pub fn new() -> Self {
        Timer {
            start: Instant::now(),
        }
    }

    /// Log the time since the timer was last reset against a task name, then
    /// reset the timer.
    pub fn finish(&mut self, task: &str) {
        info!("{} done in {} seconds", task, self.start.elapsed().as_secs());
        self.reset();
    }

    /// Reset the timer.
    pub fn reset(&mut self) {
        self.start = Instant::now();
    }
}

impl Default for Timer {
    fn default() -> Self {
        Timer::new()
    }
}

/// Create a bzip2 BufReader from a File handle. Dumps are usually written as
/// concatenated bzip2 streams, so all streams are decoded in sequence.
pub fn to_decode_buffer(file: File) -> BufReader<MultiBzDecoder<BufReader<File>>> {
    let buf = BufReader::with_capacity(8192 * 4, file);
    let dec = MultiBzDecoder::new(buf);
    BufReader::with_capacity(8192 * 16, dec)
}

/// Open a dump for reading, decompressing it if the path ends in `.bz2`.
pub fn open_dump<P: AsRef<Path>>(path: P) -> io::Result<Box<dyn BufRead + Send>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let is_bzip = path
        .extension()
        .map(|ext| ext == "bz2")
        .unwrap_or(false);
    if is_bzip {
        Ok(Box::new(to_decode_buffer(file)))
    } else {
        Ok(Box::new(BufReader::with_capacity(8192 * 16, file)))
    }
}

/// Try to create a new BufWriter with the given buffer size.
///
/// # Arguments
/// * `out_path` - Output path
/// * `buf_size` - Buffer size for BufWriter; zero selects the default
pub fn create_bufwriter<P: AsRef<Path>>(
    out_path: P,
    buf_size: usize,
) -> io::Result<BufWriter<File>> {
    let writer = File::create(out_path)?;
    let writer = if buf_size == 0 {
        BufWriter::new(writer)
    } else {
        BufWriter::with_capacity(buf_size, writer)
    };
    Ok(writer)
}
