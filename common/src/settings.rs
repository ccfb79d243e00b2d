use config::{Config, ConfigError, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::title::EXCLUDED_PREFIXES;

fn default_output_path() -> PathBuf {
    "data".into()
}

/// Configuration for the dump and the directory receiving all outputs.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Data {
    pub dump: PathBuf,
    #[serde(default = "default_output_path")]
    pub output: PathBuf,
}

fn default_queue_capacity() -> usize {
    100
}

fn default_redirect_marker() -> String {
    "#redirect".to_owned()
}

fn default_log_every() -> usize {
    100_000
}

/// Configuration for the streaming extraction stage.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Extract {
    /// Number of worker threads; zero uses one per available CPU.
    #[serde(default)]
    pub workers: usize,
    /// Capacity of the queue between the dump reader and the workers.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_redirect_marker")]
    pub redirect_marker: String,
    /// Log reader progress every this many pages.
    #[serde(default = "default_log_every")]
    pub log_every: usize,
    /// Re-run extraction even when shard files are already present.
    #[serde(default)]
    pub overwrite: bool,
}

impl Default for Extract {
    fn default() -> Self {
        Extract {
            workers: 0,
            queue_capacity: default_queue_capacity(),
            redirect_marker: default_redirect_marker(),
            log_every: default_log_every(),
            overwrite: false,
        }
    }
}

fn default_excluded_prefixes() -> Vec<String> {
    EXCLUDED_PREFIXES.iter().map(|p| (*p).to_owned()).collect()
}

/// Configuration for redirect resolution.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Resolve {
    #[serde(default = "default_excluded_prefixes")]
    pub excluded_prefixes: Vec<String>,
}

impl Default for Resolve {
    fn default() -> Self {
        Resolve {
            excluded_prefixes: default_excluded_prefixes(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Configuration for anchor aggregation.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Anchors {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for Anchors {
    fn default() -> Self {
        Anchors { enabled: true }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Settings {
    pub data: Data,
    #[serde(default)]
    pub extract: Extract,
    #[serde(default)]
    pub resolve: Resolve,
    #[serde(default)]
    pub anchors: Anchors,
}

impl Settings {
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        let mut settings = Config::new();
        settings.merge(File::with_name(path))?;
        settings.try_into()
    }

    /// Settings for a dump with every other option at its default.
    pub fn for_dump<P: AsRef<Path>>(dump: P) -> Self {
        Settings {
            data: Data {
                dump: dump.as_ref().to_path_buf(),
                output: default_output_path(),
            },
            extract: Extract::default(),
            resolve: Resolve::default(),
            anchors: Anchors::default(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_settings_defaults() {
        let tmp_dir = TempDir::new().unwrap();
        let path = tmp_dir.path().join("config.toml");
        {
            let mut file = std::fs::File::create(&path).unwrap();
            writeln!(file, "[data]\ndump = \"enwiki.xml.bz2\"").unwrap();
        }
        let settings = Settings::new(path.to_str().unwrap()).unwrap();
        assert_eq!(settings.data.dump, PathBuf::from("enwiki.xml.bz2"));
        assert_eq!(settings.data.output, PathBuf::from("data"));
        assert_eq!(settings.extract.workers, 0);
        assert_eq!(settings.extract.queue_capacity, 100);
        assert_eq!(settings.extract.redirect_marker, "#redirect");
        assert!(settings.anchors.enabled);
        assert_eq!(settings.resolve.excluded_prefixes.len(), EXCLUDED_PREFIXES.len());
    }

    #[test]
    fn test_settings_overrides() {
        let tmp_dir = TempDir::new().unwrap();
        let path = tmp_dir.path().join("config.toml");
        {
            let mut file = std::fs::File::create(&path).unwrap();
            writeln!(
                file,
                "[data]\ndump = \"d.xml\"\noutput = \"out\"\n\
                 [extract]\nworkers = 3\nqueue_capacity = 8\n\
                 [resolve]\nexcluded_prefixes = [\"Talk:\"]\n\
                 [anchors]\nenabled = false"
            )
            .unwrap();
        }
        let settings = Settings::new(path.to_str().unwrap()).unwrap();
        assert_eq!(settings.data.output, PathBuf::from("out"));
        assert_eq!(settings.extract.workers, 3);
        assert_eq!(settings.extract.queue_capacity, 8);
        assert_eq!(settings.resolve.excluded_prefixes, vec!["Talk:".to_owned()]);
        assert!(!settings.anchors.enabled);
    }

    #[test]
    fn test_settings_require_dump() {
        let tmp_dir = TempDir::new().unwrap();
        let path = tmp_dir.path().join("config.toml");
        {
            let mut file = std::fs::File::create(&path).unwrap();
            writeln!(file, "[extract]\nworkers = 2").unwrap();
        }
        assert!(Settings::new(path.to_str().unwrap()).is_err());
    }
}
