//! Engine configuration.
//!
//! Everything has a default, so a JSON file only needs the keys it
//! changes:
//!
//! ```
//! use pdf_engine::config::EngineConfig;
//!
//! let config = EngineConfig::from_json_str(r#"{"worker_threads": 2}"#).unwrap();
//! assert_eq!(config.worker_threads, 2);
//! assert!(!config.parser.strict);
//! ```

use crate::error::{Error, Result};
use crate::ops::CompressOptions;
use crate::parser_config::ParserOptions;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// How input files are parsed
    pub parser: ParserOptions,

    /// Threads in the batch pool (0 lets rayon decide)
    pub worker_threads: usize,

    /// Defaults for `compress` when the caller passes none
    pub compress: CompressOptions,

    /// `/Producer` written into documents the engine creates
    pub producer: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineConfig {
    /// Lenient parsing, automatic thread count.
    pub fn new() -> Self {
        Self {
            parser: ParserOptions::default(),
            worker_threads: 0,
            compress: CompressOptions::default(),
            producer: None,
        }
    }

    /// Set the parser options.
    pub fn with_parser(mut self, parser: ParserOptions) -> Self {
        self.parser = parser;
        self
    }

    /// Set the batch pool size.
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    /// Set the default compression options.
    pub fn with_compress(mut self, compress: CompressOptions) -> Self {
        self.compress = compress;
        self
    }

    /// Set the producer string.
    pub fn with_producer(mut self, producer: impl Into<String>) -> Self {
        self.producer = Some(producer.into());
        self
    }

    /// Parse a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))
    }

    /// Read a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json).map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.worker_threads, 0);
        assert_eq!(config.compress.level, 6);
        assert_eq!(config, EngineConfig::from_json_str("{}").unwrap());
    }

    #[test]
    fn test_nested_overrides() {
        let config = EngineConfig::from_json_str(
            r#"{"parser": {"strict": true}, "compress": {"image_quality": 70}, "producer": "me"}"#,
        )
        .unwrap();
        assert!(config.parser.strict);
        assert_eq!(config.parser.max_nesting, ParserOptions::default().max_nesting);
        assert_eq!(config.compress.image_quality, Some(70));
        assert_eq!(config.producer.as_deref(), Some("me"));
    }

    #[test]
    fn test_bad_json() {
        assert!(matches!(EngineConfig::from_json_str("{"), Err(Error::Config(_))));
        assert!(matches!(
            EngineConfig::from_json_str(r#"{"worker_threads": "many"}"#),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"worker_threads": 3}}"#).unwrap();
        let config = EngineConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.worker_threads, 3);
        assert!(EngineConfig::from_json_file("/nonexistent/engine.json").is_err());
    }
}
