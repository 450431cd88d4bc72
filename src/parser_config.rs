//! Parser options: recovery behaviour and resource limits.
//!
//! # Example
//!
//! ```
//! use pdf_engine::parser_config::ParserOptions;
//!
//! // Lenient (default): repair stale cross-reference data by scanning
//! let lenient = ParserOptions::lenient();
//! assert!(!lenient.strict);
//!
//! // Strict: an inconsistent cross-reference index is a parse error
//! let strict = ParserOptions::strict();
//! assert!(strict.strict);
//! ```

use crate::decoders::DecodeLimits;
use serde::{Deserialize, Serialize};

/// Options controlling how input bytes become a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserOptions {
    /// Disable the full-scan recovery path.
    pub strict: bool,

    /// Skip objects that fail to parse instead of failing the load.
    pub skip_invalid_objects: bool,

    /// Maximum array/dictionary nesting depth.
    pub max_nesting: usize,

    /// Maximum decoded:encoded ratio for one stream (0 disables).
    pub max_decompression_ratio: u32,

    /// Maximum decoded stream size in bytes (0 disables).
    pub max_decompressed_size: usize,

    /// Maximum length of a reference chain or `/Prev` chain.
    pub max_recursion_depth: u32,

    /// Maximum input size in bytes (0 disables).
    pub max_file_size: usize,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self::lenient()
    }
}

impl ParserOptions {
    /// Fail on damaged structure instead of repairing it.
    pub fn strict() -> Self {
        Self {
            strict: true,
            skip_invalid_objects: false,
            ..Self::lenient()
        }
    }

    /// Repair what can be repaired, logging each repair.
    pub fn lenient() -> Self {
        let limits = DecodeLimits::default();
        Self {
            strict: false,
            skip_invalid_objects: true,
            max_nesting: 256,
            max_decompression_ratio: limits.max_ratio,
            max_decompressed_size: limits.max_size,
            max_recursion_depth: 100,
            max_file_size: 2 * 1024 * 1024 * 1024,
        }
    }

    /// Decompression limits derived from these options.
    pub fn decode_limits(&self) -> DecodeLimits {
        DecodeLimits {
            max_ratio: self.max_decompression_ratio,
            max_size: self.max_decompressed_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_lenient() {
        assert_eq!(ParserOptions::default(), ParserOptions::lenient());
    }

    #[test]
    fn test_strict_keeps_limits() {
        let strict = ParserOptions::strict();
        assert!(strict.strict);
        assert!(!strict.skip_invalid_objects);
        assert_eq!(strict.max_nesting, ParserOptions::lenient().max_nesting);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let opts: ParserOptions = serde_json::from_str(r#"{"strict": true}"#).unwrap();
        assert!(opts.strict);
        assert_eq!(opts.max_recursion_depth, 100);
    }

    #[test]
    fn test_decode_limits() {
        let opts = ParserOptions {
            max_decompressed_size: 10,
            ..ParserOptions::lenient()
        };
        assert_eq!(opts.decode_limits().max_size, 10);
    }
}
