//! Trace recording configuration
//!
//! Configuration can be built in code or read from a TOML table:
//!
//! ```toml
//! init_size = 4096     # initial capacity of the operation buffer, in bytes
//! trace_limit = 6000   # maximum number of operations in one trace
//! ```
//!
//! Missing keys take their defaults.

use serde::Deserialize;
use std::path::Path;
use tracing::warn;

/// Default initial capacity of the operation buffer, in bytes
pub const DEFAULT_INIT_SIZE: usize = 4096;
/// Default maximum number of operations per trace
pub const DEFAULT_TRACE_LIMIT: usize = 6000;

/// Limits applied while recording a trace
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TraceConfig {
    /// Initial capacity of the operation buffer, in bytes
    #[serde(default = "default_init_size")]
    pub init_size: usize,

    /// Maximum number of recorded operations
    #[serde(default = "default_trace_limit")]
    pub trace_limit: usize,
}

fn default_init_size() -> usize {
    DEFAULT_INIT_SIZE
}

fn default_trace_limit() -> usize {
    DEFAULT_TRACE_LIMIT
}

impl Default for TraceConfig {
    fn default() -> Self {
        TraceConfig {
            init_size: DEFAULT_INIT_SIZE,
            trace_limit: DEFAULT_TRACE_LIMIT,
        }
    }
}

impl TraceConfig {
    /// Parse a configuration from TOML content.
    pub fn parse_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load a configuration from a TOML file path.
    ///
    /// Returns `None` when the file is missing or malformed.
    pub fn load_from_toml_path(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        let content = std::fs::read_to_string(path).ok()?;
        match Self::parse_toml(&content) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring malformed trace config");
                None
            }
        }
    }

    pub fn with_trace_limit(mut self, trace_limit: usize) -> Self {
        self.trace_limit = trace_limit;
        self
    }

    pub fn with_init_size(mut self, init_size: usize) -> Self {
        self.init_size = init_size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full() {
        let config = TraceConfig::parse_toml("init_size = 128\ntrace_limit = 10\n").unwrap();
        assert_eq!(config.init_size, 128);
        assert_eq!(config.trace_limit, 10);
    }

    #[test]
    fn test_parse_defaults() {
        let config = TraceConfig::parse_toml("").unwrap();
        assert_eq!(config, TraceConfig::default());

        let config = TraceConfig::parse_toml("trace_limit = 42").unwrap();
        assert_eq!(config.init_size, DEFAULT_INIT_SIZE);
        assert_eq!(config.trace_limit, 42);
    }

    #[test]
    fn test_parse_invalid() {
        assert!(TraceConfig::parse_toml("trace_limit = \"many\"").is_err());
    }

    #[test]
    fn test_load_missing_file() {
        assert!(TraceConfig::load_from_toml_path(Path::new("/nonexistent/trace.toml")).is_none());
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("opencoder-config-{}.toml", std::process::id()));
        std::fs::write(&path, "trace_limit = 7\n").unwrap();
        let config = TraceConfig::load_from_toml_path(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(config.trace_limit, 7);
    }
}
